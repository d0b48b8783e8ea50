use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Error reported by the native library through its error callback.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NativeError {
    /// OpenCV status code (negative for errors).
    pub status: i32,
    pub function: String,
    pub message: String,
    pub file: String,
    pub line: i32,
}

impl NativeError {
    /// Error without call-site information, used when the native side gave no details.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.function.is_empty() {
            write!(f, "{} (status {})", self.message, self.status)
        } else {
            write!(
                f,
                "{} in {} at {}:{} (status {})",
                self.message, self.function, self.file, self.line, self.status
            )
        }
    }
}

impl std::error::Error for NativeError {}

/// Failures surfaced by the detector wrapper. None are retried locally.
#[derive(Debug, Error)]
pub enum SoftCascadeError {
    /// The native create call returned no handle.
    #[error("failed to create soft cascade detector from {}: {reason}", .path.display())]
    Construction { path: PathBuf, reason: String },

    /// An operation was attempted on a detector that was already released.
    #[error("soft cascade detector used after release")]
    UseAfterRelease,

    /// The native detect call reported an error.
    #[error("soft cascade detection failed: {0}")]
    Detection(NativeError),

    /// A native buffer, stream or string could not be allocated.
    #[error("native allocation of {0} failed")]
    Allocation(&'static str),

    /// Waiting on an execution stream reported an error.
    #[error("stream synchronisation failed: {0}")]
    Stream(NativeError),

    /// A buffer or stream handed to the detector was created by another library instance.
    #[error("{0} was created by a different native library than the detector")]
    ForeignHandle(&'static str),
}

pub type Result<T> = std::result::Result<T, SoftCascadeError>;
