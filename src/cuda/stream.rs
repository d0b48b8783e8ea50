use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{Result, SoftCascadeError};
use crate::ffi::CascadeLibrary;

/// Owned GPU execution stream.
///
/// Work queued on a stream runs asynchronously to the host; outputs written
/// by that work are defined only after [`Stream::wait_for_completion`].
pub struct Stream {
    lib: Arc<dyn CascadeLibrary>,
    raw: NonNull<c_void>,
}

// SAFETY: the stream is exclusively owned; the native object has no thread affinity.
unsafe impl Send for Stream {}

impl Stream {
    pub fn new(lib: &Arc<dyn CascadeLibrary>) -> Result<Self> {
        let raw = lib
            .stream_create()
            .ok_or(SoftCascadeError::Allocation("stream"))?;
        Ok(Self {
            lib: Arc::clone(lib),
            raw,
        })
    }

    /// Block until every operation queued on this stream has finished.
    pub fn wait_for_completion(&self) -> Result<()> {
        // SAFETY: `raw` is live for the lifetime of `self`.
        unsafe { self.lib.stream_wait(self.raw) }.map_err(SoftCascadeError::Stream)
    }

    pub fn as_raw(&self) -> NonNull<c_void> {
        self.raw
    }

    /// Library that owns this stream.
    pub(crate) fn library(&self) -> &Arc<dyn CascadeLibrary> {
        &self.lib
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("library", &self.lib.name())
            .field("raw", &self.raw)
            .finish()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let mut raw = self.raw.as_ptr();
        // SAFETY: owned handle, released exactly once here.
        unsafe { self.lib.stream_release(&mut raw) };
    }
}
