//! CUDA soft cascade detector
//!
//! Safe ownership of the native soft (stageless) cascade detector exposed by
//! the `cvextern` C ABI. The detection algorithm, its model format and the
//! GPU kernels all live in the native library; this crate marshals arguments
//! and guarantees every native handle is released exactly once.
//!
//! # Module Structure
//!
//! - `detect`: the detector handle wrapper and its parameters
//! - `cuda`: owned GPU matrices and execution streams
//! - `ffi`: the native entry points behind the [`CascadeLibrary`] trait
//! - `stub`: an in-process library for tests and GPU-less hosts
//! - `config`: file and environment configuration
//!
//! # Example
//!
//! ```
//! use cuda_softcascade::{GpuMat, MatType, Size, SoftCascadeDetector, SoftCascadeError, StubLibrary};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dir = tempfile::tempdir()?;
//! # let model = dir.path().join("cascade.xml");
//! # std::fs::write(&model, b"<opencv_storage/>")?;
//! let lib = StubLibrary::shared();
//! let size = Size { width: 640, height: 480 };
//!
//! let mut detector = SoftCascadeDetector::new(&lib, &model)?;
//! let frame = GpuMat::with_size(&lib, size, MatType::Bgr8)?;
//! let rois = GpuMat::with_size(&lib, size, MatType::Gray8)?;
//! let detections = detector.detect(&frame, &rois, None)?;
//! assert!(!detections.is_empty());
//!
//! detector.release();
//! assert!(matches!(
//!     detector.detect(&frame, &rois, None),
//!     Err(SoftCascadeError::UseAfterRelease)
//! ));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cuda;
pub mod detect;
pub mod error;
pub mod ffi;
pub mod stub;

pub use cuda::{DetectionBuffer, GpuMat, MatType, Stream};
pub use detect::{DetectorParams, RejectionCriteria, SoftCascadeDetector};
pub use error::{NativeError, Result, SoftCascadeError};
pub use ffi::{CascadeLibrary, Size};
pub use stub::StubLibrary;

#[cfg(feature = "cvextern")]
pub use ffi::CvExtern;
