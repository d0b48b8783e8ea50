//! Foreign surface of the soft cascade detector.
//!
//! Every native entry point the crate touches goes through [`CascadeLibrary`].
//! The `cvextern` feature provides [`CvExtern`], which links the real library;
//! [`crate::stub::StubLibrary`] implements the same trait in-process.
//!
//! Handles cross this boundary as raw pointers. Release functions take the
//! handle by `&mut` so the callee can null it, mirroring the `void**` C
//! signatures.

use std::ffi::{c_int, c_void, CStr};
use std::ptr::NonNull;

use crate::error::NativeError;

#[cfg(feature = "cvextern")]
pub mod cvextern;
pub mod error_trap;
mod string;

#[cfg(feature = "cvextern")]
pub use cvextern::CvExtern;
pub use string::NativeString;

/// Width and height of a native matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Native entry points used by the detector, buffer and stream wrappers.
///
/// # Safety contract
///
/// The `unsafe` methods take handles previously returned by the matching
/// `*_create` method of the same library and not yet released. The safe
/// wrappers in this crate are the only callers that need to uphold this.
pub trait CascadeLibrary: Send + Sync {
    /// Library identifier, used in log output.
    fn name(&self) -> &'static str;

    /// Copy `value` into a native string. `None` when allocation fails.
    fn string_create(&self, value: &CStr) -> Option<NonNull<c_void>>;

    /// # Safety
    /// `string` must come from `string_create` on this library.
    unsafe fn string_release(&self, string: &mut *mut c_void);

    /// Load a trained soft cascade from the file named by `path`.
    ///
    /// # Safety
    /// `path` must come from `string_create` on this library.
    unsafe fn detector_create(
        &self,
        path: NonNull<c_void>,
        min_scale: f64,
        max_scale: f64,
        scales: c_int,
        flags: c_int,
    ) -> Result<NonNull<c_void>, NativeError>;

    /// Run the detector, writing detections into `objects`.
    ///
    /// A null `stream` runs synchronously; otherwise the work is queued on it.
    ///
    /// # Safety
    /// All non-null handles must be live handles of this library.
    unsafe fn detector_detect(
        &self,
        detector: NonNull<c_void>,
        image: NonNull<c_void>,
        rois: NonNull<c_void>,
        objects: NonNull<c_void>,
        stream: *mut c_void,
    ) -> Result<(), NativeError>;

    /// # Safety
    /// `detector` must come from `detector_create` on this library.
    unsafe fn detector_release(&self, detector: &mut *mut c_void);

    /// Allocate an empty GPU matrix.
    fn gpu_mat_create(&self) -> Option<NonNull<c_void>>;

    /// Allocate an uninitialised `rows` x `cols` GPU matrix of OpenCV type `mat_type`.
    fn gpu_mat_create_sized(
        &self,
        rows: c_int,
        cols: c_int,
        mat_type: c_int,
    ) -> Option<NonNull<c_void>>;

    /// # Safety
    /// `mat` must come from `gpu_mat_create` on this library.
    unsafe fn gpu_mat_release(&self, mat: &mut *mut c_void);

    /// # Safety
    /// `mat` must be a live matrix of this library.
    unsafe fn gpu_mat_is_empty(&self, mat: NonNull<c_void>) -> bool;

    /// # Safety
    /// `mat` must be a live matrix of this library.
    unsafe fn gpu_mat_size(&self, mat: NonNull<c_void>) -> Size;

    /// Allocate an execution stream.
    fn stream_create(&self) -> Option<NonNull<c_void>>;

    /// # Safety
    /// `stream` must come from `stream_create` on this library.
    unsafe fn stream_release(&self, stream: &mut *mut c_void);

    /// Block until all work queued on `stream` has finished.
    ///
    /// # Safety
    /// `stream` must be a live stream of this library.
    unsafe fn stream_wait(&self, stream: NonNull<c_void>) -> Result<(), NativeError>;
}
