//! Bindings to the native `cvextern` library.
//!
//! Only the entry points needed by the soft cascade wrapper are declared.
//! Linking requires `cvextern` (built with the CUDA soft cascade module) on
//! the library search path.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr::{self, NonNull};
use std::sync::Once;

use super::error_trap::{self, ErrorCallback};
use super::{CascadeLibrary, Size};
use crate::error::NativeError;

mod sys {
    use super::*;

    /// Mirrors `CvSize`.
    #[repr(C)]
    #[derive(Default)]
    pub struct CvSize {
        pub width: c_int,
        pub height: c_int,
    }

    #[link(name = "cvextern")]
    extern "C" {
        pub fn cveRedirectError(
            error_handler: Option<ErrorCallback>,
            userdata: *mut c_void,
            prev_userdata: *mut *mut c_void,
        ) -> Option<ErrorCallback>;

        pub fn cveStringCreateFromStr(c: *const c_char) -> *mut c_void;
        pub fn cveStringRelease(string: *mut *mut c_void);

        pub fn cudaSoftCascadeDetectorRelease(detector: *mut *mut c_void);

        pub fn cveGpuMatCreateDefault() -> *mut c_void;
        pub fn cveGpuMatRelease(mat: *mut *mut c_void);
        pub fn cveGpuMatIsEmpty(mat: *mut c_void) -> bool;
        pub fn cveGpuMatGetSize(mat: *mut c_void, size: *mut CvSize);

        pub fn cveStreamCreate() -> *mut c_void;
        pub fn cveStreamRelease(stream: *mut *mut c_void);
    }

    // Entry points that report failure by throwing `cv::Exception` after the
    // error callback has run.
    #[link(name = "cvextern")]
    extern "C-unwind" {
        pub fn cudaSoftCascadeDetectorCreate(
            file_name: *mut c_void,
            min_scale: f64,
            max_scale: f64,
            scales: c_int,
            flags: c_int,
        ) -> *mut c_void;
        pub fn cudaSoftCascadeDetectorDetect(
            detector: *mut c_void,
            image: *mut c_void,
            rois: *mut c_void,
            detections: *mut c_void,
            stream: *mut c_void,
        );

        pub fn cveGpuMatCreate(rows: c_int, cols: c_int, mat_type: c_int) -> *mut c_void;

        pub fn cveStreamWaitForCompletion(stream: *mut c_void);
    }
}

static REDIRECT: Once = Once::new();

/// The native library, with its error callback routed into [`error_trap`].
///
/// The create, detect, sized-allocation and stream-wait entry points are
/// declared `C-unwind`. A `cv::Exception` they throw after the callback
/// unwinds through the calling Rust frames as a foreign exception, running
/// their destructors. Rust cannot catch it, so it ends the process once it
/// leaves `main` or reaches a `catch_unwind`. The trap guarantees the error
/// is logged first, and it is returned as a [`NativeError`] whenever the
/// library reports a failure without throwing.
pub struct CvExtern {
    _private: (),
}

impl CvExtern {
    pub fn new() -> Self {
        REDIRECT.call_once(|| {
            let mut prev = ptr::null_mut();
            // SAFETY: `record_error` matches the callback signature and ignores userdata.
            unsafe {
                sys::cveRedirectError(Some(error_trap::record_error), ptr::null_mut(), &mut prev)
            };
            log::debug!("cvextern error callback installed");
        });
        Self { _private: () }
    }

    fn checked<T>(call: impl FnOnce() -> T) -> Result<T, NativeError> {
        error_trap::clear();
        let out = call();
        match error_trap::take() {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

impl Default for CvExtern {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadeLibrary for CvExtern {
    fn name(&self) -> &'static str {
        "cvextern"
    }

    fn string_create(&self, value: &CStr) -> Option<NonNull<c_void>> {
        // SAFETY: `value` is NUL-terminated; the callee copies it.
        NonNull::new(unsafe { sys::cveStringCreateFromStr(value.as_ptr()) })
    }

    unsafe fn string_release(&self, string: &mut *mut c_void) {
        unsafe { sys::cveStringRelease(string) }
    }

    unsafe fn detector_create(
        &self,
        path: NonNull<c_void>,
        min_scale: f64,
        max_scale: f64,
        scales: c_int,
        flags: c_int,
    ) -> Result<NonNull<c_void>, NativeError> {
        let raw = Self::checked(|| unsafe {
            sys::cudaSoftCascadeDetectorCreate(path.as_ptr(), min_scale, max_scale, scales, flags)
        })?;
        NonNull::new(raw).ok_or_else(|| NativeError::message("detector create returned null"))
    }

    unsafe fn detector_detect(
        &self,
        detector: NonNull<c_void>,
        image: NonNull<c_void>,
        rois: NonNull<c_void>,
        objects: NonNull<c_void>,
        stream: *mut c_void,
    ) -> Result<(), NativeError> {
        Self::checked(|| unsafe {
            sys::cudaSoftCascadeDetectorDetect(
                detector.as_ptr(),
                image.as_ptr(),
                rois.as_ptr(),
                objects.as_ptr(),
                stream,
            )
        })
    }

    unsafe fn detector_release(&self, detector: &mut *mut c_void) {
        unsafe { sys::cudaSoftCascadeDetectorRelease(detector) }
    }

    fn gpu_mat_create(&self) -> Option<NonNull<c_void>> {
        // SAFETY: no arguments; returns an owned matrix or null.
        NonNull::new(unsafe { sys::cveGpuMatCreateDefault() })
    }

    fn gpu_mat_create_sized(
        &self,
        rows: c_int,
        cols: c_int,
        mat_type: c_int,
    ) -> Option<NonNull<c_void>> {
        // SAFETY: plain values; returns an owned matrix or null.
        NonNull::new(unsafe { sys::cveGpuMatCreate(rows, cols, mat_type) })
    }

    unsafe fn gpu_mat_release(&self, mat: &mut *mut c_void) {
        unsafe { sys::cveGpuMatRelease(mat) }
    }

    unsafe fn gpu_mat_is_empty(&self, mat: NonNull<c_void>) -> bool {
        unsafe { sys::cveGpuMatIsEmpty(mat.as_ptr()) }
    }

    unsafe fn gpu_mat_size(&self, mat: NonNull<c_void>) -> Size {
        let mut size = sys::CvSize::default();
        unsafe { sys::cveGpuMatGetSize(mat.as_ptr(), &mut size) };
        Size {
            width: size.width,
            height: size.height,
        }
    }

    fn stream_create(&self) -> Option<NonNull<c_void>> {
        // SAFETY: no arguments; returns an owned stream or null.
        NonNull::new(unsafe { sys::cveStreamCreate() })
    }

    unsafe fn stream_release(&self, stream: &mut *mut c_void) {
        unsafe { sys::cveStreamRelease(stream) }
    }

    unsafe fn stream_wait(&self, stream: NonNull<c_void>) -> Result<(), NativeError> {
        Self::checked(|| unsafe { sys::cveStreamWaitForCompletion(stream.as_ptr()) })
    }
}
