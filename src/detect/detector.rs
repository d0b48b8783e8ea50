use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::cuda::{DetectionBuffer, GpuMat, Stream};
use crate::error::{Result, SoftCascadeError};
use crate::ffi::{CascadeLibrary, NativeString};

use super::params::DetectorParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandleState {
    Live(NonNull<c_void>),
    Released,
}

/// CUDA soft (stageless) cascade detector backed by a native handle.
///
/// The handle is released exactly once: by [`release`](Self::release) or,
/// failing that, on drop. Every detect call after release fails with
/// [`SoftCascadeError::UseAfterRelease`] without reaching the native library.
///
/// The detector can be moved to another thread but not shared between
/// threads; the native object gives no guarantees for concurrent use.
///
/// ```compile_fail
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<cuda_softcascade::SoftCascadeDetector>();
/// ```
pub struct SoftCascadeDetector {
    lib: Arc<dyn CascadeLibrary>,
    handle: HandleState,
    model_path: PathBuf,
    params: DetectorParams,
}

// SAFETY: the handle is exclusively owned and never aliased; `detect` needs `&mut self`.
unsafe impl Send for SoftCascadeDetector {}

impl SoftCascadeDetector {
    /// Load a trained cascade with the default search parameters.
    pub fn new(lib: &Arc<dyn CascadeLibrary>, model_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_params(lib, model_path, DetectorParams::default())
    }

    /// Load a trained cascade from `model_path`.
    ///
    /// The file is not inspected here; a missing or unparsable model shows
    /// up as [`SoftCascadeError::Construction`] when the native create call
    /// yields no handle.
    pub fn with_params(
        lib: &Arc<dyn CascadeLibrary>,
        model_path: impl AsRef<Path>,
        params: DetectorParams,
    ) -> Result<Self> {
        let model_path = model_path.as_ref().to_path_buf();
        let construction = |reason: String| {
            log::warn!(
                "soft cascade construction failed for {}: {}",
                model_path.display(),
                reason
            );
            SoftCascadeError::Construction {
                path: model_path.clone(),
                reason,
            }
        };

        let raw = {
            let path = NativeString::from_path(&**lib, &model_path).map_err(&construction)?;
            // SAFETY: `path` is a live native string of `lib` for the whole call.
            unsafe {
                lib.detector_create(
                    path.as_raw(),
                    params.min_scale,
                    params.max_scale,
                    params.scales,
                    params.rejection.as_raw(),
                )
            }
            .map_err(|err| construction(err.to_string()))?
        };

        log::debug!(
            "soft cascade loaded from {} via {} (scales {}..{} x{}, rejection {})",
            model_path.display(),
            lib.name(),
            params.min_scale,
            params.max_scale,
            params.scales,
            params.rejection
        );

        Ok(Self {
            lib: Arc::clone(lib),
            handle: HandleState::Live(raw),
            model_path,
            params,
        })
    }

    /// Run the cascade on `image`, restricted to the regions in `rois`.
    ///
    /// Without a stream the call blocks until the returned buffer is filled.
    /// With a stream the work is queued and the call returns immediately;
    /// the buffer's contents are defined only after the stream is waited on.
    pub fn detect(
        &mut self,
        image: &GpuMat,
        rois: &GpuMat,
        stream: Option<&Stream>,
    ) -> Result<DetectionBuffer> {
        let HandleState::Live(handle) = self.handle else {
            return Err(SoftCascadeError::UseAfterRelease);
        };
        self.check_owned("image", image.library())?;
        self.check_owned("rois", rois.library())?;
        if let Some(stream) = stream {
            self.check_owned("stream", stream.library())?;
        }

        let objects = GpuMat::new(&self.lib)?;
        let stream_raw = stream.map_or(ptr::null_mut(), |s| s.as_raw().as_ptr());
        log::trace!(
            "soft cascade detect ({})",
            if stream.is_some() { "async" } else { "sync" }
        );

        // SAFETY: `handle` is live, and the borrowed buffers belong to
        // `self.lib` and outlive the call.
        unsafe {
            self.lib.detector_detect(
                handle,
                image.as_raw(),
                rois.as_raw(),
                objects.as_raw(),
                stream_raw,
            )
        }
        .map_err(|err| {
            log::warn!("soft cascade detection failed: {}", err);
            SoftCascadeError::Detection(err)
        })?;

        Ok(objects)
    }

    /// Native handles are only meaningful to the library that issued them.
    fn check_owned(&self, what: &'static str, lib: &Arc<dyn CascadeLibrary>) -> Result<()> {
        if Arc::ptr_eq(lib, &self.lib) {
            Ok(())
        } else {
            log::warn!("soft cascade detect given a {} from another library", what);
            Err(SoftCascadeError::ForeignHandle(what))
        }
    }

    /// Release the native detector. Calling this more than once is a no-op.
    pub fn release(&mut self) {
        if let HandleState::Live(handle) = self.handle {
            let mut raw = handle.as_ptr();
            // SAFETY: the handle is live and the state flips to Released below,
            // so it is never passed to the native library again.
            unsafe { self.lib.detector_release(&mut raw) };
            self.handle = HandleState::Released;
            log::debug!("soft cascade released ({})", self.model_path.display());
        }
    }

    pub fn is_released(&self) -> bool {
        self.handle == HandleState::Released
    }

    /// Native handle, or `None` once released.
    pub fn as_raw(&self) -> Option<NonNull<c_void>> {
        match self.handle {
            HandleState::Live(handle) => Some(handle),
            HandleState::Released => None,
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Parameters the detector was created with.
    pub fn params(&self) -> &DetectorParams {
        &self.params
    }
}

impl fmt::Debug for SoftCascadeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftCascadeDetector")
            .field("library", &self.lib.name())
            .field("handle", &self.handle)
            .field("model_path", &self.model_path)
            .field("params", &self.params)
            .finish()
    }
}

impl Drop for SoftCascadeDetector {
    fn drop(&mut self) {
        self.release();
    }
}
