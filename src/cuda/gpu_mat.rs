use std::ffi::{c_int, c_void};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{Result, SoftCascadeError};
use crate::ffi::{CascadeLibrary, Size};

/// Element layout of a GPU matrix, as OpenCV type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatType {
    /// `CV_8UC1`, used for ROI masks.
    Gray8,
    /// `CV_8UC3`, the colour frame layout the detector expects.
    Bgr8,
}

impl MatType {
    pub fn as_raw(self) -> c_int {
        match self {
            Self::Gray8 => 0,
            Self::Bgr8 => 16,
        }
    }
}

/// Owned matrix in GPU memory.
///
/// Frames and ROI masks are lent to the detector as `&GpuMat`; detection
/// output comes back as a fresh, caller-owned `GpuMat`.
pub struct GpuMat {
    lib: Arc<dyn CascadeLibrary>,
    raw: NonNull<c_void>,
}

// SAFETY: the matrix is exclusively owned; the native object has no thread affinity.
unsafe impl Send for GpuMat {}

impl GpuMat {
    /// Allocate an empty matrix.
    pub fn new(lib: &Arc<dyn CascadeLibrary>) -> Result<Self> {
        let raw = lib
            .gpu_mat_create()
            .ok_or(SoftCascadeError::Allocation("gpu matrix"))?;
        Ok(Self {
            lib: Arc::clone(lib),
            raw,
        })
    }

    /// Allocate a matrix of the given size. Contents are uninitialised.
    pub fn with_size(lib: &Arc<dyn CascadeLibrary>, size: Size, mat_type: MatType) -> Result<Self> {
        let raw = lib
            .gpu_mat_create_sized(size.height, size.width, mat_type.as_raw())
            .ok_or(SoftCascadeError::Allocation("gpu matrix"))?;
        Ok(Self {
            lib: Arc::clone(lib),
            raw,
        })
    }

    /// Take ownership of a matrix allocated elsewhere by the same library.
    ///
    /// # Safety
    /// `raw` must be a live matrix of `lib` that nothing else will release.
    pub unsafe fn from_raw(lib: &Arc<dyn CascadeLibrary>, raw: NonNull<c_void>) -> Self {
        Self {
            lib: Arc::clone(lib),
            raw,
        }
    }

    /// Give up ownership; the caller becomes responsible for releasing it.
    pub fn into_raw(self) -> NonNull<c_void> {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    pub fn as_raw(&self) -> NonNull<c_void> {
        self.raw
    }

    /// Library that owns this matrix.
    pub(crate) fn library(&self) -> &Arc<dyn CascadeLibrary> {
        &self.lib
    }

    pub fn is_empty(&self) -> bool {
        // SAFETY: `raw` is live for the lifetime of `self`.
        unsafe { self.lib.gpu_mat_is_empty(self.raw) }
    }

    pub fn size(&self) -> Size {
        // SAFETY: `raw` is live for the lifetime of `self`.
        unsafe { self.lib.gpu_mat_size(self.raw) }
    }
}

impl fmt::Debug for GpuMat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuMat")
            .field("library", &self.lib.name())
            .field("raw", &self.raw)
            .finish()
    }
}

impl Drop for GpuMat {
    fn drop(&mut self) {
        let mut raw = self.raw.as_ptr();
        // SAFETY: owned handle, released exactly once here.
        unsafe { self.lib.gpu_mat_release(&mut raw) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubLibrary;

    #[test]
    fn new_matrix_is_empty_and_released_on_drop() {
        let stub = Arc::new(StubLibrary::new());
        let lib: Arc<dyn CascadeLibrary> = stub.clone();
        {
            let mat = GpuMat::new(&lib).unwrap();
            assert!(mat.is_empty());
            assert_eq!(mat.size(), Size::default());
            assert_eq!(stub.stats().live_mats, 1);
        }
        assert_eq!(stub.stats().live_mats, 0);
    }

    #[test]
    fn sized_matrix_reports_its_size() {
        let lib = StubLibrary::shared();
        let size = Size {
            width: 320,
            height: 240,
        };
        let mat = GpuMat::with_size(&lib, size, MatType::Bgr8).unwrap();
        assert!(!mat.is_empty());
        assert_eq!(mat.size(), size);
    }

    #[test]
    fn into_raw_hands_over_ownership() {
        let stub = Arc::new(StubLibrary::new());
        let lib: Arc<dyn CascadeLibrary> = stub.clone();
        let raw = GpuMat::new(&lib).unwrap().into_raw();
        assert_eq!(stub.stats().live_mats, 1);

        drop(unsafe { GpuMat::from_raw(&lib, raw) });
        assert_eq!(stub.stats().live_mats, 0);
        assert_eq!(stub.stats().invalid_releases, 0);
    }
}
