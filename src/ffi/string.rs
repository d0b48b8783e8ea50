use std::ffi::{c_void, CString};
use std::path::Path;
use std::ptr::NonNull;

use super::CascadeLibrary;

/// Native copy of a string, released when the guard goes out of scope.
///
/// Used to hand the model path to the create call; the guard lives only for
/// the duration of that call, whatever its outcome.
pub struct NativeString<'a> {
    lib: &'a dyn CascadeLibrary,
    raw: NonNull<c_void>,
}

impl<'a> NativeString<'a> {
    /// Marshal `path` into a native string.
    ///
    /// Fails when the path contains an interior NUL byte or the native
    /// allocation fails.
    pub fn from_path(lib: &'a dyn CascadeLibrary, path: &Path) -> Result<Self, String> {
        let bytes = path.as_os_str().as_encoded_bytes();
        let value = CString::new(bytes)
            .map_err(|_| "path contains an interior NUL byte".to_string())?;
        let raw = lib
            .string_create(&value)
            .ok_or_else(|| "native string allocation failed".to_string())?;
        Ok(Self { lib, raw })
    }

    pub fn as_raw(&self) -> NonNull<c_void> {
        self.raw
    }
}

impl Drop for NativeString<'_> {
    fn drop(&mut self) {
        let mut raw = self.raw.as_ptr();
        // SAFETY: `raw` came from `string_create` on `self.lib` and is released only here.
        unsafe { self.lib.string_release(&mut raw) };
    }
}
