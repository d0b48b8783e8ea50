//! Capture of errors raised inside the native library.
//!
//! The native library reports failures through a process-wide error callback.
//! [`record_error`] is that callback: it stores the most recent error in a
//! thread-local slot so the calling wrapper can turn it into a typed error
//! once the native call returns.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, c_void, CStr};

use crate::error::NativeError;

thread_local! {
    static LAST_ERROR: RefCell<Option<NativeError>> = const { RefCell::new(None) };
}

/// Signature of the native error callback.
pub type ErrorCallback = unsafe extern "C" fn(
    status: c_int,
    func_name: *const c_char,
    err_msg: *const c_char,
    file_name: *const c_char,
    line: c_int,
    userdata: *mut c_void,
) -> c_int;

/// Error callback handed to the native library.
///
/// # Safety
/// String arguments must be null or valid NUL-terminated strings.
pub unsafe extern "C" fn record_error(
    status: c_int,
    func_name: *const c_char,
    err_msg: *const c_char,
    file_name: *const c_char,
    line: c_int,
    _userdata: *mut c_void,
) -> c_int {
    let err = NativeError {
        status,
        function: lossy(func_name),
        message: lossy(err_msg),
        file: lossy(file_name),
        line,
    };
    log::error!("native error: {}", err);
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err));
    0
}

/// Forget any error recorded on this thread.
pub fn clear() {
    LAST_ERROR.with(|slot| slot.borrow_mut().take());
}

/// Take the error recorded on this thread since the last [`clear`], if any.
pub fn take() -> Option<NativeError> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

unsafe fn lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn callback_records_error_for_current_thread() {
        clear();
        let func = CString::new("cv::softcascade::detect").unwrap();
        let msg = CString::new("Assertion failed").unwrap();
        let file = CString::new("detector.cu").unwrap();

        let rc = unsafe {
            record_error(
                -215,
                func.as_ptr(),
                msg.as_ptr(),
                file.as_ptr(),
                88,
                ptr::null_mut(),
            )
        };
        assert_eq!(rc, 0);

        let err = take().expect("error recorded");
        assert_eq!(err.status, -215);
        assert_eq!(err.function, "cv::softcascade::detect");
        assert_eq!(err.message, "Assertion failed");
        assert_eq!(err.file, "detector.cu");
        assert_eq!(err.line, 88);
        assert!(take().is_none());
    }

    #[test]
    fn null_strings_become_empty() {
        clear();
        unsafe {
            record_error(
                -1,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null_mut(),
            )
        };
        let err = take().unwrap();
        assert!(err.function.is_empty());
        assert!(err.message.is_empty());
    }

    #[test]
    fn errors_do_not_leak_across_threads() {
        clear();
        std::thread::spawn(|| {
            let msg = CString::new("other thread").unwrap();
            unsafe {
                record_error(
                    -2,
                    ptr::null(),
                    msg.as_ptr(),
                    ptr::null(),
                    0,
                    ptr::null_mut(),
                )
            };
        })
        .join()
        .unwrap();
        assert!(take().is_none());
    }
}
