use crate::core::error::TccResult;
use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char};
use std::path::Path;

/// Copies a C string handed over by libtcc. Invalid UTF-8 is replaced.
///
/// # Safety
/// `c_buf` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub(crate) unsafe fn read_cstring(c_buf: *const c_char) -> String {
    if c_buf.is_null() {
        return String::new();
    }
    let c_str: &CStr = unsafe { CStr::from_ptr(c_buf) };
    c_str.to_string_lossy().into_owned()
}

pub(crate) fn to_cstring(text: &str) -> TccResult<CString> {
    Ok(CString::new(text)?)
}

pub(crate) fn path_to_cstring(path: &Path) -> TccResult<CString> {
    Ok(CString::new(path_bytes(path).into_owned())?)
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_string_lossy() {
        Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
        Cow::Owned(text) => Cow::Owned(text.into_bytes()),
    }
}
