use crate::core::diagnostics::{Diagnostic, DiagnosticSink};
use crate::internal::utils::read_cstring;
use std::ffi::{c_char, c_void};

/// Error callback registered with `tcc_set_error_func`.
///
/// `opaque` is the address of the owning state's [`DiagnosticSink`].
pub(crate) unsafe extern "C" fn cvoid_error_callback(opaque: *mut c_void, msg: *const c_char) {
    let Some(sink) = (unsafe { (opaque as *const DiagnosticSink).as_ref() }) else {
        return;
    };
    let message = unsafe { read_cstring(msg) };
    sink.record(Diagnostic::parse(message));
}
