//! In-process stand-in for libtcc used by the unit tests.
//!
//! Each entry point records its name in a thread-local call log, so tests
//! running on separate threads see only their own calls. Behaviour is driven
//! by the inputs:
//!
//! - source containing `@` fails to compile, `#warning` reports a warning
//! - source containing `undefined_fn` fails at relocation and in `tcc_run`
//! - `add_file` accepts only `.c` paths
//! - `add_library("missing")` and options containing `-bogus` fail
//! - symbols resolve only if they were registered with `tcc_add_symbol`

use std::cell::{Cell, RefCell};
use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;
use std::sync::OnceLock;
use tinycc_sys::{LibTcc, TCC_RELOCATE_AUTO, TCCErrorFunc, TCCState, TccFns};

pub(crate) const IMAGE_SIZE: usize = 64;
pub(crate) const IMAGE_FILL: u8 = 0xC3;

struct FakeState {
    opaque: *mut c_void,
    callback: Option<TCCErrorFunc>,
    symbols: Vec<(String, *mut c_void)>,
    unresolved: bool,
}

thread_local! {
    static CALLS: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    static NEW_RETURNS_NULL: Cell<bool> = const { Cell::new(false) };
    static OUTPUT_TYPE_FAILS: Cell<bool> = const { Cell::new(false) };
    static DEFINES: RefCell<Vec<(String, Option<String>)>> = const { RefCell::new(Vec::new()) };
}

fn record(name: &'static str) {
    CALLS.with(|calls| calls.borrow_mut().push(name));
}

/// Number of times `name` was called on this thread.
pub(crate) fn count(name: &str) -> usize {
    CALLS.with(|calls| calls.borrow().iter().filter(|call| **call == name).count())
}

/// Every call made on this thread, in order.
pub(crate) fn calls() -> Vec<&'static str> {
    CALLS.with(|calls| calls.borrow().clone())
}

/// Every `tcc_define_symbol` on this thread. A null value is `None`.
pub(crate) fn defines() -> Vec<(String, Option<String>)> {
    DEFINES.with(|defines| defines.borrow().clone())
}

/// Clears the call log and switches of this thread.
pub(crate) fn reset() {
    CALLS.with(|calls| calls.borrow_mut().clear());
    DEFINES.with(|defines| defines.borrow_mut().clear());
    NEW_RETURNS_NULL.with(|flag| flag.set(false));
    OUTPUT_TYPE_FAILS.with(|flag| flag.set(false));
}

pub(crate) fn set_new_returns_null(value: bool) {
    NEW_RETURNS_NULL.with(|flag| flag.set(value));
}

pub(crate) fn set_output_type_fails(value: bool) {
    OUTPUT_TYPE_FAILS.with(|flag| flag.set(value));
}

unsafe fn fake<'a>(s: *mut TCCState) -> &'a mut FakeState {
    unsafe { &mut *s.cast::<FakeState>() }
}

unsafe fn text<'a>(ptr: *const c_char) -> &'a str {
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap_or("")
}

fn report(state: &FakeState, message: &str) {
    if let Some(callback) = state.callback {
        let message = std::ffi::CString::new(message).unwrap();
        unsafe { callback(state.opaque, message.as_ptr()) };
    }
}

unsafe extern "C" fn tcc_new() -> *mut TCCState {
    record("tcc_new");
    if NEW_RETURNS_NULL.with(Cell::get) {
        return ptr::null_mut();
    }
    let state = Box::new(FakeState {
        opaque: ptr::null_mut(),
        callback: None,
        symbols: Vec::new(),
        unresolved: false,
    });
    Box::into_raw(state).cast()
}

unsafe extern "C" fn tcc_delete(s: *mut TCCState) {
    record("tcc_delete");
    drop(unsafe { Box::from_raw(s.cast::<FakeState>()) });
}

unsafe extern "C" fn tcc_set_lib_path(_s: *mut TCCState, _path: *const c_char) {
    record("tcc_set_lib_path");
}

unsafe extern "C" fn tcc_set_error_func(
    s: *mut TCCState,
    opaque: *mut c_void,
    func: Option<TCCErrorFunc>,
) {
    record("tcc_set_error_func");
    let state = unsafe { fake(s) };
    state.opaque = opaque;
    state.callback = func;
}

unsafe extern "C" fn tcc_set_options(s: *mut TCCState, options: *const c_char) -> c_int {
    record("tcc_set_options");
    let options = unsafe { text(options) };
    if options.contains("-bogus") {
        report(unsafe { fake(s) }, "tcc: error: invalid option -- '-bogus'");
        return -1;
    }
    0
}

unsafe extern "C" fn tcc_add_include_path(_s: *mut TCCState, _path: *const c_char) -> c_int {
    record("tcc_add_include_path");
    0
}

unsafe extern "C" fn tcc_add_sysinclude_path(_s: *mut TCCState, _path: *const c_char) -> c_int {
    record("tcc_add_sysinclude_path");
    0
}

unsafe extern "C" fn tcc_define_symbol(_s: *mut TCCState, sym: *const c_char, value: *const c_char) {
    record("tcc_define_symbol");
    let sym = unsafe { text(sym) }.to_string();
    let value = (!value.is_null()).then(|| unsafe { text(value) }.to_string());
    DEFINES.with(|defines| defines.borrow_mut().push((sym, value)));
}

unsafe extern "C" fn tcc_undefine_symbol(_s: *mut TCCState, _sym: *const c_char) {
    record("tcc_undefine_symbol");
}

unsafe extern "C" fn tcc_add_file(s: *mut TCCState, filename: *const c_char) -> c_int {
    record("tcc_add_file");
    let filename = unsafe { text(filename) };
    if !filename.ends_with(".c") {
        report(unsafe { fake(s) }, &format!("tcc: error: file '{filename}' not found"));
        return -1;
    }
    0
}

unsafe extern "C" fn tcc_compile_string(s: *mut TCCState, buf: *const c_char) -> c_int {
    record("tcc_compile_string");
    let state = unsafe { fake(s) };
    let source = unsafe { text(buf) };
    if source.contains('@') {
        report(state, "<string>:1: error: ';' expected (got \"@\")");
        return -1;
    }
    if source.contains("#warning") {
        report(state, "<string>:1: warning: #warning stub");
    }
    if source.contains("undefined_fn") {
        state.unresolved = true;
    }
    0
}

unsafe extern "C" fn tcc_set_output_type(_s: *mut TCCState, output_type: c_int) -> c_int {
    record("tcc_set_output_type");
    if OUTPUT_TYPE_FAILS.with(Cell::get) || !(1..=5).contains(&output_type) {
        return -1;
    }
    0
}

unsafe extern "C" fn tcc_add_library_path(_s: *mut TCCState, _path: *const c_char) -> c_int {
    record("tcc_add_library_path");
    0
}

unsafe extern "C" fn tcc_add_library(s: *mut TCCState, name: *const c_char) -> c_int {
    record("tcc_add_library");
    let name = unsafe { text(name) };
    if name == "missing" {
        report(unsafe { fake(s) }, "tcc: error: library 'missing' not found");
        return -1;
    }
    0
}

unsafe extern "C" fn tcc_add_symbol(s: *mut TCCState, name: *const c_char, val: *const c_void) -> c_int {
    record("tcc_add_symbol");
    let state = unsafe { fake(s) };
    let name = unsafe { text(name) }.to_string();
    state.symbols.push((name, val as *mut c_void));
    0
}

unsafe extern "C" fn tcc_output_file(_s: *mut TCCState, _filename: *const c_char) -> c_int {
    record("tcc_output_file");
    0
}

unsafe extern "C" fn tcc_run(s: *mut TCCState, argc: c_int, _argv: *mut *mut c_char) -> c_int {
    record("tcc_run");
    let state = unsafe { fake(s) };
    if state.unresolved {
        report(state, "tcc: error: undefined symbol 'undefined_fn'");
        return -1;
    }
    argc
}

unsafe extern "C" fn tcc_relocate(s: *mut TCCState, dest: *mut c_void) -> c_int {
    record("tcc_relocate");
    let state = unsafe { fake(s) };
    if state.unresolved {
        report(state, "tcc: error: undefined symbol 'undefined_fn'");
        return -1;
    }
    if dest.is_null() {
        return IMAGE_SIZE as c_int;
    }
    if dest != TCC_RELOCATE_AUTO {
        unsafe { ptr::write_bytes(dest.cast::<u8>(), IMAGE_FILL, IMAGE_SIZE) };
    }
    0
}

unsafe extern "C" fn tcc_get_symbol(s: *mut TCCState, name: *const c_char) -> *mut c_void {
    record("tcc_get_symbol");
    let state = unsafe { fake(s) };
    let name = unsafe { text(name) };
    state
        .symbols
        .iter()
        .find(|(symbol, _)| symbol == name)
        .map_or(ptr::null_mut(), |(_, address)| *address)
}

/// The stub entry-point table. Shared by every test thread; the call log and
/// switches are per thread.
pub(crate) fn library() -> &'static LibTcc {
    static LIBRARY: OnceLock<LibTcc> = OnceLock::new();
    LIBRARY.get_or_init(|| {
        LibTcc::from_fns(TccFns {
            tcc_new,
            tcc_delete,
            tcc_set_lib_path,
            tcc_set_error_func,
            tcc_set_options,
            tcc_add_include_path,
            tcc_add_sysinclude_path,
            tcc_define_symbol,
            tcc_undefine_symbol,
            tcc_add_file,
            tcc_compile_string,
            tcc_set_output_type,
            tcc_add_library_path,
            tcc_add_library,
            tcc_add_symbol,
            tcc_output_file,
            tcc_run,
            tcc_relocate,
            tcc_get_symbol,
        })
    })
}
