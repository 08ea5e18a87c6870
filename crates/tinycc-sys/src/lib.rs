//! Raw libtcc entry points.
//!
//! libtcc is not linked at build time. The shared library is opened on first
//! use through the platform loader and every entry point is resolved into a
//! [`TccFns`] table. The table is plain function pointers, so callers that want
//! to exercise code without the real library can build one from their own
//! `extern "C"` functions with [`LibTcc::from_fns`].
//!
//! Nothing in this crate checks return values or ownership. See the `tinycc`
//! crate for the safe wrapper.

use libloading::Library;
use std::ffi::{OsStr, OsString, c_char, c_int, c_void};
use std::fmt;
use std::ops::Deref;
use std::sync::OnceLock;
use tracing::debug;

/// Opaque compilation state owned by libtcc.
#[repr(C)]
pub struct TCCState {
    _private: [u8; 0],
}

// Output types accepted by `tcc_set_output_type`.
pub const TCC_OUTPUT_MEMORY: c_int = 1;
pub const TCC_OUTPUT_EXE: c_int = 2;
pub const TCC_OUTPUT_DLL: c_int = 3;
pub const TCC_OUTPUT_OBJ: c_int = 4;
pub const TCC_OUTPUT_PREPROCESS: c_int = 5;

/// Destination for `tcc_relocate` that lets libtcc allocate and own the memory.
pub const TCC_RELOCATE_AUTO: *mut c_void = 1 as *mut c_void;

/// Environment variable naming an explicit path to the shared library.
pub const LIBRARY_ENV: &str = "TINYCC_LIBRARY";

pub type TCCErrorFunc = unsafe extern "C" fn(opaque: *mut c_void, msg: *const c_char);

pub type TccNewFn = unsafe extern "C" fn() -> *mut TCCState;
pub type TccDeleteFn = unsafe extern "C" fn(s: *mut TCCState);
pub type TccSetLibPathFn = unsafe extern "C" fn(s: *mut TCCState, path: *const c_char);
pub type TccSetErrorFuncFn =
    unsafe extern "C" fn(s: *mut TCCState, opaque: *mut c_void, func: Option<TCCErrorFunc>);
pub type TccSetOptionsFn = unsafe extern "C" fn(s: *mut TCCState, str: *const c_char) -> c_int;
pub type TccAddIncludePathFn =
    unsafe extern "C" fn(s: *mut TCCState, pathname: *const c_char) -> c_int;
pub type TccDefineSymbolFn =
    unsafe extern "C" fn(s: *mut TCCState, sym: *const c_char, value: *const c_char);
pub type TccUndefineSymbolFn = unsafe extern "C" fn(s: *mut TCCState, sym: *const c_char);
pub type TccAddFileFn = unsafe extern "C" fn(s: *mut TCCState, filename: *const c_char) -> c_int;
pub type TccCompileStringFn = unsafe extern "C" fn(s: *mut TCCState, buf: *const c_char) -> c_int;
pub type TccSetOutputTypeFn = unsafe extern "C" fn(s: *mut TCCState, output_type: c_int) -> c_int;
pub type TccAddLibraryFn = unsafe extern "C" fn(s: *mut TCCState, name: *const c_char) -> c_int;
pub type TccAddSymbolFn =
    unsafe extern "C" fn(s: *mut TCCState, name: *const c_char, val: *const c_void) -> c_int;
pub type TccOutputFileFn =
    unsafe extern "C" fn(s: *mut TCCState, filename: *const c_char) -> c_int;
pub type TccRunFn =
    unsafe extern "C" fn(s: *mut TCCState, argc: c_int, argv: *mut *mut c_char) -> c_int;
pub type TccRelocateFn = unsafe extern "C" fn(s: *mut TCCState, ptr: *mut c_void) -> c_int;
pub type TccGetSymbolFn =
    unsafe extern "C" fn(s: *mut TCCState, name: *const c_char) -> *mut c_void;

/// One function pointer per libtcc entry point.
#[derive(Clone, Copy)]
pub struct TccFns {
    pub tcc_new: TccNewFn,
    pub tcc_delete: TccDeleteFn,
    pub tcc_set_lib_path: TccSetLibPathFn,
    pub tcc_set_error_func: TccSetErrorFuncFn,
    pub tcc_set_options: TccSetOptionsFn,
    pub tcc_add_include_path: TccAddIncludePathFn,
    pub tcc_add_sysinclude_path: TccAddIncludePathFn,
    pub tcc_define_symbol: TccDefineSymbolFn,
    pub tcc_undefine_symbol: TccUndefineSymbolFn,
    pub tcc_add_file: TccAddFileFn,
    pub tcc_compile_string: TccCompileStringFn,
    pub tcc_set_output_type: TccSetOutputTypeFn,
    pub tcc_add_library_path: TccAddIncludePathFn,
    pub tcc_add_library: TccAddLibraryFn,
    pub tcc_add_symbol: TccAddSymbolFn,
    pub tcc_output_file: TccOutputFileFn,
    pub tcc_run: TccRunFn,
    pub tcc_relocate: TccRelocateFn,
    pub tcc_get_symbol: TccGetSymbolFn,
}

/// A resolved libtcc entry-point table.
///
/// When the table came from [`LibTcc::open`] the library handle is kept here,
/// so the function pointers stay valid for as long as the table lives.
pub struct LibTcc {
    fns: TccFns,
    library: Option<Library>,
}

macro_rules! resolve {
    ($library:expr, $name:ident: $ty:ty) => {{
        // SAFETY: `$ty` matches the libtcc prototype of `$name`.
        let symbol = unsafe { $library.get::<$ty>(concat!(stringify!($name), "\0").as_bytes())? };
        *symbol
    }};
}

impl LibTcc {
    /// Builds a table from functions supplied by the caller.
    pub fn from_fns(fns: TccFns) -> Self {
        Self {
            fns,
            library: None,
        }
    }

    /// Opens the shared library at `path` and resolves every entry point.
    ///
    /// # Safety
    /// Loading a library runs its initialisers. `path` must name a libtcc build
    /// whose exported functions have the prototypes declared in this crate.
    pub unsafe fn open(path: impl AsRef<OsStr>) -> Result<Self, libloading::Error> {
        let library = unsafe { Library::new(path.as_ref()) }?;

        let fns = TccFns {
            tcc_new: resolve!(library, tcc_new: TccNewFn),
            tcc_delete: resolve!(library, tcc_delete: TccDeleteFn),
            tcc_set_lib_path: resolve!(library, tcc_set_lib_path: TccSetLibPathFn),
            tcc_set_error_func: resolve!(library, tcc_set_error_func: TccSetErrorFuncFn),
            tcc_set_options: resolve!(library, tcc_set_options: TccSetOptionsFn),
            tcc_add_include_path: resolve!(library, tcc_add_include_path: TccAddIncludePathFn),
            tcc_add_sysinclude_path: resolve!(library, tcc_add_sysinclude_path: TccAddIncludePathFn),
            tcc_define_symbol: resolve!(library, tcc_define_symbol: TccDefineSymbolFn),
            tcc_undefine_symbol: resolve!(library, tcc_undefine_symbol: TccUndefineSymbolFn),
            tcc_add_file: resolve!(library, tcc_add_file: TccAddFileFn),
            tcc_compile_string: resolve!(library, tcc_compile_string: TccCompileStringFn),
            tcc_set_output_type: resolve!(library, tcc_set_output_type: TccSetOutputTypeFn),
            tcc_add_library_path: resolve!(library, tcc_add_library_path: TccAddIncludePathFn),
            tcc_add_library: resolve!(library, tcc_add_library: TccAddLibraryFn),
            tcc_add_symbol: resolve!(library, tcc_add_symbol: TccAddSymbolFn),
            tcc_output_file: resolve!(library, tcc_output_file: TccOutputFileFn),
            tcc_run: resolve!(library, tcc_run: TccRunFn),
            tcc_relocate: resolve!(library, tcc_relocate: TccRelocateFn),
            tcc_get_symbol: resolve!(library, tcc_get_symbol: TccGetSymbolFn),
        };

        Ok(Self {
            fns,
            library: Some(library),
        })
    }

    /// Whether this table is backed by a loaded shared library.
    pub fn is_loaded_library(&self) -> bool {
        self.library.is_some()
    }
}

impl Deref for LibTcc {
    type Target = TccFns;

    fn deref(&self) -> &TccFns {
        &self.fns
    }
}

impl fmt::Debug for LibTcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibTcc")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

static LIBTCC: OnceLock<Result<LibTcc, String>> = OnceLock::new();

/// Platform file names tried when [`LIBRARY_ENV`] is not set.
pub fn default_library_names() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["libtcc.dll", "tcc.dll"]
    } else if cfg!(target_os = "macos") {
        &["libtcc.dylib", "libtcc.so"]
    } else {
        &["libtcc.so", "libtcc.so.1"]
    }
}

fn library_candidates() -> Vec<OsString> {
    match std::env::var_os(LIBRARY_ENV) {
        Some(path) if !path.is_empty() => vec![path],
        _ => default_library_names().iter().map(OsString::from).collect(),
    }
}

fn search_path_hint() -> &'static str {
    if cfg!(target_os = "windows") {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

fn open_default() -> Result<LibTcc, String> {
    let candidates = library_candidates();
    let mut failures = Vec::with_capacity(candidates.len());

    for candidate in &candidates {
        // SAFETY: the candidates are libtcc names chosen by the platform or the user.
        match unsafe { LibTcc::open(candidate) } {
            Ok(lib) => {
                debug!(target: "tinycc::sys", library = ?candidate, "loaded libtcc");
                return Ok(lib);
            }
            Err(err) => {
                debug!(target: "tinycc::sys", library = ?candidate, error = %err, "libtcc candidate rejected");
                failures.push(format!("{}: {err}", candidate.to_string_lossy()));
            }
        }
    }

    Err(format!(
        "could not load libtcc ({}). Add the directory containing it to {} \
         or set {} to the full path of the library",
        failures.join("; "),
        search_path_hint(),
        LIBRARY_ENV
    ))
}

/// Returns the process-wide libtcc table, loading it on first call.
///
/// The load is attempted once. A failure is remembered and returned to every
/// later caller.
pub fn load() -> Result<&'static LibTcc, &'static str> {
    LIBTCC
        .get_or_init(open_default)
        .as_ref()
        .map_err(String::as_str)
}
