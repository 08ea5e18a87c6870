use crate::core::diagnostics::{Diagnostic, DiagnosticSink};
use crate::core::error::{Stage, TccError, TccResult};
use crate::internal::callback::cvoid_error_callback;
use crate::internal::utils::{path_to_cstring, to_cstring};
use crate::types::{OutputType, Phase};
use std::ffi::{CString, c_char, c_int, c_void};
use std::fmt;
use std::mem;
use std::path::Path;
use std::ptr::{self, NonNull};
use tinycc_sys::{LibTcc, TCC_RELOCATE_AUTO, TCCState};
use tracing::{debug, trace};

/// Signature `main` is called with when a relocated state is run.
type MainFn = unsafe extern "C" fn(c_int, *mut *mut c_char) -> c_int;

/// One libtcc compilation state.
///
/// A state is configured, fed sources and libraries, then either written to a
/// file or relocated in memory. Once relocated, symbols can be looked up and
/// called. Dropping the state (or calling [`TccState::close`]) releases the
/// native handle.
///
/// Every failure libtcc reports through its error callback is captured and
/// attached to the returned [`TccError`]. The latest one is also available
/// from [`TccState::last_error`].
///
/// The state holds a raw pointer and is neither `Send` nor `Sync`. Whether
/// several states may coexist in one process is up to the libtcc build in use;
/// releases before 0.9.28 keep global compiler state and are not reentrant.
pub struct TccState {
    inner: NonNull<TCCState>,
    api: &'static LibTcc,
    sink: Box<DiagnosticSink>,
    output_type: OutputType,
    phase: Phase,
    relocation_size: Option<usize>,
    /// Host memory holding the code placed by `relocate_to_bytes`.
    image: Option<Box<[u8]>>,
}

impl TccState {
    /// Creates a state that compiles into memory.
    pub fn new() -> TccResult<Self> {
        Self::with_output(OutputType::Memory)
    }

    /// Creates a state producing `output_type`.
    pub fn with_output(output_type: OutputType) -> TccResult<Self> {
        let api = tinycc_sys::load().map_err(|err| TccError::Initialization(err.to_string()))?;
        Self::create(api, output_type, None)
    }

    /// Creates a state on an explicit entry-point table.
    pub fn with_library(api: &'static LibTcc, output_type: OutputType) -> TccResult<Self> {
        Self::create(api, output_type, None)
    }

    /// The library path has to be known before the output type is set, since
    /// libtcc derives its default include and library directories from it then.
    pub(crate) fn create(
        api: &'static LibTcc,
        output_type: OutputType,
        lib_path: Option<&Path>,
    ) -> TccResult<Self> {
        // SAFETY: tcc_new has no preconditions.
        let raw = unsafe { (api.tcc_new)() };
        let inner = NonNull::new(raw)
            .ok_or_else(|| TccError::Initialization("tcc_new returned a null state".to_string()))?;

        // From here on Drop releases the handle, whatever fails next.
        let mut state = TccState {
            inner,
            api,
            sink: Box::new(DiagnosticSink::default()),
            output_type,
            phase: Phase::Configuring,
            relocation_size: None,
            image: None,
        };

        // SAFETY: the sink is boxed and owned by the state, and the state
        // deletes the native handle before the box is freed.
        unsafe {
            (api.tcc_set_error_func)(state.raw(), state.sink_ptr(), Some(cvoid_error_callback));
        }

        if let Some(path) = lib_path {
            state.set_lib_path(path)?;
        }
        state.set_output_type(output_type)?;

        debug!(target: "tinycc::state", state = ?state.inner, ?output_type, "created state");
        Ok(state)
    }

    fn raw(&self) -> *mut TCCState {
        self.inner.as_ptr()
    }

    fn sink_ptr(&self) -> *mut c_void {
        &*self.sink as *const DiagnosticSink as *mut c_void
    }

    fn ensure_phase(&self, operation: &'static str, allowed: &[Phase]) -> TccResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(TccError::InvalidState {
                operation,
                phase: self.phase,
            })
        }
    }

    fn ensure_configuring(&self, operation: &'static str) -> TccResult<()> {
        self.ensure_phase(operation, &[Phase::Configuring])
    }

    fn check(&self, operation: &'static str, stage: Stage, status: c_int) -> TccResult<c_int> {
        trace!(target: "tinycc::state", operation, status, "native call returned");
        stage.check(status, || self.sink.last_message())
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The raw handle, for calling entry points this crate does not wrap.
    /// It stays owned by the state.
    pub fn as_ptr(&self) -> *mut TCCState {
        self.raw()
    }

    /// Text of the most recent diagnostic, if libtcc reported any.
    pub fn last_error(&self) -> Option<String> {
        self.sink.last_message()
    }

    pub fn last_diagnostic(&self) -> Option<Diagnostic> {
        self.sink.last()
    }

    /// How many diagnostics libtcc has reported for this state, warnings included.
    pub fn diagnostic_count(&self) -> u64 {
        self.sink.reported()
    }

    /// Runs `handler` for every diagnostic libtcc reports, warnings included.
    ///
    /// The handler runs inside the native callback. A panic in it is caught
    /// and discarded.
    pub fn set_diagnostic_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&Diagnostic) + 'static,
    {
        self.sink.set_handler(Some(Box::new(handler)));
    }

    pub fn clear_diagnostic_handler(&mut self) {
        self.sink.set_handler(None);
    }

    // Configuration

    /// Sets the directory libtcc loads `libtcc1.a` and its own headers from.
    ///
    /// libtcc derives its default include and library directories from this
    /// path when the output type is set, which happens during construction.
    /// Called afterwards it only changes where `libtcc1.a` is found. Use
    /// [`TccStateBuilder::lib_path`](crate::core::builder::TccStateBuilder::lib_path)
    /// to relocate the whole installation.
    pub fn set_lib_path(&mut self, path: impl AsRef<Path>) -> TccResult<()> {
        self.ensure_configuring("set_lib_path")?;
        let path = path_to_cstring(path.as_ref())?;
        unsafe { (self.api.tcc_set_lib_path)(self.raw(), path.as_ptr()) };
        trace!(target: "tinycc::state", operation = "set_lib_path", "native call returned");
        Ok(())
    }

    /// Applies command-line style options such as `"-O2 -Wall"`.
    pub fn set_options(&mut self, options: &str) -> TccResult<()> {
        self.ensure_configuring("set_options")?;
        let options = to_cstring(options)?;
        let status = unsafe { (self.api.tcc_set_options)(self.raw(), options.as_ptr()) };
        self.check("set_options", Stage::Configuration("set_options"), status)?;
        Ok(())
    }

    pub fn add_include_path(&mut self, path: impl AsRef<Path>) -> TccResult<()> {
        self.ensure_configuring("add_include_path")?;
        let path = path_to_cstring(path.as_ref())?;
        let status = unsafe { (self.api.tcc_add_include_path)(self.raw(), path.as_ptr()) };
        self.check("add_include_path", Stage::Configuration("add_include_path"), status)?;
        Ok(())
    }

    pub fn add_sysinclude_path(&mut self, path: impl AsRef<Path>) -> TccResult<()> {
        self.ensure_configuring("add_sysinclude_path")?;
        let path = path_to_cstring(path.as_ref())?;
        let status = unsafe { (self.api.tcc_add_sysinclude_path)(self.raw(), path.as_ptr()) };
        self.check("add_sysinclude_path", Stage::Configuration("add_sysinclude_path"), status)?;
        Ok(())
    }

    /// Defines a preprocessor symbol. Without a value libtcc defines it as `1`,
    /// like `-DNAME` on the command line. Pass `Some("")` for a symbol that
    /// expands to nothing.
    pub fn define_symbol(&mut self, name: &str, value: Option<&str>) -> TccResult<()> {
        self.ensure_configuring("define_symbol")?;
        let name = to_cstring(name)?;
        let value = value.map(to_cstring).transpose()?;
        let value_ptr = value.as_ref().map_or(ptr::null(), |value| value.as_ptr());
        unsafe { (self.api.tcc_define_symbol)(self.raw(), name.as_ptr(), value_ptr) };
        trace!(target: "tinycc::state", operation = "define_symbol", "native call returned");
        Ok(())
    }

    pub fn undefine_symbol(&mut self, name: &str) -> TccResult<()> {
        self.ensure_configuring("undefine_symbol")?;
        let name = to_cstring(name)?;
        unsafe { (self.api.tcc_undefine_symbol)(self.raw(), name.as_ptr()) };
        trace!(target: "tinycc::state", operation = "undefine_symbol", "native call returned");
        Ok(())
    }

    pub fn set_output_type(&mut self, output_type: OutputType) -> TccResult<()> {
        self.ensure_configuring("set_output_type")?;
        let status = unsafe { (self.api.tcc_set_output_type)(self.raw(), output_type.into()) };
        self.check("set_output_type", Stage::Configuration("set_output_type"), status)?;
        self.output_type = output_type;
        Ok(())
    }

    // Compilation

    /// Compiles one translation unit held in memory. Can be called repeatedly.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile_string(&mut self, source: &str) -> TccResult<()> {
        self.ensure_configuring("compile_string")?;
        let source = to_cstring(source)?;
        let status = unsafe { (self.api.tcc_compile_string)(self.raw(), source.as_ptr()) };
        self.check("compile_string", Stage::Compile, status)?;
        Ok(())
    }

    /// Adds a C source, object, archive or shared library file. libtcc picks
    /// the handling from the extension.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> TccResult<()> {
        self.ensure_configuring("add_file")?;
        let path = path_to_cstring(path.as_ref())?;
        let status = unsafe { (self.api.tcc_add_file)(self.raw(), path.as_ptr()) };
        self.check("add_file", Stage::Compile, status)?;
        Ok(())
    }

    // Linking

    pub fn add_library_path(&mut self, path: impl AsRef<Path>) -> TccResult<()> {
        self.ensure_configuring("add_library_path")?;
        let path = path_to_cstring(path.as_ref())?;
        let status = unsafe { (self.api.tcc_add_library_path)(self.raw(), path.as_ptr()) };
        self.check("add_library_path", Stage::Link("add_library_path"), status)?;
        Ok(())
    }

    /// Links against `name`, given without the `lib` prefix or extension.
    pub fn add_library(&mut self, name: &str) -> TccResult<()> {
        self.ensure_configuring("add_library")?;
        let name = to_cstring(name)?;
        let status = unsafe { (self.api.tcc_add_library)(self.raw(), name.as_ptr()) };
        self.check("add_library", Stage::Link("add_library"), status)?;
        Ok(())
    }

    /// Makes a host symbol visible to compiled code under `name`.
    ///
    /// libtcc only records the address. Compiled code that uses it must agree
    /// with what it points to.
    pub fn add_symbol(&mut self, name: &str, address: *const c_void) -> TccResult<()> {
        self.ensure_configuring("add_symbol")?;
        let name = to_cstring(name)?;
        let status = unsafe { (self.api.tcc_add_symbol)(self.raw(), name.as_ptr(), address) };
        self.check("add_symbol", Stage::Link("add_symbol"), status)?;
        Ok(())
    }

    /// Writes the compiled output to `path` in the configured output type.
    pub fn output_file(&mut self, path: impl AsRef<Path>) -> TccResult<()> {
        self.ensure_configuring("output_file")?;
        let path = path_to_cstring(path.as_ref())?;
        let status = unsafe { (self.api.tcc_output_file)(self.raw(), path.as_ptr()) };
        self.check("output_file", Stage::Link("output_file"), status)?;
        debug!(target: "tinycc::state", output_type = ?self.output_type, "wrote output file");
        Ok(())
    }

    /// Runs the compiled program's `main` with `args` as its argument vector
    /// and returns its exit code. Empty `args` passes a single empty argument.
    ///
    /// A state that is still configuring is relocated by libtcc as part of the
    /// call. A state that is already relocated has its `main` called directly.
    ///
    /// # Safety
    /// The compiled program runs in this process with no isolation. Whatever it
    /// does to memory, signals or the process is on the caller.
    pub unsafe fn run(&mut self, args: &[&str]) -> TccResult<c_int> {
        self.ensure_phase("run", &[Phase::Configuring, Phase::Relocated])?;

        let args = if args.is_empty() {
            vec![CString::default()]
        } else {
            args.iter()
                .map(|arg| to_cstring(arg))
                .collect::<TccResult<Vec<_>>>()?
        };
        let argc = args.len() as c_int;
        let mut argv: Vec<*mut c_char> = args
            .iter()
            .map(|arg| arg.as_ptr() as *mut c_char)
            .chain(std::iter::once(ptr::null_mut()))
            .collect();

        if self.phase == Phase::Relocated {
            // SAFETY: a C `main` taking (argc, argv) has this signature.
            let main = unsafe { self.get_function::<MainFn>("main")? }.ok_or_else(|| TccError::Link {
                operation: "run",
                message: "main is not defined".to_string(),
            })?;
            debug!(target: "tinycc::state", argc, "calling relocated main");
            return Ok(unsafe { main(argc, argv.as_mut_ptr()) });
        }

        let errors_before = self.sink.errors();
        let code = unsafe { (self.api.tcc_run)(self.raw(), argc, argv.as_mut_ptr()) };
        trace!(target: "tinycc::state", operation = "run", code, "native call returned");

        // tcc_run reports a failed relocation as -1, which a program may also
        // return. Only a fresh error diagnostic tells the two apart.
        if code == -1 && self.sink.errors() != errors_before {
            return Err(Stage::Link("run").error(self.sink.last_message()));
        }
        self.phase = Phase::Relocated;
        Ok(code)
    }

    // Relocation

    /// Relocates into memory that libtcc allocates and frees with the state.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn relocate(&mut self) -> TccResult<()> {
        self.ensure_configuring("relocate")?;
        let status = unsafe { (self.api.tcc_relocate)(self.raw(), TCC_RELOCATE_AUTO) };
        self.check("relocate", Stage::Link("relocate"), status)?;
        self.phase = Phase::Relocated;
        debug!(target: "tinycc::state", "relocated into library memory");
        Ok(())
    }

    /// Number of bytes the relocated image needs.
    ///
    /// libtcc finishes linking to answer this, so the state moves to
    /// [`Phase::SizeQueried`] and can only be relocated into a caller buffer
    /// afterwards. Later queries return the cached size.
    pub fn relocation_size(&mut self) -> TccResult<usize> {
        self.ensure_phase("relocation_size", &[Phase::Configuring, Phase::SizeQueried])?;
        if let Some(size) = self.relocation_size {
            return Ok(size);
        }

        let status = unsafe { (self.api.tcc_relocate)(self.raw(), ptr::null_mut()) };
        let size = self.check("relocation_size", Stage::Link("relocate"), status)? as usize;
        self.relocation_size = Some(size);
        self.phase = Phase::SizeQueried;
        debug!(target: "tinycc::state", size, "queried relocation size");
        Ok(size)
    }

    /// Relocates into `buffer` and returns the number of bytes used.
    ///
    /// Resolved symbols point into `buffer`, so it must outlive every use of
    /// them. Marking the pages executable is left to libtcc.
    pub fn relocate_into(&mut self, buffer: &mut [u8]) -> TccResult<usize> {
        let required = self.relocation_size()?;
        if buffer.len() < required {
            return Err(TccError::BufferTooSmall {
                required,
                provided: buffer.len(),
            });
        }

        let status = unsafe { (self.api.tcc_relocate)(self.raw(), buffer.as_mut_ptr().cast()) };
        self.check("relocate_into", Stage::Link("relocate"), status)?;
        self.phase = Phase::Relocated;
        debug!(target: "tinycc::state", size = required, "relocated into host buffer");
        Ok(required)
    }

    /// Relocates into a buffer owned by the state and returns a copy of the
    /// image. Symbols stay valid until the state is released.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn relocate_to_bytes(&mut self) -> TccResult<Box<[u8]>> {
        let required = self.relocation_size()?;
        let mut image = vec![0u8; required].into_boxed_slice();
        self.relocate_into(&mut image)?;
        let bytes = image.clone();
        self.image = Some(image);
        Ok(bytes)
    }

    // Symbols

    /// Address of `name` in the relocated image, or `None` if it is not defined.
    pub fn get_symbol(&self, name: &str) -> TccResult<Option<NonNull<c_void>>> {
        self.ensure_phase("get_symbol", &[Phase::Relocated])?;
        let name = to_cstring(name)?;
        let address = unsafe { (self.api.tcc_get_symbol)(self.raw(), name.as_ptr()) };
        Ok(NonNull::new(address))
    }

    /// Looks up `name` and reinterprets its address as `F`.
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the definition of `name`,
    /// and it must not be called after the state is released.
    pub unsafe fn get_function<F: Copy>(&self, name: &str) -> TccResult<Option<F>> {
        const {
            assert!(
                mem::size_of::<F>() == mem::size_of::<*mut c_void>(),
                "get_function needs a pointer-sized function type"
            )
        };
        Ok(self
            .get_symbol(name)?
            .map(|address| unsafe { mem::transmute_copy::<*mut c_void, F>(&address.as_ptr()) }))
    }

    /// Releases the state now. Dropping it does the same.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for TccState {
    fn drop(&mut self) {
        // SAFETY: the handle came from tcc_new and is deleted only here. The
        // sink and image fields are dropped after this body returns.
        unsafe { (self.api.tcc_delete)(self.raw()) };
        debug!(target: "tinycc::state", state = ?self.inner, "released state");
    }
}

impl fmt::Debug for TccState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TccState")
            .field("inner", &self.inner)
            .field("output_type", &self.output_type)
            .field("phase", &self.phase)
            .field("relocation_size", &self.relocation_size)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}
