use crate::core::error::{TccError, TccResult};
use crate::core::state::TccState;
use crate::types::OutputType;
use std::path::PathBuf;
use tinycc_sys::LibTcc;

/// Collects configuration and applies it to a fresh [`TccState`] in one go.
///
/// `build` applies the settings in a fixed order: library path, output type,
/// options, include paths, system include paths, defines, library paths and
/// finally libraries. The first failure is returned and the half-built state
/// is released.
///
/// ```rust,no_run
/// use tinycc::prelude::*;
///
/// let mut state = TccStateBuilder::new()
///     .include_path("include")
///     .define("NDEBUG", None)
///     .option("-Wall")
///     .build()?;
/// state.compile_string("int answer(void) { return 42; }")?;
/// # Ok::<(), TccError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct TccStateBuilder {
    output_type: OutputType,
    lib_path: Option<PathBuf>,
    options: Vec<String>,
    include_paths: Vec<PathBuf>,
    sysinclude_paths: Vec<PathBuf>,
    defines: Vec<(String, Option<String>)>,
    library_paths: Vec<PathBuf>,
    libraries: Vec<String>,
}

impl TccStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    pub fn lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lib_path = Some(path.into());
        self
    }

    /// Adds an option string. Each one is passed to `tcc_set_options` separately.
    pub fn option(mut self, options: impl Into<String>) -> Self {
        self.options.push(options.into());
        self
    }

    pub fn include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn sysinclude_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sysinclude_paths.push(path.into());
        self
    }

    pub fn define(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.defines.push((name.into(), value.map(str::to_string)));
        self
    }

    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_paths.push(path.into());
        self
    }

    pub fn library(mut self, name: impl Into<String>) -> Self {
        self.libraries.push(name.into());
        self
    }

    /// Builds on the process-wide libtcc.
    pub fn build(self) -> TccResult<TccState> {
        let api = tinycc_sys::load().map_err(|err| TccError::Initialization(err.to_string()))?;
        self.build_with(api)
    }

    /// Builds on an explicit entry-point table.
    pub fn build_with(self, api: &'static LibTcc) -> TccResult<TccState> {
        let mut state = TccState::create(api, self.output_type, self.lib_path.as_deref())?;

        for options in &self.options {
            state.set_options(options)?;
        }
        for path in &self.include_paths {
            state.add_include_path(path)?;
        }
        for path in &self.sysinclude_paths {
            state.add_sysinclude_path(path)?;
        }
        for (name, value) in &self.defines {
            state.define_symbol(name, value.as_deref())?;
        }
        for path in &self.library_paths {
            state.add_library_path(path)?;
        }
        for name in &self.libraries {
            state.add_library(name)?;
        }

        Ok(state)
    }
}
