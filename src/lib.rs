//! Safe bindings to libtcc, the Tiny C Compiler library.
//!
//! libtcc is opened at runtime (see [`sys::load`]). A [`TccState`](core::state::TccState)
//! owns one compilation state: configure it, compile C sources, then write an
//! output file or relocate the code into memory and call it.
//!
//! ```rust,no_run
//! use tinycc::prelude::*;
//!
//! let mut state = TccState::new()?;
//! state.compile_string("int add(int a, int b) { return a + b; }")?;
//! state.relocate()?;
//!
//! let add = unsafe { state.get_function::<extern "C" fn(i32, i32) -> i32>("add")? };
//! assert_eq!(add.map(|add| add(2, 3)), Some(5));
//! # Ok::<(), TccError>(())
//! ```

pub mod core;
mod internal;

pub mod types;

pub use tinycc_sys as sys;

// Re-export main types
pub mod prelude {
    pub use crate::core::builder::TccStateBuilder;
    pub use crate::core::diagnostics::{Diagnostic, DiagnosticHandler, DiagnosticKind};
    pub use crate::core::error::{TccError, TccResult};
    pub use crate::core::state::TccState;
    pub use crate::types::{OutputType, Phase};
}
