pub mod builder;
pub mod diagnostics;
pub mod error;
pub mod state;
