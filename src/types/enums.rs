use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use tinycc_sys::{
    TCC_OUTPUT_DLL, TCC_OUTPUT_EXE, TCC_OUTPUT_MEMORY, TCC_OUTPUT_OBJ, TCC_OUTPUT_PREPROCESS,
};

/// The kind of artifact libtcc produces.
///
/// The discriminants are the values `tcc_set_output_type` expects, so a raw
/// value read back from C converts with `OutputType::try_from(raw)`.
///
/// ```rust
/// use tinycc::prelude::OutputType;
///
/// assert_eq!(i32::from(OutputType::Memory), 1);
/// assert_eq!(OutputType::try_from(4).unwrap(), OutputType::Object);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum OutputType {
    /// Compile and link into memory, ready for `relocate` or `run`.
    #[default]
    Memory = TCC_OUTPUT_MEMORY,
    /// Write an executable with `output_file`.
    Executable = TCC_OUTPUT_EXE,
    /// Write a shared library with `output_file`.
    SharedLibrary = TCC_OUTPUT_DLL,
    /// Write an object file with `output_file`.
    Object = TCC_OUTPUT_OBJ,
    /// Only run the preprocessor.
    Preprocess = TCC_OUTPUT_PREPROCESS,
}

impl OutputType {
    /// Whether the artifact is written out with `output_file` rather than
    /// kept in memory.
    pub fn produces_file(self) -> bool {
        !matches!(self, OutputType::Memory)
    }
}

/// Where a state is in its lifecycle.
///
/// Configuration, compilation and linking happen while `Configuring`.
/// Relocation moves the state to `Relocated`, after which only symbol lookup
/// and running are allowed. Release is not a phase: it consumes the state.
///
/// A size query leaves the state `SizeQueried`. libtcc finishes linking while
/// answering it, so the only way forward is relocation into a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Configuring,
    SizeQueried,
    Relocated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Configuring => write!(f, "configuring"),
            Phase::SizeQueried => write!(f, "size-queried"),
            Phase::Relocated => write!(f, "relocated"),
        }
    }
}
