use crate::types::Phase;
use std::ffi::{NulError, c_int};
use thiserror::Error;

pub type TccResult<T> = Result<T, TccError>;

/// Text used when libtcc fails without reporting anything to the error callback.
pub(crate) const NO_DIAGNOSTIC: &str = "no diagnostic reported";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TccError {
    /// libtcc could not be loaded or refused to create a state.
    #[error("libtcc initialization failed: {0}")]
    Initialization(String),

    #[error("{operation} failed: {message}")]
    Configuration {
        operation: &'static str,
        message: String,
    },

    #[error("compilation failed: {message}")]
    Compile { message: String },

    #[error("{operation} failed: {message}")]
    Link {
        operation: &'static str,
        message: String,
    },

    /// The call is not allowed in the current lifecycle phase.
    #[error("{operation} is not allowed once the state is {phase}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },

    #[error("relocation needs {required} bytes but the buffer holds {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    #[error("string conversion error: {0}")]
    StringConversion(#[from] NulError),
}

impl TccError {
    /// The diagnostic text carried by this error, when it came from libtcc.
    pub fn message(&self) -> Option<&str> {
        match self {
            TccError::Configuration { message, .. }
            | TccError::Compile { message }
            | TccError::Link { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether the caller broke the lifecycle order rather than libtcc failing.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            TccError::InvalidState { .. } | TccError::BufferTooSmall { .. }
        )
    }
}

/// Which error a negative status from a native call becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Configuration(&'static str),
    Compile,
    Link(&'static str),
}

impl Stage {
    pub(crate) fn error(self, message: Option<String>) -> TccError {
        let message = message.unwrap_or_else(|| NO_DIAGNOSTIC.to_string());
        match self {
            Stage::Configuration(operation) => TccError::Configuration { operation, message },
            Stage::Compile => TccError::Compile { message },
            Stage::Link(operation) => TccError::Link { operation, message },
        }
    }

    /// Turns a native status into a result. Every negative value is a failure.
    pub(crate) fn check(self, status: c_int, message: impl FnOnce() -> Option<String>) -> TccResult<c_int> {
        if status >= 0 {
            Ok(status)
        } else {
            Err(self.error(message()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn non_negative_status_passes_through() {
        assert_eq!(Stage::Compile.check(0, || None), Ok(0));
        assert_eq!(Stage::Link("relocate").check(4096, || None), Ok(4096));
    }

    #[test]
    fn negative_status_takes_the_captured_message() {
        let err = Stage::Configuration("set_options")
            .check(-1, || Some("tcc: error: invalid option".to_string()))
            .unwrap_err();

        assert_eq!(err.to_string(), "set_options failed: tcc: error: invalid option");
        assert_eq!(err.message(), Some("tcc: error: invalid option"));
    }

    #[test]
    fn missing_diagnostic_has_placeholder_message() {
        let err = Stage::Compile.check(-2, || None).unwrap_err();
        assert_eq!(
            err,
            TccError::Compile {
                message: NO_DIAGNOSTIC.to_string()
            }
        );
    }

    #[test]
    fn precondition_errors() {
        let invalid = TccError::InvalidState {
            operation: "output_file",
            phase: Phase::Relocated,
        };
        assert!(invalid.is_precondition());
        assert_eq!(invalid.message(), None);
        assert_eq!(
            invalid.to_string(),
            "output_file is not allowed once the state is relocated"
        );

        let small = TccError::BufferTooSmall {
            required: 128,
            provided: 64,
        };
        assert!(small.is_precondition());
        assert_eq!(
            small.to_string(),
            "relocation needs 128 bytes but the buffer holds 64"
        );

        let nul = TccError::from(CString::new("a\0b").unwrap_err());
        assert!(!nul.is_precondition());
    }
}
