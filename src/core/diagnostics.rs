use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::warn;

/// A message libtcc passed to the error callback.
///
/// libtcc reports warnings and errors through the same callback. The kind is
/// recovered from the text, which carries a `warning:` or `error:` tag after
/// the location prefix.
///
/// ```rust
/// use tinycc::prelude::{Diagnostic, DiagnosticKind};
///
/// let diagnostic = Diagnostic::parse("<string>:3: warning: implicit declaration of function 'f'");
/// assert_eq!(diagnostic.kind, DiagnosticKind::Warning);
/// assert_eq!(diagnostic.location(), Some("<string>:3"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The full text as libtcc produced it.
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

const WARNING_TAG: &str = "warning: ";
const ERROR_TAG: &str = "error: ";

impl Diagnostic {
    pub fn parse(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if message.starts_with(WARNING_TAG) || message.contains(": warning: ") {
            DiagnosticKind::Warning
        } else {
            DiagnosticKind::Error
        };
        Diagnostic { kind, message }
    }

    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticKind::Error
    }

    /// The `file:line` prefix, if libtcc attached one.
    pub fn location(&self) -> Option<&str> {
        let tag = match self.kind {
            DiagnosticKind::Warning => WARNING_TAG,
            DiagnosticKind::Error => ERROR_TAG,
        };
        let end = self.message.find(&format!(": {tag}"))?;
        let location = &self.message[..end];
        (!location.is_empty() && location != "tcc").then_some(location)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// User hook run for every diagnostic, in addition to the capture.
pub type DiagnosticHandler = Box<dyn FnMut(&Diagnostic)>;

/// Per-state capture target for the error callback.
///
/// The state hands a pointer to its boxed sink to libtcc as the callback's
/// opaque argument, so the address must stay put until `tcc_delete` has run.
#[derive(Default)]
pub(crate) struct DiagnosticSink {
    last: RefCell<Option<Diagnostic>>,
    reported: Cell<u64>,
    errors: Cell<u64>,
    handler: RefCell<Option<DiagnosticHandler>>,
}

impl DiagnosticSink {
    pub(crate) fn record(&self, diagnostic: Diagnostic) {
        warn!(target: "tinycc::diagnostic", kind = ?diagnostic.kind, "{}", diagnostic.message);

        self.reported.set(self.reported.get().wrapping_add(1));
        if diagnostic.is_error() {
            self.errors.set(self.errors.get().wrapping_add(1));
        }

        // A handler that re-enters the state while we hold the borrow is skipped.
        if let Ok(mut handler) = self.handler.try_borrow_mut() {
            if let Some(handler) = handler.as_mut() {
                // Unwinding out of the extern "C" trampoline would abort.
                let _ = catch_unwind(AssertUnwindSafe(|| handler(&diagnostic)));
            }
        }

        if let Ok(mut last) = self.last.try_borrow_mut() {
            *last = Some(diagnostic);
        }
    }

    pub(crate) fn last(&self) -> Option<Diagnostic> {
        self.last.borrow().clone()
    }

    pub(crate) fn last_message(&self) -> Option<String> {
        self.last.borrow().as_ref().map(|d| d.message.clone())
    }

    /// Number of callback invocations so far. Comparing two readings tells
    /// whether a call reported anything.
    pub(crate) fn reported(&self) -> u64 {
        self.reported.get()
    }

    /// Like [`reported`](Self::reported), counting errors only.
    pub(crate) fn errors(&self) -> u64 {
        self.errors.get()
    }

    pub(crate) fn set_handler(&self, handler: Option<DiagnosticHandler>) {
        *self.handler.borrow_mut() = handler;
    }
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticSink")
            .field("last", &self.last)
            .field("reported", &self.reported)
            .field("errors", &self.errors)
            .field("has_handler", &self.handler.borrow().is_some())
            .finish()
    }
}
