//! Structured diagnostic messages with severity, codes, and subjects.

use crate::code::DiagnosticCode;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// A structured diagnostic message.
///
/// Diagnostics are the mechanism for reporting errors, warnings, and notes
/// about a design graph. Each diagnostic includes:
/// - A severity level and unique code
/// - A primary message
/// - An optional subject naming the graph entity the finding is about
///   (there is no source text to span in the IR, so subjects are names)
/// - Optional explanatory notes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The unique code identifying the type of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// The graph entity the finding is about, if any (e.g., `"component #3"`).
    pub subject: Option<String>,
    /// Explanatory footnotes (e.g., "note: ...").
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates a new error diagnostic with the given code and message.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            subject: None,
            notes: Vec::new(),
        }
    }

    /// Creates a new warning diagnostic with the given code and message.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            subject: None,
            notes: Vec::new(),
        }
    }

    /// Sets the subject of this diagnostic.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Category;

    #[test]
    fn create_error() {
        let code = DiagnosticCode::new(Category::Drc, 101);
        let diag = Diagnostic::error(code, "used bus lacks a value");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "used bus lacks a value");
        assert_eq!(format!("{}", diag.code), "D101");
    }

    #[test]
    fn create_warning() {
        let code = DiagnosticCode::new(Category::Warning, 201);
        let diag = Diagnostic::warning(code, "unused port");
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn builder_methods() {
        let code = DiagnosticCode::new(Category::Drc, 102);
        let diag = Diagnostic::error(code, "unconnected used port")
            .with_subject("component #7")
            .with_note("ports on procedure-body boundaries are exempt");
        assert_eq!(diag.subject.as_deref(), Some("component #7"));
        assert_eq!(diag.notes.len(), 1);
    }
}
