//! Common result and error types for the Silica compiler.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable internal error (a bug in Silica), not a
/// user-facing condition. Recoverable findings are reported through
/// `silica_diagnostics` and the operation still returns `Ok`.
pub type SilicaResult<T> = Result<T, InternalError>;

/// An internal compiler error indicating a bug in Silica, not a user input problem.
///
/// These errors should never occur during normal operation. If one does occur,
/// it means there is a logic error in the compiler that should be fixed.
#[derive(Debug, thiserror::Error)]
#[error("internal compiler error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("graph inconsistency");
        assert_eq!(
            format!("{err}"),
            "internal compiler error: graph inconsistency"
        );
    }

    #[test]
    fn ok_path() {
        let r: SilicaResult<i32> = Ok(42);
        assert_eq!(r.ok(), Some(42));
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}
