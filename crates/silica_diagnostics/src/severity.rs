//! How serious a graph finding is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The weight a checker attaches to a finding.
///
/// Declaration order is the severity order, so the derived `Ord` makes
/// `Error` compare greatest and a sink can reduce a batch of findings to its
/// worst one with a plain `max`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Severity {
    /// A suggestion for the design, not a defect (e.g., a wider bus than the
    /// propagated value needs).
    Help,
    /// Context attached to another finding, such as the entry that sourced a
    /// flagged dependency.
    Note,
    /// A questionable construct the graph rules still accept, like a port
    /// left floating before scheduling.
    Warning,
    /// A violated graph invariant; downstream consumers cannot trust the
    /// design until it is fixed.
    Error,
}

impl Severity {
    /// Whether this finding alone makes the run fail.
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Help => "help",
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_the_maximum() {
        let all = [
            Severity::Help,
            Severity::Note,
            Severity::Warning,
            Severity::Error,
        ];
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(all.iter().max(), Some(&Severity::Error));
    }

    #[test]
    fn only_errors_fail_the_run() {
        assert!(Severity::Error.is_error());
        assert!(!Severity::Warning.is_error());
        assert!(!Severity::Note.is_error());
        assert!(!Severity::Help.is_error());
    }

    #[test]
    fn display_names() {
        assert_eq!(Severity::Error.to_string(), "error");
        assert_eq!(Severity::Help.to_string(), "help");
    }
}
