//! Structured diagnostics for the Silica compiler.
//!
//! Graph passes and checkers report findings through a [`DiagnosticSink`]
//! rather than printing or panicking; a fresh sink is the no-op default for
//! callers that do not care about reports.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use severity::Severity;
pub use sink::DiagnosticSink;
