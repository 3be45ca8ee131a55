//! Design-rule checking for Silica IR graphs.
//!
//! The checker validates the invariants a propagated design is supposed to
//! uphold before it is handed to downstream consumers: every used endpoint
//! carries a propagated value, every used port is reachable from some
//! producer, and no bus-sourced bit indexes beyond the declared width of
//! its source bus. Findings are emitted through a
//! [`DiagnosticSink`](silica_diagnostics::DiagnosticSink); the checker
//! itself never panics on a rule violation. [`verify_design`] wraps the
//! same rules for callers that only need pass/fail.
//!
//! # Rules
//!
//! - **D101:** a used bus has no propagated value
//! - **D102:** a used port has no propagated value
//! - **D103:** a used port is not reached by any bus, boundary peer, or
//!   dependency
//! - **D104:** a bus-sourced bit indexes beyond its source bus's width

#![warn(missing_docs)]

mod checker;

pub use checker::{check_design, verify_design};
