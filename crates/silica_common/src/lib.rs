//! Shared foundational types used across the Silica synthesis compiler.
//!
//! This crate provides interned identifiers and the common result types
//! shared by the IR core and its consumers.

#![warn(missing_docs)]

pub mod ident;
pub mod result;

pub use ident::{Ident, Interner};
pub use result::{InternalError, SilicaResult};
