//! The Silica intermediate representation.
//!
//! A hardware design is a mutable graph of [`Component`](component::Component)s
//! connected through typed signal endpoints: each component consumes values
//! through [`Port`](port::Port)s and produces them through the
//! [`Bus`](bus::Bus)es of its [`Exit`](exit::Exit)s. Control and data
//! dependencies between components are recorded as
//! [`Entry`](entry::Entry)/[`Dependency`](entry::Dependency) structures, and
//! composite components (blocks, decisions, generic modules) own a body of
//! child components bridged to the outside by `InBuf`/`OutBuf` adapters.
//!
//! All entities live in per-kind arenas inside a single [`Design`](design::Design)
//! value and refer to each other by opaque IDs; the mutation primitives on
//! `Design` keep both directions of every cross-reference consistent.
//!
//! On top of the graph this crate provides bidirectional constant propagation
//! ([`propagate`]), deep structural cloning ([`clone`]), data-flow-ordered
//! traversal ([`traverse`]), and the construction recipes for sequential
//! blocks ([`block`]) and boolean decisions ([`decision`]).

#![warn(missing_docs)]

pub mod arena;
pub mod block;
pub mod bus;
pub mod clone;
pub mod component;
pub mod decision;
pub mod design;
pub mod entry;
pub mod exit;
pub mod ids;
pub mod latency;
pub mod port;
pub mod propagate;
pub mod traverse;
pub mod value;

pub use bus::Bus;
pub use clone::{CloneError, CloneListener, CloneMap};
pub use component::{Component, ComponentKind, ModuleBody, RegMode};
pub use design::{Design, PostScheduleCallback};
pub use entry::{Dependency, DependencyKind, Entry};
pub use exit::{Exit, ExitTag, ExitType};
pub use ids::{BusId, ComponentId, EntryId, ExitId, PortId};
pub use latency::{Latency, LatencyTracker};
pub use port::{Port, PortTag};
pub use traverse::Visitor;
pub use value::{Bit, Value};
