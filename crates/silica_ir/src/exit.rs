//! Exits: named, typed completion points of components.

use crate::ids::{BusId, ComponentId, EntryId};
use crate::latency::Latency;
use serde::{Deserialize, Serialize};
use silica_common::Ident;
use std::collections::BTreeSet;

/// The flavor of a completion point.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum ExitType {
    /// Normal completion.
    Done,
    /// Procedure return.
    Return,
    /// Loop break.
    Break,
    /// Loop continue.
    Continue,
    /// Exceptional completion.
    Exception,
    /// Sideband (resource/pin) completion.
    Sideband,
}

/// The unique key of an exit within its component: type plus optional label.
///
/// The label defaults to the empty identifier; labeled tags distinguish e.g.
/// a decision's `(Done, "true")` and `(Done, "false")` exits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ExitTag {
    /// The completion flavor.
    pub ty: ExitType,
    /// The interned label, empty for unlabeled exits.
    pub label: Ident,
}

impl ExitTag {
    /// Creates a tag from a type and label.
    pub fn new(ty: ExitType, label: Ident) -> Self {
        Self { ty, label }
    }
}

/// A completion point of a component, bundling one done bus and a fixed
/// number of data buses.
///
/// Tags are unique within a component. A module-owned exit additionally has a
/// peer `OutBuf` child that gathers the internal signals feeding it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Exit {
    /// The component this exit completes.
    pub owner: ComponentId,
    /// The unique tag of this exit within its owner.
    pub tag: ExitTag,
    /// The single-bit completion bus.
    pub done_bus: BusId,
    /// The data buses, arity fixed at creation.
    pub data_buses: Vec<BusId>,
    /// Scheduler-assigned latency, `ZERO` at creation.
    pub latency: Latency,
    /// The peer `OutBuf` component, for module exits.
    pub peer: Option<ComponentId>,
    /// Entries (of other components) driven by this exit's completion.
    pub driven_entries: BTreeSet<EntryId>,
}

impl Exit {
    /// All buses of this exit: the done bus followed by the data buses.
    pub fn buses(&self) -> impl Iterator<Item = BusId> + '_ {
        std::iter::once(self.done_bus).chain(self.data_buses.iter().copied())
    }
}
