//! Buses: the output endpoints of exits.

use crate::ids::{EntryId, ExitId, PortId};
use crate::port::PortTag;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An output endpoint producing a value to zero or more ports.
///
/// Buses are owned by their [`Exit`](crate::exit::Exit). Two kinds of
/// consumers are tracked in both directions:
/// - `ports`: ports structurally connected via
///   [`Design::set_bus`](crate::design::Design::set_bus).
/// - `logical_dependents`: `(entry, port)` slots holding a
///   [`Dependency`](crate::entry::Dependency) on this bus — an observer
///   relationship, not ownership.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bus {
    /// The exit this bus belongs to.
    pub owner: ExitId,
    /// The boundary continuation port, for module boundary buses.
    pub peer: Option<PortId>,
    /// Whether the bus participates in the design.
    pub used: bool,
    /// Normal or sideband.
    pub tag: PortTag,
    /// Declared width in bits. Zero until the builder sizes it.
    pub size: u32,
    /// Whether consumers interpret the value as signed.
    pub signed: bool,
    /// The abstract value produced here, once propagation has run.
    pub value: Option<Value>,
    /// Ports structurally connected to this bus.
    pub ports: BTreeSet<PortId>,
    /// Dependency slots sourcing from this bus.
    pub logical_dependents: BTreeSet<(EntryId, PortId)>,
}

impl Bus {
    /// Creates an unsized, used, normal-tagged bus.
    pub fn new(owner: ExitId) -> Self {
        Self {
            owner,
            peer: None,
            used: true,
            tag: PortTag::Normal,
            size: 0,
            signed: false,
            value: None,
            ports: BTreeSet::new(),
            logical_dependents: BTreeSet::new(),
        }
    }

    /// Returns `true` if any port consumes this bus, structurally or
    /// logically.
    pub fn has_consumers(&self) -> bool {
        !self.ports.is_empty() || !self.logical_dependents.is_empty()
    }

    /// The value's size if present, else the declared size.
    pub fn effective_size(&self) -> usize {
        self.value
            .as_ref()
            .map(|v| v.size())
            .unwrap_or(self.size as usize)
    }
}
