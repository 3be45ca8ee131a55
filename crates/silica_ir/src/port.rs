//! Ports: the input endpoints of components.

use crate::ids::{BusId, ComponentId};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Distinguishes ordinary data-path endpoints from sideband (resource
/// arbitration, pin) endpoints.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum PortTag {
    /// An ordinary data-path endpoint.
    Normal,
    /// A sideband endpoint (resource arbitration, pin wiring).
    Sideband,
}

/// An input endpoint of a component, consuming a value from at most one bus.
///
/// A port can be wired two ways, maintained by the mutation primitives on
/// [`Design`](crate::design::Design):
/// - `bus`: the structural "driven by" connection chosen by scheduling.
/// - `peer`: the continuation bus at a module boundary (a module's boundary
///   port continues inward as one of its `InBuf`'s buses).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Port {
    /// The component this port belongs to.
    pub owner: ComponentId,
    /// The bus structurally driving this port, if connected.
    pub bus: Option<BusId>,
    /// The boundary continuation bus, for module boundary ports.
    pub peer: Option<BusId>,
    /// Whether the port participates in the design (unused ports are ignored
    /// by propagation and the design-rule checker).
    pub used: bool,
    /// Normal or sideband.
    pub tag: PortTag,
    /// The abstract value consumed here, once propagation has run.
    pub value: Option<Value>,
}

impl Port {
    /// Creates an unconnected, used, normal-tagged port.
    pub fn new(owner: ComponentId) -> Self {
        Self {
            owner,
            bus: None,
            peer: None,
            used: true,
            tag: PortTag::Normal,
            value: None,
        }
    }

    /// Creates an unconnected port with an explicit tag.
    pub fn with_tag(owner: ComponentId, tag: PortTag) -> Self {
        Self {
            tag,
            ..Self::new(owner)
        }
    }

    /// Returns `true` if the port has a structural bus connection.
    pub fn is_connected(&self) -> bool {
        self.bus.is_some()
    }
}
