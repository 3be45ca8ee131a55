//! Entries and dependencies: the control/data wiring between components.
//!
//! An [`Entry`] is one admissible way of activating a component: it names the
//! exit whose completion drives it and, per port, the set of
//! [`Dependency`] edges whose source buses must jointly supply the port.
//! A component with several entries is activated along logically muxed
//! alternative control paths.

use crate::ids::{BusId, ComponentId, ExitId, PortId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The flavor of signal a dependency carries.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Clock distribution.
    Clock,
    /// Reset distribution.
    Reset,
    /// A go/done control signal.
    Control,
    /// A data value.
    Data,
    /// Shared-resource arbitration.
    Resource,
}

/// A typed edge recording that one port, within one entry, needs the signal
/// on one bus.
///
/// Identity is by value: within one `(entry, port)` slot, adding the same
/// `(kind, bus)` pair twice collapses to a single dependency.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Dependency {
    /// What flavor of signal the edge carries.
    pub kind: DependencyKind,
    /// The source bus supplying the signal.
    pub logical_bus: BusId,
}

impl Dependency {
    /// Creates a dependency of the given kind on the given bus.
    pub fn new(kind: DependencyKind, logical_bus: BusId) -> Self {
        Self { kind, logical_bus }
    }

    /// Shorthand for a [`DependencyKind::Clock`] dependency.
    pub fn clock(bus: BusId) -> Self {
        Self::new(DependencyKind::Clock, bus)
    }

    /// Shorthand for a [`DependencyKind::Reset`] dependency.
    pub fn reset(bus: BusId) -> Self {
        Self::new(DependencyKind::Reset, bus)
    }

    /// Shorthand for a [`DependencyKind::Control`] dependency.
    pub fn control(bus: BusId) -> Self {
        Self::new(DependencyKind::Control, bus)
    }

    /// Shorthand for a [`DependencyKind::Data`] dependency.
    pub fn data(bus: BusId) -> Self {
        Self::new(DependencyKind::Data, bus)
    }
}

/// One admissible activation path of a component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    /// The component this entry activates.
    pub owner: ComponentId,
    /// The exit whose completion drives this entry, or `None` for an
    /// unconditional entry.
    pub driving_exit: Option<ExitId>,
    /// Per-port dependency sets. All dependencies of one port within one
    /// entry must be satisfiable simultaneously.
    pub dependencies: BTreeMap<PortId, BTreeSet<Dependency>>,
}

impl Entry {
    /// Creates an entry with no dependencies.
    pub fn new(owner: ComponentId, driving_exit: Option<ExitId>) -> Self {
        Self {
            owner,
            driving_exit,
            dependencies: BTreeMap::new(),
        }
    }

    /// The dependencies recorded for one port (empty if none).
    pub fn dependencies_for(&self, port: PortId) -> impl Iterator<Item = &Dependency> {
        self.dependencies.get(&port).into_iter().flatten()
    }

    /// Returns `true` if no port has any dependency.
    pub fn is_empty(&self) -> bool {
        self.dependencies.values().all(|deps| deps.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_identity_is_by_value() {
        let bus = BusId::from_raw(3);
        let a = Dependency::data(bus);
        let b = Dependency::new(DependencyKind::Data, bus);
        assert_eq!(a, b);
        let mut set = BTreeSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn kinds_distinguish_dependencies() {
        let bus = BusId::from_raw(3);
        assert_ne!(Dependency::clock(bus), Dependency::reset(bus));
        assert_ne!(Dependency::control(bus), Dependency::data(bus));
    }

    #[test]
    fn empty_entry() {
        let entry = Entry::new(ComponentId::from_raw(0), None);
        assert!(entry.is_empty());
        assert_eq!(entry.dependencies_for(PortId::from_raw(0)).count(), 0);
    }
}
