//! The design aggregate: arenas, structural mutation, and exit surgery.
//!
//! Every mutation of the graph goes through a method here so that both
//! directions of every cross-reference (port↔bus, entry↔exit,
//! bus↔dependency) stay consistent. Multi-step edits (`change_exit`,
//! `merge_exits`, component replacement) build their replacement structure
//! completely before tearing the old one down, so the graph is never
//! observable in a half-rewired state.

use crate::arena::Arena;
use crate::bus::Bus;
use crate::clone::CloneListener;
use crate::component::{Component, ComponentKind};
use crate::entry::{Dependency, Entry};
use crate::exit::{Exit, ExitTag, ExitType};
use crate::ids::{BusId, ComponentId, EntryId, ExitId, PortId};
use crate::latency::{Latency, LatencyTracker};
use crate::port::{Port, PortTag};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use silica_common::{Ident, Interner};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Hook invoked after the external scheduler has assigned latencies.
pub trait PostScheduleCallback {
    /// Called once per scheduled component with the assigned latencies.
    fn post_schedule(&self, design: &Design, tracker: &LatencyTracker, component: ComponentId);
}

/// The complete design graph.
///
/// Owns per-kind arenas for components, ports, buses, exits, and entries,
/// plus the string interner for labels and attributes. Trait-object hooks
/// (post-schedule callbacks, clone listeners) are runtime-only and skipped
/// by serialization.
#[derive(Serialize, Deserialize)]
pub struct Design {
    /// The interner backing exit labels, attributes, and option labels.
    pub interner: Interner,
    pub(crate) components: Arena<ComponentId, Component>,
    pub(crate) ports: Arena<PortId, Port>,
    pub(crate) buses: Arena<BusId, Bus>,
    pub(crate) exits: Arena<ExitId, Exit>,
    pub(crate) entries: Arena<EntryId, Entry>,
    #[serde(skip)]
    post_schedule_callbacks: Vec<Rc<dyn PostScheduleCallback>>,
    #[serde(skip)]
    clone_listeners: Vec<Rc<dyn CloneListener>>,
}

impl fmt::Debug for Design {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Design")
            .field("components", &self.components.len())
            .field("ports", &self.ports.len())
            .field("buses", &self.buses.len())
            .field("exits", &self.exits.len())
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Default for Design {
    fn default() -> Self {
        Self::new()
    }
}

impl Design {
    /// Creates an empty design.
    pub fn new() -> Self {
        Self {
            interner: Interner::new(),
            components: Arena::new(),
            ports: Arena::new(),
            buses: Arena::new(),
            exits: Arena::new(),
            entries: Arena::new(),
            post_schedule_callbacks: Vec::new(),
            clone_listeners: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The component with the given ID. Panics on a dead or unknown ID.
    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id]
    }

    /// Mutable access to a component.
    pub fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id]
    }

    /// Returns `true` if the component ID refers to a live component.
    pub fn contains_component(&self, id: ComponentId) -> bool {
        self.components.contains(id)
    }

    /// The port with the given ID.
    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id]
    }

    /// Mutable access to a port.
    pub fn port_mut(&mut self, id: PortId) -> &mut Port {
        &mut self.ports[id]
    }

    /// Returns `true` if the port ID refers to a live port.
    pub fn contains_port(&self, id: PortId) -> bool {
        self.ports.contains(id)
    }

    /// The bus with the given ID.
    pub fn bus(&self, id: BusId) -> &Bus {
        &self.buses[id]
    }

    /// Returns `true` if the bus ID refers to a live bus.
    pub fn contains_bus(&self, id: BusId) -> bool {
        self.buses.contains(id)
    }

    /// Mutable access to a bus.
    pub fn bus_mut(&mut self, id: BusId) -> &mut Bus {
        &mut self.buses[id]
    }

    /// The exit with the given ID.
    pub fn exit(&self, id: ExitId) -> &Exit {
        &self.exits[id]
    }

    /// Mutable access to an exit.
    pub fn exit_mut(&mut self, id: ExitId) -> &mut Exit {
        &mut self.exits[id]
    }

    /// The entry with the given ID.
    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id]
    }

    /// Mutable access to an entry.
    pub fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id]
    }

    /// Iterates over all live components.
    pub fn iter_components(&self) -> impl Iterator<Item = (ComponentId, &Component)> {
        self.components.iter()
    }

    /// Iterates over all live ports.
    pub fn iter_ports(&self) -> impl Iterator<Item = (PortId, &Port)> {
        self.ports.iter()
    }

    /// Iterates over all live buses.
    pub fn iter_buses(&self) -> impl Iterator<Item = (BusId, &Bus)> {
        self.buses.iter()
    }

    // ------------------------------------------------------------------
    // Component construction
    // ------------------------------------------------------------------

    /// Creates a component of the given kind with fresh clock, reset, and go
    /// ports and no data ports, exits, or entries.
    ///
    /// Clock and reset ports start unused; ports are marked used when a
    /// dependency or bus connection touches them.
    pub fn new_component(&mut self, kind: ComponentKind) -> ComponentId {
        let comp = self.components.next_id();
        let mut clock = Port::new(comp);
        clock.used = false;
        let mut reset = Port::new(comp);
        reset.used = false;
        let mut go = Port::new(comp);
        go.used = false;
        let clock_port = self.ports.alloc(clock);
        let reset_port = self.ports.alloc(reset);
        let go_port = self.ports.alloc(go);
        let actual = self.components.alloc(Component {
            kind,
            owner: None,
            clock_port,
            reset_port,
            go_port,
            this_port: None,
            data_ports: Vec::new(),
            exits: BTreeMap::new(),
            entries: Vec::new(),
            non_removable: false,
            opaque: false,
            attributes: BTreeMap::new(),
            option_label: None,
        });
        debug_assert_eq!(actual, comp);
        comp
    }

    /// Creates a leaf operator: `data_ports` data inputs plus a `Done` exit
    /// with a single result bus.
    pub fn new_op(&mut self, kind: ComponentKind, data_ports: usize) -> ComponentId {
        let comp = self.new_component(kind);
        for _ in 0..data_ports {
            self.make_data_port(comp, PortTag::Normal);
        }
        self.make_exit(comp, 1, ExitType::Done, None);
        comp
    }

    /// Creates a constant source producing the given value.
    pub fn new_constant(&mut self, value: Value) -> ComponentId {
        let size = value.size();
        let signed = value.is_signed();
        let comp = self.new_op(ComponentKind::Constant { value }, 0);
        let bus = self.result_bus(comp);
        self.set_bus_size(bus, size as u32, signed);
        comp
    }

    /// Creates a composite component with an empty body and the standard
    /// boundary wiring: a fresh `InBuf` whose buses continue the clock,
    /// reset, and go ports inward, plus `data_count` peered data ports.
    ///
    /// `make_kind` receives the `InBuf`'s ID and must return a body-carrying
    /// kind built around it.
    pub fn new_composite(
        &mut self,
        make_kind: impl FnOnce(ComponentId) -> ComponentKind,
        data_count: usize,
    ) -> ComponentId {
        let inbuf = self.new_component(ComponentKind::InBuf);
        // InBuf exit layout: done bus = go continuation, data 0 = clock,
        // data 1 = reset, data 2.. = the module's data ports.
        let inbuf_exit = self.make_exit(inbuf, 2, ExitType::Done, None);
        let comp = self.new_component(make_kind(inbuf));
        assert!(
            self.components[comp].is_module(),
            "new_composite requires a body-carrying kind"
        );
        self.components[inbuf].owner = Some(comp);
        self.components[comp]
            .body_mut()
            .expect("checked above")
            .children
            .insert(inbuf);

        let exit = &self.exits[inbuf_exit];
        let go_bus = exit.done_bus;
        let clock_bus = exit.data_buses[0];
        let reset_bus = exit.data_buses[1];
        for bus in [go_bus, clock_bus, reset_bus] {
            self.set_bus_size(bus, 1, false);
        }
        let (clock_port, reset_port, go_port) = {
            let c = &self.components[comp];
            (c.clock_port, c.reset_port, c.go_port)
        };
        self.peer(clock_port, clock_bus);
        self.peer(reset_port, reset_bus);
        self.peer(go_port, go_bus);
        for _ in 0..data_count {
            self.make_data_port(comp, PortTag::Normal);
        }
        comp
    }

    /// Creates a generic container module with `data_count` data ports.
    pub fn new_module(&mut self, data_count: usize) -> ComponentId {
        self.new_composite(ComponentKind::module, data_count)
    }

    fn peer(&mut self, port: PortId, bus: BusId) {
        self.ports[port].peer = Some(bus);
        self.buses[bus].peer = Some(port);
    }

    // ------------------------------------------------------------------
    // Port and bus primitives
    // ------------------------------------------------------------------

    /// Appends a new used data port. On a composite, also allocates the
    /// matching `InBuf` bus and peers the two.
    pub fn make_data_port(&mut self, comp: ComponentId, tag: PortTag) -> PortId {
        let port = self.ports.alloc(Port::with_tag(comp, tag));
        self.components[comp].data_ports.push(port);
        if let Some(body) = self.components[comp].body() {
            let inbuf = body.inbuf;
            let inbuf_exit = self.single_exit(inbuf);
            let bus = self.buses.alloc(Bus::new(inbuf_exit));
            self.buses[bus].tag = tag;
            self.exits[inbuf_exit].data_buses.push(bus);
            self.peer(port, bus);
        }
        port
    }

    /// Creates the single "this" port of a component.
    ///
    /// # Panics
    ///
    /// Panics if the component already has one.
    pub fn make_this_port(&mut self, comp: ComponentId) -> PortId {
        assert!(
            self.components[comp].this_port.is_none(),
            "component already has a this port"
        );
        let port = self.ports.alloc(Port::new(comp));
        self.components[comp].this_port = Some(port);
        port
    }

    /// Structurally connects a port to a bus, severing any previous
    /// connection and marking the port used.
    pub fn set_bus(&mut self, port: PortId, bus: BusId) {
        self.disconnect_port(port);
        self.ports[port].bus = Some(bus);
        self.ports[port].used = true;
        self.buses[bus].ports.insert(port);
    }

    /// Severs a port's structural bus connection, if any.
    pub fn disconnect_port(&mut self, port: PortId) {
        if let Some(bus) = self.ports[port].bus.take() {
            self.buses[bus].ports.remove(&port);
        }
    }

    /// Sets a bus's declared width and signedness.
    pub fn set_bus_size(&mut self, bus: BusId, size: u32, signed: bool) {
        let b = &mut self.buses[bus];
        b.size = size;
        b.signed = signed;
    }

    /// Removes a data port: zaps every dependency on it, severs its bus
    /// connection, and detaches it from the component. A peered bus (the
    /// matching `InBuf` bus of a composite's boundary port) is removed with
    /// it, so the boundary stays index-aligned.
    ///
    /// Returns `false` if the port is not a data port of `comp` (e.g., it was
    /// already removed).
    ///
    /// # Panics
    ///
    /// Panics on fixed-shape kinds (`Gateway`, `Mux`, `Pin`).
    pub fn remove_data_port(&mut self, comp: ComponentId, port: PortId) -> bool {
        assert!(
            self.components[comp].supports_port_removal(),
            "cannot remove a data port from a {}",
            self.components[comp].kind.name()
        );
        let Some(pos) = self.components[comp].data_ports.iter().position(|&p| p == port) else {
            return false;
        };
        for entry in self.components[comp].entries.clone() {
            self.clear_dependencies(entry, port);
        }
        self.disconnect_port(port);
        let peer = self.ports[port].peer.take();
        self.components[comp].data_ports.remove(pos);
        self.ports.remove(port);
        // the peer link is already severed on both sides, so the cascade
        // cannot loop back here
        if let Some(peer) = peer {
            self.buses[peer].peer = None;
            let owner = self.buses[peer].owner;
            self.remove_data_bus(owner, peer);
        }
        true
    }

    /// Removes a data bus from an exit: zaps every dependency sourcing from
    /// it, disconnects its ports, and detaches it. A peered port (a module's
    /// boundary port, or an `OutBuf` data port behind a module exit) is
    /// removed with it.
    ///
    /// Returns `false` if the bus is not a data bus of `exit`.
    pub fn remove_data_bus(&mut self, exit: ExitId, bus: BusId) -> bool {
        let Some(pos) = self.exits[exit].data_buses.iter().position(|&b| b == bus) else {
            return false;
        };
        self.detach_bus_consumers(bus);
        let peer = self.buses[bus].peer.take();
        self.exits[exit].data_buses.remove(pos);
        self.buses.remove(bus);
        if let Some(peer) = peer {
            self.ports[peer].peer = None;
            let owner = self.ports[peer].owner;
            self.remove_data_port(owner, peer);
        }
        true
    }

    /// Disconnects every structural and logical consumer of a bus.
    fn detach_bus_consumers(&mut self, bus: BusId) {
        for port in std::mem::take(&mut self.buses[bus].ports) {
            self.ports[port].bus = None;
        }
        for (entry, port) in std::mem::take(&mut self.buses[bus].logical_dependents) {
            if let Some(deps) = self.entries[entry].dependencies.get_mut(&port) {
                deps.retain(|d| d.logical_bus != bus);
                if deps.is_empty() {
                    self.entries[entry].dependencies.remove(&port);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Entries and dependencies
    // ------------------------------------------------------------------

    /// Creates and registers a new entry. A `None` driving exit means the
    /// entry is unconditional.
    pub fn make_entry(&mut self, comp: ComponentId, driving_exit: Option<ExitId>) -> EntryId {
        let entry = self.entries.alloc(Entry::new(comp, driving_exit));
        self.components[comp].entries.push(entry);
        if let Some(exit) = driving_exit {
            self.exits[exit].driven_entries.insert(entry);
        }
        entry
    }

    /// Records a dependency in the entry's per-port table and registers the
    /// `(entry, port)` slot on the source bus. Duplicate `(kind, bus)` pairs
    /// within one slot collapse. The port is marked used.
    ///
    /// # Panics
    ///
    /// Panics if `port` does not belong to the entry's owner.
    pub fn add_dependency(&mut self, entry: EntryId, port: PortId, dep: Dependency) {
        let owner = self.entries[entry].owner;
        assert!(
            self.components[owner].ports().any(|p| p == port),
            "port does not belong to the entry's owner"
        );
        self.entries[entry]
            .dependencies
            .entry(port)
            .or_default()
            .insert(dep);
        self.buses[dep.logical_bus]
            .logical_dependents
            .insert((entry, port));
        self.ports[port].used = true;
    }

    /// Severs one dependency from both the entry's table and the source
    /// bus's logical-dependent set. Returns `false` if it was not present.
    pub fn zap_dependency(&mut self, entry: EntryId, port: PortId, dep: Dependency) -> bool {
        let removed = match self.entries[entry].dependencies.get_mut(&port) {
            Some(deps) => deps.remove(&dep),
            None => return false,
        };
        if !removed {
            return false;
        }
        if self.entries[entry]
            .dependencies
            .get(&port)
            .is_some_and(|d| d.is_empty())
        {
            self.entries[entry].dependencies.remove(&port);
        }
        // the slot stays registered on the bus while another dependency in
        // it still sources from the same bus
        let still_sourced = self.entries[entry]
            .dependencies
            .get(&port)
            .is_some_and(|deps| deps.iter().any(|d| d.logical_bus == dep.logical_bus));
        if !still_sourced && self.buses.contains(dep.logical_bus) {
            self.buses[dep.logical_bus]
                .logical_dependents
                .remove(&(entry, port));
        }
        true
    }

    /// Zaps every dependency of one port within one entry.
    pub fn clear_dependencies(&mut self, entry: EntryId, port: PortId) {
        let deps: Vec<Dependency> = self.entries[entry]
            .dependencies
            .get(&port)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default();
        for dep in deps {
            self.zap_dependency(entry, port, dep);
        }
    }

    /// Zaps every dependency of the entry, clears its table, and detaches it
    /// from its driving exit. The entry itself stays registered on its owner
    /// until [`remove_entry`](Self::remove_entry).
    pub fn decimate(&mut self, entry: EntryId) {
        let ports: Vec<PortId> = self.entries[entry].dependencies.keys().copied().collect();
        for port in ports {
            self.clear_dependencies(entry, port);
        }
        self.entries[entry].dependencies.clear();
        if let Some(exit) = self.entries[entry].driving_exit.take() {
            if self.exits.contains(exit) {
                self.exits[exit].driven_entries.remove(&entry);
            }
        }
    }

    /// Removes an entry: decimates it, detaches it from its owner, and frees
    /// its slot.
    pub fn remove_entry(&mut self, entry: EntryId) {
        self.decimate(entry);
        let owner = self.entries[entry].owner;
        if self.components.contains(owner) {
            self.components[owner].entries.retain(|&e| e != entry);
        }
        self.entries.remove(entry);
    }

    /// The component's single entry, or `None` when it has zero or several.
    pub fn main_entry(&self, comp: ComponentId) -> Option<EntryId> {
        match self.components[comp].entries.as_slice() {
            [entry] => Some(*entry),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Exits
    // ------------------------------------------------------------------

    /// Interns a tag from a type and optional label.
    pub fn exit_tag(&self, ty: ExitType, label: Option<&str>) -> ExitTag {
        ExitTag::new(ty, self.interner.get_or_intern(label.unwrap_or("")))
    }

    /// Creates an exit with a done bus and `data_count` data buses, latency
    /// `ZERO`. On a composite, also fabricates the peer `OutBuf` with one go
    /// port peered to the done bus and one data port per data bus.
    ///
    /// # Panics
    ///
    /// Panics if an exit with the same tag already exists.
    pub fn make_exit(
        &mut self,
        comp: ComponentId,
        data_count: usize,
        ty: ExitType,
        label: Option<&str>,
    ) -> ExitId {
        let tag = self.exit_tag(ty, label);
        self.make_exit_tagged(comp, data_count, tag)
    }

    pub(crate) fn make_exit_tagged(
        &mut self,
        comp: ComponentId,
        data_count: usize,
        tag: ExitTag,
    ) -> ExitId {
        assert!(
            !self.components[comp].exits.contains_key(&tag),
            "duplicate exit tag on component"
        );
        let exit = self.exits.next_id();
        let mut done = Bus::new(exit);
        done.size = 1;
        let done_bus = self.buses.alloc(done);
        let data_buses: Vec<BusId> = (0..data_count)
            .map(|_| self.buses.alloc(Bus::new(exit)))
            .collect();
        let actual = self.exits.alloc(Exit {
            owner: comp,
            tag,
            done_bus,
            data_buses: data_buses.clone(),
            latency: Latency::ZERO,
            peer: None,
            driven_entries: Default::default(),
        });
        debug_assert_eq!(actual, exit);
        self.components[comp].exits.insert(tag, exit);

        if self.components[comp].is_module() {
            let outbuf = self.new_component(ComponentKind::OutBuf { exit });
            self.components[outbuf].owner = Some(comp);
            self.components[comp]
                .body_mut()
                .expect("module checked above")
                .children
                .insert(outbuf);
            let go = self.components[outbuf].go_port;
            self.peer(go, done_bus);
            self.ports[go].used = true;
            for bus in data_buses {
                let port = self.make_data_port(outbuf, PortTag::Normal);
                self.peer(port, bus);
            }
            self.exits[exit].peer = Some(outbuf);
        }
        exit
    }

    /// Looks up an exit by tag.
    pub fn get_exit(&self, comp: ComponentId, tag: ExitTag) -> Option<ExitId> {
        self.components[comp].exits.get(&tag).copied()
    }

    /// The unlabeled `Done` exit, if present.
    pub fn done_exit(&self, comp: ComponentId) -> Option<ExitId> {
        self.get_exit(comp, self.exit_tag(ExitType::Done, None))
    }

    /// The component's only exit.
    ///
    /// # Panics
    ///
    /// Panics if the component does not have exactly one exit.
    pub fn single_exit(&self, comp: ComponentId) -> ExitId {
        let exits = &self.components[comp].exits;
        assert_eq!(exits.len(), 1, "component does not have exactly one exit");
        *exits.values().next().expect("length checked")
    }

    /// The first data bus of the unlabeled `Done` exit — the result of a
    /// leaf operator.
    ///
    /// # Panics
    ///
    /// Panics if there is no such exit or it has no data bus.
    pub fn result_bus(&self, comp: ComponentId) -> BusId {
        let exit = self.done_exit(comp).expect("component has no Done exit");
        self.exits[exit].data_buses[0]
    }

    /// The done bus of the unlabeled `Done` exit.
    ///
    /// # Panics
    ///
    /// Panics if there is no such exit.
    pub fn done_bus(&self, comp: ComponentId) -> BusId {
        let exit = self.done_exit(comp).expect("component has no Done exit");
        self.exits[exit].done_bus
    }

    /// Removes an exit and its buses, disconnecting every consumer. On a
    /// composite, also removes the peer `OutBuf`.
    pub fn remove_exit(&mut self, comp: ComponentId, exit: ExitId) {
        if let Some(outbuf) = self.exits[exit].peer.take() {
            self.remove_component(outbuf);
        }
        self.remove_exit_raw(comp, exit);
    }

    fn remove_exit_raw(&mut self, comp: ComponentId, exit: ExitId) {
        let buses: Vec<BusId> = self.exits[exit].buses().collect();
        for bus in buses {
            self.detach_bus_consumers(bus);
            if let Some(peer) = self.buses[bus].peer.take() {
                if self.ports.contains(peer) {
                    self.ports[peer].peer = None;
                }
            }
            self.buses.remove(bus);
        }
        for entry in std::mem::take(&mut self.exits[exit].driven_entries) {
            if self.entries.contains(entry) {
                self.entries[entry].driving_exit = None;
            }
        }
        let tag = self.exits[exit].tag;
        if self.components.contains(comp) {
            self.components[comp].exits.remove(&tag);
        }
        self.exits.remove(exit);
    }

    /// Rehomes an exit under a new type: fabricates the replacement exit
    /// first, replays every `OutBuf` entry and dependency onto it, retargets
    /// driven entries, transfers bus consumers, copies the latency, and only
    /// then removes the old exit. The graph is never observable half-rewired.
    ///
    /// Returns the replacement exit.
    ///
    /// # Panics
    ///
    /// Panics if an exit with the new tag already exists.
    pub fn change_exit(&mut self, comp: ComponentId, old_exit: ExitId, new_ty: ExitType) -> ExitId {
        let old_tag = self.exits[old_exit].tag;
        let arity = self.exits[old_exit].data_buses.len();
        let new_exit = self.make_exit_tagged(comp, arity, ExitTag::new(new_ty, old_tag.label));

        // replay the OutBuf entries, cloning each dependency by kind
        let old_peer = self.exits[old_exit].peer;
        let new_peer = self.exits[new_exit].peer;
        if let (Some(old_ob), Some(new_ob)) = (old_peer, new_peer) {
            let port_map = Self::port_pairing(&self.components[old_ob], &self.components[new_ob]);
            for entry in self.components[old_ob].entries.clone() {
                let driving = self.entries[entry].driving_exit;
                let replayed = self.make_entry(new_ob, driving);
                let table = self.entries[entry].dependencies.clone();
                for (port, deps) in table {
                    let new_port = port_map[&port];
                    for dep in deps {
                        self.add_dependency(replayed, new_port, dep);
                    }
                }
            }
        }

        // retarget entries driven by the old exit
        for entry in std::mem::take(&mut self.exits[old_exit].driven_entries) {
            self.entries[entry].driving_exit = Some(new_exit);
            self.exits[new_exit].driven_entries.insert(entry);
        }

        // transfer consumers of the old buses to the new ones pairwise
        let old_buses: Vec<BusId> = self.exits[old_exit].buses().collect();
        let new_buses: Vec<BusId> = self.exits[new_exit].buses().collect();
        for (&old_bus, &new_bus) in old_buses.iter().zip(&new_buses) {
            self.transfer_bus(old_bus, new_bus);
        }

        self.exits[new_exit].latency = self.exits[old_exit].latency;
        self.remove_exit(comp, old_exit);
        new_exit
    }

    /// Moves every structural and logical consumer of `from` onto `to`,
    /// along with the declared size and value.
    fn transfer_bus(&mut self, from: BusId, to: BusId) {
        for port in std::mem::take(&mut self.buses[from].ports) {
            self.ports[port].bus = None;
            self.set_bus(port, to);
        }
        for (entry, port) in std::mem::take(&mut self.buses[from].logical_dependents) {
            let deps: Vec<Dependency> = self.entries[entry]
                .dependencies
                .get(&port)
                .map(|d| d.iter().copied().filter(|d| d.logical_bus == from).collect())
                .unwrap_or_default();
            for dep in deps {
                if let Some(slot) = self.entries[entry].dependencies.get_mut(&port) {
                    slot.remove(&dep);
                }
                self.add_dependency(entry, port, Dependency::new(dep.kind, to));
            }
        }
        let (size, signed, value) = {
            let b = &self.buses[from];
            (b.size, b.signed, b.value.clone())
        };
        let to_bus = &mut self.buses[to];
        to_bus.size = size;
        to_bus.signed = signed;
        to_bus.value = value;
    }

    fn port_pairing(old: &Component, new: &Component) -> BTreeMap<PortId, PortId> {
        let mut map = BTreeMap::new();
        map.insert(old.clock_port, new.clock_port);
        map.insert(old.reset_port, new.reset_port);
        map.insert(old.go_port, new.go_port);
        if let (Some(a), Some(b)) = (old.this_port, new.this_port) {
            map.insert(a, b);
        }
        for (&a, &b) in old.data_ports.iter().zip(&new.data_ports) {
            map.insert(a, b);
        }
        map
    }

    /// Synthesizes the module's exits from its children's exit sets, grouped
    /// by tag: for each distinct tag a module exit is reused or created, and
    /// its `OutBuf` gains one entry per contributing child exit carrying
    /// clock/reset dependencies on the `InBuf` buses, a control dependency
    /// on the child's done bus, and data dependencies on the child's data
    /// buses.
    pub fn merge_exits(&mut self, module: ComponentId, children: &[ComponentId]) {
        let clock_bus = self.inbuf_clock_bus(module);
        let reset_bus = self.inbuf_reset_bus(module);

        let mut groups: BTreeMap<ExitTag, Vec<ExitId>> = BTreeMap::new();
        for &child in children {
            for (&tag, &exit) in &self.components[child].exits {
                groups.entry(tag).or_default().push(exit);
            }
        }

        for (tag, child_exits) in groups {
            self.merge_exit_group(module, tag, &child_exits, clock_bus, reset_bus);
        }
    }

    /// Reuses or creates the module exit for one tag and gives its `OutBuf`
    /// one entry per contributing child exit.
    pub(crate) fn merge_exit_group(
        &mut self,
        module: ComponentId,
        tag: ExitTag,
        child_exits: &[ExitId],
        clock_bus: BusId,
        reset_bus: BusId,
    ) {
        let arity = child_exits
            .iter()
            .map(|&e| self.exits[e].data_buses.len())
            .max()
            .unwrap_or(0);
        let module_exit = self
            .get_exit(module, tag)
            .unwrap_or_else(|| self.make_exit_tagged(module, arity, tag));
        let outbuf = self.exits[module_exit]
            .peer
            .expect("module exits have an OutBuf peer");
        let (ob_clock, ob_reset, ob_go, ob_data) = {
            let ob = &self.components[outbuf];
            (
                ob.clock_port,
                ob.reset_port,
                ob.go_port,
                ob.data_ports.clone(),
            )
        };
        for &child_exit in child_exits {
            let entry = self.make_entry(outbuf, Some(child_exit));
            self.add_dependency(entry, ob_clock, Dependency::clock(clock_bus));
            self.add_dependency(entry, ob_reset, Dependency::reset(reset_bus));
            let done = self.exits[child_exit].done_bus;
            self.add_dependency(entry, ob_go, Dependency::control(done));
            let data = self.exits[child_exit].data_buses.clone();
            for (&port, &bus) in ob_data.iter().zip(&data) {
                self.add_dependency(entry, port, Dependency::data(bus));
            }
        }
    }

    // ------------------------------------------------------------------
    // InBuf accessors
    // ------------------------------------------------------------------

    /// The single exit of a composite's `InBuf`.
    pub fn inbuf_exit(&self, module: ComponentId) -> ExitId {
        let inbuf = self.components[module]
            .body()
            .expect("component is not a module")
            .inbuf;
        self.single_exit(inbuf)
    }

    /// The internal continuation of the module's go port.
    pub fn inbuf_go_bus(&self, module: ComponentId) -> BusId {
        self.exits[self.inbuf_exit(module)].done_bus
    }

    /// The internal continuation of the module's clock port.
    pub fn inbuf_clock_bus(&self, module: ComponentId) -> BusId {
        self.exits[self.inbuf_exit(module)].data_buses[0]
    }

    /// The internal continuation of the module's reset port.
    pub fn inbuf_reset_bus(&self, module: ComponentId) -> BusId {
        self.exits[self.inbuf_exit(module)].data_buses[1]
    }

    /// The internal continuation of the module's `i`th data port.
    pub fn inbuf_data_bus(&self, module: ComponentId, i: usize) -> BusId {
        self.exits[self.inbuf_exit(module)].data_buses[2 + i]
    }

    // ------------------------------------------------------------------
    // Component surgery
    // ------------------------------------------------------------------

    /// Adds a component to a module's body, transferring ownership.
    pub fn add_component(&mut self, module: ComponentId, child: ComponentId) {
        assert!(
            self.components[module].is_module(),
            "cannot add a child to a {}",
            self.components[module].kind.name()
        );
        self.components[child].owner = Some(module);
        self.components[module]
            .body_mut()
            .expect("module checked above")
            .children
            .insert(child);
    }

    /// Removes a component and its entire subtree from the design,
    /// disconnecting everything first: entries are decimated, exits and
    /// their consumers detached, port/bus links severed, and the owner's
    /// bookkeeping updated.
    pub fn remove_component(&mut self, comp: ComponentId) {
        // subtree first
        if let Some(body) = self.components[comp].body() {
            for child in body.children.clone() {
                self.remove_component(child);
            }
        }
        // an OutBuf's module exit loses its peer
        if let ComponentKind::OutBuf { exit } = self.components[comp].kind {
            if self.exits.contains(exit) {
                self.exits[exit].peer = None;
            }
        }
        for entry in self.components[comp].entries.clone() {
            self.remove_entry(entry);
        }
        let exits: Vec<ExitId> = self.components[comp].exits.values().copied().collect();
        for exit in exits {
            self.remove_exit(comp, exit);
        }
        let ports: Vec<PortId> = self.components[comp].ports().collect();
        for port in ports {
            self.disconnect_port(port);
            if let Some(peer) = self.ports[port].peer.take() {
                if self.buses.contains(peer) {
                    self.buses[peer].peer = None;
                }
            }
            self.ports.remove(port);
        }
        if let Some(owner) = self.components[comp].owner {
            if self.components.contains(owner) {
                if let Some(body) = self.components[owner].body_mut() {
                    body.children.remove(&comp);
                    body.feedback_points.remove(&comp);
                }
                if let ComponentKind::Block { sequence, .. } = &mut self.components[owner].kind {
                    sequence.retain(|&c| c != comp);
                }
            }
        }
        self.components.remove(comp);
    }

    /// Swaps a component for a same-shape replacement: membership,
    /// composite back-references, port connections, entries, and exit
    /// consumers all move to the replacement, then the old component is
    /// removed.
    ///
    /// # Panics
    ///
    /// Panics if `old` has no owner or the data-port arities differ.
    pub fn replace_component(&mut self, old: ComponentId, new: ComponentId) {
        let owner = self.components[old]
            .owner
            .expect("cannot replace a component with no owner");
        assert_eq!(
            self.components[old].data_ports.len(),
            self.components[new].data_ports.len(),
            "replacement must have the same data-port arity"
        );

        // membership and composite back-references
        self.components[new].owner = Some(owner);
        {
            let had_feedback = self.components[owner]
                .body()
                .map(|b| b.feedback_points.contains(&old))
                .unwrap_or(false);
            let body = self.components[owner]
                .body_mut()
                .expect("owner is a module");
            body.children.remove(&old);
            body.children.insert(new);
            if had_feedback {
                body.feedback_points.remove(&old);
                body.feedback_points.insert(new);
            }
        }
        match &mut self.components[owner].kind {
            ComponentKind::Block { sequence, .. } => {
                for slot in sequence.iter_mut() {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
            ComponentKind::Decision {
                test_block,
                test_component,
                not,
                true_and,
                false_and,
                ..
            } => {
                for slot in [test_block, test_component, not, true_and, false_and] {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
            _ => {}
        }

        // move port connections pairwise
        let pairing = Self::port_pairing(&self.components[old], &self.components[new]);
        for (&old_port, &new_port) in &pairing {
            if let Some(bus) = self.ports[old_port].bus {
                self.disconnect_port(old_port);
                self.set_bus(new_port, bus);
            }
        }

        // move entries, remapping their port keys
        for entry in std::mem::take(&mut self.components[old].entries) {
            self.entries[entry].owner = new;
            let table = std::mem::take(&mut self.entries[entry].dependencies);
            let mut remapped = BTreeMap::new();
            for (port, deps) in table {
                let key = pairing.get(&port).copied().unwrap_or(port);
                for dep in &deps {
                    let bus = &mut self.buses[dep.logical_bus];
                    bus.logical_dependents.remove(&(entry, port));
                    bus.logical_dependents.insert((entry, key));
                }
                remapped.insert(key, deps);
            }
            self.entries[entry].dependencies = remapped;
            self.components[new].entries.push(entry);
        }

        // move exit consumers pairwise by tag
        let old_exits: Vec<(ExitTag, ExitId)> = self
            .components[old]
            .exits
            .iter()
            .map(|(&t, &e)| (t, e))
            .collect();
        for (tag, old_exit) in old_exits {
            if let Some(new_exit) = self.get_exit(new, tag) {
                for entry in std::mem::take(&mut self.exits[old_exit].driven_entries) {
                    self.entries[entry].driving_exit = Some(new_exit);
                    self.exits[new_exit].driven_entries.insert(entry);
                }
                let old_buses: Vec<BusId> = self.exits[old_exit].buses().collect();
                let new_buses: Vec<BusId> = self.exits[new_exit].buses().collect();
                for (&ob, &nb) in old_buses.iter().zip(&new_buses) {
                    self.transfer_bus(ob, nb);
                }
            }
        }

        self.components[old].owner = None;
        self.remove_component(old);
    }

    /// Marks a component as a feedback point of its owner's body.
    pub fn mark_feedback_point(&mut self, comp: ComponentId) {
        let owner = self.components[comp]
            .owner
            .expect("feedback points must be owned");
        self.components[owner]
            .body_mut()
            .expect("owner is a module")
            .feedback_points
            .insert(comp);
    }

    /// Whether a module must be treated as a translation-unit boundary for
    /// propagation: it has no owner, or carries an explicit mark.
    pub fn is_opaque(&self, comp: ComponentId) -> bool {
        let c = &self.components[comp];
        c.owner.is_none() || c.opaque
    }

    /// A human-readable owner chain for diagnostics, outermost first, e.g.
    /// `"Module/Block/Or"`.
    ///
    /// Purely informational: a dead ID or an ownership chain longer than any
    /// legal nesting degrades to a sentinel string instead of failing.
    pub fn trace_hierarchy(&self, comp: ComponentId) -> String {
        const DEPTH_BOUND: usize = 64;
        if !self.components.contains(comp) {
            return "<unresolved hierarchy>".to_string();
        }
        let mut chain = vec![self.components[comp].kind.name()];
        let mut cursor = comp;
        while let Some(owner) = self.components.try_get(cursor).and_then(|c| c.owner) {
            if chain.len() >= DEPTH_BOUND || !self.components.contains(owner) {
                return "<unresolved hierarchy>".to_string();
            }
            chain.push(self.components[owner].kind.name());
            cursor = owner;
        }
        chain.reverse();
        chain.join("/")
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    /// Registers a hook to run after latency assignment.
    pub fn add_post_schedule_callback(&mut self, callback: Rc<dyn PostScheduleCallback>) {
        self.post_schedule_callbacks.push(callback);
    }

    /// Invokes every registered post-schedule callback for one component.
    pub fn run_post_schedule(&self, tracker: &LatencyTracker, component: ComponentId) {
        for callback in &self.post_schedule_callbacks {
            callback.post_schedule(self, tracker, component);
        }
    }

    /// Registers a listener notified with the original→clone map after every
    /// module clone.
    pub fn add_clone_listener(&mut self, listener: Rc<dyn CloneListener>) {
        self.clone_listeners.push(listener);
    }

    pub(crate) fn clone_listeners(&self) -> Vec<Rc<dyn CloneListener>> {
        self.clone_listeners.clone()
    }
}

/// Convenience: interns an identifier in the design's interner.
pub fn intern(design: &Design, s: &str) -> Ident {
    design.interner.get_or_intern(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::DependencyKind;

    fn op(design: &mut Design, data_ports: usize) -> ComponentId {
        design.new_op(ComponentKind::Or, data_ports)
    }

    #[test]
    fn leaf_op_shape() {
        let mut d = Design::new();
        let or = op(&mut d, 2);
        assert_eq!(d.component(or).data_ports.len(), 2);
        assert!(d.done_exit(or).is_some());
        let exit = d.done_exit(or).unwrap();
        assert_eq!(d.exit(exit).data_buses.len(), 1);
        assert_eq!(d.exit(exit).latency, Latency::ZERO);
        assert!(d.exit(exit).peer.is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate exit tag")]
    fn duplicate_exit_tag_panics() {
        let mut d = Design::new();
        let or = op(&mut d, 2);
        d.make_exit(or, 1, ExitType::Done, None);
    }

    #[test]
    fn labeled_tags_are_distinct() {
        let mut d = Design::new();
        let c = d.new_component(ComponentKind::And);
        d.make_exit(c, 0, ExitType::Done, Some("true"));
        d.make_exit(c, 0, ExitType::Done, Some("false"));
        assert_eq!(d.component(c).exits.len(), 2);
    }

    #[test]
    #[should_panic(expected = "already has a this port")]
    fn second_this_port_panics() {
        let mut d = Design::new();
        let c = op(&mut d, 0);
        d.make_this_port(c);
        d.make_this_port(c);
    }

    #[test]
    fn set_bus_maintains_both_sides() {
        let mut d = Design::new();
        let src = op(&mut d, 0);
        let dst = op(&mut d, 1);
        let bus = d.result_bus(src);
        let port = d.component(dst).data_ports[0];
        d.set_bus(port, bus);
        assert_eq!(d.port(port).bus, Some(bus));
        assert!(d.bus(bus).ports.contains(&port));
        d.disconnect_port(port);
        assert_eq!(d.port(port).bus, None);
        assert!(!d.bus(bus).ports.contains(&port));
    }

    #[test]
    fn dependency_round_trip_and_zap() {
        let mut d = Design::new();
        let src = op(&mut d, 0);
        let dst = op(&mut d, 1);
        let bus = d.result_bus(src);
        let port = d.component(dst).data_ports[0];
        let entry = d.make_entry(dst, None);
        let dep = Dependency::data(bus);
        d.add_dependency(entry, port, dep);
        assert!(d.entry(entry).dependencies_for(port).any(|&x| x == dep));
        assert!(d.bus(bus).logical_dependents.contains(&(entry, port)));

        assert!(d.zap_dependency(entry, port, dep));
        assert_eq!(d.entry(entry).dependencies_for(port).count(), 0);
        assert!(!d.bus(bus).logical_dependents.contains(&(entry, port)));
        // zapping again reports absence
        assert!(!d.zap_dependency(entry, port, dep));
    }

    #[test]
    fn duplicate_dependencies_collapse() {
        let mut d = Design::new();
        let src = op(&mut d, 0);
        let dst = op(&mut d, 1);
        let bus = d.result_bus(src);
        let port = d.component(dst).data_ports[0];
        let entry = d.make_entry(dst, None);
        d.add_dependency(entry, port, Dependency::data(bus));
        d.add_dependency(entry, port, Dependency::data(bus));
        assert_eq!(d.entry(entry).dependencies_for(port).count(), 1);
        // a different kind on the same bus is a distinct dependency
        d.add_dependency(entry, port, Dependency::new(DependencyKind::Control, bus));
        assert_eq!(d.entry(entry).dependencies_for(port).count(), 2);
    }

    #[test]
    #[should_panic(expected = "port does not belong")]
    fn foreign_port_dependency_panics() {
        let mut d = Design::new();
        let src = op(&mut d, 0);
        let other = op(&mut d, 1);
        let dst = op(&mut d, 0);
        let bus = d.result_bus(src);
        let foreign_port = d.component(other).data_ports[0];
        let entry = d.make_entry(dst, None);
        d.add_dependency(entry, foreign_port, Dependency::data(bus));
    }

    #[test]
    fn decimate_completeness() {
        let mut d = Design::new();
        let src = op(&mut d, 0);
        let dst = op(&mut d, 2);
        let bus = d.result_bus(src);
        let src_exit = d.done_exit(src).unwrap();
        let p0 = d.component(dst).data_ports[0];
        let p1 = d.component(dst).data_ports[1];
        let entry = d.make_entry(dst, Some(src_exit));
        d.add_dependency(entry, p0, Dependency::data(bus));
        d.add_dependency(entry, p1, Dependency::data(bus));
        assert!(d.exit(src_exit).driven_entries.contains(&entry));

        d.decimate(entry);
        assert!(d.entry(entry).is_empty());
        assert_eq!(d.entry(entry).driving_exit, None);
        assert!(!d.exit(src_exit).driven_entries.contains(&entry));
        assert!(d.bus(bus).logical_dependents.is_empty());
    }

    #[test]
    fn main_entry_requires_exactly_one() {
        let mut d = Design::new();
        let c = op(&mut d, 0);
        assert_eq!(d.main_entry(c), None);
        let e = d.make_entry(c, None);
        assert_eq!(d.main_entry(c), Some(e));
        d.make_entry(c, None);
        assert_eq!(d.main_entry(c), None);
    }

    #[test]
    fn remove_data_port_scenario() {
        let mut d = Design::new();
        let src = op(&mut d, 0);
        let dst = op(&mut d, 1);
        let bus = d.result_bus(src);
        let port = d.component(dst).data_ports[0];
        d.set_bus(port, bus);
        let entry = d.make_entry(dst, None);
        d.add_dependency(entry, port, Dependency::data(bus));

        assert!(d.remove_data_port(dst, port));
        assert!(!d.bus(bus).ports.contains(&port));
        assert_eq!(d.entry(entry).dependencies_for(port).count(), 0);
        assert!(d.component(dst).data_ports.is_empty());
        // second removal: the port is unknown now
        assert!(!d.remove_data_port(dst, port));
    }

    #[test]
    fn boundary_port_removal_cascades_to_inbuf_bus() {
        let mut d = Design::new();
        let m = d.new_module(2);
        let p0 = d.component(m).data_ports[0];
        let p1 = d.component(m).data_ports[1];
        let stale = d.inbuf_data_bus(m, 0);
        let kept = d.port(p1).peer.unwrap();

        assert!(d.remove_data_port(m, p0));
        // the peered InBuf bus goes with the port, so indexing does not skew
        let inbuf_exit = d.inbuf_exit(m);
        assert!(!d.exit(inbuf_exit).data_buses.contains(&stale));
        assert_eq!(d.exit(inbuf_exit).data_buses.len(), 3);
        assert_eq!(d.inbuf_data_bus(m, 0), kept);
        assert_eq!(d.component(m).data_ports, vec![p1]);
    }

    #[test]
    fn exit_bus_removal_cascades_to_peer_port() {
        let mut d = Design::new();
        let m = d.new_module(0);
        let exit = d.make_exit(m, 2, ExitType::Done, None);
        let outbuf = d.exit(exit).peer.unwrap();
        let bus = d.exit(exit).data_buses[0];
        let port = d.bus(bus).peer.unwrap();
        assert!(d.component(outbuf).data_ports.contains(&port));

        assert!(d.remove_data_bus(exit, bus));
        assert!(!d.exit(exit).data_buses.contains(&bus));
        assert!(!d.component(outbuf).data_ports.contains(&port));
        // second removal: the bus is unknown now
        assert!(!d.remove_data_bus(exit, bus));
    }

    #[test]
    #[should_panic(expected = "cannot remove a data port from a Mux")]
    fn mux_port_removal_panics() {
        let mut d = Design::new();
        let mux = d.new_op(ComponentKind::Mux, 2);
        let port = d.component(mux).data_ports[0];
        d.remove_data_port(mux, port);
    }

    #[test]
    fn module_boundary_peering() {
        let mut d = Design::new();
        let m = d.new_module(2);
        let c = d.component(m);
        let clock_port = c.clock_port;
        let data0 = c.data_ports[0];
        assert_eq!(d.port(clock_port).peer, Some(d.inbuf_clock_bus(m)));
        assert_eq!(d.port(data0).peer, Some(d.inbuf_data_bus(m, 0)));
        assert_eq!(d.bus(d.inbuf_data_bus(m, 0)).peer, Some(data0));
        // the InBuf is a child of the module
        let inbuf = d.component(m).body().unwrap().inbuf;
        assert!(d.component(m).body().unwrap().children.contains(&inbuf));
        assert_eq!(d.component(inbuf).owner, Some(m));
    }

    #[test]
    fn module_exit_fabricates_outbuf() {
        let mut d = Design::new();
        let m = d.new_module(0);
        let exit = d.make_exit(m, 2, ExitType::Done, None);
        let outbuf = d.exit(exit).peer.expect("module exit has an OutBuf");
        assert!(matches!(
            d.component(outbuf).kind,
            ComponentKind::OutBuf { .. }
        ));
        assert_eq!(d.component(outbuf).data_ports.len(), 2);
        let go = d.component(outbuf).go_port;
        assert_eq!(d.port(go).peer, Some(d.exit(exit).done_bus));
        let p0 = d.component(outbuf).data_ports[0];
        assert_eq!(d.port(p0).peer, Some(d.exit(exit).data_buses[0]));
    }

    #[test]
    fn merge_exits_groups_by_tag() {
        let mut d = Design::new();
        let m = d.new_module(0);
        // three children: two completing with Done, one with Break
        let a = op(&mut d, 0);
        let b = op(&mut d, 0);
        let c = d.new_component(ComponentKind::Or);
        d.make_exit(c, 0, ExitType::Break, None);
        for child in [a, b, c] {
            d.add_component(m, child);
        }
        d.merge_exits(m, &[a, b, c]);

        // exactly two module exits: Done and Break
        assert_eq!(d.component(m).exits.len(), 2);
        let done = d.get_exit(m, d.exit_tag(ExitType::Done, None)).unwrap();
        let brk = d.get_exit(m, d.exit_tag(ExitType::Break, None)).unwrap();
        // the Done OutBuf has one entry per contributing child exit
        let done_ob = d.exit(done).peer.unwrap();
        assert_eq!(d.component(done_ob).entries.len(), 2);
        let brk_ob = d.exit(brk).peer.unwrap();
        assert_eq!(d.component(brk_ob).entries.len(), 1);
        // each entry is driven by its contributing exit and controls on the
        // child's done bus
        let entry = d.component(done_ob).entries[0];
        let driving = d.entry(entry).driving_exit.unwrap();
        assert!(driving == d.done_exit(a).unwrap() || driving == d.done_exit(b).unwrap());
        let go = d.component(done_ob).go_port;
        let dep = *d.entry(entry).dependencies_for(go).next().unwrap();
        assert_eq!(dep.kind, DependencyKind::Control);
        assert_eq!(dep.logical_bus, d.exit(driving).done_bus);
    }

    #[test]
    fn change_exit_replays_outbuf_entries() {
        let mut d = Design::new();
        let m = d.new_module(0);
        let child = op(&mut d, 0);
        d.add_component(m, child);
        d.merge_exits(m, &[child]);
        let old = d.done_exit(m).unwrap();
        let old_ob = d.exit(old).peer.unwrap();
        assert_eq!(d.component(old_ob).entries.len(), 1);

        let new = d.change_exit(m, old, ExitType::Return);
        assert!(!d.contains_component(old_ob));
        assert_eq!(d.component(m).exits.len(), 1);
        assert_eq!(d.exit(new).tag.ty, ExitType::Return);
        let new_ob = d.exit(new).peer.unwrap();
        assert_eq!(d.component(new_ob).entries.len(), 1);
        let entry = d.component(new_ob).entries[0];
        assert_eq!(d.entry(entry).driving_exit, Some(d.done_exit(child).unwrap()));
        let go = d.component(new_ob).go_port;
        let dep = *d.entry(entry).dependencies_for(go).next().unwrap();
        assert_eq!(dep.logical_bus, d.done_bus(child));
    }

    #[test]
    fn remove_component_cleans_up_consumers() {
        let mut d = Design::new();
        let src = op(&mut d, 0);
        let dst = op(&mut d, 1);
        let bus = d.result_bus(src);
        let port = d.component(dst).data_ports[0];
        d.set_bus(port, bus);
        let entry = d.make_entry(dst, Some(d.done_exit(src).unwrap()));
        d.add_dependency(entry, port, Dependency::data(bus));

        d.remove_component(src);
        assert!(!d.contains_component(src));
        assert_eq!(d.port(port).bus, None);
        assert_eq!(d.entry(entry).dependencies_for(port).count(), 0);
        assert_eq!(d.entry(entry).driving_exit, None);
    }

    #[test]
    fn replace_component_transfers_wiring() {
        let mut d = Design::new();
        let m = d.new_module(0);
        let old = op(&mut d, 1);
        let consumer = op(&mut d, 1);
        d.add_component(m, old);
        d.add_component(m, consumer);
        // consumer reads the old component's result
        let cport = d.component(consumer).data_ports[0];
        d.set_bus(cport, d.result_bus(old));
        let entry = d.make_entry(consumer, Some(d.done_exit(old).unwrap()));
        d.add_dependency(entry, cport, Dependency::data(d.result_bus(old)));

        let new = d.new_op(ComponentKind::And, 1);
        d.replace_component(old, new);
        assert!(!d.contains_component(old));
        assert!(d.component(m).body().unwrap().children.contains(&new));
        assert_eq!(d.port(cport).bus, Some(d.result_bus(new)));
        assert_eq!(d.entry(entry).driving_exit, Some(d.done_exit(new).unwrap()));
        let dep = *d.entry(entry).dependencies_for(cport).next().unwrap();
        assert_eq!(dep.logical_bus, d.result_bus(new));
    }

    #[test]
    fn trace_hierarchy_names_the_owner_chain() {
        let mut d = Design::new();
        let m = d.new_module(0);
        let block = d.new_block(0, false);
        d.add_component(m, block);
        let or = op(&mut d, 0);
        d.append_to_sequence(block, or);
        assert_eq!(d.trace_hierarchy(or), "Module/Block/Or");
        assert_eq!(d.trace_hierarchy(m), "Module");
        // a dead ID degrades to the sentinel instead of panicking
        d.remove_component(or);
        assert_eq!(d.trace_hierarchy(or), "<unresolved hierarchy>");
    }

    #[test]
    fn serde_roundtrip_of_small_design() {
        let mut d = Design::new();
        let m = d.new_module(1);
        let child = op(&mut d, 1);
        d.add_component(m, child);
        let port = d.component(child).data_ports[0];
        let entry = d.make_entry(child, None);
        d.add_dependency(entry, port, Dependency::data(d.inbuf_data_bus(m, 0)));

        let json = serde_json::to_string(&d).unwrap();
        let restored: Design = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.component(child).data_ports.len(), 1);
        assert_eq!(
            restored.entry(entry).dependencies_for(port).count(),
            1
        );
        assert!(restored
            .bus(d.inbuf_data_bus(m, 0))
            .logical_dependents
            .contains(&(entry, port)));
    }
}
