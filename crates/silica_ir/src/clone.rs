//! Deep cloning of components and module subtrees.
//!
//! A clone is structurally independent of its original: every component,
//! port, bus, exit, and entry of the subtree is re-allocated, and all
//! internal wiring (structural connections, entries, dependencies,
//! sequences, feedback points, composite handles) is replayed through the
//! original→clone [`CloneMap`]. External context is deliberately not
//! cloned: the clone's boundary ports start disconnected and the clone has
//! no entries of its own — the caller wires it into its new surroundings.
//!
//! Propagated values are not carried over; they are recomputed by the next
//! propagation sweep.

use crate::component::ComponentKind;
use crate::design::Design;
use crate::entry::Dependency;
use crate::ids::{BusId, ComponentId, EntryId, ExitId, PortId};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a component cannot be cloned.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum CloneError {
    /// The component, or one in its subtree, is tied to a unique resource.
    #[error("a {0} component cannot be cloned")]
    Unsupported(&'static str),
}

/// The original→clone correspondence produced by a clone operation.
#[derive(Clone, Debug, Default)]
pub struct CloneMap {
    /// Original component → its clone.
    pub components: BTreeMap<ComponentId, ComponentId>,
    /// Original port → its clone.
    pub ports: BTreeMap<PortId, PortId>,
    /// Original bus → its clone.
    pub buses: BTreeMap<BusId, BusId>,
    /// Original exit → its clone.
    pub exits: BTreeMap<ExitId, ExitId>,
    /// Original entry → its replayed clone.
    pub entries: BTreeMap<EntryId, EntryId>,
}

impl CloneMap {
    /// The clone of a component.
    ///
    /// # Panics
    ///
    /// Panics if the component was not part of the cloned subtree.
    pub fn component(&self, original: ComponentId) -> ComponentId {
        self.components[&original]
    }

    /// The clone of a bus.
    ///
    /// # Panics
    ///
    /// Panics if the bus was not part of the cloned subtree.
    pub fn bus(&self, original: BusId) -> BusId {
        self.buses[&original]
    }
}

/// Observer notified with the correspondence map after every clone, so
/// side tables keyed by IDs can follow their subjects.
pub trait CloneListener {
    /// Called once per completed clone operation.
    fn cloned(&self, design: &Design, map: &CloneMap);
}

impl Design {
    /// Deep-clones a component, returning the clone's ID.
    ///
    /// See [`clone_component_mapped`](Self::clone_component_mapped).
    pub fn clone_component(&mut self, comp: ComponentId) -> Result<ComponentId, CloneError> {
        let (clone, _) = self.clone_component_mapped(comp)?;
        Ok(clone)
    }

    /// Deep-clones a component and returns the clone along with the
    /// original→clone map.
    ///
    /// Boundary adapters cannot be cloned directly, and gateways and pins
    /// cannot be cloned at all; the subtree is checked up front so a
    /// refusal never leaves a partial clone behind. Registered
    /// [`CloneListener`]s are notified once the clone is complete.
    pub fn clone_component_mapped(
        &mut self,
        comp: ComponentId,
    ) -> Result<(ComponentId, CloneMap), CloneError> {
        match &self.components[comp].kind {
            ComponentKind::InBuf
            | ComponentKind::OutBuf { .. }
            | ComponentKind::Gateway
            | ComponentKind::Pin => {
                return Err(CloneError::Unsupported(self.components[comp].kind.name()))
            }
            _ => self.ensure_subtree_cloneable(comp)?,
        }
        let mut map = CloneMap::default();
        let clone = self.clone_into(comp, &mut map);
        for listener in self.clone_listeners() {
            listener.cloned(self, &map);
        }
        Ok((clone, map))
    }

    fn ensure_subtree_cloneable(&self, comp: ComponentId) -> Result<(), CloneError> {
        let Some(body) = self.components[comp].body() else {
            return Ok(());
        };
        for &child in &body.children {
            match &self.components[child].kind {
                // the adapters of a body are refabricated, not cloned
                ComponentKind::InBuf | ComponentKind::OutBuf { .. } => {}
                ComponentKind::Gateway | ComponentKind::Pin => {
                    return Err(CloneError::Unsupported(
                        self.components[child].kind.name(),
                    ))
                }
                _ => self.ensure_subtree_cloneable(child)?,
            }
        }
        Ok(())
    }

    fn clone_into(&mut self, comp: ComponentId, map: &mut CloneMap) -> ComponentId {
        if self.components[comp].is_module() {
            self.clone_composite(comp, map)
        } else {
            self.clone_leaf(comp, map)
        }
    }

    fn clone_leaf(&mut self, comp: ComponentId, map: &mut CloneMap) -> ComponentId {
        let kind = self.components[comp].kind.clone();
        let clone = self.new_component(kind);
        map.components.insert(comp, clone);
        self.pair_fixed_ports(comp, clone, map);
        for port in self.components[comp].data_ports.clone() {
            let tag = self.ports[port].tag;
            let new_port = self.make_data_port(clone, tag);
            self.ports[new_port].used = self.ports[port].used;
            map.ports.insert(port, new_port);
        }
        if let Some(this) = self.components[comp].this_port {
            let new_this = self.make_this_port(clone);
            self.ports[new_this].used = self.ports[this].used;
            map.ports.insert(this, new_this);
        }
        self.clone_exits(comp, clone, map);
        self.copy_surface(comp, clone);
        clone
    }

    fn clone_composite(&mut self, comp: ComponentId, map: &mut CloneMap) -> ComponentId {
        let data_count = self.components[comp].data_ports.len();
        // decision handles still point at the originals here; they are
        // redirected through the map once the children exist
        let clone = match &self.components[comp].kind {
            ComponentKind::Block { procedure_body, .. } => {
                let procedure_body = *procedure_body;
                self.new_composite(
                    |inbuf| ComponentKind::block(inbuf, procedure_body),
                    data_count,
                )
            }
            ComponentKind::Decision {
                test_block,
                test_component,
                not,
                true_and,
                false_and,
                ..
            } => {
                let (tb, tc, n, ta, fa) =
                    (*test_block, *test_component, *not, *true_and, *false_and);
                self.new_composite(
                    |inbuf| ComponentKind::decision(inbuf, tb, tc, n, ta, fa),
                    data_count,
                )
            }
            ComponentKind::Module { .. } => self.new_composite(ComponentKind::module, data_count),
            other => unreachable!("clone_composite on a {} leaf", other.name()),
        };
        map.components.insert(comp, clone);
        self.pair_fixed_ports(comp, clone, map);
        let old_data = self.components[comp].data_ports.clone();
        let new_data = self.components[clone].data_ports.clone();
        for (&old_port, &new_port) in old_data.iter().zip(&new_data) {
            self.ports[new_port].tag = self.ports[old_port].tag;
            self.ports[new_port].used = self.ports[old_port].used;
            map.ports.insert(old_port, new_port);
        }

        // pair the fresh InBuf with the original's
        let old_inbuf = self.components[comp].body().expect("composite").inbuf;
        let new_inbuf = self.components[clone].body().expect("composite").inbuf;
        map.components.insert(old_inbuf, new_inbuf);
        self.pair_fixed_ports(old_inbuf, new_inbuf, map);
        let old_ie = self.single_exit(old_inbuf);
        let new_ie = self.single_exit(new_inbuf);
        map.exits.insert(old_ie, new_ie);
        let old_buses: Vec<BusId> = self.exits[old_ie].buses().collect();
        let new_buses: Vec<BusId> = self.exits[new_ie].buses().collect();
        for (&old_bus, &new_bus) in old_buses.iter().zip(&new_buses) {
            self.pair_buses(old_bus, new_bus, map);
        }

        // clone the children, skipping the boundary adapters (the InBuf is
        // already paired, the OutBufs are refabricated with the exits)
        let children: Vec<ComponentId> = self.components[comp]
            .body()
            .expect("composite")
            .children
            .iter()
            .copied()
            .collect();
        for &child in &children {
            if matches!(
                self.components[child].kind,
                ComponentKind::InBuf | ComponentKind::OutBuf { .. }
            ) {
                continue;
            }
            let child_clone = self.clone_into(child, map);
            self.add_component(clone, child_clone);
        }

        self.clone_exits(comp, clone, map);
        self.redirect_composite_handles(comp, clone, map);
        self.copy_body_flags(comp, clone, map);
        self.copy_surface(comp, clone);

        // replay the internal wiring of the direct children now that every
        // bus and exit of the subtree is paired
        for &child in &children {
            self.replay_child(child, map);
        }
        clone
    }

    /// Pairs the clock, reset, and go ports of a clone with the original's,
    /// carrying the used flags over.
    fn pair_fixed_ports(&mut self, old: ComponentId, new: ComponentId, map: &mut CloneMap) {
        let pairs = [
            (
                self.components[old].clock_port,
                self.components[new].clock_port,
            ),
            (
                self.components[old].reset_port,
                self.components[new].reset_port,
            ),
            (self.components[old].go_port, self.components[new].go_port),
        ];
        for (old_port, new_port) in pairs {
            self.ports[new_port].used = self.ports[old_port].used;
            self.ports[new_port].tag = self.ports[old_port].tag;
            map.ports.insert(old_port, new_port);
        }
    }

    /// Pairs a cloned bus with its original, carrying the declared shape
    /// over. The propagated value is left for the next sweep.
    fn pair_buses(&mut self, old: BusId, new: BusId, map: &mut CloneMap) {
        let (size, signed, tag, used) = {
            let b = &self.buses[old];
            (b.size, b.signed, b.tag, b.used)
        };
        let b = &mut self.buses[new];
        b.size = size;
        b.signed = signed;
        b.tag = tag;
        b.used = used;
        map.buses.insert(old, new);
    }

    /// Recreates every exit of the original on the clone, pairing buses and,
    /// on composites, the fabricated `OutBuf` peers.
    fn clone_exits(&mut self, old: ComponentId, new: ComponentId, map: &mut CloneMap) {
        let exits: Vec<(crate::exit::ExitTag, ExitId)> = self.components[old]
            .exits
            .iter()
            .map(|(&t, &e)| (t, e))
            .collect();
        for (tag, old_exit) in exits {
            let arity = self.exits[old_exit].data_buses.len();
            let new_exit = self.make_exit_tagged(new, arity, tag);
            map.exits.insert(old_exit, new_exit);
            self.exits[new_exit].latency = self.exits[old_exit].latency;
            let old_buses: Vec<BusId> = self.exits[old_exit].buses().collect();
            let new_buses: Vec<BusId> = self.exits[new_exit].buses().collect();
            for (&ob, &nb) in old_buses.iter().zip(&new_buses) {
                self.pair_buses(ob, nb, map);
            }
            if let (Some(old_ob), Some(new_ob)) =
                (self.exits[old_exit].peer, self.exits[new_exit].peer)
            {
                map.components.insert(old_ob, new_ob);
                self.pair_fixed_ports(old_ob, new_ob, map);
                let old_data = self.components[old_ob].data_ports.clone();
                let new_data = self.components[new_ob].data_ports.clone();
                for (&op, &np) in old_data.iter().zip(&new_data) {
                    self.ports[np].used = self.ports[op].used;
                    map.ports.insert(op, np);
                }
            }
        }
    }

    /// Redirects the kind-specific child handles of a cloned composite
    /// through the map.
    fn redirect_composite_handles(
        &mut self,
        old: ComponentId,
        new: ComponentId,
        map: &CloneMap,
    ) {
        match &self.components[old].kind {
            ComponentKind::Block { sequence, .. } => {
                let mapped: Vec<ComponentId> =
                    sequence.iter().map(|c| map.components[c]).collect();
                if let ComponentKind::Block { sequence, .. } = &mut self.components[new].kind {
                    *sequence = mapped;
                }
            }
            ComponentKind::Decision {
                test_block,
                test_component,
                not,
                true_and,
                false_and,
                no_decision_exit,
                ..
            } => {
                let mapped = (
                    map.components[test_block],
                    map.components[test_component],
                    map.components[not],
                    map.components[true_and],
                    map.components[false_and],
                    no_decision_exit.map(|e| map.exits[&e]),
                );
                if let ComponentKind::Decision {
                    test_block,
                    test_component,
                    not,
                    true_and,
                    false_and,
                    no_decision_exit,
                    ..
                } = &mut self.components[new].kind
                {
                    (
                        *test_block,
                        *test_component,
                        *not,
                        *true_and,
                        *false_and,
                        *no_decision_exit,
                    ) = mapped;
                }
            }
            _ => {}
        }
    }

    fn copy_body_flags(&mut self, old: ComponentId, new: ComponentId, map: &CloneMap) {
        let (feedback, consumes_go, produces_done, done_synchronous, consumes_clock, consumes_reset) = {
            let body = self.components[old].body().expect("composite");
            (
                body.feedback_points.clone(),
                body.consumes_go,
                body.produces_done,
                body.done_synchronous,
                body.consumes_clock,
                body.consumes_reset,
            )
        };
        let body = self.components[new].body_mut().expect("composite");
        body.feedback_points = feedback.iter().map(|c| map.components[c]).collect();
        body.consumes_go = consumes_go;
        body.produces_done = produces_done;
        body.done_synchronous = done_synchronous;
        body.consumes_clock = consumes_clock;
        body.consumes_reset = consumes_reset;
    }

    fn copy_surface(&mut self, old: ComponentId, new: ComponentId) {
        let (non_removable, opaque, attributes, option_label) = {
            let c = &self.components[old];
            (
                c.non_removable,
                c.opaque,
                c.attributes.clone(),
                c.option_label,
            )
        };
        let c = &mut self.components[new];
        c.non_removable = non_removable;
        c.opaque = opaque;
        c.attributes = attributes;
        c.option_label = option_label;
    }

    /// Replays one original child's structural connections and entries onto
    /// its clone. Connections and dependencies reaching outside the cloned
    /// subtree are dropped; the caller rewires the boundary.
    fn replay_child(&mut self, child: ComponentId, map: &mut CloneMap) {
        let ports: Vec<PortId> = self.components[child].ports().collect();
        for port in ports {
            if let Some(bus) = self.ports[port].bus {
                if let (Some(&new_port), Some(&new_bus)) =
                    (map.ports.get(&port), map.buses.get(&bus))
                {
                    self.set_bus(new_port, new_bus);
                }
            }
        }
        let new_owner = map.components[&child];
        for entry in self.components[child].entries.clone() {
            let driving = self.entries[entry]
                .driving_exit
                .and_then(|e| map.exits.get(&e).copied());
            let new_entry = self.make_entry(new_owner, driving);
            map.entries.insert(entry, new_entry);
            for (port, deps) in self.entries[entry].dependencies.clone() {
                let Some(&new_port) = map.ports.get(&port) else {
                    continue;
                };
                for dep in deps {
                    if let Some(&new_bus) = map.buses.get(&dep.logical_bus) {
                        self.add_dependency(new_entry, new_port, Dependency::new(dep.kind, new_bus));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::DependencyKind;
    use crate::exit::ExitType;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn leaf_clone_is_disconnected_and_independent() {
        let mut d = Design::new();
        let src = d.new_op(ComponentKind::Or, 0);
        let or = d.new_op(ComponentKind::Or, 2);
        let port = d.component(or).data_ports[0];
        d.set_bus(port, d.result_bus(src));
        let entry = d.make_entry(or, None);
        d.add_dependency(entry, port, Dependency::data(d.result_bus(src)));

        let clone = d.clone_component(or).unwrap();
        assert_ne!(clone, or);
        assert_eq!(d.component(clone).data_ports.len(), 2);
        assert_ne!(d.result_bus(clone), d.result_bus(or));
        // the clone carries no wiring or activations of its own
        for p in d.component(clone).ports().collect::<Vec<_>>() {
            assert_eq!(d.port(p).bus, None);
        }
        assert!(d.component(clone).entries.is_empty());
        // the original is untouched
        assert_eq!(d.port(port).bus, Some(d.result_bus(src)));
        assert_eq!(d.entry(entry).dependencies_for(port).count(), 1);
    }

    #[test]
    fn boundary_and_resource_kinds_refuse() {
        let mut d = Design::new();
        let gateway = d.new_component(ComponentKind::Gateway);
        assert_eq!(
            d.clone_component(gateway),
            Err(CloneError::Unsupported("Gateway"))
        );
        let m = d.new_module(0);
        let inbuf = d.component(m).body().unwrap().inbuf;
        assert_eq!(
            d.clone_component(inbuf),
            Err(CloneError::Unsupported("InBuf"))
        );
        // a pin buried in the subtree poisons the whole clone
        let pin = d.new_component(ComponentKind::Pin);
        d.add_component(m, pin);
        assert_eq!(d.clone_component(m), Err(CloneError::Unsupported("Pin")));
    }

    #[test]
    fn module_clone_replays_internal_wiring() {
        let mut d = Design::new();
        let m = d.new_module(1);
        let src = d.new_op(ComponentKind::Or, 0);
        let dst = d.new_op(ComponentKind::Or, 1);
        d.add_component(m, src);
        d.add_component(m, dst);
        let dport = d.component(dst).data_ports[0];
        d.set_bus(dport, d.result_bus(src));
        let entry = d.make_entry(dst, Some(d.done_exit(src).unwrap()));
        d.add_dependency(entry, dport, Dependency::data(d.result_bus(src)));
        d.add_dependency(
            entry,
            d.component(dst).go_port,
            Dependency::control(d.inbuf_go_bus(m)),
        );
        d.merge_exits(m, &[dst]);

        let (clone, map) = d.clone_component_mapped(m).unwrap();
        let (src2, dst2) = (map.component(src), map.component(dst));
        assert!(d.component(clone).body().unwrap().children.contains(&src2));

        // fresh boundary adapters
        let inbuf2 = d.component(clone).body().unwrap().inbuf;
        assert_ne!(inbuf2, d.component(m).body().unwrap().inbuf);
        let done2 = d.done_exit(clone).unwrap();
        assert_ne!(Some(done2), d.done_exit(m));
        assert!(d.exit(done2).peer.is_some());

        // the structural connection and the entry follow the map
        let dport2 = d.component(dst2).data_ports[0];
        assert_eq!(d.port(dport2).bus, Some(d.result_bus(src2)));
        let entry2 = d.main_entry(dst2).unwrap();
        assert_eq!(d.entry(entry2).driving_exit, d.done_exit(src2));
        let go2 = d.component(dst2).go_port;
        let dep = *d.entry(entry2).dependencies_for(go2).next().unwrap();
        assert_eq!(dep.kind, DependencyKind::Control);
        assert_eq!(dep.logical_bus, d.inbuf_go_bus(clone));

        // the module exit's OutBuf entry is replayed too
        let ob2 = d.exit(done2).peer.unwrap();
        let oe2 = d.main_entry(ob2).unwrap();
        assert_eq!(d.entry(oe2).driving_exit, d.done_exit(dst2));
    }

    #[test]
    fn block_clone_remaps_the_sequence() {
        let mut d = Design::new();
        let block = d.new_block(0, false);
        let first = d.new_op(ComponentKind::Or, 0);
        let second = d.new_op(ComponentKind::Or, 0);
        d.append_to_sequence(block, first);
        d.append_to_sequence(block, second);
        d.wire_block_control(block);

        let (clone, map) = d.clone_component_mapped(block).unwrap();
        let sequence = match &d.component(clone).kind {
            ComponentKind::Block { sequence, .. } => sequence.clone(),
            _ => unreachable!(),
        };
        assert_eq!(
            sequence,
            vec![map.component(first), map.component(second)]
        );
        // the go chain holds inside the clone
        let e = d.main_entry(map.component(second)).unwrap();
        assert_eq!(
            d.entry(e).driving_exit,
            d.done_exit(map.component(first))
        );
    }

    #[test]
    fn decision_clone_redirects_its_handles() {
        let mut d = Design::new();
        let test_block = d.new_block(0, false);
        let source = d.new_op(ComponentKind::Or, 0);
        d.append_to_sequence(test_block, source);
        d.wire_block_control(test_block);
        let decision = d.new_decision(test_block, source);

        let (clone, map) = d.clone_component_mapped(decision).unwrap();
        let (tb2, tc2, not2, ta2, fa2) = match &d.component(clone).kind {
            ComponentKind::Decision {
                test_block,
                test_component,
                not,
                true_and,
                false_and,
                ..
            } => (*test_block, *test_component, *not, *true_and, *false_and),
            _ => unreachable!(),
        };
        assert_eq!(tb2, map.component(test_block));
        assert_eq!(tc2, map.component(source));
        assert_ne!(not2, map.component(test_block));
        assert!(d.component(clone).body().unwrap().children.contains(&ta2));
        assert!(d.component(clone).body().unwrap().children.contains(&fa2));
        // the clone's test component keeps the protection mark
        assert!(d.component(tc2).non_removable);
        // both labeled exits exist with fresh OutBufs
        assert!(d
            .get_exit(clone, d.exit_tag(ExitType::Done, Some("true")))
            .is_some());
        assert!(d
            .get_exit(clone, d.exit_tag(ExitType::Done, Some("false")))
            .is_some());
    }

    #[test]
    fn listeners_see_the_map() {
        struct Flag(Rc<Cell<bool>>);
        impl CloneListener for Flag {
            fn cloned(&self, _design: &Design, map: &CloneMap) {
                assert!(!map.components.is_empty());
                self.0.set(true);
            }
        }
        let mut d = Design::new();
        let seen = Rc::new(Cell::new(false));
        d.add_clone_listener(Rc::new(Flag(seen.clone())));
        let or = d.new_op(ComponentKind::Or, 1);
        d.clone_component(or).unwrap();
        assert!(seen.get());
    }
}
