//! Decisions: boolean tests exposing mutually exclusive true/false exits.
//!
//! A decision wraps a boolean-producing test block. The test's completion
//! gates a direct AND (the true path) and a NOT→AND (the false path); both
//! ANDs consume the boolean value, so exactly one of the `(Done, "true")`
//! and `(Done, "false")` exits asserts once a test result is available. A
//! third, lazily synthesized `(Done, "NoDecision")` exit completes on the
//! test alone, ignoring the boolean.

use crate::component::ComponentKind;
use crate::design::Design;
use crate::entry::Dependency;
use crate::ids::{BusId, ComponentId};
use crate::exit::ExitType;

impl Design {
    /// Builds a decision around a boolean-producing test block.
    ///
    /// `test_block` must carry an unlabeled `Done` exit whose first data bus
    /// is the boolean; `test_component` is the component inside it producing
    /// that value and is marked non-removable so optimization cannot strip
    /// it.
    pub fn new_decision(
        &mut self,
        test_block: ComponentId,
        test_component: ComponentId,
    ) -> ComponentId {
        let not = self.new_op(ComponentKind::Not, 1);
        let true_and = self.new_op(ComponentKind::And, 2);
        let false_and = self.new_op(ComponentKind::And, 2);
        let decision = self.new_composite(
            |inbuf| {
                ComponentKind::decision(inbuf, test_block, test_component, not, true_and, false_and)
            },
            0,
        );
        self.add_component(decision, test_block);
        for gate in [not, true_and, false_and] {
            self.add_component(decision, gate);
        }
        self.component_mut(test_component).non_removable = true;

        let clock_bus = self.inbuf_clock_bus(decision);
        let reset_bus = self.inbuf_reset_bus(decision);
        let go_bus = self.inbuf_go_bus(decision);

        // activate the test from the decision's own boundary
        let entry = self.make_entry(test_block, None);
        let (cp, rp, gp) = {
            let c = self.component(test_block);
            (c.clock_port, c.reset_port, c.go_port)
        };
        self.add_dependency(entry, cp, Dependency::clock(clock_bus));
        self.add_dependency(entry, rp, Dependency::reset(reset_bus));
        self.add_dependency(entry, gp, Dependency::control(go_bus));

        let test_done = self
            .done_exit(test_block)
            .expect("test block must have a Done exit");
        let done_bus = self.exit(test_done).done_bus;
        let bool_bus = self.exit(test_done).data_buses[0];

        // true path: done AND boolean
        let entry = self.make_entry(true_and, Some(test_done));
        let ports = self.component(true_and).data_ports.clone();
        self.add_dependency(entry, ports[0], Dependency::data(done_bus));
        self.add_dependency(entry, ports[1], Dependency::data(bool_bus));

        // false path: done AND (NOT boolean)
        let entry = self.make_entry(not, Some(test_done));
        let not_port = self.component(not).data_ports[0];
        self.add_dependency(entry, not_port, Dependency::data(bool_bus));
        let entry = self.make_entry(false_and, Some(test_done));
        let ports = self.component(false_and).data_ports.clone();
        self.add_dependency(entry, ports[0], Dependency::data(done_bus));
        self.add_dependency(entry, ports[1], Dependency::data(self.result_bus(not)));

        // one labeled Done exit per path, completing on its gate's result
        for (label, gate) in [("true", true_and), ("false", false_and)] {
            let exit = self.make_exit(decision, 0, ExitType::Done, Some(label));
            let outbuf = self.exit(exit).peer.expect("decision exits have an OutBuf");
            let entry = self.make_entry(outbuf, Some(test_done));
            let (ob_clock, ob_reset, ob_go) = {
                let ob = self.component(outbuf);
                (ob.clock_port, ob.reset_port, ob.go_port)
            };
            self.add_dependency(entry, ob_clock, Dependency::clock(clock_bus));
            self.add_dependency(entry, ob_reset, Dependency::reset(reset_bus));
            self.add_dependency(entry, ob_go, Dependency::control(self.result_bus(gate)));
        }

        let body = self
            .component_mut(decision)
            .body_mut()
            .expect("decisions have a body");
        body.consumes_go = true;
        body.produces_done = true;
        decision
    }

    /// The done bus of the `(Done, "true")` exit.
    pub fn decision_true_bus(&self, decision: ComponentId) -> BusId {
        let exit = self
            .get_exit(decision, self.exit_tag(ExitType::Done, Some("true")))
            .expect("component is not a wired decision");
        self.exit(exit).done_bus
    }

    /// The done bus of the `(Done, "false")` exit.
    pub fn decision_false_bus(&self, decision: ComponentId) -> BusId {
        let exit = self
            .get_exit(decision, self.exit_tag(ExitType::Done, Some("false")))
            .expect("component is not a wired decision");
        self.exit(exit).done_bus
    }

    /// The done bus of the `(Done, "NoDecision")` exit, synthesizing and
    /// memoizing the exit on first use. It completes whenever the test
    /// completes, regardless of the boolean.
    pub fn no_decision_bus(&mut self, decision: ComponentId) -> BusId {
        let test_block = match &self.component(decision).kind {
            ComponentKind::Decision {
                no_decision_exit: Some(exit),
                ..
            } => return self.exit(*exit).done_bus,
            ComponentKind::Decision { test_block, .. } => *test_block,
            other => panic!("cannot take the no-decision bus of a {}", other.name()),
        };
        let clock_bus = self.inbuf_clock_bus(decision);
        let reset_bus = self.inbuf_reset_bus(decision);
        let test_done = self
            .done_exit(test_block)
            .expect("test block must have a Done exit");
        let done_bus = self.exit(test_done).done_bus;

        let exit = self.make_exit(decision, 0, ExitType::Done, Some("NoDecision"));
        let outbuf = self.exit(exit).peer.expect("decision exits have an OutBuf");
        let entry = self.make_entry(outbuf, Some(test_done));
        let (ob_clock, ob_reset, ob_go) = {
            let ob = self.component(outbuf);
            (ob.clock_port, ob.reset_port, ob.go_port)
        };
        self.add_dependency(entry, ob_clock, Dependency::clock(clock_bus));
        self.add_dependency(entry, ob_reset, Dependency::reset(reset_bus));
        self.add_dependency(entry, ob_go, Dependency::control(done_bus));

        if let ComponentKind::Decision {
            no_decision_exit, ..
        } = &mut self.component_mut(decision).kind
        {
            *no_decision_exit = Some(exit);
        }
        self.exit(exit).done_bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    /// Builds a decision whose test block wraps a single boolean source.
    fn wired_decision(d: &mut Design) -> (ComponentId, BusId, BusId) {
        let test_block = d.new_block(0, false);
        let source = d.new_op(ComponentKind::Or, 0);
        d.append_to_sequence(test_block, source);
        d.wire_block_control(test_block);
        // expose the boolean as the test block's data bus
        let done = d.done_exit(test_block).unwrap();
        let decision = d.new_decision(test_block, source);
        let done_bus = d.exit(done).done_bus;
        let bool_bus = d.exit(done).data_buses.first().copied();
        (decision, done_bus, bool_bus.unwrap_or(done_bus))
    }

    /// Drives the test result and settles the decision's gates.
    fn settle(d: &mut Design, decision: ComponentId, done_bus: BusId, bool_bus: BusId, test: bool) {
        d.bus_mut(done_bus).value = Some(Value::from_u64(1, 1, false));
        d.bus_mut(bool_bus).value = Some(Value::from_u64(u64::from(test), 1, false));
        let (not, true_and, false_and) = match &d.component(decision).kind {
            ComponentKind::Decision {
                not,
                true_and,
                false_and,
                ..
            } => (*not, *true_and, *false_and),
            _ => unreachable!(),
        };
        for comp in [not, true_and, false_and] {
            d.propagate_forward(comp);
        }
        let exits: Vec<_> = d.component(decision).exits.values().copied().collect();
        for exit in exits {
            if let Some(outbuf) = d.exit(exit).peer {
                d.propagate_forward(outbuf);
            }
        }
    }

    #[test]
    fn exposes_true_and_false_exits() {
        let mut d = Design::new();
        let (decision, _, _) = wired_decision(&mut d);
        assert_eq!(d.component(decision).exits.len(), 2);
        assert_ne!(
            d.decision_true_bus(decision),
            d.decision_false_bus(decision)
        );
    }

    #[test]
    fn test_component_is_non_removable() {
        let mut d = Design::new();
        let test_block = d.new_block(0, false);
        let source = d.new_op(ComponentKind::Or, 0);
        d.append_to_sequence(test_block, source);
        d.wire_block_control(test_block);
        d.new_decision(test_block, source);
        assert!(d.component(source).non_removable);
    }

    #[test]
    fn true_test_asserts_only_the_true_exit() {
        let mut d = Design::new();
        let (decision, done_bus, bool_bus) = wired_decision(&mut d);
        settle(&mut d, decision, done_bus, bool_bus, true);
        let true_value = d.bus(d.decision_true_bus(decision)).value.clone().unwrap();
        let false_value = d.bus(d.decision_false_bus(decision)).value.clone().unwrap();
        assert_eq!(true_value.to_u64(), Some(1));
        assert_eq!(false_value.to_u64(), Some(0));
    }

    #[test]
    fn false_test_asserts_only_the_false_exit() {
        let mut d = Design::new();
        let (decision, done_bus, bool_bus) = wired_decision(&mut d);
        settle(&mut d, decision, done_bus, bool_bus, false);
        let true_value = d.bus(d.decision_true_bus(decision)).value.clone().unwrap();
        let false_value = d.bus(d.decision_false_bus(decision)).value.clone().unwrap();
        assert_eq!(true_value.to_u64(), Some(0));
        assert_eq!(false_value.to_u64(), Some(1));
    }

    #[test]
    fn no_decision_bus_is_memoized() {
        let mut d = Design::new();
        let (decision, _, _) = wired_decision(&mut d);
        let first = d.no_decision_bus(decision);
        let second = d.no_decision_bus(decision);
        assert_eq!(first, second);
        assert_eq!(d.component(decision).exits.len(), 3);
        // completes on the test alone
        let exit = d
            .get_exit(decision, d.exit_tag(ExitType::Done, Some("NoDecision")))
            .unwrap();
        let outbuf = d.exit(exit).peer.unwrap();
        let entry = d.main_entry(outbuf).unwrap();
        let go = d.component(outbuf).go_port;
        let dep = *d.entry(entry).dependencies_for(go).next().unwrap();
        let test_done = match &d.component(decision).kind {
            ComponentKind::Decision { test_block, .. } => d.done_exit(*test_block).unwrap(),
            _ => unreachable!(),
        };
        assert_eq!(dep.logical_bus, d.exit(test_done).done_bus);
    }
}
