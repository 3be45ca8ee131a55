//! Sequential blocks: children executed in order along a go/done chain.
//!
//! A block activates its first child from the `InBuf` go continuation, each
//! later child from the previous child's `Done` completion, and synthesizes
//! its own completion from the end of the chain. Non-`Done` exits of the
//! children (break, continue, return) are merged by tag into block-level
//! exits so they bypass the rest of the sequence.

use crate::component::ComponentKind;
use crate::design::Design;
use crate::entry::Dependency;
use crate::exit::{ExitTag, ExitType};
use crate::ids::{ComponentId, ExitId};
use std::collections::BTreeMap;

impl Design {
    /// Creates an empty sequential block with `data_count` boundary data
    /// ports. A procedure body uses `Return` as its main exit type and its
    /// boundary ports are exempt from connectivity checking.
    pub fn new_block(&mut self, data_count: usize, procedure_body: bool) -> ComponentId {
        self.new_composite(|inbuf| ComponentKind::block(inbuf, procedure_body), data_count)
    }

    /// Adds a child to the block's body and appends it to the execution
    /// sequence.
    ///
    /// # Panics
    ///
    /// Panics if the component is not a block.
    pub fn append_to_sequence(&mut self, block: ComponentId, child: ComponentId) {
        self.add_component(block, child);
        match &mut self.component_mut(block).kind {
            ComponentKind::Block { sequence, .. } => sequence.push(child),
            other => panic!("cannot append to the sequence of a {}", other.name()),
        }
    }

    /// Wires the block's control chain: every child gets an entry carrying
    /// clock/reset dependencies on the `InBuf` buses and a control
    /// dependency on the current go bus; the chain then continues from the
    /// child's `Done` completion. Children's non-`Done` exits are merged by
    /// tag into block-level exits, and the final `Done` (or `Return` for a
    /// procedure body) exit is synthesized from the end of the chain. An
    /// empty block wires its `InBuf` straight to the `OutBuf`.
    ///
    /// # Panics
    ///
    /// Panics if the component is not a block or a sequence child lacks an
    /// unlabeled `Done` exit.
    pub fn wire_block_control(&mut self, block: ComponentId) {
        let (sequence, procedure_body) = match &self.component(block).kind {
            ComponentKind::Block {
                sequence,
                procedure_body,
                ..
            } => (sequence.clone(), *procedure_body),
            other => panic!("cannot wire the control chain of a {}", other.name()),
        };
        let clock_bus = self.inbuf_clock_bus(block);
        let reset_bus = self.inbuf_reset_bus(block);
        let mut go_bus = self.inbuf_go_bus(block);
        let mut prev_exit: Option<ExitId> = None;
        let mut side_exits: BTreeMap<ExitTag, Vec<ExitId>> = BTreeMap::new();

        for &child in &sequence {
            let entry = self.make_entry(child, prev_exit);
            let (cp, rp, gp) = {
                let c = self.component(child);
                (c.clock_port, c.reset_port, c.go_port)
            };
            self.add_dependency(entry, cp, Dependency::clock(clock_bus));
            self.add_dependency(entry, rp, Dependency::reset(reset_bus));
            self.add_dependency(entry, gp, Dependency::control(go_bus));

            // exits other than Done leave the block early and are merged
            // by tag; the go chain continues through Done only
            let done_tag = self.exit_tag(ExitType::Done, None);
            for (&tag, &exit) in &self.component(child).exits {
                if tag != done_tag {
                    side_exits.entry(tag).or_default().push(exit);
                }
            }
            let done = self
                .done_exit(child)
                .expect("sequence child must have a Done exit");
            go_bus = self.exit(done).done_bus;
            prev_exit = Some(done);
        }

        for (tag, exits) in side_exits {
            self.merge_exit_group(block, tag, &exits, clock_bus, reset_bus);
        }

        let final_ty = if procedure_body {
            ExitType::Return
        } else {
            ExitType::Done
        };
        match prev_exit {
            // the block completes with the end of the chain, forwarding the
            // last child's data buses
            Some(last_done) => {
                let tag = self.exit_tag(final_ty, None);
                self.merge_exit_group(block, tag, &[last_done], clock_bus, reset_bus);
            }
            // empty block: InBuf wired straight to OutBuf
            None => {
                let exit = self.make_exit(block, 0, final_ty, None);
                let outbuf = self.exit(exit).peer.expect("block exits have an OutBuf");
                let entry = self.make_entry(outbuf, None);
                let (ob_clock, ob_reset, ob_go) = {
                    let ob = self.component(outbuf);
                    (ob.clock_port, ob.reset_port, ob.go_port)
                };
                self.add_dependency(entry, ob_clock, Dependency::clock(clock_bus));
                self.add_dependency(entry, ob_reset, Dependency::reset(reset_bus));
                self.add_dependency(entry, ob_go, Dependency::control(go_bus));
            }
        }

        let body = self
            .component_mut(block)
            .body_mut()
            .expect("blocks have a body");
        body.consumes_go = true;
        body.produces_done = true;
    }
}
