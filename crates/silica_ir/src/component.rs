//! Components: the nodes of the design graph.
//!
//! Shared structure (ports, exits, entries, owner, attributes) lives in
//! [`Component`]; per-kind structure and behavior live in the closed
//! [`ComponentKind`] union and are dispatched by `match` — the scheduling
//! contract queries at the bottom of this file, the propagation rules in
//! [`propagate`](crate::propagate), and the clone fix-ups in
//! [`clone`](crate::clone).

use crate::exit::ExitTag;
use crate::ids::{ComponentId, EntryId, ExitId, PortId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use silica_common::Ident;
use std::collections::{BTreeMap, BTreeSet};

/// How a register samples and resets.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RegMode {
    /// Plain rising-edge sampling.
    Simple,
    /// Sampling gated by an enable port.
    Enable,
    /// Enable plus synchronous reset to the initial value.
    ResetEnable,
}

/// The body of a composite component: its children and scheduling flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleBody {
    /// The owned child components, including the `InBuf` and all `OutBuf`s.
    pub children: BTreeSet<ComponentId>,
    /// The single `InBuf` adapter continuing boundary ports inward.
    pub inbuf: ComponentId,
    /// Components marked as breaking dependency cycles for data-flow
    /// traversal. Registers and gateways are implicit feedback points.
    pub feedback_points: BTreeSet<ComponentId>,
    /// Whether the module consumes its go port.
    pub consumes_go: bool,
    /// Whether the module produces a done signal.
    pub produces_done: bool,
    /// Whether the done signal is registered.
    pub done_synchronous: bool,
    /// Whether the module consumes its clock port.
    pub consumes_clock: bool,
    /// Whether the module consumes its reset port.
    pub consumes_reset: bool,
}

impl ModuleBody {
    fn new(inbuf: ComponentId) -> Self {
        Self {
            children: BTreeSet::new(),
            inbuf,
            feedback_points: BTreeSet::new(),
            consumes_go: false,
            produces_done: false,
            done_synchronous: false,
            consumes_clock: false,
            consumes_reset: false,
        }
    }
}

/// The closed union of component kinds.
///
/// Leaves carry only kind-specific configuration; composites carry a
/// [`ModuleBody`] plus their construction-time wiring handles.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Boundary adapter continuing a module's ports as internal buses.
    ///
    /// Its single `Done` exit carries, in order: the go continuation (the
    /// done bus), then `data_buses[0]` = clock, `data_buses[1]` = reset,
    /// `data_buses[2..]` = the module's data ports.
    InBuf,
    /// Boundary adapter gathering internal buses into a module exit.
    OutBuf {
        /// The module exit this adapter feeds.
        exit: ExitId,
    },
    /// A literal value source.
    Constant {
        /// The constant bits pushed forward by propagation.
        value: Value,
    },
    /// Bit-wise negation, one data port.
    Not,
    /// N-ary bit-wise AND.
    And,
    /// N-ary bit-wise OR.
    Or,
    /// A multiplexer. Data ports come in `(select, data)` pairs: even
    /// positions select, odd positions carry the selected value.
    Mux,
    /// An edge-triggered register, one data port.
    Reg {
        /// Sampling/reset behavior.
        mode: RegMode,
        /// The reset/initial contents, if specified.
        initial: Option<Value>,
    },
    /// A 16-stage shift-register primitive, one data port.
    Srl16 {
        /// The configured number of delay stages, 1 to 16.
        stages: u32,
    },
    /// A shared-resource arbitration point. Implicit feedback point; fixed
    /// shape; not cloneable.
    Gateway,
    /// An external pin connection. Fixed shape; not cloneable.
    Pin,
    /// A sequential block executing its children in order.
    Block {
        /// The body of owned children.
        body: ModuleBody,
        /// The children in execution order (excluding the buffer adapters).
        sequence: Vec<ComponentId>,
        /// Whether this block is a procedure body (main exit is `Return`,
        /// boundary ports are exempt from connectivity checking).
        procedure_body: bool,
    },
    /// A boolean decision exposing mutually exclusive true/false exits.
    Decision {
        /// The body of owned children.
        body: ModuleBody,
        /// The block computing the boolean test value.
        test_block: ComponentId,
        /// The component inside `test_block` that produces the value; marked
        /// non-removable so optimization cannot strip it.
        test_component: ComponentId,
        /// The inverter feeding the false path.
        not: ComponentId,
        /// The AND gating the true path.
        true_and: ComponentId,
        /// The AND gating the false path.
        false_and: ComponentId,
        /// The lazily synthesized `(Done, "NoDecision")` exit, memoized.
        no_decision_exit: Option<ExitId>,
    },
    /// A generic container module (used by loop/branch assembly, referees,
    /// and tests).
    Module {
        /// The body of owned children.
        body: ModuleBody,
    },
}

impl ComponentKind {
    /// A generic module kind with an empty body around the given `InBuf`.
    pub fn module(inbuf: ComponentId) -> Self {
        ComponentKind::Module {
            body: ModuleBody::new(inbuf),
        }
    }

    /// A block kind with an empty body and sequence.
    pub fn block(inbuf: ComponentId, procedure_body: bool) -> Self {
        ComponentKind::Block {
            body: ModuleBody::new(inbuf),
            sequence: Vec::new(),
            procedure_body,
        }
    }

    /// A decision kind with an empty body around its wiring handles.
    pub fn decision(
        inbuf: ComponentId,
        test_block: ComponentId,
        test_component: ComponentId,
        not: ComponentId,
        true_and: ComponentId,
        false_and: ComponentId,
    ) -> Self {
        ComponentKind::Decision {
            body: ModuleBody::new(inbuf),
            test_block,
            test_component,
            not,
            true_and,
            false_and,
            no_decision_exit: None,
        }
    }

    /// A short display name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::InBuf => "InBuf",
            ComponentKind::OutBuf { .. } => "OutBuf",
            ComponentKind::Constant { .. } => "Constant",
            ComponentKind::Not => "Not",
            ComponentKind::And => "And",
            ComponentKind::Or => "Or",
            ComponentKind::Mux => "Mux",
            ComponentKind::Reg { .. } => "Reg",
            ComponentKind::Srl16 { .. } => "Srl16",
            ComponentKind::Gateway => "Gateway",
            ComponentKind::Pin => "Pin",
            ComponentKind::Block { .. } => "Block",
            ComponentKind::Decision { .. } => "Decision",
            ComponentKind::Module { .. } => "Module",
        }
    }
}

/// A node of the design graph.
///
/// Every component has exactly one clock, reset, and go port, at most one
/// "this" port, ordered data ports, a tag-unique exit map, and a list of
/// activation entries. All structural mutation goes through
/// [`Design`](crate::design::Design) so that cross-references stay
/// consistent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Component {
    /// Kind-specific structure and configuration.
    pub kind: ComponentKind,
    /// The module owning this component, `None` at the root.
    pub owner: Option<ComponentId>,
    /// The clock input.
    pub clock_port: PortId,
    /// The reset input.
    pub reset_port: PortId,
    /// The go (activation) input.
    pub go_port: PortId,
    /// The optional "this" (object base address) input.
    pub this_port: Option<PortId>,
    /// The ordered data inputs.
    pub data_ports: Vec<PortId>,
    /// Exits keyed by their unique tag. Round-trips as a sequence of pairs
    /// because composite tags cannot key a JSON object.
    #[serde(with = "exit_map")]
    pub exits: BTreeMap<ExitTag, ExitId>,
    /// Activation entries, in creation order.
    pub entries: Vec<EntryId>,
    /// Optimization passes must not remove this component.
    pub non_removable: bool,
    /// Explicit opacity mark; a component with no owner is opaque regardless.
    pub opaque: bool,
    /// Arbitrary attached attributes for downstream consumers.
    pub attributes: BTreeMap<Ident, String>,
    /// The configuration lookup label, if any.
    pub option_label: Option<Ident>,
}

impl Component {
    /// All ports of this component: clock, reset, go, "this" if present,
    /// then the data ports in order.
    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        [self.clock_port, self.reset_port, self.go_port]
            .into_iter()
            .chain(self.this_port)
            .chain(self.data_ports.iter().copied())
    }

    /// The body, if this is a composite kind.
    pub fn body(&self) -> Option<&ModuleBody> {
        match &self.kind {
            ComponentKind::Block { body, .. }
            | ComponentKind::Decision { body, .. }
            | ComponentKind::Module { body } => Some(body),
            _ => None,
        }
    }

    /// Mutable access to the body, if this is a composite kind.
    pub fn body_mut(&mut self) -> Option<&mut ModuleBody> {
        match &mut self.kind {
            ComponentKind::Block { body, .. }
            | ComponentKind::Decision { body, .. }
            | ComponentKind::Module { body } => Some(body),
            _ => None,
        }
    }

    /// Returns `true` if this is a composite (body-carrying) kind.
    pub fn is_module(&self) -> bool {
        self.body().is_some()
    }

    /// Whether removing data ports is a supported edit on this kind.
    /// Gateways, muxes, and pins have a fixed shape.
    pub fn supports_port_removal(&self) -> bool {
        !matches!(
            self.kind,
            ComponentKind::Gateway | ComponentKind::Mux | ComponentKind::Pin
        )
    }

    /// Whether this component breaks dependency cycles for data-flow
    /// traversal regardless of any explicit feedback-point mark.
    pub fn is_implicit_feedback_point(&self) -> bool {
        matches!(
            self.kind,
            ComponentKind::Reg { .. } | ComponentKind::Srl16 { .. } | ComponentKind::Gateway
        )
    }

    /// Whether the component consumes its go port.
    pub fn consumes_go(&self) -> bool {
        match &self.kind {
            ComponentKind::Reg { .. } | ComponentKind::Srl16 { .. } => true,
            ComponentKind::Gateway | ComponentKind::Pin => true,
            _ => self.body().map(|b| b.consumes_go).unwrap_or(false),
        }
    }

    /// Whether the component produces a done signal distinct from its go.
    pub fn produces_done(&self) -> bool {
        self.body().map(|b| b.produces_done).unwrap_or(false)
    }

    /// Whether the done signal, if produced, is registered.
    pub fn is_done_synchronous(&self) -> bool {
        self.body().map(|b| b.done_synchronous).unwrap_or(false)
    }

    /// Whether the component consumes its clock port.
    pub fn consumes_clock(&self) -> bool {
        match &self.kind {
            ComponentKind::Reg { .. } | ComponentKind::Srl16 { .. } => true,
            _ => self.body().map(|b| b.consumes_clock).unwrap_or(false),
        }
    }

    /// Whether the component consumes its reset port.
    pub fn consumes_reset(&self) -> bool {
        match &self.kind {
            ComponentKind::Reg { mode, .. } => *mode == RegMode::ResetEnable,
            _ => self.body().map(|b| b.consumes_reset).unwrap_or(false),
        }
    }

    /// Whether combinational delay through this component can be balanced by
    /// the scheduler.
    pub fn is_balanceable(&self) -> bool {
        match &self.kind {
            ComponentKind::Not
            | ComponentKind::And
            | ComponentKind::Or
            | ComponentKind::Mux
            | ComponentKind::Constant { .. } => true,
            ComponentKind::Reg { .. } | ComponentKind::Srl16 { .. } => false,
            ComponentKind::Gateway | ComponentKind::Pin => false,
            ComponentKind::InBuf | ComponentKind::OutBuf { .. } => true,
            _ => false,
        }
    }

    /// Combinational gate depth through this component.
    pub fn gate_depth(&self) -> u32 {
        match &self.kind {
            ComponentKind::Not | ComponentKind::And | ComponentKind::Or => 1,
            ComponentKind::Mux => 2,
            _ => 0,
        }
    }

    /// Gate depth from activation to the first internal register, for
    /// composites; equal to [`gate_depth`](Self::gate_depth) for leaves.
    pub fn entry_gate_depth(&self) -> u32 {
        self.gate_depth()
    }

    /// Gate depth from the last internal register to completion, for
    /// composites; equal to [`gate_depth`](Self::gate_depth) for leaves.
    pub fn exit_gate_depth(&self) -> u32 {
        self.gate_depth()
    }
}

mod exit_map {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        map: &BTreeMap<ExitTag, ExitId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<ExitTag, ExitId>, D::Error> {
        let pairs: Vec<(ExitTag, ExitId)> = Deserialize::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
