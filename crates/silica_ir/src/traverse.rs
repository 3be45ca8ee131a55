//! Data-flow ordering over a module body.
//!
//! Forward order visits every producer before its consumers; reverse order
//! is the mirror. Edges leaving feedback points (registers, shift
//! primitives, gateways, and explicitly marked components) are dropped
//! before sorting, which is what makes the usual register loops sortable at
//! all. Feedback points come last in forward order and first in reverse. A
//! cycle that survives edge dropping is a contract violation and is
//! reported through the sink.

use crate::design::Design;
use crate::ids::{BusId, ComponentId};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use silica_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use std::collections::{BTreeMap, BTreeSet};

/// A per-component callback driven in data-flow order.
///
/// Whether to recurse into child module bodies is the visitor's choice; the
/// driver stays on one body level.
pub trait Visitor {
    /// Called once per component of the traversed body.
    fn visit(&mut self, design: &Design, component: ComponentId);
}

impl Design {
    /// The components of a module body in forward data-flow order:
    /// producers before consumers, feedback points last.
    ///
    /// A residual cycle is reported through the sink and the affected
    /// components fall back to ID order.
    ///
    /// # Panics
    ///
    /// Panics if the component is not a module.
    pub fn forward_order(&self, module: ComponentId, sink: &DiagnosticSink) -> Vec<ComponentId> {
        let body = self
            .component(module)
            .body()
            .expect("cannot traverse a leaf component");
        let children: Vec<ComponentId> = body.children.iter().copied().collect();
        let mut feedback: BTreeSet<ComponentId> = body.feedback_points.clone();
        for &child in &children {
            if self.component(child).is_implicit_feedback_point() {
                feedback.insert(child);
            }
        }

        let mut graph: DiGraph<ComponentId, ()> = DiGraph::new();
        let mut nodes: BTreeMap<ComponentId, NodeIndex> = BTreeMap::new();
        for &child in &children {
            nodes.insert(child, graph.add_node(child));
        }
        for &producer in &children {
            if feedback.contains(&producer) {
                continue;
            }
            for &exit in self.component(producer).exits.values() {
                let buses: Vec<BusId> = self.exit(exit).buses().collect();
                for bus in buses {
                    for consumer in self.bus_consumers(bus) {
                        if consumer == producer {
                            continue;
                        }
                        if let Some(&to) = nodes.get(&consumer) {
                            graph.update_edge(nodes[&producer], to, ());
                        }
                    }
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => {
                let mut result: Vec<ComponentId> = order
                    .into_iter()
                    .map(|n| graph[n])
                    .filter(|c| !feedback.contains(c))
                    .collect();
                result.extend(feedback.iter().copied());
                result
            }
            Err(cycle) => {
                sink.emit(
                    Diagnostic::error(
                        DiagnosticCode::new(Category::Graph, 1),
                        "residual dependency cycle in module body",
                    )
                    .with_subject(self.component(graph[cycle.node_id()]).kind.name())
                    .with_note("mark a component of the cycle as a feedback point"),
                );
                let mut result: Vec<ComponentId> = children
                    .iter()
                    .copied()
                    .filter(|c| !feedback.contains(c))
                    .collect();
                result.extend(feedback.iter().copied());
                result
            }
        }
    }

    /// The components of a module body in reverse data-flow order:
    /// consumers before producers, feedback points first.
    pub fn reverse_order(&self, module: ComponentId, sink: &DiagnosticSink) -> Vec<ComponentId> {
        let mut order = self.forward_order(module, sink);
        order.reverse();
        order
    }

    /// Drives a visitor over one body in forward data-flow order.
    pub fn visit_forward(
        &self,
        module: ComponentId,
        visitor: &mut dyn Visitor,
        sink: &DiagnosticSink,
    ) {
        for comp in self.forward_order(module, sink) {
            visitor.visit(self, comp);
        }
    }

    /// Drives a visitor over one body in reverse data-flow order.
    pub fn visit_reverse(
        &self,
        module: ComponentId,
        visitor: &mut dyn Visitor,
        sink: &DiagnosticSink,
    ) {
        for comp in self.reverse_order(module, sink) {
            visitor.visit(self, comp);
        }
    }

    /// Every component consuming a bus, structurally or through a logical
    /// dependency.
    pub(crate) fn bus_consumers(&self, bus: BusId) -> BTreeSet<ComponentId> {
        let mut out = BTreeSet::new();
        let b = self.bus(bus);
        for &port in &b.ports {
            out.insert(self.port(port).owner);
        }
        for &(_, port) in &b.logical_dependents {
            out.insert(self.port(port).owner);
        }
        out
    }
}
