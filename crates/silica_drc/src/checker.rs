//! The rule checks themselves.

use silica_common::{InternalError, SilicaResult};
use silica_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use silica_ir::{Bit, Component, ComponentKind, Design, Port, PortId, Value};

fn code(number: u16) -> DiagnosticCode {
    DiagnosticCode::new(Category::Drc, number)
}

/// Runs every rule and reduces the outcome to pass/fail: `Ok` on a clean
/// design, an internal error naming the first finding otherwise. Callers
/// that need the individual findings run [`check_design`] with their own
/// sink.
pub fn verify_design(design: &Design) -> SilicaResult<()> {
    let sink = DiagnosticSink::new();
    check_design(design, &sink);
    if !sink.has_errors() {
        return Ok(());
    }
    let first = sink
        .take_all()
        .into_iter()
        .find(|d| d.severity.is_error())
        .map(|d| format!("{}: {}", d.code, d.message))
        .unwrap_or_default();
    Err(InternalError::new(format!(
        "{} design-rule violation(s), first {first}",
        sink.error_count()
    )))
}

/// Runs every design rule over the whole design, emitting findings into the
/// sink. Unused ports and buses are skipped.
///
/// The checker expects propagation to have run; on a freshly built graph
/// every used endpoint is reported as valueless.
pub fn check_design(design: &Design, sink: &DiagnosticSink) {
    for (id, bus) in design.iter_buses() {
        if !bus.used {
            continue;
        }
        let subject = format!("bus #{}", id.as_raw());
        match &bus.value {
            None => sink.emit(
                Diagnostic::error(code(101), "used bus has no propagated value")
                    .with_subject(subject),
            ),
            Some(value) => check_value_bounds(design, value, &subject, sink),
        }
    }
    for (id, port) in design.iter_ports() {
        if !port.used {
            continue;
        }
        let owner = design.component(port.owner);
        let subject = format!(
            "port #{} of {} component #{}",
            id.as_raw(),
            owner.kind.name(),
            port.owner.as_raw()
        );
        match &port.value {
            None => sink.emit(
                Diagnostic::error(code(102), "used port has no propagated value")
                    .with_subject(subject.clone()),
            ),
            Some(value) => check_value_bounds(design, value, &subject, sink),
        }
        if !is_reached(design, owner, id, port) && !connectivity_exempt(owner, id) {
            sink.emit(
                Diagnostic::error(code(103), "used port is not reached by any producer")
                    .with_subject(subject),
            );
        }
    }
}

/// A port counts as reached when a bus drives it structurally, a boundary
/// peer continues it, or some entry of its owner holds a dependency on it.
fn is_reached(design: &Design, owner: &Component, id: PortId, port: &Port) -> bool {
    port.bus.is_some()
        || port.peer.is_some()
        || owner
            .entries
            .iter()
            .any(|&e| design.entry(e).dependencies_for(id).next().is_some())
}

/// Connectivity rules that structural conventions satisfy without wiring:
/// every port of a procedure body is a formal boundary, and a register's
/// set/reset-style ports beyond the sampled input are implied by its mode.
fn connectivity_exempt(owner: &Component, port: PortId) -> bool {
    match &owner.kind {
        ComponentKind::Block { procedure_body, .. } => *procedure_body,
        ComponentKind::Reg { .. } => owner.data_ports.first() != Some(&port),
        _ => false,
    }
}

fn check_value_bounds(design: &Design, value: &Value, subject: &str, sink: &DiagnosticSink) {
    for i in 0..value.size() {
        if let Bit::Bus { bus, pos } = value.bit(i) {
            let in_range = design.contains_bus(bus) && pos < design.bus(bus).size;
            if !in_range {
                sink.emit(
                    Diagnostic::error(code(104), "bus-sourced bit indexes beyond its source")
                        .with_subject(subject.to_string())
                        .with_note(format!(
                            "bit {i} sources position {pos} of bus #{}",
                            bus.as_raw()
                        )),
                );
            }
        }
    }
}
