//! Bidirectional constant propagation.
//!
//! Each component answers two monotone, idempotent passes:
//! [`Design::propagate_forward`] reads the known port values and refines the
//! output bus values, [`Design::propagate_backward`] reads the consumed bus
//! values and refines the required port values (only don't-care information
//! travels backward). Fixed-point sweeping is the caller's business; each
//! single pass is safe to re-invoke any number of times.
//!
//! The opacity rule governs module boundaries: across an opaque module only
//! constant bits cross its `InBuf`/`OutBuf` adapters; a transparent module
//! additionally passes bus-owned bits. Don't-care never crosses forward.

use crate::component::ComponentKind;
use crate::design::Design;
use crate::ids::{BusId, ComponentId, PortId};
use crate::value::{Bit, Value};

impl Design {
    /// Refreshes every port value of the component from its sources, then
    /// applies the kind's forward rule to its output buses.
    ///
    /// Returns `true` iff any port or bus value changed.
    pub fn propagate_forward(&mut self, comp: ComponentId) -> bool {
        let mut changed = false;
        let ports: Vec<PortId> = self.components[comp].ports().collect();
        for port in ports {
            changed |= self.refresh_port_forward(port);
        }
        changed |= self.forward_rule(comp);
        changed
    }

    /// Refreshes every bus value of the component from its consumers, then
    /// applies the kind's backward rule to its input ports.
    ///
    /// Returns `true` iff any bus or port value changed.
    pub fn propagate_backward(&mut self, comp: ComponentId) -> bool {
        let mut changed = false;
        let buses: Vec<BusId> = self.components[comp]
            .exits
            .values()
            .flat_map(|&e| self.exits[e].buses().collect::<Vec<_>>())
            .collect();
        for bus in buses {
            changed |= self.refresh_bus_backward(bus);
        }
        changed |= self.backward_rule(comp);
        changed
    }

    // ------------------------------------------------------------------
    // Endpoint merge rules
    // ------------------------------------------------------------------

    /// Computes a port's incoming value and merges it.
    ///
    /// A connected port takes its bus's value. An unconnected port takes the
    /// bit-wise union of its dependency source values with bus-owned bits
    /// degraded to care, since scheduling has not yet chosen physical
    /// connections. When a source has no value yet (feedback), the port is
    /// sized but bit merging is deferred.
    fn refresh_port_forward(&mut self, port: PortId) -> bool {
        if !self.ports[port].used {
            return false;
        }
        if let Some(bus) = self.ports[port].bus {
            return match self.buses[bus].value.clone() {
                Some(v) => self.port_push_value_forward(port, &v),
                None => false,
            };
        }
        let owner = self.ports[port].owner;
        let mut acc: Option<Value> = None;
        let mut incomplete = false;
        let mut size = 0usize;
        for &entry in &self.components[owner].entries {
            for dep in self.entries[entry].dependencies_for(port) {
                let bus = &self.buses[dep.logical_bus];
                size = size.max(bus.effective_size());
                match &bus.value {
                    Some(v) => {
                        let v = v.to_generic();
                        acc = Some(match acc {
                            Some(a) => a.union(&v),
                            None => v,
                        });
                    }
                    None => incomplete = true,
                }
            }
        }
        if incomplete {
            if self.ports[port].value.is_none() && size > 0 {
                self.ports[port].value = Some(Value::new(size, false));
                return true;
            }
            return false;
        }
        match acc {
            Some(v) => self.port_push_value_forward(port, &v),
            None => false,
        }
    }

    /// Merges an incoming value into a port: a current bit that is neither
    /// constant nor don't-care and differs from the incoming bit is replaced.
    pub fn port_push_value_forward(&mut self, port: PortId, incoming: &Value) -> bool {
        let slot = &mut self.ports[port].value;
        let current = match slot {
            None => {
                *slot = Some(incoming.clone());
                return true;
            }
            Some(current) => current,
        };
        let mut changed = false;
        let size = current.size().min(incoming.size());
        for i in 0..size {
            let cur = current.bit(i);
            let inc = incoming.bit(i);
            if !cur.is_constant() && cur.is_care() && cur != inc {
                current.set_bit(i, inc);
                changed = true;
            }
        }
        changed
    }

    /// Merges an incoming value into a bus, per bit: equal bits skip; either
    /// side don't-care skips; an incoming constant is adopted; an incoming
    /// generic care is replaced by this bus's own identity bit; an incoming
    /// foreign bus bit is adopted.
    ///
    /// A bus with no value yet is first given its identity value — every
    /// position owned by the bus itself.
    pub fn bus_push_value_forward(&mut self, bus: BusId, incoming: &Value) -> bool {
        let mut changed = false;
        {
            let b = &mut self.buses[bus];
            if b.value.is_none() {
                let size = if b.size > 0 {
                    b.size as usize
                } else {
                    incoming.size()
                };
                let bits = (0..size)
                    .map(|i| Bit::Bus {
                        bus,
                        pos: i as u32,
                    })
                    .collect();
                b.value = Some(Value::from_bits(bits, b.signed));
                changed = true;
            }
        }
        let current = self.buses[bus].value.as_mut().expect("initialized above");
        let size = current.size().min(incoming.size());
        for i in 0..size {
            let cur = current.bit(i);
            let inc = incoming.bit(i);
            if cur == inc || !cur.is_care() || !inc.is_care() {
                continue;
            }
            let next = if inc == Bit::Care {
                Bit::Bus {
                    bus,
                    pos: i as u32,
                }
            } else {
                inc
            };
            if cur != next {
                current.set_bit(i, next);
                changed = true;
            }
        }
        changed
    }

    /// Merges an incoming value into a port backward: only don't-care
    /// travels — a current care bit where the incoming bit is don't-care
    /// becomes don't-care.
    pub fn port_push_value_backward(&mut self, port: PortId, incoming: &Value) -> bool {
        let current = match &mut self.ports[port].value {
            Some(v) => v,
            None => return false,
        };
        let mut changed = false;
        let size = current.size().min(incoming.size());
        for i in 0..size {
            if !incoming.bit(i).is_care() && current.bit(i).is_care() {
                current.set_bit(i, Bit::DontCare);
                changed = true;
            }
        }
        changed
    }

    /// Refreshes a bus value from its consumers: a bit becomes don't-care
    /// when at least one consumer dismisses it and none cares. Consumers are
    /// the structurally connected ports if any, else the ports of the
    /// logical dependents.
    fn refresh_bus_backward(&mut self, bus: BusId) -> bool {
        let consumers: Vec<PortId> = {
            let b = &self.buses[bus];
            if b.value.is_none() {
                return false;
            }
            if !b.ports.is_empty() {
                b.ports.iter().copied().collect()
            } else {
                b.logical_dependents.iter().map(|&(_, p)| p).collect()
            }
        };
        if consumers.is_empty() {
            return false;
        }
        let size = self.buses[bus].value.as_ref().expect("checked above").size();
        let mut changed = false;
        for i in 0..size {
            if !self.buses[bus].value.as_ref().expect("present").bit(i).is_care() {
                continue;
            }
            let mut dismissed = false;
            let mut cared = false;
            for &port in &consumers {
                match &self.ports[port].value {
                    None => cared = true,
                    Some(v) => {
                        if i < v.size() {
                            if v.bit(i).is_care() {
                                cared = true;
                            } else {
                                dismissed = true;
                            }
                        } else {
                            // beyond the consumer's width: unconsumed
                            dismissed = true;
                        }
                    }
                }
            }
            if dismissed && !cared {
                self.buses[bus]
                    .value
                    .as_mut()
                    .expect("present")
                    .set_bit(i, Bit::DontCare);
                changed = true;
            }
        }
        changed
    }

    // ------------------------------------------------------------------
    // Per-kind forward rules
    // ------------------------------------------------------------------

    fn forward_rule(&mut self, comp: ComponentId) -> bool {
        match &self.components[comp].kind {
            ComponentKind::Constant { value } => {
                let value = value.clone();
                let bus = self.result_bus(comp);
                self.bus_push_value_forward(bus, &value)
            }
            ComponentKind::Not => self.forward_not(comp),
            ComponentKind::And => self.forward_logic(comp, false),
            ComponentKind::Or => self.forward_logic(comp, true),
            ComponentKind::Mux => self.forward_mux(comp),
            ComponentKind::Reg { initial, .. } => {
                let initial = initial.clone();
                self.forward_reg(comp, initial)
            }
            ComponentKind::Srl16 { .. } => self.forward_reg(comp, None),
            ComponentKind::InBuf => self.forward_inbuf(comp),
            ComponentKind::OutBuf { .. } => self.forward_outbuf(comp),
            // modules carry values through their buffer children; gateways
            // and pins publish nothing
            _ => false,
        }
    }

    fn forward_not(&mut self, comp: ComponentId) -> bool {
        let port = self.components[comp].data_ports[0];
        let input = match self.ports[port].value.clone() {
            Some(v) => v,
            None => return false,
        };
        let mut result = Value::new(input.size(), input.is_signed());
        for i in 0..input.size() {
            result.set_bit(i, input.bit(i).invert());
        }
        let bus = self.result_bus(comp);
        self.bus_push_value_forward(bus, &result)
    }

    /// N-ary AND/OR: fold of the two-input table, then (for OR) the
    /// carry-out sign extension.
    fn forward_logic(&mut self, comp: ComponentId, is_or: bool) -> bool {
        let inputs = match self.data_port_values(comp, 1) {
            Some(v) => v,
            None => return false,
        };
        let size = inputs.iter().map(|v| v.size()).max().unwrap_or(0);
        let neutral = if is_or { Bit::Zero } else { Bit::One };
        let mut folded = Value::new(size, inputs.iter().any(|v| v.is_signed()));
        for i in 0..size {
            let mut acc = neutral;
            for input in &inputs {
                let bit = if i < input.size() {
                    input.bit(i)
                } else {
                    neutral
                };
                acc = if is_or {
                    or_bits(acc, bit)
                } else {
                    and_bits(acc, bit)
                };
            }
            folded.set_bit(i, acc);
        }
        if is_or {
            let narrowest = inputs
                .iter()
                .map(|v| v.compacted_size())
                .min()
                .unwrap_or(size);
            self.sign_extend_fold(comp, &mut folded, narrowest);
        }
        let bus = self.result_bus(comp);
        self.bus_push_value_forward(bus, &folded)
    }

    /// Data ports come in `(select, data)` pairs; per bit, a value carried
    /// identically by every data input survives, anything else degrades to
    /// care. Inputs shorter than the result contribute zero.
    fn forward_mux(&mut self, comp: ComponentId) -> bool {
        let data_ports: Vec<PortId> = self.components[comp]
            .data_ports
            .iter()
            .copied()
            .skip(1)
            .step_by(2)
            .collect();
        let mut inputs = Vec::with_capacity(data_ports.len());
        for port in data_ports {
            match self.ports[port].value.clone() {
                Some(v) => inputs.push(v),
                None => return false,
            }
        }
        if inputs.is_empty() {
            return false;
        }
        let size = inputs.iter().map(|v| v.size()).max().unwrap_or(0);
        let mut folded = Value::new(size, inputs.iter().any(|v| v.is_signed()));
        for i in 0..size {
            let mut common: Option<Bit> = None;
            let mut agree = true;
            for input in &inputs {
                let bit = if i < input.size() {
                    input.bit(i)
                } else {
                    Bit::Zero
                };
                match common {
                    None => common = Some(bit),
                    Some(c) if c == bit => {}
                    Some(_) => agree = false,
                }
            }
            let bit = match common {
                Some(c) if agree => c,
                _ => Bit::Care,
            };
            folded.set_bit(i, bit);
        }
        let widest = inputs
            .iter()
            .map(|v| v.compacted_size())
            .max()
            .unwrap_or(size);
        self.sign_extend_fold(comp, &mut folded, widest);
        let bus = self.result_bus(comp);
        self.bus_push_value_forward(bus, &folded)
    }

    /// The carry-out heuristic shared by OR and Mux: when the result bus
    /// already carries a value and the fold is not fully constant, bits
    /// above the compacted size are replaced by the fold's bit just below
    /// it, don't-cares excepted.
    fn sign_extend_fold(&mut self, comp: ComponentId, folded: &mut Value, input_compacted: usize) {
        let bus = self.result_bus(comp);
        if self.buses[bus].value.is_none() || folded.is_constant() {
            return;
        }
        let compacted = folded.compacted_size().min(input_compacted).max(1);
        if compacted >= folded.size() {
            return;
        }
        let extend = folded.bit(compacted - 1);
        for i in compacted..folded.size() {
            if folded.bit(i) != Bit::DontCare {
                folded.set_bit(i, extend);
            }
        }
    }

    /// Only constants may cross a register: the driven value is merged with
    /// the initial value, bus-owned bits are stripped, and bits above the
    /// pre-strip compacted size are replicated to preserve sign extension.
    fn forward_reg(&mut self, comp: ComponentId, initial: Option<Value>) -> bool {
        let port = self.components[comp].data_ports[0];
        let driven = match self.ports[port].value.clone() {
            Some(v) => v,
            None => return false,
        };
        let merged = match initial {
            Some(init) => driven.union(&init),
            None => driven,
        };
        if merged.size() == 0 {
            return false;
        }
        let compacted = merged.compacted_size();
        let mut result = merged.to_generic();
        let bus = self.result_bus(comp);
        let extend = match &self.buses[bus].value {
            Some(v) if compacted <= v.size() => v.bit(compacted - 1),
            _ => result.bit(compacted.min(result.size()) - 1),
        };
        for i in compacted..result.size() {
            if result.bit(i) != Bit::DontCare {
                result.set_bit(i, extend);
            }
        }
        self.bus_push_value_forward(bus, &result)
    }

    /// Carries the module's boundary port values inward, filtered by the
    /// opacity rule.
    fn forward_inbuf(&mut self, comp: ComponentId) -> bool {
        let module = match self.components[comp].owner {
            Some(m) => m,
            None => return false,
        };
        let opaque = self.is_opaque(module);
        let exit = self.single_exit(comp);
        let buses: Vec<BusId> = self.exits[exit].buses().collect();
        let mut changed = false;
        for bus in buses {
            let Some(peer) = self.buses[bus].peer else {
                continue;
            };
            let Some(value) = self.ports[peer].value.clone() else {
                continue;
            };
            let filtered = filter_boundary(&value, opaque);
            changed |= self.bus_push_value_forward(bus, &filtered);
        }
        changed
    }

    /// Carries the gathered internal values outward onto the module's exit
    /// buses, filtered by the opacity rule and sign-extended above the
    /// compacted size.
    fn forward_outbuf(&mut self, comp: ComponentId) -> bool {
        let module = match self.components[comp].owner {
            Some(m) => m,
            None => return false,
        };
        let opaque = self.is_opaque(module);
        let ports: Vec<PortId> = self.components[comp].ports().collect();
        let mut changed = false;
        for port in ports {
            let Some(peer) = self.ports[port].peer else {
                continue;
            };
            let Some(value) = self.ports[port].value.clone() else {
                continue;
            };
            let mut filtered = filter_boundary(&value, opaque);
            let compacted = value.compacted_size();
            if compacted < filtered.size() {
                let extend = filtered.bit(compacted - 1);
                for i in compacted..filtered.size() {
                    filtered.set_bit(i, extend);
                }
            }
            changed |= self.bus_push_value_forward(peer, &filtered);
        }
        changed
    }

    // ------------------------------------------------------------------
    // Per-kind backward rules
    // ------------------------------------------------------------------

    fn backward_rule(&mut self, comp: ComponentId) -> bool {
        match &self.components[comp].kind {
            ComponentKind::Not => {
                let derived = match self.result_value(comp) {
                    Some(v) => dismiss_resolved(&v),
                    None => return false,
                };
                let port = self.components[comp].data_ports[0];
                self.port_push_value_backward(port, &derived)
            }
            ComponentKind::And | ComponentKind::Or => self.backward_logic(comp),
            ComponentKind::Mux => self.backward_mux(comp),
            ComponentKind::Reg { .. } | ComponentKind::Srl16 { .. } => {
                let value = match self.result_value(comp) {
                    Some(v) => v,
                    None => return false,
                };
                let port = self.components[comp].data_ports[0];
                self.port_push_value_backward(port, &value)
            }
            ComponentKind::InBuf => self.backward_inbuf(comp),
            ComponentKind::OutBuf { .. } => self.backward_outbuf(comp),
            _ => false,
        }
    }

    /// Result bits that are constant or dismissed release every non-constant
    /// input at that position; plain care bits pass through unchanged.
    fn backward_logic(&mut self, comp: ComponentId) -> bool {
        let derived = match self.result_value(comp) {
            Some(v) => dismiss_resolved(&v),
            None => return false,
        };
        let ports = self.components[comp].data_ports.clone();
        let mut changed = false;
        for port in ports {
            let non_constant = self.ports[port]
                .value
                .as_ref()
                .map(|v| !v.is_constant())
                .unwrap_or(false);
            if non_constant {
                changed |= self.port_push_value_backward(port, &derived);
            }
        }
        changed
    }

    /// Dismissed result bits release every data input; selects are left
    /// untouched.
    fn backward_mux(&mut self, comp: ComponentId) -> bool {
        let result = match self.result_value(comp) {
            Some(v) => v,
            None => return false,
        };
        let ports: Vec<PortId> = self.components[comp]
            .data_ports
            .iter()
            .copied()
            .skip(1)
            .step_by(2)
            .collect();
        let mut changed = false;
        for port in ports {
            changed |= self.port_push_value_backward(port, &result);
        }
        changed
    }

    fn backward_inbuf(&mut self, comp: ComponentId) -> bool {
        let exit = self.single_exit(comp);
        let buses: Vec<BusId> = self.exits[exit].buses().collect();
        let mut changed = false;
        for bus in buses {
            let Some(peer) = self.buses[bus].peer else {
                continue;
            };
            let Some(value) = self.buses[bus].value.clone() else {
                continue;
            };
            changed |= self.port_push_value_backward(peer, &value);
        }
        changed
    }

    fn backward_outbuf(&mut self, comp: ComponentId) -> bool {
        let ports: Vec<PortId> = self.components[comp].ports().collect();
        let mut changed = false;
        for port in ports {
            let Some(peer) = self.ports[port].peer else {
                continue;
            };
            let Some(value) = self.buses[peer].value.clone() else {
                continue;
            };
            changed |= self.port_push_value_backward(port, &value);
        }
        changed
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// The values of the data ports from `skip` onward, or `None` if any is
    /// missing.
    fn data_port_values(&self, comp: ComponentId, min_count: usize) -> Option<Vec<Value>> {
        let ports = &self.components[comp].data_ports;
        if ports.len() < min_count {
            return None;
        }
        ports
            .iter()
            .map(|&p| self.ports[p].value.clone())
            .collect()
    }

    fn result_value(&self, comp: ComponentId) -> Option<Value> {
        self.buses[self.result_bus(comp)].value.clone()
    }
}

/// The two-input OR table: either side dismissed dismisses the bit; two
/// constants combine; a constant one dominates; a constant zero yields the
/// other bit; anything else is a care.
fn or_bits(a: Bit, b: Bit) -> Bit {
    if !a.is_care() || !b.is_care() {
        return Bit::DontCare;
    }
    match (a, b) {
        (Bit::One, _) | (_, Bit::One) => Bit::One,
        (Bit::Zero, other) | (other, Bit::Zero) => other,
        _ => Bit::Care,
    }
}

/// The two-input AND table: dual of [`or_bits`].
fn and_bits(a: Bit, b: Bit) -> Bit {
    if !a.is_care() || !b.is_care() {
        return Bit::DontCare;
    }
    match (a, b) {
        (Bit::Zero, _) | (_, Bit::Zero) => Bit::Zero,
        (Bit::One, other) | (other, Bit::One) => other,
        _ => Bit::Care,
    }
}

/// A backward mask releasing positions whose result is already resolved:
/// constant or dismissed bits become don't-care, the rest stay care.
fn dismiss_resolved(result: &Value) -> Value {
    let mut derived = Value::new(result.size(), result.is_signed());
    for i in 0..result.size() {
        let bit = result.bit(i);
        if bit.is_constant() || !bit.is_care() {
            derived.set_bit(i, Bit::DontCare);
        }
    }
    derived
}

/// The opacity filter applied at module boundaries: constants always cross,
/// don't-care never crosses forward, bus-owned bits cross only a transparent
/// boundary, and everything else degrades to a generic care.
fn filter_boundary(value: &Value, opaque: bool) -> Value {
    let mut filtered = Value::new(value.size(), value.is_signed());
    for i in 0..value.size() {
        let bit = match value.bit(i) {
            b @ (Bit::Zero | Bit::One) => b,
            b @ Bit::Bus { .. } if !opaque => b,
            _ => Bit::Care,
        };
        filtered.set_bit(i, bit);
    }
    filtered
}
