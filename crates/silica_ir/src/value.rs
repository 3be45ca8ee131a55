//! Per-bit abstract values for constant propagation.
//!
//! Every port and bus in the graph can carry a [`Value`]: a vector of
//! [`Bit`]s describing what is known about the signal at each position.
//! Constant propagation refines these values monotonically — once a bit is
//! known constant it never regresses to a less specific state.

use crate::ids::BusId;
use serde::{Deserialize, Serialize};

/// The abstract state of a single bit position.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Bit {
    /// The bit's value is irrelevant to every consumer.
    DontCare,
    /// Known constant zero.
    Zero,
    /// Known constant one.
    One,
    /// The bit matters but nothing more is known (generic care).
    Care,
    /// The bit is sourced from position `pos` of a specific bus.
    ///
    /// Bus-owned bits are local to one module body; the opacity rule in
    /// [`propagate`](crate::propagate) strips them at module boundaries.
    Bus {
        /// The bus the bit is sourced from.
        bus: BusId,
        /// The bit position on that bus.
        pos: u32,
    },
}

impl Bit {
    /// Returns `true` for every state except [`DontCare`](Bit::DontCare).
    pub fn is_care(self) -> bool {
        self != Bit::DontCare
    }

    /// Returns `true` if the bit is a known constant (zero or one).
    pub fn is_constant(self) -> bool {
        matches!(self, Bit::Zero | Bit::One)
    }

    /// Returns `true` for every state except [`Bit::Bus`].
    ///
    /// Global bits carry no module-local identity and may cross any module
    /// boundary during propagation.
    pub fn is_global(self) -> bool {
        !matches!(self, Bit::Bus { .. })
    }

    /// Inverts a constant bit; other states are unchanged except that
    /// don't-care stays don't-care and everything else degrades to care.
    pub fn invert(self) -> Bit {
        match self {
            Bit::Zero => Bit::One,
            Bit::One => Bit::Zero,
            Bit::DontCare => Bit::DontCare,
            _ => Bit::Care,
        }
    }
}

/// A sized, signed-or-unsigned vector of [`Bit`]s, LSB first.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Value {
    bits: Vec<Bit>,
    signed: bool,
}

impl Value {
    /// Creates a value of the given size with every bit a generic care.
    pub fn new(size: usize, signed: bool) -> Self {
        Self {
            bits: vec![Bit::Care; size],
            signed,
        }
    }

    /// Creates a value from an explicit bit vector, LSB first.
    pub fn from_bits(bits: Vec<Bit>, signed: bool) -> Self {
        Self { bits, signed }
    }

    /// Creates a fully constant value from the low `size` bits of `n`.
    pub fn from_u64(n: u64, size: usize, signed: bool) -> Self {
        let bits = (0..size)
            .map(|i| {
                if i < 64 && (n >> i) & 1 == 1 {
                    Bit::One
                } else {
                    Bit::Zero
                }
            })
            .collect();
        Self { bits, signed }
    }

    /// Returns the number of bits.
    pub fn size(&self) -> usize {
        self.bits.len()
    }

    /// Returns `true` if the value is signed.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Returns the bit at position `i` (LSB is position 0).
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn bit(&self, i: usize) -> Bit {
        self.bits[i]
    }

    /// Replaces the bit at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn set_bit(&mut self, i: usize, bit: Bit) {
        self.bits[i] = bit;
    }

    /// Returns `true` if every bit is a known constant.
    pub fn is_constant(&self) -> bool {
        self.bits.iter().all(|b| b.is_constant())
    }

    /// Returns `true` if every bit is don't-care.
    pub fn is_dont_care(&self) -> bool {
        self.bits.iter().all(|b| !b.is_care())
    }

    /// Returns `true` if both values have the same size and identical bits.
    pub fn bit_equals(&self, other: &Value) -> bool {
        self.bits == other.bits
    }

    /// Bit-wise union: positions where both values agree keep the common bit,
    /// positions where they disagree degrade to generic care. The result is
    /// as wide as the wider input; positions past the end of the narrower
    /// input take the wider input's bit.
    pub fn union(&self, other: &Value) -> Value {
        let size = self.size().max(other.size());
        let mut bits = Vec::with_capacity(size);
        for i in 0..size {
            let bit = match (self.bits.get(i), other.bits.get(i)) {
                (Some(&a), Some(&b)) => {
                    if a == b {
                        a
                    } else {
                        Bit::Care
                    }
                }
                (Some(&a), None) => a,
                (None, Some(&b)) => b,
                (None, None) => unreachable!(),
            };
            bits.push(bit);
        }
        Value {
            bits,
            signed: self.signed || other.signed,
        }
    }

    /// The minimum width that preserves sign extension: positions are walked
    /// down from the MSB while each next-lower bit equals the MSB. A generic
    /// care MSB never compacts. Floor of 1.
    pub fn compacted_size(&self) -> usize {
        let size = self.bits.len();
        if size <= 1 {
            return size.max(1);
        }
        let msb = self.bits[size - 1];
        if msb == Bit::Care {
            return size;
        }
        let mut compacted = size;
        for i in (1..size).rev() {
            if self.bits[i - 1] == msb {
                compacted -= 1;
            } else {
                break;
            }
        }
        compacted.max(1)
    }

    /// Strips bus-owned bits to generic care, keeping constants and
    /// don't-cares. Used where module-local bit identity must not survive
    /// (register pass-through, opaque boundaries).
    pub fn to_generic(&self) -> Value {
        let bits = self
            .bits
            .iter()
            .map(|&b| if b.is_global() { b } else { Bit::Care })
            .collect();
        Value {
            bits,
            signed: self.signed,
        }
    }

    /// Interprets a fully constant value of at most 64 bits as a `u64`.
    ///
    /// Returns `None` if any bit is non-constant or the value is wider than
    /// 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.bits.len() > 64 {
            return None;
        }
        let mut n = 0u64;
        for (i, bit) in self.bits.iter().enumerate() {
            match bit {
                Bit::Zero => {}
                Bit::One => n |= 1 << i,
                _ => return None,
            }
        }
        Some(n)
    }
}
