//! Clock-cycle latency of exits.

use crate::ids::ExitId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The number of clock cycles between a component's activation and an exit's
/// completion.
///
/// A latency is fixed when its maximum is known, open when only a lower bound
/// is known (e.g., a data-dependent loop).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Latency {
    min: u32,
    max: Option<u32>,
}

impl Latency {
    /// A fixed latency of zero cycles.
    pub const ZERO: Latency = Latency {
        min: 0,
        max: Some(0),
    };

    /// A fixed latency of one cycle.
    pub const ONE: Latency = Latency {
        min: 1,
        max: Some(1),
    };

    /// A fixed latency of exactly `n` cycles.
    pub fn fixed(n: u32) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    /// An open latency with a known minimum but unbounded maximum.
    pub fn open(min: u32) -> Self {
        Self { min, max: None }
    }

    /// The minimum number of cycles.
    pub fn min_clocks(&self) -> u32 {
        self.min
    }

    /// The maximum number of cycles, if bounded.
    pub fn max_clocks(&self) -> Option<u32> {
        self.max
    }

    /// Returns `true` if the minimum and maximum agree.
    pub fn is_fixed(&self) -> bool {
        self.max == Some(self.min)
    }

    /// Returns `true` if the maximum is unbounded.
    pub fn is_open(&self) -> bool {
        self.max.is_none()
    }

    /// Sequential composition: minimums add, maximums add when both are
    /// bounded, otherwise the result is open.
    pub fn add(&self, other: &Latency) -> Latency {
        Latency {
            min: self.min + other.min,
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a + b),
                _ => None,
            },
        }
    }

    /// Returns `true` if this latency is at least `other` in every execution:
    /// our minimum must not be below the other's maximum.
    pub fn is_ge(&self, other: &Latency) -> bool {
        match other.max {
            Some(max) => self.min >= max,
            None => false,
        }
    }
}

/// Maps exits to their scheduler-assigned latencies.
///
/// Populated by the external scheduler and handed to post-schedule callbacks
/// registered on the [`Design`](crate::design::Design).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LatencyTracker {
    latencies: BTreeMap<ExitId, Latency>,
}

impl LatencyTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latency of an exit, replacing any earlier assignment.
    pub fn set(&mut self, exit: ExitId, latency: Latency) {
        self.latencies.insert(exit, latency);
    }

    /// Returns the recorded latency of an exit, if any.
    pub fn get(&self, exit: ExitId) -> Option<Latency> {
        self.latencies.get(&exit).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_one() {
        assert_eq!(Latency::ZERO.min_clocks(), 0);
        assert_eq!(Latency::ZERO.max_clocks(), Some(0));
        assert!(Latency::ZERO.is_fixed());
        assert_eq!(Latency::ONE, Latency::fixed(1));
    }

    #[test]
    fn open_latency() {
        let l = Latency::open(2);
        assert!(l.is_open());
        assert!(!l.is_fixed());
        assert_eq!(l.min_clocks(), 2);
        assert_eq!(l.max_clocks(), None);
    }

    #[test]
    fn add_fixed() {
        let sum = Latency::fixed(2).add(&Latency::fixed(3));
        assert_eq!(sum, Latency::fixed(5));
    }

    #[test]
    fn add_open_stays_open() {
        let sum = Latency::fixed(2).add(&Latency::open(1));
        assert_eq!(sum.min_clocks(), 3);
        assert!(sum.is_open());
    }

    #[test]
    fn is_ge() {
        assert!(Latency::fixed(3).is_ge(&Latency::fixed(2)));
        assert!(Latency::fixed(2).is_ge(&Latency::fixed(2)));
        assert!(!Latency::fixed(1).is_ge(&Latency::fixed(2)));
        // an open bound can never be dominated
        assert!(!Latency::fixed(100).is_ge(&Latency::open(0)));
        assert!(Latency::open(5).is_ge(&Latency::fixed(5)));
    }

    #[test]
    fn tracker_set_get() {
        let mut tracker = LatencyTracker::new();
        let exit = ExitId::from_raw(0);
        assert_eq!(tracker.get(exit), None);
        tracker.set(exit, Latency::fixed(4));
        assert_eq!(tracker.get(exit), Some(Latency::fixed(4)));
    }
}
