//! Deterministic random number generation for fault injection and demo cohorts.
//!
//! RULE: nothing in the crate calls a platform RNG.
//! Each consumer gets its own stream, seeded from
//! (master_seed XOR slot_index), so adding a consumer never changes
//! the sequence another one sees.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG stream.
pub struct SeededRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SeededRng {
    pub fn new(master_seed: u64, slot_index: u64) -> Self {
        let derived_seed = master_seed ^ (slot_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn for_slot(master_seed: u64, slot: RngSlot) -> Self {
        Self::new(master_seed, slot as u64).with_name(slot.name())
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n). Returns 0 when n is 0.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform float in [low, high).
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }
}

/// Stable stream assignments. Append only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RngSlot {
    Chaos = 0,
    Cohort = 1,
}

impl RngSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chaos => "chaos",
            Self::Cohort => "cohort",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SeededRng::for_slot(7, RngSlot::Chaos);
        let mut b = SeededRng::for_slot(7, RngSlot::Chaos);
        for _ in 0..32 {
            assert_eq!(a.next_u64_below(1000), b.next_u64_below(1000));
        }
    }

    #[test]
    fn slots_are_independent_streams() {
        let mut chaos = SeededRng::for_slot(7, RngSlot::Chaos);
        let mut cohort = SeededRng::for_slot(7, RngSlot::Cohort);
        let a: Vec<u64> = (0..8).map(|_| chaos.next_u64_below(u64::MAX)).collect();
        let b: Vec<u64> = (0..8).map(|_| cohort.next_u64_below(u64::MAX)).collect();
        assert_ne!(a, b);
    }
}
