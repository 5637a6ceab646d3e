//! Deterministic random number generation.
//!
//! RULE: Nothing in the engine may call any platform RNG.
//! All randomness flows through ComponentRng instances derived
//! from the single master seed stored on the run record.
//!
//! Each component gets its own RNG stream, seeded from
//! (master_seed XOR slot) and mixed with a step number, so the
//! processor draws a fresh but reproducible stream per checkpoint.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single engine component.
pub struct ComponentRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl ComponentRng {
    /// Create a component RNG from the master seed and a stable
    /// slot index. The index must never change once assigned.
    pub fn new(master_seed: u64, slot_index: u64) -> Self {
        let derived_seed = master_seed ^ (slot_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Roll a u64 in [lo, hi]. Returns `lo` when the range is empty.
    pub fn range_inclusive(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        lo + self.next_u64_below(hi - lo + 1)
    }

    /// Index drawn proportionally to `weights`. Non-positive weights are
    /// never chosen; an all-zero table falls back to index 0.
    pub fn pick_weighted(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return 0;
        }
        let mut roll = self.next_f64() * total;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            if roll < *w {
                return i;
            }
            roll -= w;
        }
        // Float rounding can leave a sliver past the last bucket.
        weights.iter().rposition(|w| *w > 0.0).unwrap_or(0)
    }
}

/// All component RNGs for a single run, indexed by stable slot.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_component(&self, slot: ComponentSlot) -> ComponentRng {
        ComponentRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }

    /// Stream for one step (checkpoint) of a component.
    pub fn for_component_at_step(&self, slot: ComponentSlot, step: u64) -> ComponentRng {
        let mixed = self.master_seed ^ step.wrapping_mul(0xbf58_476d_1ce4_e5b9);
        ComponentRng::new(mixed, slot as u64).with_name(slot.name())
    }
}

/// Stable component slot assignments.
/// NEVER reorder or remove entries, only append.
/// Reordering changes every component's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum ComponentSlot {
    Generator = 0,
    Processor = 1,
}

impl ComponentSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::Processor => "processor",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let bank = RngBank::new(7);
        let mut a = bank.for_component(ComponentSlot::Generator);
        let mut b = bank.for_component(ComponentSlot::Generator);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn steps_produce_distinct_streams() {
        let bank = RngBank::new(7);
        let mut a = bank.for_component_at_step(ComponentSlot::Processor, 1);
        let mut b = bank.for_component_at_step(ComponentSlot::Processor, 2);
        let same = (0..8).all(|_| a.next_u64() == b.next_u64());
        assert!(!same, "step number must perturb the stream");
    }

    #[test]
    fn range_inclusive_stays_in_bounds() {
        let mut rng = ComponentRng::new(99, 0);
        for _ in 0..1_000 {
            let v = rng.range_inclusive(75, 150);
            assert!((75..=150).contains(&v));
        }
        assert_eq!(rng.range_inclusive(100, 100), 100);
    }

    #[test]
    fn pick_weighted_skips_zero_weights() {
        let mut rng = ComponentRng::new(3, 0);
        for _ in 0..500 {
            let i = rng.pick_weighted(&[0.0, 1.0, 0.0, 2.0]);
            assert!(i == 1 || i == 3, "picked zero-weight bucket {i}");
        }
    }
}
