//! Pluggable random source (spec §5/§9: "all nondeterminism comes from a
//! single pluggable random source"). Tests pin behavior with a seeded
//! `StdRng`; hosts can supply their own `Rng` implementation.

pub use rand::rngs::StdRng;
pub use rand::{Rng, SeedableRng};

/// Fisher-Yates shuffle used by the eternal-phrase urn (`RandomUrn` mode).
pub fn shuffle<T>(items: &mut [T], rng: &mut impl Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Draws a uniform `[0, 1)` sample, the primitive used by weighted selection.
pub fn uniform01(rng: &mut impl Rng) -> f64 {
    rng.gen_range(0.0..1.0)
}
