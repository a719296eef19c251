//! Filler randomness for the obfuscation codec.
//!
//! The codec only needs filler characters whose content is irrelevant to
//! correctness, so a fast PCG stream is enough. Production stores seed it
//! from entropy; tests seed it explicitly so encoded output is reproducible.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct FillerRng {
    inner: Pcg64Mcg,
}

impl FillerRng {
    /// Stream seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self { inner: Pcg64Mcg::from_entropy() }
    }

    /// Reproducible stream for tests and tooling.
    pub fn seeded(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    /// Draw a u64 in [0, n).
    pub fn next_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Pick one element of a non-empty slice.
    pub fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        let index = self.next_below(items.len() as u64) as usize;
        items[index]
    }
}
