//! Seedable random source threaded through initialization and sampling.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Explicit pseudo-random generator.
///
/// Every consumer receives it by `&mut` reference, so two runs built from the
/// same seed draw the same stream.
#[derive(Debug, Clone)]
pub struct Random {
    rng: ChaCha8Rng,
}

impl Random {
    /// Seeded generator, or an entropy-seeded one for `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self { rng }
    }

    /// Generator with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    /// Uniform draw from `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform index in `0..n`. `n` must be non-zero.
    #[inline]
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Standard normal draw.
    #[inline]
    pub fn standard_normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    /// `k` distinct indices from `0..n`, in draw order.
    pub fn distinct_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        rand::seq::index::sample(&mut self.rng, n, k).into_vec()
    }

    /// Index drawn with probability proportional to `weights[i]`.
    ///
    /// Falls back to a uniform draw when the weights sum to zero.
    pub fn weighted_index(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            return self.index(weights.len());
        }

        let mut threshold = self.uniform() * total;
        for (i, &w) in weights.iter().enumerate() {
            threshold -= w;
            if threshold < 0.0 {
                return i;
            }
        }

        // Rounding can leave a tiny positive remainder; take the last
        // non-zero weight.
        weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
    }
}

impl RngCore for Random {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
