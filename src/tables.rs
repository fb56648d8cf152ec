//! Lookup tables backing [`NoiseEngine`](crate::perlin::NoiseEngine).
//!
//! Both tables are flat fixed-length arrays built once and never mutated.
//! The permutation table is stored twice over (512 entries) so the chained
//! corner hashing in `perlin3d` can index `p[base + 1]` for any base in
//! `0..=510` without masking.

use std::f64::consts::TAU;

use rand::Rng;

use crate::perlin::NoiseError;

/// Number of distinct lattice hashes (and gradient vectors).
pub const TABLE_SIZE: usize = 256;

/// Doubled permutation of `0..=255`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermutationTable {
    p: [u8; TABLE_SIZE * 2],
}

impl PermutationTable {
    /// Shuffle `0..=255` with Fisher–Yates (from the last index down to 1)
    /// and mirror the result into the upper half.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut base: [u8; TABLE_SIZE] = std::array::from_fn(|i| i as u8);
        for i in (1..TABLE_SIZE).rev() {
            let j = rng.random_range(0..=i);
            base.swap(i, j);
        }
        Self::from_base(base)
    }

    /// Build from an explicit 256-entry permutation.
    ///
    /// Returns [`NoiseError::InvalidPermutation`] unless every value in
    /// `0..=255` appears exactly once.
    pub fn from_permutation(base: [u8; TABLE_SIZE]) -> Result<Self, NoiseError> {
        let mut seen = [false; TABLE_SIZE];
        for &v in &base {
            if std::mem::replace(&mut seen[v as usize], true) {
                return Err(NoiseError::InvalidPermutation { duplicate: v });
            }
        }
        Ok(Self::from_base(base))
    }

    fn from_base(base: [u8; TABLE_SIZE]) -> Self {
        Self {
            p: std::array::from_fn(|i| base[i % TABLE_SIZE]),
        }
    }

    /// Table entry at `index`, widened for hash arithmetic.
    ///
    /// `index` must be below 512; the chained lookup in `perlin3d` never
    /// produces more than 511.
    #[inline(always)]
    pub(crate) fn get(&self, index: usize) -> usize {
        self.p[index] as usize
    }

    /// All 512 entries; the upper half mirrors the lower.
    pub fn as_slice(&self) -> &[u8] {
        &self.p
    }
}

/// 256 unit gradients distributed uniformly over the sphere.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientTable {
    g: [[f64; 3]; TABLE_SIZE],
}

impl GradientTable {
    /// Draw 256 gradients with [`sample_unit_sphere`], in table order.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            g: std::array::from_fn(|_| sample_unit_sphere(rng)),
        }
    }

    /// Build from explicit vectors. They are used as given and not
    /// renormalized.
    pub fn from_vectors(g: [[f64; 3]; TABLE_SIZE]) -> Self {
        Self { g }
    }

    /// Gradient for a lattice hash; any hash maps into range via `& 255`.
    #[inline(always)]
    pub fn get(&self, hash: usize) -> [f64; 3] {
        self.g[hash & (TABLE_SIZE - 1)]
    }

    /// The 256 gradients as `[x, y, z]`.
    pub fn as_slice(&self) -> &[[f64; 3]] {
        &self.g
    }
}

/// Uniform random point on the unit sphere.
///
/// Draws `theta` first, then the `u` that sets `cos(phi) = 2u - 1`.
///
/// `phi` comes from the inverse CDF `acos(2u - 1)` so the samples are
/// uniform in `cos(phi)`; drawing `phi` uniformly would bunch points at
/// the poles.
pub fn sample_unit_sphere<R: Rng + ?Sized>(rng: &mut R) -> [f64; 3] {
    let theta = TAU * rng.random::<f64>();
    let phi = (2.0 * rng.random::<f64>() - 1.0).acos();
    let (sin_phi, cos_phi) = phi.sin_cos();
    [sin_phi * theta.cos(), sin_phi * theta.sin(), cos_phi]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn permutation_is_doubled_bijection() {
        let table = PermutationTable::random(&mut StdRng::seed_from_u64(3));
        let p = table.as_slice();
        assert_eq!(p.len(), 512);

        let mut counts = [0u32; TABLE_SIZE];
        for &v in p {
            counts[v as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c == 2), "every value must appear twice");
        assert_eq!(&p[..TABLE_SIZE], &p[TABLE_SIZE..], "upper half must mirror lower half");
    }

    #[test]
    fn shuffle_actually_moves_entries() {
        let table = PermutationTable::random(&mut StdRng::seed_from_u64(11));
        let fixed_points = (0..TABLE_SIZE).filter(|&i| table.get(i) == i).count();
        // Expected number of fixed points of a random permutation is 1.
        assert!(fixed_points < 16, "{fixed_points} fixed points, shuffle looks inert");
    }

    #[test]
    fn from_permutation_rejects_duplicates() {
        let mut base: [u8; TABLE_SIZE] = std::array::from_fn(|i| i as u8);
        assert!(PermutationTable::from_permutation(base).is_ok());
        base[7] = 8;
        assert_eq!(
            PermutationTable::from_permutation(base),
            Err(NoiseError::InvalidPermutation { duplicate: 8 })
        );
    }

    /// Replays a fixed list of 64-bit outputs, cycling when exhausted.
    struct ScriptedRng {
        values: Vec<u64>,
        next: usize,
    }

    impl ScriptedRng {
        fn new(values: &[u64]) -> Self {
            Self {
                values: values.to_vec(),
                next: 0,
            }
        }
    }

    impl rand::RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            self.next_u64() as u32
        }

        fn next_u64(&mut self) -> u64 {
            let v = self.values[self.next % self.values.len()];
            self.next += 1;
            v
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            for chunk in dst.chunks_mut(8) {
                let bytes = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }
    }

    #[test]
    fn sphere_sample_draws_theta_then_height() {
        // Roughly 0.25 and 0.75 once mapped to [0, 1).
        let script = [1u64 << 62, 3u64 << 62];
        let mut reference = ScriptedRng::new(&script);
        let first = reference.random::<f64>();
        let second = reference.random::<f64>();

        let v = sample_unit_sphere(&mut ScriptedRng::new(&script));
        let theta = TAU * first;
        let cos_phi = 2.0 * second - 1.0;
        let sin_phi = (1.0 - cos_phi * cos_phi).sqrt();
        assert!((v[2] - cos_phi).abs() < 1e-12, "z = {}, expected {cos_phi}", v[2]);
        assert!((v[0] - sin_phi * theta.cos()).abs() < 1e-12, "x = {}", v[0]);
        assert!((v[1] - sin_phi * theta.sin()).abs() < 1e-12, "y = {}", v[1]);
    }

    #[test]
    fn gradients_are_unit_length() {
        let table = GradientTable::random(&mut StdRng::seed_from_u64(5));
        for (i, g) in table.as_slice().iter().enumerate() {
            let len = (g[0] * g[0] + g[1] * g[1] + g[2] * g[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-12, "gradient {i} has length {len}");
        }
    }

    #[test]
    fn gradient_lookup_masks_hash() {
        let table = GradientTable::random(&mut StdRng::seed_from_u64(5));
        assert_eq!(table.get(3), table.get(3 + 256));
        assert_eq!(table.get(255), table.get(511));
    }

    /// The mean of many uniform sphere samples should sit near the origin.
    /// Per-axis standard error at n = 10 000 is about 0.006.
    #[test]
    fn sphere_samples_are_isotropic() {
        let mut rng = StdRng::seed_from_u64(2024);
        let n = 10_000;
        let mut sum = [0.0f64; 3];
        let mut upper = 0usize;
        for _ in 0..n {
            let v = sample_unit_sphere(&mut rng);
            sum[0] += v[0];
            sum[1] += v[1];
            sum[2] += v[2];
            if v[2] > 0.5 {
                upper += 1;
            }
        }
        let mean = sum.map(|s| s / n as f64);
        let mag = (mean[0] * mean[0] + mean[1] * mean[1] + mean[2] * mean[2]).sqrt();
        assert!(mag < 0.05, "mean gradient magnitude {mag} shows directional bias");

        // Cap z > 0.5 covers a quarter of the sphere's area.
        let cap = upper as f64 / n as f64;
        assert!((cap - 0.25).abs() < 0.03, "polar cap fraction {cap}, expected ~0.25");
    }
}
