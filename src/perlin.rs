//! Classic improved-Perlin gradient noise over a randomized unit-sphere
//! gradient set.
//!
//! The lattice wraps every 256 cells along each axis. Output is remapped
//! from the raw `[-1, 1]` interval to `[0, 1]`.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::tables::{GradientTable, PermutationTable, TABLE_SIZE};

/// Errors raised by noise construction or fractal evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseError {
    /// The operating-system entropy source could not seed the table RNG.
    RandomSource(String),
    /// An injected permutation repeated a value.
    InvalidPermutation { duplicate: u8 },
    /// A fractal sum was requested with zero octaves.
    ZeroOctaves,
    /// The octave amplitudes summed to exactly zero, so the sum cannot be
    /// normalized.
    DegenerateAmplitude { persistence: f64, octaves: u32 },
}

impl std::fmt::Display for NoiseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoiseError::RandomSource(e) => write!(f, "failed to seed noise tables: {e}"),
            NoiseError::InvalidPermutation { duplicate } => {
                write!(f, "permutation repeats value {duplicate}")
            }
            NoiseError::ZeroOctaves => write!(f, "fractal noise needs at least one octave"),
            NoiseError::DegenerateAmplitude {
                persistence,
                octaves,
            } => write!(
                f,
                "octave amplitudes sum to zero (persistence={persistence}, octaves={octaves})"
            ),
        }
    }
}

impl std::error::Error for NoiseError {}

/// Owns the permutation and gradient tables and evaluates noise from them.
///
/// Evaluation only reads the tables, so one engine can be shared across
/// threads (e.g. behind an `Arc`) with no locking.
#[derive(Clone, Debug)]
pub struct NoiseEngine {
    perm: PermutationTable,
    gradients: GradientTable,
}

impl NoiseEngine {
    /// Build fresh tables from operating-system entropy.
    pub fn new() -> Result<Self, NoiseError> {
        let mut rng =
            StdRng::try_from_os_rng().map_err(|e| NoiseError::RandomSource(e.to_string()))?;
        Ok(Self::from_rng(&mut rng))
    }

    /// Deterministic engine: equal seeds produce identical noise fields.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(&mut StdRng::seed_from_u64(seed))
    }

    /// Build from any random source. The permutation is drawn first, then
    /// the gradients.
    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let perm = PermutationTable::random(rng);
        let gradients = GradientTable::random(rng);
        Self { perm, gradients }
    }

    /// Use exact tables, e.g. recorded ones for reproducible tests.
    pub fn from_tables(perm: PermutationTable, gradients: GradientTable) -> Self {
        Self { perm, gradients }
    }

    /// The doubled permutation table used for lattice hashing.
    pub fn permutation(&self) -> &PermutationTable {
        &self.perm
    }

    /// The 256 unit gradients indexed by lattice hash.
    pub fn gradients(&self) -> &GradientTable {
        &self.gradients
    }

    /// Dot product of the lattice gradient selected by `hash` with the
    /// corner offset `(x, y, z)`.
    #[inline(always)]
    pub fn grad(&self, hash: usize, x: f64, y: f64, z: f64) -> f64 {
        let g = self.gradients.get(hash);
        g[0] * x + g[1] * y + g[2] * z
    }

    /// 3D Perlin noise in `[0, 1]`.
    ///
    /// Continuous with a continuous first derivative everywhere, periodic
    /// with period 256 on every axis. NaN or infinite inputs propagate.
    pub fn perlin3d(&self, x: f64, y: f64, z: f64) -> f64 {
        let (fx, fy, fz) = (x.floor(), y.floor(), z.floor());
        let xi = lattice(fx);
        let yi = lattice(fy);
        let zi = lattice(fz);

        let x = x - fx;
        let y = y - fy;
        let z = z - fz;

        let u = fade(x);
        let v = fade(y);
        let w = fade(z);

        let p = &self.perm;
        let a = p.get(xi) + yi;
        let aa = p.get(a) + zi;
        let ab = p.get(a + 1) + zi;
        let b = p.get(xi + 1) + yi;
        let ba = p.get(b) + zi;
        let bb = p.get(b + 1) + zi;

        let g_aa = self.grad(p.get(aa), x, y, z);
        let g_ba = self.grad(p.get(ba), x - 1.0, y, z);
        let g_ab = self.grad(p.get(ab), x, y - 1.0, z);
        let g_bb = self.grad(p.get(bb), x - 1.0, y - 1.0, z);
        let g_aa1 = self.grad(p.get(aa + 1), x, y, z - 1.0);
        let g_ba1 = self.grad(p.get(ba + 1), x - 1.0, y, z - 1.0);
        let g_ab1 = self.grad(p.get(ab + 1), x, y - 1.0, z - 1.0);
        let g_bb1 = self.grad(p.get(bb + 1), x - 1.0, y - 1.0, z - 1.0);

        let x0 = lerp(g_aa, g_ba, u);
        let x1 = lerp(g_ab, g_bb, u);
        let x0z = lerp(g_aa1, g_ba1, u);
        let x1z = lerp(g_ab1, g_bb1, u);

        let y0 = lerp(x0, x1, v);
        let y0z = lerp(x0z, x1z, v);

        let result = lerp(y0, y0z, w);
        (result + 1.0) / 2.0
    }
}

/// Lattice cell index wrapped to `0..=255`.
///
/// Non-finite coordinates saturate in the cast; the fractional part is NaN
/// in that case so the output is NaN regardless of which cell is picked.
#[inline(always)]
fn lattice(floored: f64) -> usize {
    (floored as i64 & (TABLE_SIZE as i64 - 1)) as usize
}

/// Quintic smoothstep `6t^5 - 15t^4 + 10t^3`.
///
/// First and second derivatives vanish at 0 and 1, which hides the lattice.
#[inline(always)]
pub fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

/// Linear interpolation `a + t(b - a)`.
#[inline(always)]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

impl noise::NoiseFn<f64, 3> for NoiseEngine {
    fn get(&self, point: [f64; 3]) -> f64 {
        self.perlin3d(point[0], point[1], point[2])
    }
}
