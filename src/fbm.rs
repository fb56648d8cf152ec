//! Multi-octave fractal Brownian motion (fBm) on top of
//! [`NoiseEngine::perlin3d`].

use serde::{Deserialize, Serialize};

use crate::perlin::{NoiseEngine, NoiseError};

/// Configuration for a fractal sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FbmConfig {
    /// Number of noise octaves; must be at least 1.
    pub octaves: u32,
    /// Frequency multiplier per octave.
    pub lacunarity: f64,
    /// Amplitude multiplier per octave.
    pub persistence: f64,
}

impl Default for FbmConfig {
    fn default() -> Self {
        Self {
            octaves: 6,
            lacunarity: 2.0,
            persistence: 0.5,
        }
    }
}

impl FbmConfig {
    pub fn with_octaves(octaves: u32) -> Self {
        Self {
            octaves,
            ..Default::default()
        }
    }

    /// Reject parameters the normalization cannot handle.
    ///
    /// Call once before a hot loop; the per-sample path does not re-check.
    pub fn validate(&self) -> Result<(), NoiseError> {
        if self.octaves == 0 {
            return Err(NoiseError::ZeroOctaves);
        }
        if self.amplitude_sum() == 0.0 {
            return Err(NoiseError::DegenerateAmplitude {
                persistence: self.persistence,
                octaves: self.octaves,
            });
        }
        Ok(())
    }

    /// Sum of the octave amplitudes, i.e. the normalization divisor.
    pub fn amplitude_sum(&self) -> f64 {
        let mut amplitude = 1.0;
        let mut sum = 0.0;
        for _ in 0..self.octaves {
            sum += amplitude;
            amplitude *= self.persistence;
        }
        sum
    }
}

impl NoiseEngine {
    /// Fractal sum of `octaves` Perlin layers, normalized by the amplitude
    /// total so the result stays in `[0, 1]` for sane parameters.
    ///
    /// With `octaves == 1` this is exactly [`perlin3d`](Self::perlin3d).
    pub fn fbm3d(
        &self,
        x: f64,
        y: f64,
        z: f64,
        octaves: u32,
        lacunarity: f64,
        persistence: f64,
    ) -> Result<f64, NoiseError> {
        self.fbm3d_with(
            x,
            y,
            z,
            &FbmConfig {
                octaves,
                lacunarity,
                persistence,
            },
        )
    }

    /// [`fbm3d`](Self::fbm3d) with the parameters taken from `config`.
    ///
    /// Zero octaves and an amplitude total of exactly zero are errors. Both
    /// checks ride on the same pass that accumulates the octaves.
    pub fn fbm3d_with(&self, x: f64, y: f64, z: f64, config: &FbmConfig) -> Result<f64, NoiseError> {
        if config.octaves == 0 {
            return Err(NoiseError::ZeroOctaves);
        }
        let (total, max_value) = self.octave_sums(x, y, z, config);
        if max_value == 0.0 {
            return Err(NoiseError::DegenerateAmplitude {
                persistence: config.persistence,
                octaves: config.octaves,
            });
        }
        Ok(total / max_value)
    }

    /// Unchecked fractal sum. `config` must already have passed
    /// [`FbmConfig::validate`].
    #[inline]
    pub(crate) fn fbm_sum(&self, x: f64, y: f64, z: f64, config: &FbmConfig) -> f64 {
        let (total, max_value) = self.octave_sums(x, y, z, config);
        total / max_value
    }

    /// Weighted octave total and the amplitude total it is normalized by.
    #[inline(always)]
    fn octave_sums(&self, x: f64, y: f64, z: f64, config: &FbmConfig) -> (f64, f64) {
        let mut total = 0.0;
        let mut frequency = 1.0;
        let mut amplitude = 1.0;
        let mut max_value = 0.0;

        for _ in 0..config.octaves {
            total += self.perlin3d(x * frequency, y * frequency, z * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= config.persistence;
            frequency *= config.lacunarity;
        }

        (total, max_value)
    }
}
