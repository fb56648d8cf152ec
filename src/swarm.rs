//! CPU particle swarm advected through an fBm flow field.
//!
//! The swarm owns struct-per-particle buffers and advances them one frame at
//! a time. Each frame every particle draws three decorrelated fBm samples
//! (one per axis, separated by a fixed coordinate offset) from a single
//! shared [`NoiseEngine`], gets pulled toward an optional pointer attractor
//! and springs back toward its spawn position. Velocity magnitude then
//! drives point size and a slow colour drift.
//!
//! Work is split into fixed-size chunks on the global [`rayon`] pool. Each
//! chunk seeds its own RNG from the swarm seed, the frame counter and the
//! chunk index, so a swarm replays identically for a given seed no matter
//! how rayon schedules the chunks.

use std::sync::Arc;

use bevy::{
    math::{Vec2, Vec3},
    prelude::Resource,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    fbm::FbmConfig,
    perlin::{NoiseEngine, NoiseError},
    tables::sample_unit_sphere,
};

/// Particles per rayon work item.
const CHUNK_SIZE: usize = 1024;

/// Per-channel weights applied to the velocity-driven colour shift.
const COLOR_SHIFT: [f32; 3] = [0.1, 0.05, 0.15];

/// Error returned when a [`SwarmConfig`] cannot drive a swarm.
#[derive(Debug, Clone, PartialEq)]
pub enum SwarmError {
    /// Spawn radius was zero, negative or non-finite.
    InvalidSpawnRadius(f32),
    /// Pointer falloff radius was zero, negative or non-finite.
    InvalidPointerRadius(f32),
    /// The noise engine could not be built, or the flow fBm parameters
    /// were rejected.
    Noise(NoiseError),
}

impl std::fmt::Display for SwarmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwarmError::InvalidSpawnRadius(r) => {
                write!(f, "spawn radius must be positive and finite (got {r})")
            }
            SwarmError::InvalidPointerRadius(r) => {
                write!(f, "pointer radius must be positive and finite (got {r})")
            }
            SwarmError::Noise(e) => write!(f, "flow noise: {e}"),
        }
    }
}

impl std::error::Error for SwarmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SwarmError::Noise(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NoiseError> for SwarmError {
    fn from(e: NoiseError) -> Self {
        SwarmError::Noise(e)
    }
}

/// Tuning for a [`ParticleSwarm`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Number of particles spawned (and respawned by `resize`).
    pub particle_count: usize,
    /// Radius of the sphere particles are spawned in.
    pub spawn_radius: f32,
    /// World-space to noise-space scale.
    pub noise_scale: f32,
    /// Multiplier on the swarm clock before it is added to the noise z axis.
    pub time_scale: f32,
    /// Swarm clock advance per second of frame time.
    pub time_rate: f32,
    /// Noise-space offset separating the y and z flow samples from x.
    pub axis_offset: f32,
    /// fBm parameters for each flow sample.
    pub flow: FbmConfig,
    /// Gain on the flow acceleration.
    pub flow_speed: f32,
    /// Gain on the velocity-driven colour shift.
    pub color_intensity: f32,
    /// Distance at which the pointer pull fades to zero.
    pub pointer_radius: f32,
    /// Gain on the pull toward the pointer target.
    pub pointer_strength: f32,
    /// Spring constant pulling particles back to their spawn position.
    pub return_strength: f32,
    /// Per-frame velocity multiplier.
    pub damping: f32,
    /// Amplitude of the per-frame random colour walk.
    pub color_jitter: f32,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            particle_count: 5000,
            spawn_radius: 25.0,
            noise_scale: 0.05,
            time_scale: 0.2,
            time_rate: 0.5,
            axis_offset: 100.0,
            flow: FbmConfig::with_octaves(4),
            flow_speed: 0.5,
            color_intensity: 1.0,
            pointer_radius: 15.0,
            pointer_strength: 0.02,
            return_strength: 0.001,
            damping: 0.95,
            color_jitter: 0.01,
        }
    }
}

impl SwarmConfig {
    pub fn validate(&self) -> Result<(), SwarmError> {
        if !(self.spawn_radius.is_finite() && self.spawn_radius > 0.0) {
            return Err(SwarmError::InvalidSpawnRadius(self.spawn_radius));
        }
        if !(self.pointer_radius.is_finite() && self.pointer_radius > 0.0) {
            return Err(SwarmError::InvalidPointerRadius(self.pointer_radius));
        }
        self.flow.validate()?;
        Ok(())
    }
}

/// One point of the swarm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Spawn position; the return spring pulls toward it.
    pub rest: Vec3,
    /// Linear RGB in `[0, 1]`.
    pub color: Vec3,
    pub size: f32,
    pub opacity: f32,
}

/// A flow-field particle swarm sharing one [`NoiseEngine`].
#[derive(Resource)]
pub struct ParticleSwarm {
    noise: Arc<NoiseEngine>,
    config: SwarmConfig,
    particles: Vec<Particle>,
    seed: u64,
    frame: u64,
    /// Kept in f64 so per-frame increments stay representable in long
    /// sessions.
    time: f64,
}

impl ParticleSwarm {
    /// Spawn `config.particle_count` particles. `seed` drives spawning and
    /// the per-frame colour walk; the noise field comes from `noise`.
    pub fn new(noise: Arc<NoiseEngine>, config: SwarmConfig, seed: u64) -> Result<Self, SwarmError> {
        config.validate()?;
        let particles = spawn(&config, &mut StdRng::seed_from_u64(seed));
        Ok(Self {
            noise,
            config,
            particles,
            seed,
            frame: 0,
            time: 0.0,
        })
    }

    /// Current tuning, including any setter changes.
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// The shared engine driving the flow field.
    pub fn noise(&self) -> &Arc<NoiseEngine> {
        &self.noise
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Swarm clock (seconds scaled by `time_rate`).
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of completed [`step`](Self::step) calls.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn set_flow_speed(&mut self, speed: f32) {
        self.config.flow_speed = speed;
    }

    pub fn set_color_intensity(&mut self, intensity: f32) {
        self.config.color_intensity = intensity;
    }

    /// Respawn the swarm with `count` particles. No-op if unchanged.
    pub fn resize(&mut self, count: usize) {
        if count == self.particles.len() {
            return;
        }
        bevy::log::debug!("resizing particle swarm {} -> {count}", self.particles.len());
        self.config.particle_count = count;
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.frame));
        self.particles = spawn(&self.config, &mut rng);
    }

    /// Advance every particle by one frame of `delta` seconds.
    ///
    /// `attractor` is the world-space pointer target, if the pointer is
    /// active.
    pub fn step(&mut self, delta: f32, attractor: Option<Vec3>) {
        self.time += f64::from(delta) * f64::from(self.config.time_rate);
        let frame_seed = self.seed ^ self.frame.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        self.frame = self.frame.wrapping_add(1);

        let ctx = StepContext {
            noise: &self.noise,
            config: &self.config,
            noise_time: self.time * f64::from(self.config.time_scale),
            delta,
            attractor,
        };

        self.particles
            .par_chunks_mut(CHUNK_SIZE)
            .enumerate()
            .for_each(|(chunk, particles)| {
                let mut rng = StdRng::seed_from_u64(frame_seed.wrapping_add(chunk as u64));
                for particle in particles {
                    ctx.advance(particle, &mut rng);
                }
            });
    }

    /// Positions packed for a vertex-attribute upload.
    pub fn position_buffer(&self) -> Vec<[f32; 3]> {
        self.particles.iter().map(|p| p.position.to_array()).collect()
    }

    /// RGBA colours with opacity in alpha.
    pub fn color_buffer(&self) -> Vec<[f32; 4]> {
        self.particles
            .iter()
            .map(|p| p.color.extend(p.opacity).to_array())
            .collect()
    }

    /// Point sizes in particle order.
    pub fn size_buffer(&self) -> Vec<f32> {
        self.particles.iter().map(|p| p.size).collect()
    }
}

/// Frame-constant inputs shared by every rayon chunk.
struct StepContext<'a> {
    noise: &'a NoiseEngine,
    config: &'a SwarmConfig,
    noise_time: f64,
    delta: f32,
    attractor: Option<Vec3>,
}

impl StepContext<'_> {
    /// Flow sample remapped from `[0, 1]` to `[-1, 1]`.
    #[inline]
    fn flow(&self, x: f64, y: f64, z: f64) -> f32 {
        (self.noise.fbm_sum(x, y, z, &self.config.flow) * 2.0 - 1.0) as f32
    }

    fn advance<R: Rng>(&self, particle: &mut Particle, rng: &mut R) {
        let c = self.config;
        let p = particle.position;

        let scale = f64::from(c.noise_scale);
        let offset = f64::from(c.axis_offset);
        let nx = f64::from(p.x) * scale;
        let ny = f64::from(p.y) * scale;
        let nz = f64::from(p.z) * scale + self.noise_time;
        let flow = Vec3::new(
            self.flow(nx, ny, nz),
            self.flow(nx + offset, ny, nz),
            self.flow(nx, ny + offset, nz),
        );

        let pointer = self.attractor.map_or(Vec3::ZERO, |target| {
            let falloff = (1.0 - p.distance(target) / c.pointer_radius).max(0.0);
            (target - p) * falloff * c.pointer_strength
        });
        let spring = (particle.rest - p) * c.return_strength;

        particle.velocity += (flow * c.flow_speed + pointer + spring) * self.delta;
        particle.velocity *= c.damping;
        particle.position += particle.velocity;

        let speed = particle.velocity.length();
        particle.size = 0.1 + speed * 2.0;

        let shift = speed * 5.0 * c.color_intensity;
        for (channel, weight) in COLOR_SHIFT.iter().enumerate() {
            let jitter = (rng.random::<f32>() - 0.5) * c.color_jitter;
            particle.color[channel] =
                (particle.color[channel] + jitter + shift * weight).clamp(0.0, 1.0);
        }
    }
}

/// Fill a sphere of `config.spawn_radius` uniformly by volume.
fn spawn<R: Rng>(config: &SwarmConfig, rng: &mut R) -> Vec<Particle> {
    let radius = config.spawn_radius;
    (0..config.particle_count)
        .map(|_| {
            // cbrt keeps the density uniform through the volume.
            let r = radius * rng.random::<f32>().cbrt();
            let dir = sample_unit_sphere(rng);
            let phi = dir[2].acos() as f32;
            let position = Vec3::new(dir[0] as f32, dir[1] as f32, dir[2] as f32) * r;

            let velocity = Vec3::new(
                rng.random::<f32>() - 0.5,
                rng.random::<f32>() - 0.5,
                rng.random::<f32>() - 0.5,
            ) * 0.02;

            let d = position.length() / radius;
            let angle = position.y.atan2(position.x);
            let color = Vec3::new(
                0.5 + 0.5 * (d * 5.0).sin(),
                0.5 + 0.5 * (angle * 2.0 + d * 3.0).sin(),
                0.5 + 0.5 * (d * 4.0 + phi).cos(),
            );

            Particle {
                position,
                velocity,
                rest: position,
                color,
                size: 0.1 + 0.2 * rng.random::<f32>().powi(2),
                opacity: 0.5 + 0.5 * rng.random::<f32>(),
            }
        })
        .collect()
}

/// World-space pointer target for a camera at the origin looking down -Z.
///
/// `ndc` is the pointer in normalized device coordinates (`[-1, 1]`, +y up).
/// The ray through it is scaled to `distance`.
pub fn attractor_from_ndc(ndc: Vec2, fov_y_degrees: f32, aspect: f32, distance: f32) -> Vec3 {
    let half_height = (fov_y_degrees.to_radians() * 0.5).tan();
    let dir = Vec3::new(ndc.x * half_height * aspect, ndc.y * half_height, -1.0).normalize();
    dir * distance
}
