//! `bevy_swarm_flow` — Perlin/fBm flow-field particle swarms for Bevy.
//!
//! # Architecture
//! [`NoiseEngine`] owns a doubled permutation table and a table of 256
//! unit-sphere gradients, and evaluates 3D Perlin noise and fractal sums
//! from them without allocating. [`ParticleSwarm`] advects a cloud of
//! particles through three decorrelated fBm samples of one shared engine,
//! with an optional pointer attractor and a spring back to each particle's
//! spawn position.
//!
//! [`SwarmFlowPlugin`] installs the swarm as a resource and steps it every
//! frame from Bevy's [`Time`]. Rendering reads the buffers and is left to
//! the host app.

pub mod fbm;
pub mod perlin;
pub mod swarm;
pub mod tables;

pub use fbm::FbmConfig;
pub use perlin::{NoiseEngine, NoiseError};
pub use swarm::{Particle, ParticleSwarm, SwarmConfig, SwarmError, attractor_from_ndc};

use std::sync::Arc;

use bevy::prelude::*;

/// World-space point particles are pulled toward, if any.
///
/// The host app's input glue writes this; [`advance_swarm`] reads it.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct PointerAttractor {
    pub target: Option<Vec3>,
}

/// Bevy plugin that spawns a [`ParticleSwarm`] and advances it in `Update`.
///
/// With `seed: None` the noise tables come from OS entropy and the swarm
/// differs every run.
#[derive(Default)]
pub struct SwarmFlowPlugin {
    pub config: SwarmConfig,
    pub seed: Option<u64>,
}

impl SwarmFlowPlugin {
    /// Build the engine and swarm this plugin would install.
    pub fn build_swarm(&self) -> Result<ParticleSwarm, SwarmError> {
        let (noise, seed) = match self.seed {
            Some(seed) => (NoiseEngine::with_seed(seed), seed),
            None => (NoiseEngine::new()?, rand::random()),
        };
        ParticleSwarm::new(Arc::new(noise), self.config.clone(), seed)
    }
}

impl Plugin for SwarmFlowPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PointerAttractor>();
        match self.build_swarm() {
            Ok(swarm) => {
                info!("particle swarm ready with {} particles", swarm.len());
                app.insert_resource(swarm);
            }
            Err(e) => error!("particle swarm disabled: {e}"),
        }
        app.add_systems(Update, advance_swarm.run_if(resource_exists::<ParticleSwarm>));
    }
}

/// Bevy system — steps the swarm by the frame delta.
pub fn advance_swarm(
    time: Res<Time>,
    pointer: Res<PointerAttractor>,
    mut swarm: ResMut<ParticleSwarm>,
) {
    swarm.step(time.delta_secs(), pointer.target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn app_with(plugin: SwarmFlowPlugin) -> App {
        let mut app = App::new();
        app.init_resource::<Time>();
        app.add_plugins(plugin);
        app
    }

    fn small_plugin(seed: u64) -> SwarmFlowPlugin {
        SwarmFlowPlugin {
            config: SwarmConfig {
                particle_count: 64,
                ..default()
            },
            seed: Some(seed),
        }
    }

    #[test]
    fn plugin_steps_swarm_each_update() {
        let mut app = app_with(small_plugin(3));
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_millis(16));
        app.update();

        let swarm = app.world().resource::<ParticleSwarm>();
        assert_eq!(swarm.len(), 64);
        assert_eq!(swarm.frame(), 1);
        assert!((swarm.time() - 0.008).abs() < 1e-6, "time {}", swarm.time());
    }

    #[test]
    fn plugin_matches_direct_stepping() {
        let mut app = app_with(small_plugin(11));
        let target = Vec3::new(2.0, 1.0, -4.0);
        app.world_mut().resource_mut::<PointerAttractor>().target = Some(target);
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_millis(20));
        app.update();

        let mut direct = small_plugin(11).build_swarm().unwrap();
        direct.step(0.02, Some(target));
        assert_eq!(
            app.world().resource::<ParticleSwarm>().particles(),
            direct.particles()
        );
    }

    #[test]
    fn invalid_config_leaves_swarm_uninstalled() {
        let mut app = app_with(SwarmFlowPlugin {
            config: SwarmConfig {
                spawn_radius: -1.0,
                ..default()
            },
            seed: Some(1),
        });
        app.update();
        assert!(app.world().get_resource::<ParticleSwarm>().is_none());
        assert!(app.world().get_resource::<PointerAttractor>().is_some());
    }

    #[test]
    fn unseeded_plugin_builds_from_entropy() {
        let swarm = SwarmFlowPlugin::default().build_swarm().unwrap();
        assert_eq!(swarm.len(), SwarmConfig::default().particle_count);
    }
}
