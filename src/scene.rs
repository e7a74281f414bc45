//! Random scene population
//!
//! Bodies spawn on the z = 0 plane. Ships start with a unit speed in a random
//! direction within that plane.

use glam::Vec3;
use gravity_physics::BodyRegistry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SceneConfig;

/// Fill a fresh registry according to `config`
pub fn populate(config: &SceneConfig) -> BodyRegistry {
    match config.seed {
        Some(seed) => populate_with(config, &mut StdRng::seed_from_u64(seed)),
        None => populate_with(config, &mut rand::rng()),
    }
}

pub fn populate_with<R: Rng + ?Sized>(config: &SceneConfig, rng: &mut R) -> BodyRegistry {
    let mut registry = BodyRegistry::new();

    for _ in 0..config.planet_count {
        let position = spawn_position(config, rng);
        let mass = sample(rng, config.planet_mass);
        registry.register_planet(position, mass);
    }

    for _ in 0..config.ship_count {
        let position = spawn_position(config, rng);
        let angle = rng.random_range(0.0..std::f32::consts::TAU);
        let velocity = Vec3::new(angle.cos(), angle.sin(), 0.0);
        registry.register_ship(position, config.ship_mass, velocity);
    }

    log::info!(
        "Spawned {} planets and {} ships",
        registry.planet_count(),
        registry.ship_count()
    );
    registry
}

fn spawn_position<R: Rng + ?Sized>(config: &SceneConfig, rng: &mut R) -> Vec3 {
    Vec3::new(sample(rng, config.limit_x), sample(rng, config.limit_y), 0.0)
}

/// Uniform in `[min, max)`. Reversed bounds are swapped, equal bounds give the bound.
fn sample<R: Rng + ?Sized>(rng: &mut R, (a, b): (f32, f32)) -> f32 {
    let (min, max) = if a <= b { (a, b) } else { (b, a) };
    if min == max {
        min
    } else {
        rng.random_range(min..max)
    }
}
