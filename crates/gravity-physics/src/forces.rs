//! Inverse-square gravity, CPU reference
//!
//! NOTE: this is the exact arithmetic of `shaders/forces.wgsl` in
//! `gravity-simulation`. The host backend runs it to emulate the kernel and the
//! tests use it as ground truth, so the two must stay in lockstep.
//!
//! The law is `planet.mass / distance²` along the unit ship-to-planet
//! direction. The ship's own mass is not a factor and there is no
//! gravitational constant or softening; the result is an acceleration. The only
//! deviation from the plain law is the floor on the squared distance.

use glam::Vec3;

use crate::body::{BodyState, GpuBody};

/// Pull of one planet on a ship at `ship`.
///
/// `distance²` is clamped to `min_distance_sq`, so a ship on top of a planet
/// gets a zero (not NaN) contribution.
#[inline]
pub fn planet_pull(ship: Vec3, planet: Vec3, planet_mass: f32, min_distance_sq: f32) -> Vec3 {
    let delta = planet - ship;
    let distance_sq = delta.length_squared().max(min_distance_sq);
    let distance = distance_sq.sqrt();
    delta * (planet_mass / (distance_sq * distance))
}

/// Total pull of every planet on one ship, as the kernel invocation computes it
pub fn ship_force(ship: Vec3, planets: &[GpuBody], min_distance_sq: f32) -> Vec3 {
    planets.iter().fold(Vec3::ZERO, |total, planet| {
        total + planet_pull(ship, planet.position(), planet.mass, min_distance_sq)
    })
}

/// Force on every ship, index-aligned with `ships`
pub fn compute_forces(ships: &[BodyState], planets: &[BodyState], min_distance_sq: f32) -> Vec<Vec3> {
    let planets: Vec<GpuBody> = planets.iter().map(GpuBody::from).collect();
    ships
        .iter()
        .map(|ship| ship_force(ship.position, &planets, min_distance_sq))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MIN_DISTANCE_SQ;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pull_points_at_planet_with_inverse_square_magnitude() {
        let force = planet_pull(Vec3::new(4.0, 0.0, 0.0), Vec3::ZERO, 2.0, MIN_DISTANCE_SQ);

        assert_abs_diff_eq!(force.x, -2.0 / 16.0, epsilon = 1e-6);
        assert_abs_diff_eq!(force.y, 0.0);
        assert_abs_diff_eq!(force.z, 0.0);
    }

    #[test]
    fn doubling_distance_quarters_the_pull() {
        let near = planet_pull(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0), 1.0, MIN_DISTANCE_SQ);
        let far = planet_pull(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0), 1.0, MIN_DISTANCE_SQ);

        assert_abs_diff_eq!(near.y / far.y, 4.0, epsilon = 1e-4);
    }

    #[test]
    fn coincident_ship_and_planet_stay_finite() {
        let force = planet_pull(Vec3::ONE, Vec3::ONE, 10.0, MIN_DISTANCE_SQ);
        assert!(force.is_finite());
        assert_eq!(force, Vec3::ZERO);

        // Inside the floor the pull is bounded instead of blowing up
        let close = planet_pull(Vec3::ZERO, Vec3::new(1.0e-5, 0.0, 0.0), 1.0, MIN_DISTANCE_SQ);
        assert!(close.is_finite());
        assert!(close.x > 0.0 && close.x < 1.0e5);
    }

    #[test]
    fn symmetric_planets_cancel() {
        let planets = [
            GpuBody { position: [5.0, 0.0, 0.0], mass: 1.0 },
            GpuBody { position: [-5.0, 0.0, 0.0], mass: 1.0 },
        ];
        let force = ship_force(Vec3::ZERO, &planets, MIN_DISTANCE_SQ);

        assert_abs_diff_eq!(force.x, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(force.y, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(force.z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn forces_ignore_ship_mass_and_keep_order() {
        let planets = [BodyState::new(Vec3::ZERO, 3.0)];
        let ships = [
            BodyState::new(Vec3::new(1.0, 0.0, 0.0), 1.0),
            BodyState::new(Vec3::new(0.0, 3.0, 0.0), 500.0),
        ];
        let forces = compute_forces(&ships, &planets, MIN_DISTANCE_SQ);

        assert_eq!(forces.len(), 2);
        assert_abs_diff_eq!(forces[0].x, -3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(forces[1].y, -3.0 / 9.0, epsilon = 1e-5);
    }
}
