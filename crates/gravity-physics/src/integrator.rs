//! Ship motion
//!
//! The force engine delivers one acceleration per ship per step. An integrator
//! consumes it exactly once; after that the ship's force is stale and reset.

use crate::body::Ship;
use glam::Vec3;

pub trait MotionIntegrator {
    /// Advance `ship` by `dt` using its accumulated force, then consume the force
    fn integrate(&self, ship: &mut Ship, dt: f32);

    fn integrate_all(&self, ships: &mut [Ship], dt: f32) {
        for ship in ships {
            self.integrate(ship, dt);
        }
    }
}

/// Explicit Euler: velocity first, then position with the new velocity
#[derive(Debug, Clone, Copy, Default)]
pub struct EulerIntegrator;

impl MotionIntegrator for EulerIntegrator {
    fn integrate(&self, ship: &mut Ship, dt: f32) {
        ship.velocity += ship.accumulated_force * dt;
        ship.position += ship.velocity * dt;

        // Keep the last heading when the ship comes to rest
        if let Some(heading) = ship.velocity.try_normalize() {
            ship.heading = heading;
        }

        ship.accumulated_force = Vec3::ZERO;
    }
}
