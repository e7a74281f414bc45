//! Live set of planets and ships
//!
//! The registry is single-writer: nothing here locks. Callers must not register
//! bodies while a step's upload/dispatch/download is in flight; taking a
//! [`Snapshot`] first makes the step independent of later registrations anyway.

use glam::Vec3;

use crate::body::{BodyState, Planet, Ship, Snapshot};

/// Delivering forces to the registry with the wrong length
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("expected one force per ship ({expected}), got {actual}")]
pub struct ForceCountMismatch {
    pub expected: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BodyRegistry {
    planets: Vec<Planet>,
    ships: Vec<Ship>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a planet and return its index. Counts are not bounded here.
    pub fn register_planet(&mut self, position: Vec3, mass: f32) -> usize {
        self.planets.push(Planet::new(position, mass));
        self.planets.len() - 1
    }

    /// Append a ship and return its index
    pub fn register_ship(&mut self, position: Vec3, mass: f32, initial_velocity: Vec3) -> usize {
        self.ships.push(Ship::new(position, mass, initial_velocity));
        self.ships.len() - 1
    }

    pub fn planets(&self) -> &[Planet] {
        &self.planets
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    /// Mutable ship access for the motion integrator between steps
    pub fn ships_mut(&mut self) -> &mut [Ship] {
        &mut self.ships
    }

    pub fn planet_count(&self) -> usize {
        self.planets.len()
    }

    pub fn ship_count(&self) -> usize {
        self.ships.len()
    }

    pub fn snapshot_planets(&self) -> Vec<BodyState> {
        self.planets.iter().map(Planet::state).collect()
    }

    pub fn snapshot_ships(&self) -> Vec<BodyState> {
        self.ships.iter().map(Ship::state).collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.snapshot_ships(), self.snapshot_planets())
    }

    /// Store `forces[i]` as ship `i`'s accumulated force.
    ///
    /// All or nothing: on a length mismatch no ship is touched.
    pub fn apply_forces(&mut self, forces: &[Vec3]) -> Result<(), ForceCountMismatch> {
        if forces.len() != self.ships.len() {
            return Err(ForceCountMismatch {
                expected: self.ships.len(),
                actual: forces.len(),
            });
        }

        for (ship, force) in self.ships.iter_mut().zip(forces) {
            ship.accumulated_force = *force;
        }
        Ok(())
    }
}
