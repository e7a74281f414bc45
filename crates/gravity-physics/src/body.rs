//! Body types for the gravity simulation
//!
//! Planets are sources of gravity, ships are the agents that feel it. A
//! [`Snapshot`] copies the state the force kernel needs at the start of a step,
//! so registry mutations can never alias an in-flight step.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::constants::{BODY_RECORD_SIZE, FORCE_RECORD_SIZE};

/// A massive body. Position and mass do not change while a step runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Planet {
    pub position: Vec3,
    pub mass: f32,
}

impl Planet {
    pub fn new(position: Vec3, mass: f32) -> Self {
        Self { position, mass }
    }

    /// Render radius. Planets are drawn with a diameter of twice their mass.
    pub fn radius(&self) -> f32 {
        self.mass
    }

    pub fn state(&self) -> BodyState {
        BodyState {
            position: self.position,
            mass: self.mass,
        }
    }
}

/// A mobile agent pulled by every planet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ship {
    pub position: Vec3,
    /// Carried for callers; the force law does not scale by it
    pub mass: f32,
    pub velocity: Vec3,
    /// Written once per step by the force engine, consumed once by the integrator
    pub accumulated_force: Vec3,
    /// Unit direction the ship faces
    pub heading: Vec3,
}

impl Ship {
    pub fn new(position: Vec3, mass: f32, velocity: Vec3) -> Self {
        Self {
            position,
            mass,
            velocity,
            accumulated_force: Vec3::ZERO,
            heading: velocity.try_normalize().unwrap_or(Vec3::Y),
        }
    }

    pub fn state(&self) -> BodyState {
        BodyState {
            position: self.position,
            mass: self.mass,
        }
    }
}

/// Position and mass of one body as captured in a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub mass: f32,
}

impl BodyState {
    pub fn new(position: Vec3, mass: f32) -> Self {
        Self { position, mass }
    }
}

/// Fixed-layout body record uploaded to the device (matches WGSL `Body`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuBody {
    pub position: [f32; 3],
    pub mass: f32,
}

impl From<&BodyState> for GpuBody {
    fn from(state: &BodyState) -> Self {
        Self {
            position: state.position.to_array(),
            mass: state.mass,
        }
    }
}

impl GpuBody {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Force record written by the device (matches WGSL `Force`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuForce {
    pub force: [f32; 3],
    pub _padding: f32,
}

impl GpuForce {
    pub fn new(force: Vec3) -> Self {
        Self {
            force: force.to_array(),
            _padding: 0.0,
        }
    }

    pub fn force(&self) -> Vec3 {
        Vec3::from_array(self.force)
    }
}

const _: () = assert!(std::mem::size_of::<GpuBody>() == BODY_RECORD_SIZE);
const _: () = assert!(std::mem::size_of::<GpuForce>() == FORCE_RECORD_SIZE);

/// Ordered ship and planet state for one step.
///
/// Index `i` in `ships` is the only link between a ship and force `i` of the
/// step's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub ships: Vec<BodyState>,
    pub planets: Vec<BodyState>,
}

impl Snapshot {
    pub fn new(ships: Vec<BodyState>, planets: Vec<BodyState>) -> Self {
        Self { ships, planets }
    }

    /// True when the step would have nothing to compute
    pub fn is_degenerate(&self) -> bool {
        self.ships.is_empty() || self.planets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_body_packs_position_then_mass() {
        let record = GpuBody::from(&BodyState::new(Vec3::new(1.0, 2.0, 3.0), 4.0));
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&record));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn planet_diameter_is_twice_its_mass() {
        let planet = Planet::new(Vec3::ZERO, 0.35);
        assert_eq!(planet.radius(), 0.35);
        assert_eq!(planet.radius() * 2.0, 0.7);
    }

    #[test]
    fn ship_heading_follows_initial_velocity() {
        let ship = Ship::new(Vec3::ZERO, 1.0, Vec3::new(0.0, -3.0, 0.0));
        assert_eq!(ship.heading, Vec3::NEG_Y);

        let parked = Ship::new(Vec3::ZERO, 1.0, Vec3::ZERO);
        assert_eq!(parked.heading, Vec3::Y);
    }

    #[test]
    fn snapshot_without_planets_is_degenerate() {
        let ships = vec![BodyState::new(Vec3::ZERO, 1.0)];
        assert!(Snapshot::new(ships.clone(), Vec::new()).is_degenerate());
        assert!(Snapshot::new(Vec::new(), ships.clone()).is_degenerate());
        assert!(!Snapshot::new(ships.clone(), ships).is_degenerate());
    }
}
