//! Force engine: one upload → dispatch → download cycle per step
//!
//! The engine owns its device and transfer buffers and releases them exactly
//! once, either through [`ForceEngine::release`] or on drop. Steps are strictly
//! sequential; the only parallelism is inside the dispatch, where each kernel
//! invocation owns one ship's output slot.

use glam::Vec3;
use gravity_physics::{BodyRegistry, BodyState, Snapshot};

use crate::buffers::TransferBuffers;
use crate::device::{Binding, ComputeDevice, Scalar};
use crate::error::EngineError;

/// What a registry step did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// No ships or no planets; nothing was dispatched or delivered
    Skipped,
    /// Forces were computed and delivered to every ship
    Delivered { ships: usize, groups: u32 },
}

pub struct ForceEngine<D: ComputeDevice> {
    device: D,
    buffers: TransferBuffers<D::Buffer>,
    steps: u64,
}

impl<D: ComputeDevice> ForceEngine<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            buffers: TransferBuffers::new(),
            steps: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn buffers(&self) -> &TransferBuffers<D::Buffer> {
        &self.buffers
    }

    /// Steps that reached the device
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Work groups a dispatch for `ship_count` ships launches
    pub fn group_count(&self, ship_count: usize) -> Result<u32, EngineError> {
        let ships = kernel_count(ship_count, Scalar::ShipCount)?;
        Ok(self.device.params().group_count(ships))
    }

    pub fn ensure_capacity(&mut self, ship_count: usize, planet_count: usize) -> Result<bool, EngineError> {
        self.buffers
            .ensure_capacity(&mut self.device, ship_count, planet_count)
    }

    pub fn upload(&mut self, ships: &[BodyState], planets: &[BodyState]) -> Result<(), EngineError> {
        self.buffers.upload(&mut self.device, ships, planets)
    }

    /// Bind buffers and counts, then launch `ceil(ship_count / group_size)` groups.
    ///
    /// Returns once the device has recorded the work; completion is only
    /// guaranteed by the following [`download`](Self::download). A zero count on
    /// either side is a no-op, and the next download is then empty.
    pub fn dispatch(&mut self, ship_count: usize, planet_count: usize) -> Result<(), EngineError> {
        if ship_count == 0 || planet_count == 0 {
            self.buffers.invalidate_forces();
            return Ok(());
        }

        for (binding, expected, actual) in [
            (Binding::Ships, self.buffers.ship_capacity(), ship_count),
            (Binding::Planets, self.buffers.planet_capacity(), planet_count),
        ] {
            if expected != actual {
                return Err(EngineError::SnapshotMismatch {
                    binding,
                    expected,
                    actual,
                });
            }
        }

        let ships = kernel_count(ship_count, Scalar::ShipCount)?;
        let planets = kernel_count(planet_count, Scalar::PlanetCount)?;
        let groups = self.device.params().group_count(ships);

        self.buffers.bind(&mut self.device)?;
        self.device.bind_scalar(Scalar::ShipCount, ships);
        self.device.bind_scalar(Scalar::PlanetCount, planets);
        self.device.dispatch([groups, 1, 1])?;
        self.buffers.mark_dispatched();
        Ok(())
    }

    /// One force per ship, in uploaded order. Waits for the last dispatch.
    pub fn download(&mut self) -> Result<Vec<Vec3>, EngineError> {
        self.buffers.download(&mut self.device)
    }

    /// Run a full step on `snapshot`.
    ///
    /// An empty ship or planet list returns no forces without touching the
    /// device, so buffers are neither reallocated nor dispatched.
    pub fn step(&mut self, snapshot: &Snapshot) -> Result<Vec<Vec3>, EngineError> {
        if snapshot.is_degenerate() {
            log::trace!(
                "Skipping step: {} ships, {} planets",
                snapshot.ships.len(),
                snapshot.planets.len()
            );
            return Ok(Vec::new());
        }

        let ship_count = snapshot.ships.len();
        let planet_count = snapshot.planets.len();

        self.ensure_capacity(ship_count, planet_count)?;
        self.upload(&snapshot.ships, &snapshot.planets)?;
        self.dispatch(ship_count, planet_count)?;
        let forces = self.download()?;

        self.steps += 1;
        log::debug!(
            "Step {}: {} ships x {} planets",
            self.steps,
            ship_count,
            planet_count
        );
        Ok(forces)
    }

    /// Snapshot `registry`, run a step and store each ship's force.
    ///
    /// On error no ship receives a force from this step.
    pub fn step_registry(&mut self, registry: &mut BodyRegistry) -> Result<StepOutcome, EngineError> {
        let snapshot = registry.snapshot();
        if snapshot.is_degenerate() {
            return Ok(StepOutcome::Skipped);
        }

        let forces = self.step(&snapshot)?;
        registry.apply_forces(&forces)?;

        Ok(StepOutcome::Delivered {
            ships: forces.len(),
            groups: self.group_count(forces.len())?,
        })
    }

    /// Free every device buffer. Later steps allocate again.
    pub fn release(&mut self) {
        self.buffers.release(&mut self.device);
    }
}

fn kernel_count(count: usize, scalar: Scalar) -> Result<u32, EngineError> {
    u32::try_from(count).map_err(|_| {
        EngineError::InvalidParams(format!("{} of {count} does not fit the kernel's u32", scalar.name()))
    })
}

impl<D: ComputeDevice> Drop for ForceEngine<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostDevice;
    use crate::params::KernelParams;
    use gravity_physics::MIN_DISTANCE_SQ;

    fn engine() -> ForceEngine<HostDevice> {
        ForceEngine::new(HostDevice::new(KernelParams::default()).unwrap())
    }

    #[test]
    fn dispatch_before_allocation_fails() {
        let mut engine = engine();
        assert!(engine.dispatch(1, 1).is_err());
        assert_eq!(engine.device().stats().dispatches, 0);
    }

    #[test]
    fn manual_cycle_matches_step() {
        let snapshot = Snapshot::new(
            vec![BodyState::new(Vec3::new(2.0, 0.0, 0.0), 1.0)],
            vec![BodyState::new(Vec3::ZERO, 4.0)],
        );

        let mut manual = engine();
        manual.ensure_capacity(1, 1).unwrap();
        manual.upload(&snapshot.ships, &snapshot.planets).unwrap();
        manual.dispatch(1, 1).unwrap();
        let by_hand = manual.download().unwrap();

        let by_step = engine().step(&snapshot).unwrap();
        assert_eq!(by_hand, by_step);
        assert_eq!(by_step, gravity_physics::compute_forces(&snapshot.ships, &snapshot.planets, MIN_DISTANCE_SQ));
    }

    #[test]
    fn dispatch_with_stale_counts_is_rejected() {
        let mut engine = engine();
        engine.ensure_capacity(2, 1).unwrap();
        assert!(matches!(
            engine.dispatch(3, 1),
            Err(EngineError::SnapshotMismatch { binding: Binding::Ships, expected: 2, actual: 3 })
        ));
        assert!(matches!(
            engine.dispatch(2, 4),
            Err(EngineError::SnapshotMismatch { binding: Binding::Planets, expected: 1, actual: 4 })
        ));
    }

    #[test]
    fn release_is_idempotent_and_drop_safe() {
        let mut engine = engine();
        engine.release();
        engine.ensure_capacity(4, 2).unwrap();
        engine.release();
        engine.release();

        let stats = engine.device().stats();
        assert_eq!(stats.allocations, 3);
        assert_eq!(stats.releases, 3);
        assert_eq!(engine.buffers().ship_capacity(), 0);
    }
}
