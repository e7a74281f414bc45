//! Host staging arrays and device buffers for ships, planets and forces
//!
//! Capacities follow the body counts of the last `ensure_capacity`. A ship count
//! change replaces the ship and force buffers only; the planet buffer and its
//! contents are left alone, and vice versa.

use glam::Vec3;
use gravity_physics::{BodyState, GpuBody, GpuForce, BODY_RECORD_SIZE, FORCE_RECORD_SIZE};

use crate::device::{Binding, ComputeDevice};
use crate::error::EngineError;

pub struct TransferBuffers<B> {
    ships: Option<B>,
    planets: Option<B>,
    forces: Option<B>,

    ship_capacity: usize,
    planet_capacity: usize,

    // Set by a completed dispatch, cleared by anything that invalidates its output
    forces_valid: bool,

    // Host staging, reused across steps
    ship_records: Vec<GpuBody>,
    planet_records: Vec<GpuBody>,
    force_records: Vec<GpuForce>,
}

impl<B> Default for TransferBuffers<B> {
    fn default() -> Self {
        Self {
            ships: None,
            planets: None,
            forces: None,
            ship_capacity: 0,
            planet_capacity: 0,
            forces_valid: false,
            ship_records: Vec::new(),
            planet_records: Vec::new(),
            force_records: Vec::new(),
        }
    }
}

impl<B> TransferBuffers<B> {
    /// No buffers yet; both capacities read as 0
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ship_capacity(&self) -> usize {
        self.ship_capacity
    }

    pub fn planet_capacity(&self) -> usize {
        self.planet_capacity
    }

    /// Whether the force buffer holds the output of a dispatch on the current upload
    pub fn forces_valid(&self) -> bool {
        self.forces_valid
    }

    /// Record that a dispatch over the current upload completed
    pub(crate) fn mark_dispatched(&mut self) {
        self.forces_valid = true;
    }

    pub(crate) fn invalidate_forces(&mut self) {
        self.forces_valid = false;
    }

    pub fn buffer(&self, binding: Binding) -> Option<&B> {
        match binding {
            Binding::Ships => self.ships.as_ref(),
            Binding::Planets => self.planets.as_ref(),
            Binding::OutForces => self.forces.as_ref(),
        }
    }

    fn slot_mut(&mut self, binding: Binding) -> &mut Option<B> {
        match binding {
            Binding::Ships => &mut self.ships,
            Binding::Planets => &mut self.planets,
            Binding::OutForces => &mut self.forces,
        }
    }

    /// Resize device buffers to `ship_count` / `planet_count` records.
    ///
    /// Returns whether anything was reallocated. Unchanged counts are a no-op.
    /// Replacements are all allocated before any current buffer is released, so
    /// a failure leaves the previous buffers intact.
    pub fn ensure_capacity<D>(
        &mut self,
        device: &mut D,
        ship_count: usize,
        planet_count: usize,
    ) -> Result<bool, EngineError>
    where
        D: ComputeDevice<Buffer = B>,
    {
        let ships_changed = ship_count != self.ship_capacity;
        let planets_changed = planet_count != self.planet_capacity;
        if !ships_changed && !planets_changed {
            return Ok(false);
        }

        let mut requests = Vec::with_capacity(3);
        if ships_changed {
            requests.push((Binding::Ships, ship_count, BODY_RECORD_SIZE));
            requests.push((Binding::OutForces, ship_count, FORCE_RECORD_SIZE));
        }
        if planets_changed {
            requests.push((Binding::Planets, planet_count, BODY_RECORD_SIZE));
        }

        let fresh = allocate_all(device, &requests)?;
        self.forces_valid = false;
        for (&(binding, _, _), buffer) in requests.iter().zip(fresh) {
            if let Some(old) = std::mem::replace(self.slot_mut(binding), buffer) {
                device.release(old);
            }
        }

        if ships_changed {
            log::info!(
                "Ship buffers resized: {} -> {} ships",
                self.ship_capacity,
                ship_count
            );
            self.ship_capacity = ship_count;
            self.force_records.clear();
            self.force_records.resize(ship_count, GpuForce::new(Vec3::ZERO));
        }
        if planets_changed {
            log::info!(
                "Planet buffer resized: {} -> {} planets",
                self.planet_capacity,
                planet_count
            );
            self.planet_capacity = planet_count;
        }

        Ok(true)
    }

    /// Serialize both snapshots into 16-byte records and copy them to the device.
    ///
    /// Snapshot lengths must match the allocated capacities. An empty side is
    /// skipped.
    pub fn upload<D>(
        &mut self,
        device: &mut D,
        ships: &[BodyState],
        planets: &[BodyState],
    ) -> Result<(), EngineError>
    where
        D: ComputeDevice<Buffer = B>,
    {
        check_len(Binding::Ships, self.ship_capacity, ships.len())?;
        check_len(Binding::Planets, self.planet_capacity, planets.len())?;
        self.forces_valid = false;

        self.ship_records.clear();
        self.ship_records.extend(ships.iter().map(GpuBody::from));
        self.planet_records.clear();
        self.planet_records.extend(planets.iter().map(GpuBody::from));

        if !self.ship_records.is_empty() {
            let buffer = self.ships.as_ref().ok_or(EngineError::Unallocated(Binding::Ships))?;
            device.write(buffer, bytemuck::cast_slice(&self.ship_records))?;
        }
        if !self.planet_records.is_empty() {
            let buffer = self
                .planets
                .as_ref()
                .ok_or(EngineError::Unallocated(Binding::Planets))?;
            device.write(buffer, bytemuck::cast_slice(&self.planet_records))?;
        }

        Ok(())
    }

    /// Bind all three buffers for the next dispatch
    pub fn bind<D>(&self, device: &mut D) -> Result<(), EngineError>
    where
        D: ComputeDevice<Buffer = B>,
    {
        for binding in Binding::ALL {
            let buffer = self.buffer(binding).ok_or(EngineError::Unallocated(binding))?;
            device.bind_buffer(binding, buffer);
        }
        Ok(())
    }

    /// Read back one force per ship, in uploaded ship order.
    ///
    /// Empty unless a dispatch ran over the current upload, so a skipped
    /// dispatch never hands back the previous step's forces.
    pub fn download<D>(&mut self, device: &mut D) -> Result<Vec<Vec3>, EngineError>
    where
        D: ComputeDevice<Buffer = B>,
    {
        if !self.forces_valid || self.ship_capacity == 0 || self.planet_capacity == 0 {
            return Ok(Vec::new());
        }

        let buffer = self
            .forces
            .as_ref()
            .ok_or(EngineError::Unallocated(Binding::OutForces))?;
        device.read(buffer, bytemuck::cast_slice_mut(&mut self.force_records))?;

        Ok(self.force_records.iter().map(GpuForce::force).collect())
    }

    /// Free every device buffer. Safe to call with nothing allocated.
    pub fn release<D>(&mut self, device: &mut D)
    where
        D: ComputeDevice<Buffer = B>,
    {
        let mut released = 0;
        for binding in Binding::ALL {
            if let Some(buffer) = self.slot_mut(binding).take() {
                device.release(buffer);
                released += 1;
            }
        }
        if released > 0 {
            log::info!("Released {released} device buffers");
        }

        self.ship_capacity = 0;
        self.planet_capacity = 0;
        self.forces_valid = false;
        self.ship_records.clear();
        self.planet_records.clear();
        self.force_records.clear();
    }
}

fn check_len(binding: Binding, expected: usize, actual: usize) -> Result<(), EngineError> {
    if expected == actual {
        Ok(())
    } else {
        Err(EngineError::SnapshotMismatch {
            binding,
            expected,
            actual,
        })
    }
}

/// Allocate every request or nothing. Zero-length requests yield `None`.
fn allocate_all<D: ComputeDevice>(
    device: &mut D,
    requests: &[(Binding, usize, usize)],
) -> Result<Vec<Option<D::Buffer>>, EngineError> {
    let mut fresh = Vec::with_capacity(requests.len());
    for &(binding, len, stride) in requests {
        if len == 0 {
            fresh.push(None);
            continue;
        }
        match device.allocate(binding, len, stride) {
            Ok(buffer) => fresh.push(Some(buffer)),
            Err(err) => {
                log::warn!("Allocating {binding} buffer for {len} records failed: {err}");
                for buffer in fresh.into_iter().flatten() {
                    device.release(buffer);
                }
                return Err(err);
            }
        }
    }
    Ok(fresh)
}
