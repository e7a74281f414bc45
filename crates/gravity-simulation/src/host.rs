//! CPU backend
//!
//! Runs the force kernel on the host, work group by work group and invocation
//! by invocation, with the same out-of-range guard as `forces.wgsl`. Every
//! device call is counted in [`DeviceStats`], which makes this the backend the
//! pipeline tests run against. An optional memory limit injects allocation
//! failures.

use gravity_physics::{ship_force, GpuBody, GpuForce, BODY_RECORD_SIZE, FORCE_RECORD_SIZE};

use crate::device::{Binding, ComputeDevice, Scalar};
use crate::error::{CapacityError, EngineError};
use crate::params::KernelParams;

/// Largest byte size a host buffer can hold
const MAX_ALLOCATION: u64 = isize::MAX as u64;

/// Handle to a host-resident buffer
#[derive(Debug)]
pub struct HostBuffer {
    slot: usize,
}

/// Counters of everything the engine asked the device to do
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub allocations: u64,
    pub releases: u64,
    pub live_buffers: u64,
    pub live_bytes: u64,
    pub uploads: u64,
    pub dispatches: u64,
    pub downloads: u64,
    /// Kernel invocations launched, including guarded ones
    pub invocations: u64,
    /// Invocations past the ship count that returned without writing
    pub guarded_invocations: u64,
}

struct Allocation {
    binding: Binding,
    data: Vec<u8>,
}

pub struct HostDevice {
    params: KernelParams,
    memory: Vec<Option<Allocation>>,
    bound: [Option<usize>; 3],
    scalars: [u32; 2],
    memory_limit: Option<u64>,
    stats: DeviceStats,
}

impl HostDevice {
    pub fn new(params: KernelParams) -> Result<Self, EngineError> {
        params.validate()?;
        Ok(Self {
            params,
            memory: Vec::new(),
            bound: [None; 3],
            scalars: [0; 2],
            memory_limit: None,
            stats: DeviceStats::default(),
        })
    }

    /// Fail allocations that would push live memory past `bytes`
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn set_memory_limit(&mut self, bytes: Option<u64>) {
        self.memory_limit = bytes;
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// Raw contents of a buffer
    pub fn contents(&self, buffer: &HostBuffer) -> &[u8] {
        self.memory
            .get(buffer.slot)
            .and_then(Option::as_ref)
            .map(|allocation| allocation.data.as_slice())
            .unwrap_or(&[])
    }

    fn allocation(&self, binding: Binding) -> Result<&Allocation, EngineError> {
        self.bound[binding.index() as usize]
            .and_then(|slot| self.memory.get(slot))
            .and_then(Option::as_ref)
            .ok_or(EngineError::Unallocated(binding))
    }
}

impl ComputeDevice for HostDevice {
    type Buffer = HostBuffer;

    fn params(&self) -> &KernelParams {
        &self.params
    }

    fn allocate(&mut self, binding: Binding, len: usize, stride: usize) -> Result<HostBuffer, EngineError> {
        let bytes = (len as u64).saturating_mul(stride as u64);
        if bytes > MAX_ALLOCATION {
            return Err(CapacityError::InvalidSize {
                binding,
                bytes,
                limit: MAX_ALLOCATION,
            }
            .into());
        }

        if let Some(limit) = self.memory_limit {
            if self.stats.live_bytes + bytes > limit {
                return Err(CapacityError::OutOfMemory { binding, bytes }.into());
            }
        }

        let allocation = Allocation {
            binding,
            data: vec![0; bytes as usize],
        };
        let slot = match self.memory.iter().position(Option::is_none) {
            Some(slot) => {
                self.memory[slot] = Some(allocation);
                slot
            }
            None => {
                self.memory.push(Some(allocation));
                self.memory.len() - 1
            }
        };

        self.stats.allocations += 1;
        self.stats.live_buffers += 1;
        self.stats.live_bytes += bytes;
        Ok(HostBuffer { slot })
    }

    fn release(&mut self, buffer: HostBuffer) {
        if let Some(allocation) = self.memory.get_mut(buffer.slot).and_then(Option::take) {
            self.stats.releases += 1;
            self.stats.live_buffers -= 1;
            self.stats.live_bytes -= allocation.data.len() as u64;
        }
        for bound in &mut self.bound {
            if *bound == Some(buffer.slot) {
                *bound = None;
            }
        }
    }

    fn write(&mut self, buffer: &HostBuffer, bytes: &[u8]) -> Result<(), EngineError> {
        let allocation = self
            .memory
            .get_mut(buffer.slot)
            .and_then(Option::as_mut)
            .ok_or(EngineError::Dispatch("write to a released buffer".into()))?;

        if bytes.len() > allocation.data.len() {
            return Err(CapacityError::InvalidSize {
                binding: allocation.binding,
                bytes: bytes.len() as u64,
                limit: allocation.data.len() as u64,
            }
            .into());
        }

        allocation.data[..bytes.len()].copy_from_slice(bytes);
        self.stats.uploads += 1;
        Ok(())
    }

    fn bind_buffer(&mut self, binding: Binding, buffer: &HostBuffer) {
        self.bound[binding.index() as usize] = Some(buffer.slot);
    }

    fn bind_scalar(&mut self, scalar: Scalar, value: u32) {
        let index = match scalar {
            Scalar::ShipCount => 0,
            Scalar::PlanetCount => 1,
        };
        self.scalars[index] = value;
    }

    fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), EngineError> {
        if groups[1] != 1 || groups[2] != 1 {
            return Err(EngineError::Dispatch(format!(
                "only the first group dimension is used, got {groups:?}"
            )));
        }

        let [ship_count, planet_count] = self.scalars.map(|count| count as usize);
        let ships = decode_bodies(self.allocation(Binding::Ships)?, ship_count)?;
        let planets = decode_bodies(self.allocation(Binding::Planets)?, planet_count)?;

        let forces_len = self.allocation(Binding::OutForces)?.data.len() / FORCE_RECORD_SIZE;
        if ship_count > forces_len {
            return Err(EngineError::Dispatch(format!(
                "ShipCount {ship_count} exceeds the OutForces buffer ({forces_len} records)"
            )));
        }

        let group_size = self.params.group_size as usize;
        let min_distance_sq = self.params.min_distance_sq;
        let mut results = Vec::with_capacity(ship_count);

        for group in 0..groups[0] as usize {
            for local in 0..group_size {
                let id = group * group_size + local;
                self.stats.invocations += 1;
                if id >= ship_count {
                    self.stats.guarded_invocations += 1;
                    continue;
                }
                let force = ship_force(ships[id].position(), &planets, min_distance_sq);
                results.push((id, GpuForce::new(force)));
            }
        }

        let slot = self.bound[Binding::OutForces.index() as usize]
            .ok_or(EngineError::Unallocated(Binding::OutForces))?;
        let out = self
            .memory
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(EngineError::Unallocated(Binding::OutForces))?;
        for (id, force) in results {
            let offset = id * FORCE_RECORD_SIZE;
            out.data[offset..offset + FORCE_RECORD_SIZE].copy_from_slice(bytemuck::bytes_of(&force));
        }

        self.stats.dispatches += 1;
        Ok(())
    }

    fn read(&mut self, buffer: &HostBuffer, out: &mut [u8]) -> Result<(), EngineError> {
        let data = self
            .memory
            .get(buffer.slot)
            .and_then(Option::as_ref)
            .map(|allocation| &allocation.data)
            .ok_or(EngineError::Dispatch("read from a released buffer".into()))?;

        if out.len() > data.len() {
            return Err(EngineError::Dispatch(format!(
                "readback of {} bytes from a {} byte buffer",
                out.len(),
                data.len()
            )));
        }

        out.copy_from_slice(&data[..out.len()]);
        self.stats.downloads += 1;
        Ok(())
    }
}

fn decode_bodies(allocation: &Allocation, count: usize) -> Result<Vec<GpuBody>, EngineError> {
    let available = allocation.data.len() / BODY_RECORD_SIZE;
    if count > available {
        return Err(EngineError::Dispatch(format!(
            "count {count} exceeds the {} buffer ({available} records)",
            allocation.binding
        )));
    }

    Ok(allocation.data[..count * BODY_RECORD_SIZE]
        .chunks_exact(BODY_RECORD_SIZE)
        .map(bytemuck::pod_read_unaligned::<GpuBody>)
        .collect())
}
