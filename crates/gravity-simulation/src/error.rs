//! Errors of the per-step pipeline
//!
//! Nothing here is retried: a local compute device has no transient failures.
//! The caller of the step decides whether to halt the simulation.

use gravity_physics::ForceCountMismatch;

use crate::device::Binding;

/// Device buffer allocation failed. Fatal to the step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("device out of memory allocating {bytes} bytes for {binding}")]
    OutOfMemory { binding: Binding, bytes: u64 },

    #[error("{binding} buffer of {bytes} bytes exceeds the device limit of {limit} bytes")]
    InvalidSize { binding: Binding, bytes: u64, limit: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("{0} buffer used before it was allocated")]
    Unallocated(Binding),

    #[error("snapshot holds {actual} {binding} records but the buffer holds {expected}")]
    SnapshotMismatch {
        binding: Binding,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    ForceCountMismatch(#[from] ForceCountMismatch),

    #[error("invalid kernel parameters: {0}")]
    InvalidParams(String),

    #[error("dispatch rejected: {0}")]
    Dispatch(String),

    #[error("no suitable GPU adapter found: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("waiting for the device failed: {0}")]
    Poll(#[from] wgpu::PollError),
}
