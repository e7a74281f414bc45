//! Boundary to the parallel compute backend
//!
//! The force kernel sees three buffer bindings (ships, planets, output forces),
//! two integer scalars (ship count, planet count) and a 3D dispatch of which
//! only the first dimension is used.

use std::fmt;

use crate::error::EngineError;
use crate::params::KernelParams;

/// Buffer slots of the force kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Ships,
    Planets,
    OutForces,
}

impl Binding {
    pub const ALL: [Binding; 3] = [Binding::Ships, Binding::Planets, Binding::OutForces];

    /// Name of the binding in the kernel
    pub fn name(self) -> &'static str {
        match self {
            Binding::Ships => "Ships",
            Binding::Planets => "Planets",
            Binding::OutForces => "OutForces",
        }
    }

    /// `@binding` index in `forces.wgsl`
    pub fn index(self) -> u32 {
        match self {
            Binding::Ships => 0,
            Binding::Planets => 1,
            Binding::OutForces => 2,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer scalars of the force kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scalar {
    ShipCount,
    PlanetCount,
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::ShipCount => "ShipCount",
            Scalar::PlanetCount => "PlanetCount",
        }
    }
}

/// A device that can hold the kernel's buffers and run it.
///
/// Calls are issued in strict sequence by one controller. `dispatch` only has
/// to record the work; `read` is the synchronization point and must observe
/// every dispatch issued before it.
pub trait ComputeDevice {
    /// Device-resident buffer handle, owned by the transfer buffers
    type Buffer;

    fn params(&self) -> &KernelParams;

    /// Allocate room for `len` records of `stride` bytes for `binding`
    fn allocate(&mut self, binding: Binding, len: usize, stride: usize) -> Result<Self::Buffer, EngineError>;

    /// Free a buffer. Consumes the handle so it cannot be released twice.
    fn release(&mut self, buffer: Self::Buffer);

    /// Copy host bytes into the start of `buffer`
    fn write(&mut self, buffer: &Self::Buffer, bytes: &[u8]) -> Result<(), EngineError>;

    fn bind_buffer(&mut self, binding: Binding, buffer: &Self::Buffer);

    fn bind_scalar(&mut self, scalar: Scalar, value: u32);

    /// Launch `groups[0]` work groups; the other dimensions must be 1
    fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), EngineError>;

    /// Wait for outstanding work, then copy the start of `buffer` into `out`
    fn read(&mut self, buffer: &Self::Buffer, out: &mut [u8]) -> Result<(), EngineError>;
}
