//! # Gravity Simulation Engine
//!
//! Per-step N-body force summation of planets on ships, offloaded to a compute
//! device: snapshot → upload → dispatch → download → forces delivered to ships.

pub mod buffers;
pub mod device;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod host;
pub mod params;

pub use buffers::*;
pub use device::*;
pub use engine::*;
pub use error::*;
pub use gpu::*;
pub use host::*;
pub use params::*;
