//! Constants shared by the CPU reference and the compute kernel
//!
//! Units are the simulation's own: force is "planet mass / squared distance"
//! with an implicit gravitational constant of 1.0.

/// Ships handled by one work group in the force kernel
pub const WORKGROUP_SIZE: u32 = 64;

/// Upper bound for the work group size (wgpu's default
/// `max_compute_invocations_per_workgroup`)
pub const MAX_WORKGROUP_SIZE: u32 = 256;

/// Floor applied to the squared ship-planet distance.
///
/// A ship sitting exactly on a planet would otherwise divide by zero.
pub const MIN_DISTANCE_SQ: f32 = 1.0e-6;

/// Size of one ship or planet record on the device: `vec3<f32>` position + `f32` mass
pub const BODY_RECORD_SIZE: usize = 16;

/// Size of one force record on the device: `vec3<f32>` padded to 16 bytes
pub const FORCE_RECORD_SIZE: usize = 16;
