//! # Gravity Physics
//!
//! Bodies, the inverse-square force law and the ship motion contract for the
//! planets-and-ships gravity simulation. Everything here runs on the CPU; the
//! GPU side lives in `gravity-simulation` and mirrors [`forces::ship_force`].

pub mod body;
pub mod constants;
pub mod forces;
pub mod integrator;
pub mod registry;

pub use body::*;
pub use constants::*;
pub use forces::*;
pub use integrator::*;
pub use registry::*;
