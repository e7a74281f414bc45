//! Kernel parameters

use bytemuck::{Pod, Zeroable};
use gravity_physics::{MAX_WORKGROUP_SIZE, MIN_DISTANCE_SQ, WORKGROUP_SIZE};

use crate::error::EngineError;

/// Tuning for the force kernel, fixed when a device is created
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelParams {
    /// Ships per work group
    pub group_size: u32,
    /// Floor on the squared ship-planet distance
    pub min_distance_sq: f32,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            group_size: WORKGROUP_SIZE,
            min_distance_sq: MIN_DISTANCE_SQ,
        }
    }
}

impl KernelParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.group_size == 0 || self.group_size > MAX_WORKGROUP_SIZE {
            return Err(EngineError::InvalidParams(format!(
                "group size must be in 1..={MAX_WORKGROUP_SIZE}, got {}",
                self.group_size
            )));
        }
        if !self.min_distance_sq.is_finite() || self.min_distance_sq <= 0.0 {
            return Err(EngineError::InvalidParams(format!(
                "minimum squared distance must be finite and positive, got {}",
                self.min_distance_sq
            )));
        }
        Ok(())
    }

    /// Work groups needed to cover `ship_count` ships: `ceil(ship_count / group_size)`
    pub fn group_count(&self, ship_count: u32) -> u32 {
        ship_count.div_ceil(self.group_size)
    }
}

/// Per-dispatch uniform (matches WGSL `StepParams`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StepParams {
    pub ship_count: u32,
    pub planet_count: u32,
    pub min_distance_sq: f32,
    pub _padding: u32,
}

const _: () = assert!(std::mem::size_of::<StepParams>() == 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_group_size_is_64() {
        let params = KernelParams::default();
        assert_eq!(params.group_size, 64);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn group_count_rounds_up() {
        let params = KernelParams::default();
        assert_eq!(params.group_count(0), 0);
        assert_eq!(params.group_count(1), 1);
        assert_eq!(params.group_count(64), 1);
        assert_eq!(params.group_count(65), 2);
        assert_eq!(params.group_count(200), 4);
    }

    #[test]
    fn rejects_bad_params() {
        let zero_group = KernelParams { group_size: 0, ..Default::default() };
        let huge_group = KernelParams { group_size: 1024, ..Default::default() };
        let no_floor = KernelParams { min_distance_sq: 0.0, ..Default::default() };
        let nan_floor = KernelParams { min_distance_sq: f32::NAN, ..Default::default() };

        for params in [zero_group, huge_group, no_floor, nan_floor] {
            assert!(matches!(params.validate(), Err(EngineError::InvalidParams(_))));
        }
    }
}
