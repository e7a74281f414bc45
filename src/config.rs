//! Scene configuration

/// What to spawn and how long to run
#[derive(Clone, Debug, PartialEq)]
pub struct SceneConfig {
    pub planet_count: usize,
    pub ship_count: usize,
    /// Spawn range (min, max) along x
    pub limit_x: (f32, f32),
    /// Spawn range (min, max) along y
    pub limit_y: (f32, f32),
    /// Planet mass range (min, max)
    pub planet_mass: (f32, f32),
    pub ship_mass: f32,
    /// Seconds per step
    pub dt: f32,
    pub steps: usize,
    /// Fixed seed for a reproducible scene; `None` draws from the thread RNG
    pub seed: Option<u64>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            planet_count: 50,
            ship_count: 50,
            limit_x: (-10.0, 10.0),
            limit_y: (-10.0, 10.0),
            planet_mass: (0.1, 0.5),
            ship_mass: 1.0,
            dt: 1.0 / 60.0,
            steps: 600,
            seed: None,
        }
    }
}
