//! Gravity Ships
//!
//! Headless run: every step the planets' pull on each ship is summed on the GPU
//! (or on the CPU when no adapter is available), then ships are integrated on
//! the host.

mod config;
mod scene;

use config::SceneConfig;
use glam::Vec3;
use gravity_physics::{BodyRegistry, EulerIntegrator, MotionIntegrator};
use gravity_simulation::{
    ComputeDevice, EngineError, ForceEngine, HostDevice, KernelParams, StepOutcome, WgpuDevice,
};
use std::time::Instant;

/// Steps between progress reports
const LOG_INTERVAL: usize = 60;

fn run<D: ComputeDevice>(
    mut engine: ForceEngine<D>,
    registry: &mut BodyRegistry,
    config: &SceneConfig,
) -> Result<(), EngineError> {
    let integrator = EulerIntegrator;
    let start = Instant::now();
    let mut skipped = 0;

    for step in 1..=config.steps {
        if engine.step_registry(registry)? == StepOutcome::Skipped {
            skipped += 1;
        }
        integrator.integrate_all(registry.ships_mut(), config.dt);

        if step % LOG_INTERVAL == 0 {
            let ships = registry.ships();
            let count = ships.len().max(1) as f32;
            let centroid = ships.iter().map(|s| s.position).sum::<Vec3>() / count;
            let mean_speed = ships.iter().map(|s| s.velocity.length()).sum::<f32>() / count;
            log::info!(
                "Step {step}/{}: centroid ({:.2}, {:.2}), mean speed {mean_speed:.3}",
                config.steps,
                centroid.x,
                centroid.y
            );
        }
    }

    engine.release();

    let elapsed = start.elapsed();
    log::info!(
        "✓ {} steps in {:.2?} ({} dispatched, {} skipped)",
        config.steps,
        elapsed,
        engine.steps(),
        skipped
    );
    Ok(())
}

fn main() -> Result<(), EngineError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting gravity ships simulation...");

    let config = SceneConfig::default();
    let params = KernelParams::default();
    let mut registry = scene::populate(&config);

    match pollster::block_on(WgpuDevice::new(params)) {
        Ok(device) => {
            log::info!("✓ GPU force engine initialized");
            run(ForceEngine::new(device), &mut registry, &config)
        }
        Err(err) => {
            log::warn!("GPU unavailable ({err}), falling back to the CPU backend");
            run(ForceEngine::new(HostDevice::new(params)?), &mut registry, &config)
        }
    }
}
