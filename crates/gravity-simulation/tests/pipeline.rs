//! Full step pipeline against the host backend

use approx::assert_abs_diff_eq;
use glam::Vec3;
use gravity_physics::{compute_forces, BodyRegistry, BodyState, GpuBody, Snapshot, MIN_DISTANCE_SQ};
use gravity_simulation::{
    Binding, CapacityError, EngineError, ForceEngine, HostDevice, KernelParams, StepOutcome,
};

fn engine() -> ForceEngine<HostDevice> {
    ForceEngine::new(HostDevice::new(KernelParams::default()).unwrap())
}

fn body(x: f32, y: f32, z: f32, mass: f32) -> BodyState {
    BodyState::new(Vec3::new(x, y, z), mass)
}

/// Ships spread on a line, away from the planets
fn ships(count: usize) -> Vec<BodyState> {
    (0..count).map(|i| body(i as f32 * 0.5 - 10.0, 3.0, 0.0, 1.0)).collect()
}

fn planets() -> Vec<BodyState> {
    vec![body(1.0, -2.0, 0.0, 0.3), body(-4.0, 1.0, 0.5, 0.1)]
}

#[test]
fn forces_align_with_ship_order() {
    let mut engine = engine();
    let snapshot = Snapshot::new(
        vec![body(3.0, 0.0, 0.0, 1.0), body(0.0, -2.0, 0.0, 1.0), body(0.0, 0.0, 4.0, 1.0)],
        vec![body(0.0, 0.0, 0.0, 2.0)],
    );

    let forces = engine.step(&snapshot).unwrap();

    assert_eq!(forces.len(), 3);
    assert_abs_diff_eq!(forces[0].x, -2.0 / 9.0, epsilon = 1e-6);
    assert_abs_diff_eq!(forces[1].y, 2.0 / 4.0, epsilon = 1e-6);
    assert_abs_diff_eq!(forces[2].z, -2.0 / 16.0, epsilon = 1e-6);
}

#[test]
fn single_planet_pull_is_mass_over_distance_squared() {
    let mut engine = engine();
    let snapshot = Snapshot::new(vec![body(0.0, 0.0, 0.0, 7.0)], vec![body(0.0, 3.0, 0.0, 0.45)]);

    let force = engine.step(&snapshot).unwrap()[0];

    assert_abs_diff_eq!(force.length(), 0.45 / 9.0, epsilon = 1e-6);
    assert_abs_diff_eq!(force.normalize().y, 1.0, epsilon = 1e-6);
}

#[test]
fn symmetric_planets_cancel_on_ship_at_origin() {
    let mut engine = engine();
    let snapshot = Snapshot::new(
        vec![body(0.0, 0.0, 0.0, 1.0)],
        vec![body(5.0, 0.0, 0.0, 1.0), body(-5.0, 0.0, 0.0, 1.0)],
    );

    let force = engine.step(&snapshot).unwrap()[0];

    assert_abs_diff_eq!(force.x, 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(force.y, 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(force.z, 0.0, epsilon = 1e-4);
}

#[test]
fn forces_superpose() {
    let mut engine = engine();
    let ship = body(1.0, 1.0, 0.0, 1.0);
    let a = body(4.0, 1.0, 0.0, 0.2);
    let b = body(1.0, -3.0, 2.0, 0.4);

    let both = engine.step(&Snapshot::new(vec![ship], vec![a, b])).unwrap()[0];
    let only_a = engine.step(&Snapshot::new(vec![ship], vec![a])).unwrap()[0];
    let only_b = engine.step(&Snapshot::new(vec![ship], vec![b])).unwrap()[0];

    let sum = only_a + only_b;
    assert_abs_diff_eq!(both.x, sum.x, epsilon = 1e-6);
    assert_abs_diff_eq!(both.y, sum.y, epsilon = 1e-6);
    assert_abs_diff_eq!(both.z, sum.z, epsilon = 1e-6);
}

#[test]
fn matches_cpu_reference() {
    let mut engine = engine();
    let snapshot = Snapshot::new(ships(40), planets());

    let forces = engine.step(&snapshot).unwrap();
    let expected = compute_forces(&snapshot.ships, &snapshot.planets, MIN_DISTANCE_SQ);

    assert_eq!(forces, expected);
}

#[test]
fn empty_sides_skip_the_device() {
    let mut engine = engine();

    assert!(engine.step(&Snapshot::new(Vec::new(), planets())).unwrap().is_empty());
    assert!(engine.step(&Snapshot::new(ships(3), Vec::new())).unwrap().is_empty());
    assert!(engine.step(&Snapshot::default()).unwrap().is_empty());

    let stats = engine.device().stats();
    assert_eq!(stats.allocations, 0);
    assert_eq!(stats.dispatches, 0);
    assert_eq!(stats.downloads, 0);
    assert_eq!(engine.steps(), 0);
}

#[test]
fn degenerate_step_after_full_step_keeps_buffers() {
    let mut engine = engine();
    engine.step(&Snapshot::new(ships(4), planets())).unwrap();
    let before = engine.device().stats();

    assert!(engine.step(&Snapshot::new(ships(4), Vec::new())).unwrap().is_empty());
    assert!(engine.step(&Snapshot::new(Vec::new(), planets())).unwrap().is_empty());

    let after = engine.device().stats();
    assert_eq!(after.allocations, before.allocations);
    assert_eq!(after.releases, before.releases);
    assert_eq!(after.dispatches, before.dispatches);
    assert_eq!(engine.buffers().ship_capacity(), 4);
    assert_eq!(engine.buffers().planet_capacity(), 2);
}

#[test]
fn skipped_dispatch_never_returns_previous_forces() {
    let mut engine = engine();
    let ship = vec![body(3.0, 0.0, 0.0, 1.0)];
    let first = engine
        .step(&Snapshot::new(ship.clone(), vec![body(0.0, 0.0, 0.0, 2.0)]))
        .unwrap();
    assert_abs_diff_eq!(first[0].x, -2.0 / 9.0, epsilon = 1e-6);

    // Planets removed: the force buffer still holds the last step's output
    engine.ensure_capacity(1, 0).unwrap();
    engine.upload(&ship, &[]).unwrap();
    engine.dispatch(1, 0).unwrap();
    assert!(engine.download().unwrap().is_empty());
    assert!(!engine.buffers().forces_valid());
    assert_eq!(engine.device().stats().dispatches, 1);
}

#[test]
fn download_without_dispatch_is_empty() {
    let mut engine = engine();
    let snapshot = Snapshot::new(ships(2), planets());
    engine.step(&snapshot).unwrap();

    // Same capacities, fresh upload, no dispatch
    engine.upload(&snapshot.ships, &snapshot.planets).unwrap();
    assert!(engine.download().unwrap().is_empty());

    engine.dispatch(2, 2).unwrap();
    assert_eq!(engine.download().unwrap().len(), 2);

    // A no-op dispatch also invalidates the buffer
    engine.dispatch(2, 0).unwrap();
    assert!(engine.download().unwrap().is_empty());
}

#[test]
fn registry_without_planets_leaves_forces_zero() {
    let mut engine = engine();
    let mut registry = BodyRegistry::new();
    registry.register_ship(Vec3::ZERO, 1.0, Vec3::X);
    registry.register_ship(Vec3::ONE, 1.0, Vec3::Y);

    assert_eq!(engine.step_registry(&mut registry).unwrap(), StepOutcome::Skipped);
    assert!(registry
        .ships()
        .iter()
        .all(|ship| ship.accumulated_force == Vec3::ZERO));
}

#[test]
fn registry_step_delivers_forces() {
    let mut engine = engine();
    let mut registry = BodyRegistry::new();
    registry.register_planet(Vec3::new(0.0, 2.0, 0.0), 0.4);
    registry.register_ship(Vec3::ZERO, 1.0, Vec3::X);
    registry.register_ship(Vec3::new(0.0, 4.0, 0.0), 1.0, Vec3::X);

    let outcome = engine.step_registry(&mut registry).unwrap();

    assert_eq!(outcome, StepOutcome::Delivered { ships: 2, groups: 1 });
    assert_abs_diff_eq!(registry.ships()[0].accumulated_force.y, 0.1, epsilon = 1e-6);
    assert_abs_diff_eq!(registry.ships()[1].accumulated_force.y, -0.1, epsilon = 1e-6);
}

#[test]
fn stable_counts_reuse_buffers() {
    let mut engine = engine();
    let snapshot = Snapshot::new(ships(10), planets());

    for _ in 0..10 {
        engine.step(&snapshot).unwrap();
    }

    let stats = engine.device().stats();
    assert_eq!(stats.allocations, 3);
    assert_eq!(stats.releases, 0);
    assert_eq!(stats.dispatches, 10);
    assert_eq!(engine.steps(), 10);
}

#[test]
fn ship_count_change_keeps_planet_buffer() {
    let mut engine = engine();
    let planets = planets();
    engine.step(&Snapshot::new(ships(4), planets.clone())).unwrap();

    let forces = engine.step(&Snapshot::new(ships(9), planets.clone())).unwrap();
    assert_eq!(forces.len(), 9);

    // Ships and forces were replaced, planets were not
    let stats = engine.device().stats();
    assert_eq!(stats.allocations, 5);
    assert_eq!(stats.releases, 2);
    assert_eq!(engine.buffers().ship_capacity(), 9);
    assert_eq!(engine.buffers().planet_capacity(), 2);

    let records: Vec<GpuBody> = planets.iter().map(GpuBody::from).collect();
    let planet_buffer = engine.buffers().buffer(Binding::Planets).unwrap();
    assert_eq!(
        engine.device().contents(planet_buffer),
        bytemuck::cast_slice::<GpuBody, u8>(&records)
    );
}

#[test]
fn partial_last_group_is_guarded() {
    let mut engine = engine();
    let snapshot = Snapshot::new(ships(65), planets());

    let forces = engine.step(&snapshot).unwrap();

    assert_eq!(forces.len(), 65);
    assert!(forces.iter().all(|force| *force != Vec3::ZERO));

    let stats = engine.device().stats();
    assert_eq!(stats.invocations, 128);
    assert_eq!(stats.guarded_invocations, 63);
}

#[test]
fn group_size_is_configurable() {
    let params = KernelParams {
        group_size: 32,
        ..KernelParams::default()
    };
    let mut engine = ForceEngine::new(HostDevice::new(params).unwrap());
    let snapshot = Snapshot::new(ships(65), planets());

    let forces = engine.step(&snapshot).unwrap();

    assert_eq!(forces, compute_forces(&snapshot.ships, &snapshot.planets, params.min_distance_sq));
    assert_eq!(engine.group_count(65).unwrap(), 3);
    assert_eq!(engine.device().stats().guarded_invocations, 31);
}

#[test]
fn invalid_params_are_rejected() {
    let zero_group = KernelParams {
        group_size: 0,
        ..KernelParams::default()
    };
    let no_floor = KernelParams {
        min_distance_sq: 0.0,
        ..KernelParams::default()
    };

    assert!(matches!(HostDevice::new(zero_group), Err(EngineError::InvalidParams(_))));
    assert!(matches!(HostDevice::new(no_floor), Err(EngineError::InvalidParams(_))));
}

#[test]
fn coincident_bodies_produce_finite_forces() {
    let mut engine = engine();
    let snapshot = Snapshot::new(
        vec![body(1.0, 1.0, 1.0, 1.0), body(2.0, 0.0, 0.0, 1.0)],
        vec![body(1.0, 1.0, 1.0, 0.5), body(2.0, 0.0, 0.0, 0.5)],
    );

    let forces = engine.step(&snapshot).unwrap();

    assert!(forces.iter().all(|force| force.is_finite()));
}

#[test]
fn failed_growth_keeps_previous_buffers() {
    let mut engine = engine();
    let planets = planets();
    let small = Snapshot::new(ships(2), planets.clone());
    let before = engine.step(&small).unwrap();

    // 2 ships + 2 forces + 2 planets at 16 bytes each
    engine.device_mut().set_memory_limit(Some(96));
    let err = engine.step(&Snapshot::new(ships(50), planets)).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Capacity(CapacityError::OutOfMemory { .. })
    ));

    assert_eq!(engine.buffers().ship_capacity(), 2);
    assert_eq!(engine.device().stats().live_buffers, 3);
    assert_eq!(engine.step(&small).unwrap(), before);
}

#[test]
fn release_then_step_allocates_again() {
    let mut engine = engine();
    let snapshot = Snapshot::new(ships(3), planets());
    let first = engine.step(&snapshot).unwrap();

    engine.release();
    assert_eq!(engine.device().stats().live_buffers, 0);

    assert_eq!(engine.step(&snapshot).unwrap(), first);
    assert_eq!(engine.device().stats().allocations, 6);
}

#[test]
#[ignore = "needs a GPU adapter"]
fn wgpu_backend_matches_cpu_reference() {
    let device = pollster::block_on(gravity_simulation::WgpuDevice::new(KernelParams::default()))
        .expect("no GPU adapter");
    let mut engine = ForceEngine::new(device);
    let snapshot = Snapshot::new(ships(100), planets());

    let forces = engine.step(&snapshot).unwrap();
    let expected = compute_forces(&snapshot.ships, &snapshot.planets, MIN_DISTANCE_SQ);

    assert_eq!(forces.len(), expected.len());
    for (gpu, cpu) in forces.iter().zip(&expected) {
        assert_abs_diff_eq!(gpu.x, cpu.x, epsilon = 1e-5);
        assert_abs_diff_eq!(gpu.y, cpu.y, epsilon = 1e-5);
        assert_abs_diff_eq!(gpu.z, cpu.z, epsilon = 1e-5);
    }
}
