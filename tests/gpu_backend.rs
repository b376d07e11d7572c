//! wgpu backend smoke tests. Skipped when no adapter is available.

use std::f32::consts::{FRAC_PI_2, PI};

use physarum::prelude::*;

fn gpu_backend() -> Option<WgpuBackend> {
    match WgpuBackend::new() {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("skipping wgpu test: {}", e);
            None
        }
    }
}

#[test]
fn test_gpu_four_agent_scenario_matches_cpu() {
    let Some(backend) = gpu_backend() else {
        return;
    };

    let start = Vec2::splat(0.625);
    let params = SimulationParameters::default()
        .with_trail_weight(1.0)
        .with_move_speed(0.25)
        .with_turn_speed(0.0)
        .with_decay_rate(0.0)
        .with_diffuse_rate(0.0)
        .with_steering_noise(0.0);
    let config = SimulationConfig::new(4, 4, 4)
        .with_parameters(params)
        .with_initial_distribution(InitialDistribution::Point(start));
    let agents: Vec<Agent> = [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2]
        .iter()
        .map(|h| Agent::new(start, *h))
        .collect();

    let mut gpu = SimulationController::initialize(backend, config.clone()).unwrap();
    let mut cpu = SimulationController::cpu(config).unwrap();
    assert_eq!(gpu.read_field().unwrap().sum(), 0.0);

    gpu.set_agents(&agents).unwrap();
    cpu.set_agents(&agents).unwrap();
    gpu.step(0).unwrap();
    cpu.step(0).unwrap();

    let gpu_field = gpu.read_field().unwrap();
    let cpu_field = cpu.read_field().unwrap();
    assert_eq!(gpu_field.nonzero_cells(), cpu_field.nonzero_cells());
    assert_eq!(gpu_field.sum(), 4.0);
    assert!(gpu.backend().presentation_buffer().is_some());
}

#[test]
fn test_gpu_long_run_stays_valid() {
    let Some(backend) = gpu_backend() else {
        return;
    };

    let config = SimulationConfig::new(10_000, 128, 96)
        .with_initial_distribution(InitialDistribution::Uniform)
        .with_seed(3);
    let mut sim = SimulationController::initialize(backend, config).unwrap();
    for _ in 0..60 {
        sim.advance().unwrap();
    }

    let field = sim.read_field().unwrap();
    assert!(field.cells().iter().all(|v| v.is_finite() && *v >= 0.0));
    assert!(field.sum() > 0.0);
    for agent in sim.read_agents().unwrap().iter() {
        assert!(agent.is_finite());
        assert!((0.0..=1.0).contains(&agent.position.x));
        assert!((0.0..=1.0).contains(&agent.position.y));
    }

    sim.reset().unwrap();
    assert_eq!(sim.read_field().unwrap().sum(), 0.0);
}

#[test]
fn test_gpu_deposit_sums_do_not_wrap() {
    let Some(backend) = gpu_backend() else {
        return;
    };

    let params = SimulationParameters::default()
        .with_trail_weight(3.0)
        .with_move_speed(0.0)
        .with_turn_speed(0.0)
        .with_steering_noise(0.0)
        .with_decay_rate(0.0)
        .with_diffuse_rate(0.0);
    let config = SimulationConfig::new(200_000, 16, 16).with_parameters(params);
    let mut sim = SimulationController::initialize(backend, config).unwrap();
    sim.step(0).unwrap();
    let field = sim.read_field().unwrap();
    assert_eq!(field.nonzero_cells(), vec![(8, 8)]);
    assert_eq!(field.get(8, 8), 600_000.0);

    sim.reset().unwrap();
    sim.set_parameters(params.with_trail_weight(0.05));
    sim.step(0).unwrap();
    assert_eq!(sim.read_field().unwrap().get(8, 8), 200_000.0 * 0.05f32);
}
