//! Simulation controller and configuration.
//!
//! [`SimulationController`] owns the population size, field dimensions and
//! live parameters, and drives a [`ComputeBackend`] through the fixed
//! per-frame order:
//!
//! ```text
//! SenseAndMove -> barrier -> MergeDeposits -> barrier -> DiffuseDecay -> barrier
//! ```
//!
//! # Example
//!
//! ```ignore
//! use physarum::prelude::*;
//!
//! let config = SimulationConfig::new(50_000, 700, 700).with_seed(7);
//! let mut sim = SimulationController::cpu(config)?;
//! for _ in 0..600 {
//!     sim.advance()?;
//! }
//! let field = sim.read_field()?;
//! ```

use crate::agent::{Agent, AgentPopulation, InitialDistribution};
use crate::backend::{ComputeBackend, CpuBackend, Stage};
use crate::error::SimulationError;
use crate::field::{FieldLayout, TrailField, MAX_CELL_DEPOSIT};
use crate::params::SimulationParameters;
use crate::present::PresentationAdapter;
use crate::uniforms::StepUniforms;

/// Everything needed to (re)create a simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Number of agents, fixed for the run.
    pub population: usize,
    pub width: u32,
    pub height: u32,
    pub parameters: SimulationParameters,
    /// Base seed for spawning and per-agent randomness.
    pub seed: u64,
    pub initial_distribution: InitialDistribution,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population: 50_000,
            width: 700,
            height: 700,
            parameters: SimulationParameters::default(),
            seed: 0,
            initial_distribution: InitialDistribution::Center,
        }
    }
}

impl SimulationConfig {
    pub fn new(population: usize, width: u32, height: u32) -> Self {
        Self {
            population,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_parameters(mut self, parameters: SimulationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_initial_distribution(mut self, distribution: InitialDistribution) -> Self {
        self.initial_distribution = distribution;
        self
    }

    pub fn layout(&self) -> FieldLayout {
        FieldLayout::new(self.width, self.height)
    }
}

/// Seed for one generation of agents. Generation 0 uses the base seed.
fn generation_seed(seed: u64, generation: u64) -> u64 {
    seed.wrapping_add(generation.wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

/// Fold a 64-bit seed into the 32-bit seed the kernels hash with.
fn kernel_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

/// Drives the per-frame pipeline on a backend.
pub struct SimulationController<B: ComputeBackend> {
    backend: B,
    layout: FieldLayout,
    agent_count: u32,
    parameters: SimulationParameters,
    distribution: InitialDistribution,
    seed: u64,
    generation: u64,
    frame: u32,
}

impl SimulationController<CpuBackend> {
    /// Initialize on the host [`CpuBackend`].
    pub fn cpu(config: SimulationConfig) -> Result<Self, SimulationError> {
        Self::initialize(CpuBackend::new(), config)
    }
}

impl<B: ComputeBackend> SimulationController<B> {
    /// Allocate buffers, spawn the population and zero the field.
    ///
    /// Allocation is all-or-nothing: on error the backend is dropped and
    /// nothing is retained.
    pub fn initialize(mut backend: B, config: SimulationConfig) -> Result<Self, SimulationError> {
        let layout = config.layout();
        layout.total_cells()?;
        let agent_count = u32::try_from(config.population).map_err(|_| {
            SimulationError::Allocation(format!(
                "population of {} exceeds the 32-bit agent index",
                config.population
            ))
        })?;

        let population =
            AgentPopulation::spawn(config.population, config.initial_distribution, config.seed)?;
        backend.allocate(layout, config.population)?;
        backend.upload_agents(population.as_slice())?;
        backend.clear_field()?;

        let out_of_range = config.parameters.out_of_range();
        if !out_of_range.is_empty() {
            log::warn!("initial parameters outside UI ranges: {}", out_of_range.join(", "));
        }
        warn_on_deposit_overflow(config.population, &config.parameters);

        log::info!(
            "initialized {} agents on a {}x{} field ({} backend)",
            agent_count,
            layout.width,
            layout.height,
            backend.name()
        );

        Ok(Self {
            backend,
            layout,
            agent_count,
            parameters: config.parameters,
            distribution: config.initial_distribution,
            seed: config.seed,
            generation: 0,
            frame: 0,
        })
    }

    /// Run one frame: each stage once, in order, with a barrier after each.
    ///
    /// Parameters are snapshotted here; edits made during the step apply
    /// from the next one.
    pub fn step(&mut self, frame: u32) -> Result<(), SimulationError> {
        let uniforms = StepUniforms::new(
            &self.parameters,
            self.layout,
            self.agent_count,
            frame,
            kernel_seed(generation_seed(self.seed, self.generation)),
        );

        for stage in Stage::ALL {
            let workgroups = stage.workgroups(self.layout, self.agent_count);
            self.backend.dispatch(stage, workgroups, &uniforms)?;
            self.backend.memory_barrier()?;
        }

        log::debug!("frame {} stepped", frame);
        Ok(())
    }

    /// [`step`](Self::step) with the controller's own frame counter.
    pub fn advance(&mut self) -> Result<(), SimulationError> {
        self.step(self.frame)?;
        self.frame = self.frame.wrapping_add(1);
        Ok(())
    }

    /// Spawn a new generation of agents and zero the field.
    ///
    /// Parameters are kept. The frame counter restarts at 0.
    pub fn reset(&mut self) -> Result<(), SimulationError> {
        let generation = self.generation.wrapping_add(1);
        let population = AgentPopulation::spawn(
            self.agent_count as usize,
            self.distribution,
            generation_seed(self.seed, generation),
        )?;
        self.backend.upload_agents(population.as_slice())?;
        self.backend.clear_field()?;
        self.generation = generation;
        self.frame = 0;
        log::info!("reset to generation {}", generation);
        Ok(())
    }

    /// Replace the live parameters. Applies from the next step.
    pub fn set_parameters(&mut self, parameters: SimulationParameters) {
        let out_of_range = parameters.out_of_range();
        if !out_of_range.is_empty() {
            log::warn!("applying parameters outside UI ranges: {}", out_of_range.join(", "));
        }
        warn_on_deposit_overflow(self.agent_count as usize, &parameters);
        self.parameters = parameters;
    }

    pub fn parameters(&self) -> SimulationParameters {
        self.parameters
    }

    /// Replace every agent. The count must match the population size.
    pub fn set_agents(&mut self, agents: &[Agent]) -> Result<(), SimulationError> {
        if agents.len() != self.agent_count as usize {
            return Err(SimulationError::PopulationMismatch {
                expected: self.agent_count as usize,
                actual: agents.len(),
            });
        }
        self.backend.upload_agents(agents)
    }

    pub fn read_agents(&mut self) -> Result<AgentPopulation, SimulationError> {
        self.backend.read_agents()
    }

    pub fn read_field(&mut self) -> Result<TrailField, SimulationError> {
        self.backend.read_field()
    }

    /// Hand the current field to a presentation adapter.
    pub fn present<P: PresentationAdapter + ?Sized>(
        &mut self,
        adapter: &mut P,
    ) -> Result<(), SimulationError> {
        let field = self.backend.read_field()?;
        adapter.present(&field, self.frame)
    }

    /// Frames advanced since initialize or the last reset.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    pub fn population_size(&self) -> usize {
        self.agent_count as usize
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Whether every agent landing on one cell could wrap that cell's
/// fixed-point sum within a single frame.
pub(crate) fn deposit_may_overflow(population: usize, parameters: &SimulationParameters) -> bool {
    population as f64 * (parameters.trail_weight as f64).abs() > MAX_CELL_DEPOSIT
}

fn warn_on_deposit_overflow(population: usize, parameters: &SimulationParameters) {
    if deposit_may_overflow(population, parameters) {
        log::warn!(
            "{} agents x trail_weight {} can exceed the per-cell deposit range of {}",
            population,
            parameters.trail_weight,
            MAX_CELL_DEPOSIT
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    // ========== Config Tests ==========

    #[test]
    fn test_config_defaults_match_classic_run() {
        let config = SimulationConfig::default();
        assert_eq!(config.population, 50_000);
        assert_eq!((config.width, config.height), (700, 700));
        assert_eq!(config.initial_distribution, InitialDistribution::Center);
    }

    #[test]
    fn test_config_builder() {
        let params = SimulationParameters::default().with_trail_weight(1.0);
        let config = SimulationConfig::new(10, 32, 16)
            .with_parameters(params)
            .with_seed(9)
            .with_initial_distribution(InitialDistribution::Uniform);
        assert_eq!(config.population, 10);
        assert_eq!(config.layout(), FieldLayout::new(32, 16));
        assert_eq!(config.parameters, params);
        assert_eq!(config.seed, 9);
        assert_eq!(config.initial_distribution, InitialDistribution::Uniform);
    }

    #[test]
    fn test_generation_seeds_differ() {
        assert_eq!(generation_seed(5, 0), 5);
        assert_ne!(generation_seed(5, 1), generation_seed(5, 2));
        assert_ne!(kernel_seed(generation_seed(5, 1)), kernel_seed(5));
    }

    // ========== Lifecycle Tests ==========

    #[test]
    fn test_initialize_zeroes_field_and_places_agents() {
        let mut sim = SimulationController::cpu(SimulationConfig::new(64, 16, 16)).unwrap();
        assert_eq!(sim.read_field().unwrap().sum(), 0.0);
        let agents = sim.read_agents().unwrap();
        assert_eq!(agents.len(), 64);
        assert_eq!(sim.population_size(), 64);
        assert!(agents.iter().all(|a| a.position == Vec2::splat(0.5)));
        assert_eq!(sim.frame(), 0);
    }

    #[test]
    fn test_initialize_rejects_zero_field() {
        let result = SimulationController::cpu(SimulationConfig::new(4, 0, 4));
        assert!(matches!(result, Err(SimulationError::Allocation(_))));
    }

    #[test]
    fn test_advance_counts_frames() {
        let mut sim = SimulationController::cpu(SimulationConfig::new(8, 8, 8)).unwrap();
        sim.advance().unwrap();
        sim.advance().unwrap();
        assert_eq!(sim.frame(), 2);
        assert!(sim.read_field().unwrap().sum() > 0.0);
    }

    #[test]
    fn test_reset_keeps_parameters_and_clears_field() {
        let params = SimulationParameters::default().with_trail_weight(2.0);
        let config = SimulationConfig::new(32, 16, 16).with_parameters(params);
        let mut sim = SimulationController::cpu(config).unwrap();
        let before = sim.read_agents().unwrap();
        for _ in 0..5 {
            sim.advance().unwrap();
        }

        sim.reset().unwrap();
        assert_eq!(sim.parameters(), params);
        assert_eq!(sim.read_field().unwrap().sum(), 0.0);
        assert_eq!(sim.frame(), 0);
        assert_eq!(sim.generation(), 1);

        let after = sim.read_agents().unwrap();
        assert!(after.iter().all(|a| a.position == Vec2::splat(0.5)));
        // New generation, new headings.
        assert_ne!(before, after);
    }

    #[test]
    fn test_set_parameters_applies_next_step() {
        let mut sim = SimulationController::cpu(SimulationConfig::new(1, 4, 4)).unwrap();
        sim.set_parameters(
            SimulationParameters::default()
                .with_trail_weight(0.0)
                .with_move_speed(0.0),
        );
        sim.advance().unwrap();
        assert_eq!(sim.read_field().unwrap().sum(), 0.0);
        assert_eq!(sim.read_agents().unwrap().as_slice()[0].position, Vec2::splat(0.5));
    }

    #[test]
    fn test_deposit_overflow_bound() {
        let params = SimulationParameters::default().with_trail_weight(3.0);
        assert!(!deposit_may_overflow(200_000, &params));
        assert!(!deposit_may_overflow(700_000_000, &params));
        assert!(deposit_may_overflow(800_000_000, &params));
        assert!(deposit_may_overflow(800_000_000, &params.with_trail_weight(-3.0)));
        assert!(!deposit_may_overflow(usize::MAX, &params.with_trail_weight(0.0)));
    }

    #[test]
    fn test_set_agents_rejects_wrong_count() {
        let mut sim = SimulationController::cpu(SimulationConfig::new(3, 4, 4)).unwrap();
        let err = sim
            .set_agents(&[Agent::new(Vec2::ZERO, 0.0); 2])
            .unwrap_err();
        assert!(matches!(
            err,
            SimulationError::PopulationMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_present_hands_field_to_adapter() {
        struct Capture(Vec<(u32, f32)>);
        impl PresentationAdapter for Capture {
            fn present(&mut self, field: &TrailField, frame: u32) -> Result<(), SimulationError> {
                self.0.push((frame, field.sum()));
                Ok(())
            }
        }

        let mut sim = SimulationController::cpu(SimulationConfig::new(4, 8, 8)).unwrap();
        let mut capture = Capture(Vec::new());
        sim.advance().unwrap();
        sim.present(&mut capture).unwrap();
        assert_eq!(capture.0.len(), 1);
        assert_eq!(capture.0[0].0, 1);
        assert!(capture.0[0].1 > 0.0);
    }
}
