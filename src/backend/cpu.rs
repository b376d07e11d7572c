//! Host backend: rayon data-parallel dispatch of the stage kernels.

use std::sync::atomic::{fence, Ordering};

use rayon::prelude::*;

use super::{ComputeBackend, Stage, FIELD_WORKGROUP_SIZE};
use crate::agent::{Agent, AgentPopulation};
use crate::error::SimulationError;
use crate::field::{DepositAccumulator, FieldBuffers, FieldLayout, TrailField};
use crate::stages::{diffuse_cell, merge_cell, sense_and_move};
use crate::uniforms::StepUniforms;

struct CpuState {
    layout: FieldLayout,
    agents: Vec<Agent>,
    field: FieldBuffers,
    deposits: DepositAccumulator,
}

/// Runs every stage on the host thread pool.
///
/// Each dispatch is one parallel iterator that joins before returning.
/// Deposits go through the fixed-point accumulator, so results do not
/// depend on how rayon splits the work.
#[derive(Default)]
pub struct CpuBackend {
    state: Option<CpuState>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&mut self, stage: Stage) -> Result<&mut CpuState, SimulationError> {
        self.state
            .as_mut()
            .ok_or_else(|| SimulationError::dispatch(stage, "backend has no allocated buffers"))
    }
}

/// Whether cell `index` is launched by a 2-D dispatch of `workgroups`.
fn cell_covered(index: usize, layout: FieldLayout, workgroups: [u32; 3]) -> bool {
    if workgroups[2] == 0 {
        return false;
    }
    let x = (index % layout.width as usize) as u64;
    let y = (index / layout.width as usize) as u64;
    x < workgroups[0] as u64 * FIELD_WORKGROUP_SIZE as u64
        && y < workgroups[1] as u64 * FIELD_WORKGROUP_SIZE as u64
}

impl ComputeBackend for CpuBackend {
    fn allocate(&mut self, layout: FieldLayout, agent_count: usize) -> Result<(), SimulationError> {
        let cells = layout.total_cells()?;

        let mut agents = Vec::new();
        agents.try_reserve_exact(agent_count)?;
        agents.resize(agent_count, Agent::new(glam::Vec2::ZERO, 0.0));
        let field = FieldBuffers::new(layout)?;
        let deposits = DepositAccumulator::new(cells)?;

        log::debug!(
            "cpu backend: {} agents, {}x{} field ({} bytes per buffer)",
            agent_count,
            layout.width,
            layout.height,
            layout.memory_size()
        );

        self.state = Some(CpuState {
            layout,
            agents,
            field,
            deposits,
        });
        Ok(())
    }

    fn upload_agents(&mut self, agents: &[Agent]) -> Result<(), SimulationError> {
        let state = self.state(Stage::SenseAndMove)?;
        if agents.len() != state.agents.len() {
            return Err(SimulationError::PopulationMismatch {
                expected: state.agents.len(),
                actual: agents.len(),
            });
        }
        state.agents.copy_from_slice(agents);
        Ok(())
    }

    fn clear_field(&mut self) -> Result<(), SimulationError> {
        let state = self.state(Stage::DiffuseDecay)?;
        state.field.clear();
        state.deposits.clear();
        Ok(())
    }

    fn dispatch(
        &mut self,
        stage: Stage,
        workgroups: [u32; 3],
        uniforms: &StepUniforms,
    ) -> Result<(), SimulationError> {
        let state = self.state(stage)?;
        if uniforms.layout() != state.layout {
            return Err(SimulationError::dispatch(
                stage,
                format!(
                    "uniforms describe a {}x{} field, buffers hold {}x{}",
                    uniforms.width, uniforms.height, state.layout.width, state.layout.height
                ),
            ));
        }

        let CpuState {
            layout,
            agents,
            field,
            deposits,
        } = state;
        let layout = *layout;
        let deposits = &*deposits;

        match stage {
            Stage::SenseAndMove => {
                let invocations = stage.invocations(workgroups);
                let count = (uniforms.agent_count as u64).min(invocations) as usize;
                let current = field.current();
                agents
                    .par_iter_mut()
                    .take(count)
                    .enumerate()
                    .for_each(|(i, agent)| {
                        sense_and_move(i as u32, agent, current, deposits, uniforms)
                    });
            }
            Stage::MergeDeposits => {
                field
                    .current_mut()
                    .par_iter_mut()
                    .enumerate()
                    .filter(|(i, _)| cell_covered(*i, layout, workgroups))
                    .for_each(|(i, cell)| merge_cell(i, cell, deposits));
            }
            Stage::DiffuseDecay => {
                let (current, next) = field.split();
                next.par_iter_mut()
                    .enumerate()
                    .filter(|(i, _)| cell_covered(*i, layout, workgroups))
                    .for_each(|(i, cell)| *cell = diffuse_cell(i, current, uniforms));
                field.swap();
            }
        }
        Ok(())
    }

    fn memory_barrier(&mut self) -> Result<(), SimulationError> {
        // Rayon already joined; the fence orders the relaxed deposit atomics.
        fence(Ordering::SeqCst);
        Ok(())
    }

    fn read_agents(&mut self) -> Result<AgentPopulation, SimulationError> {
        let state = self.state(Stage::SenseAndMove)?;
        Ok(AgentPopulation::from_agents(state.agents.clone()))
    }

    fn read_field(&mut self) -> Result<TrailField, SimulationError> {
        let state = self.state(Stage::DiffuseDecay)?;
        Ok(state.field.snapshot())
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SimulationParameters;
    use glam::Vec2;

    fn uniforms(params: &SimulationParameters, layout: FieldLayout, agents: u32) -> StepUniforms {
        StepUniforms::new(params, layout, agents, 0, 1)
    }

    #[test]
    fn test_dispatch_before_allocate_fails() {
        let mut backend = CpuBackend::new();
        let u = uniforms(&SimulationParameters::default(), FieldLayout::new(4, 4), 0);
        let err = backend.dispatch(Stage::MergeDeposits, [1, 1, 1], &u).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Dispatch {
                stage: Stage::MergeDeposits,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_allocate_keeps_nothing() {
        let mut backend = CpuBackend::new();
        let err = backend
            .allocate(FieldLayout::new(u32::MAX, u32::MAX), 16)
            .unwrap_err();
        assert!(matches!(err, SimulationError::Allocation(_)));
        assert!(backend.read_field().is_err());
    }

    #[test]
    fn test_upload_rejects_wrong_count() {
        let mut backend = CpuBackend::new();
        backend.allocate(FieldLayout::new(4, 4), 2).unwrap();
        let err = backend
            .upload_agents(&[Agent::new(Vec2::ZERO, 0.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            SimulationError::PopulationMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_layout_mismatch_is_dispatch_error() {
        let mut backend = CpuBackend::new();
        backend.allocate(FieldLayout::new(4, 4), 1).unwrap();
        let u = uniforms(&SimulationParameters::default(), FieldLayout::new(8, 8), 1);
        assert!(backend.dispatch(Stage::DiffuseDecay, [1, 1, 1], &u).is_err());
    }

    #[test]
    fn test_sense_merge_diffuse_sequence() {
        let layout = FieldLayout::new(4, 4);
        let params = SimulationParameters::default()
            .with_trail_weight(1.0)
            .with_move_speed(0.25)
            .with_turn_speed(0.0)
            .with_diffuse_rate(0.0)
            .with_decay_rate(0.25)
            .with_steering_noise(0.0);
        let mut backend = CpuBackend::new();
        backend.allocate(layout, 1).unwrap();
        backend
            .upload_agents(&[Agent::new(Vec2::splat(0.5), 0.0)])
            .unwrap();
        let u = uniforms(&params, layout, 1);

        backend.dispatch(Stage::SenseAndMove, [1, 1, 1], &u).unwrap();
        backend.memory_barrier().unwrap();
        // Deposits stay in the accumulator until merged.
        assert_eq!(backend.read_field().unwrap().sum(), 0.0);

        backend.dispatch(Stage::MergeDeposits, [1, 1, 1], &u).unwrap();
        backend.memory_barrier().unwrap();
        let merged = backend.read_field().unwrap();
        assert_eq!(merged.get(3, 2), 1.0);
        assert_eq!(merged.nonzero_cells(), vec![(3, 2)]);

        backend.dispatch(Stage::DiffuseDecay, [1, 1, 1], &u).unwrap();
        backend.memory_barrier().unwrap();
        let field = backend.read_field().unwrap();
        assert_eq!(field.get(3, 2), 0.75);
        assert_eq!(field.nonzero_cells(), vec![(3, 2)]);
    }

    #[test]
    fn test_partial_dispatch_only_moves_covered_agents() {
        let layout = FieldLayout::new(4, 4);
        let params = SimulationParameters::default()
            .with_move_speed(0.1)
            .with_turn_speed(0.0);
        let mut backend = CpuBackend::new();
        backend.allocate(layout, 300).unwrap();
        let start = vec![Agent::new(Vec2::splat(0.5), 0.0); 300];
        backend.upload_agents(&start).unwrap();

        backend
            .dispatch(Stage::SenseAndMove, [1, 1, 1], &uniforms(&params, layout, 300))
            .unwrap();
        let agents = backend.read_agents().unwrap();
        assert!(agents.as_slice()[..256].iter().all(|a| a.position.x > 0.5));
        assert!(agents.as_slice()[256..].iter().all(|a| a.position.x == 0.5));
    }

    #[test]
    fn test_clear_field_zeroes_accumulator() {
        let layout = FieldLayout::new(4, 4);
        let params = SimulationParameters::default().with_trail_weight(1.0);
        let mut backend = CpuBackend::new();
        backend.allocate(layout, 1).unwrap();
        backend
            .upload_agents(&[Agent::new(Vec2::splat(0.5), 0.0)])
            .unwrap();
        let u = uniforms(&params, layout, 1);
        backend.dispatch(Stage::SenseAndMove, [1, 1, 1], &u).unwrap();
        backend.clear_field().unwrap();
        backend.dispatch(Stage::MergeDeposits, [1, 1, 1], &u).unwrap();
        assert_eq!(backend.read_field().unwrap().sum(), 0.0);
    }
}
