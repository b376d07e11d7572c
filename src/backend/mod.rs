//! The compute-dispatch seam.
//!
//! The controller never runs a kernel itself. It hands a [`Stage`], a
//! workgroup count and the step's uniforms to a [`ComputeBackend`] and
//! inserts [`ComputeBackend::memory_barrier`] between stages. Two backends
//! implement the trait:
//!
//! - [`CpuBackend`] runs the kernels in [`stages`](crate::stages) over rayon.
//! - [`WgpuBackend`](crate::gpu::WgpuBackend) runs the same kernels as WGSL
//!   compute shaders.

use std::fmt;

use crate::agent::{Agent, AgentPopulation};
use crate::error::SimulationError;
use crate::field::{FieldLayout, TrailField};
use crate::uniforms::StepUniforms;

mod cpu;

pub use cpu::CpuBackend;

/// Invocations per workgroup for [`Stage::SenseAndMove`] (1-D).
pub const AGENT_WORKGROUP_SIZE: u32 = 256;

/// Workgroup edge for the per-cell stages (16x16, 2-D).
pub const FIELD_WORKGROUP_SIZE: u32 = 16;

/// One compute program of the per-frame pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Per agent: sense, steer, move, bounce, deposit into the accumulator.
    SenseAndMove,
    /// Per cell: fold the accumulator into the current field.
    MergeDeposits,
    /// Per cell: blur and decay current into next, then swap.
    DiffuseDecay,
}

impl Stage {
    /// All stages in dispatch order.
    pub const ALL: [Stage; 3] = [Stage::SenseAndMove, Stage::MergeDeposits, Stage::DiffuseDecay];

    /// Workgroup count covering every invocation of this stage.
    pub fn workgroups(&self, layout: FieldLayout, agent_count: u32) -> [u32; 3] {
        match self {
            Stage::SenseAndMove => [agent_count.div_ceil(AGENT_WORKGROUP_SIZE), 1, 1],
            Stage::MergeDeposits | Stage::DiffuseDecay => [
                layout.width.div_ceil(FIELD_WORKGROUP_SIZE),
                layout.height.div_ceil(FIELD_WORKGROUP_SIZE),
                1,
            ],
        }
    }

    /// Number of invocations a workgroup count launches.
    pub fn invocations(&self, workgroups: [u32; 3]) -> u64 {
        let [x, y, z] = workgroups.map(u64::from);
        match self {
            Stage::SenseAndMove => x * y * z * AGENT_WORKGROUP_SIZE as u64,
            Stage::MergeDeposits | Stage::DiffuseDecay => {
                x * y * z * (FIELD_WORKGROUP_SIZE * FIELD_WORKGROUP_SIZE) as u64
            }
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::SenseAndMove => write!(f, "sense/move"),
            Stage::MergeDeposits => write!(f, "merge deposits"),
            Stage::DiffuseDecay => write!(f, "diffuse/decay"),
        }
    }
}

/// A device that holds the agent buffer and field and runs the stages.
///
/// Writes made by one `dispatch` are only guaranteed visible to a later
/// `dispatch` after a `memory_barrier` in between.
pub trait ComputeBackend {
    /// Allocate the agent buffer, both field buffers and the deposit
    /// accumulator. On failure nothing stays allocated.
    fn allocate(&mut self, layout: FieldLayout, agent_count: usize) -> Result<(), SimulationError>;

    /// Replace the agent buffer contents. `agents.len()` must equal the
    /// allocated count.
    fn upload_agents(&mut self, agents: &[Agent]) -> Result<(), SimulationError>;

    /// Zero both field buffers and the accumulator.
    fn clear_field(&mut self) -> Result<(), SimulationError>;

    /// Run `stage` over `workgroups`. Out-of-range invocations do nothing.
    fn dispatch(
        &mut self,
        stage: Stage,
        workgroups: [u32; 3],
        uniforms: &StepUniforms,
    ) -> Result<(), SimulationError>;

    /// Make every write of earlier dispatches visible to later ones.
    fn memory_barrier(&mut self) -> Result<(), SimulationError>;

    /// Copy the agent buffer back to the host.
    fn read_agents(&mut self) -> Result<AgentPopulation, SimulationError>;

    /// Copy the current field back to the host.
    fn read_field(&mut self) -> Result<TrailField, SimulationError>;

    /// Short name for log lines.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::SenseAndMove.to_string(), "sense/move");
        assert_eq!(Stage::MergeDeposits.to_string(), "merge deposits");
        assert_eq!(Stage::DiffuseDecay.to_string(), "diffuse/decay");
    }

    #[test]
    fn test_workgroups_cover_all_items() {
        let layout = FieldLayout::new(700, 33);
        let agents = Stage::SenseAndMove.workgroups(layout, 50_000);
        assert_eq!(agents, [196, 1, 1]);
        assert!(Stage::SenseAndMove.invocations(agents) >= 50_000);

        let cells = Stage::DiffuseDecay.workgroups(layout, 50_000);
        assert_eq!(cells, [44, 3, 1]);
        assert!(Stage::DiffuseDecay.invocations(cells) >= 700 * 33);
    }

    #[test]
    fn test_zero_agents_dispatch_nothing() {
        let workgroups = Stage::SenseAndMove.workgroups(FieldLayout::new(4, 4), 0);
        assert_eq!(Stage::SenseAndMove.invocations(workgroups), 0);
    }
}
