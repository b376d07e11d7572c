//! # physarum - trail-following agent simulation
//!
//! A large population of point agents sense a shared scalar trail field,
//! steer toward stronger trail, move, and deposit; the field then diffuses
//! and decays. Everything runs as data-parallel compute stages against a
//! [`ComputeBackend`]: a rayon host backend, or wgpu compute shaders.
//!
//! ## Quick Start
//!
//! ```ignore
//! use physarum::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     let params = SimulationParameters::default().with_sensor_size(3);
//!     let config = SimulationConfig::new(50_000, 700, 700)
//!         .with_parameters(params)
//!         .with_seed(42);
//!
//!     let mut sim = SimulationController::cpu(config)?;
//!     let mut exporter = ImageExporter::new("frames").with_every(60);
//!     for _ in 0..600 {
//!         sim.advance()?;
//!         sim.present(&mut exporter)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Frame Pipeline
//!
//! | Stage | Invocations | Reads | Writes |
//! |-------|-------------|-------|--------|
//! | [`Stage::SenseAndMove`] | one per agent | current field | own agent, deposit accumulator |
//! | [`Stage::MergeDeposits`] | one per cell | deposit accumulator | current field |
//! | [`Stage::DiffuseDecay`] | one per cell | current field | next field, then swap |
//!
//! A memory barrier separates consecutive stages. Deposits are summed as
//! fixed-point integers, so a step's result does not depend on how its
//! invocations were scheduled.
//!
//! ## Boundaries
//!
//! Agents bounce off the edges of the unit square. Sensors and the blur
//! kernel wrap around the field as a torus.

pub mod agent;
pub mod backend;
pub mod error;
pub mod field;
pub mod gpu;
pub mod params;
pub mod present;
pub mod shader_utils;
mod simulation;
pub mod stages;
pub mod time;
pub mod uniforms;

pub use agent::{Agent, AgentPopulation, InitialDistribution};
pub use backend::{ComputeBackend, CpuBackend, Stage};
pub use bytemuck;
pub use error::{GpuError, SimulationError};
pub use field::{FieldLayout, TrailField};
pub use glam::Vec2;
pub use gpu::WgpuBackend;
pub use params::{ParamRange, SimulationParameters};
pub use present::{ImageExporter, PresentationAdapter, Tonemap};
pub use simulation::{SimulationConfig, SimulationController};
pub use uniforms::StepUniforms;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::agent::{Agent, AgentPopulation, InitialDistribution};
    pub use crate::backend::{ComputeBackend, CpuBackend, Stage};
    pub use crate::error::{GpuError, SimulationError};
    pub use crate::field::{FieldLayout, TrailField};
    pub use crate::gpu::WgpuBackend;
    pub use crate::params::SimulationParameters;
    pub use crate::present::{ImageExporter, PresentationAdapter, Tonemap};
    pub use crate::simulation::{SimulationConfig, SimulationController};
    pub use crate::time::Time;
    pub use glam::Vec2;
}
