//! Error types for the simulation.
//!
//! The simulation core itself never fails at runtime. Everything here is a
//! collaborator failure: the backend could not allocate the agent buffer or
//! field, a compute stage could not be executed, or an output sink failed.

use std::fmt;

use crate::backend::Stage;

/// Errors that can occur during GPU initialization and readback.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors surfaced by [`SimulationController`](crate::SimulationController)
/// and the backends it drives.
#[derive(Debug)]
pub enum SimulationError {
    /// The backend could not allocate the agent buffer or the trail field.
    ///
    /// Fatal to `initialize`; no partially allocated state is kept.
    Allocation(String),
    /// The backend could not execute a stage. Not retried.
    Dispatch {
        stage: Stage,
        message: String,
    },
    /// A replacement agent set did not match the fixed population size.
    PopulationMismatch {
        expected: usize,
        actual: usize,
    },
    /// GPU initialization or readback failed.
    Gpu(GpuError),
    /// Failed to encode an exported frame.
    Export(image::ImageError),
    /// Failed to read or write a file.
    Io(std::io::Error),
    /// Failed to parse a parameter preset.
    Preset(serde_json::Error),
}

impl SimulationError {
    pub(crate) fn dispatch(stage: Stage, message: impl Into<String>) -> Self {
        SimulationError::Dispatch {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Allocation(msg) => write!(f, "Failed to allocate simulation resources: {}", msg),
            SimulationError::Dispatch { stage, message } => {
                write!(f, "Failed to dispatch {} stage: {}", stage, message)
            }
            SimulationError::PopulationMismatch { expected, actual } => write!(
                f,
                "Population size is fixed at {} agents, got {}",
                expected, actual
            ),
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
            SimulationError::Export(e) => write!(f, "Failed to export field image: {}", e),
            SimulationError::Io(e) => write!(f, "I/O error: {}", e),
            SimulationError::Preset(e) => write!(f, "Invalid parameter preset: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Gpu(e) => Some(e),
            SimulationError::Export(e) => Some(e),
            SimulationError::Io(e) => Some(e),
            SimulationError::Preset(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}

impl From<image::ImageError> for SimulationError {
    fn from(e: image::ImageError) -> Self {
        SimulationError::Export(e)
    }
}

impl From<std::io::Error> for SimulationError {
    fn from(e: std::io::Error) -> Self {
        SimulationError::Io(e)
    }
}

impl From<serde_json::Error> for SimulationError {
    fn from(e: serde_json::Error) -> Self {
        SimulationError::Preset(e)
    }
}

impl From<std::collections::TryReserveError> for SimulationError {
    fn from(e: std::collections::TryReserveError) -> Self {
        SimulationError::Allocation(e.to_string())
    }
}
