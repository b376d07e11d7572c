//! wgpu compute backend.
//!
//! Runs the three stages as WGSL compute shaders on a headless device. The
//! agent buffer, both field buffers and the fixed-point deposit buffer stay
//! resident on the device between frames; the host only uploads the 64-byte
//! uniform block and reads back on request.
//!
//! Every dispatch records its own compute pass. [`ComputeBackend::memory_barrier`]
//! finishes the pending encoder and submits it, so later passes observe
//! earlier writes by queue order.

mod field_gpu;
pub mod shaders;

use std::sync::mpsc;

use crate::agent::{Agent, AgentPopulation};
use crate::backend::{ComputeBackend, Stage};
use crate::error::{GpuError, SimulationError};
use crate::field::{FieldLayout, TrailField};
use crate::uniforms::StepUniforms;

pub use field_gpu::TrailFieldGpu;
use field_gpu::{
    buffer_size, create_diffuse_bind_groups, create_diffuse_pipeline, create_merge_bind_groups,
    create_merge_pipeline, create_sense_bind_groups, create_sense_pipeline, deposit_buffer_bytes,
    ParityBindGroups, StagePipelines,
};

/// Buffers and bind groups sized for one population and field.
struct GpuResources {
    agent_count: usize,
    agent_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    field: TrailFieldGpu,
    sense_bind_groups: ParityBindGroups,
    merge_bind_groups: ParityBindGroups,
    diffuse_bind_groups: ParityBindGroups,
}

/// Compute backend on a wgpu device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    pipelines: StagePipelines,
    resources: Option<GpuResources>,
    /// Encoder holding passes recorded since the last barrier.
    encoder: Option<wgpu::CommandEncoder>,
    /// Last stage recorded into `encoder`, for error attribution.
    pending_stage: Option<Stage>,
    /// Uniforms currently in `uniform_buffer`.
    last_uniforms: Option<StepUniforms>,
}

/// Run `f` inside a validation error scope and attribute failures to `stage`.
fn scoped<T>(
    device: &wgpu::Device,
    stage: Stage,
    f: impl FnOnce() -> T,
) -> Result<T, SimulationError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(SimulationError::dispatch(stage, err.to_string())),
        None => Ok(value),
    }
}

/// Copy `size` bytes of `source` into a mappable buffer and read them back.
fn read_back(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    size: u64,
) -> Result<Vec<u8>, GpuError> {
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    queue.submit(Some(encoder.finish()));

    let buffer_slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|e| GpuError::BufferMapping(e.to_string()))?
        .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

    let bytes = {
        let data = buffer_slice.get_mapped_range();
        data.to_vec()
    };
    staging.unmap();
    Ok(bytes)
}

impl WgpuBackend {
    /// Create a headless device on the highest-performance adapter.
    pub fn new() -> Result<Self, SimulationError> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, SimulationError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Physarum Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::from)?;

        let (sense_pipeline, sense_bind_group_layout) =
            scoped(&device, Stage::SenseAndMove, || create_sense_pipeline(&device))?;
        let (merge_pipeline, merge_bind_group_layout) =
            scoped(&device, Stage::MergeDeposits, || create_merge_pipeline(&device))?;
        let (diffuse_pipeline, diffuse_bind_group_layout) =
            scoped(&device, Stage::DiffuseDecay, || create_diffuse_pipeline(&device))?;

        log::info!(
            "wgpu backend on {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
            pipelines: StagePipelines {
                sense_pipeline,
                sense_bind_group_layout,
                merge_pipeline,
                merge_bind_group_layout,
                diffuse_pipeline,
                diffuse_bind_group_layout,
            },
            resources: None,
            encoder: None,
            pending_stage: None,
            last_uniforms: None,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The current field as a storage buffer of `width * height` f32s.
    ///
    /// Valid for binding (read-only) by a renderer after a completed step.
    /// Its identity changes on every step because the field ping-pongs.
    pub fn presentation_buffer(&self) -> Option<&wgpu::Buffer> {
        self.resources.as_ref().map(|r| r.field.current_buffer())
    }

    /// Submit recorded passes. Validation errors are attributed to the last
    /// recorded stage.
    fn flush(&mut self) -> Result<(), SimulationError> {
        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };
        let stage = self.pending_stage.take().unwrap_or(Stage::SenseAndMove);
        let queue = &self.queue;
        scoped(&self.device, stage, || {
            queue.submit(Some(encoder.finish()));
        })
    }

    fn resources(&self, stage: Stage) -> Result<&GpuResources, SimulationError> {
        self.resources
            .as_ref()
            .ok_or_else(|| SimulationError::dispatch(stage, "backend has no allocated buffers"))
    }

    fn check_size(&self, what: &str, bytes: u64) -> Result<(), SimulationError> {
        let limits = self.device.limits();
        let max = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if bytes > max {
            return Err(SimulationError::Allocation(format!(
                "{} needs {} bytes, device allows {}",
                what, bytes, max
            )));
        }
        Ok(())
    }
}

impl ComputeBackend for WgpuBackend {
    fn allocate(&mut self, layout: FieldLayout, agent_count: usize) -> Result<(), SimulationError> {
        let cells = layout.total_cells()?;
        let agent_bytes = (agent_count as u64)
            .checked_mul(std::mem::size_of::<Agent>() as u64)
            .ok_or_else(|| SimulationError::Allocation("agent buffer size overflows".into()))?;
        let field_bytes = (cells as u64) * std::mem::size_of::<f32>() as u64;
        if u32::try_from(agent_count).is_err() {
            return Err(SimulationError::Allocation(format!(
                "{} agents exceed the 32-bit invocation index",
                agent_count
            )));
        }
        self.check_size("agent buffer", agent_bytes)?;
        self.check_size("trail field", field_bytes)?;
        self.check_size("deposit accumulator", deposit_buffer_bytes(layout))?;

        self.flush()?;
        // Release the old generation before allocating the new one.
        self.resources = None;
        self.last_uniforms = None;

        let device = &self.device;
        let pipelines = &self.pipelines;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let agent_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Agent Buffer"),
            size: buffer_size(agent_bytes),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Step Uniform Buffer"),
            size: std::mem::size_of::<StepUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let field = TrailFieldGpu::new(device, layout);

        let sense_bind_groups = create_sense_bind_groups(
            device,
            &pipelines.sense_bind_group_layout,
            &agent_buffer,
            &field,
            &uniform_buffer,
        );
        let merge_bind_groups = create_merge_bind_groups(
            device,
            &pipelines.merge_bind_group_layout,
            &field,
            &uniform_buffer,
        );
        let diffuse_bind_groups = create_diffuse_bind_groups(
            device,
            &pipelines.diffuse_bind_group_layout,
            &field,
            &uniform_buffer,
        );

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = out_of_memory.or(validation) {
            return Err(SimulationError::Allocation(err.to_string()));
        }

        log::debug!(
            "wgpu backend: {} agents, {}x{} field ({} bytes per buffer)",
            agent_count,
            layout.width,
            layout.height,
            field_bytes
        );

        self.resources = Some(GpuResources {
            agent_count,
            agent_buffer,
            uniform_buffer,
            field,
            sense_bind_groups,
            merge_bind_groups,
            diffuse_bind_groups,
        });
        Ok(())
    }

    fn upload_agents(&mut self, agents: &[Agent]) -> Result<(), SimulationError> {
        let expected = self.resources(Stage::SenseAndMove)?.agent_count;
        if agents.len() != expected {
            return Err(SimulationError::PopulationMismatch {
                expected,
                actual: agents.len(),
            });
        }
        // Queue writes land before the next submission's passes.
        self.flush()?;
        if !agents.is_empty() {
            let resources = self.resources(Stage::SenseAndMove)?;
            self.queue
                .write_buffer(&resources.agent_buffer, 0, bytemuck::cast_slice(agents));
        }
        Ok(())
    }

    fn clear_field(&mut self) -> Result<(), SimulationError> {
        self.flush()?;
        let device = &self.device;
        let resources = self.resources.as_mut().ok_or_else(|| {
            SimulationError::dispatch(Stage::DiffuseDecay, "backend has no allocated buffers")
        })?;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clear Field Encoder"),
        });
        resources.field.clear(&mut encoder);
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn dispatch(
        &mut self,
        stage: Stage,
        workgroups: [u32; 3],
        uniforms: &StepUniforms,
    ) -> Result<(), SimulationError> {
        let field_layout = self.resources(stage)?.field.layout;
        if uniforms.layout() != field_layout {
            return Err(SimulationError::dispatch(
                stage,
                format!(
                    "uniforms describe a {}x{} field, buffers hold {}x{}",
                    uniforms.width, uniforms.height, field_layout.width, field_layout.height
                ),
            ));
        }
        let max = self.device.limits().max_compute_workgroups_per_dimension;
        if workgroups.iter().any(|&n| n > max) {
            return Err(SimulationError::dispatch(
                stage,
                format!("workgroup count {:?} exceeds device limit {}", workgroups, max),
            ));
        }

        if self.last_uniforms.as_ref() != Some(uniforms) {
            // Queue writes precede every pass of the next submission.
            self.flush()?;
            let resources = self.resources(stage)?;
            self.queue
                .write_buffer(&resources.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
            self.last_uniforms = Some(*uniforms);
        }

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Simulation Step Encoder"),
            })
        });
        let resources = self
            .resources
            .as_mut()
            .ok_or_else(|| SimulationError::dispatch(stage, "backend has no allocated buffers"))?;
        let parity = resources.field.parity();

        let (label, pipeline, bind_group) = match stage {
            Stage::SenseAndMove => (
                "Sense/Move Pass",
                &self.pipelines.sense_pipeline,
                &resources.sense_bind_groups[parity],
            ),
            Stage::MergeDeposits => (
                "Trail Merge Pass",
                &self.pipelines.merge_pipeline,
                &resources.merge_bind_groups[parity],
            ),
            Stage::DiffuseDecay => (
                "Trail Diffuse/Decay Pass",
                &self.pipelines.diffuse_pipeline,
                &resources.diffuse_bind_groups[parity],
            ),
        };

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        }

        if stage == Stage::DiffuseDecay {
            resources.field.swap_buffers();
        }
        self.pending_stage = Some(stage);
        Ok(())
    }

    fn memory_barrier(&mut self) -> Result<(), SimulationError> {
        self.flush()
    }

    fn read_agents(&mut self) -> Result<AgentPopulation, SimulationError> {
        self.flush()?;
        let resources = self.resources(Stage::SenseAndMove)?;
        if resources.agent_count == 0 {
            return Ok(AgentPopulation::default());
        }
        let size = (resources.agent_count * std::mem::size_of::<Agent>()) as u64;
        let bytes = read_back(&self.device, &self.queue, &resources.agent_buffer, size)?;
        let agents = bytes
            .chunks_exact(std::mem::size_of::<Agent>())
            .map(bytemuck::pod_read_unaligned::<Agent>)
            .collect();
        Ok(AgentPopulation::from_agents(agents))
    }

    fn read_field(&mut self) -> Result<TrailField, SimulationError> {
        self.flush()?;
        let resources = self.resources(Stage::DiffuseDecay)?;
        let layout = resources.field.layout;
        let size = layout.memory_size() as u64;
        let bytes = read_back(&self.device, &self.queue, resources.field.current_buffer(), size)?;
        let cells = bytes
            .chunks_exact(std::mem::size_of::<f32>())
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        Ok(TrailField::from_cells(layout, cells))
    }

    fn name(&self) -> &'static str {
        "wgpu"
    }
}
