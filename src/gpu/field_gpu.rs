//! GPU resources and compute pipelines for the 2D trail field.

use crate::field::FieldLayout;

use super::shaders;

/// Smallest buffer we create; zero-sized storage bindings are invalid.
const MIN_BUFFER_SIZE: u64 = 16;

pub(crate) fn buffer_size(bytes: u64) -> u64 {
    bytes.max(MIN_BUFFER_SIZE)
}

/// Bytes of the deposit accumulator: one 64-bit fixed-point sum per cell.
pub(crate) fn deposit_buffer_bytes(layout: FieldLayout) -> u64 {
    layout.len() as u64 * std::mem::size_of::<i64>() as u64
}

/// GPU state for the trail field.
pub struct TrailFieldGpu {
    /// Atomic write buffer - agents deposit here (32.32 fixed point, two words per cell)
    pub deposit_buffer: wgpu::Buffer,
    /// Field buffer A
    pub buffer_a: wgpu::Buffer,
    /// Field buffer B
    pub buffer_b: wgpu::Buffer,
    /// Which buffer is currently the "current" one (false = A, true = B)
    pub current_is_b: bool,
    pub layout: FieldLayout,
}

impl TrailFieldGpu {
    pub fn new(device: &wgpu::Device, layout: FieldLayout) -> Self {
        let size = buffer_size(layout.memory_size() as u64);

        // Deposit buffer: (fraction, whole) atomic u32 pairs, drained by the merge pass
        let deposit_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trail Deposit Buffer"),
            size: buffer_size(deposit_buffer_bytes(layout)),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Field buffers: f32, ping-ponged by the diffuse pass
        let buffer_a = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trail Field Buffer A"),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let buffer_b = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trail Field Buffer B"),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Self {
            deposit_buffer,
            buffer_a,
            buffer_b,
            current_is_b: false,
            layout,
        }
    }

    /// Get the current field buffer
    pub fn current_buffer(&self) -> &wgpu::Buffer {
        if self.current_is_b {
            &self.buffer_b
        } else {
            &self.buffer_a
        }
    }

    /// Swap field buffers after diffusion
    pub fn swap_buffers(&mut self) {
        self.current_is_b = !self.current_is_b;
    }

    /// Index into per-parity bind group pairs.
    pub fn parity(&self) -> usize {
        self.current_is_b as usize
    }

    /// Record clears of both field buffers and the deposit buffer.
    pub fn clear(&mut self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.buffer_a, 0, None);
        encoder.clear_buffer(&self.buffer_b, 0, None);
        encoder.clear_buffer(&self.deposit_buffer, 0, None);
        self.current_is_b = false;
    }
}

/// The three stage pipelines with their bind group layouts.
pub struct StagePipelines {
    pub sense_pipeline: wgpu::ComputePipeline,
    pub sense_bind_group_layout: wgpu::BindGroupLayout,
    pub merge_pipeline: wgpu::ComputePipeline,
    pub merge_bind_group_layout: wgpu::BindGroupLayout,
    pub diffuse_pipeline: wgpu::ComputePipeline,
    pub diffuse_bind_group_layout: wgpu::BindGroupLayout,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    name: &str,
    source: String,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{} Shader", name)),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{} Bind Group Layout", name)),
        entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{} Pipeline Layout", name)),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{} Pipeline", name)),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    (pipeline, bind_group_layout)
}

pub fn create_sense_pipeline(
    device: &wgpu::Device,
) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
    create_pipeline(
        device,
        "Sense/Move",
        shaders::sense_shader(),
        &[
            // Agents
            storage_entry(0, false),
            // Current field (sampled)
            storage_entry(1, true),
            // Deposit buffer (atomic i32)
            storage_entry(2, false),
            uniform_entry(3),
        ],
    )
}

pub fn create_merge_pipeline(
    device: &wgpu::Device,
) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
    create_pipeline(
        device,
        "Trail Merge",
        shaders::merge_shader(),
        &[
            // Deposit buffer, drained with atomicExchange
            storage_entry(0, false),
            // Current field (read_write for merging)
            storage_entry(1, false),
            uniform_entry(2),
        ],
    )
}

pub fn create_diffuse_pipeline(
    device: &wgpu::Device,
) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
    create_pipeline(
        device,
        "Trail Diffuse/Decay",
        shaders::diffuse_shader(),
        &[
            // Source (current)
            storage_entry(0, true),
            // Destination (next)
            storage_entry(1, false),
            uniform_entry(2),
        ],
    )
}

/// Bind groups for one stage, indexed by [`TrailFieldGpu::parity`].
pub type ParityBindGroups = [wgpu::BindGroup; 2];

fn parity_views(field: &TrailFieldGpu, parity: usize) -> (&wgpu::Buffer, &wgpu::Buffer) {
    if parity == 1 {
        (&field.buffer_b, &field.buffer_a)
    } else {
        (&field.buffer_a, &field.buffer_b)
    }
}

pub fn create_sense_bind_groups(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    agent_buffer: &wgpu::Buffer,
    field: &TrailFieldGpu,
    uniform_buffer: &wgpu::Buffer,
) -> ParityBindGroups {
    [0, 1].map(|parity| {
        let (current, _) = parity_views(field, parity);
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sense/Move Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: agent_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: current.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: field.deposit_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        })
    })
}

pub fn create_merge_bind_groups(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    field: &TrailFieldGpu,
    uniform_buffer: &wgpu::Buffer,
) -> ParityBindGroups {
    [0, 1].map(|parity| {
        let (current, _) = parity_views(field, parity);
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trail Merge Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: field.deposit_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: current.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        })
    })
}

pub fn create_diffuse_bind_groups(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    field: &TrailFieldGpu,
    uniform_buffer: &wgpu::Buffer,
) -> ParityBindGroups {
    [0, 1].map(|parity| {
        let (current, next) = parity_views(field, parity);
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trail Diffuse/Decay Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: current.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: next.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        })
    })
}
