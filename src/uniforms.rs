//! Per-step uniforms: the parameter snapshot every stage reads.
//!
//! The controller builds one [`StepUniforms`] at the start of each step from
//! the live [`SimulationParameters`], the field layout, the population size
//! and the frame counter. Both backends consume the same struct; the wgpu
//! backend uploads it verbatim as a uniform buffer.

use bytemuck::{Pod, Zeroable};

use crate::field::FieldLayout;
use crate::params::SimulationParameters;

/// Uniform block shared by all three compute stages.
///
/// Sixteen 4-byte scalars (64 bytes) so the WGSL uniform layout needs no
/// implicit padding.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct StepUniforms {
    pub width: u32,
    pub height: u32,
    pub agent_count: u32,
    pub frame: u32,
    pub seed: u32,
    pub sensor_size: i32,
    pub trail_weight: f32,
    pub decay_rate: f32,
    pub diffuse_rate: f32,
    pub move_speed: f32,
    pub turn_speed: f32,
    pub sensor_angle: f32,
    pub sensor_distance: f32,
    pub steering_noise: f32,
    pub time_step: f32,
    pub _pad: f32,
}

impl StepUniforms {
    pub fn new(
        params: &SimulationParameters,
        layout: FieldLayout,
        agent_count: u32,
        frame: u32,
        seed: u32,
    ) -> Self {
        Self {
            width: layout.width,
            height: layout.height,
            agent_count,
            frame,
            seed,
            // A negative half-width would make the sensor loop empty.
            sensor_size: params.sensor_size.max(0),
            trail_weight: params.trail_weight,
            decay_rate: params.decay_rate,
            diffuse_rate: params.diffuse_rate,
            move_speed: params.move_speed,
            turn_speed: params.turn_speed,
            sensor_angle: params.sensor_angle,
            sensor_distance: params.sensor_distance,
            steering_noise: params.steering_noise,
            time_step: params.time_step,
            _pad: 0.0,
        }
    }

    pub fn layout(&self) -> FieldLayout {
        FieldLayout::new(self.width, self.height)
    }

    /// Heading change applied by one sensor-driven turn.
    #[inline]
    pub fn turn_step(&self) -> f32 {
        self.turn_speed * self.time_step
    }
}

/// WGSL declaration matching [`StepUniforms`].
pub const STEP_UNIFORMS_WGSL: &str = r#"
struct StepUniforms {
    width: u32,
    height: u32,
    agent_count: u32,
    frame: u32,
    seed: u32,
    sensor_size: i32,
    trail_weight: f32,
    decay_rate: f32,
    diffuse_rate: f32,
    move_speed: f32,
    turn_speed: f32,
    sensor_angle: f32,
    sensor_distance: f32,
    steering_noise: f32,
    time_step: f32,
    _pad: f32,
};
"#;
