//! WGSL compute shaders for the three stages.
//!
//! Each shader is assembled from the shared [`STEP_UNIFORMS_WGSL`] block, the
//! field helpers below and the stage body. They mirror the kernels in
//! [`stages`](crate::stages) line for line.

use crate::backend::{AGENT_WORKGROUP_SIZE, FIELD_WORKGROUP_SIZE};
use crate::field::{FRACTION_SCALE, MAX_DEPOSIT};
use crate::shader_utils::{RANDOM_WGSL, STREAM_JITTER, STREAM_TIE_BREAK};
use crate::uniforms::STEP_UNIFORMS_WGSL;

/// Coordinate wrapping, indexing and fixed-point helpers.
fn field_helpers_wgsl() -> String {
    format!(
        r#"
const FRACTION_SCALE: f32 = {scale:.1};
const MAX_DEPOSIT: f32 = {max_deposit:.1};

fn wrap_coord(c: i32, size: u32) -> u32 {{
    let s = i32(size);
    return u32(((c % s) + s) % s);
}}

fn field_index(x: u32, y: u32) -> u32 {{
    return y * u.width + x;
}}

fn wrapped_index(x: i32, y: i32) -> u32 {{
    return field_index(wrap_coord(x, u.width), wrap_coord(y, u.height));
}}

// 32.32 fixed point as (fraction, whole) words, rounded toward -inf.
fn deposit_parts(v: f32) -> vec2<u32> {{
    let clamped = clamp(v, -MAX_DEPOSIT, MAX_DEPOSIT);
    let whole = floor(clamped);
    let fraction = u32(floor((clamped - whole) * FRACTION_SCALE));
    return vec2<u32>(fraction, bitcast<u32>(i32(whole)));
}}
"#,
        scale = FRACTION_SCALE,
        max_deposit = MAX_DEPOSIT,
    )
}

/// Per-agent sense, steer, move, bounce and deposit.
pub fn sense_shader() -> String {
    format!(
        r#"{uniforms}
{random}
struct Agent {{
    position: vec2<f32>,
    heading: f32,
    _pad: f32,
}};

@group(0) @binding(0)
var<storage, read_write> agents: array<Agent>;

@group(0) @binding(1)
var<storage, read> trail: array<f32>;

// Word 2i is the fraction of cell i, word 2i+1 its whole part.
@group(0) @binding(2)
var<storage, read_write> deposits: array<atomic<u32>>;

@group(0) @binding(3)
var<uniform> u: StepUniforms;

const TAU: f32 = 6.283185307179586;
const STREAM_TIE_BREAK: u32 = {tie_break:#x}u;
const STREAM_JITTER: u32 = {jitter:#x}u;
{helpers}
fn sense(position: vec2<f32>, angle: f32) -> f32 {{
    let probe = position + vec2<f32>(cos(angle), sin(angle)) * u.sensor_distance;
    let cx = i32(floor(probe.x * f32(u.width)));
    let cy = i32(floor(probe.y * f32(u.height)));
    let r = u.sensor_size;

    var sum = 0.0;
    for (var dy = -r; dy <= r; dy = dy + 1) {{
        for (var dx = -r; dx <= r; dx = dx + 1) {{
            sum = sum + trail[wrapped_index(cx + dx, cy + dy)];
        }}
    }}
    return sum;
}}

fn deposit(idx: u32, v: f32) {{
    let parts = deposit_parts(v);
    let old = atomicAdd(&deposits[2u * idx], parts.x);
    var carry = 0u;
    if old + parts.x < old {{
        carry = 1u;
    }}
    let whole = parts.y + carry;
    if whole != 0u {{
        atomicAdd(&deposits[2u * idx + 1u], whole);
    }}
}}

fn normalize_heading(h: f32) -> f32 {{
    let r = h - TAU * floor(h / TAU);
    if r >= 0.0 && r < TAU {{
        return r;
    }}
    return 0.0;
}}

@compute @workgroup_size({workgroup})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if index >= u.agent_count {{
        return;
    }}

    var agent = agents[index];

    let left = sense(agent.position, agent.heading + u.sensor_angle);
    let center = sense(agent.position, agent.heading);
    let right = sense(agent.position, agent.heading - u.sensor_angle);

    let turn_step = u.turn_speed * u.time_step;
    var heading = agent.heading;
    if left > center && left > right {{
        heading = heading + turn_step;
    }} else if right > center && right > left {{
        heading = heading - turn_step;
    }} else if left == center && center == right {{
        let r = agent_random(index, u.frame, u.seed, STREAM_TIE_BREAK);
        heading = heading + (r * 2.0 - 1.0) * turn_step;
    }}

    if u.steering_noise != 0.0 {{
        let r = agent_random(index, u.frame, u.seed, STREAM_JITTER);
        heading = heading + (r * 2.0 - 1.0) * u.steering_noise;
    }}

    // Bounce: clamp the offending axis and mirror its direction component.
    var dir = vec2<f32>(cos(heading), sin(heading));
    var next = agent.position + dir * u.move_speed;
    var bounced = false;
    if next.x < 0.0 || next.x > 1.0 {{
        next.x = clamp(next.x, 0.0, 1.0);
        dir.x = -dir.x;
        bounced = true;
    }}
    if next.y < 0.0 || next.y > 1.0 {{
        next.y = clamp(next.y, 0.0, 1.0);
        dir.y = -dir.y;
        bounced = true;
    }}
    if bounced {{
        heading = atan2(dir.y, dir.x);
    }}

    agent.position = next;
    agent.heading = normalize_heading(heading);
    agents[index] = agent;

    let x = clamp(i32(floor(next.x * f32(u.width))), 0, i32(u.width) - 1);
    let y = clamp(i32(floor(next.y * f32(u.height))), 0, i32(u.height) - 1);
    deposit(field_index(u32(x), u32(y)), u.trail_weight);
}}
"#,
        uniforms = STEP_UNIFORMS_WGSL,
        random = RANDOM_WGSL,
        helpers = field_helpers_wgsl(),
        tie_break = STREAM_TIE_BREAK,
        jitter = STREAM_JITTER,
        workgroup = AGENT_WORKGROUP_SIZE,
    )
}

/// Fold the deposit accumulator into the current field and zero it.
pub fn merge_shader() -> String {
    format!(
        r#"{uniforms}
@group(0) @binding(0)
var<storage, read_write> deposits: array<atomic<u32>>;

@group(0) @binding(1)
var<storage, read_write> trail: array<f32>;

@group(0) @binding(2)
var<uniform> u: StepUniforms;
{helpers}
@compute @workgroup_size({edge}, {edge})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    if global_id.x >= u.width || global_id.y >= u.height {{
        return;
    }}
    let idx = field_index(global_id.x, global_id.y);
    let fraction = atomicExchange(&deposits[2u * idx], 0u);
    let whole = bitcast<i32>(atomicExchange(&deposits[2u * idx + 1u], 0u));
    let deposited = f32(whole) + f32(fraction) / FRACTION_SCALE;
    trail[idx] = trail[idx] + deposited;
}}
"#,
        uniforms = STEP_UNIFORMS_WGSL,
        helpers = field_helpers_wgsl(),
        edge = FIELD_WORKGROUP_SIZE,
    )
}

/// 3x3 wrapped box blur blended by `diffuse_rate`, then decay floored at 0.
pub fn diffuse_shader() -> String {
    format!(
        r#"{uniforms}
@group(0) @binding(0)
var<storage, read> src: array<f32>;

@group(0) @binding(1)
var<storage, read_write> dst: array<f32>;

@group(0) @binding(2)
var<uniform> u: StepUniforms;
{helpers}
@compute @workgroup_size({edge}, {edge})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    if global_id.x >= u.width || global_id.y >= u.height {{
        return;
    }}
    let x = i32(global_id.x);
    let y = i32(global_id.y);

    var sum = 0.0;
    for (var dy = -1; dy <= 1; dy = dy + 1) {{
        for (var dx = -1; dx <= 1; dx = dx + 1) {{
            sum = sum + src[wrapped_index(x + dx, y + dy)];
        }}
    }}
    let mean = sum / 9.0;

    let idx = field_index(global_id.x, global_id.y);
    let original = src[idx];
    let blended = original * (1.0 - u.diffuse_rate) + mean * u.diffuse_rate;
    dst[idx] = max(0.0, blended - u.decay_rate);
}}
"#,
        uniforms = STEP_UNIFORMS_WGSL,
        helpers = field_helpers_wgsl(),
        edge = FIELD_WORKGROUP_SIZE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(())
    }

    #[test]
    fn test_sense_shader_valid() {
        let wgsl = sense_shader();
        validate_wgsl(&wgsl).expect("sense shader should be valid WGSL");
    }

    #[test]
    fn test_merge_shader_valid() {
        let wgsl = merge_shader();
        validate_wgsl(&wgsl).expect("merge shader should be valid WGSL");
    }

    #[test]
    fn test_diffuse_shader_valid() {
        let wgsl = diffuse_shader();
        validate_wgsl(&wgsl).expect("diffuse shader should be valid WGSL");
    }

    #[test]
    fn test_constants_are_substituted() {
        let wgsl = sense_shader();
        assert!(wgsl.contains("const FRACTION_SCALE: f32 = 4294967296.0;"));
        assert!(wgsl.contains("const MAX_DEPOSIT: f32 = 1000000000.0;"));
        assert!(wgsl.contains("const STREAM_TIE_BREAK: u32 = 0x5bd1e995u;"));
        assert!(wgsl.contains("@workgroup_size(256)"));
        assert!(merge_shader().contains("@workgroup_size(16, 16)"));
    }
}
