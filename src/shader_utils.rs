//! Counter-based random functions shared by the CPU kernels and WGSL.
//!
//! Per-agent randomness is a pure function of `(agent_index, frame, seed)`.
//! There is no generator state to advance, so a stage gives the same result
//! no matter which order its invocations run in, and the CPU and GPU
//! backends draw the same numbers.
//!
//! # Available Functions
//!
//! - `hash(n: u32) -> u32` - Hash a u32 to pseudo-random u32
//! - `hash3(p: vec3<u32>) -> u32` - Hash three counters to pseudo-random u32
//! - `agent_random(index, frame, seed, stream) -> f32` - Per-agent draw

/// Stream used for the tie-break turn when all three sensors agree.
pub const STREAM_TIE_BREAK: u32 = 0x5bd1_e995;

/// Stream used for the per-step steering jitter.
pub const STREAM_JITTER: u32 = 0x27d4_eb2f;

/// WGSL code for random/hash functions.
///
/// Must stay bit-for-bit equivalent to the Rust functions below.
pub const RANDOM_WGSL: &str = r#"
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

fn hash3(p: vec3<u32>) -> u32 {
    return hash(p.x + hash(p.y + hash(p.z)));
}

// Random float in [0, 1]
fn agent_random(index: u32, frame: u32, seed: u32, stream: u32) -> f32 {
    return f32(hash3(vec3<u32>(index, frame, seed ^ stream))) / 4294967295.0;
}
"#;

/// Hash a u32 to a pseudo-random u32.
#[inline]
pub fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Hash three counters to a pseudo-random u32.
#[inline]
pub fn hash3(x: u32, y: u32, z: u32) -> u32 {
    hash(x.wrapping_add(hash(y.wrapping_add(hash(z)))))
}

/// Random float in [0, 1] for one agent, one frame and one stream.
#[inline]
pub fn agent_random(index: u32, frame: u32, seed: u32, stream: u32) -> f32 {
    hash3(index, frame, seed ^ stream) as f32 / 4_294_967_295.0
}
