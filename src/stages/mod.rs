//! Per-invocation kernels for the three compute stages.
//!
//! These are the CPU reference versions of the WGSL entry points in
//! [`gpu::shaders`](crate::gpu::shaders). A backend decides how invocations
//! are scheduled; the kernels only touch the slot they are handed plus the
//! shared read-only field and atomic accumulator.

pub mod diffuse;
pub mod sense;

pub use diffuse::{blend_and_decay, diffuse_cell, merge_cell, neighborhood_mean};
pub use sense::{advance, choose_turn, normalize_heading, sense, sense_and_move, Turn};
