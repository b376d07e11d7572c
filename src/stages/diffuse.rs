//! Deposit merge and diffusion/decay: one invocation per field cell.
//!
//! Merge folds the frame's accumulated deposits into the current field.
//! Diffusion then reads the merged current field and writes the next one:
//!
//! ```text
//! avg  = mean of the 3x3 wrapped neighbourhood
//! next = max(0, mix(orig, avg, diffuse_rate) - decay_rate)
//! ```

use crate::field::{DepositAccumulator, FieldLayout};
use crate::uniforms::StepUniforms;

/// Fold one cell's pending deposit into the current field.
#[inline]
pub fn merge_cell(index: usize, current: &mut f32, deposits: &DepositAccumulator) {
    *current += deposits.take(index);
}

/// Mean of the 3x3 neighbourhood around `(x, y)`, wrapping at the edges.
pub fn neighborhood_mean(current: &[f32], layout: FieldLayout, x: u32, y: u32) -> f32 {
    let (x, y) = (x as i32, y as i32);
    let mut sum = 0.0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += current[layout.wrapped_index(x + dx, y + dy)];
        }
    }
    sum / 9.0
}

/// Blend toward the neighbourhood mean, then subtract decay and floor at zero.
#[inline]
pub fn blend_and_decay(original: f32, mean: f32, diffuse_rate: f32, decay_rate: f32) -> f32 {
    let blended = original * (1.0 - diffuse_rate) + mean * diffuse_rate;
    (blended - decay_rate).max(0.0)
}

/// Next value of the cell at `index`.
pub fn diffuse_cell(index: usize, current: &[f32], u: &StepUniforms) -> f32 {
    let layout = u.layout();
    let x = (index % layout.width as usize) as u32;
    let y = (index / layout.width as usize) as u32;
    blend_and_decay(
        current[index],
        neighborhood_mean(current, layout, x, y),
        u.diffuse_rate,
        u.decay_rate,
    )
}
