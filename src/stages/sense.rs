//! Sensing/movement stage: one invocation per agent.
//!
//! Each invocation reads the current field, updates its own agent slot and
//! scatters one deposit into the [`DepositAccumulator`]. Invocations share
//! nothing but the read-only field and the atomic accumulator, so any
//! interleaving gives the same result.
//!
//! The WGSL twin of this module lives in `gpu/shaders.rs`.

use std::f32::consts::TAU;

use glam::Vec2;

use crate::agent::Agent;
use crate::field::{raw_cell, DepositAccumulator};
use crate::shader_utils::{agent_random, STREAM_JITTER, STREAM_TIE_BREAK};
use crate::uniforms::StepUniforms;

/// Outcome of comparing the three sensor readings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Turn {
    Left,
    Right,
    Straight,
    /// All three readings equal: pick a random turn.
    Random,
}

/// Decide which way to turn from the left, centre and right readings.
#[inline]
pub fn choose_turn(left: f32, center: f32, right: f32) -> Turn {
    if left > center && left > right {
        Turn::Left
    } else if right > center && right > left {
        Turn::Right
    } else if left == center && center == right {
        Turn::Random
    } else {
        Turn::Straight
    }
}

/// Sum of the `(2 * sensor_size + 1)²` cells around a probe point.
///
/// The probe sits `sensor_distance` from `position` along `angle`. Cells
/// outside the field wrap around.
pub fn sense(field: &[f32], u: &StepUniforms, position: Vec2, angle: f32) -> f32 {
    let layout = u.layout();
    let probe = position + Vec2::from_angle(angle) * u.sensor_distance;
    let cx = raw_cell(probe.x, u.width);
    let cy = raw_cell(probe.y, u.height);
    let r = u.sensor_size;

    let mut sum = 0.0;
    for dy in -r..=r {
        for dx in -r..=r {
            sum += field[layout.wrapped_index(cx.saturating_add(dx), cy.saturating_add(dy))];
        }
    }
    sum
}

/// Map any finite heading into [0, 2π).
#[inline]
pub fn normalize_heading(heading: f32) -> f32 {
    let h = heading - TAU * (heading / TAU).floor();
    if (0.0..TAU).contains(&h) {
        h
    } else {
        0.0
    }
}

/// Move `speed` along `heading`, bouncing off the edges of [0, 1]².
///
/// An axis that would leave the unit square is clamped and its direction
/// component negated. Returns the new position and normalized heading.
pub fn advance(position: Vec2, heading: f32, speed: f32) -> (Vec2, f32) {
    let mut dir = Vec2::from_angle(heading);
    let mut next = position + dir * speed;
    let mut bounced = false;

    if next.x < 0.0 || next.x > 1.0 {
        next.x = next.x.clamp(0.0, 1.0);
        dir.x = -dir.x;
        bounced = true;
    }
    if next.y < 0.0 || next.y > 1.0 {
        next.y = next.y.clamp(0.0, 1.0);
        dir.y = -dir.y;
        bounced = true;
    }

    let heading = if bounced { dir.y.atan2(dir.x) } else { heading };
    (next, normalize_heading(heading))
}

/// Advance one agent by one step and deposit at its new position.
pub fn sense_and_move(
    index: u32,
    agent: &mut Agent,
    field: &[f32],
    deposits: &DepositAccumulator,
    u: &StepUniforms,
) {
    let left = sense(field, u, agent.position, agent.heading + u.sensor_angle);
    let center = sense(field, u, agent.position, agent.heading);
    let right = sense(field, u, agent.position, agent.heading - u.sensor_angle);

    let turn_step = u.turn_step();
    let mut heading = agent.heading
        + match choose_turn(left, center, right) {
            Turn::Left => turn_step,
            Turn::Right => -turn_step,
            Turn::Straight => 0.0,
            Turn::Random => {
                let r = agent_random(index, u.frame, u.seed, STREAM_TIE_BREAK);
                (r * 2.0 - 1.0) * turn_step
            }
        };

    if u.steering_noise != 0.0 {
        let r = agent_random(index, u.frame, u.seed, STREAM_JITTER);
        heading += (r * 2.0 - 1.0) * u.steering_noise;
    }

    let (position, heading) = advance(agent.position, heading, u.move_speed);
    agent.position = position;
    agent.heading = heading;

    deposits.add(u.layout().deposit_index(position), u.trail_weight);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldLayout;
    use crate::params::SimulationParameters;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn uniforms(params: SimulationParameters, width: u32, height: u32) -> StepUniforms {
        StepUniforms::new(&params, FieldLayout::new(width, height), 1, 0, 42)
    }

    // ========== Turn Decision Tests ==========

    #[test]
    fn test_choose_turn() {
        assert_eq!(choose_turn(2.0, 1.0, 1.0), Turn::Left);
        assert_eq!(choose_turn(1.0, 1.0, 2.0), Turn::Right);
        assert_eq!(choose_turn(1.0, 2.0, 1.0), Turn::Straight);
        assert_eq!(choose_turn(0.0, 0.0, 0.0), Turn::Random);
        // Ties between the two strongest never turn toward either.
        assert_eq!(choose_turn(2.0, 2.0, 1.0), Turn::Straight);
        assert_eq!(choose_turn(2.0, 1.0, 2.0), Turn::Straight);
    }

    // ========== Sensing Tests ==========

    #[test]
    fn test_sense_sums_neighborhood() {
        let params = SimulationParameters::default()
            .with_sensor_distance(0.0)
            .with_sensor_size(1);
        let u = uniforms(params, 8, 8);
        let field = vec![1.0; 64];
        assert_eq!(sense(&field, &u, Vec2::splat(0.5), 0.0), 9.0);
    }

    #[test]
    fn test_sense_wraps_at_edges() {
        let params = SimulationParameters::default()
            .with_sensor_distance(0.0)
            .with_sensor_size(1);
        let u = uniforms(params, 4, 4);
        let layout = FieldLayout::new(4, 4);
        let mut field = vec![0.0; 16];
        // Opposite corner of the torus is adjacent to (0, 0).
        field[layout.index(3, 3)] = 5.0;
        assert_eq!(sense(&field, &u, Vec2::new(0.1, 0.1), 0.0), 5.0);
    }

    #[test]
    fn test_sense_probe_wraps_like_shifted_position() {
        let params = SimulationParameters::default()
            .with_sensor_distance(0.25)
            .with_sensor_size(0);
        let u = uniforms(params, 8, 8);
        let field: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let a = sense(&field, &u, Vec2::new(0.875, 0.5), 0.0);
        let b = sense(&field, &u, Vec2::new(0.875 - 1.0, 0.5), 0.0);
        assert_eq!(a, b);
    }

    // ========== Movement Tests ==========

    #[test]
    fn test_advance_inside() {
        let (p, h) = advance(Vec2::splat(0.5), 0.0, 0.1);
        assert!((p - Vec2::new(0.6, 0.5)).length() < 1e-6);
        assert_eq!(h, 0.0);
    }

    #[test]
    fn test_advance_bounces_off_right_edge() {
        let (p, h) = advance(Vec2::new(0.999, 0.5), 0.0, 0.01);
        assert!((0.0..=1.0).contains(&p.x));
        assert_eq!(p.x, 1.0);
        assert!((p.y - 0.5).abs() < 1e-6);
        assert!(Vec2::from_angle(h).x < 0.0, "heading {} still points right", h);
        assert!((h - PI).abs() < 1e-6);
    }

    #[test]
    fn test_advance_bounces_off_bottom_edge_keeps_x_component() {
        let heading = -FRAC_PI_2 + 0.3;
        let before = Vec2::from_angle(heading);
        let (p, h) = advance(Vec2::new(0.5, 0.001), heading, 0.05);
        let after = Vec2::from_angle(h);
        assert_eq!(p.y, 0.0);
        assert!(after.y > 0.0);
        assert!((after.x - before.x).abs() < 1e-5);
    }

    #[test]
    fn test_advance_corner_flips_both_axes() {
        let (p, h) = advance(Vec2::new(0.999, 0.999), PI / 4.0, 0.1);
        assert_eq!(p, Vec2::ONE);
        let dir = Vec2::from_angle(h);
        assert!(dir.x < 0.0 && dir.y < 0.0);
    }

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading(0.0), 0.0);
        assert!((normalize_heading(-FRAC_PI_2) - 3.0 * FRAC_PI_2).abs() < 1e-5);
        assert!((normalize_heading(TAU + 1.0) - 1.0).abs() < 1e-5);
        assert!(normalize_heading(-1e-9) < TAU);
    }

    // ========== Kernel Tests ==========

    #[test]
    fn test_sense_and_move_turns_toward_trail() {
        let params = SimulationParameters::default()
            .with_sensor_distance(0.25)
            .with_sensor_angle(FRAC_PI_2)
            .with_sensor_size(0)
            .with_move_speed(0.0)
            .with_turn_speed(1.0)
            .with_time_step(0.5)
            .with_steering_noise(0.0);
        let u = uniforms(params, 8, 8);
        let layout = FieldLayout::new(8, 8);
        let mut field = vec![0.0; 64];
        // Agent at the centre heading +x; trail one sensor distance along +y.
        field[layout.index(4, 6)] = 1.0;
        let deposits = DepositAccumulator::new(64).unwrap();
        let mut agent = Agent::new(Vec2::new(0.5625, 0.5625), 0.0);

        sense_and_move(0, &mut agent, &field, &deposits, &u);
        assert!((agent.heading - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sense_and_move_deposits_at_new_position() {
        let params = SimulationParameters::default()
            .with_trail_weight(1.0)
            .with_move_speed(0.25)
            .with_turn_speed(0.0)
            .with_steering_noise(0.0);
        let u = uniforms(params, 4, 4);
        let layout = FieldLayout::new(4, 4);
        let field = vec![0.0; 16];
        let deposits = DepositAccumulator::new(16).unwrap();
        let mut agent = Agent::new(Vec2::splat(0.5), 0.0);

        sense_and_move(0, &mut agent, &field, &deposits, &u);
        assert!((agent.position - Vec2::new(0.75, 0.5)).length() < 1e-6);
        assert_eq!(deposits.get(layout.index(3, 2)), 1.0);
        let total: f32 = (0..16).map(|i| deposits.get(i)).sum();
        assert_eq!(total, 1.0);
    }

    #[test]
    fn test_tie_break_is_bounded_by_turn_step() {
        let params = SimulationParameters::default()
            .with_move_speed(0.0)
            .with_turn_speed(1.0)
            .with_time_step(0.1)
            .with_steering_noise(0.0);
        let field = vec![0.0; 16];
        let deposits = DepositAccumulator::new(16).unwrap();
        for index in 0..200u32 {
            let u = uniforms(params, 4, 4);
            let mut agent = Agent::new(Vec2::splat(0.5), 1.0);
            sense_and_move(index, &mut agent, &field, &deposits, &u);
            assert!((agent.heading - 1.0).abs() <= 0.1 + 1e-6);
        }
    }

    #[test]
    fn test_steering_noise_is_bounded() {
        let params = SimulationParameters::default()
            .with_move_speed(0.0)
            .with_turn_speed(0.0)
            .with_steering_noise(0.2);
        let field = vec![0.0; 16];
        let deposits = DepositAccumulator::new(16).unwrap();
        let mut moved = false;
        for index in 0..200u32 {
            let u = uniforms(params, 4, 4);
            let mut agent = Agent::new(Vec2::splat(0.5), 2.0);
            sense_and_move(index, &mut agent, &field, &deposits, &u);
            assert!((agent.heading - 2.0).abs() <= 0.2 + 1e-6);
            moved |= agent.heading != 2.0;
        }
        assert!(moved);
    }
}
