//! Tunable simulation parameters.
//!
//! [`SimulationParameters`] is a plain value owned by the controller. It is
//! read once at the start of every step and copied into the per-step
//! uniforms, so edits made between frames take effect on the next `step`.
//!
//! # Example
//!
//! ```ignore
//! let params = SimulationParameters::default()
//!     .with_trail_weight(1.0)
//!     .with_decay_rate(0.01)
//!     .with_sensor_size(3);
//! controller.set_parameters(params);
//! ```
//!
//! # Ranges
//!
//! The ranges in [`SimulationParameters::ranges`] are the slider bounds of a
//! parameter UI. The core does not enforce them: out-of-range values are
//! accepted and simply produce odd-looking trails. UI callers that want the
//! bounds enforced use [`SimulationParameters::clamped`].

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Inclusive UI range for a single parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamRange {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
}

impl ParamRange {
    const fn new(name: &'static str, min: f32, max: f32) -> Self {
        Self { name, min, max }
    }

    /// Whether `value` lies inside the range.
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const TRAIL_WEIGHT_RANGE: ParamRange = ParamRange::new("trail_weight", 0.0, 3.0);
pub const DECAY_RATE_RANGE: ParamRange = ParamRange::new("decay_rate", 0.0, 0.1);
pub const DIFFUSE_RATE_RANGE: ParamRange = ParamRange::new("diffuse_rate", 0.0, 1.0);
pub const MOVE_SPEED_RANGE: ParamRange = ParamRange::new("move_speed", 0.0, 0.01);
pub const TURN_SPEED_RANGE: ParamRange = ParamRange::new("turn_speed", 0.0, 1.5);
pub const SENSOR_ANGLE_RANGE: ParamRange = ParamRange::new("sensor_angle", 0.0, 1.5);
pub const SENSOR_DISTANCE_RANGE: ParamRange = ParamRange::new("sensor_distance", 0.0, 0.05);
pub const SENSOR_SIZE_RANGE: ParamRange = ParamRange::new("sensor_size", 1.0, 10.0);

/// Live-editable parameters read by both compute stages.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    /// Trail intensity an agent adds to its cell every step.
    pub trail_weight: f32,
    /// Amount subtracted from every cell per step (floored at zero).
    pub decay_rate: f32,
    /// Blend factor between a cell and its 3x3 average.
    pub diffuse_rate: f32,
    /// Distance moved per step, in normalized field units.
    pub move_speed: f32,
    /// Turning rate in radians per unit time.
    pub turn_speed: f32,
    /// Angle between the centre sensor and each side sensor, radians.
    pub sensor_angle: f32,
    /// Distance from the agent to its sensors, normalized field units.
    pub sensor_distance: f32,
    /// Half-width of the square each sensor sums over, in cells.
    pub sensor_size: i32,
    /// Bound on the random heading jitter applied every step, radians.
    pub steering_noise: f32,
    /// Time advanced per step; scales turning only.
    pub time_step: f32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            trail_weight: 0.05,
            decay_rate: 0.005,
            diffuse_rate: 0.1,
            move_speed: 0.001,
            turn_speed: 1.3,
            sensor_angle: 0.5,
            sensor_distance: 0.005,
            sensor_size: 2,
            steering_noise: 0.05,
            time_step: 1.0 / 60.0,
        }
    }
}

impl SimulationParameters {
    pub fn with_trail_weight(mut self, trail_weight: f32) -> Self {
        self.trail_weight = trail_weight;
        self
    }

    pub fn with_decay_rate(mut self, decay_rate: f32) -> Self {
        self.decay_rate = decay_rate;
        self
    }

    pub fn with_diffuse_rate(mut self, diffuse_rate: f32) -> Self {
        self.diffuse_rate = diffuse_rate;
        self
    }

    pub fn with_move_speed(mut self, move_speed: f32) -> Self {
        self.move_speed = move_speed;
        self
    }

    pub fn with_turn_speed(mut self, turn_speed: f32) -> Self {
        self.turn_speed = turn_speed;
        self
    }

    pub fn with_sensor_angle(mut self, sensor_angle: f32) -> Self {
        self.sensor_angle = sensor_angle;
        self
    }

    pub fn with_sensor_distance(mut self, sensor_distance: f32) -> Self {
        self.sensor_distance = sensor_distance;
        self
    }

    pub fn with_sensor_size(mut self, sensor_size: i32) -> Self {
        self.sensor_size = sensor_size;
        self
    }

    /// Set the heading jitter bound. 0.0 disables jitter.
    pub fn with_steering_noise(mut self, steering_noise: f32) -> Self {
        self.steering_noise = steering_noise;
        self
    }

    pub fn with_time_step(mut self, time_step: f32) -> Self {
        self.time_step = time_step;
        self
    }

    /// Documented UI ranges, in field order.
    pub fn ranges() -> [ParamRange; 8] {
        [
            TRAIL_WEIGHT_RANGE,
            DECAY_RATE_RANGE,
            DIFFUSE_RATE_RANGE,
            MOVE_SPEED_RANGE,
            TURN_SPEED_RANGE,
            SENSOR_ANGLE_RANGE,
            SENSOR_DISTANCE_RANGE,
            SENSOR_SIZE_RANGE,
        ]
    }

    fn ranged_values(&self) -> [f32; 8] {
        [
            self.trail_weight,
            self.decay_rate,
            self.diffuse_rate,
            self.move_speed,
            self.turn_speed,
            self.sensor_angle,
            self.sensor_distance,
            self.sensor_size as f32,
        ]
    }

    /// Names of the parameters that lie outside their UI range.
    pub fn out_of_range(&self) -> Vec<&'static str> {
        Self::ranges()
            .iter()
            .zip(self.ranged_values())
            .filter(|(range, value)| !range.contains(*value))
            .map(|(range, _)| range.name)
            .collect()
    }

    /// A copy with every ranged parameter clamped to its UI bounds.
    pub fn clamped(&self) -> Self {
        let clamp = |range: ParamRange, v: f32| v.clamp(range.min, range.max);
        Self {
            trail_weight: clamp(TRAIL_WEIGHT_RANGE, self.trail_weight),
            decay_rate: clamp(DECAY_RATE_RANGE, self.decay_rate),
            diffuse_rate: clamp(DIFFUSE_RATE_RANGE, self.diffuse_rate),
            move_speed: clamp(MOVE_SPEED_RANGE, self.move_speed),
            turn_speed: clamp(TURN_SPEED_RANGE, self.turn_speed),
            sensor_angle: clamp(SENSOR_ANGLE_RANGE, self.sensor_angle),
            sensor_distance: clamp(SENSOR_DISTANCE_RANGE, self.sensor_distance),
            sensor_size: self
                .sensor_size
                .clamp(SENSOR_SIZE_RANGE.min as i32, SENSOR_SIZE_RANGE.max as i32),
            ..*self
        }
    }

    /// Parse a JSON preset. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to a pretty-printed JSON preset.
    pub fn to_json(&self) -> Result<String, SimulationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
