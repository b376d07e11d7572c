//! Agent records and the population that owns them.
//!
//! Agents live in normalized field space: both position components are in
//! [0, 1] and map onto the trail field regardless of its resolution. The
//! record layout is shared with the WGSL `Agent` struct, so a population
//! uploads to the device as a plain byte copy.

use std::f32::consts::TAU;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::SimulationError;

/// One simulated particle.
///
/// `#[repr(C)]`, 16 bytes: matches
/// `struct Agent { position: vec2<f32>, heading: f32, _pad: f32 }`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Agent {
    /// Position in normalized field coordinates, [0, 1]².
    pub position: Vec2,
    /// Heading in radians, kept in [0, 2π).
    pub heading: f32,
    pub _pad: f32,
}

impl Agent {
    pub fn new(position: Vec2, heading: f32) -> Self {
        Self {
            position,
            heading,
            _pad: 0.0,
        }
    }

    /// Unit vector pointing along the heading.
    #[inline]
    pub fn direction(&self) -> Vec2 {
        Vec2::from_angle(self.heading)
    }

    /// Whether position and heading are finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.heading.is_finite()
    }
}

/// Where agents start when the population is (re)spawned.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum InitialDistribution {
    /// Every agent at the field centre.
    #[default]
    Center,
    /// Every agent at one point.
    Point(Vec2),
    /// Uniformly over the whole field.
    Uniform,
    /// Uniformly inside a disc around the centre.
    Disc { radius: f32 },
}

impl InitialDistribution {
    fn sample(&self, rng: &mut SmallRng) -> Vec2 {
        match *self {
            InitialDistribution::Center => Vec2::splat(0.5),
            InitialDistribution::Point(p) => p.clamp(Vec2::ZERO, Vec2::ONE),
            InitialDistribution::Uniform => Vec2::new(rng.gen(), rng.gen()),
            InitialDistribution::Disc { radius } => {
                let angle = rng.gen_range(0.0..TAU);
                // sqrt for uniform area density
                let r = radius * rng.gen::<f32>().sqrt();
                (Vec2::splat(0.5) + Vec2::from_angle(angle) * r).clamp(Vec2::ZERO, Vec2::ONE)
            }
        }
    }
}

/// Ownership container for the fixed-size agent population.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentPopulation {
    agents: Vec<Agent>,
}

impl AgentPopulation {
    /// Spawn `count` agents with uniformly random headings.
    ///
    /// Identical `(count, distribution, seed)` always produce an identical
    /// population.
    pub fn spawn(
        count: usize,
        distribution: InitialDistribution,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        let mut agents = Vec::new();
        agents.try_reserve_exact(count)?;

        let mut rng = SmallRng::seed_from_u64(seed);
        for _ in 0..count {
            let heading = rng.gen_range(0.0..TAU);
            let position = distribution.sample(&mut rng);
            agents.push(Agent::new(position, heading));
        }

        Ok(Self { agents })
    }

    /// Wrap an existing agent set.
    pub fn from_agents(agents: Vec<Agent>) -> Self {
        Self { agents }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn as_slice(&self) -> &[Agent] {
        &self.agents
    }

    /// Raw bytes for upload into an `array<Agent>` storage buffer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.agents)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }
}
