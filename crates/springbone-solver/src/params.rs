//! Per-bone physical parameters and named presets.
//!
//! All force terms are per-step displacements in meters: the integrator
//! scales them by `1/dt²` and multiplies back by `dt²`, so a stiffness of
//! `0.02` pulls the tip 2 cm toward its rest direction every step.

use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use springbone_core::config::ChainConfig;
use springbone_core::error::{ConfigError, SetupError};

// ---------------------------------------------------------------------------
// BoneParams
// ---------------------------------------------------------------------------

/// Tunable physical parameters of one bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneParams {
    /// Pull toward the rest direction.
    pub stiffness_force: f32,
    /// Fraction of the previous step's velocity removed each step, in `[0, 1]`.
    pub drag_force: f32,
    /// Constant world-space push (gravity, wind).
    pub spring_force: Vector3<f32>,
    /// Collision radius of the bone tip.
    pub radius: f32,
}

impl Default for BoneParams {
    fn default() -> Self {
        ParamPreset::Hair.params()
    }
}

impl BoneParams {
    /// Parameters with every force zeroed. The bone keeps whatever velocity
    /// it starts with.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            stiffness_force: 0.0,
            drag_force: 0.0,
            spring_force: Vector3::zeros(),
            radius: 0.0,
        }
    }

    #[must_use]
    pub const fn with_stiffness(mut self, stiffness_force: f32) -> Self {
        self.stiffness_force = stiffness_force;
        self
    }

    #[must_use]
    pub const fn with_drag(mut self, drag_force: f32) -> Self {
        self.drag_force = drag_force;
        self
    }

    #[must_use]
    pub const fn with_spring(mut self, spring_force: Vector3<f32>) -> Self {
        self.spring_force = spring_force;
        self
    }

    #[must_use]
    pub const fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Check ranges for the bone at index `bone`.
    pub fn validate(&self, bone: usize) -> Result<(), SetupError> {
        let fail = |message: &str| {
            Err(SetupError::InvalidParameter {
                bone,
                message: message.to_string(),
            })
        };
        if !self.stiffness_force.is_finite() {
            return fail("stiffness_force must be finite");
        }
        if !(0.0..=1.0).contains(&self.drag_force) {
            return fail("drag_force must be in [0, 1]");
        }
        if !self.spring_force.iter().all(|c| c.is_finite()) {
            return fail("spring_force must be finite");
        }
        if !(self.radius >= 0.0 && self.radius.is_finite()) {
            return fail("radius must be >= 0");
        }
        Ok(())
    }

    /// Resolve a chain's preset and apply its per-field overrides.
    pub fn from_chain_config(chain: &ChainConfig) -> Result<Self, ConfigError> {
        let mut params = match chain.preset.as_deref() {
            Some(name) => name.parse::<ParamPreset>()?.params(),
            None => Self::default(),
        };
        if let Some(stiffness) = chain.stiffness_force {
            params.stiffness_force = stiffness;
        }
        if let Some(drag) = chain.drag_force {
            params.drag_force = drag;
        }
        if let Some([x, y, z]) = chain.spring_force {
            params.spring_force = Vector3::new(x, y, z);
        }
        if let Some(radius) = chain.radius {
            params.radius = radius;
        }
        Ok(params)
    }
}

// ---------------------------------------------------------------------------
// ParamPreset
// ---------------------------------------------------------------------------

/// Named starting points for common secondary-motion setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamPreset {
    Hair,
    Cloth,
    Tail,
    Accessory,
    /// Snaps back to rest every step.
    Rigid,
}

impl ParamPreset {
    pub const ALL: [Self; 5] = [
        Self::Hair,
        Self::Cloth,
        Self::Tail,
        Self::Accessory,
        Self::Rigid,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hair => "hair",
            Self::Cloth => "cloth",
            Self::Tail => "tail",
            Self::Accessory => "accessory",
            Self::Rigid => "rigid",
        }
    }

    #[must_use]
    pub fn params(self) -> BoneParams {
        let (stiffness_force, drag_force, gravity, radius) = match self {
            Self::Hair => (0.02, 0.4, 0.002, 0.01),
            Self::Cloth => (0.005, 0.2, 0.004, 0.02),
            Self::Tail => (0.05, 0.5, 0.001, 0.03),
            Self::Accessory => (0.01, 0.3, 0.003, 0.01),
            Self::Rigid => (1.0, 1.0, 0.0, 0.0),
        };
        BoneParams {
            stiffness_force,
            drag_force,
            spring_force: Vector3::new(0.0, -gravity, 0.0),
            radius,
        }
    }
}

impl FromStr for ParamPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.name() == lower)
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}

impl fmt::Display for ParamPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
