use std::path::Path;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_fixed_dt() -> f64 {
    1.0 / 60.0
}
const fn default_max_substeps() -> u32 {
    4
}
const fn default_true() -> bool {
    true
}
const fn default_direction() -> [f32; 3] {
    [0.0, -1.0, 0.0]
}
const fn default_bone_count() -> u32 {
    4
}
const fn default_bone_length() -> f32 {
    0.1
}
const fn default_frequency_hz() -> f32 {
    1.0
}

// ---------------------------------------------------------------------------
// ClockMode
// ---------------------------------------------------------------------------

/// How host frames are turned into simulation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Exactly one fixed step per host update, regardless of frame time.
    #[default]
    FixedPerUpdate,
    /// Frame deltas feed an accumulator; zero or more fixed steps per update.
    Accumulated,
}

// ---------------------------------------------------------------------------
// SpringBoneConfig
// ---------------------------------------------------------------------------

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
pub struct SpringBoneConfig {
    /// Fixed simulation timestep in seconds (default: 1/60).
    #[serde(default = "default_fixed_dt")]
    pub fixed_dt: f64,

    /// Cap on fixed steps per host update in accumulated mode (default: 4).
    #[serde(default = "default_max_substeps")]
    pub max_substeps: u32,

    #[serde(default)]
    pub clock: ClockMode,

    /// Step chains on the compute task pool instead of inline.
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Restore diverged chains to rest instead of leaving them untouched.
    #[serde(default = "default_true")]
    pub reset_on_divergence: bool,
}

impl Default for SpringBoneConfig {
    fn default() -> Self {
        Self {
            fixed_dt: default_fixed_dt(),
            max_substeps: default_max_substeps(),
            clock: ClockMode::default(),
            parallel: true,
            reset_on_divergence: true,
        }
    }
}

impl SpringBoneConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_dt > 0.0 && self.fixed_dt.is_finite()) {
            return Err(ConfigError::InvalidTimestep(self.fixed_dt));
        }
        if self.max_substeps == 0 {
            return Err(ConfigError::ZeroSubsteps);
        }
        Ok(())
    }

    /// Fixed timestep as the solver's `f32`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn fixed_dt_f32(&self) -> f32 {
        self.fixed_dt as f32
    }

    /// Simulation rate in Hz.
    pub fn step_hz(&self) -> f64 {
        1.0 / self.fixed_dt
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// RigConfig
// ---------------------------------------------------------------------------

/// Sinusoidal anchor motion used by demos and the CLI to drive a chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Peak displacement along each axis, in meters.
    pub amplitude: [f32; 3],

    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f32,
}

/// One straight chain of equally long bones hanging from a fixed anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,

    /// World position of the anchor node.
    #[serde(default)]
    pub anchor: [f32; 3],

    /// Rest direction of the chain in world space (normalized on use).
    #[serde(default = "default_direction")]
    pub direction: [f32; 3],

    #[serde(default = "default_bone_count")]
    pub bone_count: u32,

    #[serde(default = "default_bone_length")]
    pub bone_length: f32,

    /// Named parameter preset (`hair`, `cloth`, `tail`, `accessory`, `rigid`).
    #[serde(default)]
    pub preset: Option<String>,

    // Per-field overrides applied on top of the preset.
    #[serde(default)]
    pub stiffness_force: Option<f32>,
    #[serde(default)]
    pub drag_force: Option<f32>,
    #[serde(default)]
    pub spring_force: Option<[f32; 3]>,
    #[serde(default)]
    pub radius: Option<f32>,

    #[serde(default)]
    pub motion: Option<MotionConfig>,
}

/// Sphere collider fixed in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColliderConfig {
    pub position: [f32; 3],
    pub radius: f32,
}

/// A full rig: a set of chains plus the colliders shared by all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    #[serde(default)]
    pub colliders: Vec<ColliderConfig>,
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn all_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

impl ChainConfig {
    /// Validate geometry and overrides. Preset names are resolved by the
    /// solver crate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let field = |f: &str| format!("chains.{}.{f}", self.name);
        if self.name.is_empty() {
            return Err(invalid("chains.name", "must not be empty"));
        }
        if self.bone_count == 0 {
            return Err(invalid(field("bone_count"), "must be >= 1"));
        }
        if !(self.bone_length > 0.0 && self.bone_length.is_finite()) {
            return Err(invalid(field("bone_length"), "must be > 0"));
        }
        if !all_finite(&self.anchor) {
            return Err(invalid(field("anchor"), "must be finite"));
        }
        let d = self.direction;
        let len_sq = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
        if !(len_sq > 1e-12 && len_sq.is_finite()) {
            return Err(invalid(field("direction"), "must be a non-zero vector"));
        }
        if let Some(drag) = self.drag_force
            && !(0.0..=1.0).contains(&drag)
        {
            return Err(invalid(field("drag_force"), "must be in [0, 1]"));
        }
        if let Some(stiffness) = self.stiffness_force
            && !stiffness.is_finite()
        {
            return Err(invalid(field("stiffness_force"), "must be finite"));
        }
        if let Some(spring) = self.spring_force
            && !all_finite(&spring)
        {
            return Err(invalid(field("spring_force"), "must be finite"));
        }
        if let Some(radius) = self.radius
            && !(radius >= 0.0 && radius.is_finite())
        {
            return Err(invalid(field("radius"), "must be >= 0"));
        }
        if let Some(motion) = &self.motion {
            if !all_finite(&motion.amplitude) {
                return Err(invalid(field("motion.amplitude"), "must be finite"));
            }
            if !(motion.frequency_hz >= 0.0 && motion.frequency_hz.is_finite()) {
                return Err(invalid(field("motion.frequency_hz"), "must be >= 0"));
            }
        }
        Ok(())
    }

    /// Total rest length of the chain.
    #[allow(clippy::cast_precision_loss)]
    pub fn total_length(&self) -> f32 {
        self.bone_count as f32 * self.bone_length
    }
}

impl RigConfig {
    /// Validate every chain and collider. Chain names must be unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, chain) in self.chains.iter().enumerate() {
            chain.validate()?;
            if self.chains[..i].iter().any(|c| c.name == chain.name) {
                return Err(invalid(
                    format!("chains.{}", chain.name),
                    "duplicate chain name",
                ));
            }
        }
        for (i, collider) in self.colliders.iter().enumerate() {
            if !all_finite(&collider.position) {
                return Err(invalid(format!("colliders[{i}].position"), "must be finite"));
            }
            if !(collider.radius >= 0.0 && collider.radius.is_finite()) {
                return Err(invalid(format!("colliders[{i}].radius"), "must be >= 0"));
            }
        }
        Ok(())
    }

    /// Total number of bones across all chains.
    pub fn bone_count(&self) -> usize {
        self.chains.iter().map(|c| c.bone_count as usize).sum()
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
