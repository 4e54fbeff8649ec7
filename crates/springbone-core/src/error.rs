use thiserror::Error;

use crate::types::{ChainId, NodeId};

/// Top-level error type for the springbone crates.
#[derive(Debug, Error)]
pub enum SpringBoneError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid fixed_dt: {0} (must be > 0)")]
    InvalidTimestep(f64),

    #[error("max_substeps must be >= 1")]
    ZeroSubsteps,

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown parameter preset: {0}")]
    UnknownPreset(String),
}

/// Chain setup errors.
///
/// Raised while a chain is being laid out, never from the integrator itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    #[error("Chain has no bones")]
    EmptyChain,

    #[error("First bone of a chain must be a root")]
    FirstBoneNotRoot,

    #[error("Root/anchor count mismatch: roots={roots}, anchors={anchors}")]
    AnchorCountMismatch { roots: usize, anchors: usize },

    #[error("Bone {bone} has a zero-length tail")]
    DegenerateBoneAxis { bone: usize },

    #[error("Invalid parameter on bone {bone}: {message}")]
    InvalidParameter { bone: usize, message: String },

    #[error("Invalid collider {collider}: {message}")]
    InvalidCollider { collider: usize, message: String },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}

/// Runtime errors raised around a simulation step.
///
/// Copy so the scheduler can collect them per chain without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SimError {
    #[error("Invalid timestep: {0} (must be > 0)")]
    NonPositiveDt(f32),

    #[error("{0} already has a step in flight")]
    StepInFlight(ChainId),

    #[error("Step handle belongs to {got}, expected {expected}")]
    HandleMismatch { expected: ChainId, got: ChainId },

    #[error("{0} diverged: non-finite bone state")]
    Diverged(ChainId),

    #[error("{0} not found")]
    ChainNotFound(ChainId),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}
