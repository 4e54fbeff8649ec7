//! Shared test fixtures and utilities for springbone crates.
//!
//! Provides Bevy test app builders, headless strand fixtures, and
//! deterministic RNG setup.

pub mod app;
pub mod fixtures;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use app::{minimal_test_app, sim_test_app};
pub use fixtures::{ANCHOR_NODE, spawn_strand, strand_poses, strand_sources};
pub use rng::{random_directions, seeded_rng};
