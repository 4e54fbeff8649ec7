//! Numeric core of the spring-bone runtime.
//!
//! A chain is a flat array of [`BoneState`]s. Each root bone hangs from a
//! [`ParentAnchor`]; every other bone hangs from the bone before it. The
//! [`ChainIntegrator`] advances the whole array by one verlet step, keeps
//! every bone at its rigid length, pushes tips out of sphere colliders and
//! rebuilds bone orientations from the new tip positions.
//!
//! # Architecture
//!
//! ```text
//! anchors ──┐
//! colliders ┼──► ChainIntegrator::integrate(bones, ..., dt) ──► bone poses
//! bones ────┘
//! ```
//!
//! Nothing here allocates per step, logs, or knows about threads.

pub mod integrator;
pub mod layout;
pub mod math;
pub mod params;
pub mod state;

pub use integrator::{ChainIntegrator, place_chain_at_rest};
pub use layout::ChainLayout;
pub use params::{BoneParams, ParamPreset};
pub use state::{BoneState, ColliderState, ParentAnchor};

pub mod prelude {
    pub use crate::{
        BoneParams, BoneState, ChainIntegrator, ChainLayout, ColliderState, ParamPreset,
        ParentAnchor, place_chain_at_rest,
    };
}
