//! Bevy integration for springbone chains.
//!
//! [`SpringBoneSimPlugin`] adds the core plugin, a [`SpringBoneWorld`]
//! resource owning the batch scheduler, and one system group per
//! [`SpringBoneSet`]. Chains are registered from entity hierarchies with
//! [`register_chain`] or spawned from configuration with [`RigBuilder`].

pub mod bridge;
pub mod builder;
pub mod components;
pub mod stats;
pub mod systems;
pub mod world;

use bevy::prelude::*;
use springbone_core::config::SpringBoneConfig;
use springbone_core::{SpringBoneCorePlugin, SpringBoneSet};

pub use bridge::{BoneDescriptor, ChainDescriptor, register_chain, unregister_chain};
pub use builder::{RigBuilder, SpawnedChain, SpawnedRig, spawn_chain, spawn_collider, spawn_rig};
pub use components::{AnchorMotion, SpringAnchor, SpringBone, SpringBoneCollider};
pub use stats::SpringBoneStats;
pub use systems::PendingSteps;
pub use world::{ChainEntities, SpringBoneWorld};

// ---------------------------------------------------------------------------
// SpringBoneSimPlugin
// ---------------------------------------------------------------------------

/// Top-level plugin for spring-bone simulation in a Bevy app.
///
/// Insert a [`SpringBoneConfig`] before adding the plugin to choose the
/// clock mode and executor. Insert a [`SpringBoneWorld`] first to supply a
/// custom scheduler.
pub struct SpringBoneSimPlugin;

impl Plugin for SpringBoneSimPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<SpringBoneCorePlugin>() {
            app.add_plugins(SpringBoneCorePlugin);
        }
        if !app.world().contains_resource::<SpringBoneWorld>() {
            let world = SpringBoneWorld::from_config(app.world().resource::<SpringBoneConfig>());
            info!(
                "springbone: using {} executor",
                world.scheduler.executor_name()
            );
            app.insert_resource(world);
        }

        app.init_resource::<SpringBoneStats>()
            .init_resource::<PendingSteps>()
            .add_systems(
                Update,
                (
                    systems::advance_clock,
                    systems::drive_anchor_motion,
                    systems::refresh_chains,
                )
                    .chain()
                    .in_set(SpringBoneSet::Refresh),
            )
            .add_systems(
                Update,
                systems::simulate_chains.in_set(SpringBoneSet::Simulate),
            )
            .add_systems(
                Update,
                systems::write_back_chains.in_set(SpringBoneSet::Writeback),
            );
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        AnchorMotion, ChainDescriptor, RigBuilder, SpawnedChain, SpawnedRig, SpringAnchor,
        SpringBone, SpringBoneCollider, SpringBoneSimPlugin, SpringBoneStats, SpringBoneWorld,
        register_chain, unregister_chain,
    };

    pub use springbone_chain::prelude::*;
    pub use springbone_core::prelude::*;
    pub use springbone_solver::prelude::*;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
