//! Rig builder for constructing a fully configured Bevy [`App`].
//!
//! [`RigBuilder`] turns a [`RigConfig`] into spawned anchor, bone and
//! collider entities, registers every chain, and returns a ready-to-run
//! [`SpawnedRig`].
//!
//! # Example
//!
//! ```no_run
//! use springbone_core::config::RigConfig;
//! use springbone_sim::RigBuilder;
//!
//! let rig = RigConfig::from_toml_str(
//!     r#"
//!     [[chains]]
//!     name = "ponytail"
//!     preset = "hair"
//!     "#,
//! )
//! .unwrap();
//! let mut spawned = RigBuilder::new().with_rig(rig).build().unwrap();
//! spawned.run(60);
//! ```

use std::collections::HashMap;

use bevy::prelude::*;
use springbone_core::config::{ChainConfig, ColliderConfig, RigConfig, SpringBoneConfig};
use springbone_core::error::SpringBoneError;
use springbone_core::types::ChainId;
use springbone_solver::BoneParams;

use crate::SpringBoneSimPlugin;
use crate::bridge::{ChainDescriptor, register_chain};
use crate::components::{AnchorMotion, SpringBoneCollider};

// ---------------------------------------------------------------------------
// SpawnedRig
// ---------------------------------------------------------------------------

/// Entities created for one [`ChainConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedChain {
    pub id: ChainId,
    pub anchor: Entity,
    /// Bone entities from the anchor outward.
    pub bones: Vec<Entity>,
}

/// Result of building a rig: the Bevy app plus spawned entity handles.
pub struct SpawnedRig {
    pub app: App,
    /// Spawned chains, keyed by chain name.
    pub chains: HashMap<String, SpawnedChain>,
    pub colliders: Vec<Entity>,
}

impl SpawnedRig {
    #[must_use]
    pub fn chain(&self, name: &str) -> Option<&SpawnedChain> {
        self.chains.get(name)
    }

    /// Run `updates` app updates.
    pub fn run(&mut self, updates: u32) {
        for _ in 0..updates {
            self.app.update();
        }
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Spawn a static sphere collider.
pub fn spawn_collider(world: &mut World, config: &ColliderConfig) -> Entity {
    world
        .spawn((
            Name::new("springbone_collider"),
            Transform::from_translation(Vec3::from_array(config.position)),
            SpringBoneCollider::new(config.radius),
        ))
        .id()
}

/// Spawn and register one straight chain.
///
/// The chain collides with every collider already in the world.
pub fn spawn_chain(world: &mut World, config: &ChainConfig) -> Result<SpawnedChain, SpringBoneError> {
    config.validate()?;
    let params = BoneParams::from_chain_config(config)?;
    let origin = Vec3::from_array(config.anchor);
    let direction = Vec3::from_array(config.direction)
        .try_normalize()
        .unwrap_or(Vec3::NEG_Y);
    let step = direction * config.bone_length;

    let mut anchor_cmd = world.spawn((
        Name::new(format!("{}_anchor", config.name)),
        Transform::from_translation(origin),
    ));
    if let Some(motion) = config.motion {
        anchor_cmd.insert(AnchorMotion::new(
            origin,
            Vec3::from_array(motion.amplitude),
            motion.frequency_hz,
        ));
    }
    let anchor = anchor_cmd.id();

    let mut parent = anchor;
    let mut bones = Vec::with_capacity(config.bone_count as usize);
    for i in 0..config.bone_count {
        let offset = if i == 0 { Vec3::ZERO } else { step };
        let bone = world
            .spawn((
                Name::new(format!("{}_{i}", config.name)),
                Transform::from_translation(offset),
                ChildOf(parent),
            ))
            .id();
        bones.push(bone);
        parent = bone;
    }

    let descriptor = ChainDescriptor::strand(anchor, bones.iter().copied(), step, params);
    let id = register_chain(world, &descriptor)?;
    info!(
        "spawned chain '{}' as {id}: {} bones, preset {}",
        config.name,
        bones.len(),
        config.preset.as_deref().unwrap_or("default")
    );
    Ok(SpawnedChain { id, anchor, bones })
}

/// Spawn every collider, then every chain, of `rig`.
pub fn spawn_rig(
    world: &mut World,
    rig: &RigConfig,
) -> Result<(HashMap<String, SpawnedChain>, Vec<Entity>), SpringBoneError> {
    rig.validate()?;
    let colliders = rig.colliders.iter().map(|c| spawn_collider(world, c)).collect();
    let mut chains = HashMap::with_capacity(rig.chains.len());
    for chain in &rig.chains {
        chains.insert(chain.name.clone(), spawn_chain(world, chain)?);
    }
    Ok((chains, colliders))
}

// ---------------------------------------------------------------------------
// RigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for a complete headless spring-bone simulation.
pub struct RigBuilder {
    config: Option<SpringBoneConfig>,
    rig: RigConfig,
}

impl Default for RigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            config: None,
            rig: RigConfig {
                chains: Vec::new(),
                colliders: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SpringBoneConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the rig description.
    #[must_use]
    pub fn with_rig(mut self, rig: RigConfig) -> Self {
        self.rig = rig;
        self
    }

    #[must_use]
    pub fn with_chain(mut self, chain: ChainConfig) -> Self {
        self.rig.chains.push(chain);
        self
    }

    #[must_use]
    pub fn with_collider(mut self, collider: ColliderConfig) -> Self {
        self.rig.colliders.push(collider);
        self
    }

    /// Build the app, spawn the rig and register its chains.
    pub fn build(self) -> Result<SpawnedRig, SpringBoneError> {
        let mut app = App::new();
        if let Some(config) = self.config {
            config.validate()?;
            app.insert_resource(config);
        }
        app.add_plugins(SpringBoneSimPlugin);

        // Finalize plugin setup before spawning entities.
        app.finish();
        app.cleanup();

        let (chains, colliders) = spawn_rig(app.world_mut(), &self.rig)?;
        Ok(SpawnedRig {
            app,
            chains,
            colliders,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
