//! Shared rig definitions and helpers for springbone demos.

use std::f32::consts::TAU;

use bevy::prelude::World;
use nalgebra::Vector3;
use springbone_core::config::{ChainConfig, ColliderConfig, MotionConfig, RigConfig};
use springbone_core::types::ChainId;
use springbone_sim::SpringBoneWorld;

/// Ponytail swinging against two head colliders.
pub const PONYTAIL_RIG: &str = include_str!("../rigs/ponytail.toml");

/// Single heavy tail with a side-to-side wag.
pub const TAIL_RIG: &str = include_str!("../rigs/tail.toml");

/// Two light accessories with different stiffness.
pub const EARRINGS_RIG: &str = include_str!("../rigs/earrings.toml");

/// A skirt: `strands` cloth chains fanned around a hip collider.
///
/// Many independent chains make this the rig for executor comparisons.
#[must_use]
pub fn skirt_rig(strands: usize, bones_per_strand: u32) -> RigConfig {
    let chains = (0..strands)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let angle = TAU * i as f32 / strands as f32;
            let (s, c) = angle.sin_cos();
            ChainConfig {
                name: format!("skirt_{i:02}"),
                anchor: [0.18 * c, 1.0, 0.18 * s],
                direction: [0.25 * c, -1.0, 0.25 * s],
                bone_count: bones_per_strand,
                bone_length: 0.07,
                preset: Some("cloth".into()),
                stiffness_force: None,
                drag_force: None,
                spring_force: None,
                radius: None,
                motion: Some(MotionConfig {
                    amplitude: [0.04, 0.0, 0.02],
                    frequency_hz: 1.5,
                }),
            }
        })
        .collect();

    RigConfig {
        chains,
        colliders: vec![
            ColliderConfig {
                position: [-0.09, 0.8, 0.0],
                radius: 0.11,
            },
            ColliderConfig {
                position: [0.09, 0.8, 0.0],
                radius: 0.11,
            },
        ],
    }
}

/// Tip (last bone endpoint) of a registered chain.
#[must_use]
pub fn chain_tip(world: &World, id: ChainId) -> Option<Vector3<f32>> {
    let sb = world.get_resource::<SpringBoneWorld>()?;
    let bones = sb.scheduler.chain(id)?.bones().ok()?;
    bones.last().map(|b| b.current_endpoint)
}

/// Largest deviation of any bone from its rest length, across all chains.
#[must_use]
pub fn max_length_error(world: &World) -> f32 {
    let Some(sb) = world.get_resource::<SpringBoneWorld>() else {
        return 0.0;
    };
    sb.scheduler
        .chains()
        .filter_map(|c| c.bones().ok())
        .flatten()
        .map(|b| ((b.current_endpoint - b.global_position).norm() - b.spring_length).abs())
        .fold(0.0, f32::max)
}
