//! Chain fixtures for headless and ECS tests.

use bevy::prelude::*;
use nalgebra::{Isometry3, Vector3};
use springbone_chain::{BoneSource, PoseMap};
use springbone_core::error::SetupError;
use springbone_core::types::NodeId;
use springbone_solver::BoneParams;
use springbone_sim::{ChainDescriptor, register_chain};

/// Anchor node used by [`strand_sources`].
pub const ANCHOR_NODE: NodeId = NodeId(0);

/// `n` bones of `length` hanging along -Y from [`ANCHOR_NODE`].
///
/// Bone `i` is node `i + 1`.
pub fn strand_sources(n: usize, length: f32, params: BoneParams) -> Vec<BoneSource> {
    let tail = Vector3::new(0.0, -length, 0.0);
    (0..n)
        .map(|i| {
            let node = NodeId(i as u64 + 1);
            if i == 0 {
                BoneSource::root(node, ANCHOR_NODE, Isometry3::identity(), tail, params)
            } else {
                BoneSource::child(node, Isometry3::translation(0.0, -length, 0.0), tail, params)
            }
        })
        .collect()
}

/// Pose table holding only [`ANCHOR_NODE`] at `anchor`.
pub fn strand_poses(anchor: Isometry3<f32>) -> PoseMap {
    PoseMap::new().with(ANCHOR_NODE, anchor)
}

/// Spawn an anchor entity at `origin` with `n` child bones along -Y and
/// register them as one chain.
pub fn spawn_strand(
    world: &mut World,
    origin: Vec3,
    n: usize,
    length: f32,
    params: BoneParams,
) -> Result<(Entity, Vec<Entity>), SetupError> {
    let anchor = world.spawn(Transform::from_translation(origin)).id();
    let step = Vec3::new(0.0, -length, 0.0);
    let mut parent = anchor;
    let mut bones = Vec::with_capacity(n);
    for i in 0..n {
        let offset = if i == 0 { Vec3::ZERO } else { step };
        let bone = world
            .spawn((Transform::from_translation(offset), ChildOf(parent)))
            .id();
        bones.push(bone);
        parent = bone;
    }
    register_chain(
        world,
        &ChainDescriptor::strand(anchor, bones.iter().copied(), step, params),
    )?;
    Ok((anchor, bones))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::sim_test_app;
    use springbone_chain::ChainController;
    use springbone_core::types::ChainId;
    use springbone_sim::{SpringBone, SpringBoneWorld};

    #[test]
    fn strand_sources_set_up() {
        let sources = strand_sources(4, 0.5, BoneParams::inert());
        assert_eq!(sources.len(), 4);
        assert_eq!(sources[0].anchor, Some(ANCHOR_NODE));
        assert!(sources[3].anchor.is_none());

        let poses = strand_poses(Isometry3::translation(0.0, 2.0, 0.0));
        let c = ChainController::setup(ChainId(0), &sources, &[], &poses).unwrap();
        let tip = c.bones().unwrap()[3].current_endpoint;
        assert!((tip.y - 0.0).abs() < 1e-5);
    }

    #[test]
    fn spawn_strand_registers() {
        let mut app = sim_test_app();
        let (_, bones) =
            spawn_strand(app.world_mut(), Vec3::Y, 3, 0.2, BoneParams::default()).unwrap();
        assert_eq!(bones.len(), 3);
        assert!(app.world().get::<SpringBone>(bones[2]).is_some());
        assert_eq!(app.world().resource::<SpringBoneWorld>().scheduler.bone_count(), 3);
    }
}
