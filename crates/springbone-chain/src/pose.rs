//! Narrow read/write interfaces onto the host scene graph.

use std::collections::HashMap;

use nalgebra::Isometry3;
use springbone_core::types::NodeId;

/// Reads world poses of host nodes.
pub trait PoseSource {
    /// World pose of `node`, or `None` if the host does not know it.
    fn world_pose(&self, node: NodeId) -> Option<Isometry3<f32>>;
}

/// Receives simulated world poses for host nodes.
pub trait PoseSink {
    fn set_world_pose(&mut self, node: NodeId, pose: &Isometry3<f32>);
}

// ---------------------------------------------------------------------------
// PoseMap
// ---------------------------------------------------------------------------

/// In-memory pose table implementing both [`PoseSource`] and [`PoseSink`].
///
/// Used by headless hosts and tests; ECS hosts snapshot into one before a
/// refresh.
#[derive(Debug, Clone, Default)]
pub struct PoseMap {
    poses: HashMap<NodeId, Isometry3<f32>>,
}

impl PoseMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, node: NodeId, pose: Isometry3<f32>) -> Self {
        self.insert(node, pose);
        self
    }

    pub fn insert(&mut self, node: NodeId, pose: Isometry3<f32>) -> Option<Isometry3<f32>> {
        self.poses.insert(node, pose)
    }

    pub fn remove(&mut self, node: NodeId) -> Option<Isometry3<f32>> {
        self.poses.remove(&node)
    }

    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&Isometry3<f32>> {
        self.poses.get(&node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Isometry3<f32>)> {
        self.poses.iter().map(|(k, v)| (*k, v))
    }

    pub fn clear(&mut self) {
        self.poses.clear();
    }
}

impl PoseSource for PoseMap {
    fn world_pose(&self, node: NodeId) -> Option<Isometry3<f32>> {
        self.poses.get(&node).copied()
    }
}

impl PoseSink for PoseMap {
    fn set_world_pose(&mut self, node: NodeId, pose: &Isometry3<f32>) {
        self.poses.insert(node, *pose);
    }
}

impl FromIterator<(NodeId, Isometry3<f32>)> for PoseMap {
    fn from_iter<I: IntoIterator<Item = (NodeId, Isometry3<f32>)>>(iter: I) -> Self {
        Self {
            poses: iter.into_iter().collect(),
        }
    }
}
