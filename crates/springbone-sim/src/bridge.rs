//! ECS-to-chain bridge: converts entity hierarchies into chain setup data,
//! implements the pose seams over Bevy transforms, and inserts spring-bone
//! marker components on the participating entities.

use std::collections::{HashMap, HashSet};

use bevy::ecs::system::SystemState;
use bevy::prelude::*;
use bevy::transform::helper::TransformHelper;
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use springbone_chain::{BoneSource, ColliderSpec, PoseMap, PoseSink, PoseSource};
use springbone_core::error::{SetupError, SimError};
use springbone_core::types::{ChainId, NodeId};
use springbone_solver::BoneParams;

use crate::components::{SpringAnchor, SpringBone, SpringBoneCollider};
use crate::world::{ChainEntities, SpringBoneWorld};

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

#[must_use]
pub fn vec3_to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

#[must_use]
pub fn vector_to_vec3(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

#[must_use]
pub fn quat_to_unit(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

#[must_use]
pub fn unit_to_quat(q: &UnitQuaternion<f32>) -> Quat {
    let c = q.quaternion().coords;
    Quat::from_xyzw(c.x, c.y, c.z, c.w)
}

/// Rigid part of a `Transform`. Scale is ignored.
#[must_use]
pub fn transform_to_isometry(t: &Transform) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::from(vec3_to_vector(t.translation)),
        quat_to_unit(t.rotation),
    )
}

/// Rigid part of a `GlobalTransform`. Scale is ignored.
#[must_use]
pub fn global_to_isometry(g: &GlobalTransform) -> Isometry3<f32> {
    let (_, rotation, translation) = g.to_scale_rotation_translation();
    Isometry3::from_parts(
        Translation3::from(vec3_to_vector(translation)),
        quat_to_unit(rotation),
    )
}

/// Write the rigid part of `pose` into `t`, keeping its scale.
pub fn apply_isometry(t: &mut Transform, pose: &Isometry3<f32>) {
    t.translation = vector_to_vec3(&pose.translation.vector);
    t.rotation = unit_to_quat(&pose.rotation);
}

/// Chain node id for an entity.
#[must_use]
pub fn entity_node(entity: Entity) -> NodeId {
    NodeId(entity.to_bits())
}

// ---------------------------------------------------------------------------
// Pose seams
// ---------------------------------------------------------------------------

/// [`PoseSource`] resolving nodes through the entity map and computing
/// world poses from the current `Transform` hierarchy.
///
/// Does not depend on transform propagation having run this frame.
pub struct EcsPoseSource<'a, 'w, 's> {
    helper: &'a TransformHelper<'w, 's>,
    entities: &'a HashMap<NodeId, Entity>,
}

impl<'a, 'w, 's> EcsPoseSource<'a, 'w, 's> {
    pub const fn new(
        helper: &'a TransformHelper<'w, 's>,
        entities: &'a HashMap<NodeId, Entity>,
    ) -> Self {
        Self { helper, entities }
    }
}

impl PoseSource for EcsPoseSource<'_, '_, '_> {
    fn world_pose(&self, node: NodeId) -> Option<Isometry3<f32>> {
        let entity = self.entities.get(&node)?;
        self.helper
            .compute_global_transform(*entity)
            .ok()
            .map(|g| global_to_isometry(&g))
    }
}

/// [`PoseSink`] that keeps poses in the order they were written.
///
/// Chains write parents before children, so replaying the log in order
/// always finds a bone's parent already resolved.
#[derive(Debug, Clone, Default)]
pub struct PoseLog {
    pub entries: Vec<(NodeId, Isometry3<f32>)>,
}

impl PoseLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl PoseSink for PoseLog {
    fn set_world_pose(&mut self, node: NodeId, pose: &Isometry3<f32>) {
        self.entries.push((node, *pose));
    }
}

// ---------------------------------------------------------------------------
// ChainDescriptor
// ---------------------------------------------------------------------------

/// One bone entity of a [`ChainDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoneDescriptor {
    pub entity: Entity,
    /// External parent; `None` hangs the bone from the previous bone.
    pub anchor: Option<Entity>,
    /// Tip in the bone's frame. `None` uses the next child bone's origin.
    pub tail: Option<Vec3>,
    pub params: BoneParams,
}

/// Entities that make up a chain, in array order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainDescriptor {
    pub bones: Vec<BoneDescriptor>,
    /// Collider entities; `None` selects every [`SpringBoneCollider`] present
    /// at registration time.
    pub colliders: Option<Vec<Entity>>,
}

impl ChainDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single segment: `bones` hang from `anchor` and from each other,
    /// and the last bone ends at `tip`.
    #[must_use]
    pub fn strand(
        anchor: Entity,
        bones: impl IntoIterator<Item = Entity>,
        tip: Vec3,
        params: BoneParams,
    ) -> Self {
        let mut descriptor = Self::new();
        for (i, entity) in bones.into_iter().enumerate() {
            if i == 0 {
                descriptor = descriptor.root(entity, anchor, params);
            } else {
                descriptor = descriptor.child(entity, params);
            }
        }
        if let Some(last) = descriptor.bones.last_mut() {
            last.tail = Some(tip);
        }
        descriptor
    }

    /// Append a bone parented to an external anchor.
    #[must_use]
    pub fn root(mut self, entity: Entity, anchor: Entity, params: BoneParams) -> Self {
        self.bones.push(BoneDescriptor {
            entity,
            anchor: Some(anchor),
            tail: None,
            params,
        });
        self
    }

    /// Append a bone parented to the previous bone.
    #[must_use]
    pub fn child(mut self, entity: Entity, params: BoneParams) -> Self {
        self.bones.push(BoneDescriptor {
            entity,
            anchor: None,
            tail: None,
            params,
        });
        self
    }

    /// Override the tail of the most recently added bone.
    #[must_use]
    pub fn with_tail(mut self, tail: Vec3) -> Self {
        if let Some(last) = self.bones.last_mut() {
            last.tail = Some(tail);
        }
        self
    }

    #[must_use]
    pub fn with_colliders(mut self, colliders: Vec<Entity>) -> Self {
        self.colliders = Some(colliders);
        self
    }
}

// ---------------------------------------------------------------------------
// register_chain
// ---------------------------------------------------------------------------

struct Prepared {
    sources: Vec<BoneSource>,
    colliders: Vec<ColliderSpec>,
    poses: PoseMap,
    entities: ChainEntities,
}

fn world_pose(helper: &TransformHelper, entity: Entity) -> Result<Isometry3<f32>, SetupError> {
    helper
        .compute_global_transform(entity)
        .map(|g| global_to_isometry(&g))
        .map_err(|_| SetupError::NodeNotFound(entity_node(entity)))
}

fn prepare(
    helper: &TransformHelper,
    descriptor: &ChainDescriptor,
    colliders: &[(Entity, SpringBoneCollider)],
) -> Result<Prepared, SetupError> {
    let bones = &descriptor.bones;
    if bones.is_empty() {
        return Err(SetupError::EmptyChain);
    }

    let globals = bones
        .iter()
        .map(|b| world_pose(helper, b.entity))
        .collect::<Result<Vec<_>, _>>()?;

    let mut poses = PoseMap::new();
    let mut entities = ChainEntities::default();
    let mut sources = Vec::with_capacity(bones.len());

    for (i, bone) in bones.iter().enumerate() {
        let parent = match bone.anchor {
            Some(anchor) => {
                let pose = world_pose(helper, anchor)?;
                poses.insert(entity_node(anchor), pose);
                entities.anchors.push(anchor);
                pose
            }
            None if i == 0 => return Err(SetupError::FirstBoneNotRoot),
            None => globals[i - 1],
        };
        let local_pose = parent.inverse() * globals[i];

        let next_child = bones
            .get(i + 1)
            .filter(|next| next.anchor.is_none())
            .map(|_| globals[i].inverse() * globals[i + 1]);
        let tail = match (bone.tail, next_child) {
            (Some(tail), _) => vec3_to_vector(tail),
            (None, Some(next)) => next.translation.vector,
            (None, None) => {
                return Err(SetupError::InvalidParameter {
                    bone: i,
                    message: "last bone of a segment needs an explicit tail".into(),
                });
            }
        };

        let node = entity_node(bone.entity);
        sources.push(match bone.anchor {
            Some(anchor) => BoneSource::root(node, entity_node(anchor), local_pose, tail, bone.params),
            None => BoneSource::child(node, local_pose, tail, bone.params),
        });
        entities.bones.push(bone.entity);
    }

    let mut specs = Vec::with_capacity(colliders.len());
    for (entity, collider) in colliders {
        let pose = world_pose(helper, *entity)?;
        let node = entity_node(*entity);
        poses.insert(node, pose);
        specs.push(ColliderSpec::new(
            node,
            vec3_to_vector(collider.offset),
            collider.radius,
        ));
        entities.colliders.push(*entity);
    }

    Ok(Prepared {
        sources,
        colliders: specs,
        poses,
        entities,
    })
}

fn select_colliders(
    world: &mut World,
    selection: Option<&[Entity]>,
) -> Result<Vec<(Entity, SpringBoneCollider)>, SetupError> {
    match selection {
        Some(entities) => entities
            .iter()
            .enumerate()
            .map(|(i, &entity)| {
                world
                    .get::<SpringBoneCollider>(entity)
                    .map(|c| (entity, *c))
                    .ok_or_else(|| SetupError::InvalidCollider {
                        collider: i,
                        message: format!("entity {entity} has no SpringBoneCollider"),
                    })
            })
            .collect(),
        None => {
            let mut query = world.query::<(Entity, &SpringBoneCollider)>();
            let mut all: Vec<_> = query.iter(world).map(|(e, c)| (e, *c)).collect();
            all.sort_by_key(|(e, _)| e.to_bits());
            Ok(all)
        }
    }
}

/// Register a chain of bone entities with the [`SpringBoneWorld`].
///
/// Rest poses are taken from the entities' current transforms. On success
/// inserts [`SpringBone`] on every bone entity and [`SpringAnchor`] on
/// every anchor entity.
///
/// # Panics
///
/// Panics if the [`SpringBoneWorld`] resource is missing.
pub fn register_chain(
    world: &mut World,
    descriptor: &ChainDescriptor,
) -> Result<ChainId, SetupError> {
    for (i, bone) in descriptor.bones.iter().enumerate() {
        if let Some(existing) = world.get::<SpringBone>(bone.entity) {
            return Err(SetupError::InvalidParameter {
                bone: i,
                message: format!("entity already driven by {}", existing.chain),
            });
        }
    }

    let colliders = select_colliders(world, descriptor.colliders.as_deref())?;
    let prepared = {
        let mut state = SystemState::<TransformHelper>::new(world);
        let helper = state.get(world);
        prepare(&helper, descriptor, &colliders)?
    };

    let entities = prepared.entities;
    let id = {
        let mut sb = world.resource_mut::<SpringBoneWorld>();
        let id = sb
            .scheduler
            .add_chain(&prepared.sources, &prepared.colliders, &prepared.poses)?;
        for &entity in entities
            .bones
            .iter()
            .chain(&entities.anchors)
            .chain(&entities.colliders)
        {
            sb.entities.insert(entity_node(entity), entity);
        }
        sb.chains.insert(id, entities.clone());
        id
    };

    for (index, &entity) in entities.bones.iter().enumerate() {
        world.entity_mut(entity).insert(SpringBone { chain: id, index });
    }
    for &anchor in &entities.anchors {
        world.entity_mut(anchor).insert(SpringAnchor);
    }

    debug!(
        "registered {id}: {} bones, {} colliders",
        entities.bones.len(),
        entities.colliders.len()
    );
    Ok(id)
}

/// Unregister a chain and strip its markers.
///
/// [`SpringBone`] is removed from the chain's bones. Anchor and collider
/// entities keep their node mapping, and anchors keep [`SpringAnchor`], only
/// while another registered chain still refers to them.
///
/// # Panics
///
/// Panics if the [`SpringBoneWorld`] resource is missing.
pub fn unregister_chain(world: &mut World, id: ChainId) -> Result<(), SimError> {
    let (bones, released_anchors) = {
        let mut sb = world.resource_mut::<SpringBoneWorld>();
        sb.scheduler.remove_chain(id)?;
        let Some(removed) = sb.chains.remove(&id) else {
            return Ok(());
        };

        let still_used: HashSet<Entity> = sb
            .chains
            .values()
            .flat_map(|c| c.bones.iter().chain(&c.anchors).chain(&c.colliders))
            .copied()
            .collect();
        let still_anchoring: HashSet<Entity> = sb
            .chains
            .values()
            .flat_map(|c| c.anchors.iter().copied())
            .collect();

        for entity in removed
            .bones
            .iter()
            .chain(&removed.anchors)
            .chain(&removed.colliders)
        {
            if !still_used.contains(entity) {
                sb.entities.remove(&entity_node(*entity));
            }
        }
        let released_anchors: Vec<Entity> = removed
            .anchors
            .iter()
            .copied()
            .filter(|anchor| !still_anchoring.contains(anchor))
            .collect();
        (removed.bones, released_anchors)
    };

    for entity in bones {
        if let Ok(mut e) = world.get_entity_mut(entity) {
            e.remove::<SpringBone>();
        }
    }
    for entity in released_anchors {
        if let Ok(mut e) = world.get_entity_mut(entity) {
            e.remove::<SpringAnchor>();
        }
    }
    debug!("unregistered {id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
