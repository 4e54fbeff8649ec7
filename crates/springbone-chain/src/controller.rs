//! Per-chain ownership of the integrator arrays.

use bevy::log::debug;
use nalgebra::{Isometry3, Point3, Vector3};
use springbone_core::error::{SetupError, SimError};
use springbone_core::types::{ChainId, NodeId};
use springbone_solver::{
    BoneParams, BoneState, ChainIntegrator, ChainLayout, ColliderState, ParentAnchor,
    place_chain_at_rest,
};

use crate::executor::{ChainBuffers, ChainJob, StepExecutor, StepHandle};
use crate::pose::{PoseSink, PoseSource};

// ---------------------------------------------------------------------------
// Setup descriptions
// ---------------------------------------------------------------------------

/// Static description of one bone.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneSource {
    /// Host node driven by this bone.
    pub node: NodeId,
    /// External parent for a root bone; `None` hangs the bone from the
    /// previous bone in the chain.
    pub anchor: Option<NodeId>,
    /// Rest pose relative to the logical parent.
    pub local_pose: Isometry3<f32>,
    /// Bone tip in the bone's own frame. Its length is the bone length.
    pub tail: Vector3<f32>,
    pub params: BoneParams,
}

impl BoneSource {
    #[must_use]
    pub fn root(
        node: NodeId,
        anchor: NodeId,
        local_pose: Isometry3<f32>,
        tail: Vector3<f32>,
        params: BoneParams,
    ) -> Self {
        Self {
            node,
            anchor: Some(anchor),
            local_pose,
            tail,
            params,
        }
    }

    #[must_use]
    pub fn child(
        node: NodeId,
        local_pose: Isometry3<f32>,
        tail: Vector3<f32>,
        params: BoneParams,
    ) -> Self {
        Self {
            node,
            anchor: None,
            local_pose,
            tail,
            params,
        }
    }
}

/// Sphere collider attached to a host node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderSpec {
    pub node: NodeId,
    /// Sphere center in the node's frame.
    pub offset: Vector3<f32>,
    pub radius: f32,
}

impl ColliderSpec {
    #[must_use]
    pub const fn new(node: NodeId, offset: Vector3<f32>, radius: f32) -> Self {
        Self {
            node,
            offset,
            radius,
        }
    }

    fn world_state(&self, source: &impl PoseSource) -> Option<ColliderState> {
        let pose = source.world_pose(self.node)?;
        let center = pose * Point3::from(self.offset);
        Some(ColliderState::new(center.coords, self.radius))
    }
}

fn validate_colliders(specs: &[ColliderSpec]) -> Result<(), SetupError> {
    for (i, spec) in specs.iter().enumerate() {
        if !(spec.radius >= 0.0 && spec.radius.is_finite()) {
            return Err(SetupError::InvalidCollider {
                collider: i,
                message: "radius must be >= 0".into(),
            });
        }
        if !spec.offset.iter().all(|c| c.is_finite()) {
            return Err(SetupError::InvalidCollider {
                collider: i,
                message: "offset must be finite".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ChainController
// ---------------------------------------------------------------------------

/// Owns one chain's bone array and moves it through refresh, step and
/// writeback.
///
/// While a step is in flight the arrays live inside the submitted job; every
/// accessor that needs them returns [`SimError::StepInFlight`] until
/// [`await_step`](Self::await_step) puts them back.
#[derive(Debug)]
pub struct ChainController {
    id: ChainId,
    nodes: Vec<NodeId>,
    anchor_nodes: Vec<NodeId>,
    collider_specs: Vec<ColliderSpec>,
    layout: ChainLayout,
    integrator: ChainIntegrator,
    rest: Vec<BoneState>,
    staged_anchors: Vec<ParentAnchor>,
    staged_colliders: Vec<ColliderState>,
    buffers: Option<ChainBuffers>,
    generation: u64,
    steps: u64,
}

impl ChainController {
    /// Validate the sources, read the initial anchor and collider poses and
    /// place every bone at rest.
    pub fn setup(
        id: ChainId,
        bones: &[BoneSource],
        colliders: &[ColliderSpec],
        source: &impl PoseSource,
    ) -> Result<Self, SetupError> {
        let anchor_nodes: Vec<NodeId> = bones.iter().filter_map(|b| b.anchor).collect();
        let layout =
            ChainLayout::from_root_flags(bones.iter().map(|b| b.anchor.is_some()), anchor_nodes.len())?;
        validate_colliders(colliders)?;

        let mut states = Vec::with_capacity(bones.len());
        for (i, bone) in bones.iter().enumerate() {
            bone.params.validate(i)?;
            let state = BoneState::new(&bone.local_pose, &bone.tail, &bone.params, bone.anchor.is_some())
                .ok_or(SetupError::DegenerateBoneAxis { bone: i })?;
            states.push(state);
        }

        let anchors = anchor_nodes
            .iter()
            .map(|&node| {
                source
                    .world_pose(node)
                    .map(|pose| ParentAnchor::from_isometry(&pose))
                    .ok_or(SetupError::NodeNotFound(node))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let collider_states = colliders
            .iter()
            .map(|spec| spec.world_state(source).ok_or(SetupError::NodeNotFound(spec.node)))
            .collect::<Result<Vec<_>, _>>()?;

        place_chain_at_rest(&mut states, &anchors);
        debug!(
            "springbone: {id} set up with {} bones, {} roots, {} colliders",
            states.len(),
            layout.root_count(),
            collider_states.len()
        );

        Ok(Self {
            id,
            nodes: bones.iter().map(|b| b.node).collect(),
            anchor_nodes,
            collider_specs: colliders.to_vec(),
            layout,
            integrator: ChainIntegrator::new(),
            rest: states.clone(),
            buffers: Some(ChainBuffers {
                bones: states,
                anchors: anchors.clone(),
                colliders: collider_states.clone(),
            }),
            staged_anchors: anchors,
            staged_colliders: collider_states,
            generation: 0,
            steps: 0,
        })
    }

    #[must_use]
    pub fn with_integrator(mut self, integrator: ChainIntegrator) -> Self {
        self.integrator = integrator;
        self
    }

    // -- Accessors --

    #[must_use]
    pub const fn id(&self) -> ChainId {
        self.id
    }

    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.nodes.len()
    }

    /// Host node of every bone, in array order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Host node above every root, in anchor order.
    #[must_use]
    pub fn anchor_nodes(&self) -> &[NodeId] {
        &self.anchor_nodes
    }

    #[must_use]
    pub fn collider_specs(&self) -> &[ColliderSpec] {
        &self.collider_specs
    }

    #[must_use]
    pub const fn layout(&self) -> &ChainLayout {
        &self.layout
    }

    /// Completed steps since setup.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.buffers.is_none()
    }

    /// Bone states after the last completed step.
    pub fn bones(&self) -> Result<&[BoneState], SimError> {
        self.buffers
            .as_ref()
            .map(|b| b.bones.as_slice())
            .ok_or(SimError::StepInFlight(self.id))
    }

    /// Anchors staged for the next step.
    #[must_use]
    pub fn staged_anchors(&self) -> &[ParentAnchor] {
        &self.staged_anchors
    }

    /// Colliders staged for the next step.
    #[must_use]
    pub fn staged_colliders(&self) -> &[ColliderState] {
        &self.staged_colliders
    }

    // -- Refresh --

    /// Copy the current world pose of every root's parent into the staging
    /// buffer. Allowed while a step is in flight.
    ///
    /// On error the staging buffer is left untouched.
    pub fn refresh_anchors(&mut self, source: &impl PoseSource) -> Result<(), SimError> {
        let anchors = self
            .anchor_nodes
            .iter()
            .map(|&node| {
                source
                    .world_pose(node)
                    .map(|pose| ParentAnchor::from_isometry(&pose))
                    .ok_or(SimError::NodeNotFound(node))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.staged_anchors = anchors;
        Ok(())
    }

    /// Copy the current world center of every collider into the staging
    /// buffer. Allowed while a step is in flight.
    ///
    /// On error the staging buffer is left untouched.
    pub fn refresh_colliders(&mut self, source: &impl PoseSource) -> Result<(), SimError> {
        let colliders = self
            .collider_specs
            .iter()
            .map(|spec| {
                spec.world_state(source)
                    .ok_or(SimError::NodeNotFound(spec.node))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.staged_colliders = colliders;
        Ok(())
    }

    /// Replace the collider list. Takes effect at the next refresh.
    pub fn set_colliders(&mut self, colliders: Vec<ColliderSpec>) -> Result<(), SetupError> {
        validate_colliders(&colliders)?;
        self.staged_colliders
            .resize(colliders.len(), ColliderState::new(Vector3::zeros(), 0.0));
        self.collider_specs = colliders;
        Ok(())
    }

    // -- Step --

    /// Submit one integration step of `dt` seconds over the staged inputs.
    pub fn step_async(
        &mut self,
        dt: f32,
        executor: &dyn StepExecutor,
    ) -> Result<StepHandle, SimError> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SimError::NonPositiveDt(dt));
        }
        let mut buffers = self.buffers.take().ok_or(SimError::StepInFlight(self.id))?;
        buffers.anchors.clone_from(&self.staged_anchors);
        buffers.colliders.clone_from(&self.staged_colliders);
        Ok(executor.submit(ChainJob {
            chain: self.id,
            generation: self.generation,
            dt,
            integrator: self.integrator,
            buffers,
        }))
    }

    /// Block until `handle` completes and take the arrays back.
    ///
    /// A handle from another chain is rejected without waiting; that
    /// chain's step is lost and it must be [`reset`](Self::reset). Results
    /// of a step submitted before the last reset are discarded. A step that
    /// produced non-finite state is kept and reported as
    /// [`SimError::Diverged`].
    pub fn await_step(&mut self, handle: StepHandle) -> Result<(), SimError> {
        if handle.chain() != self.id {
            return Err(SimError::HandleMismatch {
                expected: self.id,
                got: handle.chain(),
            });
        }
        let job = handle.wait();
        if job.generation != self.generation {
            debug!("springbone: {} discarded a step from before reset", self.id);
            return Ok(());
        }
        let finite = job.buffers.is_finite();
        self.buffers = Some(job.buffers);
        self.steps += 1;
        if finite {
            Ok(())
        } else {
            Err(SimError::Diverged(self.id))
        }
    }

    /// Submit and await one step on the calling thread's executor.
    pub fn step(&mut self, dt: f32, executor: &dyn StepExecutor) -> Result<(), SimError> {
        let handle = self.step_async(dt, executor)?;
        self.await_step(handle)
    }

    /// Restore every bone to its setup rest state.
    ///
    /// Also recovers a controller whose in-flight step was lost. Any step
    /// still in flight is discarded when awaited.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.buffers = Some(ChainBuffers {
            bones: self.rest.clone(),
            anchors: self.staged_anchors.clone(),
            colliders: self.staged_colliders.clone(),
        });
    }

    // -- Writeback / teardown --

    /// Write every bone's world pose to `sink`, in array order.
    pub fn writeback(&self, sink: &mut impl PoseSink) -> Result<(), SimError> {
        for (bone, &node) in self.bones()?.iter().zip(&self.nodes) {
            sink.set_world_pose(node, &bone.global_pose());
        }
        Ok(())
    }

    /// Release the chain's arrays.
    pub fn teardown(self) {
        debug!(
            "springbone: {} torn down after {} steps",
            self.id, self.steps
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
