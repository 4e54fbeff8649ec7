//! One verlet step over a flat bone array.
//!
//! Bones are processed strictly in array order because each bone's parent
//! pose is the bone before it (or an anchor, for roots). Parallelism lives
//! one level up, across independent chains.

use nalgebra::{UnitQuaternion, Vector3};

use crate::math::{EPSILON, reproject, rotation_arc, safe_normalize};
use crate::state::{BoneState, ColliderState, ParentAnchor};

/// Verlet spring-bone integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainIntegrator {
    /// Length below which a direction is treated as degenerate.
    pub epsilon: f32,
}

impl Default for ChainIntegrator {
    fn default() -> Self {
        Self { epsilon: EPSILON }
    }
}

impl ChainIntegrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Advance every bone by one step of `dt` seconds, in place.
    ///
    /// Callers guarantee `dt > 0` and that the number of root bones equals
    /// `anchors.len()` (see [`ChainLayout`](crate::layout::ChainLayout)).
    /// Both are checked in debug builds only.
    ///
    /// `bone_axis` lives in the bone's own frame, so the rest direction is
    /// `parent_rotation * local_rotation * bone_axis` and the aim rotation is
    /// applied on top of that rest rotation. With an identity
    /// `local_rotation` this reduces to aiming from `parent_rotation`.
    pub fn integrate(
        &self,
        bones: &mut [BoneState],
        anchors: &[ParentAnchor],
        colliders: &[ColliderState],
        dt: f32,
    ) {
        debug_assert!(dt > 0.0, "dt must be positive, got {dt}");
        debug_assert_eq!(
            bones.iter().filter(|b| b.is_root).count(),
            anchors.len(),
            "root/anchor count mismatch"
        );

        let eps = self.epsilon;
        let dt2 = dt * dt;
        let inv_dt2 = 1.0 / dt2;

        let mut next_anchor = anchors.iter();
        let mut parent_position = Vector3::zeros();
        let mut parent_rotation = UnitQuaternion::identity();

        for bone in bones.iter_mut() {
            if bone.is_root
                && let Some(anchor) = next_anchor.next()
            {
                parent_position = anchor.global_position;
                parent_rotation = anchor.global_rotation;
            }

            let (rest_position, rest_rotation) = bone.rest_pose(&parent_position, &parent_rotation);
            let rest_dir = rest_rotation * bone.bone_axis;

            let force = (rest_rotation * (bone.bone_axis * bone.stiffness_force)
                + (bone.previous_endpoint - bone.current_endpoint) * bone.drag_force
                + bone.spring_force)
                * inv_dt2;

            // Direction used whenever the endpoint collapses onto the origin.
            let fallback = safe_normalize(&(bone.current_endpoint - rest_position), eps)
                .unwrap_or(rest_dir);

            let candidate =
                (bone.current_endpoint - bone.previous_endpoint) + bone.current_endpoint + force * dt2;
            let mut endpoint = reproject(
                &candidate,
                &rest_position,
                bone.spring_length,
                &fallback,
                eps,
            );

            for collider in colliders {
                endpoint = resolve_collision(
                    &endpoint,
                    &rest_position,
                    bone.spring_length,
                    bone.radius,
                    collider,
                    &fallback,
                    eps,
                );
            }

            bone.previous_endpoint = bone.current_endpoint;
            bone.current_endpoint = endpoint;

            let target = rotation_arc(&rest_dir, &(endpoint - rest_position), eps);
            bone.global_position = rest_position;
            bone.global_rotation = target * rest_rotation;

            if bone.is_root {
                parent_position = rest_position;
                parent_rotation = rest_rotation;
            } else {
                parent_position = bone.global_position;
                parent_rotation = bone.global_rotation;
            }
        }
    }
}

/// Push `endpoint` out of `collider` and restore the bone length.
///
/// Single pass: the reprojection may leave a small residual penetration.
fn resolve_collision(
    endpoint: &Vector3<f32>,
    origin: &Vector3<f32>,
    length: f32,
    bone_radius: f32,
    collider: &ColliderState,
    fallback: &Vector3<f32>,
    eps: f32,
) -> Vector3<f32> {
    let min_distance = bone_radius + collider.radius;
    let offset = endpoint - collider.global_position;
    if offset.norm() > min_distance {
        return *endpoint;
    }
    let normal = safe_normalize(&offset, eps)
        .or_else(|| safe_normalize(&(origin - collider.global_position), eps))
        .unwrap_or(*fallback);
    let pushed = collider.global_position + normal * min_distance;
    reproject(&pushed, origin, length, fallback, eps)
}

/// Place every bone at rest under `anchors` with zero velocity.
///
/// Poses propagate the same way [`ChainIntegrator::integrate`] propagates
/// them, so an unforced chain placed here is a fixpoint of the integrator.
pub fn place_chain_at_rest(bones: &mut [BoneState], anchors: &[ParentAnchor]) {
    let mut next_anchor = anchors.iter();
    let mut parent_position = Vector3::zeros();
    let mut parent_rotation = UnitQuaternion::identity();
    for bone in bones.iter_mut() {
        if bone.is_root
            && let Some(anchor) = next_anchor.next()
        {
            parent_position = anchor.global_position;
            parent_rotation = anchor.global_rotation;
        }
        bone.place_at_rest(&parent_position, &parent_rotation);
        parent_position = bone.global_position;
        parent_rotation = bone.global_rotation;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
