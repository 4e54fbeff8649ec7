//! Plain data records consumed and produced by the integrator.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::math::{EPSILON, safe_normalize};
use crate::params::BoneParams;

// ---------------------------------------------------------------------------
// BoneState
// ---------------------------------------------------------------------------

/// Physical state and parameters of one simulated bone.
///
/// Bones of a chain are stored contiguously. A root bone hangs from the
/// next unconsumed [`ParentAnchor`]; every other bone hangs from the bone
/// right before it in the array.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneState {
    /// Offset from the logical parent, in the parent's frame.
    pub local_position: Vector3<f32>,
    pub local_rotation: UnitQuaternion<f32>,
    /// Rest direction of the bone in its own frame. Unit length.
    pub bone_axis: Vector3<f32>,

    /// Tip position this step (world).
    pub current_endpoint: Vector3<f32>,
    /// Tip position last step (world).
    pub previous_endpoint: Vector3<f32>,

    /// World pose of the bone origin. Written by every step.
    pub global_position: Vector3<f32>,
    pub global_rotation: UnitQuaternion<f32>,

    pub stiffness_force: f32,
    pub drag_force: f32,
    pub spring_force: Vector3<f32>,
    /// Distance kept between origin and tip.
    pub spring_length: f32,
    pub radius: f32,

    pub is_root: bool,
}

impl BoneState {
    /// Build a bone from its pose relative to its parent and its tail, the
    /// tip position in the bone's own frame.
    ///
    /// Returns `None` for a zero-length or non-finite tail. The global pose
    /// and endpoints start at the local values; call
    /// [`place_at_rest`](Self::place_at_rest) once the parent pose is known.
    #[must_use]
    pub fn new(
        local_pose: &Isometry3<f32>,
        tail: &Vector3<f32>,
        params: &BoneParams,
        is_root: bool,
    ) -> Option<Self> {
        let bone_axis = safe_normalize(tail, EPSILON)?;
        let local_position = local_pose.translation.vector;
        let tip = local_pose * nalgebra::Point3::from(*tail);
        Some(Self {
            local_position,
            local_rotation: local_pose.rotation,
            bone_axis,
            current_endpoint: tip.coords,
            previous_endpoint: tip.coords,
            global_position: local_position,
            global_rotation: local_pose.rotation,
            stiffness_force: params.stiffness_force,
            drag_force: params.drag_force,
            spring_force: params.spring_force,
            spring_length: tail.norm(),
            radius: params.radius,
            is_root,
        })
    }

    /// Rest world pose of the bone origin under the given parent pose.
    #[must_use]
    pub fn rest_pose(
        &self,
        parent_position: &Vector3<f32>,
        parent_rotation: &UnitQuaternion<f32>,
    ) -> (Vector3<f32>, UnitQuaternion<f32>) {
        (
            parent_position + parent_rotation * self.local_position,
            parent_rotation * self.local_rotation,
        )
    }

    /// Snap the bone to rest under the given parent pose with zero velocity.
    pub fn place_at_rest(
        &mut self,
        parent_position: &Vector3<f32>,
        parent_rotation: &UnitQuaternion<f32>,
    ) {
        let (position, rotation) = self.rest_pose(parent_position, parent_rotation);
        self.global_position = position;
        self.global_rotation = rotation;
        self.current_endpoint = position + rotation * (self.bone_axis * self.spring_length);
        self.previous_endpoint = self.current_endpoint;
    }

    /// World pose of the bone origin as an isometry.
    #[must_use]
    pub fn global_pose(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.global_position), self.global_rotation)
    }

    /// Current tip velocity per step.
    #[must_use]
    pub fn velocity(&self) -> Vector3<f32> {
        self.current_endpoint - self.previous_endpoint
    }

    /// Parameters this bone was built with.
    #[must_use]
    pub fn params(&self) -> BoneParams {
        BoneParams {
            stiffness_force: self.stiffness_force,
            drag_force: self.drag_force,
            spring_force: self.spring_force,
            radius: self.radius,
        }
    }

    /// Whether every mutable quantity is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.current_endpoint.iter().all(|c| c.is_finite())
            && self.previous_endpoint.iter().all(|c| c.is_finite())
            && self.global_position.iter().all(|c| c.is_finite())
            && self.global_rotation.coords.iter().all(|c| c.is_finite())
    }
}

// ---------------------------------------------------------------------------
// ParentAnchor
// ---------------------------------------------------------------------------

/// World pose of the external node above a chain root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentAnchor {
    pub global_position: Vector3<f32>,
    pub global_rotation: UnitQuaternion<f32>,
}

impl ParentAnchor {
    #[must_use]
    pub const fn new(global_position: Vector3<f32>, global_rotation: UnitQuaternion<f32>) -> Self {
        Self {
            global_position,
            global_rotation,
        }
    }

    #[must_use]
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    #[must_use]
    pub fn from_isometry(pose: &Isometry3<f32>) -> Self {
        Self::new(pose.translation.vector, pose.rotation)
    }
}

impl Default for ParentAnchor {
    fn default() -> Self {
        Self::identity()
    }
}

// ---------------------------------------------------------------------------
// ColliderState
// ---------------------------------------------------------------------------

/// A sphere collider in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderState {
    pub global_position: Vector3<f32>,
    pub radius: f32,
}

impl ColliderState {
    #[must_use]
    pub const fn new(global_position: Vector3<f32>, radius: f32) -> Self {
        Self {
            global_position,
            radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn new_derives_axis_and_length_from_tail() {
        let bone = BoneState::new(
            &Isometry3::identity(),
            &Vector3::new(0.0, -0.5, 0.0),
            &BoneParams::inert(),
            true,
        )
        .unwrap();
        assert_relative_eq!(bone.bone_axis, Vector3::new(0.0, -1.0, 0.0));
        assert_relative_eq!(bone.spring_length, 0.5);
        assert_eq!(bone.current_endpoint, bone.previous_endpoint);
        assert!(bone.is_root);
    }

    #[test]
    fn new_rejects_zero_tail() {
        assert!(
            BoneState::new(
                &Isometry3::identity(),
                &Vector3::zeros(),
                &BoneParams::inert(),
                true
            )
            .is_none()
        );
    }

    #[test]
    fn place_at_rest_follows_parent() {
        let mut bone = BoneState::new(
            &Isometry3::translation(0.0, 0.0, 1.0),
            &Vector3::new(0.0, 0.0, 1.0),
            &BoneParams::inert(),
            false,
        )
        .unwrap();
        let parent_rotation =
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f32::consts::FRAC_PI_2);
        bone.place_at_rest(&Vector3::new(1.0, 0.0, 0.0), &parent_rotation);

        // +Z rotated a quarter turn about +X is -Y.
        assert_relative_eq!(bone.global_position, Vector3::new(1.0, -1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(bone.current_endpoint, Vector3::new(1.0, -2.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(bone.velocity(), Vector3::zeros());
    }

    #[test]
    fn params_round_trip() {
        let params = BoneParams::inert().with_stiffness(0.3).with_radius(0.2);
        let bone = BoneState::new(&Isometry3::identity(), &Vector3::y(), &params, true).unwrap();
        assert_eq!(bone.params(), params);
    }

    #[test]
    fn is_finite_detects_nan() {
        let mut bone =
            BoneState::new(&Isometry3::identity(), &Vector3::y(), &BoneParams::inert(), true)
                .unwrap();
        assert!(bone.is_finite());
        bone.current_endpoint.x = f32::NAN;
        assert!(!bone.is_finite());
    }

    #[test]
    fn anchor_from_isometry() {
        let pose = Isometry3::translation(1.0, 2.0, 3.0);
        let anchor = ParentAnchor::from_isometry(&pose);
        assert_eq!(anchor.global_position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(ParentAnchor::default(), ParentAnchor::identity());
    }
}
