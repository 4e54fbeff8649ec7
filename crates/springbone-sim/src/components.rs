//! Spring-bone ECS components.
//!
//! Markers the bridge attaches at registration time, plus the authoring
//! components hosts put on anchor and collider entities.

use std::f32::consts::TAU;

use bevy::prelude::*;
use springbone_core::types::ChainId;

// ---------------------------------------------------------------------------
// SpringBone
// ---------------------------------------------------------------------------

/// Marker on entities whose `Transform` is written by a chain.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpringBone {
    pub chain: ChainId,
    /// Position of the bone in its chain's array.
    pub index: usize,
}

// ---------------------------------------------------------------------------
// SpringAnchor
// ---------------------------------------------------------------------------

/// Marker on entities that serve as the external parent of a root bone.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SpringAnchor;

// ---------------------------------------------------------------------------
// SpringBoneCollider
// ---------------------------------------------------------------------------

/// Sphere collider attached to an entity.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct SpringBoneCollider {
    /// Sphere center in the entity's frame.
    pub offset: Vec3,
    pub radius: f32,
}

impl SpringBoneCollider {
    #[must_use]
    pub const fn new(radius: f32) -> Self {
        Self {
            offset: Vec3::ZERO,
            radius,
        }
    }

    #[must_use]
    pub const fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }
}

// ---------------------------------------------------------------------------
// AnchorMotion
// ---------------------------------------------------------------------------

/// Sinusoidal translation applied to an anchor's local `Transform`.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct AnchorMotion {
    /// Translation at zero displacement.
    pub origin: Vec3,
    pub amplitude: Vec3,
    pub frequency_hz: f32,
    /// Phase offset in radians.
    pub phase: f32,
}

impl AnchorMotion {
    #[must_use]
    pub const fn new(origin: Vec3, amplitude: Vec3, frequency_hz: f32) -> Self {
        Self {
            origin,
            amplitude,
            frequency_hz,
            phase: 0.0,
        }
    }

    #[must_use]
    pub const fn with_phase(mut self, phase: f32) -> Self {
        self.phase = phase;
        self
    }

    /// Translation at simulated time `t` seconds.
    #[must_use]
    pub fn translation_at(&self, t: f32) -> Vec3 {
        self.origin + self.amplitude * (TAU * self.frequency_hz * t + self.phase).sin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn components_are_send_sync() {
        assert_send_sync::<SpringBone>();
        assert_send_sync::<SpringAnchor>();
        assert_send_sync::<SpringBoneCollider>();
        assert_send_sync::<AnchorMotion>();
    }

    #[test]
    fn collider_builder() {
        let c = SpringBoneCollider::new(0.5).with_offset(Vec3::Y);
        assert_eq!(c.offset, Vec3::Y);
        assert_relative_eq!(c.radius, 0.5);
    }

    #[test]
    fn anchor_motion_peaks_at_quarter_period() {
        let motion = AnchorMotion::new(Vec3::new(0.0, 1.0, 0.0), Vec3::X * 0.2, 1.0);
        assert_eq!(motion.translation_at(0.0), Vec3::new(0.0, 1.0, 0.0));

        let peak = motion.translation_at(0.25);
        assert_relative_eq!(peak.x, 0.2, epsilon = 1e-6);
        assert_relative_eq!(peak.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn anchor_motion_phase_shifts() {
        let motion = AnchorMotion::new(Vec3::ZERO, Vec3::Z, 2.0).with_phase(std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(motion.translation_at(0.0).z, 1.0, epsilon = 1e-6);
    }
}
