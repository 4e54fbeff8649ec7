//! Small vector helpers that never produce NaN on degenerate input.

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};

/// Default length below which a vector is treated as zero.
pub const EPSILON: f32 = 1e-6;

/// Normalize `v`, or `None` when its length is below `eps` or not finite.
#[must_use]
pub fn safe_normalize(v: &Vector3<f32>, eps: f32) -> Option<Vector3<f32>> {
    let len = v.norm();
    if len > eps && len.is_finite() {
        Some(v / len)
    } else {
        None
    }
}

/// Project `candidate` onto the sphere of radius `length` around `origin`.
///
/// When the candidate sits on the origin the point is placed along
/// `fallback_dir` instead. A zero fallback leaves the candidate unchanged.
#[must_use]
pub fn reproject(
    candidate: &Vector3<f32>,
    origin: &Vector3<f32>,
    length: f32,
    fallback_dir: &Vector3<f32>,
    eps: f32,
) -> Vector3<f32> {
    match safe_normalize(&(candidate - origin), eps).or_else(|| safe_normalize(fallback_dir, eps)) {
        Some(dir) => origin + dir * length,
        None => *candidate,
    }
}

/// Shortest rotation taking direction `from` onto direction `to`.
///
/// Parallel or degenerate inputs give the identity. Anti-parallel inputs
/// give a half turn about an axis orthogonal to `from`.
#[must_use]
pub fn rotation_arc(from: &Vector3<f32>, to: &Vector3<f32>, eps: f32) -> UnitQuaternion<f32> {
    let (Some(a), Some(b)) = (safe_normalize(from, eps), safe_normalize(to, eps)) else {
        return UnitQuaternion::identity();
    };
    let w = 1.0 + a.dot(&b);
    if w <= eps {
        return UnitQuaternion::from_axis_angle(
            &Unit::new_normalize(any_orthogonal(&a)),
            std::f32::consts::PI,
        );
    }
    // Half-way quaternion; stays accurate for nearly parallel inputs.
    let c = a.cross(&b);
    UnitQuaternion::from_quaternion(Quaternion::new(w, c.x, c.y, c.z))
}

/// Some vector orthogonal to the unit vector `v`.
fn any_orthogonal(v: &Vector3<f32>) -> Vector3<f32> {
    let helper = if v.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    v.cross(&helper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn safe_normalize_regular() {
        let n = safe_normalize(&Vector3::new(3.0, 0.0, 4.0), EPSILON).unwrap();
        assert_relative_eq!(n, Vector3::new(0.6, 0.0, 0.8), epsilon = 1e-6);
    }

    #[test]
    fn safe_normalize_rejects_zero_and_nan() {
        assert!(safe_normalize(&Vector3::zeros(), EPSILON).is_none());
        assert!(safe_normalize(&Vector3::new(1e-9, 0.0, 0.0), EPSILON).is_none());
        assert!(safe_normalize(&Vector3::new(f32::NAN, 1.0, 0.0), EPSILON).is_none());
    }

    #[test]
    fn reproject_scales_to_length() {
        let p = reproject(
            &Vector3::new(0.0, -3.0, 0.0),
            &Vector3::new(0.0, 1.0, 0.0),
            2.0,
            &Vector3::x(),
            EPSILON,
        );
        assert_relative_eq!(p, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn reproject_uses_fallback_when_coincident() {
        let origin = Vector3::new(1.0, 1.0, 1.0);
        let p = reproject(&origin, &origin, 0.5, &Vector3::new(0.0, 0.0, -2.0), EPSILON);
        assert_relative_eq!(p, Vector3::new(1.0, 1.0, 0.5), epsilon = 1e-6);
    }

    #[test]
    fn reproject_without_any_direction_keeps_candidate() {
        let origin = Vector3::new(1.0, 2.0, 3.0);
        let p = reproject(&origin, &origin, 0.5, &Vector3::zeros(), EPSILON);
        assert_eq!(p, origin);
    }

    #[test]
    fn rotation_arc_maps_from_onto_to() {
        let from = Vector3::new(0.0, -1.0, 0.0);
        let to = Vector3::new(1.0, -1.0, 0.0);
        let q = rotation_arc(&from, &to, EPSILON);
        assert_relative_eq!(q * from, to.normalize(), epsilon = 1e-5);
    }

    #[test]
    fn rotation_arc_parallel_is_identity() {
        let v = Vector3::new(0.0, 0.0, 2.0);
        let q = rotation_arc(&v, &(v * 3.0), EPSILON);
        assert_relative_eq!(q.angle(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn rotation_arc_antiparallel_is_half_turn() {
        let from = Vector3::new(0.0, 1.0, 0.0);
        let q = rotation_arc(&from, &-from, EPSILON);
        assert_relative_eq!(q * from, -from, epsilon = 1e-5);
        assert_relative_eq!(q.angle(), std::f32::consts::PI, epsilon = 1e-5);
    }

    #[test]
    fn rotation_arc_degenerate_is_identity() {
        let q = rotation_arc(&Vector3::zeros(), &Vector3::x(), EPSILON);
        assert_eq!(q, UnitQuaternion::identity());
    }
}
