//! Scalar precision selection and the small pieces of math `vek` lacks.

use crate::parry::na;

/// Scalar type of the whole simulation, chosen by the `f64`/`f32` features.
#[cfg(feature = "f64")]
pub type Real = f64;
/// Scalar type of the whole simulation, chosen by the `f64`/`f32` features.
#[cfg(feature = "f32")]
pub type Real = f32;

/// Three dimensional vector.
pub type Vec3 = vek::Vec3<Real>;
/// Rotation quaternion.
pub type Quat = vek::Quaternion<Real>;
/// 3x3 matrix.
pub type Mat3 = vek::Mat3<Real>;
/// Axis-aligned bounding box.
pub type Aabb = vek::Aabb<Real>;

/// Archimedes' constant at simulation precision.
pub const PI: Real = core::f64::consts::PI as Real;

/// Position with an orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3 {
    /// Translation part.
    pub position: Vec3,
    /// Rotation part, kept unit length.
    pub orientation: Quat,
}

impl Transform3 {
    /// Construct from a position and an orientation.
    pub fn new<P, O>(position: P, orientation: O) -> Self
    where
        P: Into<Vec3>,
        O: Into<Quat>,
    {
        let position = position.into();
        let orientation = orientation.into();

        Self {
            position,
            orientation,
        }
    }

    /// Construct from a position with no rotation.
    pub fn from_position<P>(position: P) -> Self
    where
        P: Into<Vec3>,
    {
        Self::new(position, Quat::identity())
    }

    /// Rotate a relative point and add the position.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + rotate(self.orientation, point)
    }

    /// Rotate a direction, ignoring the position.
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        rotate(self.orientation, vector)
    }

    /// Map a world-space point into the local frame.
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        rotate(self.orientation.conjugate(), point - self.position)
    }

    /// Map a world-space direction into the local frame.
    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        rotate(self.orientation.conjugate(), vector)
    }

    /// Inverse transform.
    pub fn inverse(&self) -> Self {
        let orientation = self.orientation.conjugate();

        Self {
            position: rotate(orientation, -self.position),
            orientation,
        }
    }

    /// Compose with another transform, applying `other` first.
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(other.position),
            orientation: (self.orientation * other.orientation).normalized(),
        }
    }

    /// Rotation matrix of the orientation.
    pub fn rotation_matrix(&self) -> Mat3 {
        quat_to_mat3(self.orientation)
    }
}

impl Default for Transform3 {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            orientation: Quat::identity(),
        }
    }
}

impl From<Transform3> for na::Isometry3<Real> {
    fn from(value: Transform3) -> Self {
        let rotation = na::UnitQuaternion::from_quaternion(na::Quaternion::new(
            value.orientation.w,
            value.orientation.x,
            value.orientation.y,
            value.orientation.z,
        ));

        na::Isometry3::from_parts(
            na::Translation3::new(value.position.x, value.position.y, value.position.z),
            rotation,
        )
    }
}

/// Convert a vector to the geometry backend point type.
pub fn to_na_point(v: Vec3) -> na::Point3<Real> {
    na::Point3::new(v.x, v.y, v.z)
}

/// Convert a geometry backend point back to a vector.
pub fn from_na_point(p: na::Point3<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

/// Convert a geometry backend vector back to a vector.
pub fn from_na_vector(v: na::Vector3<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// Rotate a vector by a unit quaternion.
pub fn rotate(q: Quat, v: Vec3) -> Vec3 {
    let u = Vec3::new(q.x, q.y, q.z);
    let t = u.cross(v) * 2.0;

    v + t * q.w + u.cross(t)
}

/// Quaternion encoding a rotation of `|v|` radians around `v`.
///
/// The identity when the encoded angle is negligible.
pub fn rotation_quaternion(v: Vec3) -> Quat {
    let angle = v.magnitude();
    if angle <= Real::EPSILON {
        return Quat::identity();
    }

    let axis = v / angle;
    let (sin, cos) = (angle * 0.5).sin_cos();

    Quat::from_xyzw(axis.x * sin, axis.y * sin, axis.z * sin, cos)
}

/// Decompose a unit quaternion into an axis-angle encoded vector.
pub fn axis_angle(q: Quat) -> Vec3 {
    let w = q.w.clamp(-1.0, 1.0);
    let sin_half = (1.0 - w * w).sqrt();
    if sin_half <= Real::EPSILON {
        return Vec3::zero();
    }

    let angle = 2.0 * w.acos();

    Vec3::new(q.x, q.y, q.z) / sin_half * angle
}

/// Rotation matrix of a unit quaternion.
pub fn quat_to_mat3(q: Quat) -> Mat3 {
    let (x, y, z, w) = (q.x, q.y, q.z, q.w);
    let (x2, y2, z2) = (x + x, y + y, z + z);

    let (xx, yy, zz) = (x * x2, y * y2, z * z2);
    let (xy, xz, yz) = (x * y2, x * z2, y * z2);
    let (wx, wy, wz) = (w * x2, w * y2, w * z2);

    Mat3::from_row_arrays([
        [1.0 - yy - zz, xy - wz, xz + wy],
        [xy + wz, 1.0 - xx - zz, yz - wx],
        [xz - wy, yz + wx, 1.0 - xx - yy],
    ])
}

/// Skew-symmetric cross product matrix, `skew(a) * b == a × b`.
pub fn skew(v: Vec3) -> Mat3 {
    Mat3::from_row_arrays([
        [0.0, -v.z, v.y],
        [v.z, 0.0, -v.x],
        [-v.y, v.x, 0.0],
    ])
}

/// Scale every matrix element.
pub fn mat3_scaled(m: Mat3, s: Real) -> Mat3 {
    let mut rows = m.into_row_arrays();
    for row in rows.iter_mut() {
        for e in row.iter_mut() {
            *e *= s;
        }
    }

    Mat3::from_row_arrays(rows)
}

/// Invert a 3x3 matrix by cofactor expansion.
///
/// Returns `None` when the matrix is singular.
pub fn mat3_inverse(m: Mat3) -> Option<Mat3> {
    let [[a, b, c], [d, e, f], [g, h, i]] = m.into_row_arrays();

    let co_a = e * i - f * h;
    let co_b = f * g - d * i;
    let co_c = d * h - e * g;

    let det = a * co_a + b * co_b + c * co_c;
    if det.abs() <= Real::EPSILON {
        return None;
    }
    let inv_det = det.recip();

    Some(Mat3::from_row_arrays([
        [co_a * inv_det, (c * h - b * i) * inv_det, (b * f - c * e) * inv_det],
        [co_b * inv_det, (a * i - c * g) * inv_det, (c * d - a * f) * inv_det],
        [co_c * inv_det, (b * g - a * h) * inv_det, (a * e - b * d) * inv_det],
    ]))
}

/// Any unit vector perpendicular to the argument.
pub fn perpendicular_normalized(v: Vec3) -> Vec3 {
    // Cross against the axis the vector is least aligned with
    let other = if v.x.abs() < 0.577 {
        Vec3::unit_x()
    } else {
        Vec3::unit_y()
    };

    v.cross(other).normalized()
}

/// Closest points between two line segments.
///
/// Returns the point on `a1..a2` first.
pub fn closest_points_on_segments(a1: Vec3, a2: Vec3, b1: Vec3, b2: Vec3) -> (Vec3, Vec3) {
    let d1 = a2 - a1;
    let d2 = b2 - b1;
    let r = a1 - b1;

    let aa = d1.dot(d1);
    let ee = d2.dot(d2);
    let ff = d2.dot(r);

    let (s, t);
    if aa <= Real::EPSILON && ee <= Real::EPSILON {
        // Both segments degenerate to points
        return (a1, b1);
    }
    if aa <= Real::EPSILON {
        s = 0.0;
        t = (ff / ee).clamp(0.0, 1.0);
    } else {
        let cc = d1.dot(r);
        if ee <= Real::EPSILON {
            t = 0.0;
            s = (-cc / aa).clamp(0.0, 1.0);
        } else {
            let bb = d1.dot(d2);
            let denom = aa * ee - bb * bb;

            let s_unclamped = if denom > Real::EPSILON {
                (bb * ff - cc * ee) / denom
            } else {
                0.0
            };
            let s_clamped = s_unclamped.clamp(0.0, 1.0);

            let t_unclamped = (bb * s_clamped + ff) / ee;
            if t_unclamped < 0.0 {
                t = 0.0;
                s = (-cc / aa).clamp(0.0, 1.0);
            } else if t_unclamped > 1.0 {
                t = 1.0;
                s = ((bb - cc) / aa).clamp(0.0, 1.0);
            } else {
                t = t_unclamped;
                s = s_clamped;
            }
        }
    }

    (a1 + d1 * s, b1 + d2 * t)
}

/// Combine two 64-bit keys into a deterministic pair hash.
pub fn pair_hash(a: u64, b: u64) -> u64 {
    let mut h = a.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h ^= h >> 32;
    h = h.wrapping_add(b).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^ (h >> 29)
}

/// Combine two 32-bit feature identifiers into a contact point id.
pub fn feature_hash(a: u32, b: u32) -> u32 {
    let mut h = a.wrapping_mul(0x9E37_79B9);
    h = h.rotate_left(13) ^ b.wrapping_mul(0x85EB_CA6B);
    h ^ (h >> 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rotating by a quaternion must match the matrix form.
    #[test]
    fn test_rotation() {
        let q = rotation_quaternion(Vec3::new(0.3, -1.2, 0.7));
        let v = Vec3::new(1.0, 2.0, 3.0);

        let rotated = rotate(q, v);
        let by_matrix = quat_to_mat3(q) * v;
        assert!((rotated - by_matrix).magnitude() < 1e-6);

        // Round trip through the axis-angle encoding
        let back = rotation_quaternion(axis_angle(q));
        assert!((rotate(back, v) - rotated).magnitude() < 1e-6);
    }

    /// Inverting a matrix and multiplying back must give the identity.
    #[test]
    fn test_mat3_inverse() {
        let m = Mat3::from_row_arrays([[2.0, 1.0, 0.5], [0.0, 3.0, -1.0], [1.0, 0.0, 4.0]]);
        let inv = mat3_inverse(m).unwrap();

        let identity = (m * inv).into_row_arrays();
        for (r, row) in identity.iter().enumerate() {
            for (c, e) in row.iter().enumerate() {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!((e - expected).abs() < 1e-6);
            }
        }

        assert!(mat3_inverse(Mat3::zero()).is_none());
    }

    /// Segment query must find the crossing gap between skew segments.
    #[test]
    fn test_segment_closest_points() {
        let (on_a, on_b) = closest_points_on_segments(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, -1.0),
            Vec3::new(0.0, 1.0, 1.0),
        );

        assert!((on_a - Vec3::zero()).magnitude() < 1e-6);
        assert!((on_b - Vec3::new(0.0, 1.0, 0.0)).magnitude() < 1e-6);
    }

    /// Transforms compose like their matrix counterparts.
    #[test]
    fn test_transform_compose() {
        let a = Transform3::new(Vec3::new(1.0, 2.0, 3.0), rotation_quaternion(Vec3::unit_y() * 0.5));
        let b = Transform3::new(Vec3::new(-2.0, 0.5, 0.0), rotation_quaternion(Vec3::unit_x() * 1.2));

        let p = Vec3::new(0.3, -0.7, 2.0);
        let composed = a.mul(&b).transform_point(p);
        let chained = a.transform_point(b.transform_point(p));
        assert!((composed - chained).magnitude() < 1e-6);

        let round_trip = a.inverse().transform_point(a.transform_point(p));
        assert!((round_trip - p).magnitude() < 1e-6);
    }
}
