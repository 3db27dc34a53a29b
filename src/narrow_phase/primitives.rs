//! Contacts for the primitive shape pairs.
//!
//! Sphere and capsule combinations are closed form; queries against hulls
//! and triangles go through the geometry backend.

use crate::math::{self, Real, Transform3, Vec3};
use crate::narrow_phase::manifold::ContactManifold;
use crate::parry::na;
use crate::parry::query;
use crate::parry::shape::{Ball, Capsule as BackendCapsule, ConvexPolyhedron, Shape, Triangle};

/// Closed-form sphere versus sphere contact.
pub fn sphere_vs_sphere(
    center_a: Vec3,
    radius_a: Real,
    center_b: Vec3,
    radius_b: Real,
    margin: Real,
    feature_id: u32,
    manifold: &mut ContactManifold,
) {
    let delta = center_b - center_a;
    let distance = delta.magnitude();
    let separation = distance - radius_a - radius_b;
    if separation > margin {
        return;
    }

    // Concentric spheres get an arbitrary but deterministic normal
    let normal = if distance > Real::EPSILON {
        delta / distance
    } else {
        Vec3::unit_y()
    };

    let on_a = center_a + normal * radius_a;
    let on_b = center_b - normal * radius_b;
    manifold.add_contact(normal, on_a, on_b, feature_id);
}

/// Closed-form sphere versus capsule contact.
pub fn sphere_vs_capsule(
    center: Vec3,
    radius: Real,
    capsule_start: Vec3,
    capsule_end: Vec3,
    capsule_radius: Real,
    margin: Real,
    manifold: &mut ContactManifold,
) {
    let (on_segment, _) =
        math::closest_points_on_segments(capsule_start, capsule_end, center, center);

    // The capsule is the second collider, so the sphere goes first
    sphere_vs_sphere(center, radius, on_segment, capsule_radius, margin, 0, manifold);
}

/// Closed-form capsule versus capsule contact.
pub fn capsule_vs_capsule(
    start_a: Vec3,
    end_a: Vec3,
    radius_a: Real,
    start_b: Vec3,
    end_b: Vec3,
    radius_b: Real,
    margin: Real,
    manifold: &mut ContactManifold,
) {
    let (on_a, on_b) = math::closest_points_on_segments(start_a, end_a, start_b, end_b);

    sphere_vs_sphere(on_a, radius_a, on_b, radius_b, margin, 0, manifold);
}

/// Sphere versus convex hull through the geometry backend.
pub fn sphere_vs_hull(
    center: Vec3,
    radius: Real,
    hull: &ConvexPolyhedron,
    hull_transform: &Transform3,
    margin: Real,
    manifold: &mut ContactManifold,
) {
    let ball = Ball::new(radius);
    let ball_position = Transform3::from_position(center);

    backend_contact(
        &ball,
        &ball_position,
        hull,
        hull_transform,
        margin,
        0,
        manifold,
    );
}

/// Capsule versus convex hull through the geometry backend.
pub fn capsule_vs_hull(
    start: Vec3,
    end: Vec3,
    radius: Real,
    hull: &ConvexPolyhedron,
    hull_transform: &Transform3,
    margin: Real,
    manifold: &mut ContactManifold,
) {
    let capsule = BackendCapsule::new(math::to_na_point(start), math::to_na_point(end), radius);

    backend_contact(
        &capsule,
        &Transform3::default(),
        hull,
        hull_transform,
        margin,
        0,
        manifold,
    );
}

/// Sphere versus a world-space triangle through the geometry backend.
pub fn sphere_vs_triangle(
    center: Vec3,
    radius: Real,
    triangle: &[Vec3; 3],
    margin: Real,
    triangle_id: u32,
    manifold: &mut ContactManifold,
) {
    let ball = Ball::new(radius);
    let ball_position = Transform3::from_position(center);
    let triangle = Triangle::new(
        math::to_na_point(triangle[0]),
        math::to_na_point(triangle[1]),
        math::to_na_point(triangle[2]),
    );

    backend_contact(
        &ball,
        &ball_position,
        &triangle,
        &Transform3::default(),
        margin,
        triangle_id,
        manifold,
    );
}

/// Capsule versus a world-space triangle through the geometry backend.
pub fn capsule_vs_triangle(
    start: Vec3,
    end: Vec3,
    radius: Real,
    triangle: &[Vec3; 3],
    margin: Real,
    triangle_id: u32,
    manifold: &mut ContactManifold,
) {
    let capsule = BackendCapsule::new(math::to_na_point(start), math::to_na_point(end), radius);
    let triangle = Triangle::new(
        math::to_na_point(triangle[0]),
        math::to_na_point(triangle[1]),
        math::to_na_point(triangle[2]),
    );

    backend_contact(
        &capsule,
        &Transform3::default(),
        &triangle,
        &Transform3::default(),
        margin,
        triangle_id,
        manifold,
    );
}

/// Run a backend contact query and push the result onto the manifold.
fn backend_contact(
    shape_a: &dyn Shape,
    transform_a: &Transform3,
    shape_b: &dyn Shape,
    transform_b: &Transform3,
    margin: Real,
    feature_id: u32,
    manifold: &mut ContactManifold,
) {
    puffin::profile_function!();

    let position_a: na::Isometry3<Real> = (*transform_a).into();
    let position_b: na::Isometry3<Real> = (*transform_b).into();

    let contact = match query::contact(&position_a, shape_a, &position_b, shape_b, margin) {
        Ok(contact) => contact,
        Err(unsupported) => {
            debug_assert!(false, "unsupported shape pair: {unsupported:?}");
            return;
        }
    };

    if let Some(contact) = contact {
        if contact.dist > margin {
            return;
        }

        manifold.add_contact(
            math::from_na_vector(contact.normal1.into_inner()),
            math::from_na_point(contact.point1),
            math::from_na_point(contact.point2),
            feature_id,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::PhysicsMaterial;

    fn empty_manifold() -> ContactManifold {
        ContactManifold::new(1, PhysicsMaterial::rubber(), PhysicsMaterial::rubber())
    }

    /// Overlapping spheres touch along the centre line.
    #[test]
    fn test_sphere_pair() {
        let mut manifold = empty_manifold();
        sphere_vs_sphere(
            Vec3::zero(),
            0.5,
            Vec3::new(0.9, 0.0, 0.0),
            0.5,
            0.0,
            0,
            &mut manifold,
        );

        assert_eq!(manifold.points.len(), 1);
        let point = manifold.points[0];
        assert!((point.normal - Vec3::unit_x()).magnitude() < 1e-9);
        assert!((point.depth() - 0.1).abs() < 1e-9);

        // Out of range produces nothing
        let mut manifold = empty_manifold();
        sphere_vs_sphere(
            Vec3::zero(),
            0.5,
            Vec3::new(2.0, 0.0, 0.0),
            0.5,
            0.1,
            0,
            &mut manifold,
        );
        assert!(manifold.points.is_empty());
    }

    /// A sphere resting between two capsule ends touches the segment core.
    #[test]
    fn test_sphere_capsule() {
        let mut manifold = empty_manifold();
        sphere_vs_capsule(
            Vec3::new(0.0, 0.65, 0.0),
            0.25,
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            0.5,
            0.0,
            &mut manifold,
        );

        assert_eq!(manifold.points.len(), 1);
        let point = manifold.points[0];
        // Sphere above the capsule, normal from sphere down to it
        assert!((point.normal + Vec3::unit_y()).magnitude() < 1e-9);
        assert!((point.depth() - 0.1).abs() < 1e-9);
    }

    /// Crossed capsules touch at the segment gap.
    #[test]
    fn test_capsule_pair() {
        let mut manifold = empty_manifold();
        capsule_vs_capsule(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            0.3,
            Vec3::new(0.0, 0.5, -1.0),
            Vec3::new(0.0, 0.5, 1.0),
            0.3,
            0.0,
            &mut manifold,
        );

        assert_eq!(manifold.points.len(), 1);
        let point = manifold.points[0];
        assert!((point.normal - Vec3::unit_y()).magnitude() < 1e-9);
        assert!((point.depth() - 0.1).abs() < 1e-9);
    }
}
