//! Mass and inertia tensor calculation for the collider shapes.
//!
//! Tensors are expressed about the body origin in local axes, which is the
//! frame the integrator rotates about.

use crate::math::{self, Mat3, Real, Transform3, Vec3, PI};

/// Mass distribution of a shape.
#[derive(Debug, Clone, Copy)]
pub struct MassProperties {
    /// Total mass.
    pub mass: Real,
    /// Centre of mass in the shape's local frame.
    pub com: Vec3,
    /// Inertia tensor about the local origin.
    pub inertia: Mat3,
}

impl MassProperties {
    /// Mass distribution of a solid sphere.
    pub fn sphere(center: Vec3, radius: Real, density: Real) -> Self {
        let mass = density * (4.0 / 3.0) * PI * radius.powi(3);
        let diag = (2.0 / 5.0) * mass * radius * radius;

        let mut inertia = diagonal(diag, diag, diag);
        inertia = inertia + parallel_axis(mass, center);

        Self {
            mass,
            com: center,
            inertia,
        }
    }

    /// Mass distribution of a solid capsule between two endpoints.
    pub fn capsule(start: Vec3, end: Vec3, radius: Real, density: Real) -> Self {
        let axis = end - start;
        let height = axis.magnitude();
        let com = (start + end) * 0.5;

        let cylinder_mass = density * PI * radius * radius * height;
        let caps_mass = density * (4.0 / 3.0) * PI * radius.powi(3);
        let mass = cylinder_mass + caps_mass;

        // Principal tensor with the capsule axis along y
        let axial = cylinder_mass * radius * radius * 0.5
            + caps_mass * (2.0 / 5.0) * radius * radius;
        let perpendicular = cylinder_mass * (height * height / 12.0 + radius * radius / 4.0)
            + caps_mass
                * ((2.0 / 5.0) * radius * radius
                    + height * height / 4.0
                    + (3.0 / 8.0) * height * radius);
        let principal = diagonal(perpendicular, axial, perpendicular);

        // Rotate the principal frame onto the actual axis
        let rotation = if height > Real::EPSILON {
            rotation_between(Vec3::unit_y(), axis / height)
        } else {
            Mat3::identity()
        };
        let inertia = rotation * principal * rotation.transposed() + parallel_axis(mass, com);

        Self { mass, com, inertia }
    }

    /// Mass distribution of a closed triangulated convex hull.
    ///
    /// Triangles must wind consistently with outward normals.
    pub fn convex_hull(vertices: &[Vec3], triangles: &[[u32; 3]], density: Real) -> Self {
        let mut volume = 0.0;
        let mut weighted_com = Vec3::zero();
        // Second moment integrals per coordinate pair
        let mut products = [[0.0 as Real; 3]; 3];

        for triangle in triangles {
            let a = vertices[triangle[0] as usize];
            let b = vertices[triangle[1] as usize];
            let c = vertices[triangle[2] as usize];

            let det = a.dot(b.cross(c));
            volume += det / 6.0;
            weighted_com += (a + b + c) * (det / 24.0);

            let a = [a.x, a.y, a.z];
            let b = [b.x, b.y, b.z];
            let c = [c.x, c.y, c.z];
            for i in 0..3 {
                for j in i..3 {
                    let integral = 2.0 * (a[i] * a[j] + b[i] * b[j] + c[i] * c[j])
                        + a[i] * b[j]
                        + a[j] * b[i]
                        + b[i] * c[j]
                        + b[j] * c[i]
                        + c[i] * a[j]
                        + c[j] * a[i];
                    products[i][j] += det / 120.0 * integral;
                }
            }
        }

        let mass = density * volume;
        let com = if volume > Real::EPSILON {
            weighted_com / volume
        } else {
            Vec3::zero()
        };

        let (xx, yy, zz) = (products[0][0], products[1][1], products[2][2]);
        let (xy, xz, yz) = (products[0][1], products[0][2], products[1][2]);
        let inertia = Mat3::from_row_arrays([
            [density * (yy + zz), -density * xy, -density * xz],
            [-density * xy, density * (xx + zz), -density * yz],
            [-density * xz, -density * yz, density * (xx + yy)],
        ]);

        Self { mass, com, inertia }
    }

    /// Assemble parts placed with local transforms into one distribution.
    pub fn compound<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = (&'a MassProperties, &'a Transform3)>,
    {
        let mut mass = 0.0;
        let mut weighted_com = Vec3::zero();
        let mut inertia = Mat3::zero();

        for (part, placement) in parts {
            let rotation = placement.rotation_matrix();
            let com = placement.transform_point(part.com);

            // Re-express the part tensor about the compound origin: strip the
            // part-origin shift, rotate, then shift to the new origin.
            let about_com = part.inertia + math::mat3_scaled(parallel_axis(part.mass, part.com), -1.0);
            let rotated = rotation * about_com * rotation.transposed();

            inertia = inertia + rotated + parallel_axis(part.mass, com);
            weighted_com += com * part.mass;
            mass += part.mass;
        }

        let com = if mass > Real::EPSILON {
            weighted_com / mass
        } else {
            Vec3::zero()
        };

        Self { mass, com, inertia }
    }
}

/// Diagonal tensor.
fn diagonal(x: Real, y: Real, z: Real) -> Mat3 {
    Mat3::from_row_arrays([[x, 0.0, 0.0], [0.0, y, 0.0], [0.0, 0.0, z]])
}

/// Parallel axis term for shifting a tensor away from the centre of mass.
fn parallel_axis(mass: Real, offset: Vec3) -> Mat3 {
    let d = offset;
    let dd = d.dot(d);

    Mat3::from_row_arrays([
        [mass * (dd - d.x * d.x), -mass * d.x * d.y, -mass * d.x * d.z],
        [-mass * d.x * d.y, mass * (dd - d.y * d.y), -mass * d.y * d.z],
        [-mass * d.x * d.z, -mass * d.y * d.z, mass * (dd - d.z * d.z)],
    ])
}

/// Shortest rotation mapping one unit vector onto another.
fn rotation_between(from: Vec3, to: Vec3) -> Mat3 {
    let dot = from.dot(to).clamp(-1.0, 1.0);
    if dot > 1.0 - 1e-9 {
        return Mat3::identity();
    }

    let axis = if dot < -1.0 + 1e-9 {
        math::perpendicular_normalized(from)
    } else {
        from.cross(to).normalized()
    };
    let angle = dot.acos();

    math::quat_to_mat3(math::rotation_quaternion(axis * angle))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit cube triangles with outward winding.
    fn cube_mesh() -> (Vec<Vec3>, Vec<[u32; 3]>) {
        let h = 0.5;
        let vertices = vec![
            Vec3::new(-h, -h, -h),
            Vec3::new(h, -h, -h),
            Vec3::new(h, h, -h),
            Vec3::new(-h, h, -h),
            Vec3::new(-h, -h, h),
            Vec3::new(h, -h, h),
            Vec3::new(h, h, h),
            Vec3::new(-h, h, h),
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [1, 2, 6],
            [1, 6, 5],
            [0, 4, 7],
            [0, 7, 3],
        ];

        (vertices, triangles)
    }

    /// Hull integration must reproduce the analytic cube tensor.
    #[test]
    fn test_cube_tensor() {
        let (vertices, triangles) = cube_mesh();
        let properties = MassProperties::convex_hull(&vertices, &triangles, 2.0);

        // Volume 1, density 2
        assert!((properties.mass - 2.0).abs() < 1e-6);
        assert!(properties.com.magnitude() < 1e-6);

        let expected = properties.mass / 6.0;
        let rows = properties.inertia.into_row_arrays();
        for (r, row) in rows.iter().enumerate() {
            for (c, e) in row.iter().enumerate() {
                let target = if r == c { expected } else { 0.0 };
                assert!((e - target).abs() < 1e-6);
            }
        }
    }

    /// Sphere tensor with an offset centre picks up the parallel axis term.
    #[test]
    fn test_sphere_tensor() {
        let centered = MassProperties::sphere(Vec3::zero(), 0.5, 1.3);
        let expected_mass = 1.3 * (4.0 / 3.0) * PI * 0.125;
        assert!((centered.mass - expected_mass).abs() < 1e-6);

        let offset = MassProperties::sphere(Vec3::new(0.0, 2.0, 0.0), 0.5, 1.3);
        let rows = offset.inertia.into_row_arrays();
        let centered_rows = centered.inertia.into_row_arrays();

        // The y axis stays untouched, x and z gain m·d²
        assert!((rows[1][1] - centered_rows[1][1]).abs() < 1e-6);
        assert!((rows[0][0] - (centered_rows[0][0] + offset.mass * 4.0)).abs() < 1e-6);
    }

    /// A capsule aligned with x must swap its principal axes accordingly.
    #[test]
    fn test_capsule_axis_rotation() {
        let along_y =
            MassProperties::capsule(Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0), 0.3, 1.0);
        let along_x =
            MassProperties::capsule(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.3, 1.0);

        let y_rows = along_y.inertia.into_row_arrays();
        let x_rows = along_x.inertia.into_row_arrays();
        assert!((y_rows[1][1] - x_rows[0][0]).abs() < 1e-6);
        assert!((y_rows[0][0] - x_rows[1][1]).abs() < 1e-6);
    }
}
