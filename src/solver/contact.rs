//! Contact constraint over a manifold of up to four points.

use std::collections::BTreeMap;

use arrayvec::ArrayVec;

use crate::body::{ObjectKey, PhysicsObject};
use crate::math::{self, Real, Vec3};
use crate::narrow_phase::manifold::{ContactManifold, REDUCED_MANIFOLD_POINTS};
use crate::settings::PhysicsSettings;
use crate::solver::axis::AxisConstraint;
use crate::solver::body_pair;

/// Accumulated impulses of one manifold, kept across frames for warm
/// starting.
#[derive(Debug, Clone, Default)]
pub struct ImpulseCacheEntry {
    /// Per contact point: feature id and the normal and two tangent
    /// impulses.
    pub points: ArrayVec<(u32, [Real; 3]), REDUCED_MANIFOLD_POINTS>,
    /// Steps left before eviction when untouched.
    pub retention: u8,
    /// Refreshed this step.
    pub touched: bool,
}

/// One solved contact point.
#[derive(Debug, Clone)]
struct PointConstraint {
    /// Contact point on the first body.
    position_on_a: Vec3,
    /// Contact point on the second body.
    position_on_b: Vec3,
    /// Normal from the first body to the second.
    normal: Vec3,
    /// First friction axis.
    tangent1: Vec3,
    /// Second friction axis.
    tangent2: Vec3,
    /// Distance between the surfaces, negative when penetrating.
    separation: Real,
    /// Remaining positional error being corrected.
    position_error: Real,
    /// Inequality row along the normal.
    normal_row: AxisConstraint,
    /// Friction row along the first tangent.
    tangent_row1: AxisConstraint,
    /// Friction row along the second tangent.
    tangent_row2: AxisConstraint,
    /// Persistent feature id.
    id: u32,
}

/// Sequential impulse contact constraint between two bodies.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    /// Object behind the first collider.
    pub object_a: ObjectKey,
    /// Object behind the second collider.
    pub object_b: ObjectKey,
    /// Manifold this constraint was generated from.
    pub manifold_id: u64,
    /// Combined friction coefficient.
    friction: Real,
    /// Combined restitution.
    restitution: Real,
    /// Per-point rows.
    points: ArrayVec<PointConstraint, REDUCED_MANIFOLD_POINTS>,
}

impl ContactConstraint {
    /// Build the constraint from a reduced manifold.
    pub fn new(manifold: &ContactManifold, object_a: ObjectKey, object_b: ObjectKey) -> Self {
        let friction = manifold.material_a.combine_frictions(&manifold.material_b);
        let restitution = manifold.material_a.combine_restitutions(&manifold.material_b);

        let mut points = ArrayVec::new();
        for point in manifold.points.iter().take(REDUCED_MANIFOLD_POINTS) {
            let tangent1 = math::perpendicular_normalized(point.normal);
            let tangent2 = point.normal.cross(tangent1);

            points.push(PointConstraint {
                position_on_a: point.position_on_a,
                position_on_b: point.position_on_b,
                normal: point.normal,
                tangent1,
                tangent2,
                separation: -point.depth(),
                position_error: 0.0,
                normal_row: AxisConstraint::default(),
                tangent_row1: AxisConstraint::default(),
                tangent_row2: AxisConstraint::default(),
                id: point.id,
            });
        }

        Self {
            object_a,
            object_b,
            manifold_id: manifold.id,
            friction,
            restitution,
            points,
        }
    }

    /// Prepare the rows, wake the pair and re-apply cached impulses.
    pub fn warm_start(
        &mut self,
        objects: &mut slotmap::SlotMap<ObjectKey, PhysicsObject>,
        cache: &BTreeMap<u64, ImpulseCacheEntry>,
        settings: &PhysicsSettings,
        dt: Real,
    ) {
        puffin::profile_function!();

        let Some(mut bodies) = body_pair(objects, self.object_a, Some(self.object_b)) else {
            return;
        };

        // Contact with an active body wakes a sleeping partner
        bodies.activate();

        let entry = cache.get(&self.manifold_id);
        for point in self.points.iter_mut() {
            let r = [
                point.position_on_a - bodies.position(0),
                point.position_on_b - bodies.position(1),
            ];

            // Closing speed decides the restitution target; separated
            // points instead allow just enough approach to touch.
            let relative = (bodies.linear_velocity(1)
                + bodies.angular_velocity(1).cross(r[1]))
                - (bodies.linear_velocity(0) + bodies.angular_velocity(0).cross(r[0]));
            let closing = -point.normal.dot(relative);

            let bias = if closing > settings.min_velocity_for_restitution {
                self.restitution * closing
            } else if point.separation > 0.0 {
                -point.separation / dt
            } else {
                0.0
            };

            point.normal_row.initialise(point.normal, &bodies, r, bias);
            point.tangent_row1.initialise(point.tangent1, &bodies, r, 0.0);
            point.tangent_row2.initialise(point.tangent2, &bodies, r, 0.0);

            point.position_error = (point.separation + settings.linear_slop).min(0.0);

            let cached = entry
                .and_then(|entry| entry.points.iter().find(|(id, _)| *id == point.id))
                .map_or([0.0; 3], |(_, impulses)| *impulses);
            point.normal_row.warm_start(point.normal, &mut bodies, cached[0]);
            point.tangent_row1.warm_start(point.tangent1, &mut bodies, cached[1]);
            point.tangent_row2.warm_start(point.tangent2, &mut bodies, cached[2]);
        }
    }

    /// One solver sweep over the rows of every point.
    pub fn solve(
        &mut self,
        objects: &mut slotmap::SlotMap<ObjectKey, PhysicsObject>,
        settings: &PhysicsSettings,
        correct_position: bool,
        last_iteration: bool,
        cache: &mut BTreeMap<u64, ImpulseCacheEntry>,
    ) {
        let Some(mut bodies) = body_pair(objects, self.object_a, Some(self.object_b)) else {
            return;
        };

        for point in self.points.iter_mut() {
            point
                .normal_row
                .solve_velocity(point.normal, &mut bodies, 0.0, Real::MAX);

            // Friction cone clamped by the running normal impulse
            let limit = self.friction * point.normal_row.total_lambda;
            point
                .tangent_row1
                .solve_velocity(point.tangent1, &mut bodies, -limit, limit);
            point
                .tangent_row2
                .solve_velocity(point.tangent2, &mut bodies, -limit, limit);

            if correct_position && point.position_error < 0.0 {
                point.normal_row.solve_position(
                    point.normal,
                    &mut bodies,
                    settings.baumgarte_factor,
                    &mut point.position_error,
                );
            }
        }

        if last_iteration {
            let mut entry = ImpulseCacheEntry {
                points: ArrayVec::new(),
                retention: settings.frames_to_retain_cache,
                touched: true,
            };
            for point in self.points.iter() {
                entry.points.push((
                    point.id,
                    [
                        point.normal_row.total_lambda,
                        point.tangent_row1.total_lambda,
                        point.tangent_row2.total_lambda,
                    ],
                ));
            }

            cache.insert(self.manifold_id, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::collider::ColliderId;
    use crate::material::PhysicsMaterial;
    use crate::math::{Mat3, Transform3};
    use crate::settings::RigidBodySettings;

    fn spawn_body(
        objects: &mut slotmap::SlotMap<ObjectKey, PhysicsObject>,
        y: Real,
        mass: Real,
    ) -> ObjectKey {
        let settings = RigidBodySettings::default();
        let mut body = RigidBody::new(
            Transform3::from_position(Vec3::new(0.0, y, 0.0)),
            ColliderId::default(),
            settings.max_motion,
        );
        if mass > 0.0 {
            body.set_mass_properties(mass, math::mat3_scaled(Mat3::identity(), mass / 6.0));
        } else {
            body.make_static();
        }

        objects.insert(PhysicsObject::new(body))
    }

    fn ground_manifold() -> ContactManifold {
        let mut manifold =
            ContactManifold::new(42, PhysicsMaterial::iron(), PhysicsMaterial::concrete());
        // Body resting on the ground, slightly penetrating
        manifold.add_contact(
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 0.49, 0.0),
            Vec3::new(0.0, 0.5, 0.0),
            3,
        );

        manifold
    }

    /// A falling body on a static floor has its approach velocity removed
    /// and the impulse lands in the cache.
    #[test]
    fn test_resting_contact(){
        let mut objects = slotmap::SlotMap::with_key();
        let falling = spawn_body(&mut objects, 1.0, 1.0);
        let floor = spawn_body(&mut objects, 0.0, 0.0);
        objects[falling].rigid_body.linear_velocity = Vec3::new(0.0, -0.5, 0.0);

        let manifold = ground_manifold();
        let mut constraint = ContactConstraint::new(&manifold, falling, floor);

        let settings = PhysicsSettings::default();
        let mut cache = BTreeMap::new();
        let dt = 1.0 / 60.0;

        constraint.warm_start(&mut objects, &cache, &settings, dt);
        for iteration in 0..settings.velocity_iterations {
            let last = iteration + 1 == settings.velocity_iterations;
            constraint.solve(&mut objects, &settings, last, last, &mut cache);
        }

        let velocity = objects[falling].rigid_body.linear_velocity;
        assert!(velocity.y.abs() < 1e-6, "approach velocity must vanish, got {velocity:?}");
        // The static floor never moves
        assert_eq!(objects[floor].rigid_body.linear_velocity, Vec3::zero());

        let entry = cache.get(&42).expect("impulse cached");
        assert_eq!(entry.points.len(), 1);
        assert_eq!(entry.points[0].0, 3);
        assert!(entry.points[0].1[0] > 0.0);
    }

    /// Warm starting from the cache pre-applies the previous impulse.
    #[test]
    fn test_warm_start_from_cache() {
        let mut objects = slotmap::SlotMap::with_key();
        let body = spawn_body(&mut objects, 1.0, 1.0);
        let floor = spawn_body(&mut objects, 0.0, 0.0);

        let manifold = ground_manifold();
        let mut constraint = ContactConstraint::new(&manifold, body, floor);

        let settings = PhysicsSettings::default();
        let mut cache = BTreeMap::new();
        let mut entry = ImpulseCacheEntry {
            retention: 10,
            touched: false,
            points: ArrayVec::new(),
        };
        entry.points.push((3, [0.6, 0.0, 0.0]));
        cache.insert(42, entry);

        constraint.warm_start(&mut objects, &cache, &settings, 1.0 / 60.0);

        // Normal points down from the body to the floor, so the cached
        // impulse pushes the body up
        assert!(objects[body].rigid_body.linear_velocity.y > 0.5);
    }
}
