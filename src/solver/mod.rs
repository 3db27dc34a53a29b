//! Sequential impulse constraint solver.
//!
//! Contacts and joints are swept in insertion order for a fixed number of
//! Gauss-Seidel iterations; the trailing iterations also correct positions.

pub mod anchor;
pub mod angular;
pub mod axis;
pub mod cone;
pub mod contact;
pub mod hinge;
pub mod hinge_axis;
pub mod motor;

use slotmap::SlotMap;

use crate::body::{ObjectKey, PhysicsObject, RigidBody};
use crate::data::PhysicsData;
use crate::math::{Mat3, Quat, Real, Vec3};

/// Mutable view on the one or two bodies a constraint acts on.
///
/// The second body is absent for constraints against the world.
pub struct BodyPair<'a> {
    /// First body.
    pub first: &'a mut RigidBody,
    /// Second body, `None` meaning the immovable world.
    pub second: Option<&'a mut RigidBody>,
}

impl BodyPair<'_> {
    fn body(&self, index: usize) -> Option<&RigidBody> {
        match index {
            0 => Some(self.first),
            _ => self.second.as_deref(),
        }
    }

    /// Inverse mass, zero for the world.
    pub fn inv_mass(&self, index: usize) -> Real {
        self.body(index).map_or(0.0, |body| body.inv_mass)
    }

    /// World-space inverse inertia, zero for the world.
    pub fn inv_inertia(&self, index: usize) -> Mat3 {
        self.body(index)
            .map_or_else(Mat3::zero, |body| body.inv_inertia_world)
    }

    /// Linear velocity, zero for the world.
    pub fn linear_velocity(&self, index: usize) -> Vec3 {
        self.body(index).map_or_else(Vec3::zero, |body| body.linear_velocity)
    }

    /// Angular velocity, zero for the world.
    pub fn angular_velocity(&self, index: usize) -> Vec3 {
        self.body(index)
            .map_or_else(Vec3::zero, |body| body.angular_velocity)
    }

    /// Position, zero for the world.
    pub fn position(&self, index: usize) -> Vec3 {
        self.body(index)
            .map_or_else(Vec3::zero, |body| body.transform.position)
    }

    /// Orientation, identity for the world.
    pub fn orientation(&self, index: usize) -> Quat {
        self.body(index)
            .map_or_else(Quat::identity, |body| body.transform.orientation)
    }

    /// Whether the indexed body takes part in the simulation step.
    pub fn is_active(&self, index: usize) -> bool {
        self.body(index).is_some_and(RigidBody::is_active)
    }

    /// Wake both bodies.
    pub fn activate(&mut self) {
        self.first.activate();
        if let Some(second) = self.second.as_deref_mut() {
            second.activate();
        }
    }

    /// Add to the velocities of one side.
    pub fn apply_velocity(&mut self, index: usize, linear: Vec3, angular: Vec3) {
        let body = match index {
            0 => &mut *self.first,
            _ => match self.second.as_deref_mut() {
                Some(body) => body,
                None => return,
            },
        };

        body.apply_velocity_impulse(linear, angular);
    }

    /// Add to the positional correction accumulators of one side.
    pub fn apply_position(&mut self, index: usize, linear: Vec3, angular: Vec3) {
        let body = match index {
            0 => &mut *self.first,
            _ => match self.second.as_deref_mut() {
                Some(body) => body,
                None => return,
            },
        };

        body.apply_position_impulse(linear, angular);
    }
}

/// Borrow the bodies of a constraint out of the object arena.
///
/// Returns `None` when a referenced object is gone or aliased.
pub fn body_pair(
    objects: &mut SlotMap<ObjectKey, PhysicsObject>,
    first: ObjectKey,
    second: Option<ObjectKey>,
) -> Option<BodyPair<'_>> {
    match second {
        Some(second) if second != first => {
            let [a, b] = objects.get_disjoint_mut([first, second])?;
            Some(BodyPair {
                first: &mut a.rigid_body,
                second: Some(&mut b.rigid_body),
            })
        }
        Some(_) => None,
        None => Some(BodyPair {
            first: &mut objects.get_mut(first)?.rigid_body,
            second: None,
        }),
    }
}

/// Run the solver over all contact and joint constraints.
pub fn solve(data: &mut PhysicsData, dt: Real) {
    puffin::profile_scope!("Constraint solver");

    let settings = data.settings.clone();
    let velocity_iterations = settings.velocity_iterations.max(1);
    let position_iterations = settings.position_iterations.min(velocity_iterations);

    let mut dead_keys = Vec::new();
    for iteration in 0..velocity_iterations {
        let first = iteration == 0;
        let last = iteration + 1 == velocity_iterations;
        let correct_position = iteration >= velocity_iterations - position_iterations;

        // Contact constraints, in narrow phase insertion order
        let mut contacts = core::mem::take(&mut data.contact_constraints);
        for constraint in contacts.iter_mut() {
            if first {
                constraint.warm_start(
                    &mut data.objects,
                    &data.contact_impulse_cache,
                    &settings,
                    dt,
                );
            }
            constraint.solve(
                &mut data.objects,
                &settings,
                correct_position,
                last,
                &mut data.contact_impulse_cache,
            );
        }
        data.contact_constraints = contacts;

        // Hinge joints
        let mut hinges = core::mem::take(&mut data.hinge_constraints);
        for (key, joint) in hinges.iter_mut() {
            if first {
                if !joint.is_valid(&data.objects) {
                    dead_keys.push(key);
                    continue;
                }
                joint.warm_start(&mut data.objects);
            }
            joint.solve(&mut data.objects, settings.baumgarte_factor, correct_position);
        }
        for key in dead_keys.drain(..) {
            hinges.remove(key);
        }
        data.hinge_constraints = hinges;

        // Cone joints
        let mut cones = core::mem::take(&mut data.cone_constraints);
        let mut dead_cones = Vec::new();
        for (key, joint) in cones.iter_mut() {
            if first {
                if !joint.is_valid(&data.objects) {
                    dead_cones.push(key);
                    continue;
                }
                joint.warm_start(&mut data.objects);
            }
            joint.solve(&mut data.objects, settings.baumgarte_factor, correct_position);
        }
        for key in dead_cones {
            cones.remove(key);
        }
        data.cone_constraints = cones;

        // Motor joints
        let mut motors = core::mem::take(&mut data.motor_constraints);
        let mut dead_motors = Vec::new();
        for (key, joint) in motors.iter_mut() {
            if first {
                if !joint.is_valid(&data.objects) {
                    dead_motors.push(key);
                    continue;
                }
                joint.warm_start(&mut data.objects);
            }
            joint.solve(
                &mut data.objects,
                dt,
                settings.baumgarte_factor,
                correct_position,
            );
        }
        for key in dead_motors {
            motors.remove(key);
        }
        data.motor_constraints = motors;
    }
}
