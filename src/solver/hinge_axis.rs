//! Shared 2-DoF hinge axis constraint block.

use crate::math::{self, Real, Vec3};
use crate::solver::BodyPair;

/// Kills the two rotation degrees perpendicular to a hinge axis.
///
/// Rotation around the axis itself stays free for motors and limits.
#[derive(Debug, Clone, Default)]
pub struct HingeAxisConstraint {
    /// Hinge axis on the first body, world space.
    a1: Vec3,
    /// First perpendicular of the second body's axis.
    b2: Vec3,
    /// Second perpendicular of the second body's axis.
    c2: Vec3,
    /// Jacobian rows.
    b2_cross_a1: Vec3,
    c2_cross_a1: Vec3,
    /// Inverted symmetric 2x2 effective mass, stored as (m11, m12, m22).
    inverse_mass: (Real, Real, Real),
    /// Impulses accumulated over the solver iterations.
    pub total_lambda: (Real, Real),
    /// A singular effective mass deactivates the block for the step.
    active: bool,
}

impl HingeAxisConstraint {
    /// Prepare the block from the world-space hinge axes of both bodies.
    pub fn initialise(&mut self, bodies: &BodyPair, hinge_axis_a: Vec3, hinge_axis_b: Vec3) {
        self.a1 = hinge_axis_a;
        let mut a2 = hinge_axis_b;

        // A folded second axis would make the perpendicular frame collapse
        let dot = self.a1.dot(a2);
        if dot <= 1e-3 {
            let mut perpendicular = a2 - self.a1 * dot;
            if perpendicular.magnitude_squared() < 1e-6 {
                perpendicular = math::perpendicular_normalized(self.a1);
            }
            a2 = (perpendicular * 0.99 + self.a1 * 0.01).normalized();
        }

        self.b2 = math::perpendicular_normalized(a2);
        self.c2 = a2.cross(self.b2);
        self.b2_cross_a1 = self.b2.cross(self.a1);
        self.c2_cross_a1 = self.c2.cross(self.a1);

        let inertia_sum = bodies.inv_inertia(0) + bodies.inv_inertia(1);
        let v1 = inertia_sum * self.b2_cross_a1;
        let v2 = inertia_sum * self.c2_cross_a1;

        let k11 = self.b2_cross_a1.dot(v1);
        let k12 = self.b2_cross_a1.dot(v2);
        let k22 = self.c2_cross_a1.dot(v2);

        let determinant = k11 * k22 - k12 * k12;
        if determinant.abs() <= Real::EPSILON {
            self.active = false;
            return;
        }

        let inv_det = determinant.recip();
        self.inverse_mass = (k22 * inv_det, -k12 * inv_det, k11 * inv_det);
        self.active = true;
    }

    /// Re-apply the impulses accumulated in the previous frame.
    pub fn warm_start(&mut self, bodies: &mut BodyPair) {
        if !self.active {
            return;
        }

        self.apply_angular_impulse(bodies, self.total_lambda);
    }

    /// One velocity sweep zeroing rotation across the hinge axis.
    pub fn solve_velocity(&mut self, bodies: &mut BodyPair) {
        if !self.active {
            return;
        }

        let delta = bodies.angular_velocity(0) - bodies.angular_velocity(1);
        let jv = (self.b2_cross_a1.dot(delta), self.c2_cross_a1.dot(delta));
        let lambda = self.multiply_inverse_mass(jv);

        self.total_lambda.0 += lambda.0;
        self.total_lambda.1 += lambda.1;

        self.apply_angular_impulse(bodies, lambda);
    }

    /// Baumgarte correction of the axis misalignment.
    pub fn solve_position(&mut self, bodies: &mut BodyPair, baumgarte_factor: Real) {
        if !self.active {
            return;
        }

        let error = (self.a1.dot(self.b2), self.a1.dot(self.c2));
        if error.0 == 0.0 && error.1 == 0.0 {
            return;
        }

        let solved = self.multiply_inverse_mass(error);
        let lambda = (-solved.0 * baumgarte_factor, -solved.1 * baumgarte_factor);

        let impulse = self.b2_cross_a1 * lambda.0 + self.c2_cross_a1 * lambda.1;
        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_position(index, Vec3::zero(), bodies.inv_inertia(index) * impulse * sign);
        }
    }

    fn multiply_inverse_mass(&self, v: (Real, Real)) -> (Real, Real) {
        let (m11, m12, m22) = self.inverse_mass;

        (m11 * v.0 + m12 * v.1, m12 * v.0 + m22 * v.1)
    }

    fn apply_angular_impulse(&self, bodies: &mut BodyPair, lambda: (Real, Real)) {
        let impulse = self.b2_cross_a1 * lambda.0 + self.c2_cross_a1 * lambda.1;

        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_velocity(index, Vec3::zero(), bodies.inv_inertia(index) * impulse * sign);
        }
    }
}
