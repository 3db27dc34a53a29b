//! Single linear-axis constraint block shared by the contact solver.

use crate::math::{Real, Vec3};
use crate::solver::BodyPair;

/// 1-DoF constraint along a world-space axis applied at per-body anchors.
///
/// The accumulated impulse is clamped to the interval the owner passes in,
/// which makes the same block serve equalities and contact inequalities.
#[derive(Debug, Clone, Default)]
pub struct AxisConstraint {
    /// Anchor offsets crossed with the axis, per body.
    r_cross_axis: [Vec3; 2],
    /// The above premultiplied by the world inverse inertia.
    inertia_r_cross_axis: [Vec3; 2],
    /// Scalar effective mass of the constraint row.
    effective_mass: Real,
    /// Impulse accumulated over the solver iterations.
    pub total_lambda: Real,
    /// Target constraint-space velocity.
    bias: Real,
}

impl AxisConstraint {
    /// Prepare the row for an axis and per-body anchor offsets.
    pub fn initialise(&mut self, axis: Vec3, bodies: &BodyPair, r: [Vec3; 2], bias: Real) {
        let mut mass_sum = 0.0;
        for index in 0..2 {
            self.r_cross_axis[index] = r[index].cross(axis);
            self.inertia_r_cross_axis[index] =
                bodies.inv_inertia(index) * self.r_cross_axis[index];

            mass_sum += bodies.inv_mass(index)
                + self.inertia_r_cross_axis[index].dot(self.r_cross_axis[index]);
        }

        self.effective_mass = if mass_sum > Real::EPSILON {
            mass_sum.recip()
        } else {
            0.0
        };
        self.bias = bias;
    }

    /// Re-apply the impulse accumulated in the previous frame.
    pub fn warm_start(&mut self, axis: Vec3, bodies: &mut BodyPair, cached_lambda: Real) {
        self.total_lambda = cached_lambda;
        if cached_lambda == 0.0 {
            return;
        }

        let linear_impulse = axis * cached_lambda;
        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_velocity(
                index,
                linear_impulse * bodies.inv_mass(index) * sign,
                self.inertia_r_cross_axis[index] * cached_lambda * sign,
            );
        }
    }

    /// One velocity sweep, clamping the running impulse to the interval.
    pub fn solve_velocity(
        &mut self,
        axis: Vec3,
        bodies: &mut BodyPair,
        min_lambda: Real,
        max_lambda: Real,
    ) {
        if self.effective_mass == 0.0 {
            return;
        }

        let jv = axis.dot(bodies.linear_velocity(1) - bodies.linear_velocity(0))
            + self.r_cross_axis[1].dot(bodies.angular_velocity(1))
            - self.r_cross_axis[0].dot(bodies.angular_velocity(0));

        let lambda = -(jv - self.bias) * self.effective_mass;

        let previous = self.total_lambda;
        self.total_lambda = (self.total_lambda + lambda).clamp(min_lambda, max_lambda);
        let lambda = self.total_lambda - previous;
        if lambda == 0.0 {
            return;
        }

        let linear_impulse = axis * lambda;
        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_velocity(
                index,
                linear_impulse * bodies.inv_mass(index) * sign,
                self.inertia_r_cross_axis[index] * lambda * sign,
            );
        }
    }

    /// Baumgarte position correction of the remaining error.
    pub fn solve_position(
        &mut self,
        axis: Vec3,
        bodies: &mut BodyPair,
        baumgarte_factor: Real,
        error: &mut Real,
    ) {
        if self.effective_mass == 0.0 || *error == 0.0 {
            return;
        }

        let lambda = -self.effective_mass * baumgarte_factor * *error;

        let linear_impulse = axis * lambda;
        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_position(
                index,
                linear_impulse * bodies.inv_mass(index) * sign,
                self.inertia_r_cross_axis[index] * lambda * sign,
            );
        }

        *error *= 1.0 - baumgarte_factor;
    }
}
