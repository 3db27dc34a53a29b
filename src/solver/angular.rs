//! Shared 1-DoF angular constraint block.

use crate::math::{Real, Vec3};
use crate::solver::BodyPair;

/// Constrains the relative rotation rate about one world-space axis.
///
/// Cone limits clamp its impulse one-sided; motors feed it a velocity
/// target through the bias.
#[derive(Debug, Clone, Default)]
pub struct AngularRotationConstraint {
    /// World inverse inertia times the axis, per body.
    inertia_axis: [Vec3; 2],
    /// Scalar effective mass of the row.
    effective_mass: Real,
    /// Impulse accumulated over the solver iterations.
    pub total_lambda: Real,
    /// Target relative rotation rate about the axis.
    bias: Real,
}

impl AngularRotationConstraint {
    /// Prepare the row for an axis and a velocity target.
    pub fn initialise(&mut self, bodies: &BodyPair, axis: Vec3, bias: Real) {
        for index in 0..2 {
            self.inertia_axis[index] = bodies.inv_inertia(index) * axis;
        }

        let mass_sum = axis.dot(self.inertia_axis[0] + self.inertia_axis[1]);
        self.effective_mass = if mass_sum > Real::EPSILON {
            mass_sum.recip()
        } else {
            0.0
        };
        self.bias = bias;
    }

    /// Re-apply the impulse accumulated in the previous frame.
    pub fn warm_start(&mut self, bodies: &mut BodyPair) {
        if !self.is_active() || self.total_lambda == 0.0 {
            return;
        }

        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_velocity(
                index,
                Vec3::zero(),
                self.inertia_axis[index] * self.total_lambda * sign,
            );
        }
    }

    /// One velocity sweep, clamping the running impulse to the interval.
    pub fn solve_velocity(
        &mut self,
        bodies: &mut BodyPair,
        axis: Vec3,
        min_lambda: Real,
        max_lambda: Real,
    ) {
        if !self.is_active() {
            return;
        }

        let jv = axis.dot(bodies.angular_velocity(0) - bodies.angular_velocity(1));
        let lambda = self.effective_mass * (jv - self.bias);

        let previous = self.total_lambda;
        self.total_lambda = (self.total_lambda + lambda).clamp(min_lambda, max_lambda);
        let lambda = self.total_lambda - previous;
        if lambda == 0.0 {
            return;
        }

        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_velocity(index, Vec3::zero(), self.inertia_axis[index] * lambda * sign);
        }
    }

    /// Baumgarte correction of an angular error about the axis.
    pub fn solve_position(&mut self, bodies: &mut BodyPair, error: Real, baumgarte_factor: Real) {
        if !self.is_active() {
            return;
        }

        let lambda = -self.effective_mass * baumgarte_factor * error;
        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_position(index, Vec3::zero(), self.inertia_axis[index] * lambda * sign);
        }
    }

    /// Stop contributing until the next initialise.
    pub fn deactivate(&mut self) {
        self.effective_mass = 0.0;
        self.total_lambda = 0.0;
    }

    /// Whether the row participates this step.
    pub fn is_active(&self) -> bool {
        self.effective_mass != 0.0
    }
}
