//! Shared 3-DoF anchor point constraint block.

use crate::math::{self, Mat3, Real, Vec3};
use crate::solver::BodyPair;

/// Pins one world-space point of each body together.
///
/// The ball-and-socket part of every joint; rotation stays free.
#[derive(Debug, Clone, Default)]
pub struct AnchorPointConstraint {
    /// World inverse inertia times the anchor skew matrix, per body.
    inertia_r: [Mat3; 2],
    /// Inverted effective mass matrix of the three rows.
    effective_mass: Mat3,
    /// Vector from the world anchor to each body origin.
    r: [Vec3; 2],
    /// Impulse accumulated over the solver iterations.
    pub total_lambda: Vec3,
    /// A singular effective mass deactivates the block for the step.
    active: bool,
}

impl AnchorPointConstraint {
    /// Prepare the block from the body-local anchor points.
    pub fn initialise(&mut self, bodies: &BodyPair, local_anchors: [Vec3; 2]) {
        let mut mass_sum = 0.0;
        let mut k = Mat3::zero();

        for index in 0..2 {
            self.r[index] = math::rotate(bodies.orientation(index), -local_anchors[index]);

            let rx = math::skew(self.r[index]);
            let inv_inertia = bodies.inv_inertia(index);
            self.inertia_r[index] = inv_inertia * rx;
            mass_sum += bodies.inv_mass(index);
            k = k + rx * inv_inertia * rx.transposed();
        }

        k = k + math::mat3_scaled(Mat3::identity(), mass_sum);
        match math::mat3_inverse(k) {
            Some(inverse) => {
                self.effective_mass = inverse;
                self.active = true;
            }
            None => self.active = false,
        }
    }

    /// Re-apply the impulse accumulated in the previous frame.
    pub fn warm_start(&mut self, bodies: &mut BodyPair) {
        if !self.active {
            return;
        }

        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_velocity(
                index,
                self.total_lambda * bodies.inv_mass(index) * sign,
                self.inertia_r[index] * self.total_lambda * sign,
            );
        }
    }

    /// One velocity sweep driving the anchor velocities together.
    pub fn solve_velocity(&mut self, bodies: &mut BodyPair) {
        if !self.active {
            return;
        }

        let jv = bodies.linear_velocity(0)
            - self.r[0].cross(bodies.angular_velocity(0))
            - bodies.linear_velocity(1)
            + self.r[1].cross(bodies.angular_velocity(1));

        let lambda = self.effective_mass * jv;
        self.total_lambda += lambda;

        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_velocity(
                index,
                lambda * bodies.inv_mass(index) * sign,
                self.inertia_r[index] * lambda * sign,
            );
        }
    }

    /// Baumgarte correction of the anchor separation.
    pub fn solve_position(&mut self, bodies: &mut BodyPair, baumgarte_factor: Real) {
        if !self.active {
            return;
        }

        let separation =
            (bodies.position(1) - bodies.position(0)) - (self.r[1] - self.r[0]);
        if separation.magnitude_squared() == 0.0 {
            return;
        }

        let lambda = self.effective_mass * separation * -baumgarte_factor;
        for index in 0..2 {
            let sign = if index == 0 { -1.0 } else { 1.0 };
            bodies.apply_position(
                index,
                lambda * bodies.inv_mass(index) * sign,
                self.inertia_r[index] * lambda * sign,
            );
        }
    }

    /// World-space separation between the two anchors.
    pub fn anchor_separation(&self, bodies: &BodyPair) -> Real {
        ((bodies.position(1) - bodies.position(0)) - (self.r[1] - self.r[0])).magnitude()
    }
}
