//! Rigid body state and its integrator.

use arrayvec::ArrayVec;
use slotmap::new_key_type;

use crate::collider::ColliderId;
use crate::island::IslandKey;
use crate::math::{self, Mat3, Real, Transform3, Vec3};
use crate::settings::RigidBodySettings;

new_key_type! {
    /// Key into the physics object arena.
    pub struct ObjectKey;
}

/// Body may be put to sleep when its motion stays low.
const FLAG_MAY_SLEEP: u8 = 0b0000_0001;
/// Body is integrated and solved.
const FLAG_ACTIVE: u8 = 0b0000_0010;
/// Body was woken since its last integration and needs its motion floored.
const FLAG_WAKE_PENDING: u8 = 0b0000_0100;

/// What the position integration did with a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationResult {
    /// Transform advanced.
    Moved,
    /// Transform advanced but the motion metric is below the sleep
    /// threshold; the island pass decides whether the body actually sleeps
    /// so islands go down together.
    SleepCandidate,
    /// Inactive or static, nothing happened.
    Skipped,
}

/// Dynamic state of a simulated body.
#[derive(Debug, Clone)]
pub struct RigidBody {
    /// Current placement.
    pub transform: Transform3,
    /// Placement before the last position integration.
    pub prev_transform: Transform3,
    /// Reciprocal of the mass, zero for static bodies.
    pub inv_mass: Real,
    /// Inverse inertia tensor in the body frame.
    pub inv_inertia_local: Mat3,
    /// Inverse inertia tensor rotated into world space, used by the solver.
    pub inv_inertia_world: Mat3,
    /// Velocity of the origin.
    pub linear_velocity: Vec3,
    /// Rotation rate around the origin.
    pub angular_velocity: Vec3,
    /// Forces gathered since the last integration.
    force_accumulated: Vec3,
    /// Torques gathered since the last integration.
    torque_accumulated: Vec3,
    /// Positional correction accumulated by the solver, applied on
    /// integration and feeding the sleep metric.
    pub delta_position: Vec3,
    /// Axis-angle encoded orientation correction, handled like
    /// `delta_position`.
    pub delta_orientation: Vec3,
    /// Exponential moving average of the squared per-step movement.
    pub motion: Real,
    /// Back-reference to the collider this body carries.
    pub collider_id: ColliderId,
    /// Sleep and activity bits.
    flags: u8,
}

impl RigidBody {
    /// Construct an active dynamic body at a placement.
    ///
    /// Mass properties start infinite and are assigned separately.
    pub fn new(transform: Transform3, collider_id: ColliderId, max_motion: Real) -> Self {
        Self {
            transform,
            prev_transform: transform,
            inv_mass: 0.0,
            inv_inertia_local: Mat3::zero(),
            inv_inertia_world: Mat3::zero(),
            linear_velocity: Vec3::zero(),
            angular_velocity: Vec3::zero(),
            force_accumulated: Vec3::zero(),
            torque_accumulated: Vec3::zero(),
            delta_position: Vec3::zero(),
            delta_orientation: Vec3::zero(),
            motion: max_motion,
            collider_id,
            flags: FLAG_MAY_SLEEP | FLAG_ACTIVE,
        }
    }

    /// Assign mass and the inertia tensor about the body origin.
    ///
    /// A non-finite or non-positive mass makes the body static.
    pub fn set_mass_properties(&mut self, mass: Real, inertia: Mat3) {
        if !(mass > 0.0) || !mass.is_finite() {
            self.make_static();
            return;
        }

        self.inv_mass = mass.recip();
        self.inv_inertia_local = math::mat3_inverse(inertia).unwrap_or_else(Mat3::zero);
        self.update_world_inertia();
    }

    /// Give the body infinite mass and stop integrating it.
    pub fn make_static(&mut self) {
        self.inv_mass = 0.0;
        self.inv_inertia_local = Mat3::zero();
        self.inv_inertia_world = Mat3::zero();
        self.linear_velocity = Vec3::zero();
        self.angular_velocity = Vec3::zero();
        self.flags &= !FLAG_ACTIVE;
    }

    /// Whether the body takes part in integration and solving.
    pub fn is_active(&self) -> bool {
        self.flags & FLAG_ACTIVE != 0
    }

    /// Whether the sleep policy applies to this body.
    pub fn can_sleep(&self) -> bool {
        self.flags & FLAG_MAY_SLEEP != 0
    }

    /// Allow or forbid sleeping.
    pub fn set_may_sleep(&mut self, may_sleep: bool) {
        if may_sleep {
            self.flags |= FLAG_MAY_SLEEP;
        } else {
            self.flags &= !FLAG_MAY_SLEEP;
        }
    }

    /// Whether the body can never move.
    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0
    }

    /// Wake the body up.
    pub fn activate(&mut self) {
        if self.is_active() || self.is_static() {
            return;
        }

        self.flags |= FLAG_ACTIVE | FLAG_WAKE_PENDING;
    }

    /// Put the body to sleep, zeroing velocities and accumulators.
    pub fn deactivate(&mut self) {
        self.linear_velocity = Vec3::zero();
        self.angular_velocity = Vec3::zero();
        self.clear_accumulators();
        self.flags &= !FLAG_ACTIVE;
    }

    /// Reset the sleep metric to its ceiling so the body stays awake.
    pub fn set_motion_to_max(&mut self, settings: &RigidBodySettings) {
        self.motion = settings.max_motion;
    }

    /// Accumulate a force through the centre, waking the body.
    pub fn add_force(&mut self, force: Vec3) {
        self.force_accumulated += force;
        self.activate();
    }

    /// Accumulate a force at a world-space point, waking the body.
    pub fn add_force_at_point(&mut self, force: Vec3, point: Vec3) {
        self.force_accumulated += force;
        self.torque_accumulated += (point - self.transform.position).cross(force);
        self.activate();
    }

    /// Apply gravity, accumulated forces and damping to the velocities.
    ///
    /// Does not move the body; positions integrate after the solver ran.
    pub fn integrate_forces(&mut self, dt: Real, settings: &RigidBodySettings) {
        if !self.is_active() || self.is_static() {
            return;
        }

        self.linear_velocity +=
            (settings.gravity + self.force_accumulated * self.inv_mass) * dt;
        self.angular_velocity += self.inv_inertia_world * self.torque_accumulated * dt;

        self.linear_velocity *= Real::powf(settings.linear_damping, dt);
        self.angular_velocity *= Real::powf(settings.angular_damping, dt);
    }

    /// Advance the transform by the solved velocities and the solver's
    /// positional corrections, update the sleep metric, and clear the
    /// accumulators.
    pub fn integrate_positions(&mut self, dt: Real, settings: &RigidBodySettings) -> IntegrationResult {
        if !self.is_active() || self.is_static() {
            return IntegrationResult::Skipped;
        }

        if self.flags & FLAG_WAKE_PENDING != 0 {
            self.flags &= !FLAG_WAKE_PENDING;
            self.motion = self.motion.max(settings.least_motion);
        }

        self.delta_position += self.linear_velocity * dt;
        self.delta_orientation += self.angular_velocity * dt;

        let mut sleep_candidate = false;
        if self.can_sleep() {
            let bias = Real::powf(0.5, dt);
            self.motion = bias * self.motion
                + (1.0 - bias)
                    * (self.delta_position.magnitude_squared()
                        + self.delta_orientation.magnitude_squared());

            if self.motion < settings.sleep_epsilon {
                sleep_candidate = true;
            } else if self.motion > settings.max_motion {
                self.motion = settings.max_motion;
            }
        }

        self.prev_transform = self.transform;
        self.transform.position += self.delta_position;
        self.transform.orientation = (math::rotation_quaternion(self.delta_orientation)
            * self.transform.orientation)
            .normalized();
        self.update_world_inertia();

        self.clear_accumulators();

        if sleep_candidate {
            IntegrationResult::SleepCandidate
        } else {
            IntegrationResult::Moved
        }
    }

    /// Interpolate the transform back toward the previous one.
    ///
    /// Used by the time-of-impact bias so contacts fire just before
    /// penetration; velocities are left untouched.
    pub fn sub_step(&mut self, t: Real) {
        let backward = (self.prev_transform.position - self.transform.position) * t;
        let relative_rotation =
            self.prev_transform.orientation * self.transform.orientation.conjugate();
        let scaled_rotation = math::rotation_quaternion(math::axis_angle(relative_rotation) * t);

        self.transform.position += backward;
        self.transform.orientation = (scaled_rotation * self.transform.orientation).normalized();
        self.update_world_inertia();
    }

    /// How far the origin moved in the last integration.
    pub fn displacement(&self) -> Vec3 {
        self.transform.position - self.prev_transform.position
    }

    /// Velocity of a world-space point rigidly attached to the body.
    pub fn velocity_at_point(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.transform.position)
    }

    /// Apply an impulse directly to the velocities.
    pub fn apply_velocity_impulse(&mut self, linear: Vec3, angular: Vec3) {
        self.linear_velocity += linear;
        self.angular_velocity += angular;
    }

    /// Accumulate a positional pseudo-impulse for the next integration.
    pub fn apply_position_impulse(&mut self, linear: Vec3, angular: Vec3) {
        self.delta_position += linear;
        self.delta_orientation += angular;
    }

    /// Rotate the local inverse inertia tensor into world space.
    pub fn update_world_inertia(&mut self) {
        let rotation = self.transform.rotation_matrix();
        self.inv_inertia_world = rotation * self.inv_inertia_local * rotation.transposed();
    }

    /// Zero force, torque and positional accumulators.
    fn clear_accumulators(&mut self) {
        self.force_accumulated = Vec3::zero();
        self.torque_accumulated = Vec3::zero();
        self.delta_position = Vec3::zero();
        self.delta_orientation = Vec3::zero();
    }
}

/// A rigid body with its bookkeeping for the octree and the island pass.
#[derive(Debug, Clone)]
pub struct PhysicsObject {
    /// The simulated body.
    pub rigid_body: RigidBody,
    /// Island the body currently belongs to.
    pub island: Option<IslandKey>,
    /// Colliders this body never collides with, from jointed pairs.
    pub disabled_collisions: ArrayVec<ColliderId, 4>,
    /// Motion fell below the sleep threshold this step.
    pub sleep_candidate: bool,
}

impl PhysicsObject {
    /// Wrap a rigid body.
    pub fn new(rigid_body: RigidBody) -> Self {
        Self {
            rigid_body,
            island: None,
            disabled_collisions: ArrayVec::new(),
            sleep_candidate: false,
        }
    }

    /// Never generate contacts against the other collider.
    pub fn disable_collision_with(&mut self, other: ColliderId) {
        if self.disabled_collisions.contains(&other) {
            return;
        }
        if self.disabled_collisions.try_push(other).is_err() {
            log::warn!("disabled collision list full, pair stays collidable");
        }
    }

    /// Whether contacts against the other collider are suppressed.
    pub fn is_collision_disabled(&self, other: ColliderId) -> bool {
        self.disabled_collisions.contains(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RigidBodySettings;

    fn test_body() -> RigidBody {
        let settings = RigidBodySettings::default();
        let mut body = RigidBody::new(
            Transform3::default(),
            ColliderId::default(),
            settings.max_motion,
        );
        body.set_mass_properties(2.0, Mat3::from_row_arrays([
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]));

        body
    }

    /// Gravity and damping act on the velocity, positions move on the
    /// second half of the step.
    #[test]
    fn test_integration_split() {
        let settings = RigidBodySettings::default();
        let mut body = test_body();
        let dt = 1.0 / 60.0;

        body.integrate_forces(dt, &settings);
        assert!(body.linear_velocity.y < 0.0);
        assert!((body.transform.position - Vec3::zero()).magnitude() < 1e-12);

        let expected = body.linear_velocity.y * dt;
        assert_eq!(body.integrate_positions(dt, &settings), IntegrationResult::Moved);
        assert!((body.transform.position.y - expected).abs() < 1e-9);
        assert!((body.transform.orientation.magnitude() - 1.0).abs() < 1e-9);
    }

    /// A quiet body decays its motion metric and eventually deactivates,
    /// zeroing its velocities.
    #[test]
    fn test_sleep() {
        let mut settings = RigidBodySettings::default();
        settings.gravity = Vec3::zero();
        let mut body = test_body();
        let dt = 1.0 / 60.0;

        let mut became_candidate = false;
        for _ in 0..400 {
            body.integrate_forces(dt, &settings);
            if body.integrate_positions(dt, &settings) == IntegrationResult::SleepCandidate {
                became_candidate = true;
                break;
            }
        }

        assert!(became_candidate);
        // The island pass is what actually puts candidates to sleep
        body.deactivate();
        assert!(!body.is_active());
        assert_eq!(body.linear_velocity, Vec3::zero());

        // Waking floors the motion metric again
        body.add_force(Vec3::unit_x());
        assert!(body.is_active());
        body.integrate_forces(dt, &settings);
        body.integrate_positions(dt, &settings);
        assert!(body.motion >= settings.sleep_epsilon);
    }

    /// The time-of-impact sub-step walks back toward the previous
    /// placement without touching velocities.
    #[test]
    fn test_sub_step() {
        let settings = RigidBodySettings::default();
        let mut body = test_body();
        let dt = 1.0 / 60.0;
        body.linear_velocity = Vec3::new(6.0, 0.0, 0.0);
        body.set_may_sleep(false);

        body.integrate_positions(dt, &settings);
        let moved = body.transform.position.x;
        assert!(moved > 0.0);

        let velocity = body.linear_velocity;
        body.sub_step(0.5);
        assert!((body.transform.position.x - moved * 0.5).abs() < 1e-9);
        assert_eq!(body.linear_velocity, velocity);
    }
}
