//! Cone joint: ball-and-socket with a swing angle limit.

use slotmap::{new_key_type, SlotMap};

use crate::body::{ObjectKey, PhysicsObject};
use crate::collider::ColliderId;
use crate::data::PhysicsData;
use crate::math::{self, Real, Vec3};
use crate::solver::anchor::AnchorPointConstraint;
use crate::solver::angular::AngularRotationConstraint;
use crate::solver::body_pair;

new_key_type! {
    /// Key into the cone constraint arena.
    pub struct ConeKey;
}

/// User-facing description of a cone joint.
#[derive(Debug, Clone)]
pub struct ConeParameters {
    /// First jointed collider.
    pub collider_a: ColliderId,
    /// Second jointed collider, `None` pins against the world.
    pub collider_b: Option<ColliderId>,
    /// Anchor point in world space.
    pub anchor: Vec3,
    /// Twist axis shared by both bodies at rest, world space.
    pub twist_axis: Vec3,
    /// Half opening angle of the allowed cone, radians.
    pub half_cone_angle: Real,
    /// Suppress contacts between the jointed pair.
    pub disable_collisions: bool,
}

/// A body pair anchored together whose twist axes may swing apart only up
/// to the cone limit.
#[derive(Debug, Clone)]
pub struct ConeConstraint {
    /// Object behind the first collider.
    pub object_a: ObjectKey,
    /// Object behind the second collider, `None` for the world.
    pub object_b: Option<ObjectKey>,
    /// Anchor in each body frame.
    local_anchors: [Vec3; 2],
    /// Twist axis in each body frame.
    local_twist_axes: [Vec3; 2],
    /// Cosine of the allowed half angle.
    cos_half_cone_angle: Real,
    /// Axis the limit rotates around, cached as a fallback for the
    /// near-aligned singular case.
    world_rotation_axis: Vec3,
    /// Cosine of the current swing angle, sampled at warm start.
    cos_theta: Real,
    /// Ball-and-socket part.
    point: AnchorPointConstraint,
    /// One-sided swing limit.
    angle: AngularRotationConstraint,
    /// Both bodies were asleep at warm start.
    active: bool,
}

impl ConeConstraint {
    /// Build the joint, converting the world-space parameters into each
    /// body's frame.
    pub fn new(data: &PhysicsData, parameters: &ConeParameters) -> Option<Self> {
        let object_a = data.identifiers.get(parameters.collider_a)?.object;
        let object_b = match parameters.collider_b {
            Some(collider) => Some(data.identifiers.get(collider)?.object),
            None => None,
        };

        let twist_axis = parameters.twist_axis.normalized();
        let transform_a = data.objects.get(object_a)?.rigid_body.transform;
        let local_anchor_a = transform_a.inverse_transform_point(parameters.anchor);
        let local_twist_a = transform_a.inverse_transform_vector(twist_axis);

        let (local_anchor_b, local_twist_b) = match object_b {
            Some(object_b) => {
                let transform_b = data.objects.get(object_b)?.rigid_body.transform;
                (
                    transform_b.inverse_transform_point(parameters.anchor),
                    transform_b.inverse_transform_vector(twist_axis),
                )
            }
            None => (parameters.anchor, twist_axis),
        };

        Some(Self {
            object_a,
            object_b,
            local_anchors: [local_anchor_a, local_anchor_b],
            local_twist_axes: [local_twist_a, local_twist_b],
            cos_half_cone_angle: parameters.half_cone_angle.cos(),
            world_rotation_axis: math::perpendicular_normalized(twist_axis),
            cos_theta: 1.0,
            point: AnchorPointConstraint::default(),
            angle: AngularRotationConstraint::default(),
            active: false,
        })
    }

    /// Whether every referenced body still exists.
    pub fn is_valid(&self, objects: &SlotMap<ObjectKey, PhysicsObject>) -> bool {
        objects.contains_key(self.object_a)
            && self.object_b.map_or(true, |object| objects.contains_key(object))
    }

    /// Refresh world-space state and re-apply last frame's impulses.
    pub fn warm_start(&mut self, objects: &mut SlotMap<ObjectKey, PhysicsObject>) {
        let Some(mut bodies) = body_pair(objects, self.object_a, self.object_b) else {
            self.active = false;
            return;
        };

        self.active = bodies.is_active(0) || bodies.is_active(1);
        if !self.active {
            return;
        }
        bodies.activate();

        self.point.initialise(&bodies, self.local_anchors);
        self.point.warm_start(&mut bodies);

        let twist_a = math::rotate(bodies.orientation(0), self.local_twist_axes[0]);
        let twist_b = match self.object_b {
            Some(_) => math::rotate(bodies.orientation(1), self.local_twist_axes[1]),
            None => self.local_twist_axes[1],
        };

        self.cos_theta = twist_a.dot(twist_b);
        if self.cos_theta < self.cos_half_cone_angle {
            // The limit engages around the axis separating the two twists
            let rotation_axis = twist_b.cross(twist_a);
            let magnitude = rotation_axis.magnitude();
            if magnitude > 0.0 {
                self.world_rotation_axis = rotation_axis / magnitude;
            }

            self.angle.initialise(&bodies, self.world_rotation_axis, 0.0);
            self.angle.warm_start(&mut bodies);
        } else {
            self.angle.deactivate();
        }
    }

    /// One solver sweep.
    pub fn solve(
        &mut self,
        objects: &mut SlotMap<ObjectKey, PhysicsObject>,
        baumgarte_factor: Real,
        correct_position: bool,
    ) {
        if !self.active {
            return;
        }
        let Some(mut bodies) = body_pair(objects, self.object_a, self.object_b) else {
            return;
        };

        self.point.solve_velocity(&mut bodies);
        if correct_position {
            self.point.solve_position(&mut bodies, baumgarte_factor);
        }

        if self.angle.is_active() {
            self.angle
                .solve_velocity(&mut bodies, self.world_rotation_axis, 0.0, Real::MAX);
            if correct_position {
                self.angle.solve_position(
                    &mut bodies,
                    self.cos_theta - self.cos_half_cone_angle,
                    baumgarte_factor,
                );
            }
        }
    }
}
