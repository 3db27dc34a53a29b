//! Hinge joint: anchored point plus a free rotation axis.

use slotmap::{new_key_type, SlotMap};

use crate::body::{ObjectKey, PhysicsObject};
use crate::collider::ColliderId;
use crate::data::PhysicsData;
use crate::math::{self, Real, Vec3};
use crate::solver::anchor::AnchorPointConstraint;
use crate::solver::hinge_axis::HingeAxisConstraint;
use crate::solver::{body_pair, BodyPair};

new_key_type! {
    /// Key into the hinge constraint arena.
    pub struct HingeKey;
}

/// User-facing description of a hinge joint.
#[derive(Debug, Clone)]
pub struct HingeParameters {
    /// First jointed collider.
    pub collider_a: ColliderId,
    /// Second jointed collider, `None` pins against the world.
    pub collider_b: Option<ColliderId>,
    /// Anchor point in world space.
    pub anchor: Vec3,
    /// Hinge axis through the first body, world space.
    pub hinge_axis_a: Vec3,
    /// Hinge axis through the second body, world space.
    ///
    /// Chosen so both axes coincide when the joint is satisfied.
    pub hinge_axis_b: Vec3,
    /// Suppress contacts between the jointed pair.
    pub disable_collisions: bool,
}

/// A body pair allowed to rotate only around a shared axis.
#[derive(Debug, Clone)]
pub struct HingeConstraint {
    /// Object behind the first collider.
    pub object_a: ObjectKey,
    /// Object behind the second collider, `None` for the world.
    pub object_b: Option<ObjectKey>,
    /// Anchor in each body frame.
    local_anchors: [Vec3; 2],
    /// Hinge axis in each body frame.
    local_axes: [Vec3; 2],
    /// Ball-and-socket part.
    point: AnchorPointConstraint,
    /// Perpendicular rotation lock.
    axis: HingeAxisConstraint,
    /// Both bodies were asleep at warm start.
    active: bool,
}

impl HingeConstraint {
    /// Build the joint, converting the world-space parameters into each
    /// body's frame.
    pub fn new(data: &PhysicsData, parameters: &HingeParameters) -> Option<Self> {
        let object_a = data.identifiers.get(parameters.collider_a)?.object;
        let object_b = match parameters.collider_b {
            Some(collider) => Some(data.identifiers.get(collider)?.object),
            None => None,
        };

        let transform_a = data.objects.get(object_a)?.rigid_body.transform;
        let local_anchor_a = transform_a.inverse_transform_point(parameters.anchor);
        let local_axis_a = transform_a
            .inverse_transform_vector(parameters.hinge_axis_a)
            .normalized();

        let (local_anchor_b, local_axis_b) = match object_b {
            Some(object_b) => {
                let transform_b = data.objects.get(object_b)?.rigid_body.transform;
                (
                    transform_b.inverse_transform_point(parameters.anchor),
                    transform_b
                        .inverse_transform_vector(parameters.hinge_axis_b)
                        .normalized(),
                )
            }
            None => (parameters.anchor, parameters.hinge_axis_a.normalized()),
        };

        Some(Self {
            object_a,
            object_b,
            local_anchors: [local_anchor_a, local_anchor_b],
            local_axes: [local_axis_a, local_axis_b],
            point: AnchorPointConstraint::default(),
            axis: HingeAxisConstraint::default(),
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

        let (axis_a, axis_b) = self.world_axes(&bodies);
        self.axis.initialise(&bodies, axis_a, axis_b);
        self.axis.warm_start(&mut bodies);
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

        self.axis.solve_velocity(&mut bodies);
        if correct_position {
            self.axis.solve_position(&mut bodies, baumgarte_factor);
        }
    }

    /// Distance between the two world anchors, for diagnostics and tests.
    pub fn anchor_separation(&self, objects: &mut SlotMap<ObjectKey, PhysicsObject>) -> Real {
        match body_pair(objects, self.object_a, self.object_b) {
            Some(bodies) => self.point.anchor_separation(&bodies),
            None => 0.0,
        }
    }

    fn world_axes(&self, bodies: &BodyPair) -> (Vec3, Vec3) {
        let axis_a = math::rotate(bodies.orientation(0), self.local_axes[0]);
        let axis_b = match self.object_b {
            Some(_) => math::rotate(bodies.orientation(1), self.local_axes[1]),
            None => self.local_axes[1],
        };

        (axis_a, axis_b)
    }
}
