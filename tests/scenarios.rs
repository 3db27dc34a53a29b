//! End-to-end simulation scenarios.

mod common;

use basalt3d::math::{self, Vec3, PI};
use basalt3d::{
    ColliderMotionState, ConeParameters, HingeParameters, MotorParameters, PhysicsMaterial, Real,
    Transform3,
};

use common::DT;

/// A dropped rubber sphere bounces with decreasing amplitude and comes to
/// rest on the plane.
#[test]
fn sphere_drop() {
    let mut world = common::world();
    common::ground_plane(&mut world);
    let ball = common::sphere(
        &mut world,
        Vec3::new(0.0, 10.0, 0.0),
        0.5,
        PhysicsMaterial::rubber(),
    );

    let mut peak_after_first_bounce: Real = 0.0;
    let mut bounced = false;
    for step in 0..600 {
        assert!(world.step(DT));

        let body = world.get_rigid_body(ball).unwrap();
        if step > 120 && body.linear_velocity.y > 0.1 {
            bounced = true;
        }
        if bounced {
            peak_after_first_bounce = peak_after_first_bounce.max(body.transform.position.y);
        }
    }

    let body = world.get_rigid_body(ball).unwrap();
    assert!(bounced, "the sphere must bounce at least once");
    assert!(
        peak_after_first_bounce < 8.0,
        "bounces must lose energy, peaked at {peak_after_first_bounce}"
    );
    assert!(
        (body.transform.position.y - 0.5).abs() <= 0.02,
        "sphere must rest on the plane, y = {}",
        body.transform.position.y
    );
    assert!(body.linear_velocity.y.abs() < 0.01);

    // Give the sleep metric time to decay after the last visible motion
    for _ in 0..300 {
        world.step(DT);
    }
    assert!(!world.get_rigid_body(ball).unwrap().is_active());
}

/// A stack of five iron cubes settles without drifting apart or sinking
/// into each other, then falls asleep as one island.
#[test]
fn box_stack() {
    let mut world = common::world();
    common::ground_plane(&mut world);

    let mut boxes = Vec::new();
    for level in 0..5 {
        boxes.push(common::unit_cube(
            &mut world,
            Vec3::new(0.0, 0.5 + level as Real, 0.0),
            PhysicsMaterial::iron(),
        ));
    }

    // The sleep metric needs roughly three seconds to decay from its
    // initial ceiling, so run past that
    for _ in 0..240 {
        world.step(DT);
    }

    let slop = 0.005;
    let mut previous_top: Real = 0.0;
    for id in boxes.iter() {
        let body = world.get_rigid_body(*id).unwrap();
        let center = body.transform.position.y;

        // No box sinks into the one below beyond the allowed slop
        assert!(
            center + 0.5 - previous_top >= 1.0 - slop - 1e-6,
            "box interpenetration exceeds the slop, centre at {center}"
        );
        let lateral_drift =
            (body.transform.position.x.powi(2) + body.transform.position.z.powi(2)).sqrt();
        assert!(lateral_drift < 0.05, "stack must not drift sideways");

        previous_top = center + 0.5;
        assert!(!body.is_active(), "every box must be asleep");
    }

    assert!(
        (4.97..=5.05).contains(&previous_top),
        "stack height out of range: {previous_top}"
    );
}

/// A box hinged to the world hangs from its anchor with the anchor error
/// within the solver slop.
#[test]
fn hinge_door() {
    let mut world = common::world();

    let door = world
        .add_convex_hull(
            &basalt3d::ConvexHull {
                points: common::box_points(Vec3::new(1.0, 0.05, 0.5)),
            },
            ColliderMotionState::Dynamic,
            PhysicsMaterial::iron(),
            Transform3::default(),
        )
        .unwrap();

    let anchor = Vec3::new(0.0, 0.05, 0.0);
    assert!(world.add_hinge_constraint(&HingeParameters {
        collider_a: door,
        collider_b: None,
        anchor,
        hinge_axis_a: Vec3::unit_y(),
        hinge_axis_b: Vec3::unit_y(),
        disable_collisions: false,
    }));

    // The local point that started at the anchor
    let local_anchor = Vec3::new(0.0, 0.05, 0.0);

    for _ in 0..300 {
        world.step(DT);
    }

    let body = world.get_rigid_body(door).unwrap();
    let world_anchor = body.transform.transform_point(local_anchor);
    assert!(
        (world_anchor - anchor).magnitude() <= 0.005 + 1e-4,
        "anchor drifted to {world_anchor:?}"
    );
    assert!(
        body.angular_velocity.magnitude() < 0.01,
        "door must come to rest"
    );
}

/// A motor joint spins two boxes to its target relative angular velocity
/// and holds it there.
#[test]
fn motor_spin() {
    let mut world = common::world();
    world.get_physics_settings().rigid_body.gravity = Vec3::zero();

    let lower = common::unit_cube(&mut world, Vec3::zero(), PhysicsMaterial::iron());
    let upper = common::unit_cube(
        &mut world,
        Vec3::new(0.0, 1.5, 0.0),
        PhysicsMaterial::iron(),
    );

    let target = 2.0 * PI;
    assert!(world.add_motor_constraint(&MotorParameters {
        collider_a: lower,
        collider_b: Some(upper),
        anchor: Vec3::new(0.0, 0.75, 0.0),
        hinge_axis_a: Vec3::unit_y(),
        hinge_axis_b: Vec3::unit_y(),
        target_angular_velocity: target,
        min_torque: -50.0,
        max_torque: 50.0,
        disable_collisions: true,
    }));

    for step in 0..60 {
        world.step(DT);

        if step >= 30 {
            let relative = world.get_rigid_body(upper).unwrap().angular_velocity.y
                - world.get_rigid_body(lower).unwrap().angular_velocity.y;
            assert!(
                (relative - target).abs() <= target * 0.05,
                "relative spin {relative} out of band at step {step}"
            );
        }
    }
}

/// A fast small sphere is caught by the first-contact bias instead of
/// tunneling through the plane.
#[test]
fn tunneling_guard() {
    let mut world = common::world();
    common::ground_plane(&mut world);
    let bullet = common::sphere(
        &mut world,
        Vec3::new(0.0, 2.0, 0.0),
        0.1,
        PhysicsMaterial::plastic(),
    );
    world.get_rigid_body_mut(bullet).unwrap().linear_velocity = Vec3::new(0.0, -50.0, 0.0);

    let mut saw_manifold = false;
    for _ in 0..30 {
        world.step(DT);

        saw_manifold |= !world.data().contact_constraints.is_empty();
        let y = world.get_rigid_body(bullet).unwrap().transform.position.y;
        assert!(
            y >= 0.1 - 0.005,
            "sphere tunneled through the plane, centre at {y}"
        );
    }

    assert!(saw_manifold, "a contact manifold must be produced");
}

/// A cone joint never lets the swinging sphere exceed the cone's half
/// angle.
#[test]
fn cone_limit() {
    let mut world = common::world();
    world.get_physics_settings().rigid_body.gravity = Vec3::zero();

    let pivot = world
        .add_sphere(
            &basalt3d::Sphere {
                center: Vec3::zero(),
                radius: 0.5,
            },
            ColliderMotionState::Static,
            PhysicsMaterial::iron(),
            Transform3::default(),
        )
        .unwrap();
    let bob = common::sphere(
        &mut world,
        Vec3::new(0.0, 1.5, 0.0),
        0.5,
        PhysicsMaterial::iron(),
    );

    let half_cone_angle = 30.0 * PI / 180.0;
    assert!(world.add_cone_constraint(&ConeParameters {
        collider_a: pivot,
        collider_b: Some(bob),
        anchor: Vec3::new(0.0, 0.75, 0.0),
        twist_axis: Vec3::unit_y(),
        half_cone_angle,
        disable_collisions: true,
    }));

    let limit = half_cone_angle + 1.0 * PI / 180.0;
    for step in 0..180 {
        // A gentle push, then let the bob coast into the limit
        if step < 30 {
            world
                .get_rigid_body_mut(bob)
                .unwrap()
                .add_force(Vec3::new(4.0, 0.0, 0.0));
        }
        world.step(DT);

        let orientation = world.get_rigid_body(bob).unwrap().transform.orientation;
        let twist = math::rotate(orientation, Vec3::unit_y());
        let angle = twist.dot(Vec3::unit_y()).clamp(-1.0, 1.0).acos();
        assert!(
            angle <= limit,
            "cone limit exceeded: {} degrees at step {step}",
            angle * 180.0 / PI
        );
    }
}
