//! Universal invariants that must hold for any scene.

mod common;

use basalt3d::math::Vec3;
use basalt3d::{PhysicsMaterial, PhysicsWorld, Real};

use common::DT;

/// Small mixed scene: a stack of two boxes and a sphere on the plane.
fn mixed_scene() -> (PhysicsWorld, Vec<basalt3d::ColliderId>) {
    let mut world = common::world();
    common::ground_plane(&mut world);

    let ids = vec![
        common::unit_cube(&mut world, Vec3::new(0.0, 0.5, 0.0), PhysicsMaterial::iron()),
        common::unit_cube(&mut world, Vec3::new(0.1, 1.52, 0.0), PhysicsMaterial::iron()),
        common::sphere(
            &mut world,
            Vec3::new(3.0, 2.0, 0.0),
            0.5,
            PhysicsMaterial::rubber(),
        ),
    ];

    (world, ids)
}

/// Orientation quaternions stay unit length through every step.
#[test]
fn quaternion_unit_norm() {
    let (mut world, ids) = mixed_scene();

    for _ in 0..240 {
        world.step(DT);

        for id in ids.iter() {
            let orientation = world.get_rigid_body(*id).unwrap().transform.orientation;
            assert!((orientation.magnitude() - 1.0).abs() < 1e-6);
        }
    }
}

/// Two identical runs produce bit-identical body transforms.
#[test]
fn warm_start_determinism() {
    let (mut first_world, first_ids) = mixed_scene();
    let (mut second_world, second_ids) = mixed_scene();

    for _ in 0..120 {
        first_world.step(DT);
        second_world.step(DT);
    }

    for (a, b) in first_ids.iter().zip(second_ids.iter()) {
        let first = first_world.get_rigid_body(*a).unwrap();
        let second = second_world.get_rigid_body(*b).unwrap();

        let bits = |v: Vec3| [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()];
        assert_eq!(bits(first.transform.position), bits(second.transform.position));
        assert_eq!(
            first.transform.orientation.w.to_bits(),
            second.transform.orientation.w.to_bits()
        );
        assert_eq!(bits(first.linear_velocity), bits(second.linear_velocity));
    }
}

/// Stepping a world where everything sleeps changes nothing.
#[test]
fn sleeping_idempotence() {
    let (mut world, ids) = mixed_scene();

    // Run until every dynamic body fell asleep
    let mut asleep = false;
    for _ in 0..900 {
        world.step(DT);
        asleep = ids
            .iter()
            .all(|id| !world.get_rigid_body(*id).unwrap().is_active());
        if asleep {
            break;
        }
    }
    assert!(asleep, "scene must settle within the budget");

    let snapshot: Vec<_> = ids
        .iter()
        .map(|id| {
            let body = world.get_rigid_body(*id).unwrap();
            (
                body.transform.position,
                body.transform.orientation,
                body.linear_velocity,
            )
        })
        .collect();

    for _ in 0..10 {
        world.step(DT);
    }

    for (id, (position, orientation, velocity)) in ids.iter().zip(snapshot) {
        let body = world.get_rigid_body(*id).unwrap();
        assert!(!body.is_active());
        assert_eq!(body.transform.position.x.to_bits(), position.x.to_bits());
        assert_eq!(body.transform.position.y.to_bits(), position.y.to_bits());
        assert_eq!(body.transform.orientation.w.to_bits(), orientation.w.to_bits());
        assert_eq!(body.linear_velocity.y.to_bits(), velocity.y.to_bits());
        assert_eq!(body.linear_velocity, Vec3::zero());
    }
}

/// Waking one body of a sleeping island wakes every body in it.
#[test]
fn island_wake_coherence() {
    let mut world = common::world();
    common::ground_plane(&mut world);
    let bottom = common::unit_cube(&mut world, Vec3::new(0.0, 0.5, 0.0), PhysicsMaterial::iron());
    let top = common::unit_cube(&mut world, Vec3::new(0.0, 1.5, 0.0), PhysicsMaterial::iron());

    let mut asleep = false;
    for _ in 0..600 {
        world.step(DT);
        asleep = !world.get_rigid_body(bottom).unwrap().is_active()
            && !world.get_rigid_body(top).unwrap().is_active();
        if asleep {
            break;
        }
    }
    assert!(asleep, "the pair must fall asleep first");

    // Poke only the bottom box
    world
        .get_rigid_body_mut(bottom)
        .unwrap()
        .add_force(Vec3::new(1.0, 0.0, 0.0));
    world.step(DT);

    assert!(world.get_rigid_body(bottom).unwrap().is_active());
    assert!(
        world.get_rigid_body(top).unwrap().is_active(),
        "the islanded partner must wake too"
    );
}

/// The manifold caches never outgrow the active pairs plus the retention
/// window of ended ones.
#[test]
fn cache_eviction_bound() {
    let mut world = common::world();
    common::ground_plane(&mut world);
    let ball = common::sphere(
        &mut world,
        Vec3::new(0.0, 0.6, 0.0),
        0.5,
        PhysicsMaterial::iron(),
    );

    for _ in 0..30 {
        world.step(DT);
    }
    assert!(!world.data().contact_impulse_cache.is_empty());

    // Remove the only moving body; its cache entries must age out within
    // the retention window
    assert!(world.erase(ball));
    let retention = world.get_physics_settings().frames_to_retain_cache as usize;
    for _ in 0..retention + 2 {
        world.step(DT);
    }

    assert!(world.data().contact_impulse_cache.is_empty());
    assert!(world.data().hull_contact_cache.is_empty());
}

/// A body resting under gravity keeps a bounded kinetic energy instead of
/// accumulating drift.
#[test]
fn energy_bounded_at_rest() {
    let mut world = common::world();
    common::ground_plane(&mut world);
    let ball = common::sphere(
        &mut world,
        Vec3::new(0.0, 0.5, 0.0),
        0.5,
        PhysicsMaterial::iron(),
    );

    // Let the contact settle
    for _ in 0..60 {
        world.step(DT);
    }

    for _ in 0..60 {
        world.step(DT);

        let body = world.get_rigid_body(ball).unwrap();
        let energy = body.linear_velocity.magnitude_squared()
            + body.angular_velocity.magnitude_squared();
        assert!(energy < 0.05, "resting body gained energy: {energy}");
    }
}

/// A joint whose body is erased retires itself on the next step.
#[test]
fn dead_joint_retires() {
    let mut world = common::world();
    common::ground_plane(&mut world);
    let anchor_box = common::unit_cube(&mut world, Vec3::new(0.0, 3.0, 0.0), PhysicsMaterial::iron());

    assert!(world.add_hinge_constraint(&basalt3d::HingeParameters {
        collider_a: anchor_box,
        collider_b: None,
        anchor: Vec3::new(0.0, 3.5, 0.0),
        hinge_axis_a: Vec3::unit_y(),
        hinge_axis_b: Vec3::unit_y(),
        disable_collisions: false,
    }));
    world.step(DT);
    assert_eq!(world.data().hinge_constraints.len(), 1);

    assert!(world.erase(anchor_box));
    assert!(!world.is_object_in_the_world(anchor_box));
    world.step(DT);
    assert_eq!(world.data().hinge_constraints.len(), 0);
}

/// Negative and zero step times are rejected without touching state.
#[test]
fn invalid_step_rejected() {
    let (mut world, ids) = mixed_scene();
    let before = world.get_rigid_body(ids[0]).unwrap().transform.position;

    assert!(!world.step(0.0));
    assert!(!world.step(-1.0 / 60.0));
    assert!(!world.step(Real::NAN));

    let after = world.get_rigid_body(ids[0]).unwrap().transform.position;
    assert_eq!(before.x.to_bits(), after.x.to_bits());
    assert_eq!(before.y.to_bits(), after.y.to_bits());
}
