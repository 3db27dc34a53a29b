//! Shared scene building helpers for the scenario tests.

use basalt3d::math::{Aabb, Vec3};
use basalt3d::{
    ColliderId, ColliderMotionState, ConvexHull, PhysicsMaterial, PhysicsWorld, Real, Sphere,
    Transform3,
};

/// World with an initialised octree spanning a 128 m cube.
pub fn world() -> PhysicsWorld {
    let mut world = PhysicsWorld::new();
    assert!(world.initialise_octree(
        Aabb {
            min: Vec3::broadcast(-64.0),
            max: Vec3::broadcast(64.0),
        },
        4,
    ));

    world
}

/// Static concrete slab whose top face is the plane y = 0.
pub fn ground_plane(world: &mut PhysicsWorld) -> ColliderId {
    let shape = ConvexHull {
        points: box_points(Vec3::new(50.0, 0.5, 50.0)),
    };

    world
        .add_convex_hull(
            &shape,
            ColliderMotionState::Static,
            PhysicsMaterial::concrete(),
            Transform3::from_position(Vec3::new(0.0, -0.5, 0.0)),
        )
        .expect("ground plane")
}

/// Dynamic unit cube centred at a position.
pub fn unit_cube(world: &mut PhysicsWorld, position: Vec3, material: PhysicsMaterial) -> ColliderId {
    let shape = ConvexHull {
        points: box_points(Vec3::broadcast(0.5)),
    };

    world
        .add_convex_hull(
            &shape,
            ColliderMotionState::Dynamic,
            material,
            Transform3::from_position(position),
        )
        .expect("unit cube")
}

/// Dynamic sphere centred at a position.
pub fn sphere(
    world: &mut PhysicsWorld,
    position: Vec3,
    radius: Real,
    material: PhysicsMaterial,
) -> ColliderId {
    world
        .add_sphere(
            &Sphere {
                center: Vec3::zero(),
                radius,
            },
            ColliderMotionState::Dynamic,
            material,
            Transform3::from_position(position),
        )
        .expect("sphere")
}

/// Corner cloud of an axis-aligned box.
pub fn box_points(half_extents: Vec3) -> Vec<Vec3> {
    let h = half_extents;

    vec![
        Vec3::new(-h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y, -h.z),
        Vec3::new(h.x, h.y, -h.z),
        Vec3::new(-h.x, h.y, -h.z),
        Vec3::new(-h.x, -h.y, h.z),
        Vec3::new(h.x, -h.y, h.z),
        Vec3::new(h.x, h.y, h.z),
        Vec3::new(-h.x, h.y, h.z),
    ]
}

/// Fixed step time used by all scenarios.
pub const DT: Real = 1.0 / 60.0;
