//! Narrow phase: turns candidate pairs into contact manifolds and
//! constraints, keeping contact ids stable across frames.

pub mod manifold;
pub mod primitives;
pub mod sat;

use slotmap::Key;

use crate::broad_phase::CandidatePair;
use crate::collider::hull::HullData;
use crate::collider::{
    ColliderId, ColliderIdentifier, CompoundPartShape, HeightFieldCollider, ShapeRef,
    TriangleMeshCollider,
};
use crate::data::PhysicsData;
use crate::math::{self, Aabb, Real, Transform3, Vec3};
use crate::narrow_phase::manifold::{CollisionFlag, ContactManifold};
use crate::narrow_phase::sat::{FacePairResult, HullContactCacheEntry};
use crate::parry::shape::ConvexPolyhedron;
use crate::solver::contact::ContactConstraint;

/// Borrowed view of one concrete shape, with compounds flattened into it.
enum ShapeView<'a> {
    /// Sphere in world space.
    Sphere {
        /// World centre.
        center: Vec3,
        /// Radius.
        radius: Real,
    },
    /// Capsule in world space.
    Capsule {
        /// World segment start.
        start: Vec3,
        /// World segment end.
        end: Vec3,
        /// Radius.
        radius: Real,
    },
    /// Convex hull with its cached world topology.
    Hull {
        /// World-space topology.
        world: &'a HullData,
        /// Backend shape in the local frame for primitive queries.
        backend: &'a ConvexPolyhedron,
        /// Placement of the backend shape.
        transform: Transform3,
    },
    /// Static triangle mesh.
    Mesh(&'a TriangleMeshCollider),
    /// The global height field.
    HeightField(&'a HeightFieldCollider),
    /// Compound of primitive parts.
    Compound(&'a crate::collider::CompoundCollider),
}

/// Process every candidate pair into manifolds and contact constraints.
pub fn process(data: &mut PhysicsData, pairs: &[CandidatePair], dt: Real) {
    puffin::profile_scope!("Narrow phase");

    data.contact_constraints.clear();

    for (collider_a, collider_b) in pairs.iter().copied() {
        let Some(identifier_a) = data.identifiers.get(collider_a).copied() else {
            continue;
        };
        let Some(identifier_b) = data.identifiers.get(collider_b).copied() else {
            continue;
        };

        let manifold_id = pair_manifold_id(collider_a, collider_b);
        let proximity = data.settings.proximity_epsilon;
        let minimal_displacement = data.settings.minimal_displacement;

        // Fast approaches widen the acceptance band so the first contact is
        // caught before tunneling
        let relative_speed = (data.objects[identifier_a.object].rigid_body.linear_velocity
            - data.objects[identifier_b.object].rigid_body.linear_velocity)
            .magnitude();
        let margin = proximity.max(relative_speed * dt);

        let material_a = data.collider_material(identifier_a.shape);
        let material_b = data.collider_material(identifier_b.shape);
        let mut manifold = ContactManifold::new(manifold_id, material_a, material_b);

        let cache_update = generate_pair(
            data,
            &identifier_a,
            &identifier_b,
            margin,
            minimal_displacement,
            manifold_id,
            &mut manifold,
        );

        manifold.update_flag(proximity);
        if manifold.flag == CollisionFlag::NotColliding {
            continue;
        }

        if let Some(faces) = cache_update {
            let (center_a, center_b) = hull_pair_centers(data, &identifier_a, &identifier_b);
            data.hull_contact_cache.insert(
                manifold_id,
                HullContactCacheEntry {
                    center_a,
                    center_b,
                    reference_face: faces.reference_face,
                    incident_face: faces.incident_face,
                    reference_on_b: faces.reference_on_b,
                    retention: data.settings.frames_to_retain_cache,
                    touched: true,
                },
            );
        }

        data.active_manifolds.insert(manifold_id);
        manifold.reduce();
        data.contact_constraints.push(ContactConstraint::new(
            &manifold,
            identifier_a.object,
            identifier_b.object,
        ));
    }
}

/// Stable manifold id for an ordered collider pair.
pub fn pair_manifold_id(a: ColliderId, b: ColliderId) -> u64 {
    math::pair_hash(a.data().as_ffi(), b.data().as_ffi())
}

/// Dispatch one pair, returning hull cache data when the pair took the
/// cached hull path.
fn generate_pair(
    data: &PhysicsData,
    identifier_a: &ColliderIdentifier,
    identifier_b: &ColliderIdentifier,
    margin: Real,
    minimal_displacement: Real,
    manifold_id: u64,
    manifold: &mut ContactManifold,
) -> Option<FacePairResult> {
    // Plain hull pairs take the cached SAT path
    if let (ShapeRef::Hull(key_a), ShapeRef::Hull(key_b)) =
        (identifier_a.shape, identifier_b.shape)
    {
        let hull_a = &data.hulls[key_a];
        let hull_b = &data.hulls[key_b];

        return sat::hull_vs_hull(
            &hull_a.world,
            &hull_b.world,
            margin,
            data.hull_contact_cache.get(&manifold_id),
            minimal_displacement,
            0,
            manifold,
        );
    }

    let Some(view_a) = shape_view(data, identifier_a) else {
        return None;
    };
    let Some(view_b) = shape_view(data, identifier_b) else {
        return None;
    };

    generate(&view_a, &view_b, margin, 0, manifold);

    None
}

/// Build the borrowed view of a collider.
fn shape_view<'a>(data: &'a PhysicsData, identifier: &ColliderIdentifier) -> Option<ShapeView<'a>> {
    let transform = data.objects.get(identifier.object)?.rigid_body.transform;

    Some(match identifier.shape {
        ShapeRef::Sphere(key) => {
            let sphere = data.spheres.get(key)?;
            ShapeView::Sphere {
                center: sphere.world_center,
                radius: sphere.radius,
            }
        }
        ShapeRef::Capsule(key) => {
            let capsule = data.capsules.get(key)?;
            ShapeView::Capsule {
                start: capsule.world_start,
                end: capsule.world_end,
                radius: capsule.radius,
            }
        }
        ShapeRef::Hull(key) => {
            let hull = data.hulls.get(key)?;
            ShapeView::Hull {
                world: &hull.world,
                backend: &hull.backend,
                transform,
            }
        }
        ShapeRef::Mesh(key) => ShapeView::Mesh(data.meshes.get(key)?),
        ShapeRef::HeightField => ShapeView::HeightField(data.height_field.as_ref()?),
        ShapeRef::Compound(key) => ShapeView::Compound(data.compounds.get(key)?),
    })
}

/// Shape ordering used to canonicalize the dispatch.
fn rank(view: &ShapeView) -> u8 {
    match view {
        ShapeView::Sphere { .. } => 0,
        ShapeView::Capsule { .. } => 1,
        ShapeView::Hull { .. } => 2,
        ShapeView::Compound(_) => 3,
        ShapeView::Mesh(_) => 4,
        ShapeView::HeightField(_) => 5,
    }
}

/// Generate contacts for a pair of shape views into the manifold, with the
/// first view playing the role of collider A.
fn generate(a: &ShapeView, b: &ShapeView, margin: Real, base_id: u32, manifold: &mut ContactManifold) {
    use ShapeView::*;

    match (a, b) {
        (
            Sphere { center, radius },
            Sphere {
                center: center_b,
                radius: radius_b,
            },
        ) => {
            primitives::sphere_vs_sphere(
                *center, *radius, *center_b, *radius_b, margin, base_id, manifold,
            );
        }
        (
            Sphere { center, radius },
            Capsule {
                start,
                end,
                radius: capsule_radius,
            },
        ) => {
            primitives::sphere_vs_capsule(
                *center,
                *radius,
                *start,
                *end,
                *capsule_radius,
                margin,
                manifold,
            );
        }
        (
            Sphere { center, radius },
            Hull {
                backend, transform, ..
            },
        ) => {
            primitives::sphere_vs_hull(*center, *radius, backend, transform, margin, manifold);
        }
        (Sphere { center, radius }, Mesh(mesh)) => {
            let bound = point_bound(*center, *radius + margin);
            let mut indices = Vec::new();
            mesh.overlapping_triangles(bound, &mut indices);
            for index in indices {
                primitives::sphere_vs_triangle(
                    *center,
                    *radius,
                    &mesh.triangles[index as usize],
                    margin,
                    math::feature_hash(base_id, index + 1),
                    manifold,
                );
            }
        }
        (Sphere { center, radius }, HeightField(field)) => {
            let bound = point_bound(*center, *radius + margin);
            let mut patches = Vec::new();
            field.patches_in(bound, &mut patches);
            for (triangle, patch_id) in patches.iter() {
                primitives::sphere_vs_triangle(
                    *center,
                    *radius,
                    triangle,
                    margin,
                    math::feature_hash(base_id, patch_id + 1),
                    manifold,
                );
            }
        }
        (
            Capsule { start, end, radius },
            Capsule {
                start: start_b,
                end: end_b,
                radius: radius_b,
            },
        ) => {
            primitives::capsule_vs_capsule(
                *start, *end, *radius, *start_b, *end_b, *radius_b, margin, manifold,
            );
        }
        (
            Capsule { start, end, radius },
            Hull {
                backend, transform, ..
            },
        ) => {
            primitives::capsule_vs_hull(
                *start, *end, *radius, backend, transform, margin, manifold,
            );
        }
        (Capsule { start, end, radius }, Mesh(mesh)) => {
            let bound = segment_bound(*start, *end, *radius + margin);
            let mut indices = Vec::new();
            mesh.overlapping_triangles(bound, &mut indices);
            for index in indices {
                primitives::capsule_vs_triangle(
                    *start,
                    *end,
                    *radius,
                    &mesh.triangles[index as usize],
                    margin,
                    math::feature_hash(base_id, index + 1),
                    manifold,
                );
            }
        }
        (Capsule { start, end, radius }, HeightField(field)) => {
            let bound = segment_bound(*start, *end, *radius + margin);
            let mut patches = Vec::new();
            field.patches_in(bound, &mut patches);
            for (triangle, patch_id) in patches.iter() {
                primitives::capsule_vs_triangle(
                    *start,
                    *end,
                    *radius,
                    triangle,
                    margin,
                    math::feature_hash(base_id, patch_id + 1),
                    manifold,
                );
            }
        }
        (Hull { world, .. }, Hull { world: world_b, .. }) => {
            // Compound hull parts land here; plain hull pairs use the
            // cached path in the dispatcher
            sat::hull_vs_hull(world, world_b, margin, None, 0.0, base_id, manifold);
        }
        (Hull { world, .. }, Mesh(mesh)) => {
            let bound = inflated(world.aabb(), margin);
            let mut indices = Vec::new();
            mesh.overlapping_triangles(bound, &mut indices);
            for index in indices {
                sat::hull_vs_triangle(
                    world,
                    &mesh.triangles[index as usize],
                    margin,
                    math::feature_hash(base_id, index + 1),
                    manifold,
                );
            }
        }
        (Hull { world, .. }, HeightField(field)) => {
            let bound = inflated(world.aabb(), margin);
            let mut patches = Vec::new();
            field.patches_in(bound, &mut patches);
            for (triangle, patch_id) in patches.iter() {
                sat::hull_vs_triangle(
                    world,
                    triangle,
                    margin,
                    math::feature_hash(base_id, patch_id + 1),
                    manifold,
                );
            }
        }
        (Compound(compound), other) => {
            for (index, part) in compound.parts.iter().enumerate() {
                let part_view = part_view(part);
                let part_base = math::feature_hash(base_id, index as u32 + 1);
                generate(&part_view, other, margin, part_base, manifold);
            }
        }
        (other, Compound(compound)) => {
            for (index, part) in compound.parts.iter().enumerate() {
                let part_view = part_view(part);
                let part_base = math::feature_hash(base_id, index as u32 + 1);
                generate(other, &part_view, margin, part_base, manifold);
            }
        }
        (_, _) => {
            // Flip so the canonical arm above handles the combination
            if rank(a) <= rank(b) {
                debug_assert!(false, "unhandled shape pair");
                return;
            }

            let start = manifold.points.len();
            generate(b, a, margin, base_id, manifold);
            manifold.revert_range(start);
        }
    }
}

/// View of one compound part.
fn part_view<'a>(part: &'a crate::collider::CompoundColliderPart) -> ShapeView<'a> {
    match &part.shape {
        CompoundPartShape::Sphere {
            radius,
            world_center,
            ..
        } => ShapeView::Sphere {
            center: *world_center,
            radius: *radius,
        },
        CompoundPartShape::Capsule {
            radius,
            world_start,
            world_end,
            ..
        } => ShapeView::Capsule {
            start: *world_start,
            end: *world_end,
            radius: *radius,
        },
        CompoundPartShape::Hull { world, backend, .. } => ShapeView::Hull {
            world,
            backend,
            transform: part.world_transform,
        },
    }
}

/// World centres of a plain hull pair, for the cache entry.
fn hull_pair_centers(
    data: &PhysicsData,
    identifier_a: &ColliderIdentifier,
    identifier_b: &ColliderIdentifier,
) -> (Vec3, Vec3) {
    let center = |identifier: &ColliderIdentifier| match identifier.shape {
        ShapeRef::Hull(key) => data.hulls[key].world.center,
        _ => Vec3::zero(),
    };

    (center(identifier_a), center(identifier_b))
}

/// Cube bound around a point.
fn point_bound(center: Vec3, extent: Real) -> Aabb {
    Aabb {
        min: center - Vec3::broadcast(extent),
        max: center + Vec3::broadcast(extent),
    }
}

/// Bound around a segment.
fn segment_bound(start: Vec3, end: Vec3, extent: Real) -> Aabb {
    let min = Vec3::new(
        start.x.min(end.x),
        start.y.min(end.y),
        start.z.min(end.z),
    );
    let max = Vec3::new(
        start.x.max(end.x),
        start.y.max(end.y),
        start.z.max(end.z),
    );

    Aabb {
        min: min - Vec3::broadcast(extent),
        max: max + Vec3::broadcast(extent),
    }
}

/// Bound grown by a margin on every side.
fn inflated(bound: Aabb, margin: Real) -> Aabb {
    Aabb {
        min: bound.min - Vec3::broadcast(margin),
        max: bound.max + Vec3::broadcast(margin),
    }
}
