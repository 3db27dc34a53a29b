//! The public physics world and its per-step pipeline.

use std::collections::BTreeSet;

use crate::body::{IntegrationResult, ObjectKey, PhysicsObject, RigidBody};
use crate::broad_phase::{self, CandidatePair};
use crate::cache::{self, FinishedCollision};
use crate::collider::{
    self, Capsule, ColliderId, ColliderIdentifier, ColliderMotionState, CompoundCollider,
    CompoundColliderPart, CompoundPart, CompoundPartShape, ConvexHull, HeightFieldParameters,
    HullCollider, ShapeRef, Sphere, SphereCollider, TriangleMesh, TriangleMeshCollider,
};
use crate::collider::hull::HullData;
use crate::data::PhysicsData;
use crate::island;
use crate::material::PhysicsMaterial;
use crate::math::{Aabb, Real, Transform3, Vec3};
use crate::narrow_phase;
use crate::settings::PhysicsSettings;
use crate::solver;
use crate::solver::cone::{ConeConstraint, ConeParameters};
use crate::solver::hinge::{HingeConstraint, HingeParameters};
use crate::solver::motor::{MotorConstraint, MotorParameters};
use crate::tensor::MassProperties;

/// A rigid body simulation.
///
/// Populate it with colliders and joints, then call [`step`](Self::step)
/// at a fixed rate; the caller owns the scheduling loop.
#[derive(Default)]
pub struct PhysicsWorld {
    /// All simulation state.
    data: PhysicsData,
    /// Candidate pair buffer reused between steps.
    candidate_pairs: Vec<CandidatePair>,
}

impl PhysicsWorld {
    /// World with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// World with explicit settings.
    pub fn with_settings(settings: PhysicsSettings) -> Self {
        Self {
            data: PhysicsData::new(settings),
            candidate_pairs: Vec::new(),
        }
    }

    /// Set the simulated region and octree depth; call once before adding
    /// colliders.
    pub fn initialise_octree(&mut self, bound: Aabb, depth: u8) -> bool {
        self.data.octree.initialise(bound, depth)
    }

    /// Install the single global static height field.
    pub fn initialise_height_field(
        &mut self,
        parameters: &HeightFieldParameters,
        material: PhysicsMaterial,
    ) -> Option<ColliderId> {
        if self.data.height_field.is_some() {
            log::warn!("height field already initialised");
            return None;
        }

        let field = match collider::HeightFieldCollider::new(parameters, material) {
            Some(field) => field,
            None => {
                log::warn!("rejected height field with inconsistent parameters");
                return None;
            }
        };

        let bound = field.bound;
        let object = self.spawn_object(Transform3::default(), None);
        let id = self.data.identifiers.insert(ColliderIdentifier {
            shape: ShapeRef::HeightField,
            object,
            node: None,
            swept: bound,
            is_static: true,
        });
        self.data.objects[object].rigid_body.collider_id = id;

        self.data.height_field = Some(field);
        self.data.height_field_id = Some(id);

        Some(id)
    }

    /// Add a sphere collider with its rigid body.
    pub fn add_sphere(
        &mut self,
        shape: &Sphere,
        state: ColliderMotionState,
        material: PhysicsMaterial,
        offset: Transform3,
    ) -> Option<ColliderId> {
        if !(shape.radius > 0.0) || !shape.radius.is_finite() {
            log::warn!("rejected sphere with invalid radius");
            return None;
        }
        self.octree_ready()?;

        let collider = SphereCollider::new(shape, material, &offset);
        let bound = collider.bound;

        let mass_properties = (state == ColliderMotionState::Dynamic)
            .then(|| MassProperties::sphere(shape.center, shape.radius, material.density));
        let object = self.spawn_object(offset, mass_properties);

        let shape_key = self.data.spheres.insert(collider);
        Some(self.finish_add(ShapeRef::Sphere(shape_key), object, bound, state))
    }

    /// Add a capsule collider with its rigid body.
    pub fn add_capsule(
        &mut self,
        shape: &Capsule,
        state: ColliderMotionState,
        material: PhysicsMaterial,
        offset: Transform3,
    ) -> Option<ColliderId> {
        if !(shape.radius > 0.0) || !shape.radius.is_finite() {
            log::warn!("rejected capsule with invalid radius");
            return None;
        }
        self.octree_ready()?;

        let collider = collider::CapsuleCollider::new(shape, material, &offset);
        let bound = collider.bound;

        let mass_properties = (state == ColliderMotionState::Dynamic).then(|| {
            MassProperties::capsule(shape.start, shape.end, shape.radius, material.density)
        });
        let object = self.spawn_object(offset, mass_properties);

        let shape_key = self.data.capsules.insert(collider);
        Some(self.finish_add(ShapeRef::Capsule(shape_key), object, bound, state))
    }

    /// Add a convex hull collider with its rigid body.
    pub fn add_convex_hull(
        &mut self,
        shape: &ConvexHull,
        state: ColliderMotionState,
        material: PhysicsMaterial,
        offset: Transform3,
    ) -> Option<ColliderId> {
        self.octree_ready()?;

        let Some((local, triangles)) = HullData::from_points(&shape.points) else {
            log::warn!("rejected degenerate convex hull cloud");
            return None;
        };
        let Some(backend) = collider::build_backend_hull(&local.vertices) else {
            log::warn!("geometry backend rejected the convex hull");
            return None;
        };

        let collider = HullCollider::new(local, backend, material, &offset);
        let bound = collider.bound;

        let mass_properties = (state == ColliderMotionState::Dynamic).then(|| {
            MassProperties::convex_hull(&collider.local.vertices, &triangles, material.density)
        });
        let object = self.spawn_object(offset, mass_properties);

        let shape_key = self.data.hulls.insert(collider);
        Some(self.finish_add(ShapeRef::Hull(shape_key), object, bound, state))
    }

    /// Add a static triangle mesh collider.
    pub fn add_triangle_mesh(
        &mut self,
        mesh: &TriangleMesh,
        state: ColliderMotionState,
        material: PhysicsMaterial,
        offset: Transform3,
    ) -> Option<ColliderId> {
        if state == ColliderMotionState::Dynamic {
            log::warn!("triangle meshes are static only");
            return None;
        }
        self.octree_ready()?;

        let Some(collider) = TriangleMeshCollider::new(mesh, material, &offset) else {
            log::warn!("rejected triangle mesh with inconsistent indices");
            return None;
        };
        let bound = collider.bound;

        let object = self.spawn_object(offset, None);
        let shape_key = self.data.meshes.insert(collider);
        Some(self.finish_add(
            ShapeRef::Mesh(shape_key),
            object,
            bound,
            ColliderMotionState::Static,
        ))
    }

    /// Add a compound collider built from placed primitives.
    pub fn add_compound_collider(
        &mut self,
        parts: &[(CompoundPart, Transform3)],
        state: ColliderMotionState,
        material: PhysicsMaterial,
        offset: Transform3,
    ) -> Option<ColliderId> {
        if parts.is_empty() {
            log::warn!("rejected compound collider without parts");
            return None;
        }
        self.octree_ready()?;

        let mut stored_parts = Vec::with_capacity(parts.len());
        let mut part_masses = Vec::with_capacity(parts.len());
        for (part, local_transform) in parts {
            let (shape, mass) = match part {
                CompoundPart::Sphere(sphere) => {
                    if !(sphere.radius > 0.0) {
                        log::warn!("rejected compound sphere part with invalid radius");
                        return None;
                    }
                    (
                        CompoundPartShape::Sphere {
                            local_center: sphere.center,
                            radius: sphere.radius,
                            world_center: Vec3::zero(),
                        },
                        MassProperties::sphere(sphere.center, sphere.radius, material.density),
                    )
                }
                CompoundPart::Capsule(capsule) => {
                    if !(capsule.radius > 0.0) {
                        log::warn!("rejected compound capsule part with invalid radius");
                        return None;
                    }
                    (
                        CompoundPartShape::Capsule {
                            local_start: capsule.start,
                            local_end: capsule.end,
                            radius: capsule.radius,
                            world_start: Vec3::zero(),
                            world_end: Vec3::zero(),
                        },
                        MassProperties::capsule(
                            capsule.start,
                            capsule.end,
                            capsule.radius,
                            material.density,
                        ),
                    )
                }
                CompoundPart::ConvexHull(hull) => {
                    let Some((local, triangles)) = HullData::from_points(&hull.points) else {
                        log::warn!("rejected degenerate compound hull part");
                        return None;
                    };
                    let Some(backend) = collider::build_backend_hull(&local.vertices) else {
                        log::warn!("geometry backend rejected a compound hull part");
                        return None;
                    };
                    let mass =
                        MassProperties::convex_hull(&local.vertices, &triangles, material.density);
                    (
                        CompoundPartShape::Hull {
                            world: local.clone(),
                            local,
                            backend,
                        },
                        mass,
                    )
                }
            };

            stored_parts.push(CompoundColliderPart {
                local_transform: *local_transform,
                world_transform: Transform3::default(),
                shape,
            });
            part_masses.push(mass);
        }

        let mut collider = CompoundCollider {
            parts: stored_parts,
            bound: Aabb {
                min: Vec3::zero(),
                max: Vec3::zero(),
            },
            material,
        };
        collider.update_transform(&offset);
        let bound = collider.bound;

        let mass_properties = (state == ColliderMotionState::Dynamic).then(|| {
            MassProperties::compound(
                part_masses
                    .iter()
                    .zip(parts.iter().map(|(_, transform)| transform)),
            )
        });
        let object = self.spawn_object(offset, mass_properties);

        let shape_key = self.data.compounds.insert(collider);
        Some(self.finish_add(ShapeRef::Compound(shape_key), object, bound, state))
    }

    /// Join two colliders with a hinge.
    pub fn add_hinge_constraint(&mut self, parameters: &HingeParameters) -> bool {
        let Some(constraint) = HingeConstraint::new(&self.data, parameters) else {
            log::warn!("rejected hinge constraint with unknown colliders");
            return false;
        };

        if parameters.disable_collisions {
            self.disable_pair(parameters.collider_a, parameters.collider_b);
        }
        self.data.hinge_constraints.insert(constraint);

        true
    }

    /// Join two colliders with a cone limit.
    pub fn add_cone_constraint(&mut self, parameters: &ConeParameters) -> bool {
        let Some(constraint) = ConeConstraint::new(&self.data, parameters) else {
            log::warn!("rejected cone constraint with unknown colliders");
            return false;
        };

        if parameters.disable_collisions {
            self.disable_pair(parameters.collider_a, parameters.collider_b);
        }
        self.data.cone_constraints.insert(constraint);

        true
    }

    /// Join two colliders with a motorised hinge.
    pub fn add_motor_constraint(&mut self, parameters: &MotorParameters) -> bool {
        let Some(constraint) = MotorConstraint::new(&self.data, parameters) else {
            log::warn!("rejected motor constraint with unknown colliders");
            return false;
        };

        if parameters.disable_collisions {
            self.disable_pair(parameters.collider_a, parameters.collider_b);
        }
        self.data.motor_constraints.insert(constraint);

        true
    }

    /// Remove a collider and its body.
    pub fn erase(&mut self, id: ColliderId) -> bool {
        self.data.erase(id)
    }

    /// Whether a handle is still occupied.
    pub fn is_object_in_the_world(&self, id: ColliderId) -> bool {
        self.data.identifiers.contains_key(id)
    }

    /// Rigid body behind a handle.
    pub fn get_rigid_body(&self, id: ColliderId) -> Option<&RigidBody> {
        self.data.body(id)
    }

    /// Mutable rigid body behind a handle, for applying forces between
    /// steps.
    pub fn get_rigid_body_mut(&mut self, id: ColliderId) -> Option<&mut RigidBody> {
        self.data.body_mut(id)
    }

    /// Tunable settings.
    pub fn get_physics_settings(&mut self) -> &mut PhysicsSettings {
        &mut self.data.settings
    }

    /// Resolution records of recently ended collisions.
    pub fn finished_collisions(&self) -> &std::collections::BTreeMap<u64, FinishedCollision> {
        &self.data.finished_collisions
    }

    /// Read access to the whole simulation state.
    pub fn data(&self) -> &PhysicsData {
        &self.data
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: Real) -> bool {
        if !(dt > 0.0) || !dt.is_finite() {
            log::warn!("rejected step with non-positive dt");
            return false;
        }

        puffin::profile_scope!("Physics step");

        // Externally woken bodies drag their whole island awake before
        // any pairs are formed
        island::propagate_wakes(&mut self.data);

        {
            puffin::profile_scope!("Integrate forces");

            let settings = self.data.settings.rigid_body.clone();
            for (_, object) in self.data.objects.iter_mut() {
                object.rigid_body.integrate_forces(dt, &settings);
            }
        }

        let mut pairs = core::mem::take(&mut self.candidate_pairs);
        broad_phase::update(&mut self.data, dt, &mut pairs);

        self.time_of_impact_bias(&pairs);

        narrow_phase::process(&mut self.data, &pairs, dt);
        self.candidate_pairs = pairs;

        solver::solve(&mut self.data, dt);

        {
            puffin::profile_scope!("Integrate positions");

            let settings = self.data.settings.rigid_body.clone();
            let keys: Vec<ObjectKey> = self.data.objects.keys().collect();
            for key in keys {
                let result = self.data.objects[key]
                    .rigid_body
                    .integrate_positions(dt, &settings);
                if result == IntegrationResult::Skipped {
                    continue;
                }

                self.data.objects[key].sleep_candidate =
                    result == IntegrationResult::SleepCandidate;

                let (collider_id, transform) = {
                    let body = &self.data.objects[key].rigid_body;
                    (body.collider_id, body.transform)
                };
                if let Some(identifier) = self.data.identifiers.get(collider_id) {
                    let shape = identifier.shape;
                    self.data.update_collider_transform(shape, &transform);
                }
            }
        }

        island::rebuild_and_sleep(&mut self.data);
        cache::end_of_step(&mut self.data);

        true
    }

    /// Roll fast movers with candidate pairs slightly back toward their
    /// previous transform so contacts generate just before penetration.
    fn time_of_impact_bias(&mut self, pairs: &[CandidatePair]) {
        puffin::profile_scope!("Time of impact bias");

        let bias = self.data.settings.time_of_impact_bias;
        let minimal = self.data.settings.minimal_displacement;
        if bias <= 0.0 {
            return;
        }

        let mut involved: BTreeSet<ObjectKey> = BTreeSet::new();
        for (a, b) in pairs.iter() {
            for id in [*a, *b] {
                if let Some(identifier) = self.data.identifiers.get(id) {
                    if !identifier.is_static {
                        involved.insert(identifier.object);
                    }
                }
            }
        }

        for key in involved {
            let Some(object) = self.data.objects.get_mut(key) else {
                continue;
            };
            let body = &mut object.rigid_body;
            if !body.is_active()
                || body.displacement().magnitude_squared() <= minimal * minimal
            {
                continue;
            }

            body.sub_step(bias);
            let (collider_id, transform) = (body.collider_id, body.transform);
            if let Some(identifier) = self.data.identifiers.get(collider_id) {
                let shape = identifier.shape;
                self.data.update_collider_transform(shape, &transform);
            }
        }
    }

    /// Create the physics object of a new collider.
    ///
    /// `mass_properties` of `None` makes the body static.
    fn spawn_object(
        &mut self,
        offset: Transform3,
        mass_properties: Option<MassProperties>,
    ) -> ObjectKey {
        let max_motion = self.data.settings.rigid_body.max_motion;
        let mut body = RigidBody::new(offset, ColliderId::default(), max_motion);

        match mass_properties {
            Some(properties) => body.set_mass_properties(properties.mass, properties.inertia),
            None => body.make_static(),
        }

        self.data.objects.insert(PhysicsObject::new(body))
    }

    /// Register the identifier, octree entry and body back-reference of a
    /// freshly stored collider.
    fn finish_add(
        &mut self,
        shape: ShapeRef,
        object: ObjectKey,
        bound: Aabb,
        state: ColliderMotionState,
    ) -> ColliderId {
        let is_static = state == ColliderMotionState::Static;
        let id = self.data.identifiers.insert(ColliderIdentifier {
            shape,
            object,
            node: None,
            swept: bound,
            is_static,
        });

        self.data.objects[object].rigid_body.collider_id = id;
        let node = self.data.octree.insert(id, bound, is_static);
        self.data.identifiers[id].node = node;

        id
    }

    /// Fail an add early when the octree was never initialised.
    fn octree_ready(&self) -> Option<()> {
        if self.data.octree.root.is_none() {
            log::warn!("octree not initialised, collider rejected");
            return None;
        }

        Some(())
    }

    /// Suppress contacts between a jointed pair on both sides.
    fn disable_pair(&mut self, collider_a: ColliderId, collider_b: Option<ColliderId>) {
        let Some(collider_b) = collider_b else {
            return;
        };
        let Some(object_a) = self.data.identifiers.get(collider_a).map(|i| i.object) else {
            return;
        };
        let Some(object_b) = self.data.identifiers.get(collider_b).map(|i| i.object) else {
            return;
        };

        if let Some(object) = self.data.objects.get_mut(object_a) {
            object.disable_collision_with(collider_b);
        }
        if let Some(object) = self.data.objects.get_mut(object_b) {
            object.disable_collision_with(collider_a);
        }
    }
}
