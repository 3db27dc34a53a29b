//! Shared simulation state: every arena, cache and tunable in one owner.
//!
//! Sub-phases of the pipeline borrow this mutably for their duration, one
//! after another.

use std::collections::{BTreeMap, BTreeSet};

use slotmap::SlotMap;

use crate::body::{ObjectKey, PhysicsObject, RigidBody};
use crate::broad_phase::Octree;
use crate::cache::FinishedCollision;
use crate::collider::{
    CapsuleCollider, CapsuleKey, ColliderId, ColliderIdentifier, CompoundCollider, CompoundKey,
    HeightFieldCollider, HullCollider, HullKey, MeshKey, ShapeRef, SphereCollider, SphereKey,
    TriangleMeshCollider,
};
use crate::island::{Island, IslandKey};
use crate::material::PhysicsMaterial;
use crate::math::{Aabb, Transform3, Vec3};
use crate::narrow_phase::sat::HullContactCacheEntry;
use crate::settings::PhysicsSettings;
use crate::solver::cone::{ConeConstraint, ConeKey};
use crate::solver::contact::{ContactConstraint, ImpulseCacheEntry};
use crate::solver::hinge::{HingeConstraint, HingeKey};
use crate::solver::motor::{MotorConstraint, MotorKey};

/// Owner of all bodies, colliders, caches, islands and tunables.
#[derive(Default)]
pub struct PhysicsData {
    /// Spatial index of all colliders.
    pub octree: Octree,
    /// Simulated objects.
    pub objects: SlotMap<ObjectKey, PhysicsObject>,
    /// Public handle table.
    pub identifiers: SlotMap<ColliderId, ColliderIdentifier>,
    /// Sphere collider storage.
    pub spheres: SlotMap<SphereKey, SphereCollider>,
    /// Capsule collider storage.
    pub capsules: SlotMap<CapsuleKey, CapsuleCollider>,
    /// Convex hull collider storage.
    pub hulls: SlotMap<HullKey, HullCollider>,
    /// Triangle mesh collider storage.
    pub meshes: SlotMap<MeshKey, TriangleMeshCollider>,
    /// Compound collider storage.
    pub compounds: SlotMap<CompoundKey, CompoundCollider>,
    /// The single global static height field.
    pub height_field: Option<HeightFieldCollider>,
    /// Handle of the height field once initialised.
    pub height_field_id: Option<ColliderId>,
    /// Contact constraints of the current step, in narrow phase order.
    pub contact_constraints: Vec<ContactConstraint>,
    /// Hinge joints.
    pub hinge_constraints: SlotMap<HingeKey, HingeConstraint>,
    /// Cone joints.
    pub cone_constraints: SlotMap<ConeKey, ConeConstraint>,
    /// Motor joints.
    pub motor_constraints: SlotMap<MotorKey, MotorConstraint>,
    /// Warm start impulses per manifold.
    pub contact_impulse_cache: BTreeMap<u64, ImpulseCacheEntry>,
    /// SAT face pairs per hull-hull manifold.
    pub hull_contact_cache: BTreeMap<u64, HullContactCacheEntry>,
    /// Resolution records of pairs that stopped colliding.
    pub finished_collisions: BTreeMap<u64, FinishedCollision>,
    /// Manifolds produced this step.
    pub active_manifolds: BTreeSet<u64>,
    /// Manifolds produced the previous step.
    pub prev_manifolds: BTreeSet<u64>,
    /// Constraint-coupled body groups.
    pub islands: SlotMap<IslandKey, Island>,
    /// Tunables.
    pub settings: PhysicsSettings,
}

impl PhysicsData {
    /// Fresh state with the given settings.
    pub fn new(settings: PhysicsSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Current world bounds of a collider.
    pub fn collider_aabb(&self, shape: ShapeRef) -> Aabb {
        let empty = Aabb {
            min: Vec3::zero(),
            max: Vec3::zero(),
        };

        match shape {
            ShapeRef::Sphere(key) => self.spheres.get(key).map_or(empty, |c| c.bound),
            ShapeRef::Capsule(key) => self.capsules.get(key).map_or(empty, |c| c.bound),
            ShapeRef::Hull(key) => self.hulls.get(key).map_or(empty, |c| c.bound),
            ShapeRef::Mesh(key) => self.meshes.get(key).map_or(empty, |c| c.bound),
            ShapeRef::HeightField => self.height_field.as_ref().map_or(empty, |c| c.bound),
            ShapeRef::Compound(key) => self.compounds.get(key).map_or(empty, |c| c.bound),
        }
    }

    /// Material of a collider.
    pub fn collider_material(&self, shape: ShapeRef) -> PhysicsMaterial {
        let fallback = PhysicsMaterial::default;

        match shape {
            ShapeRef::Sphere(key) => self.spheres.get(key).map_or_else(fallback, |c| c.material),
            ShapeRef::Capsule(key) => self.capsules.get(key).map_or_else(fallback, |c| c.material),
            ShapeRef::Hull(key) => self.hulls.get(key).map_or_else(fallback, |c| c.material),
            ShapeRef::Mesh(key) => self.meshes.get(key).map_or_else(fallback, |c| c.material),
            ShapeRef::HeightField => self
                .height_field
                .as_ref()
                .map_or_else(fallback, |c| c.material),
            ShapeRef::Compound(key) => {
                self.compounds.get(key).map_or_else(fallback, |c| c.material)
            }
        }
    }

    /// Refresh a collider's cached world-space form after its body moved.
    pub fn update_collider_transform(&mut self, shape: ShapeRef, transform: &Transform3) {
        match shape {
            ShapeRef::Sphere(key) => {
                if let Some(collider) = self.spheres.get_mut(key) {
                    collider.update_transform(transform);
                }
            }
            ShapeRef::Capsule(key) => {
                if let Some(collider) = self.capsules.get_mut(key) {
                    collider.update_transform(transform);
                }
            }
            ShapeRef::Hull(key) => {
                if let Some(collider) = self.hulls.get_mut(key) {
                    collider.update_transform(transform);
                }
            }
            ShapeRef::Compound(key) => {
                if let Some(collider) = self.compounds.get_mut(key) {
                    collider.update_transform(transform);
                }
            }
            // Meshes and the height field never move
            ShapeRef::Mesh(_) | ShapeRef::HeightField => {}
        }
    }

    /// Remove a collider and its body.
    ///
    /// Constraints referencing the body retire themselves on the next step.
    pub fn erase(&mut self, id: ColliderId) -> bool {
        let Some(identifier) = self.identifiers.remove(id) else {
            return false;
        };

        if let Some(node) = identifier.node {
            self.octree.remove(id, node, identifier.is_static);
        }

        match identifier.shape {
            ShapeRef::Sphere(key) => {
                self.spheres.remove(key);
            }
            ShapeRef::Capsule(key) => {
                self.capsules.remove(key);
            }
            ShapeRef::Hull(key) => {
                self.hulls.remove(key);
            }
            ShapeRef::Mesh(key) => {
                self.meshes.remove(key);
            }
            ShapeRef::HeightField => {
                self.height_field = None;
                self.height_field_id = None;
            }
            ShapeRef::Compound(key) => {
                self.compounds.remove(key);
            }
        }

        self.objects.remove(identifier.object);

        true
    }

    /// Rigid body behind a handle.
    pub fn body(&self, id: ColliderId) -> Option<&RigidBody> {
        let identifier = self.identifiers.get(id)?;

        Some(&self.objects.get(identifier.object)?.rigid_body)
    }

    /// Mutable rigid body behind a handle.
    pub fn body_mut(&mut self, id: ColliderId) -> Option<&mut RigidBody> {
        let identifier = self.identifiers.get(id)?;

        Some(&mut self.objects.get_mut(identifier.object)?.rigid_body)
    }
}
