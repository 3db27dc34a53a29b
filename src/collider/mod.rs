//! Collision shapes and the per-variant collider storage.
//!
//! Every collider keeps a world-space cached form and bounding box that the
//! integrator refreshes whenever its body moves.

pub mod hull;

use slotmap::new_key_type;

use crate::body::ObjectKey;
use crate::broad_phase::NodeKey;
use crate::material::PhysicsMaterial;
use crate::math::{self, Aabb, Real, Transform3, Vec3};
use crate::parry::shape::ConvexPolyhedron;

use self::hull::HullData;

new_key_type! {
    /// Public handle to a collider and the rigid body behind it.
    pub struct ColliderId;
    /// Key into the sphere collider arena.
    pub struct SphereKey;
    /// Key into the capsule collider arena.
    pub struct CapsuleKey;
    /// Key into the convex hull collider arena.
    pub struct HullKey;
    /// Key into the triangle mesh collider arena.
    pub struct MeshKey;
    /// Key into the compound collider arena.
    pub struct CompoundKey;
}

/// Whether a collider is simulated or pinned in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColliderMotionState {
    /// Integrated and solved every step.
    Dynamic,
    /// Infinite mass, never moves.
    Static,
}

/// Sphere shape described in body-local space.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    /// Centre in the body frame.
    pub center: Vec3,
    /// Radius.
    pub radius: Real,
}

/// Capsule shape described in body-local space.
#[derive(Debug, Clone, Copy)]
pub struct Capsule {
    /// One end of the core segment.
    pub start: Vec3,
    /// Other end of the core segment.
    pub end: Vec3,
    /// Radius around the segment.
    pub radius: Real,
}

/// Convex hull described by a point cloud in body-local space.
#[derive(Debug, Clone)]
pub struct ConvexHull {
    /// Cloud the hull is computed from, at least 4 points spanning a volume.
    pub points: Vec<Vec3>,
}

/// Static triangle mesh in world space.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Vec3>,
    /// Triangles as vertex index triples.
    pub indices: Vec<[u32; 3]>,
}

/// Description of the single global static height field.
#[derive(Debug, Clone)]
pub struct HeightFieldParameters {
    /// World position of the grid corner at row 0, column 0.
    pub origin: Vec3,
    /// Sample rows along the z axis.
    pub rows: u32,
    /// Sample columns along the x axis.
    pub columns: u32,
    /// Distance between neighbouring samples.
    pub cell_size: Real,
    /// Row-major height samples.
    pub heights: Vec<Real>,
}

/// One primitive of a compound collider.
#[derive(Debug, Clone)]
pub enum CompoundPart {
    /// Sphere part.
    Sphere(Sphere),
    /// Capsule part.
    Capsule(Capsule),
    /// Convex hull part.
    ConvexHull(ConvexHull),
}

/// Reference from the identifier table into the per-variant arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRef {
    /// Sphere collider.
    Sphere(SphereKey),
    /// Capsule collider.
    Capsule(CapsuleKey),
    /// Convex hull collider.
    Hull(HullKey),
    /// Triangle mesh collider.
    Mesh(MeshKey),
    /// The global height field.
    HeightField,
    /// Compound collider.
    Compound(CompoundKey),
}

/// Entry of the public identifier table.
#[derive(Debug, Clone, Copy)]
pub struct ColliderIdentifier {
    /// Which arena holds the shape data.
    pub shape: ShapeRef,
    /// Owning physics object.
    pub object: ObjectKey,
    /// Octree node the collider is currently registered at.
    pub node: Option<NodeKey>,
    /// Bounding box swept over the predicted motion of this step.
    pub swept: Aabb,
    /// Never migrates in the octree when set.
    pub is_static: bool,
}

/// Sphere collider storage.
#[derive(Debug, Clone)]
pub struct SphereCollider {
    /// Centre in the body frame.
    pub local_center: Vec3,
    /// Radius.
    pub radius: Real,
    /// Cached world-space centre.
    pub world_center: Vec3,
    /// Cached world-space bounds.
    pub bound: Aabb,
    /// Surface material.
    pub material: PhysicsMaterial,
}

impl SphereCollider {
    /// Store a sphere placed by a body transform.
    pub fn new(shape: &Sphere, material: PhysicsMaterial, transform: &Transform3) -> Self {
        let mut collider = Self {
            local_center: shape.center,
            radius: shape.radius,
            world_center: Vec3::zero(),
            bound: Aabb { min: Vec3::zero(), max: Vec3::zero() },
            material,
        };
        collider.update_transform(transform);

        collider
    }

    /// Refresh the cached world-space form.
    pub fn update_transform(&mut self, transform: &Transform3) {
        self.world_center = transform.transform_point(self.local_center);
        let extent = Vec3::broadcast(self.radius);
        self.bound = Aabb {
            min: self.world_center - extent,
            max: self.world_center + extent,
        };
    }
}

/// Capsule collider storage.
#[derive(Debug, Clone)]
pub struct CapsuleCollider {
    /// Segment start in the body frame.
    pub local_start: Vec3,
    /// Segment end in the body frame.
    pub local_end: Vec3,
    /// Radius around the segment.
    pub radius: Real,
    /// Cached world-space segment start.
    pub world_start: Vec3,
    /// Cached world-space segment end.
    pub world_end: Vec3,
    /// Cached world-space bounds.
    pub bound: Aabb,
    /// Surface material.
    pub material: PhysicsMaterial,
}

impl CapsuleCollider {
    /// Store a capsule placed by a body transform.
    pub fn new(shape: &Capsule, material: PhysicsMaterial, transform: &Transform3) -> Self {
        let mut collider = Self {
            local_start: shape.start,
            local_end: shape.end,
            radius: shape.radius,
            world_start: Vec3::zero(),
            world_end: Vec3::zero(),
            bound: Aabb { min: Vec3::zero(), max: Vec3::zero() },
            material,
        };
        collider.update_transform(transform);

        collider
    }

    /// Refresh the cached world-space form.
    pub fn update_transform(&mut self, transform: &Transform3) {
        self.world_start = transform.transform_point(self.local_start);
        self.world_end = transform.transform_point(self.local_end);

        let extent = Vec3::broadcast(self.radius);
        let min = Vec3::new(
            self.world_start.x.min(self.world_end.x),
            self.world_start.y.min(self.world_end.y),
            self.world_start.z.min(self.world_end.z),
        );
        let max = Vec3::new(
            self.world_start.x.max(self.world_end.x),
            self.world_start.y.max(self.world_end.y),
            self.world_start.z.max(self.world_end.z),
        );
        self.bound = Aabb {
            min: min - extent,
            max: max + extent,
        };
    }
}

/// Convex hull collider storage.
#[derive(Debug, Clone)]
pub struct HullCollider {
    /// Hull topology in the body frame.
    pub local: HullData,
    /// Cached world-space hull.
    pub world: HullData,
    /// Geometry backend shape for primitive queries, in the body frame.
    pub backend: ConvexPolyhedron,
    /// Cached world-space bounds.
    pub bound: Aabb,
    /// Surface material.
    pub material: PhysicsMaterial,
}

impl HullCollider {
    /// Store hull topology placed by a body transform.
    pub fn new(
        local: HullData,
        backend: ConvexPolyhedron,
        material: PhysicsMaterial,
        transform: &Transform3,
    ) -> Self {
        let world = local.transformed(transform);
        let bound = world.aabb();

        Self {
            local,
            world,
            backend,
            bound,
            material,
        }
    }

    /// Refresh the cached world-space form.
    pub fn update_transform(&mut self, transform: &Transform3) {
        self.world.transform_from(&self.local, transform);
        self.bound = self.world.aabb();
    }
}

/// Static triangle mesh collider storage, fixed in world space at add time.
#[derive(Debug, Clone)]
pub struct TriangleMeshCollider {
    /// World-space triangles.
    pub triangles: Vec<[Vec3; 3]>,
    /// Bounding box per triangle for the overlap prefilter.
    pub triangle_bounds: Vec<Aabb>,
    /// Bounds of the whole mesh.
    pub bound: Aabb,
    /// Surface material.
    pub material: PhysicsMaterial,
}

impl TriangleMeshCollider {
    /// Store a mesh placed by a transform.
    ///
    /// Returns `None` when an index is out of range or there is no triangle.
    pub fn new(
        mesh: &TriangleMesh,
        material: PhysicsMaterial,
        transform: &Transform3,
    ) -> Option<Self> {
        if mesh.indices.is_empty() {
            return None;
        }

        let vertices: Vec<Vec3> = mesh
            .vertices
            .iter()
            .map(|v| transform.transform_point(*v))
            .collect();

        let mut triangles = Vec::with_capacity(mesh.indices.len());
        let mut triangle_bounds = Vec::with_capacity(mesh.indices.len());
        let mut bound: Option<Aabb> = None;
        for indices in &mesh.indices {
            let triangle = [
                *vertices.get(indices[0] as usize)?,
                *vertices.get(indices[1] as usize)?,
                *vertices.get(indices[2] as usize)?,
            ];
            let triangle_bound = triangle_aabb(&triangle);

            match bound.as_mut() {
                Some(bound) => bound.expand_to_contain(triangle_bound),
                None => bound = Some(triangle_bound),
            }
            triangles.push(triangle);
            triangle_bounds.push(triangle_bound);
        }

        Some(Self {
            triangles,
            triangle_bounds,
            bound: bound?,
            material,
        })
    }

    /// Indices of triangles whose bounds overlap a query box.
    pub fn overlapping_triangles(&self, aabb: Aabb, out: &mut Vec<u32>) {
        out.clear();
        for (index, bound) in self.triangle_bounds.iter().enumerate() {
            if bound.collides_with_aabb(aabb) {
                out.push(index as u32);
            }
        }
    }
}

/// The single global static height field.
#[derive(Debug, Clone)]
pub struct HeightFieldCollider {
    /// World position of the sample at row 0, column 0.
    pub origin: Vec3,
    /// Sample rows along z.
    pub rows: u32,
    /// Sample columns along x.
    pub columns: u32,
    /// Distance between neighbouring samples.
    pub cell_size: Real,
    /// Row-major height samples.
    pub heights: Vec<Real>,
    /// Bounds of the whole field.
    pub bound: Aabb,
    /// Surface material.
    pub material: PhysicsMaterial,
}

impl HeightFieldCollider {
    /// Store a height field.
    ///
    /// Returns `None` when the sample counts don't match the grid.
    pub fn new(parameters: &HeightFieldParameters, material: PhysicsMaterial) -> Option<Self> {
        let rows = parameters.rows;
        let columns = parameters.columns;
        if rows < 2 || columns < 2 || parameters.cell_size <= 0.0 {
            return None;
        }
        if parameters.heights.len() != (rows * columns) as usize {
            return None;
        }

        let mut lowest = parameters.heights[0];
        let mut highest = lowest;
        for height in &parameters.heights {
            lowest = lowest.min(*height);
            highest = highest.max(*height);
        }

        let origin = parameters.origin;
        let bound = Aabb {
            min: origin + Vec3::new(0.0, lowest, 0.0),
            max: origin
                + Vec3::new(
                    (columns - 1) as Real * parameters.cell_size,
                    highest,
                    (rows - 1) as Real * parameters.cell_size,
                ),
        };

        Some(Self {
            origin,
            rows,
            columns,
            cell_size: parameters.cell_size,
            heights: parameters.heights.clone(),
            bound,
            material,
        })
    }

    /// Sample position at a grid coordinate.
    fn sample(&self, row: u32, column: u32) -> Vec3 {
        let height = self.heights[(row * self.columns + column) as usize];

        self.origin
            + Vec3::new(
                column as Real * self.cell_size,
                height,
                row as Real * self.cell_size,
            )
    }

    /// Emit the one or two triangles of every patch overlapped by a box.
    ///
    /// Each triangle carries a stable patch feature id.
    pub fn patches_in(&self, aabb: Aabb, out: &mut Vec<([Vec3; 3], u32)>) {
        out.clear();

        let to_cell = |value: Real, limit: u32| -> u32 {
            let cell = (value / self.cell_size).floor();
            (cell.max(0.0) as u32).min(limit - 1)
        };
        let first_column = to_cell(aabb.min.x - self.origin.x, self.columns - 1);
        let last_column = to_cell(aabb.max.x - self.origin.x, self.columns - 1);
        let first_row = to_cell(aabb.min.z - self.origin.z, self.rows - 1);
        let last_row = to_cell(aabb.max.z - self.origin.z, self.rows - 1);

        for row in first_row..=last_row {
            for column in first_column..=last_column {
                let corner = self.sample(row, column);
                let south = self.sample(row + 1, column);
                let east = self.sample(row, column + 1);
                let south_east = self.sample(row + 1, column + 1);

                let patch = row * (self.columns - 1) + column;
                out.push(([corner, south, east], patch * 2));
                out.push(([east, south, south_east], patch * 2 + 1));
            }
        }
    }
}

/// Compound collider storage: primitives with local placements.
#[derive(Debug, Clone)]
pub struct CompoundCollider {
    /// Sub-shapes with their placements.
    pub parts: Vec<CompoundColliderPart>,
    /// Cached world-space bounds of all parts.
    pub bound: Aabb,
    /// Surface material shared by the parts.
    pub material: PhysicsMaterial,
}

/// One stored primitive of a compound collider.
#[derive(Debug, Clone)]
pub struct CompoundColliderPart {
    /// Placement in the body frame.
    pub local_transform: Transform3,
    /// Cached world placement.
    pub world_transform: Transform3,
    /// The primitive itself.
    pub shape: CompoundPartShape,
}

/// Shape storage of a compound part.
#[derive(Debug, Clone)]
pub enum CompoundPartShape {
    /// Sphere in part-local space with a cached world centre.
    Sphere {
        /// Centre in the part frame.
        local_center: Vec3,
        /// Radius.
        radius: Real,
        /// Cached world centre.
        world_center: Vec3,
    },
    /// Capsule in part-local space with cached world endpoints.
    Capsule {
        /// Segment start in the part frame.
        local_start: Vec3,
        /// Segment end in the part frame.
        local_end: Vec3,
        /// Radius.
        radius: Real,
        /// Cached world segment start.
        world_start: Vec3,
        /// Cached world segment end.
        world_end: Vec3,
    },
    /// Hull in part-local space with a cached world hull.
    Hull {
        /// Topology in the part frame.
        local: HullData,
        /// Cached world topology.
        world: HullData,
        /// Geometry backend shape in the part frame.
        backend: ConvexPolyhedron,
    },
}

impl CompoundCollider {
    /// Refresh all cached world-space forms.
    pub fn update_transform(&mut self, transform: &Transform3) {
        let mut bound: Option<Aabb> = None;

        for part in self.parts.iter_mut() {
            part.world_transform = transform.mul(&part.local_transform);

            let part_bound = match &mut part.shape {
                CompoundPartShape::Sphere {
                    local_center,
                    radius,
                    world_center,
                } => {
                    *world_center = part.world_transform.transform_point(*local_center);
                    let extent = Vec3::broadcast(*radius);
                    Aabb {
                        min: *world_center - extent,
                        max: *world_center + extent,
                    }
                }
                CompoundPartShape::Capsule {
                    local_start,
                    local_end,
                    radius,
                    world_start,
                    world_end,
                } => {
                    *world_start = part.world_transform.transform_point(*local_start);
                    *world_end = part.world_transform.transform_point(*local_end);
                    let extent = Vec3::broadcast(*radius);
                    let min = Vec3::new(
                        world_start.x.min(world_end.x),
                        world_start.y.min(world_end.y),
                        world_start.z.min(world_end.z),
                    );
                    let max = Vec3::new(
                        world_start.x.max(world_end.x),
                        world_start.y.max(world_end.y),
                        world_start.z.max(world_end.z),
                    );
                    Aabb {
                        min: min - extent,
                        max: max + extent,
                    }
                }
                CompoundPartShape::Hull { local, world, .. } => {
                    world.transform_from(local, &part.world_transform);
                    world.aabb()
                }
            };

            match bound.as_mut() {
                Some(bound) => bound.expand_to_contain(part_bound),
                None => bound = Some(part_bound),
            }
        }

        if let Some(bound) = bound {
            self.bound = bound;
        }
    }
}

/// Bounding box of a single triangle.
pub fn triangle_aabb(triangle: &[Vec3; 3]) -> Aabb {
    let [a, b, c] = triangle;
    let min = Vec3::new(
        a.x.min(b.x).min(c.x),
        a.y.min(b.y).min(c.y),
        a.z.min(b.z).min(c.z),
    );
    let max = Vec3::new(
        a.x.max(b.x).max(c.x),
        a.y.max(b.y).max(c.y),
        a.z.max(b.z).max(c.z),
    );

    Aabb { min, max }
}

/// Build the geometry backend hull shape for primitive queries.
pub fn build_backend_hull(points: &[Vec3]) -> Option<ConvexPolyhedron> {
    let na_points: Vec<_> = points.iter().map(|p| math::to_na_point(*p)).collect();

    ConvexPolyhedron::from_convex_hull(&na_points)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Height field patches must cover the queried area with stable ids.
    #[test]
    fn test_height_field_patches() {
        let field = HeightFieldCollider::new(
            &HeightFieldParameters {
                origin: Vec3::new(-2.0, 0.0, -2.0),
                rows: 5,
                columns: 5,
                cell_size: 1.0,
                heights: vec![0.0; 25],
            },
            PhysicsMaterial::ground(),
        )
        .unwrap();

        let mut patches = Vec::new();
        field.patches_in(
            Aabb {
                min: Vec3::new(-0.4, -1.0, -0.4),
                max: Vec3::new(0.4, 1.0, 0.4),
            },
            &mut patches,
        );

        // A box straddling a grid corner touches 4 cells, 2 triangles each
        assert_eq!(patches.len(), 8);
        let mut ids: Vec<u32> = patches.iter().map(|(_, id)| *id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    /// Mismatched sample counts are rejected.
    #[test]
    fn test_height_field_validation() {
        let parameters = HeightFieldParameters {
            origin: Vec3::zero(),
            rows: 3,
            columns: 3,
            cell_size: 1.0,
            heights: vec![0.0; 8],
        };
        assert!(HeightFieldCollider::new(&parameters, PhysicsMaterial::ground()).is_none());
    }

    /// Sphere bounds follow the body transform.
    #[test]
    fn test_sphere_transform() {
        let shape = Sphere {
            center: Vec3::new(1.0, 0.0, 0.0),
            radius: 0.5,
        };
        let mut collider = SphereCollider::new(
            &shape,
            PhysicsMaterial::rubber(),
            &Transform3::default(),
        );
        assert!((collider.world_center - Vec3::new(1.0, 0.0, 0.0)).magnitude() < 1e-9);

        collider.update_transform(&Transform3::from_position(Vec3::new(0.0, 3.0, 0.0)));
        assert!((collider.bound.min.y - 2.5).abs() < 1e-9);
        assert!((collider.bound.max.y - 3.5).abs() < 1e-9);
    }
}
