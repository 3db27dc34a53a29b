//! Convex hull topology used by the separating axis test.
//!
//! The geometry backend computes the hull of a point cloud; this module
//! merges its triangles into polygonal faces and keeps the edge list the
//! axis test needs.

use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;

use crate::math::{self, Aabb, Real, Transform3, Vec3};
use crate::parry::transformation;

/// Polygonal face of a convex hull.
#[derive(Debug, Clone, Default)]
pub struct HullFace {
    /// Vertex indices, wound counter-clockwise seen from outside.
    pub indices: SmallVec<[u32; 8]>,
    /// Outward unit normal.
    pub normal: Vec3,
}

/// Vertex, face and edge data of a convex hull in a single frame.
#[derive(Debug, Clone, Default)]
pub struct HullData {
    /// Corner positions.
    pub vertices: Vec<Vec3>,
    /// Polygonal faces with outward normals.
    pub faces: Vec<HullFace>,
    /// Unique undirected edges as vertex index pairs.
    pub edges: Vec<(u32, u32)>,
    /// Mean of the vertices, used to orient separating axes.
    pub center: Vec3,
}

impl HullData {
    /// Build hull topology from a point cloud.
    ///
    /// Also returns the triangulation for tensor integration. Returns `None`
    /// for degenerate clouds that don't span a volume.
    pub fn from_points(points: &[Vec3]) -> Option<(Self, Vec<[u32; 3]>)> {
        puffin::profile_function!();

        if points.len() < 4 {
            return None;
        }

        let na_points: Vec<_> = points.iter().map(|p| math::to_na_point(*p)).collect();
        let (hull_points, triangles) = transformation::convex_hull(&na_points);

        let vertices: Vec<Vec3> = hull_points.iter().map(|p| math::from_na_point(*p)).collect();
        if vertices.len() < 4 || triangles.is_empty() {
            return None;
        }

        let center =
            vertices.iter().fold(Vec3::zero(), |sum, v| sum + *v) / vertices.len() as Real;
        let faces = merge_coplanar(&vertices, &triangles);
        let edges = collect_edges(&faces);

        let data = Self {
            vertices,
            faces,
            edges,
            center,
        };

        Some((data, triangles))
    }

    /// Overwrite this hull with a transformed copy of another, reusing the
    /// allocations already held.
    pub fn transform_from(&mut self, local: &Self, transform: &Transform3) {
        self.vertices.clear();
        self.vertices
            .extend(local.vertices.iter().map(|v| transform.transform_point(*v)));

        self.faces.resize(local.faces.len(), HullFace::default());
        for (face, local_face) in self.faces.iter_mut().zip(local.faces.iter()) {
            face.indices.clone_from(&local_face.indices);
            face.normal = transform.transform_vector(local_face.normal);
        }

        self.edges.clone_from(&local.edges);
        self.center = transform.transform_point(local.center);
    }

    /// Transformed copy.
    pub fn transformed(&self, transform: &Transform3) -> Self {
        let mut out = Self::default();
        out.transform_from(self, transform);
        out
    }

    /// Bounding box of the vertices.
    pub fn aabb(&self) -> Aabb {
        let mut min = self.vertices[0];
        let mut max = min;
        for v in self.vertices.iter().skip(1) {
            min = Vec3::new(min.x.min(v.x), min.y.min(v.y), min.z.min(v.z));
            max = Vec3::new(max.x.max(v.x), max.y.max(v.y), max.z.max(v.z));
        }

        Aabb { min, max }
    }

    /// Projection interval of the hull on an axis.
    pub fn project(&self, axis: Vec3) -> (Real, Real) {
        let mut min = axis.dot(self.vertices[0]);
        let mut max = min;
        for v in self.vertices.iter().skip(1) {
            let d = axis.dot(*v);
            min = min.min(d);
            max = max.max(d);
        }

        (min, max)
    }

    /// Face whose normal is most aligned with a direction.
    pub fn most_parallel_face(&self, direction: Vec3) -> usize {
        let mut best = 0;
        let mut best_dot = -Real::MAX;
        for (index, face) in self.faces.iter().enumerate() {
            let dot = face.normal.dot(direction);
            if dot > best_dot {
                best_dot = dot;
                best = index;
            }
        }

        best
    }

    /// A hull spanning an axis-aligned box, useful for tests and terrain slabs.
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
}

/// Merge the hull triangulation into polygonal faces.
fn merge_coplanar(vertices: &[Vec3], triangles: &[[u32; 3]]) -> Vec<HullFace> {
    /// Cosine threshold above which two triangle normals count as one face.
    const NORMAL_TOLERANCE: Real = 1.0 - 1e-5;
    /// Plane offset tolerance for coplanarity.
    const PLANE_TOLERANCE: Real = 1e-5;

    // Group triangles by their supporting plane
    let mut groups: Vec<(Vec3, Real, Vec<[u32; 3]>)> = Vec::new();
    for triangle in triangles {
        let a = vertices[triangle[0] as usize];
        let b = vertices[triangle[1] as usize];
        let c = vertices[triangle[2] as usize];

        let normal = match (b - a).cross(c - a).try_normalized() {
            Some(normal) => normal,
            // Degenerate sliver, contributes no face
            None => continue,
        };
        let offset = normal.dot(a);

        match groups.iter_mut().find(|(group_normal, group_offset, _)| {
            group_normal.dot(normal) > NORMAL_TOLERANCE && (group_offset - offset).abs() < PLANE_TOLERANCE
        }) {
            Some((_, _, members)) => members.push(*triangle),
            None => groups.push((normal, offset, vec![*triangle])),
        }
    }

    let mut faces = Vec::with_capacity(groups.len());
    for (normal, _, members) in groups {
        match chain_boundary(&members) {
            Some(indices) => faces.push(HullFace { indices, normal }),
            // Unchainable group, keep the raw triangles so coverage survives
            None => {
                for triangle in &members {
                    faces.push(HullFace {
                        indices: SmallVec::from_slice(triangle),
                        normal,
                    });
                }
            }
        }
    }

    faces
}

/// Walk the boundary loop of a coplanar triangle group.
fn chain_boundary(triangles: &[[u32; 3]]) -> Option<SmallVec<[u32; 8]>> {
    let mut directed = BTreeSet::new();
    for t in triangles {
        directed.insert((t[0], t[1]));
        directed.insert((t[1], t[2]));
        directed.insert((t[2], t[0]));
    }

    // Boundary edges are the ones whose reverse is missing
    let mut next = BTreeMap::new();
    for (a, b) in directed.iter() {
        if !directed.contains(&(*b, *a)) && next.insert(*a, *b).is_some() {
            // Non-manifold boundary
            return None;
        }
    }
    if next.is_empty() {
        return None;
    }

    let start = *next.keys().next().unwrap();
    let mut indices = SmallVec::new();
    let mut current = start;
    loop {
        indices.push(current);
        current = *next.get(&current)?;
        if current == start {
            break;
        }
        if indices.len() > next.len() {
            return None;
        }
    }

    (indices.len() == next.len()).then_some(indices)
}

/// Unique undirected edges over the merged faces.
fn collect_edges(faces: &[HullFace]) -> Vec<(u32, u32)> {
    let mut edges = BTreeSet::new();
    for face in faces {
        for (i, a) in face.indices.iter().enumerate() {
            let b = face.indices[(i + 1) % face.indices.len()];
            edges.insert((*a.min(&b), *a.max(&b)));
        }
    }

    edges.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A box hull must reduce to 6 quads, 12 edges and 8 vertices.
    #[test]
    fn test_box_topology() {
        let points = HullData::box_points(Vec3::new(0.5, 0.5, 0.5));
        let (hull, _) = HullData::from_points(&points).unwrap();

        assert_eq!(hull.vertices.len(), 8);
        assert_eq!(hull.faces.len(), 6);
        assert_eq!(hull.edges.len(), 12);
        for face in &hull.faces {
            assert_eq!(face.indices.len(), 4);
            // Outward: the normal points away from the center
            let on_face = hull.vertices[face.indices[0] as usize];
            assert!(face.normal.dot(on_face - hull.center) > 0.0);
        }

        let (min, max) = hull.project(Vec3::unit_x());
        assert!((min + 0.5).abs() < 1e-9 && (max - 0.5).abs() < 1e-9);
    }

    /// Degenerate clouds are rejected instead of producing flat hulls.
    #[test]
    fn test_too_few_points() {
        let points = vec![Vec3::zero(), Vec3::unit_x(), Vec3::unit_y()];
        assert!(HullData::from_points(&points).is_none());
    }

    /// Transforming keeps topology and moves geometry.
    #[test]
    fn test_transform() {
        let points = HullData::box_points(Vec3::new(1.0, 0.5, 0.25));
        let (hull, _) = HullData::from_points(&points).unwrap();

        let transform = Transform3::new(
            Vec3::new(10.0, 0.0, 0.0),
            math::rotation_quaternion(Vec3::unit_z() * (PI_HALF)),
        );
        let moved = hull.transformed(&transform);

        assert_eq!(moved.faces.len(), hull.faces.len());
        assert!((moved.center - Vec3::new(10.0, 0.0, 0.0)).magnitude() < 1e-6);
        // The x half extent rotates onto y
        let (min, max) = moved.project(Vec3::unit_y());
        assert!((max - min - 2.0).abs() < 1e-6);
    }

    const PI_HALF: Real = crate::math::PI / 2.0;
}
