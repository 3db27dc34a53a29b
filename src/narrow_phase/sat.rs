//! Separating axis test with reference face clipping for convex hulls.
//!
//! Face normals of both hulls and the cross products of their edge pairs
//! are tested; the least penetrating axis picks between a clipped face
//! manifold and a single edge-edge contact.

use smallvec::SmallVec;

use crate::collider::hull::HullData;
use crate::math::{self, Real, Vec3};
use crate::narrow_phase::manifold::ContactManifold;

/// Edge contacts must beat the best face axis by this much to win.
const EDGE_PREFERENCE_TOLERANCE: Real = 1e-4;

/// Clip points keep a little slack so grazing contacts don't flicker.
const CLIP_TOLERANCE: Real = 1e-9;

/// Cached SAT result for a hull pair, valid while the pair barely moves.
#[derive(Debug, Clone)]
pub struct HullContactCacheEntry {
    /// Centre of the first hull when the entry was written.
    pub center_a: Vec3,
    /// Centre of the second hull when the entry was written.
    pub center_b: Vec3,
    /// Reference face index on the reference hull.
    pub reference_face: u16,
    /// Incident face index on the other hull.
    pub incident_face: u16,
    /// The reference face lives on the second hull.
    pub reference_on_b: bool,
    /// Steps left before eviction when untouched.
    pub retention: u8,
    /// Refreshed this step.
    pub touched: bool,
}

/// Face pair that produced the manifold, for the inter-frame cache.
#[derive(Debug, Clone, Copy)]
pub struct FacePairResult {
    /// Reference face index.
    pub reference_face: u16,
    /// Incident face index.
    pub incident_face: u16,
    /// The reference face lives on the second hull.
    pub reference_on_b: bool,
}

/// Generate contacts between two hulls.
///
/// Points within `margin` of touching are emitted with positive separation
/// so the solver can treat them speculatively. Returns the face pair for
/// caching; `None` with an empty manifold means a separating axis exists.
pub fn hull_vs_hull(
    a: &HullData,
    b: &HullData,
    margin: Real,
    cache: Option<&HullContactCacheEntry>,
    minimal_displacement: Real,
    feature_salt: u32,
    manifold: &mut ContactManifold,
) -> Option<FacePairResult> {
    puffin::profile_function!();

    // Reuse the cached face pair while the geometry barely moved
    if let Some(entry) = cache {
        let budget = minimal_displacement * minimal_displacement;
        let drifted = (a.center - entry.center_a).magnitude_squared() > budget
            || (b.center - entry.center_b).magnitude_squared() > budget;

        if !drifted {
            if let Some(result) = clip_cached(a, b, entry, margin, feature_salt, manifold) {
                return Some(result);
            }
            // Cached state no longer matches the geometry, fall through and
            // recompute from scratch
        }
    }

    // Face normals of A
    let mut best_a = (0, -Real::MAX);
    for (index, face) in a.faces.iter().enumerate() {
        let offset = face.normal.dot(a.vertices[face.indices[0] as usize]);
        let separation = b.project(face.normal).0 - offset;
        if separation > margin {
            return None;
        }
        if separation > best_a.1 {
            best_a = (index, separation);
        }
    }

    // Face normals of B
    let mut best_b = (0, -Real::MAX);
    for (index, face) in b.faces.iter().enumerate() {
        let offset = face.normal.dot(b.vertices[face.indices[0] as usize]);
        let separation = a.project(face.normal).0 - offset;
        if separation > margin {
            return None;
        }
        if separation > best_b.1 {
            best_b = (index, separation);
        }
    }

    // Cross products of the edge pairs
    let mut best_edge: Option<(usize, usize, Real, Vec3)> = None;
    for (index_a, edge_a) in a.edges.iter().enumerate() {
        let direction_a = a.vertices[edge_a.1 as usize] - a.vertices[edge_a.0 as usize];
        for (index_b, edge_b) in b.edges.iter().enumerate() {
            let direction_b = b.vertices[edge_b.1 as usize] - b.vertices[edge_b.0 as usize];

            let axis = match direction_a.cross(direction_b).try_normalized() {
                Some(axis) => axis,
                // Parallel edges are covered by the face axes
                None => continue,
            };
            // Point the axis from A to B
            let axis = if axis.dot(b.center - a.center) < 0.0 {
                -axis
            } else {
                axis
            };

            let separation = b.project(axis).0 - a.project(axis).1;
            if separation > margin {
                return None;
            }
            if best_edge.map_or(true, |(_, _, best, _)| separation > best) {
                best_edge = Some((index_a, index_b, separation, axis));
            }
        }
    }

    let best_face = if best_b.1 > best_a.1 + EDGE_PREFERENCE_TOLERANCE {
        (best_b.0, best_b.1, true)
    } else {
        (best_a.0, best_a.1, false)
    };

    if let Some((edge_a, edge_b, separation, axis)) = best_edge {
        if separation > best_face.1 + EDGE_PREFERENCE_TOLERANCE {
            // Edge contact: the closest points between the two edges
            let (start_a, end_a) = (
                a.vertices[a.edges[edge_a].0 as usize],
                a.vertices[a.edges[edge_a].1 as usize],
            );
            let (start_b, end_b) = (
                b.vertices[b.edges[edge_b].0 as usize],
                b.vertices[b.edges[edge_b].1 as usize],
            );
            let (on_a, on_b) = math::closest_points_on_segments(start_a, end_a, start_b, end_b);

            let id = math::feature_hash(
                0x4000_0000 | edge_a as u32,
                feature_hash_salted(edge_b as u32, feature_salt),
            );
            manifold.add_contact(axis, on_a, on_b, id);

            return None;
        }
    }

    let (reference_face, _, reference_on_b) = best_face;
    let (reference_hull, incident_hull) = if reference_on_b { (b, a) } else { (a, b) };
    let reference_normal = reference_hull.faces[reference_face].normal;
    let incident_face = incident_hull.most_parallel_face(-reference_normal);

    clip_face_pair(
        reference_hull,
        reference_face,
        incident_hull,
        incident_face,
        reference_on_b,
        margin,
        feature_salt,
        manifold,
    );

    Some(FacePairResult {
        reference_face: reference_face as u16,
        incident_face: incident_face as u16,
        reference_on_b,
    })
}

/// Generate contacts between a hull and a world-space triangle.
///
/// The triangle is treated as a degenerate hull; `triangle_id` salts the
/// feature hashes so neighbouring triangles keep distinct contact ids.
pub fn hull_vs_triangle(
    hull: &HullData,
    triangle: &[Vec3; 3],
    margin: Real,
    triangle_id: u32,
    manifold: &mut ContactManifold,
) {
    let Some(triangle_hull) = triangle_to_hull(triangle) else {
        return;
    };

    hull_vs_hull(
        hull,
        &triangle_hull,
        margin,
        None,
        0.0,
        triangle_id,
        manifold,
    );
}

/// Re-clip using the cached face pair, validating it still matches.
fn clip_cached(
    a: &HullData,
    b: &HullData,
    entry: &HullContactCacheEntry,
    margin: Real,
    feature_salt: u32,
    manifold: &mut ContactManifold,
) -> Option<FacePairResult> {
    let (reference_hull, incident_hull) = if entry.reference_on_b { (b, a) } else { (a, b) };

    let reference_face = entry.reference_face as usize;
    let incident_face = entry.incident_face as usize;
    if reference_face >= reference_hull.faces.len() || incident_face >= incident_hull.faces.len() {
        return None;
    }

    // The cached pair must still face each other
    let reference_normal = reference_hull.faces[reference_face].normal;
    if reference_normal.dot(incident_hull.center - reference_hull.center) <= 0.0 {
        return None;
    }
    if incident_hull.faces[incident_face].normal.dot(reference_normal) >= 0.0 {
        return None;
    }

    let produced = clip_face_pair(
        reference_hull,
        reference_face,
        incident_hull,
        incident_face,
        entry.reference_on_b,
        margin,
        feature_salt,
        manifold,
    );
    if !produced {
        return None;
    }

    Some(FacePairResult {
        reference_face: entry.reference_face,
        incident_face: entry.incident_face,
        reference_on_b: entry.reference_on_b,
    })
}

/// Clip the incident face against the side planes of the reference face and
/// keep the points at or below the reference plane.
#[allow(clippy::too_many_arguments)]
fn clip_face_pair(
    reference_hull: &HullData,
    reference_face: usize,
    incident_hull: &HullData,
    incident_face: usize,
    reference_on_b: bool,
    margin: Real,
    feature_salt: u32,
    manifold: &mut ContactManifold,
) -> bool {
    let reference = &reference_hull.faces[reference_face];
    let incident = &incident_hull.faces[incident_face];
    let normal = reference.normal;

    // Incident polygon with feature provenance per point
    let mut polygon: SmallVec<[(Vec3, u32); 16]> = incident
        .indices
        .iter()
        .map(|index| {
            (
                incident_hull.vertices[*index as usize],
                feature_hash_salted(*index, feature_salt),
            )
        })
        .collect();
    let mut clipped: SmallVec<[(Vec3, u32); 16]> = SmallVec::new();

    // Sutherland-Hodgman against each side plane of the reference face
    for plane in 0..reference.indices.len() {
        if polygon.is_empty() {
            break;
        }

        let start = reference_hull.vertices[reference.indices[plane] as usize];
        let end =
            reference_hull.vertices[reference.indices[(plane + 1) % reference.indices.len()] as usize];
        // Inward pointing side plane normal
        let side = normal.cross(end - start);

        clipped.clear();
        for (index, (point, id)) in polygon.iter().enumerate() {
            let (next_point, next_id) = polygon[(index + 1) % polygon.len()];

            let distance = side.dot(*point - start);
            let next_distance = side.dot(next_point - start);

            if distance >= -CLIP_TOLERANCE {
                clipped.push((*point, *id));
            }
            if (distance > CLIP_TOLERANCE) != (next_distance > CLIP_TOLERANCE)
                && (distance - next_distance).abs() > CLIP_TOLERANCE
            {
                let t = distance / (distance - next_distance);
                let intersection = *point + (next_point - *point) * t;
                let id = math::feature_hash(
                    0x8000_0000 | plane as u32,
                    math::feature_hash(*id, next_id),
                );
                clipped.push((intersection, id));
            }
        }

        core::mem::swap(&mut polygon, &mut clipped);
    }

    let reference_point = reference_hull.vertices[reference.indices[0] as usize];
    let mut produced = false;
    for (point, id) in polygon.iter() {
        let separation = normal.dot(*point - reference_point);
        if separation > margin {
            continue;
        }

        let on_reference = *point - normal * separation;
        let id = math::feature_hash(reference_face as u32, *id);
        if reference_on_b {
            // Manifold normals point from A to B
            manifold.add_contact(-normal, *point, on_reference, id);
        } else {
            manifold.add_contact(normal, on_reference, *point, id);
        }
        produced = true;
    }

    produced
}

/// Degenerate two-faced hull spanning a triangle.
fn triangle_to_hull(triangle: &[Vec3; 3]) -> Option<HullData> {
    use crate::collider::hull::HullFace;
    use smallvec::smallvec;

    let [a, b, c] = *triangle;
    let normal = (b - a).cross(c - a).try_normalized()?;

    let faces = vec![
        HullFace {
            indices: smallvec![0, 1, 2],
            normal,
        },
        HullFace {
            indices: smallvec![0, 2, 1],
            normal: -normal,
        },
    ];

    Some(HullData {
        vertices: vec![a, b, c],
        faces,
        edges: vec![(0, 1), (0, 2), (1, 2)],
        center: (a + b + c) / 3.0,
    })
}

/// Mix a triangle or patch salt into a feature id.
fn feature_hash_salted(id: u32, salt: u32) -> u32 {
    if salt == 0 {
        id
    } else {
        math::feature_hash(id, salt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::PhysicsMaterial;
    use crate::math::Transform3;

    fn unit_box_at(y: Real) -> HullData {
        let points = HullData::box_points(Vec3::broadcast(0.5));
        let (hull, _) = HullData::from_points(&points).unwrap();

        hull.transformed(&Transform3::from_position(Vec3::new(0.0, y, 0.0)))
    }

    fn empty_manifold() -> ContactManifold {
        ContactManifold::new(1, PhysicsMaterial::iron(), PhysicsMaterial::iron())
    }

    /// Stacked boxes produce a four point face manifold with the right
    /// depth and an upward normal.
    #[test]
    fn test_stacked_boxes() {
        let bottom = unit_box_at(0.0);
        let top = unit_box_at(0.98);

        let mut manifold = empty_manifold();
        let result = hull_vs_hull(&bottom, &top, 0.1, None, 0.0, 0, &mut manifold).unwrap();

        assert_eq!(manifold.points.len(), 4);
        for point in manifold.points.iter() {
            assert!((point.normal - Vec3::unit_y()).magnitude() < 1e-6);
            assert!((point.depth() - 0.02).abs() < 1e-6);
        }

        // Ids are distinct and stable across a recompute
        let mut ids: Vec<u32> = manifold.points.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);

        let mut second = empty_manifold();
        hull_vs_hull(&bottom, &top, 0.1, None, 0.0, 0, &mut second).unwrap();
        let mut second_ids: Vec<u32> = second.points.iter().map(|p| p.id).collect();
        second_ids.sort_unstable();
        assert_eq!(ids, second_ids);
        let _ = result;
    }

    /// Separated boxes within the margin produce speculative points,
    /// beyond it nothing.
    #[test]
    fn test_margin() {
        let bottom = unit_box_at(0.0);
        let near = unit_box_at(1.05);

        let mut manifold = empty_manifold();
        hull_vs_hull(&bottom, &near, 0.1, None, 0.0, 0, &mut manifold);
        assert!(!manifold.points.is_empty());
        for point in manifold.points.iter() {
            assert!((point.depth() + 0.05).abs() < 1e-6);
        }

        let far = unit_box_at(2.0);
        let mut manifold = empty_manifold();
        assert!(hull_vs_hull(&bottom, &far, 0.1, None, 0.0, 0, &mut manifold).is_none());
        assert!(manifold.points.is_empty());
    }

    /// The cached face pair is reused while the pair stays put and
    /// rejected once it drifts.
    #[test]
    fn test_cache_reuse() {
        let bottom = unit_box_at(0.0);
        let top = unit_box_at(0.98);

        let mut manifold = empty_manifold();
        let fresh = hull_vs_hull(&bottom, &top, 0.1, None, 0.0, 0, &mut manifold).unwrap();

        let entry = HullContactCacheEntry {
            center_a: bottom.center,
            center_b: top.center,
            reference_face: fresh.reference_face,
            incident_face: fresh.incident_face,
            reference_on_b: fresh.reference_on_b,
            retention: 10,
            touched: true,
        };

        let mut cached = empty_manifold();
        let reused =
            hull_vs_hull(&bottom, &top, 0.1, Some(&entry), 0.025, 0, &mut cached).unwrap();
        assert_eq!(reused.reference_face, fresh.reference_face);
        assert_eq!(cached.points.len(), manifold.points.len());

        // A stale entry pointing at a bogus face index recomputes cleanly
        let bogus = HullContactCacheEntry {
            reference_face: 900,
            ..entry
        };
        let mut recomputed = empty_manifold();
        assert!(hull_vs_hull(&bottom, &top, 0.1, Some(&bogus), 0.025, 0, &mut recomputed).is_some());
        assert_eq!(recomputed.points.len(), 4);
    }

    /// A box resting on a triangle generates contacts through the
    /// degenerate hull path.
    #[test]
    fn test_triangle_contact() {
        let box_hull = unit_box_at(0.48);
        let triangle = [
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(2.0, 0.0, -2.0),
        ];

        let mut manifold = empty_manifold();
        hull_vs_triangle(&box_hull, &triangle, 0.1, 7, &mut manifold);

        assert!(!manifold.points.is_empty());
        for point in manifold.points.iter() {
            // Normal from the box toward the triangle below
            assert!((point.normal + Vec3::unit_y()).magnitude() < 1e-6);
            assert!((point.depth() - 0.02).abs() < 1e-6);
        }
    }
}
