//! Contact points and manifolds shared between the narrow phase and the
//! solver.

use arrayvec::ArrayVec;

use crate::material::PhysicsMaterial;
use crate::math::{Real, Vec3};

/// Most contact points a manifold gathers before reduction.
pub const MAX_MANIFOLD_POINTS: usize = 8;

/// Points a manifold is reduced to before solving.
pub const REDUCED_MANIFOLD_POINTS: usize = 4;

/// Resolution state of a collider pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionFlag {
    /// Outside the proximity band.
    NotColliding,
    /// Within the proximity band but not overlapping.
    Proximal,
    /// Overlapping.
    Penetrating,
}

/// One tracked touch point between two colliders.
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    /// Point on the surface of the first collider.
    pub position_on_a: Vec3,
    /// Point on the surface of the second collider.
    pub position_on_b: Vec3,
    /// Contact normal pointing from the first collider to the second.
    pub normal: Vec3,
    /// Feature hash that persists across frames for the same contact.
    pub id: u32,
}

impl ContactPoint {
    /// Penetration depth, negative when the surfaces are separated.
    pub fn depth(&self) -> Real {
        self.normal.dot(self.position_on_a - self.position_on_b)
    }
}

/// Up to four contact points between an ordered collider pair.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    /// Gathered contact points.
    pub points: ArrayVec<ContactPoint, MAX_MANIFOLD_POINTS>,
    /// Material of the first collider.
    pub material_a: PhysicsMaterial,
    /// Material of the second collider.
    pub material_b: PhysicsMaterial,
    /// Pair hash identifying this manifold across frames.
    pub id: u64,
    /// Resolution state.
    pub flag: CollisionFlag,
}

impl ContactManifold {
    /// Empty manifold for a pair.
    pub fn new(id: u64, material_a: PhysicsMaterial, material_b: PhysicsMaterial) -> Self {
        Self {
            points: ArrayVec::new(),
            material_a,
            material_b,
            id,
            flag: CollisionFlag::NotColliding,
        }
    }

    /// Append a contact point, dropping it when the manifold is full.
    pub fn add_contact(&mut self, normal: Vec3, on_a: Vec3, on_b: Vec3, id: u32) {
        let point = ContactPoint {
            position_on_a: on_a,
            position_on_b: on_b,
            normal,
            id,
        };

        let _ = self.points.try_push(point);
    }

    /// Swap the roles of the two colliders.
    pub fn revert(&mut self) {
        self.revert_range(0);
    }

    /// Swap the roles of the two colliders for the points added since
    /// `start`, used when a sub-query ran with its arguments flipped.
    pub fn revert_range(&mut self, start: usize) {
        for point in self.points.iter_mut().skip(start) {
            point.normal = -point.normal;
            core::mem::swap(&mut point.position_on_a, &mut point.position_on_b);
        }
    }

    /// Classify from the deepest point and the proximity band.
    pub fn update_flag(&mut self, proximity_epsilon: Real) {
        let mut deepest = -Real::MAX;
        for point in self.points.iter() {
            deepest = deepest.max(point.depth());
        }

        self.flag = if self.points.is_empty() || deepest < -proximity_epsilon {
            CollisionFlag::NotColliding
        } else if deepest > 0.0 {
            CollisionFlag::Penetrating
        } else {
            CollisionFlag::Proximal
        };
    }

    /// Reduce to four points while keeping the most stable footprint.
    ///
    /// Deterministic rule: deepest point, the point farthest from it, then
    /// the two points spanning the largest area on either side of that line.
    pub fn reduce(&mut self) {
        if self.points.len() <= REDUCED_MANIFOLD_POINTS {
            return;
        }

        let plane_normal = {
            let mut deepest = 0;
            let mut best = -Real::MAX;
            for (index, point) in self.points.iter().enumerate() {
                let depth = point.depth();
                if depth > best {
                    best = depth;
                    deepest = index;
                }
            }
            self.points[deepest].normal
        };

        let mut picked: ArrayVec<usize, REDUCED_MANIFOLD_POINTS> = ArrayVec::new();

        // Deepest point
        let mut best = -Real::MAX;
        let mut pick = 0;
        for (index, point) in self.points.iter().enumerate() {
            let depth = point.depth();
            if depth > best {
                best = depth;
                pick = index;
            }
        }
        picked.push(pick);

        // Farthest from the first
        let anchor = self.points[picked[0]].position_on_a;
        let mut best = -Real::MAX;
        let mut pick = None;
        for (index, point) in self.points.iter().enumerate() {
            if picked.contains(&index) {
                continue;
            }
            let distance = (point.position_on_a - anchor).magnitude_squared();
            if distance > best {
                best = distance;
                pick = Some(index);
            }
        }
        if let Some(pick) = pick {
            picked.push(pick);
        }

        // Largest signed area on each side of the line through the first two
        if picked.len() == 2 {
            let first = self.points[picked[0]].position_on_a;
            let second = self.points[picked[1]].position_on_a;

            let mut best_negative = (-Real::MAX, None);
            let mut best_positive = (-Real::MAX, None);
            for (index, point) in self.points.iter().enumerate() {
                if picked.contains(&index) {
                    continue;
                }

                let p = point.position_on_a;
                let area = (first - p).cross(second - p).dot(plane_normal);
                if area < 0.0 {
                    if area > best_negative.0 {
                        best_negative = (area, Some(index));
                    }
                } else if area > best_positive.0 {
                    best_positive = (area, Some(index));
                }
            }

            for (_, pick) in [best_negative, best_positive] {
                if let Some(pick) = pick {
                    picked.push(pick);
                }
            }
        }

        // Top up deterministically when a side had no candidates
        for index in 0..self.points.len() {
            if picked.is_full() {
                break;
            }
            if !picked.contains(&index) {
                picked.push(index);
            }
        }

        let mut reduced: ArrayVec<ContactPoint, MAX_MANIFOLD_POINTS> = ArrayVec::new();
        for index in picked {
            reduced.push(self.points[index]);
        }
        self.points = reduced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifold_with_grid() -> ContactManifold {
        let mut manifold =
            ContactManifold::new(7, PhysicsMaterial::iron(), PhysicsMaterial::iron());

        // 3x3 grid of face contacts, centre point deepest
        for x in -1..=1 {
            for z in -1..=1 {
                let depth = if x == 0 && z == 0 { 0.02 } else { 0.01 };
                let on_b = Vec3::new(x as Real, 0.0, z as Real);
                manifold.add_contact(Vec3::unit_y(), on_b + Vec3::unit_y() * depth, on_b, (x + 1) as u32 * 3 + (z + 1) as u32);
            }
        }

        manifold
    }

    /// Reduction keeps the deepest point and a spanning footprint.
    #[test]
    fn test_reduce() {
        let mut manifold = manifold_with_grid();
        assert_eq!(manifold.points.len(), 8);
        manifold.reduce();

        assert_eq!(manifold.points.len(), 4);
        // The deepest contact survives
        assert!(manifold.points.iter().any(|p| (p.depth() - 0.02).abs() < 1e-9));

        // The footprint spans both axes
        let xs: Vec<Real> = manifold.points.iter().map(|p| p.position_on_a.x).collect();
        let zs: Vec<Real> = manifold.points.iter().map(|p| p.position_on_a.z).collect();
        let span = |values: &[Real]| {
            values.iter().cloned().fold(-Real::MAX, Real::max)
                - values.iter().cloned().fold(Real::MAX, Real::min)
        };
        assert!(span(&xs) >= 1.0);
        assert!(span(&zs) >= 1.0);
    }

    /// Flags follow the deepest point against the proximity band.
    #[test]
    fn test_flags() {
        let mut manifold =
            ContactManifold::new(1, PhysicsMaterial::iron(), PhysicsMaterial::iron());
        manifold.update_flag(0.1);
        assert_eq!(manifold.flag, CollisionFlag::NotColliding);

        manifold.add_contact(
            Vec3::unit_y(),
            Vec3::new(0.0, -0.05, 0.0),
            Vec3::zero(),
            0,
        );
        manifold.update_flag(0.1);
        assert_eq!(manifold.flag, CollisionFlag::Proximal);

        manifold.points[0].position_on_a.y = 0.05;
        manifold.update_flag(0.1);
        assert_eq!(manifold.flag, CollisionFlag::Penetrating);
    }

    /// Reverting swaps surfaces and flips normals.
    #[test]
    fn test_revert() {
        let mut manifold = manifold_with_grid();
        let depth = manifold.points[0].depth();
        manifold.revert();

        assert_eq!(manifold.points[0].normal, -Vec3::unit_y());
        assert!((manifold.points[0].depth() - depth).abs() < 1e-9);
    }
}
