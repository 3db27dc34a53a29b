//! Octree spatial index producing candidate collision pairs.

use itertools::Itertools;
use slotmap::{new_key_type, SlotMap};

use crate::collider::ColliderId;
use crate::data::PhysicsData;
use crate::math::{Aabb, Real, Vec3};

/// How far ahead of the velocity the swept bounds reach, in step times.
const PREDICTED_POSITION_MULTIPLIER: Real = 2.0;

new_key_type! {
    /// Key into the octree node arena.
    pub struct NodeKey;
}

/// Candidate overlap pair, ordered by collider key.
pub type CandidatePair = (ColliderId, ColliderId);

/// How a collider bound relates to a node bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvaluation {
    /// Disjoint, the collider can't live here.
    NoIntersect,
    /// Overlapping but sticking out, the collider straddles this node.
    PartialIntersect,
    /// The node covers the collider completely.
    FullyContained,
}

/// One cell of the octree.
#[derive(Debug, Clone)]
pub struct Node {
    /// Region this node covers.
    pub bound: Aabb,
    /// Parent node, `None` for the root.
    pub parent: Option<NodeKey>,
    /// Subdivision level, the root is 0.
    pub level: u8,
    /// Octant this node fills in its parent.
    pub octant: u8,
    /// Lazily created children, indexed by the 3-bit axis mask.
    pub children: [Option<NodeKey>; 8],
    /// Dynamic members, kept sorted for deterministic enumeration and
    /// logarithmic removal.
    pub dynamics: Vec<ColliderId>,
    /// Static members, inserted once and never migrated.
    pub statics: Vec<ColliderId>,
}

impl Node {
    fn new(bound: Aabb, parent: Option<NodeKey>, level: u8, octant: u8) -> Self {
        Self {
            bound,
            parent,
            level,
            octant,
            children: [None; 8],
            dynamics: Vec::new(),
            statics: Vec::new(),
        }
    }

    /// Classify a collider bound against this node.
    pub fn evaluate(&self, aabb: Aabb) -> NodeEvaluation {
        if !self.bound.collides_with_aabb(aabb) {
            NodeEvaluation::NoIntersect
        } else if self.bound.contains_aabb(aabb) {
            NodeEvaluation::FullyContained
        } else {
            NodeEvaluation::PartialIntersect
        }
    }

    /// Bound of a child octant; each set bit selects the upper half of the
    /// x, y or z axis.
    pub fn octant_bound(&self, octant: u8) -> Aabb {
        let center = self.bound.center();
        let pick = |bit: u8, min: Real, mid: Real, max: Real| {
            if octant & bit != 0 {
                (mid, max)
            } else {
                (min, mid)
            }
        };

        let (min_x, max_x) = pick(0b001, self.bound.min.x, center.x, self.bound.max.x);
        let (min_y, max_y) = pick(0b010, self.bound.min.y, center.y, self.bound.max.y);
        let (min_z, max_z) = pick(0b100, self.bound.min.z, center.z, self.bound.max.z);

        Aabb {
            min: Vec3::new(min_x, min_y, min_z),
            max: Vec3::new(max_x, max_y, max_z),
        }
    }

    fn is_empty(&self) -> bool {
        self.dynamics.is_empty()
            && self.statics.is_empty()
            && self.children.iter().all(Option::is_none)
    }
}

/// Fixed-depth spatial subdivision of the simulated region.
#[derive(Debug, Default)]
pub struct Octree {
    /// Node storage.
    pub nodes: SlotMap<NodeKey, Node>,
    /// Root node covering the whole region.
    pub root: Option<NodeKey>,
    /// Maximum subdivision level below the root.
    pub depth: u8,
}

impl Octree {
    /// Set the region and subdivision depth, once.
    pub fn initialise(&mut self, bound: Aabb, depth: u8) -> bool {
        if self.root.is_some() {
            log::warn!("octree already initialised");
            return false;
        }
        if depth == 0 || depth > 10 {
            log::warn!("octree depth {depth} out of range");
            return false;
        }

        self.depth = depth;
        self.root = Some(self.nodes.insert(Node::new(bound, None, 0, 0)));
        log::debug!("octree initialised with depth {depth}");

        true
    }

    /// Register a collider, descending while a single child covers it
    /// completely.
    ///
    /// Returns the node it landed at, or `None` when the bound misses the
    /// tree region entirely.
    pub fn insert(&mut self, id: ColliderId, aabb: Aabb, is_static: bool) -> Option<NodeKey> {
        puffin::profile_function!();

        let mut current = self.root?;
        if self.nodes[current].evaluate(aabb) == NodeEvaluation::NoIntersect {
            return None;
        }

        'descend: while self.nodes[current].level < self.depth {
            for octant in 0..8 {
                if self.nodes[current].octant_bound(octant).contains_aabb(aabb) {
                    current = self.child(current, octant);
                    continue 'descend;
                }
            }
            // Straddles every splitting plane combination at this level
            break;
        }

        let node = &mut self.nodes[current];
        if is_static {
            node.statics.push(id);
        } else if let Err(position) = node.dynamics.binary_search(&id) {
            node.dynamics.insert(position, id);
        }

        Some(current)
    }

    /// Unregister a collider and tear down the emptied chain of nodes.
    pub fn remove(&mut self, id: ColliderId, node_key: NodeKey, is_static: bool) {
        let Some(node) = self.nodes.get_mut(node_key) else {
            return;
        };

        if is_static {
            node.statics.retain(|other| *other != id);
        } else if let Ok(position) = node.dynamics.binary_search(&id) {
            node.dynamics.remove(position);
        }

        self.terminate(node_key);
    }

    /// Re-register a dynamic collider whose bound changed.
    pub fn reposition(
        &mut self,
        id: ColliderId,
        previous: Option<NodeKey>,
        aabb: Aabb,
    ) -> Option<NodeKey> {
        if let Some(previous) = previous {
            self.remove(id, previous, false);
        }

        self.insert(id, aabb, false)
    }

    /// Remove empty non-root nodes walking up from the given one.
    fn terminate(&mut self, node_key: NodeKey) {
        let mut current = node_key;
        while let Some(node) = self.nodes.get(current) {
            if !node.is_empty() || node.parent.is_none() {
                break;
            }

            let parent = node.parent.unwrap();
            let octant = node.octant;
            self.nodes.remove(current);
            self.nodes[parent].children[octant as usize] = None;

            current = parent;
        }
    }

    /// Existing child for an octant, creating it lazily.
    fn child(&mut self, parent: NodeKey, octant: u8) -> NodeKey {
        if let Some(child) = self.nodes[parent].children[octant as usize] {
            return child;
        }

        let bound = self.nodes[parent].octant_bound(octant);
        let level = self.nodes[parent].level + 1;
        let child = self.nodes.insert(Node::new(bound, Some(parent), level, octant));
        self.nodes[parent].children[octant as usize] = Some(child);

        child
    }
}

/// Refresh swept bounds, reposition dynamic colliders and gather candidate
/// pairs for the narrow phase.
pub fn update(data: &mut PhysicsData, dt: Real, pairs: &mut Vec<CandidatePair>) {
    puffin::profile_scope!("Broad phase");

    // Reposition every dynamic collider by its swept bounds
    let ids: Vec<ColliderId> = data.identifiers.keys().collect();
    for id in ids {
        let identifier = data.identifiers[id];
        if identifier.is_static {
            continue;
        }

        let bound = data.collider_aabb(identifier.shape);
        let velocity = data.objects[identifier.object].rigid_body.linear_velocity;
        let offset = velocity * PREDICTED_POSITION_MULTIPLIER * dt;

        let mut swept = bound;
        swept.expand_to_contain(Aabb {
            min: bound.min + offset,
            max: bound.max + offset,
        });

        let node = data.octree.reposition(id, identifier.node, swept);
        let identifier = &mut data.identifiers[id];
        identifier.swept = swept;
        identifier.node = node;
    }

    pairs.clear();
    if let Some(root) = data.octree.root {
        let mut ancestor_dynamics = Vec::new();
        let mut ancestor_statics = Vec::new();
        collect_pairs(
            data,
            root,
            &mut ancestor_dynamics,
            &mut ancestor_statics,
            pairs,
        );
    }

    // The global height field is paired outside the tree
    if let (Some(field), Some(field_id)) = (&data.height_field, data.height_field_id) {
        for (id, identifier) in data.identifiers.iter() {
            if identifier.is_static || !identifier.swept.collides_with_aabb(field.bound) {
                continue;
            }
            if data.objects[identifier.object].rigid_body.is_active() {
                pairs.push(order_pair(id, field_id));
            }
        }
    }
}

/// Depth-first walk pairing node members with each other and with every
/// ancestor's members.
fn collect_pairs(
    data: &PhysicsData,
    node_key: NodeKey,
    ancestor_dynamics: &mut Vec<ColliderId>,
    ancestor_statics: &mut Vec<ColliderId>,
    pairs: &mut Vec<CandidatePair>,
) {
    let node = &data.octree.nodes[node_key];

    for (a, b) in node.dynamics.iter().tuple_combinations() {
        try_pair(data, *a, *b, pairs);
    }
    for a in node.dynamics.iter() {
        for b in node.statics.iter() {
            try_pair(data, *a, *b, pairs);
        }
        for b in ancestor_dynamics.iter() {
            try_pair(data, *a, *b, pairs);
        }
        for b in ancestor_statics.iter() {
            try_pair(data, *a, *b, pairs);
        }
    }
    for a in node.statics.iter() {
        for b in ancestor_dynamics.iter() {
            try_pair(data, *a, *b, pairs);
        }
    }

    let dynamics_added = node.dynamics.len();
    let statics_added = node.statics.len();
    ancestor_dynamics.extend_from_slice(&node.dynamics);
    ancestor_statics.extend_from_slice(&node.statics);

    let children = node.children;
    for child in children.into_iter().flatten() {
        collect_pairs(data, child, ancestor_dynamics, ancestor_statics, pairs);
    }

    ancestor_dynamics.truncate(ancestor_dynamics.len() - dynamics_added);
    ancestor_statics.truncate(ancestor_statics.len() - statics_added);
}

/// Emit a candidate pair when it survives the cheap rejections.
fn try_pair(data: &PhysicsData, a: ColliderId, b: ColliderId, pairs: &mut Vec<CandidatePair>) {
    let identifier_a = &data.identifiers[a];
    let identifier_b = &data.identifiers[b];

    if identifier_a.is_static && identifier_b.is_static {
        return;
    }

    let object_a = &data.objects[identifier_a.object];
    let object_b = &data.objects[identifier_b.object];
    // A pair with no active side can't produce motion
    if !object_a.rigid_body.is_active() && !object_b.rigid_body.is_active() {
        return;
    }
    if object_a.is_collision_disabled(b) || object_b.is_collision_disabled(a) {
        return;
    }

    if identifier_a.swept.collides_with_aabb(identifier_b.swept) {
        pairs.push(order_pair(a, b));
    }
}

/// Normalize pair ordering so manifold ids stay stable across frames.
fn order_pair(a: ColliderId, b: ColliderId) -> CandidatePair {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_bound() -> Aabb {
        Aabb {
            min: Vec3::broadcast(-16.0),
            max: Vec3::broadcast(16.0),
        }
    }

    fn unit_box_at(position: Vec3) -> Aabb {
        Aabb {
            min: position - Vec3::broadcast(0.5),
            max: position + Vec3::broadcast(0.5),
        }
    }

    /// Small colliders sink to deep nodes, straddling ones stop early.
    #[test]
    fn test_insert_depth() {
        let mut octree = Octree::default();
        assert!(octree.initialise(world_bound(), 4));
        assert!(!octree.initialise(world_bound(), 4));

        let mut ids = slotmap::SlotMap::<ColliderId, ()>::with_key();
        let deep = ids.insert(());
        let straddling = ids.insert(());
        let outside = ids.insert(());

        let node = octree
            .insert(deep, unit_box_at(Vec3::broadcast(8.0)), false)
            .unwrap();
        assert!(octree.nodes[node].level >= 3);

        // A box over the world centre can't fit a child at any level
        let node = octree
            .insert(straddling, unit_box_at(Vec3::zero()), false)
            .unwrap();
        assert_eq!(octree.nodes[node].level, 0);

        assert!(octree
            .insert(outside, unit_box_at(Vec3::broadcast(40.0)), false)
            .is_none());
    }

    /// Emptied nodes are torn down once their last member leaves.
    #[test]
    fn test_teardown() {
        let mut octree = Octree::default();
        octree.initialise(world_bound(), 4);

        let mut ids = slotmap::SlotMap::<ColliderId, ()>::with_key();
        let id = ids.insert(());

        let node = octree
            .insert(id, unit_box_at(Vec3::broadcast(8.0)), false)
            .unwrap();
        assert!(octree.nodes.len() > 1);

        octree.remove(id, node, false);
        assert_eq!(octree.nodes.len(), 1);
    }
}
