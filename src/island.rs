//! Islands: connected components of bodies coupled by constraints.
//!
//! Members wake together and may only fall asleep together.

use slotmap::{new_key_type, SecondaryMap, SlotMap};

use crate::body::ObjectKey;
use crate::data::PhysicsData;

new_key_type! {
    /// Key into the island arena.
    pub struct IslandKey;
}

/// One connected component of constrained bodies.
#[derive(Debug, Clone, Default)]
pub struct Island {
    /// Member objects, in deterministic arena order.
    pub members: Vec<ObjectKey>,
}

/// Wake whole islands before the broad phase when any member was
/// externally activated since the last step.
pub fn propagate_wakes(data: &mut PhysicsData) {
    puffin::profile_scope!("Island wake propagation");

    let islands: Vec<IslandKey> = data.islands.keys().collect();
    for key in islands {
        let any_active = data.islands[key]
            .members
            .iter()
            .any(|member| {
                data.objects
                    .get(*member)
                    .is_some_and(|object| object.rigid_body.is_active())
            });
        if !any_active {
            continue;
        }

        for member in data.islands[key].members.clone() {
            if let Some(object) = data.objects.get_mut(member) {
                object.rigid_body.activate();
            }
        }
    }
}

/// Rebuild the islands from this step's constraint graph, then apply the
/// group sleep and wake rules.
pub fn rebuild_and_sleep(data: &mut PhysicsData) {
    puffin::profile_scope!("Islands");

    // Union-find over the dynamic bodies joined by any constraint
    let mut parents: SecondaryMap<ObjectKey, ObjectKey> = SecondaryMap::new();
    for (key, object) in data.objects.iter() {
        if !object.rigid_body.is_static() {
            parents.insert(key, key);
        }
    }

    let edges = constraint_edges(data);
    for (a, b) in edges {
        union(&mut parents, a, b);
    }

    // Group members by their root, in arena order for determinism
    let keys: Vec<ObjectKey> = parents.keys().collect();
    let mut root_of: SecondaryMap<ObjectKey, ObjectKey> = SecondaryMap::new();
    let mut set_sizes: SecondaryMap<ObjectKey, u32> = SecondaryMap::new();
    for key in keys.iter() {
        let root = find(&mut parents, *key);
        root_of.insert(*key, root);
        match set_sizes.get_mut(root) {
            Some(count) => *count += 1,
            None => {
                set_sizes.insert(root, 1);
            }
        }
    }

    let mut islands: SlotMap<IslandKey, Island> = SlotMap::with_key();
    let mut roots: SecondaryMap<ObjectKey, IslandKey> = SecondaryMap::new();
    for key in keys {
        let root = root_of[key];
        // Solitary bodies don't form islands
        if set_sizes[root] < 2 {
            continue;
        }

        let island = match roots.get(root) {
            Some(island) => *island,
            None => {
                let island = islands.insert(Island::default());
                roots.insert(root, island);
                island
            }
        };
        islands[island].members.push(key);
    }

    // Sleeping islands produce no constraints, so they would dissolve here
    // and forget who has to wake together; carry them over untouched
    for (_, island) in data.islands.iter() {
        let mut members: Vec<ObjectKey> = island
            .members
            .iter()
            .filter(|member| data.objects.contains_key(**member))
            .copied()
            .collect();
        if members.len() < 2 {
            continue;
        }
        let all_asleep = members
            .iter()
            .all(|member| !data.objects[*member].rigid_body.is_active());
        if !all_asleep {
            continue;
        }

        members.sort_unstable();
        islands.insert(Island { members });
    }

    for (_, object) in data.objects.iter_mut() {
        object.island = None;
    }
    for (key, island) in islands.iter() {
        for member in island.members.iter() {
            data.objects[*member].island = Some(key);
        }
    }

    // Group sleep rule: an island sleeps only unanimously, otherwise every
    // member stays awake
    for (_, island) in islands.iter() {
        let mut all_candidates = true;
        let mut any_active = false;
        for member in island.members.iter() {
            let object = &data.objects[*member];
            if object.rigid_body.is_active() {
                any_active = true;
                if !object.sleep_candidate {
                    all_candidates = false;
                }
            }
        }

        if !any_active {
            continue;
        }
        if all_candidates {
            for member in island.members.iter() {
                data.objects[*member].rigid_body.deactivate();
            }
        } else {
            for member in island.members.iter() {
                data.objects[*member].rigid_body.activate();
            }
        }
    }

    // Solitary candidates sleep on their own
    for (_, object) in data.objects.iter_mut() {
        if object.island.is_none() && object.sleep_candidate && object.rigid_body.is_active() {
            object.rigid_body.deactivate();
        }
        object.sleep_candidate = false;
    }

    data.islands = islands;
}

/// Edges of the constraint graph between dynamic bodies.
fn constraint_edges(data: &PhysicsData) -> Vec<(ObjectKey, ObjectKey)> {
    let dynamic = |key: ObjectKey| {
        data.objects
            .get(key)
            .is_some_and(|object| !object.rigid_body.is_static())
    };

    let mut edges = Vec::new();
    for constraint in data.contact_constraints.iter() {
        if dynamic(constraint.object_a) && dynamic(constraint.object_b) {
            edges.push((constraint.object_a, constraint.object_b));
        }
    }
    for (_, joint) in data.hinge_constraints.iter() {
        if let Some(object_b) = joint.object_b {
            if dynamic(joint.object_a) && dynamic(object_b) {
                edges.push((joint.object_a, object_b));
            }
        }
    }
    for (_, joint) in data.cone_constraints.iter() {
        if let Some(object_b) = joint.object_b {
            if dynamic(joint.object_a) && dynamic(object_b) {
                edges.push((joint.object_a, object_b));
            }
        }
    }
    for (_, joint) in data.motor_constraints.iter() {
        if let Some(object_b) = joint.object_b {
            if dynamic(joint.object_a) && dynamic(object_b) {
                edges.push((joint.object_a, object_b));
            }
        }
    }

    edges
}

/// Union-find root lookup with path compression.
fn find(parents: &mut SecondaryMap<ObjectKey, ObjectKey>, mut key: ObjectKey) -> ObjectKey {
    while parents[key] != key {
        let grandparent = parents[parents[key]];
        parents[key] = grandparent;
        key = grandparent;
    }

    key
}

/// Merge the sets of two members; idempotent for already joined pairs.
fn union(parents: &mut SecondaryMap<ObjectKey, ObjectKey>, a: ObjectKey, b: ObjectKey) {
    if !parents.contains_key(a) || !parents.contains_key(b) {
        return;
    }

    let root_a = find(parents, a);
    let root_b = find(parents, b);
    if root_a != root_b {
        // Deterministic orientation of the merge
        if root_a < root_b {
            parents[root_b] = root_a;
        } else {
            parents[root_a] = root_b;
        }
    }
}

