//! Ages and evicts the inter-frame caches at the end of every step.

use std::collections::BTreeMap;

use crate::data::PhysicsData;
use crate::narrow_phase::manifold::CollisionFlag;

/// Resolution record of a collision that ended, kept for callers until it
/// ages out.
#[derive(Debug, Clone, Copy)]
pub struct FinishedCollision {
    /// Last reported state of the pair.
    pub flag: CollisionFlag,
    /// Steps left before eviction when untouched.
    pub retention: u8,
    /// Refreshed this step.
    pub touched: bool,
}

/// Record ended pairs, decrement retention on untouched cache entries and
/// evict the exhausted ones.
pub fn end_of_step(data: &mut PhysicsData) {
    puffin::profile_scope!("Cache manager");

    let retention = data.settings.frames_to_retain_cache;

    // Pairs that were producing manifolds last step but not this step have
    // finished colliding
    let ended: Vec<u64> = data
        .prev_manifolds
        .iter()
        .filter(|id| !data.active_manifolds.contains(*id))
        .copied()
        .collect();
    for id in ended {
        data.finished_collisions.insert(
            id,
            FinishedCollision {
                flag: CollisionFlag::NotColliding,
                retention,
                touched: true,
            },
        );
    }

    core::mem::swap(&mut data.prev_manifolds, &mut data.active_manifolds);
    data.active_manifolds.clear();

    age(&mut data.contact_impulse_cache, |entry| {
        (&mut entry.touched, &mut entry.retention)
    });
    age(&mut data.hull_contact_cache, |entry| {
        (&mut entry.touched, &mut entry.retention)
    });
    age(&mut data.finished_collisions, |entry| {
        (&mut entry.touched, &mut entry.retention)
    });
}

/// Shared aging rule: touched entries survive and reset, untouched ones
/// count down to eviction.
fn age<V>(cache: &mut BTreeMap<u64, V>, fields: impl Fn(&mut V) -> (&mut bool, &mut u8)) {
    cache.retain(|_, entry| {
        let (touched, retention) = fields(entry);
        if *touched {
            *touched = false;
            true
        } else if *retention <= 1 {
            false
        } else {
            *retention -= 1;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Untouched entries die after their retention runs out, touched ones
    /// live on.
    #[test]
    fn test_aging() {
        let mut cache: BTreeMap<u64, FinishedCollision> = BTreeMap::new();
        cache.insert(
            1,
            FinishedCollision {
                flag: CollisionFlag::NotColliding,
                retention: 3,
                touched: false,
            },
        );
        cache.insert(
            2,
            FinishedCollision {
                flag: CollisionFlag::Penetrating,
                retention: 3,
                touched: true,
            },
        );

        for _ in 0..2 {
            age(&mut cache, |entry| (&mut entry.touched, &mut entry.retention));
        }
        assert!(cache.contains_key(&1));

        age(&mut cache, |entry| (&mut entry.touched, &mut entry.retention));
        assert!(!cache.contains_key(&1));
        // Entry 2 was touched once, then aged twice more
        assert!(cache.contains_key(&2));
    }
}
