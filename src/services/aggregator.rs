use crate::models::{InteractionSnapshot, PopularityCounts};

/// Counts how many distinct users hold each item in `snapshot`.
///
/// Recomputed for every scoring pass from the same snapshot the neighbor
/// search reads, so the counts can never lag behind the sets being scored.
pub fn compute_global_counts(snapshot: &InteractionSnapshot) -> PopularityCounts {
    let mut counts = PopularityCounts::new();
    for items in snapshot.values() {
        for item in items {
            *counts.entry(*item).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKey, UserId};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn set(keys: &[i64]) -> BTreeSet<ItemKey> {
        keys.iter().copied().map(ItemKey).collect()
    }

    #[test]
    fn test_counts_distinct_users() {
        let mut snapshot = InteractionSnapshot::new();
        snapshot.insert(UserId(Uuid::new_v4()), set(&[1, 2, 3]));
        snapshot.insert(UserId(Uuid::new_v4()), set(&[2, 3, 4]));

        let counts = compute_global_counts(&snapshot);
        assert_eq!(counts.get(&ItemKey(1)), Some(&1));
        assert_eq!(counts.get(&ItemKey(2)), Some(&2));
        assert_eq!(counts.get(&ItemKey(3)), Some(&2));
        assert_eq!(counts.get(&ItemKey(4)), Some(&1));
        assert_eq!(counts.get(&ItemKey(5)), None);
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(compute_global_counts(&InteractionSnapshot::new()).is_empty());
    }

    #[test]
    fn test_users_with_empty_sets_contribute_nothing() {
        let mut snapshot = InteractionSnapshot::new();
        snapshot.insert(UserId(Uuid::new_v4()), BTreeSet::new());
        snapshot.insert(UserId(Uuid::new_v4()), set(&[9]));

        let counts = compute_global_counts(&snapshot);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&ItemKey(9)], 1);
    }
}
