//! Explicit row positions.
//!
//! Storage keeps rows as an unordered set, so every row carries its
//! zero-based position and positions are rewritten after each mutation.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// New position of one row after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement<K> {
    pub key: K,
    /// Position before the mutation; `None` for inserted rows.
    pub previous: Option<usize>,
    pub position: usize,
}

/// Pair each row with its position in list order.
pub fn assign_order<T>(rows: impl IntoIterator<Item = T>) -> Vec<(T, usize)> {
    rows.into_iter()
        .enumerate()
        .map(|(position, row)| (row, position))
        .collect()
}

/// Renumber rows after deletions and insertions.
///
/// `desired` is the final row order (surviving and inserted keys);
/// `previous` maps every pre-mutation key to its old position and
/// `deletions` names the keys that were removed. The result lists every
/// row of `desired` with positions `0..desired.len()`.
pub fn reorder_after_mutation<K>(
    previous: &HashMap<K, usize>,
    deletions: &HashSet<K>,
    desired: &[K],
) -> Vec<Placement<K>>
where
    K: Eq + Hash + Clone,
{
    desired
        .iter()
        .enumerate()
        .map(|(position, key)| {
            debug_assert!(!deletions.contains(key), "deleted row kept in final order");
            Placement {
                key: key.clone(),
                previous: previous.get(key).copied(),
                position,
            }
        })
        .collect()
}

/// True if `positions` is exactly a permutation of `0..positions.len()`.
pub fn is_contiguous(positions: &[usize]) -> bool {
    let mut seen = vec![false; positions.len()];
    for &p in positions {
        match seen.get_mut(p) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}
