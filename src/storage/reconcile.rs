//! Mark-and-sweep diff between what memory holds and what storage holds.

use std::collections::HashSet;
use std::hash::Hash;

/// Outcome of comparing a desired key set against a stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation<K> {
    /// Wanted but not stored; these must be inserted
    pub missing: Vec<K>,
    /// Wanted and already stored
    pub present: Vec<K>,
    /// Stored but no longer wanted; these must be deleted
    pub stale: Vec<K>,
}

impl<K> Reconciliation<K> {
    /// True when storage already matches memory.
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty()
    }
}

/// Mark every stored key that is still desired, then sweep the rest.
///
/// `missing` and `present` keep the order of `desired`; `stale` keeps the
/// order of `stored`. Duplicates in `desired` are reported once.
pub fn mark_and_sweep<K>(desired: &[K], stored: &[K]) -> Reconciliation<K>
where
    K: Clone + Eq + Hash,
{
    let stored_set: HashSet<&K> = stored.iter().collect();
    let mut marked: HashSet<&K> = HashSet::new();
    let mut missing = Vec::new();
    let mut present = Vec::new();

    for key in desired {
        if !marked.insert(key) {
            continue;
        }
        if stored_set.contains(key) {
            present.push(key.clone());
        } else {
            missing.push(key.clone());
        }
    }

    let stale = stored
        .iter()
        .filter(|key| !marked.contains(key))
        .cloned()
        .collect();

    Reconciliation {
        missing,
        present,
        stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mark_and_sweep_diff() {
        let result = mark_and_sweep(&strings(&["p1", "p3", "p4"]), &strings(&["p1", "p2", "p3"]));
        assert_eq!(result.missing, strings(&["p4"]));
        assert_eq!(result.present, strings(&["p1", "p3"]));
        assert_eq!(result.stale, strings(&["p2"]));
        assert!(!result.is_clean());
    }

    #[test]
    fn test_mark_and_sweep_unchanged_is_clean() {
        let keys = strings(&["a", "b"]);
        let result = mark_and_sweep(&keys, &keys);
        assert!(result.is_clean());
        assert_eq!(result.present, keys);
    }

    #[test]
    fn test_mark_and_sweep_empty_sides() {
        let result = mark_and_sweep(&strings(&["x"]), &[]);
        assert_eq!(result.missing, strings(&["x"]));

        let result = mark_and_sweep(&[], &strings(&["x"]));
        assert_eq!(result.stale, strings(&["x"]));
    }

    #[test]
    fn test_mark_and_sweep_ignores_duplicate_desired() {
        let result = mark_and_sweep(&strings(&["a", "a"]), &[]);
        assert_eq!(result.missing, strings(&["a"]));
    }
}
