//! Diff computation between desired and current grants
//!
//! Grants are compared by linear scan, so a diff costs
//! O(|current| × |desired|). Permission collections are small (tens of
//! grants); past a few hundred, switch to a composite key of subject and
//! permission without changing the result.

use crate::grant::Grant;
use serde::{Deserialize, Serialize};

/// Grants to add and remove so `current` becomes `desired`.
///
/// There is no update: a grant whose permission changed shows up once in
/// `remove` (old level) and once in `add` (new level).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantDiff {
    /// Desired grants missing from the remote. No remote ids.
    pub add: Vec<Grant>,
    /// Current grants not desired. Each carries its remote id.
    pub remove: Vec<Grant>,
}

impl GrantDiff {
    /// Compute the diff.
    ///
    /// Duplicate desired grants collapse to one. A current grant equal to an
    /// earlier current grant is removed as well, so the remote ends up free
    /// of duplicates.
    pub fn compute(desired: &[Grant], current: &[Grant]) -> Self {
        let desired = dedup(desired);

        let remove = current
            .iter()
            .enumerate()
            .filter(|&(i, c)| !desired.contains(c) || current[..i].contains(c))
            .map(|(_, c)| c.clone())
            .collect();

        let add = desired
            .into_iter()
            .filter(|d| !current.contains(d))
            .collect();

        Self { add, remove }
    }

    /// Check if there are any grant changes
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Total number of grant mutations
    pub fn total(&self) -> usize {
        self.add.len() + self.remove.len()
    }
}

/// Grants to add and remove so `current` becomes `desired`.
pub fn diff(desired: &[Grant], current: &[Grant]) -> GrantDiff {
    GrantDiff::compute(desired, current)
}

/// Remove structurally-equal duplicates, keeping the first occurrence.
pub fn dedup(grants: &[Grant]) -> Vec<Grant> {
    let mut unique: Vec<Grant> = Vec::with_capacity(grants.len());
    for grant in grants {
        if !unique.contains(grant) {
            unique.push(grant.clone());
        }
    }
    unique
}

/// Order-independent structural equality of two grant collections.
pub fn same_grants(a: &[Grant], b: &[Grant]) -> bool {
    let a = dedup(a);
    let b = dedup(b);
    a.len() == b.len() && a.iter().all(|g| b.contains(g))
}
