//! Set difference between stored and desired identifiers.

use std::collections::BTreeSet;

/// Additions and removals needed to bring the store to the desired set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Desired identifiers with no stored entry.
    pub to_add: Vec<String>,
    /// Stored identifiers no longer desired.
    pub to_remove: Vec<String>,
    /// Identifiers present on both sides.
    pub retained: usize,
}

impl ReconcilePlan {
    /// Computes `desired \ current` and `current \ desired`.
    pub fn compute<'a, I>(current: I, desired: &BTreeSet<String>) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut to_remove = Vec::new();
        let mut retained = 0;
        let mut seen = BTreeSet::new();

        for identifier in current {
            if desired.contains(identifier) {
                retained += 1;
                seen.insert(identifier.as_str());
            } else {
                to_remove.push(identifier.clone());
            }
        }

        let to_add = desired
            .iter()
            .filter(|identifier| !seen.contains(identifier.as_str()))
            .cloned()
            .collect();

        Self {
            to_add,
            to_remove,
            retained,
        }
    }

    /// Returns true if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}
