//! Outcome of one reconciliation pass.

/// What an [`update`](crate::InstanceCache::update) call changed.
///
/// Identifier lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Identifiers whose instance was constructed and stored.
    pub added: Vec<String>,
    /// Identifiers whose entry was removed (including failed releases).
    pub removed: Vec<String>,
    /// Identifiers the factory failed for; no entry was stored.
    pub construction_failures: Vec<String>,
    /// Removed identifiers whose releaser reported failure.
    pub release_failures: Vec<String>,
    /// Entries left untouched.
    pub retained: usize,
}

impl ReconcileSummary {
    /// Returns true if the pass neither constructed nor released anything.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.construction_failures.is_empty()
    }

    /// Returns true if the set of stored entries changed.
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub(crate) fn sort(&mut self) {
        self.added.sort();
        self.removed.sort();
        self.construction_failures.sort();
        self.release_failures.sort();
    }
}
