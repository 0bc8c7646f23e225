//! Committed entry view shared with readers.
//!
//! The store holds an immutable [`StoreView`] behind a lock. Writers build
//! the next view from a copy of the current one and swap it in, so a reader
//! holding a view never observes a partially applied update and the lock is
//! only held for the pointer swap.
//!
//! The store never creates or drops entries on its own; all mutation goes
//! through [`EntryStore::commit`].

use crate::error::{CacheError, CacheResult};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable identifier -> client mapping at one point in time.
#[derive(Debug)]
pub struct StoreView<C> {
    entries: BTreeMap<String, Arc<C>>,
}

impl<C> StoreView<C> {
    fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the view holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the view holds an entry for `identifier`.
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Returns the client for `identifier`.
    pub fn get(&self, identifier: &str) -> Option<&Arc<C>> {
        self.entries.get(identifier)
    }

    /// Returns the stored identifiers.
    pub fn identifiers(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Returns the stored clients.
    pub fn clients(&self) -> impl Iterator<Item = &Arc<C>> {
        self.entries.values()
    }
}

/// Staged changes applied to a copy of the current view.
pub struct ViewEdit<'a, C> {
    entries: &'a mut BTreeMap<String, Arc<C>>,
}

impl<C> ViewEdit<'_, C> {
    /// Inserts an entry. Returns false if the identifier was already present,
    /// in which case the existing entry is kept.
    pub fn insert(&mut self, identifier: String, client: Arc<C>) -> bool {
        match self.entries.entry(identifier) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(client);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Removes an entry. Returns the removed client if it was present.
    pub fn remove(&mut self, identifier: &str) -> Option<Arc<C>> {
        self.entries.remove(identifier)
    }
}

/// Lock-guarded holder of the committed [`StoreView`].
#[derive(Debug)]
pub struct EntryStore<C> {
    view: RwLock<Arc<StoreView<C>>>,
}

impl<C> EntryStore<C> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            view: RwLock::new(Arc::new(StoreView::empty())),
        }
    }

    /// Returns the currently committed view.
    ///
    /// Fails with [`CacheError::StoreUnavailable`] if a writer panicked while
    /// holding the lock.
    pub fn view(&self) -> CacheResult<Arc<StoreView<C>>> {
        self.view
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| CacheError::store_unavailable("entry store lock poisoned"))
    }

    /// Applies `edit` to a copy of the current view and publishes the result
    /// atomically.
    ///
    /// Writers are expected to be serialized by the caller. A poisoned lock
    /// is recovered here: the committed view is always a complete value, and
    /// publishing a fresh one restores readers.
    pub fn commit<R>(&self, edit: impl FnOnce(&mut ViewEdit<'_, C>) -> R) -> R {
        let current = match self.view.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        };

        let mut entries = current.entries.clone();
        let result = edit(&mut ViewEdit {
            entries: &mut entries,
        });

        let next = Arc::new(StoreView { entries });
        let mut guard = self.view.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
        drop(guard);
        self.view.clear_poison();

        result
    }
}

#[cfg(test)]
impl<C: Send + Sync> EntryStore<C> {
    /// Panics a writer while it holds the lock.
    pub(crate) fn poison(&self) {
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = self.view.write().unwrap();
                    panic!("poison the store");
                })
                .join();
        });
    }
}

impl<C> Default for EntryStore<C> {
    fn default() -> Self {
        Self::new()
    }
}
