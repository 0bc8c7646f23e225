//! The reconciling instance cache.
//!
//! [`InstanceCache`] keeps one constructed client per desired identifier.
//! Each [`update`](InstanceCache::update) diffs the desired set against the
//! stored identifiers, releases what disappeared and constructs what is new.
//!
//! # Locking
//!
//! Two guards are involved:
//!
//! - an async writer lock owning the releaser map, held for a whole update
//!   pass so passes never interleave;
//! - the [`EntryStore`] view lock, held only to swap in a committed view.
//!
//! Readers only touch the second, so `snapshot` never waits for factory or
//! releaser calls. Removals are committed before their releasers run, and
//! additions are committed in one swap after all constructions finish.
//!
//! # Cancellation
//!
//! Dropping an `update` future part way through leaves the cache consistent.
//! Releases already handed out keep running on a spawned task, and instances
//! built but not yet committed are released in the background. Passes must
//! run inside a tokio runtime for this to hold.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult, ConstructionError};
use crate::factory::InstanceFactory;
use crate::instance::{Instance, Releaser};
use crate::logger::{CacheEvent, EventKind, EventLogger, TracingLogger};
use crate::plan::ReconcilePlan;
use crate::release::ReleaseBatch;
use crate::store::EntryStore;
use crate::summary::ReconcileSummary;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Cache of constructed clients keyed by endpoint identifier.
pub struct InstanceCache<F: InstanceFactory> {
    factory: F,
    logger: Arc<dyn EventLogger>,
    config: CacheConfig,
    store: EntryStore<F::Client>,
    /// Keys mirror the committed store once a pass completes.
    releasers: Mutex<HashMap<String, Option<Box<dyn Releaser>>>>,
}

impl<F: InstanceFactory> InstanceCache<F> {
    /// Creates a cache with default configuration that logs via `tracing`.
    pub fn new(factory: F) -> Self {
        Self::from_parts(factory, Arc::new(TracingLogger), CacheConfig::default())
    }

    /// Starts building a cache with a custom logger or configuration.
    pub fn builder(factory: F) -> InstanceCacheBuilder<F> {
        InstanceCacheBuilder {
            factory,
            logger: Arc::new(TracingLogger),
            config: CacheConfig::default(),
        }
    }

    fn from_parts(factory: F, logger: Arc<dyn EventLogger>, config: CacheConfig) -> Self {
        Self {
            factory,
            logger,
            config,
            store: EntryStore::new(),
            releasers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Brings the stored entries into correspondence with `desired`.
    ///
    /// Duplicates in `desired` are ignored. Identifiers already stored keep
    /// their existing client. Construction and release failures are reported
    /// to the logger and never abort the pass.
    pub async fn update<I>(&self, desired: I) -> ReconcileSummary
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let desired: BTreeSet<String> = desired.into_iter().map(Into::into).collect();

        let mut releasers = self.releasers.lock().await;
        let plan = ReconcilePlan::compute(releasers.keys(), &desired);

        let mut summary = ReconcileSummary {
            retained: plan.retained,
            ..Default::default()
        };

        if plan.is_empty() {
            debug!(retained = plan.retained, "Instance set unchanged");
            return summary;
        }

        if !plan.to_remove.is_empty() {
            self.store.commit(|edit| {
                for identifier in &plan.to_remove {
                    edit.remove(identifier);
                }
            });

            // No await between leaving the map and entering the batch
            let mut removed = self.release_batch();
            for identifier in plan.to_remove {
                if let Some(releaser) = releasers.remove(&identifier) {
                    removed.push(identifier, releaser);
                }
            }

            for outcome in removed.run().await {
                if !outcome.released {
                    summary.release_failures.push(outcome.identifier.clone());
                }
                summary.removed.push(outcome.identifier);
            }
        }

        if !plan.to_add.is_empty() {
            let (clients, built) = self.construct_all(plan.to_add, &mut summary).await;

            if !clients.is_empty() {
                self.store.commit(|edit| {
                    for (identifier, client) in clients {
                        edit.insert(identifier, client);
                    }
                });
            }

            for (identifier, releaser) in built.disarm() {
                releasers.insert(identifier, releaser);
            }
        }

        summary.sort();
        debug!(
            added = summary.added.len(),
            removed = summary.removed.len(),
            construction_failures = summary.construction_failures.len(),
            release_failures = summary.release_failures.len(),
            retained = summary.retained,
            "Reconciled instances"
        );

        summary
    }

    /// Removes every entry, releasing each exactly once.
    pub async fn shutdown(&self) -> ReconcileSummary {
        self.update(std::iter::empty::<String>()).await
    }

    /// Returns the clients of all stored entries.
    ///
    /// Order is unspecified. An empty result is `Ok` unless
    /// [`CacheConfig::empty_is_error`] is set.
    pub fn snapshot(&self) -> CacheResult<Vec<Arc<F::Client>>> {
        let view = self.store.view()?;

        if view.is_empty() && self.config.empty_is_error {
            return Err(CacheError::Empty);
        }

        Ok(view.clients().cloned().collect())
    }

    /// Returns the identifiers of all stored entries.
    pub fn identifiers(&self) -> CacheResult<Vec<String>> {
        let view = self.store.view()?;
        Ok(view.identifiers().cloned().collect())
    }

    /// Returns the client stored for `identifier`.
    ///
    /// The point lookups below treat an unavailable store as empty. Use
    /// [`snapshot`](Self::snapshot) or [`identifiers`](Self::identifiers)
    /// to observe [`CacheError::StoreUnavailable`].
    pub fn get(&self, identifier: &str) -> Option<Arc<F::Client>> {
        self.store.view().ok()?.get(identifier).cloned()
    }

    /// Returns true if an entry is stored for `identifier`.
    pub fn contains(&self, identifier: &str) -> bool {
        self.store
            .view()
            .map(|view| view.contains(identifier))
            .unwrap_or(false)
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.store.view().map(|view| view.len()).unwrap_or(0)
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release_batch(&self) -> ReleaseBatch {
        ReleaseBatch::new(
            Arc::clone(&self.logger),
            self.config.max_concurrent_releases,
        )
    }

    /// Builds every identifier with at most `max_concurrent_constructions`
    /// calls in flight. Built releasers stay in the returned batch until the
    /// caller commits them.
    async fn construct_all(
        &self,
        identifiers: Vec<String>,
        summary: &mut ReconcileSummary,
    ) -> (Vec<(String, Arc<F::Client>)>, ReleaseBatch) {
        let limit = self.config.max_concurrent_constructions.max(1);
        let mut clients = Vec::with_capacity(identifiers.len());
        let mut built = self.release_batch();

        let mut pending = identifiers.into_iter();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit {
                match pending.next() {
                    Some(identifier) => in_flight.push(self.construct_one(identifier)),
                    None => break,
                }
            }

            let Some((identifier, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(instance) => {
                    self.logger.log(&CacheEvent::new(
                        EventKind::Added,
                        &identifier,
                        "Constructed instance",
                    ));
                    summary.added.push(identifier.clone());
                    let (client, releaser) = instance.into_parts();
                    built.push(identifier.clone(), releaser);
                    clients.push((identifier, Arc::new(client)));
                }
                Err(e) => {
                    self.logger.log(
                        &CacheEvent::new(
                            EventKind::ConstructionFailed,
                            &identifier,
                            "Failed to construct instance",
                        )
                        .with_error(&e),
                    );
                    summary.construction_failures.push(identifier);
                }
            }
        }

        (clients, built)
    }

    /// A panicking factory counts as a failed construction.
    async fn construct_one(
        &self,
        identifier: String,
    ) -> (String, Result<Instance<F::Client>, ConstructionError>) {
        let result = AssertUnwindSafe(self.factory.construct(&identifier))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ConstructionError::other("factory panicked")));
        (identifier, result)
    }
}

impl<F: InstanceFactory> fmt::Debug for InstanceCache<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCache")
            .field("instances", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`InstanceCache`].
pub struct InstanceCacheBuilder<F> {
    factory: F,
    logger: Arc<dyn EventLogger>,
    config: CacheConfig,
}

impl<F: InstanceFactory> InstanceCacheBuilder<F> {
    /// Sets the event logger.
    pub fn logger(mut self, logger: impl EventLogger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Sets an event logger shared with other components.
    pub fn shared_logger(mut self, logger: Arc<dyn EventLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the cache.
    pub fn build(self) -> CacheResult<InstanceCache<F>> {
        self.config.validate()?;
        Ok(InstanceCache::from_parts(
            self.factory,
            self.logger,
            self.config,
        ))
    }
}
