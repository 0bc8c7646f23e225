//! Release of entries that left the cache.
//!
//! A [`ReleaseBatch`] owns releasers that must run exactly once. Running a
//! batch hands it to a spawned task, so the releases finish even when the
//! update pass awaiting them is dropped. A batch dropped before it runs
//! spawns its releases on the ambient runtime instead.

use crate::error::ReleaseError;
use crate::instance::Releaser;
use crate::logger::{CacheEvent, EventKind, EventLogger};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, warn};

type Pending = (String, Option<Box<dyn Releaser>>);

/// Result of one release attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReleaseOutcome {
    pub identifier: String,
    pub released: bool,
}

/// Releasers owed a single `release` call.
pub(crate) struct ReleaseBatch {
    entries: Vec<Pending>,
    logger: Arc<dyn EventLogger>,
    limit: usize,
}

impl ReleaseBatch {
    pub fn new(logger: Arc<dyn EventLogger>, limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            logger,
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, identifier: String, releaser: Option<Box<dyn Releaser>>) {
        self.entries.push((identifier, releaser));
    }

    /// Hands the entries back to the caller without releasing them.
    pub fn disarm(mut self) -> Vec<Pending> {
        std::mem::take(&mut self.entries)
    }

    /// Releases every entry and waits for the outcomes.
    ///
    /// Inside a tokio runtime the releases run on a spawned task that
    /// outlives this future.
    pub async fn run(mut self) -> Vec<ReleaseOutcome> {
        let entries = std::mem::take(&mut self.entries);
        let logger = Arc::clone(&self.logger);

        let Ok(handle) = Handle::try_current() else {
            return release_entries(entries, logger, self.limit).await;
        };

        let identifiers: Vec<String> = entries.iter().map(|(id, _)| id.clone()).collect();
        match handle.spawn(release_entries(entries, logger, self.limit)).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!(error = %e, instances = identifiers.len(), "Release task failed");
                identifiers
                    .into_iter()
                    .map(|identifier| ReleaseOutcome {
                        identifier,
                        released: false,
                    })
                    .collect()
            }
        }
    }
}

impl Drop for ReleaseBatch {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.entries);

        match Handle::try_current() {
            Ok(handle) => {
                warn!(
                    instances = entries.len(),
                    "Update pass dropped, releasing its instances in the background"
                );
                handle.spawn(release_entries(entries, Arc::clone(&self.logger), self.limit));
            }
            Err(_) => {
                let e = ReleaseError::failed("no runtime to run release on");
                for (identifier, _) in &entries {
                    self.logger.log(
                        &CacheEvent::new(
                            EventKind::ReleaseFailed,
                            identifier,
                            "Failed to release instance",
                        )
                        .with_error(&e),
                    );
                }
            }
        }
    }
}

/// Releases `entries` with at most `limit` releases in flight, logging each
/// outcome.
async fn release_entries(
    entries: Vec<Pending>,
    logger: Arc<dyn EventLogger>,
    limit: usize,
) -> Vec<ReleaseOutcome> {
    let mut outcomes = Vec::with_capacity(entries.len());
    let mut pending = entries.into_iter();
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < limit {
            match pending.next() {
                Some((identifier, releaser)) => in_flight.push(release_one(identifier, releaser)),
                None => break,
            }
        }

        let Some((identifier, result)) = in_flight.next().await else {
            break;
        };

        let released = result.is_ok();
        match result {
            Ok(()) => {
                logger.log(&CacheEvent::new(
                    EventKind::Removed,
                    &identifier,
                    "Released instance",
                ));
            }
            Err(e) => {
                logger.log(
                    &CacheEvent::new(
                        EventKind::ReleaseFailed,
                        &identifier,
                        "Failed to release instance",
                    )
                    .with_error(&e),
                );
            }
        }

        outcomes.push(ReleaseOutcome {
            identifier,
            released,
        });
    }

    outcomes
}

async fn release_one(
    identifier: String,
    releaser: Option<Box<dyn Releaser>>,
) -> (String, Result<(), ReleaseError>) {
    let result = match releaser {
        Some(mut releaser) => AssertUnwindSafe(releaser.release())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ReleaseError::failed("releaser panicked"))),
        None => Ok(()),
    };
    (identifier, result)
}
