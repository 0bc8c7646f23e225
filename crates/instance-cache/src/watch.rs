//! Drives a cache from a discovery source's watch channel.
//!
//! Discovery sources publish the complete current identifier set into a
//! `tokio::sync::watch` channel. The driver applies the initial value, then
//! every change, until the sender is dropped.

use crate::cache::InstanceCache;
use crate::factory::InstanceFactory;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Spawns a task that feeds `desired` into `cache.update`.
///
/// Intermediate values published while an update is running are coalesced;
/// only the latest set is applied. The task does not tear down the cache
/// when the channel closes; call [`InstanceCache::shutdown`] for that.
///
/// Factory and releaser panics are absorbed by the pass itself. Any other
/// panic inside a pass is logged and ends the task.
pub fn spawn_watch<F>(
    cache: Arc<InstanceCache<F>>,
    mut desired: watch::Receiver<Vec<String>>,
) -> JoinHandle<()>
where
    F: InstanceFactory + 'static,
{
    tokio::spawn(async move {
        loop {
            let identifiers = desired.borrow_and_update().clone();
            let summary = match AssertUnwindSafe(cache.update(identifiers))
                .catch_unwind()
                .await
            {
                Ok(summary) => summary,
                Err(_) => {
                    error!(instances = cache.len(), "Update pass panicked, stopping watch");
                    return;
                }
            };

            if summary.changed() {
                info!(
                    added = summary.added.len(),
                    removed = summary.removed.len(),
                    instances = cache.len(),
                    "Applied discovered instance set"
                );
            }

            if desired.changed().await.is_err() {
                break;
            }
        }

        info!(instances = cache.len(), "Discovery channel closed, stopping watch");
    })
}
