//! Polling and assertion helpers
//!
//! Releases may become visible to other tasks after a delay, so tests poll
//! for them with a bounded timeout instead of assuming synchronous effects.

use crate::fixtures::MockClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default bound for waiting on cross-task effects
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Poll `condition` until it holds or `timeout` elapses
///
/// Returns the final value of `condition`.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Sorted identifiers of a snapshot
pub fn client_identifiers(clients: &[Arc<MockClient>]) -> Vec<String> {
    let mut ids: Vec<String> = clients.iter().map(|c| c.identifier.clone()).collect();
    ids.sort();
    ids
}

/// Assert no client in a snapshot has been released
pub fn assert_none_released(clients: &[Arc<MockClient>]) {
    for client in clients {
        assert!(
            !client.is_released(),
            "snapshot exposed released client {:?}",
            client
        );
    }
}
