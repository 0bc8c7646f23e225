//! Reconciliation scenarios for the instance cache
//!
//! Covers the full lifecycle against a mock factory:
//! - Populate, duplicate and partial/full removal passes
//! - Factory failures and their isolation
//! - Release failures and event reporting
//! - Correspondence between desired identifiers and live entries

use instance_cache::{CacheConfig, CacheError, EventKind, InstanceCache};
use instance_cache_test::{
    assert_none_released, client_identifiers, init_test_logging, wait_until, MockFactory,
    RecordingLogger, WAIT_TIMEOUT,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;

fn recorded_cache(factory: &MockFactory) -> (Arc<InstanceCache<MockFactory>>, RecordingLogger) {
    init_test_logging();
    let logger = RecordingLogger::new();
    let cache = InstanceCache::builder(factory.clone())
        .logger(logger.clone())
        .build()
        .expect("default config is valid");
    (Arc::new(cache), logger)
}

#[tokio::test]
async fn test_full_lifecycle() {
    let factory = MockFactory::new();
    let (cache, _) = recorded_cache(&factory);

    // Populate
    cache.update(["a", "b"]).await;
    assert!(!wait_until(std::time::Duration::from_millis(10), || factory.total_releases() > 0).await);
    let clients = cache.snapshot().unwrap();
    assert_eq!(client_identifiers(&clients), vec!["a", "b"]);

    // Duplicate, should be no-op
    cache.update(["a", "b"]).await;
    assert_eq!(factory.call_count(), 2);
    assert_eq!(factory.total_releases(), 0);
    assert_eq!(cache.snapshot().unwrap().len(), 2);

    // Delete b from another task
    let updater = cache.clone();
    tokio::spawn(async move { updater.update(["a"]).await });
    assert!(wait_until(WAIT_TIMEOUT, || factory.release_count("b") == 1).await);
    assert!(wait_until(WAIT_TIMEOUT, || cache.len() == 1).await);
    assert_eq!(factory.release_count("a"), 0);
    let clients = cache.snapshot().unwrap();
    assert_eq!(client_identifiers(&clients), vec!["a"]);

    // Delete a
    let updater = cache.clone();
    tokio::spawn(async move { updater.shutdown().await });
    assert!(wait_until(WAIT_TIMEOUT, || factory.release_count("a") == 1).await);
    assert!(wait_until(WAIT_TIMEOUT, || cache.is_empty()).await);
    assert_eq!(cache.snapshot().unwrap().len(), 0);

    // Every instance released exactly once
    assert_eq!(factory.release_count("b"), 1);
    assert_eq!(factory.total_releases(), 2);
}

#[tokio::test]
async fn test_bad_factory_yields_empty_snapshot() {
    let factory = MockFactory::always_failing();
    let (cache, logger) = recorded_cache(&factory);

    let summary = cache.update(["foo:1234", "bar:5678"]).await;
    assert_eq!(summary.construction_failures, vec!["bar:5678", "foo:1234"]);

    let clients = cache.snapshot().expect("empty is not an error");
    assert!(clients.is_empty());

    let failures = logger.of_kind(EventKind::ConstructionFailed);
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|e| e.error.as_deref().map_or(false, |m| m.contains("bad factory"))));
}

#[tokio::test]
async fn test_strict_empty_snapshot() {
    init_test_logging();
    let cache = InstanceCache::builder(MockFactory::always_failing())
        .config(CacheConfig::default().with_empty_is_error(true))
        .build()
        .unwrap();

    cache.update(["x", "y"]).await;
    assert!(matches!(cache.snapshot(), Err(CacheError::Empty)));
}

#[tokio::test]
async fn test_repeated_update_is_idempotent() {
    let factory = MockFactory::new();
    let (cache, logger) = recorded_cache(&factory);

    cache.update(["a", "b", "c"]).await;
    let first: Vec<u64> = cache.snapshot().unwrap().iter().map(|c| c.generation).collect();
    let calls = factory.call_count();
    logger.clear();

    let summary = cache.update(["c", "a", "b"]).await;
    assert!(summary.is_noop());
    assert_eq!(summary.retained, 3);
    assert_eq!(factory.call_count(), calls);
    assert_eq!(factory.total_releases(), 0);
    assert!(logger.events().is_empty());

    let second: Vec<u64> = cache.snapshot().unwrap().iter().map(|c| c.generation).collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_failure_is_isolated() {
    let factory = MockFactory::new();
    factory.fail_on("b");
    let (cache, logger) = recorded_cache(&factory);

    let summary = cache.update(["a", "b", "c"]).await;
    assert_eq!(summary.added, vec!["a", "c"]);
    assert_eq!(summary.construction_failures, vec!["b"]);
    assert_eq!(client_identifiers(&cache.snapshot().unwrap()), vec!["a", "c"]);
    assert_eq!(logger.identifiers_of(EventKind::ConstructionFailed), vec!["b"]);
    assert_eq!(logger.identifiers_of(EventKind::Added), vec!["a", "c"]);
}

#[tokio::test]
async fn test_failed_identifier_retried_on_next_update() {
    let factory = MockFactory::new();
    factory.fail_on("b");
    let (cache, _) = recorded_cache(&factory);

    cache.update(["a", "b"]).await;
    assert_eq!(factory.calls_for("b"), 1);
    assert!(!cache.contains("b"));

    // No internal retry between updates
    assert_eq!(factory.calls_for("b"), 1);

    factory.succeed_on("b");
    let summary = cache.update(["a", "b"]).await;
    assert_eq!(summary.added, vec!["b"]);
    assert_eq!(factory.calls_for("b"), 2);
    assert_eq!(factory.calls_for("a"), 1);
    assert!(cache.contains("b"));
}

#[tokio::test]
async fn test_dropped_failure_is_not_retried() {
    let factory = MockFactory::new();
    factory.fail_on("b");
    let (cache, _) = recorded_cache(&factory);

    cache.update(["a", "b"]).await;
    factory.succeed_on("b");
    cache.update(["a"]).await;

    assert_eq!(factory.calls_for("b"), 1);
    // Nothing was stored for b, so nothing to release
    assert_eq!(factory.release_count("b"), 0);
}

#[tokio::test]
async fn test_release_failure_still_removes_entry() {
    let factory = MockFactory::new();
    factory.fail_release_on("b");
    let (cache, logger) = recorded_cache(&factory);

    cache.update(["a", "b"]).await;
    let summary = cache.update(["a", "c"]).await;

    assert_eq!(summary.removed, vec!["b"]);
    assert_eq!(summary.release_failures, vec!["b"]);
    assert_eq!(summary.added, vec!["c"]);
    assert_eq!(factory.release_count("b"), 1);
    assert_eq!(client_identifiers(&cache.snapshot().unwrap()), vec!["a", "c"]);

    let failures = logger.of_kind(EventKind::ReleaseFailed);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].identifier, "b");
    assert_eq!(failures[0].level, tracing::Level::ERROR);
}

#[tokio::test]
async fn test_panicking_releaser_is_a_release_failure() {
    let factory = MockFactory::new();
    factory.panic_release_on("b");
    let (cache, logger) = recorded_cache(&factory);

    cache.update(["a", "b"]).await;
    let summary = cache.update(["a"]).await;

    assert_eq!(summary.removed, vec!["b"]);
    assert_eq!(summary.release_failures, vec!["b"]);
    assert_eq!(factory.release_count("b"), 1);
    assert_eq!(cache.identifiers().unwrap(), vec!["a"]);
    assert_eq!(logger.identifiers_of(EventKind::ReleaseFailed), vec!["b"]);
}

#[tokio::test]
async fn test_reentered_identifier_gets_fresh_instance() {
    let factory = MockFactory::new();
    let (cache, _) = recorded_cache(&factory);

    cache.update(["a"]).await;
    let first = cache.get("a").unwrap();
    cache.update(Vec::<String>::new()).await;
    assert!(first.is_released());

    cache.update(["a"]).await;
    let second = cache.get("a").unwrap();
    assert!(!second.is_released());
    assert!(second.generation > first.generation);
    assert_eq!(factory.trackers("a").len(), 2);
}

#[tokio::test]
async fn test_live_entries_track_desired_and_succeeded() {
    let factory = MockFactory::new();
    let (cache, _) = recorded_cache(&factory);

    let rounds: Vec<(Vec<&str>, Vec<&str>)> = vec![
        (vec!["a", "b", "c"], vec!["c"]),
        (vec!["a", "c", "d"], vec![]),
        (vec!["b", "d"], vec!["b"]),
        (vec!["b", "d", "e"], vec!["e"]),
        (vec![], vec![]),
    ];

    // Identifiers whose construction succeeded since they last entered the
    // desired set
    let mut succeeded: BTreeSet<String> = BTreeSet::new();
    let mut previous: BTreeSet<String> = BTreeSet::new();

    for (desired, failing) in rounds {
        for id in ["a", "b", "c", "d", "e"] {
            factory.succeed_on(id);
        }
        for id in &failing {
            factory.fail_on(*id);
        }

        let desired: BTreeSet<String> = desired.into_iter().map(String::from).collect();
        succeeded.retain(|id| desired.contains(id) && previous.contains(id));
        for id in &desired {
            if !failing.contains(&id.as_str()) {
                succeeded.insert(id.clone());
            }
        }

        cache.update(desired.iter().cloned()).await;

        let live: BTreeSet<String> = cache.identifiers().unwrap().into_iter().collect();
        let expected: BTreeSet<String> = desired.intersection(&succeeded).cloned().collect();
        assert_eq!(live, expected);
        assert_none_released(&cache.snapshot().unwrap());

        previous = desired;
    }

    // Nothing left, so every stored instance was released exactly once
    for id in ["a", "b", "c", "d", "e"] {
        for tracker in factory.trackers(id) {
            assert_eq!(tracker.release_count(), 1, "instance of {} not released once", id);
        }
    }
}

#[tokio::test]
async fn test_no_release_while_still_desired() {
    let factory = MockFactory::new();
    let (cache, _) = recorded_cache(&factory);

    cache.update(["a", "b"]).await;
    cache.update(["a", "b", "c"]).await;
    cache.update(["a", "c"]).await;
    cache.update(["a"]).await;

    assert_eq!(factory.release_count("a"), 0);
    assert_eq!(factory.release_count("b"), 1);
    assert_eq!(factory.release_count("c"), 1);
    assert_eq!(factory.calls_for("a"), 1);
}

#[tokio::test]
async fn test_events_for_added_and_removed() {
    let factory = MockFactory::new();
    let (cache, logger) = recorded_cache(&factory);

    cache.update(["a", "b"]).await;
    cache.update(["b"]).await;

    assert_eq!(logger.identifiers_of(EventKind::Added), vec!["a", "b"]);
    assert_eq!(logger.identifiers_of(EventKind::Removed), vec!["a"]);
    assert!(logger.of_kind(EventKind::ReleaseFailed).is_empty());
}
