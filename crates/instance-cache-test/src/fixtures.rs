//! Mock collaborators for instance cache tests
//!
//! Provides a scriptable factory whose instances carry observable releasers,
//! plus a gate for holding constructions or releases in flight.

use async_trait::async_trait;
use instance_cache::{ConstructionError, Instance, InstanceFactory, ReleaseError, Releaser};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Hold point that blocks callers until opened
#[derive(Clone)]
pub struct Gate {
    inner: Arc<GateState>,
}

struct GateState {
    open: watch::Sender<bool>,
    waiting: AtomicUsize,
    passed: AtomicUsize,
}

impl Gate {
    /// Create a gate that blocks until [`Gate::open`] is called
    pub fn closed() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            inner: Arc::new(GateState {
                open,
                waiting: AtomicUsize::new(0),
                passed: AtomicUsize::new(0),
            }),
        }
    }

    /// Release every current and future caller
    pub fn open(&self) {
        self.inner.open.send_replace(true);
    }

    /// Number of callers currently blocked
    pub fn waiting(&self) -> usize {
        self.inner.waiting.load(Ordering::SeqCst)
    }

    /// Number of callers that went through
    pub fn passed(&self) -> usize {
        self.inner.passed.load(Ordering::SeqCst)
    }

    /// Wait until the gate is open
    ///
    /// A caller dropped while blocked stops counting as waiting.
    pub async fn pass(&self) {
        let mut open = self.inner.open.subscribe();
        let waiting = Waiting::enter(&self.inner.waiting);
        let _ = open.wait_for(|open| *open).await;
        drop(waiting);
        self.inner.passed.fetch_add(1, Ordering::SeqCst);
    }
}

struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Observes release calls for one constructed instance
#[derive(Clone, Default)]
pub struct ReleaseTracker {
    calls: Arc<AtomicUsize>,
}

impl ReleaseTracker {
    /// Number of times the releaser ran
    pub fn release_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// True once the releaser has run
    pub fn is_released(&self) -> bool {
        self.release_count() > 0
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Releaser that reports every call to its [`ReleaseTracker`]
pub struct TrackedReleaser {
    tracker: ReleaseTracker,
    fail: bool,
    panic: bool,
    gate: Option<Gate>,
}

impl TrackedReleaser {
    /// Create a releaser that succeeds
    pub fn new(tracker: ReleaseTracker) -> Self {
        Self {
            tracker,
            fail: false,
            panic: false,
            gate: None,
        }
    }

    /// Make the release report failure (the call is still recorded)
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Make the release panic after recording the call
    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    /// Hold the release until `gate` opens
    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Releaser for TrackedReleaser {
    async fn release(&mut self) -> Result<(), ReleaseError> {
        self.tracker.record();

        if let Some(gate) = &self.gate {
            gate.pass().await;
        }

        if self.panic {
            panic!("mock releaser panicked");
        }
        if self.fail {
            Err(ReleaseError::failed("mock release failure"))
        } else {
            Ok(())
        }
    }
}

/// Client handed out by [`MockFactory`]
#[derive(Clone)]
pub struct MockClient {
    /// Identifier the client was built for
    pub identifier: String,
    /// Construction sequence number, unique per factory
    pub generation: u64,
    tracker: ReleaseTracker,
}

impl MockClient {
    /// True once this client's releaser has run
    pub fn is_released(&self) -> bool {
        self.tracker.is_released()
    }
}

impl std::fmt::Debug for MockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClient")
            .field("identifier", &self.identifier)
            .field("generation", &self.generation)
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Default)]
struct FactoryState {
    fail_all: bool,
    failing: HashSet<String>,
    failing_releases: HashSet<String>,
    panicking: HashSet<String>,
    panicking_releases: HashSet<String>,
    held: HashMap<String, Gate>,
    calls: Vec<String>,
    trackers: HashMap<String, Vec<ReleaseTracker>>,
    generation: u64,
    delay: Option<Duration>,
    construct_gate: Option<Gate>,
    release_gate: Option<Gate>,
}

/// Scriptable [`InstanceFactory`]
///
/// Clones share state, so a test keeps one handle while the cache owns
/// another.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockFactory {
    /// Create a factory that succeeds for every identifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory that fails for every identifier
    pub fn always_failing() -> Self {
        let factory = Self::new();
        factory.state.lock().fail_all = true;
        factory
    }

    /// Fail constructions for `identifier`
    pub fn fail_on(&self, identifier: impl Into<String>) -> &Self {
        self.state.lock().failing.insert(identifier.into());
        self
    }

    /// Stop failing constructions for `identifier`
    pub fn succeed_on(&self, identifier: &str) -> &Self {
        self.state.lock().failing.remove(identifier);
        self
    }

    /// Make releasers of future instances for `identifier` report failure
    pub fn fail_release_on(&self, identifier: impl Into<String>) -> &Self {
        self.state.lock().failing_releases.insert(identifier.into());
        self
    }

    /// Panic inside constructions for `identifier`
    pub fn panic_on(&self, identifier: impl Into<String>) -> &Self {
        self.state.lock().panicking.insert(identifier.into());
        self
    }

    /// Make releasers of future instances for `identifier` panic
    pub fn panic_release_on(&self, identifier: impl Into<String>) -> &Self {
        self.state.lock().panicking_releases.insert(identifier.into());
        self
    }

    /// Hold constructions for `identifier` until `gate` opens
    pub fn hold_construction(&self, identifier: impl Into<String>, gate: Gate) -> &Self {
        self.state.lock().held.insert(identifier.into(), gate);
        self
    }

    /// Sleep this long in every construction
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().delay = Some(delay);
        self
    }

    /// Hold every construction until `gate` opens
    pub fn with_construct_gate(self, gate: Gate) -> Self {
        self.state.lock().construct_gate = Some(gate);
        self
    }

    /// Hold every release of future instances until `gate` opens
    pub fn with_release_gate(self, gate: Gate) -> Self {
        self.state.lock().release_gate = Some(gate);
        self
    }

    /// Identifiers passed to `construct`, in call order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Total number of `construct` calls
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Number of `construct` calls for `identifier`
    pub fn calls_for(&self, identifier: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == identifier)
            .count()
    }

    /// Probes of every instance successfully built for `identifier`
    pub fn trackers(&self, identifier: &str) -> Vec<ReleaseTracker> {
        self.state
            .lock()
            .trackers
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }

    /// Release calls across all instances built for `identifier`
    pub fn release_count(&self, identifier: &str) -> usize {
        self.trackers(identifier)
            .iter()
            .map(ReleaseTracker::release_count)
            .sum()
    }

    /// Release calls across all instances
    pub fn total_releases(&self) -> usize {
        self.state
            .lock()
            .trackers
            .values()
            .flatten()
            .map(ReleaseTracker::release_count)
            .sum()
    }
}

#[async_trait]
impl InstanceFactory for MockFactory {
    type Client = MockClient;

    async fn construct(&self, identifier: &str) -> Result<Instance<MockClient>, ConstructionError> {
        let (delay, gate, panics) = {
            let mut state = self.state.lock();
            state.calls.push(identifier.to_string());
            let gate = state
                .held
                .get(identifier)
                .or(state.construct_gate.as_ref())
                .cloned();
            (state.delay, gate, state.panicking.contains(identifier))
        };

        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if panics {
            panic!("mock factory panicked for {}", identifier);
        }

        let mut state = self.state.lock();
        if state.fail_all || state.failing.contains(identifier) {
            return Err(ConstructionError::connect(
                identifier,
                io::Error::new(io::ErrorKind::ConnectionRefused, "bad factory"),
            ));
        }

        state.generation += 1;
        let tracker = ReleaseTracker::default();
        state
            .trackers
            .entry(identifier.to_string())
            .or_default()
            .push(tracker.clone());

        let mut releaser = TrackedReleaser::new(tracker.clone());
        if state.failing_releases.contains(identifier) {
            releaser = releaser.failing();
        }
        if state.panicking_releases.contains(identifier) {
            releaser = releaser.panicking();
        }
        if let Some(gate) = &state.release_gate {
            releaser = releaser.gated(gate.clone());
        }

        let client = MockClient {
            identifier: identifier.to_string(),
            generation: state.generation,
            tracker,
        };

        Ok(Instance::new(client, releaser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_factory_records_calls() {
        let factory = MockFactory::new();
        factory.fail_on("bad");

        assert!(factory.construct("good").await.is_ok());
        assert!(factory.construct("bad").await.is_err());
        assert_eq!(factory.calls(), vec!["good", "bad"]);
        assert_eq!(factory.calls_for("bad"), 1);
        assert_eq!(factory.trackers("good").len(), 1);
        assert!(factory.trackers("bad").is_empty());
    }

    #[tokio::test]
    async fn test_generations_increase() {
        let factory = MockFactory::new();
        let a = factory.construct("a").await.unwrap();
        let b = factory.construct("b").await.unwrap();
        assert!(b.client().generation > a.client().generation);
    }

    #[tokio::test]
    async fn test_tracked_releaser_counts_failures() {
        let tracker = ReleaseTracker::default();
        let mut releaser = TrackedReleaser::new(tracker.clone()).failing();

        assert!(releaser.release().await.is_err());
        assert_eq!(tracker.release_count(), 1);
    }

    #[tokio::test]
    async fn test_held_identifier_waits_for_its_gate() {
        let gate = Gate::closed();
        let factory = MockFactory::new();
        factory.hold_construction("slow", gate.clone());

        assert!(factory.construct("fast").await.is_ok());

        let held = factory.clone();
        let handle = tokio::spawn(async move { held.construct("slow").await.is_ok() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.waiting(), 1);

        gate.open();
        assert!(handle.await.unwrap());
        assert_eq!(factory.calls(), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn test_gate_blocks_until_open() {
        let gate = Gate::closed();
        let waiter = gate.clone();
        let handle = tokio::spawn(async move { waiter.pass().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.waiting(), 1);
        assert!(!handle.is_finished());

        gate.open();
        handle.await.unwrap();
        assert_eq!(gate.passed(), 1);
        assert_eq!(gate.waiting(), 0);
    }
}
