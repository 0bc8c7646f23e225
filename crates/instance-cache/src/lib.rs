//! Reconciling cache of endpoint clients.
//!
//! A discovery source only knows the current set of endpoint identifiers;
//! a consumer such as a load balancer needs ready-to-use clients. This crate
//! sits between them:
//!
//! - [`InstanceFactory`]: builds a client and its [`Releaser`] for an identifier
//! - [`InstanceCache`]: keeps one client per desired identifier, constructing
//!   new ones and releasing vanished ones on every [`InstanceCache::update`]
//! - [`EventLogger`]: receives construction/release events ([`TracingLogger`]
//!   by default)
//! - [`spawn_watch`]: feeds the cache from a `tokio::sync::watch` channel
//!
//! # Guarantees
//!
//! 1. An entry exists iff its identifier was in the latest update and its
//!    construction succeeded
//! 2. Each stored releaser runs exactly once, after the entry has left the
//!    reader-visible store
//! 3. A construction or release failure affects only its own identifier
//! 4. [`InstanceCache::snapshot`] never waits for factory or releaser work
//! 5. Dropping an `update` future part way through does not skip a release
//!
//! # Example
//!
//! ```
//! use instance_cache::{ConstructionError, FnFactory, Instance, InstanceCache};
//!
//! # tokio_test::block_on(async {
//! let cache = InstanceCache::new(FnFactory::new(|addr: String| async move {
//!     Ok::<_, ConstructionError>(Instance::with_release_fn(addr, || Ok(())))
//! }));
//!
//! cache.update(["10.0.0.1:80", "10.0.0.2:80"]).await;
//! assert_eq!(cache.snapshot().unwrap().len(), 2);
//!
//! cache.update(["10.0.0.2:80"]).await;
//! assert_eq!(cache.identifiers().unwrap(), vec!["10.0.0.2:80"]);
//! # });
//! ```

mod cache;
mod config;
mod error;
mod factory;
mod instance;
mod logger;
mod plan;
mod release;
mod store;
mod summary;
mod watch;

pub use cache::{InstanceCache, InstanceCacheBuilder};
pub use config::CacheConfig;
pub use error::{BoxError, CacheError, CacheResult, ConstructionError, ReleaseError};
pub use factory::{FnFactory, InstanceFactory};
pub use instance::{FnReleaser, Instance, Releaser};
pub use logger::{CacheEvent, EventKind, EventLogger, NopLogger, TracingLogger};
pub use plan::ReconcilePlan;
pub use store::{EntryStore, StoreView, ViewEdit};
pub use summary::ReconcileSummary;
pub use watch::spawn_watch;
