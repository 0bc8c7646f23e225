//! Factory trait for turning identifiers into instances.

use crate::error::ConstructionError;
use crate::instance::Instance;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Builds a usable client for an endpoint identifier.
///
/// Implementations must tolerate being called again for an identifier whose
/// previous construction failed; the cache retries only on the next
/// [`update`](crate::InstanceCache::update) that still lists it.
#[async_trait]
pub trait InstanceFactory: Send + Sync {
    /// The client type handed out by the cache.
    type Client: Send + Sync + 'static;

    /// Constructs a client and its releaser for `identifier`.
    async fn construct(&self, identifier: &str) -> Result<Instance<Self::Client>, ConstructionError>;
}

#[async_trait]
impl<T> InstanceFactory for Arc<T>
where
    T: InstanceFactory + ?Sized,
{
    type Client = T::Client;

    async fn construct(&self, identifier: &str) -> Result<Instance<Self::Client>, ConstructionError> {
        (**self).construct(identifier).await
    }
}

/// [`InstanceFactory`] backed by an async closure.
///
/// # Example
///
/// ```
/// use instance_cache::{ConstructionError, FnFactory, Instance};
///
/// let factory = FnFactory::new(|identifier: String| async move {
///     Ok::<_, ConstructionError>(Instance::without_releaser(identifier.len()))
/// });
/// # let _ = factory;
/// ```
pub struct FnFactory<F> {
    construct: F,
}

impl<F> FnFactory<F> {
    /// Wraps a closure returning a construction future.
    pub fn new(construct: F) -> Self {
        Self { construct }
    }
}

#[async_trait]
impl<F, Fut, C> InstanceFactory for FnFactory<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Instance<C>, ConstructionError>> + Send,
    C: Send + Sync + 'static,
{
    type Client = C;

    async fn construct(&self, identifier: &str) -> Result<Instance<C>, ConstructionError> {
        (self.construct)(identifier.to_owned()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_factory() {
        let factory = FnFactory::new(|identifier: String| async move {
            if identifier.contains(':') {
                Ok(Instance::without_releaser(identifier))
            } else {
                Err(ConstructionError::invalid_identifier(identifier, "missing port"))
            }
        });

        let instance = factory.construct("10.0.0.1:80").await.unwrap();
        assert_eq!(instance.client(), "10.0.0.1:80");
        assert!(factory.construct("10.0.0.1").await.is_err());
    }

    #[tokio::test]
    async fn test_arc_factory_delegates() {
        let factory = Arc::new(FnFactory::new(|identifier: String| async move {
            Ok::<_, ConstructionError>(Instance::without_releaser(identifier.len()))
        }));

        let instance = factory.construct("abcd").await.unwrap();
        assert_eq!(*instance.client(), 4);
    }
}
