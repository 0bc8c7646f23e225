//! Constructed instances and their release capability.

use crate::error::ReleaseError;
use async_trait::async_trait;
use std::fmt;

/// Capability that frees the resources held by one constructed client.
///
/// The cache calls [`release`](Releaser::release) exactly once per stored
/// instance, after the instance is no longer visible to readers.
#[async_trait]
pub trait Releaser: Send + 'static {
    /// Releases the underlying resource.
    async fn release(&mut self) -> Result<(), ReleaseError>;
}

/// [`Releaser`] backed by a one-shot closure.
///
/// Calling `release` a second time is a no-op returning `Ok(())`.
pub struct FnReleaser<F> {
    release: Option<F>,
}

impl<F> FnReleaser<F>
where
    F: FnOnce() -> Result<(), ReleaseError> + Send + 'static,
{
    /// Wraps a closure that performs the release.
    pub fn new(release: F) -> Self {
        Self {
            release: Some(release),
        }
    }
}

#[async_trait]
impl<F> Releaser for FnReleaser<F>
where
    F: FnOnce() -> Result<(), ReleaseError> + Send + 'static,
{
    async fn release(&mut self) -> Result<(), ReleaseError> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

/// A usable client paired with the capability to release it.
pub struct Instance<C> {
    client: C,
    releaser: Option<Box<dyn Releaser>>,
}

impl<C> Instance<C> {
    /// Creates an instance whose resources are freed by `releaser`.
    pub fn new(client: C, releaser: impl Releaser) -> Self {
        Self {
            client,
            releaser: Some(Box::new(releaser)),
        }
    }

    /// Creates an instance whose resources are freed by a closure.
    pub fn with_release_fn<F>(client: C, release: F) -> Self
    where
        F: FnOnce() -> Result<(), ReleaseError> + Send + 'static,
    {
        Self::new(client, FnReleaser::new(release))
    }

    /// Creates an instance that holds nothing to release.
    pub fn without_releaser(client: C) -> Self {
        Self {
            client,
            releaser: None,
        }
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns true if this instance carries a releaser.
    pub fn has_releaser(&self) -> bool {
        self.releaser.is_some()
    }

    pub(crate) fn into_parts(self) -> (C, Option<Box<dyn Releaser>>) {
        (self.client, self.releaser)
    }
}

impl<C: fmt::Debug> fmt::Debug for Instance<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("client", &self.client)
            .field("has_releaser", &self.releaser.is_some())
            .finish()
    }
}
