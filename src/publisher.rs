//! Upstream publishing of JWT signing keys.

use std::error::Error;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::datastore::StoredPublicKey;

/// Errors reported by an [`UpstreamPublisher`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PublishError {
    /// The upstream authority does not accept JWT keys.
    #[error("upstream authority does not support JWT key publishing")]
    NotSupported,

    /// The upstream authority rejected the key or could not be reached.
    #[error("upstream: {0}")]
    Upstream(#[source] Box<dyn Error + Send + Sync>),
}

impl PublishError {
    /// Wraps an arbitrary error as [`PublishError::Upstream`].
    pub fn upstream(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Upstream(err.into())
    }
}

/// Publishes JWT signing keys to the upstream authority.
#[async_trait]
pub trait UpstreamPublisher: Send + Sync {
    /// Publishes `key` and returns the full set of JWT keys known upstream afterwards.
    async fn publish_jwt_key(
        &self,
        key: StoredPublicKey,
    ) -> Result<Vec<StoredPublicKey>, PublishError>;
}

/// [`UpstreamPublisher`] backed by a closure. See [`publisher_fn`].
pub struct PublisherFn<F> {
    f: F,
}

/// Turns a closure returning a future into an [`UpstreamPublisher`].
///
/// # Examples
///
/// ```
/// use spire_bundle::publisher::{publisher_fn, UpstreamPublisher};
///
/// let publisher = publisher_fn(|key| async move { Ok(vec![key]) });
/// # let _: &dyn UpstreamPublisher = &publisher;
/// ```
pub fn publisher_fn<F, Fut>(f: F) -> PublisherFn<F>
where
    F: Fn(StoredPublicKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<StoredPublicKey>, PublishError>> + Send,
{
    PublisherFn { f }
}

#[async_trait]
impl<F, Fut> UpstreamPublisher for PublisherFn<F>
where
    F: Fn(StoredPublicKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<StoredPublicKey>, PublishError>> + Send,
{
    async fn publish_jwt_key(
        &self,
        key: StoredPublicKey,
    ) -> Result<Vec<StoredPublicKey>, PublishError> {
        (self.f)(key).await
    }
}

impl<F> fmt::Debug for PublisherFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherFn").finish_non_exhaustive()
    }
}
