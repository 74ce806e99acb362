//! Service configuration and builder.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BATCH_CONCURRENCY, DEFAULT_PUBLISH_BURST, DEFAULT_PUBLISH_PER_SECOND,
};
use crate::datastore::DataStore;
use crate::publisher::UpstreamPublisher;
use crate::rate_limit::{RateLimiter, TokenBucket};
use crate::service::BundleService;
use crate::trust_domain::{TrustDomain, TrustDomainError};

/// Rate limits of `PublishJWTAuthority`, shared by every caller of the service.
///
/// # Examples
///
/// ```
/// use spire_bundle::PublishLimits;
///
/// let limits = PublishLimits {
///     per_second: 10,
///     burst: 20,
/// };
/// assert_eq!(PublishLimits::default().burst, 500);
/// # let _ = limits;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PublishLimits {
    /// Sustained publishes per second.
    pub per_second: u32,
    /// Publishes allowed back to back before the sustained rate applies.
    pub burst: u32,
}

impl Default for PublishLimits {
    fn default() -> Self {
        Self {
            per_second: DEFAULT_PUBLISH_PER_SECOND,
            burst: DEFAULT_PUBLISH_BURST,
        }
    }
}

/// Deserializable settings of the bundle service.
///
/// Collaborators (data store, publisher) are not part of the file configuration; they are
/// supplied to the builder returned by [`BundleServiceBuilder::from_config`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BundleServiceConfig {
    /// The server's own trust domain.
    pub trust_domain: String,
    /// Publish rate limits.
    #[serde(default)]
    pub publish_limits: PublishLimits,
    /// Number of batch items processed at the same time.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

/// Errors returned by [`BundleServiceBuilder::build`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildError {
    /// The configured trust domain is not valid.
    #[error("invalid trust domain: {0}")]
    TrustDomain(#[from] TrustDomainError),

    /// No data store was configured.
    #[error("a data store is required")]
    MissingDataStore,

    /// No upstream publisher was configured.
    #[error("an upstream publisher is required")]
    MissingUpstreamPublisher,

    /// The publish burst is zero, so no publish could ever succeed.
    #[error("publish burst must be greater than zero")]
    InvalidPublishLimits,

    /// Batch concurrency is zero.
    #[error("batch concurrency must be greater than zero")]
    InvalidBatchConcurrency,
}

/// Builder for [`BundleService`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use spire_bundle::datastore::MemoryDataStore;
/// use spire_bundle::publisher::publisher_fn;
/// use spire_bundle::{BundleService, PublishLimits, TrustDomain};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = BundleService::builder(TrustDomain::new("example.org")?)
///     .with_data_store(Arc::new(MemoryDataStore::new()))
///     .with_upstream_publisher(Arc::new(publisher_fn(|key| async move { Ok(vec![key]) })))
///     .with_publish_limits(PublishLimits { per_second: 10, burst: 10 })
///     .build()?;
/// # let _ = service;
/// # Ok(())
/// # }
/// ```
pub struct BundleServiceBuilder {
    trust_domain: TrustDomain,
    data_store: Option<Arc<dyn DataStore>>,
    publisher: Option<Arc<dyn UpstreamPublisher>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    publish_limits: PublishLimits,
    batch_concurrency: usize,
}

impl BundleServiceBuilder {
    /// Creates a builder for a server in `trust_domain`.
    pub fn new(trust_domain: TrustDomain) -> Self {
        Self {
            trust_domain,
            data_store: None,
            publisher: None,
            rate_limiter: None,
            publish_limits: PublishLimits::default(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    /// Creates a builder from file settings.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::TrustDomain`] if the configured trust domain is invalid.
    pub fn from_config(config: BundleServiceConfig) -> Result<Self, BuildError> {
        let trust_domain = TrustDomain::new(&config.trust_domain)?;
        Ok(Self::new(trust_domain)
            .with_publish_limits(config.publish_limits)
            .with_batch_concurrency(config.batch_concurrency))
    }

    /// Sets the data store. Required.
    #[must_use]
    pub fn with_data_store(mut self, data_store: Arc<dyn DataStore>) -> Self {
        self.data_store = Some(data_store);
        self
    }

    /// Sets the upstream publisher. Required.
    #[must_use]
    pub fn with_upstream_publisher(mut self, publisher: Arc<dyn UpstreamPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Sets the limits of the default token bucket limiter.
    ///
    /// Ignored when a limiter is given with [`Self::with_rate_limiter`].
    #[must_use]
    pub fn with_publish_limits(mut self, limits: PublishLimits) -> Self {
        self.publish_limits = limits;
        self
    }

    /// Uses `limiter` for the publish path, e.g. to share it with other services.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Sets how many batch items are processed at the same time.
    #[must_use]
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency;
        self
    }

    /// Builds the service.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if a collaborator is missing or a limit is invalid.
    pub fn build(self) -> Result<BundleService, BuildError> {
        let data_store = self.data_store.ok_or(BuildError::MissingDataStore)?;
        let publisher = self.publisher.ok_or(BuildError::MissingUpstreamPublisher)?;

        if self.batch_concurrency == 0 {
            return Err(BuildError::InvalidBatchConcurrency);
        }

        let rate_limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None => {
                if self.publish_limits.burst == 0 {
                    return Err(BuildError::InvalidPublishLimits);
                }
                Arc::new(TokenBucket::from(self.publish_limits))
            }
        };

        Ok(BundleService::new(
            self.trust_domain,
            data_store,
            publisher,
            rate_limiter,
            self.batch_concurrency,
        ))
    }
}

impl fmt::Debug for BundleServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleServiceBuilder")
            .field("trust_domain", &self.trust_domain)
            .field("data_store", &self.data_store.is_some())
            .field("publisher", &self.publisher.is_some())
            .field("rate_limiter", &self.rate_limiter)
            .field("publish_limits", &self.publish_limits)
            .field("batch_concurrency", &self.batch_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemoryDataStore;
    use crate::publisher::publisher_fn;

    fn td() -> TrustDomain {
        TrustDomain::new("example.org").unwrap()
    }

    fn publisher() -> Arc<dyn UpstreamPublisher> {
        Arc::new(publisher_fn(|key| async move { Ok(vec![key]) }))
    }

    #[test]
    fn test_config_defaults() {
        let config: BundleServiceConfig =
            serde_json::from_str(r#"{"trust_domain": "example.org"}"#).unwrap();
        assert_eq!(config.publish_limits, PublishLimits::default());
        assert_eq!(config.batch_concurrency, DEFAULT_BATCH_CONCURRENCY);
    }

    #[test]
    fn test_config_overrides() {
        let config: BundleServiceConfig = serde_json::from_str(
            r#"{
                "trust_domain": "spiffe://example.org",
                "publish_limits": {"per_second": 5},
                "batch_concurrency": 8
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.publish_limits,
            PublishLimits {
                per_second: 5,
                burst: DEFAULT_PUBLISH_BURST
            }
        );

        let builder = BundleServiceBuilder::from_config(config).unwrap();
        assert_eq!(builder.trust_domain, td());
        assert_eq!(builder.batch_concurrency, 8);
    }

    #[test]
    fn test_from_config_rejects_bad_trust_domain() {
        let config = BundleServiceConfig {
            trust_domain: "not a domain".to_owned(),
            publish_limits: PublishLimits::default(),
            batch_concurrency: 1,
        };
        assert!(matches!(
            BundleServiceBuilder::from_config(config),
            Err(BuildError::TrustDomain(_))
        ));
    }

    #[test]
    fn test_build_requires_collaborators() {
        let err = BundleServiceBuilder::new(td()).build().unwrap_err();
        assert_eq!(err, BuildError::MissingDataStore);

        let err = BundleServiceBuilder::new(td())
            .with_data_store(Arc::new(MemoryDataStore::new()))
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MissingUpstreamPublisher);
    }

    #[test]
    fn test_build_rejects_invalid_limits() {
        let err = BundleServiceBuilder::new(td())
            .with_data_store(Arc::new(MemoryDataStore::new()))
            .with_upstream_publisher(publisher())
            .with_publish_limits(PublishLimits {
                per_second: 1,
                burst: 0,
            })
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::InvalidPublishLimits);

        let err = BundleServiceBuilder::new(td())
            .with_data_store(Arc::new(MemoryDataStore::new()))
            .with_upstream_publisher(publisher())
            .with_batch_concurrency(0)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::InvalidBatchConcurrency);
    }

    #[test]
    fn test_build() {
        let service = BundleServiceBuilder::new(td())
            .with_data_store(Arc::new(MemoryDataStore::new()))
            .with_upstream_publisher(publisher())
            .build()
            .unwrap();
        assert_eq!(service.trust_domain(), &td());
    }
}
