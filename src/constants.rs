//! Constants shared across the bundle service.

/// Log field holding the trust domain an operation targets.
pub const TRUST_DOMAIN_ID: &str = "trust_domain_id";

/// Log field holding the deletion mode of a batch delete.
pub const DELETE_FEDERATED_BUNDLE_MODE: &str = "mode";

/// Log field holding the name of the service operation being served.
pub const METHOD: &str = "method";

/// Number of rate-limit tokens a single `PublishJWTAuthority` call consumes.
pub const PUBLISH_JWT_AUTHORITY_COST: u32 = 1;

/// Default sustained rate of JWT authority publishes per second.
pub const DEFAULT_PUBLISH_PER_SECOND: u32 = 500;

/// Default burst of JWT authority publishes.
pub const DEFAULT_PUBLISH_BURST: u32 = 500;

/// Default number of batch items processed at the same time.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 1;
