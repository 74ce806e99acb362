//! Data store boundary.
//!
//! The bundle service never owns bundle records; it drives a [`DataStore`] and translates
//! its outcomes. [`MemoryDataStore`] is an in-process implementation with the same
//! observable semantics as a durable store.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tonic::Code;

mod memory;

pub use memory::MemoryDataStore;

/// A bundle as persisted by the data store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredBundle {
    /// SPIFFE ID of the trust domain, e.g. `spiffe://example.org`.
    pub trust_domain_id: String,
    /// Root CA certificates, in insertion order.
    pub root_cas: Vec<StoredCertificate>,
    /// JWT signing keys.
    pub jwt_signing_keys: Vec<StoredPublicKey>,
    /// Suggested re-fetch interval in seconds.
    pub refresh_hint: i64,
    /// Revision of the bundle.
    pub sequence_number: u64,
}

/// A root CA certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCertificate {
    /// DER encoded certificate.
    pub der_bytes: Vec<u8>,
    /// Whether the certificate's key is tainted.
    pub tainted_key: bool,
}

/// A JWT signing public key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredPublicKey {
    /// PKIX encoded public key.
    pub pkix_bytes: Vec<u8>,
    /// Key ID.
    pub kid: String,
    /// Expiry, in seconds since the Unix epoch.
    pub not_after: i64,
    /// Whether the key is tainted.
    pub tainted_key: bool,
}

/// Fields written by [`DataStore::update_bundle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredBundleMask {
    /// Write `root_cas`.
    pub root_cas: bool,
    /// Write `jwt_signing_keys`.
    pub jwt_signing_keys: bool,
    /// Write `refresh_hint`.
    pub refresh_hint: bool,
    /// Write `sequence_number`.
    pub sequence_number: bool,
}

/// Deletion policy applied by [`DataStore::delete_bundle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteBundleMode {
    /// Refuse to delete while registration entries federate with the bundle.
    Restrict,
    /// Remove the federation relationships and delete the bundle.
    Dissociate,
    /// Delete the bundle and the registration entries federating with it.
    Delete,
}

impl DeleteBundleMode {
    /// Returns a stable name for the mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::Dissociate => "DISSOCIATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for DeleteBundleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page selection for [`DataStore::list_bundles`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Maximum number of bundles returned.
    pub page_size: u32,
    /// Opaque continuation token; empty for the first page.
    pub token: String,
}

/// Response of [`DataStore::list_bundles`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBundlesResponse {
    /// Bundles of the page.
    pub bundles: Vec<StoredBundle>,
    /// Pagination state for the next page, when the request was paginated.
    pub pagination: Option<Pagination>,
}

/// Errors reported by a [`DataStore`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DataStoreError {
    /// No bundle exists for the trust domain.
    #[error("bundle not found")]
    NotFound,

    /// A bundle already exists for the trust domain.
    #[error("bundle already exists")]
    AlreadyExists,

    /// The operation conflicts with the current state, e.g. a restricted delete of a
    /// bundle that registration entries still federate with.
    #[error("{0}")]
    FailedPrecondition(String),

    /// Any other failure of the backing store.
    #[error("datastore error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DataStoreError {
    /// Returns the status code describing this error.
    pub fn code(&self) -> Code {
        match self {
            Self::NotFound => Code::NotFound,
            Self::AlreadyExists => Code::AlreadyExists,
            Self::FailedPrecondition(_) => Code::FailedPrecondition,
            Self::Internal(_) => Code::Internal,
        }
    }

    /// Wraps an arbitrary error as [`DataStoreError::Internal`].
    pub fn internal(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Internal(err.into())
    }
}

/// Persistence of trust bundles.
///
/// Implementations own per-trust-domain atomicity: concurrent calls for the same trust
/// domain must not interleave partially.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Returns the bundle stored under `trust_domain_id`, or `None` if there is none.
    async fn fetch_bundle(
        &self,
        trust_domain_id: &str,
    ) -> Result<Option<StoredBundle>, DataStoreError>;

    /// Lists bundles ordered by trust domain id. `None` returns every bundle.
    async fn list_bundles(
        &self,
        pagination: Option<Pagination>,
    ) -> Result<ListBundlesResponse, DataStoreError>;

    /// Returns the number of stored bundles.
    async fn count_bundles(&self) -> Result<u64, DataStoreError>;

    /// Stores a new bundle. Fails with [`DataStoreError::AlreadyExists`] on conflict.
    async fn create_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError>;

    /// Overwrites the fields selected by `input_mask` (all when `None`) of an existing
    /// bundle. Fails with [`DataStoreError::NotFound`] if there is none.
    async fn update_bundle(
        &self,
        bundle: StoredBundle,
        input_mask: Option<StoredBundleMask>,
    ) -> Result<StoredBundle, DataStoreError>;

    /// Creates or replaces a bundle.
    async fn set_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError>;

    /// Merges the authorities of `bundle` into the stored one, creating it if needed.
    async fn append_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError>;

    /// Deletes the bundle stored under `trust_domain_id` according to `mode`.
    async fn delete_bundle(
        &self,
        trust_domain_id: &str,
        mode: DeleteBundleMode,
    ) -> Result<(), DataStoreError>;
}
