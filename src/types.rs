//! API-facing bundle model, requests and responses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::Status;

/// A trust bundle as returned to and accepted from API callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bundle {
    /// Trust domain name the bundle belongs to, e.g. `example.org`.
    pub trust_domain: String,
    /// X.509 authorities, in insertion order.
    pub x509_authorities: Vec<X509Authority>,
    /// JWT authorities.
    pub jwt_authorities: Vec<JwtAuthority>,
    /// Suggested re-fetch interval in seconds.
    pub refresh_hint: i64,
    /// Monotonically increasing revision of the bundle.
    pub sequence_number: u64,
}

/// A single X.509 authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct X509Authority {
    /// ASN.1 DER encoded certificate(s).
    pub asn1: Vec<u8>,
    /// Whether the authority's key is marked as tainted.
    pub tainted: bool,
}

/// A single JWT signing authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtAuthority {
    /// PKIX encoded public key.
    pub public_key: Vec<u8>,
    /// Key ID used to select the key when validating a token.
    pub key_id: String,
    /// Expiry of the key, in seconds since the Unix epoch.
    pub expires_at: i64,
    /// Whether the key is marked as tainted.
    pub tainted: bool,
}

/// Selects which bundle fields are populated.
///
/// An absent mask (`None`) selects every field. A present mask clears every field whose
/// selector is `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleMask {
    /// Selects `refresh_hint`.
    pub refresh_hint: bool,
    /// Selects `sequence_number`.
    pub sequence_number: bool,
    /// Selects `x509_authorities`.
    pub x509_authorities: bool,
    /// Selects `jwt_authorities`.
    pub jwt_authorities: bool,
}

impl BundleMask {
    /// A mask selecting every field.
    pub const fn all() -> Self {
        Self {
            refresh_hint: true,
            sequence_number: true,
            x509_authorities: true,
            jwt_authorities: true,
        }
    }
}

/// Deletion policy requested by `BatchDeleteFederatedBundle`.
///
/// Requests carry the raw wire value (see [`BatchDeleteFederatedBundleRequest::mode`]) so
/// values this version does not know about can be rejected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DeleteMode {
    /// Fail if registration entries still federate with the bundle.
    Restrict = 0,
    /// Remove the federation relationships, then the bundle.
    Dissociate = 1,
    /// Remove the bundle together with the entries federating with it.
    Delete = 2,
}

impl DeleteMode {
    /// Returns the wire name of the mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::Dissociate => "DISSOCIATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for DeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DeleteMode> for i32 {
    fn from(mode: DeleteMode) -> Self {
        mode as i32
    }
}

/// Request of `GetBundle`.
#[derive(Debug, Clone, Default)]
pub struct GetBundleRequest {
    /// Fields to populate in the response.
    pub output_mask: Option<BundleMask>,
}

/// Request of `AppendBundle`.
#[derive(Debug, Clone, Default)]
pub struct AppendBundleRequest {
    /// X.509 authorities to add to the server bundle.
    pub x509_authorities: Vec<X509Authority>,
    /// JWT authorities to add to the server bundle.
    pub jwt_authorities: Vec<JwtAuthority>,
    /// Fields to populate in the response.
    pub output_mask: Option<BundleMask>,
}

/// Request of `PublishJWTAuthority`.
#[derive(Debug, Clone, Default)]
pub struct PublishJwtAuthorityRequest {
    /// The authority to publish.
    pub jwt_authority: Option<JwtAuthority>,
}

/// Response of `PublishJWTAuthority`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishJwtAuthorityResponse {
    /// The JWT authorities known upstream after publishing.
    pub jwt_authorities: Vec<JwtAuthority>,
}

/// Request of `ListFederatedBundles`.
#[derive(Debug, Clone, Default)]
pub struct ListFederatedBundlesRequest {
    /// Maximum number of bundles per page; `0` disables pagination.
    pub page_size: u32,
    /// Continuation token returned by the previous page.
    pub page_token: String,
    /// Fields to populate in each bundle.
    pub output_mask: Option<BundleMask>,
}

/// Response of `ListFederatedBundles`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFederatedBundlesResponse {
    /// Federated bundles of this page.
    pub bundles: Vec<Bundle>,
    /// Token for the next page; empty when the data store returned none.
    pub next_page_token: String,
}

/// Request of `GetFederatedBundle`.
#[derive(Debug, Clone, Default)]
pub struct GetFederatedBundleRequest {
    /// Trust domain of the bundle.
    pub trust_domain: String,
    /// Fields to populate in the response.
    pub output_mask: Option<BundleMask>,
}

/// Request of `BatchCreateFederatedBundle`.
#[derive(Debug, Clone, Default)]
pub struct BatchCreateFederatedBundleRequest {
    /// Bundles to create.
    pub bundles: Vec<Bundle>,
    /// Fields to populate in each resulting bundle.
    pub output_mask: Option<BundleMask>,
}

/// Request of `BatchUpdateFederatedBundle`.
#[derive(Debug, Clone, Default)]
pub struct BatchUpdateFederatedBundleRequest {
    /// Bundles to update.
    pub bundles: Vec<Bundle>,
    /// Fields of each bundle to write; `None` writes all of them.
    pub input_mask: Option<BundleMask>,
    /// Fields to populate in each resulting bundle.
    pub output_mask: Option<BundleMask>,
}

/// Request of `BatchSetFederatedBundle`.
#[derive(Debug, Clone, Default)]
pub struct BatchSetFederatedBundleRequest {
    /// Bundles to create or replace.
    pub bundles: Vec<Bundle>,
    /// Fields to populate in each resulting bundle.
    pub output_mask: Option<BundleMask>,
}

/// Request of `BatchDeleteFederatedBundle`.
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteFederatedBundleRequest {
    /// Trust domains whose bundles are deleted.
    pub trust_domains: Vec<String>,
    /// Wire value of the [`DeleteMode`]; `0` is `RESTRICT`.
    pub mode: i32,
}

/// Outcome of one item of a create, update or set batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleResult {
    /// Outcome of the item.
    pub status: Status,
    /// The resulting bundle, present on success.
    pub bundle: Option<Bundle>,
}

impl BundleResult {
    pub(crate) fn ok(bundle: Bundle) -> Self {
        Self {
            status: Status::ok(),
            bundle: Some(bundle),
        }
    }

    pub(crate) fn failed(status: Status) -> Self {
        Self {
            status,
            bundle: None,
        }
    }
}

/// Outcome of one item of a delete batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    /// Outcome of the item.
    pub status: Status,
    /// The trust domain exactly as given in the request.
    pub trust_domain: String,
}

/// Response of `BatchCreateFederatedBundle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCreateFederatedBundleResponse {
    /// One result per requested bundle, in request order.
    pub results: Vec<BundleResult>,
}

/// Response of `BatchUpdateFederatedBundle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpdateFederatedBundleResponse {
    /// One result per requested bundle, in request order.
    pub results: Vec<BundleResult>,
}

/// Response of `BatchSetFederatedBundle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSetFederatedBundleResponse {
    /// One result per requested bundle, in request order.
    pub results: Vec<BundleResult>,
}

/// Response of `BatchDeleteFederatedBundle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteFederatedBundleResponse {
    /// One result per requested trust domain, in request order.
    pub results: Vec<DeleteResult>,
}
