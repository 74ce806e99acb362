#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
// #![warn(rust_2018_idioms)]

//! Trust bundle management for a [SPIRE](https://github.com/spiffe/spire) server.
//!
//! [`BundleService`] serves the server's own trust bundle (get, append, JWT authority
//! publishing) and the bundles of federated trust domains (list, get, and batched create,
//! update, set and delete). Persistence and upstream publishing are pluggable through the
//! [`DataStore`](datastore::DataStore) and [`UpstreamPublisher`](publisher::UpstreamPublisher)
//! traits; [`MemoryDataStore`](datastore::MemoryDataStore) is an in-process store.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use spire_bundle::datastore::MemoryDataStore;
//! use spire_bundle::publisher::publisher_fn;
//! use spire_bundle::{
//!     BatchDeleteFederatedBundleRequest, BundleService, CallContext, DeleteMode,
//!     GetFederatedBundleRequest, TrustDomain,
//! };
//! use tonic::Code;
//!
//! # async fn some_function() -> Result<(), Box<dyn std::error::Error>> {
//! let service = BundleService::builder(TrustDomain::new("example.org")?)
//!     .with_data_store(Arc::new(MemoryDataStore::new()))
//!     .with_upstream_publisher(Arc::new(publisher_fn(|key| async move { Ok(vec![key]) })))
//!     .build()?;
//!
//! let ctx = CallContext::new();
//!
//! // the server's own bundle is not a federated bundle
//! let err = service
//!     .get_federated_bundle(
//!         &ctx,
//!         GetFederatedBundleRequest {
//!             trust_domain: "example.org".to_owned(),
//!             output_mask: None,
//!         },
//!     )
//!     .await
//!     .unwrap_err();
//! assert_eq!(err.code(), Code::InvalidArgument);
//!
//! // batch failures are reported per item
//! let resp = service
//!     .batch_delete_federated_bundle(
//!         &ctx,
//!         BatchDeleteFederatedBundleRequest {
//!             trust_domains: vec!["domain1.org".to_owned()],
//!             mode: DeleteMode::Restrict.into(),
//!         },
//!     )
//!     .await?;
//! assert_eq!(resp.results[0].status.code(), Code::NotFound);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod convert;
pub mod datastore;
pub mod delete_mode;
pub mod mask;
pub mod publisher;
pub mod rate_limit;
pub mod status;
pub mod trust_domain;
pub mod types;

mod batch;
mod service;

pub(crate) mod observability;
pub(crate) mod prelude;

pub use config::{BuildError, BundleServiceBuilder, BundleServiceConfig, PublishLimits};
pub use context::{CallContext, LogFields};
pub use service::BundleService;
pub use status::Status;
pub use trust_domain::{TrustDomain, TrustDomainError};
pub use types::{
    AppendBundleRequest, BatchCreateFederatedBundleRequest, BatchCreateFederatedBundleResponse,
    BatchDeleteFederatedBundleRequest, BatchDeleteFederatedBundleResponse,
    BatchSetFederatedBundleRequest, BatchSetFederatedBundleResponse,
    BatchUpdateFederatedBundleRequest, BatchUpdateFederatedBundleResponse, Bundle, BundleMask,
    BundleResult, DeleteMode, DeleteResult, GetBundleRequest, GetFederatedBundleRequest,
    JwtAuthority, ListFederatedBundlesRequest, ListFederatedBundlesResponse,
    PublishJwtAuthorityRequest, PublishJwtAuthorityResponse, X509Authority,
};
