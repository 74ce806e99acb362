//! The bundle service.
//!
//! [`BundleService`] serves the server's own bundle (get, append, JWT authority publishing)
//! and the bundles of federated trust domains (list, get and the batch mutations). Every
//! operation takes a [`CallContext`] carrying the caller's log fields and cancellation.

mod federated;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tonic::Code;

use crate::config::BundleServiceBuilder;
use crate::constants::{METHOD, PUBLISH_JWT_AUTHORITY_COST, TRUST_DOMAIN_ID};
use crate::context::CallContext;
use crate::convert::{
    bundle_to_api, parse_jwt_authorities, parse_jwt_authority, parse_x509_authorities,
    public_keys_to_api,
};
use crate::datastore::{DataStore, StoredBundle};
use crate::mask::project;
use crate::publisher::UpstreamPublisher;
use crate::rate_limit::RateLimiter;
use crate::status::{make_err, make_status, Status};
use crate::trust_domain::TrustDomain;
use crate::types::{
    AppendBundleRequest, Bundle, BundleMask, GetBundleRequest, PublishJwtAuthorityRequest,
    PublishJwtAuthorityResponse,
};

/// Trust bundle management service of a SPIRE server.
///
/// Built with [`BundleService::builder`]. Cloning is cheap and clones share the data store,
/// the publisher and the publish rate limiter.
#[derive(Clone)]
pub struct BundleService {
    trust_domain: TrustDomain,
    data_store: Arc<dyn DataStore>,
    publisher: Arc<dyn UpstreamPublisher>,
    rate_limiter: Arc<dyn RateLimiter>,
    batch_concurrency: usize,
}

impl BundleService {
    /// Returns a builder for a service of a server in `trust_domain`.
    pub fn builder(trust_domain: TrustDomain) -> BundleServiceBuilder {
        BundleServiceBuilder::new(trust_domain)
    }

    pub(crate) fn new(
        trust_domain: TrustDomain,
        data_store: Arc<dyn DataStore>,
        publisher: Arc<dyn UpstreamPublisher>,
        rate_limiter: Arc<dyn RateLimiter>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            trust_domain,
            data_store,
            publisher,
            rate_limiter,
            batch_concurrency,
        }
    }

    /// Returns the server's own trust domain.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Returns the number of stored bundles, the server's own included.
    ///
    /// # Errors
    ///
    /// `Internal` if the data store fails, `Cancelled` if the call is cancelled.
    pub async fn count_bundles(&self, ctx: &CallContext) -> Result<u64, tonic::Status> {
        let ctx = ctx.with_field(METHOD, "CountBundles");

        guarded(&ctx, self.data_store.count_bundles())
            .await?
            .map_err(|e| make_err(ctx.log(), Code::Internal, "failed to count bundles", Some(&e)))
    }

    /// Returns the server's own bundle.
    ///
    /// # Errors
    ///
    /// `NotFound` if the bundle does not exist, `Internal` on data store or conversion
    /// failures.
    pub async fn get_bundle(
        &self,
        ctx: &CallContext,
        req: GetBundleRequest,
    ) -> Result<Bundle, tonic::Status> {
        let ctx = ctx
            .with_field(METHOD, "GetBundle")
            .with_field(TRUST_DOMAIN_ID, self.trust_domain.name());

        self.fetch_bundle(&ctx, &self.trust_domain, req.output_mask.as_ref())
            .await
    }

    /// Appends authorities to the server's own bundle.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if both authority lists are empty or an authority cannot be
    /// parsed; `Internal` on data store or conversion failures.
    pub async fn append_bundle(
        &self,
        ctx: &CallContext,
        req: AppendBundleRequest,
    ) -> Result<Bundle, tonic::Status> {
        let ctx = ctx
            .with_field(METHOD, "AppendBundle")
            .with_field(TRUST_DOMAIN_ID, self.trust_domain.name());

        if req.x509_authorities.is_empty() && req.jwt_authorities.is_empty() {
            return Err(make_err(
                ctx.log(),
                Code::InvalidArgument,
                "no authorities to append",
                None,
            ));
        }

        let jwt_signing_keys = parse_jwt_authorities(&req.jwt_authorities).map_err(|e| {
            make_err(
                ctx.log(),
                Code::InvalidArgument,
                "failed to convert JWT authority",
                Some(&e),
            )
        })?;

        let root_cas = parse_x509_authorities(&req.x509_authorities).map_err(|e| {
            make_err(
                ctx.log(),
                Code::InvalidArgument,
                "failed to convert X.509 authority",
                Some(&e),
            )
        })?;

        let stored = StoredBundle {
            trust_domain_id: self.trust_domain.id_string(),
            root_cas,
            jwt_signing_keys,
            ..StoredBundle::default()
        };

        let appended = guarded(&ctx, self.data_store.append_bundle(stored))
            .await?
            .map_err(|e| make_err(ctx.log(), Code::Internal, "failed to append bundle", Some(&e)))?;

        let bundle = bundle_to_api(&appended)
            .map_err(|e| make_err(ctx.log(), Code::Internal, "failed to convert bundle", Some(&e)))?;

        Ok(project(bundle, req.output_mask.as_ref()))
    }

    /// Publishes a JWT authority upstream and returns the resulting upstream key set.
    ///
    /// Rate limited process-wide; the limit is checked before anything else.
    ///
    /// # Errors
    ///
    /// The limiter's code (`ResourceExhausted`) when the rate is exceeded,
    /// `InvalidArgument` for a missing or malformed authority, `Internal` if the upstream
    /// publisher fails.
    pub async fn publish_jwt_authority(
        &self,
        ctx: &CallContext,
        req: PublishJwtAuthorityRequest,
    ) -> Result<PublishJwtAuthorityResponse, tonic::Status> {
        let ctx = ctx.with_field(METHOD, "PublishJWTAuthority");

        if let Err(e) = self.rate_limiter.acquire(PUBLISH_JWT_AUTHORITY_COST) {
            return Err(make_err(
                ctx.log(),
                e.code(),
                "rejecting request due to key publishing rate limiting",
                Some(&e),
            ));
        }

        let Some(authority) = req.jwt_authority else {
            return Err(make_err(
                ctx.log(),
                Code::InvalidArgument,
                "missing JWT authority",
                None,
            ));
        };

        let key = parse_jwt_authority(&authority).map_err(|e| {
            make_err(
                ctx.log(),
                Code::InvalidArgument,
                "invalid JWT authority",
                Some(&e),
            )
        })?;

        let published = guarded(&ctx, self.publisher.publish_jwt_key(key))
            .await?
            .map_err(|e| {
                make_err(ctx.log(), Code::Internal, "failed to publish JWT key", Some(&e))
            })?;

        Ok(PublishJwtAuthorityResponse {
            jwt_authorities: public_keys_to_api(&published),
        })
    }

    async fn fetch_bundle(
        &self,
        ctx: &CallContext,
        trust_domain: &TrustDomain,
        output_mask: Option<&BundleMask>,
    ) -> Result<Bundle, tonic::Status> {
        let stored = guarded(ctx, self.data_store.fetch_bundle(&trust_domain.id_string()))
            .await?
            .map_err(|e| make_err(ctx.log(), Code::Internal, "failed to fetch bundle", Some(&e)))?
            .ok_or_else(|| make_err(ctx.log(), Code::NotFound, "bundle not found", None))?;

        let bundle = bundle_to_api(&stored)
            .map_err(|e| make_err(ctx.log(), Code::Internal, "failed to convert bundle", Some(&e)))?;

        Ok(project(bundle, output_mask))
    }
}

impl fmt::Debug for BundleService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleService")
            .field("trust_domain", &self.trust_domain)
            .field("rate_limiter", &self.rate_limiter)
            .field("batch_concurrency", &self.batch_concurrency)
            .finish_non_exhaustive()
    }
}

/// Awaits a collaborator call unless the request is cancelled first.
async fn guarded<F: Future>(ctx: &CallContext, fut: F) -> Result<F::Output, tonic::Status> {
    guarded_item(ctx, fut).await.map_err(tonic::Status::from)
}

/// Like [`guarded`], for a single batch item.
async fn guarded_item<F: Future>(ctx: &CallContext, fut: F) -> Result<F::Output, Status> {
    ctx.run(fut)
        .await
        .ok_or_else(|| make_status(ctx.log(), Code::Cancelled, "request cancelled", None))
}
