//! Operations on the bundles of federated trust domains.
//!
//! None of them may target the server's own trust domain; the guard runs before any data
//! store call.

use tonic::Code;

use super::{guarded, guarded_item, BundleService};
use crate::batch::run_batch;
use crate::constants::{DELETE_FEDERATED_BUNDLE_MODE, METHOD, TRUST_DOMAIN_ID};
use crate::context::CallContext;
use crate::convert::{api_to_bundle, bundle_to_api, mask_to_stored};
use crate::datastore::{DataStoreError, DeleteBundleMode, Pagination, StoredBundle};
use crate::delete_mode::parse_delete_mode;
use crate::mask::project;
use crate::prelude::{debug, info};
use crate::status::{make_err, make_status, Status};
use crate::trust_domain::TrustDomain;
use crate::types::{
    BatchCreateFederatedBundleRequest, BatchCreateFederatedBundleResponse,
    BatchDeleteFederatedBundleRequest, BatchDeleteFederatedBundleResponse,
    BatchSetFederatedBundleRequest, BatchSetFederatedBundleResponse,
    BatchUpdateFederatedBundleRequest, BatchUpdateFederatedBundleResponse, Bundle, BundleMask,
    BundleResult, DeleteResult, GetFederatedBundleRequest, ListFederatedBundlesRequest,
    ListFederatedBundlesResponse,
};

impl BundleService {
    /// Lists the bundles of federated trust domains.
    ///
    /// Pagination applies when `page_size` is non-zero. The server's own bundle is never
    /// listed, so a page may hold fewer bundles than requested.
    ///
    /// # Errors
    ///
    /// `Internal` on data store failures or if a stored bundle cannot be converted.
    pub async fn list_federated_bundles(
        &self,
        ctx: &CallContext,
        req: ListFederatedBundlesRequest,
    ) -> Result<ListFederatedBundlesResponse, tonic::Status> {
        let ctx = ctx.with_field(METHOD, "ListFederatedBundles");

        let pagination = (req.page_size > 0).then(|| Pagination {
            page_size: req.page_size,
            token: req.page_token.clone(),
        });

        let listed = guarded(&ctx, self.data_store.list_bundles(pagination))
            .await?
            .map_err(|e| make_err(ctx.log(), Code::Internal, "failed to list bundles", Some(&e)))?;

        let mut resp = ListFederatedBundlesResponse::default();
        if let Some(pagination) = listed.pagination {
            resp.next_page_token = pagination.token;
        }

        for stored in listed.bundles {
            let log = ctx.log().with_field(TRUST_DOMAIN_ID, &stored.trust_domain_id);

            let trust_domain = TrustDomain::new(&stored.trust_domain_id).map_err(|e| {
                make_err(
                    &log,
                    Code::Internal,
                    "bundle has an invalid trust domain ID",
                    Some(&e),
                )
            })?;
            if trust_domain == self.trust_domain {
                continue;
            }

            let bundle = bundle_to_api(&stored)
                .map_err(|e| make_err(&log, Code::Internal, "failed to convert bundle", Some(&e)))?;
            resp.bundles.push(project(bundle, req.output_mask.as_ref()));
        }

        Ok(resp)
    }

    /// Returns the bundle of a federated trust domain.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an invalid trust domain or the server's own, `NotFound` if no
    /// bundle exists, `Internal` on data store or conversion failures.
    pub async fn get_federated_bundle(
        &self,
        ctx: &CallContext,
        req: GetFederatedBundleRequest,
    ) -> Result<Bundle, tonic::Status> {
        let ctx = ctx
            .with_field(METHOD, "GetFederatedBundle")
            .with_field(TRUST_DOMAIN_ID, &req.trust_domain);

        let trust_domain = self
            .federated_trust_domain(
                &ctx,
                &req.trust_domain,
                "getting a federated bundle for the server's own trust domain is not allowed",
            )
            .map_err(tonic::Status::from)?;

        self.fetch_bundle(&ctx, &trust_domain, req.output_mask.as_ref())
            .await
    }

    /// Creates federated bundles, one result per input bundle in input order.
    ///
    /// # Errors
    ///
    /// Item failures are reported in the results; the call itself only fails with
    /// `Cancelled`. Items committed before the cancellation are not reported.
    pub async fn batch_create_federated_bundle(
        &self,
        ctx: &CallContext,
        req: BatchCreateFederatedBundleRequest,
    ) -> Result<BatchCreateFederatedBundleResponse, tonic::Status> {
        let ctx = &ctx.with_field(METHOD, "BatchCreateFederatedBundle");
        let mask = req.output_mask.as_ref();

        let results = run_batch(ctx, req.bundles, self.batch_concurrency, |bundle| async move {
            bundle_result(self.create_federated_bundle(ctx, bundle, mask).await)
        })
        .await?;

        Ok(BatchCreateFederatedBundleResponse { results })
    }

    /// Updates existing federated bundles, writing only the fields selected by the input
    /// mask (all fields when absent).
    ///
    /// # Errors
    ///
    /// Item failures are reported in the results; the call itself only fails with
    /// `Cancelled`. Items committed before the cancellation are not reported.
    pub async fn batch_update_federated_bundle(
        &self,
        ctx: &CallContext,
        req: BatchUpdateFederatedBundleRequest,
    ) -> Result<BatchUpdateFederatedBundleResponse, tonic::Status> {
        let ctx = &ctx.with_field(METHOD, "BatchUpdateFederatedBundle");
        let input_mask = req.input_mask.as_ref();
        let output_mask = req.output_mask.as_ref();

        let results = run_batch(ctx, req.bundles, self.batch_concurrency, |bundle| async move {
            bundle_result(
                self.update_federated_bundle(ctx, bundle, input_mask, output_mask)
                    .await,
            )
        })
        .await?;

        Ok(BatchUpdateFederatedBundleResponse { results })
    }

    /// Creates or replaces federated bundles.
    ///
    /// # Errors
    ///
    /// Item failures are reported in the results; the call itself only fails with
    /// `Cancelled`. Items committed before the cancellation are not reported.
    pub async fn batch_set_federated_bundle(
        &self,
        ctx: &CallContext,
        req: BatchSetFederatedBundleRequest,
    ) -> Result<BatchSetFederatedBundleResponse, tonic::Status> {
        let ctx = &ctx.with_field(METHOD, "BatchSetFederatedBundle");
        let mask = req.output_mask.as_ref();

        let results = run_batch(ctx, req.bundles, self.batch_concurrency, |bundle| async move {
            bundle_result(self.set_federated_bundle(ctx, bundle, mask).await)
        })
        .await?;

        Ok(BatchSetFederatedBundleResponse { results })
    }

    /// Deletes federated bundles under the requested mode.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown mode, before any bundle is touched. Item failures
    /// are reported in the results; storage failures keep the data store's code.
    /// `Cancelled` when the call is cancelled; deletes committed before that are not
    /// reported.
    pub async fn batch_delete_federated_bundle(
        &self,
        ctx: &CallContext,
        req: BatchDeleteFederatedBundleRequest,
    ) -> Result<BatchDeleteFederatedBundleResponse, tonic::Status> {
        let ctx = ctx.with_field(METHOD, "BatchDeleteFederatedBundle");

        let mode = parse_delete_mode(req.mode).map_err(|e| {
            make_err(
                ctx.log(),
                Code::InvalidArgument,
                "failed to parse deletion mode",
                Some(&e),
            )
        })?;
        let ctx = &ctx.with_field(DELETE_FEDERATED_BUNDLE_MODE, mode);

        let results = run_batch(
            ctx,
            req.trust_domains,
            self.batch_concurrency,
            |trust_domain| async move { self.delete_federated_bundle(ctx, trust_domain, mode).await },
        )
        .await?;

        Ok(BatchDeleteFederatedBundleResponse { results })
    }

    async fn create_federated_bundle(
        &self,
        ctx: &CallContext,
        bundle: Bundle,
        output_mask: Option<&BundleMask>,
    ) -> Result<Bundle, Status> {
        let ctx = ctx.with_field(TRUST_DOMAIN_ID, &bundle.trust_domain);
        let stored = self.validate_federated_bundle(
            &ctx,
            &bundle,
            "creating a federated bundle for the server's own trust domain is not allowed",
        )?;

        let created = guarded_item(&ctx, self.data_store.create_bundle(stored))
            .await?
            .map_err(|e| match e {
                DataStoreError::AlreadyExists => {
                    make_status(ctx.log(), Code::AlreadyExists, "bundle already exists", None)
                }
                e => make_status(ctx.log(), Code::Internal, "unable to create bundle", Some(&e)),
            })?;

        let bundle = to_api(&ctx, &created, output_mask)?;
        debug!(ctx.log(); "Federated bundle created");
        Ok(bundle)
    }

    async fn update_federated_bundle(
        &self,
        ctx: &CallContext,
        bundle: Bundle,
        input_mask: Option<&BundleMask>,
        output_mask: Option<&BundleMask>,
    ) -> Result<Bundle, Status> {
        let ctx = ctx.with_field(TRUST_DOMAIN_ID, &bundle.trust_domain);
        let stored = self.validate_federated_bundle(
            &ctx,
            &bundle,
            "updating a federated bundle for the server's own trust domain is not allowed",
        )?;

        let updated = guarded_item(
            &ctx,
            self.data_store
                .update_bundle(stored, mask_to_stored(input_mask)),
        )
        .await?
        .map_err(|e| match e {
            DataStoreError::NotFound => {
                make_status(ctx.log(), Code::NotFound, "bundle not found", None)
            }
            e => make_status(ctx.log(), Code::Internal, "failed to update bundle", Some(&e)),
        })?;

        let bundle = to_api(&ctx, &updated, output_mask)?;
        debug!(ctx.log(); "Federated bundle updated");
        Ok(bundle)
    }

    async fn set_federated_bundle(
        &self,
        ctx: &CallContext,
        bundle: Bundle,
        output_mask: Option<&BundleMask>,
    ) -> Result<Bundle, Status> {
        let ctx = ctx.with_field(TRUST_DOMAIN_ID, &bundle.trust_domain);
        let stored = self.validate_federated_bundle(
            &ctx,
            &bundle,
            "setting a federated bundle for the server's own trust domain is not allowed",
        )?;

        let set = guarded_item(&ctx, self.data_store.set_bundle(stored))
            .await?
            .map_err(|e| make_status(ctx.log(), Code::Internal, "failed to set bundle", Some(&e)))?;

        let bundle = to_api(&ctx, &set, output_mask)?;
        info!(ctx.log(); "Bundle set successfully");
        Ok(bundle)
    }

    async fn delete_federated_bundle(
        &self,
        ctx: &CallContext,
        requested: String,
        mode: DeleteBundleMode,
    ) -> DeleteResult {
        let ctx = ctx.with_field(TRUST_DOMAIN_ID, &requested);

        let trust_domain = match self.federated_trust_domain(
            &ctx,
            &requested,
            "removing the bundle for the server trust domain is not allowed",
        ) {
            Ok(trust_domain) => trust_domain,
            Err(status) => {
                return DeleteResult {
                    status,
                    trust_domain: requested,
                }
            }
        };

        let deleted = guarded_item(
            &ctx,
            self.data_store
                .delete_bundle(&trust_domain.id_string(), mode),
        )
        .await;

        let status = match deleted {
            Ok(Ok(())) => Status::ok(),
            Ok(Err(DataStoreError::NotFound)) => {
                make_status(ctx.log(), Code::NotFound, "bundle not found", None)
            }
            Ok(Err(e)) => make_status(
                ctx.log(),
                e.code(),
                "failed to delete federated bundle",
                Some(&e),
            ),
            Err(status) => status,
        };

        DeleteResult {
            status,
            trust_domain: requested,
        }
    }

    /// Parses `raw` and rejects the server's own trust domain with `own_msg`.
    fn federated_trust_domain(
        &self,
        ctx: &CallContext,
        raw: &str,
        own_msg: &str,
    ) -> Result<TrustDomain, Status> {
        let trust_domain = TrustDomain::new(raw).map_err(|e| {
            make_status(
                ctx.log(),
                Code::InvalidArgument,
                "trust domain argument is not valid",
                Some(&e),
            )
        })?;

        if trust_domain == self.trust_domain {
            return Err(make_status(ctx.log(), Code::InvalidArgument, own_msg, None));
        }

        Ok(trust_domain)
    }

    fn validate_federated_bundle(
        &self,
        ctx: &CallContext,
        bundle: &Bundle,
        own_msg: &str,
    ) -> Result<StoredBundle, Status> {
        self.federated_trust_domain(ctx, &bundle.trust_domain, own_msg)?;

        api_to_bundle(bundle).map_err(|e| {
            make_status(
                ctx.log(),
                Code::InvalidArgument,
                "failed to convert bundle",
                Some(&e),
            )
        })
    }
}

fn to_api(
    ctx: &CallContext,
    stored: &StoredBundle,
    output_mask: Option<&BundleMask>,
) -> Result<Bundle, Status> {
    let bundle = bundle_to_api(stored)
        .map_err(|e| make_status(ctx.log(), Code::Internal, "failed to convert bundle", Some(&e)))?;
    Ok(project(bundle, output_mask))
}

fn bundle_result(result: Result<Bundle, Status>) -> BundleResult {
    match result {
        Ok(bundle) => BundleResult::ok(bundle),
        Err(status) => BundleResult::failed(status),
    }
}
