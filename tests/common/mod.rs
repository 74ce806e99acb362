#![allow(dead_code)]

use std::collections::HashMap;
use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spire_bundle::datastore::{
    DataStore, DataStoreError, DeleteBundleMode, ListBundlesResponse, MemoryDataStore,
    Pagination, StoredBundle, StoredBundleMask, StoredCertificate, StoredPublicKey,
};
use spire_bundle::publisher::{PublishError, UpstreamPublisher};
use spire_bundle::{Bundle, BundleService, JwtAuthority, PublishLimits, TrustDomain, X509Authority};
use tonic::Code;

pub const CA1: &[u8] = include_bytes!("../testdata/ca1.der");
pub const CA2: &[u8] = include_bytes!("../testdata/ca2.der");
pub const JWT_KEY1: &[u8] = include_bytes!("../testdata/jwt_key1.der");
pub const JWT_KEY2: &[u8] = include_bytes!("../testdata/jwt_key2.der");
pub const CORRUPTED: &[u8] = include_bytes!("../testdata/corrupted");

pub const SERVER_TRUST_DOMAIN: &str = "example.org";

/// Data store double that counts calls and can be told to fail or hang.
#[derive(Debug, Default)]
pub struct RecordingDataStore {
    inner: MemoryDataStore,
    calls: AtomicUsize,
    calls_by_method: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, Code>>,
    targeted_failures: Mutex<HashMap<(&'static str, String), Code>>,
    hang: AtomicBool,
}

impl RecordingDataStore {
    pub fn new(inner: MemoryDataStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &MemoryDataStore {
        &self.inner
    }

    /// Total number of data store calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls_by_method
            .lock()
            .unwrap()
            .get(method)
            .copied()
            .unwrap_or_default()
    }

    /// Makes every later call to `method` fail with `code`.
    pub fn fail(&self, method: &'static str, code: Code) {
        self.failures.lock().unwrap().insert(method, code);
    }

    /// Makes later calls to `method` for `trust_domain_id` fail with `code`.
    pub fn fail_for(&self, method: &'static str, trust_domain_id: &str, code: Code) {
        self.targeted_failures
            .lock()
            .unwrap()
            .insert((method, trust_domain_id.to_owned()), code);
    }

    /// Makes every later call block forever.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    async fn enter(&self, method: &'static str) -> Result<(), DataStoreError> {
        self.enter_for(method, None).await
    }

    async fn enter_for(
        &self,
        method: &'static str,
        trust_domain_id: Option<&str>,
    ) -> Result<(), DataStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_method
            .lock()
            .unwrap()
            .entry(method)
            .or_default() += 1;

        if self.hang.load(Ordering::SeqCst) {
            pending::<()>().await;
        }

        let targeted = trust_domain_id.and_then(|id| {
            self.targeted_failures
                .lock()
                .unwrap()
                .get(&(method, id.to_owned()))
                .copied()
        });
        let failure = targeted.or_else(|| self.failures.lock().unwrap().get(method).copied());
        match failure {
            None => Ok(()),
            Some(Code::NotFound) => Err(DataStoreError::NotFound),
            Some(Code::AlreadyExists) => Err(DataStoreError::AlreadyExists),
            Some(Code::FailedPrecondition) => Err(DataStoreError::FailedPrecondition(
                "precondition failed".to_owned(),
            )),
            Some(_) => Err(DataStoreError::internal("database is on fire")),
        }
    }
}

#[async_trait]
impl DataStore for RecordingDataStore {
    async fn fetch_bundle(
        &self,
        trust_domain_id: &str,
    ) -> Result<Option<StoredBundle>, DataStoreError> {
        self.enter_for("fetch_bundle", Some(trust_domain_id)).await?;
        self.inner.fetch_bundle(trust_domain_id).await
    }

    async fn list_bundles(
        &self,
        pagination: Option<Pagination>,
    ) -> Result<ListBundlesResponse, DataStoreError> {
        self.enter("list_bundles").await?;
        self.inner.list_bundles(pagination).await
    }

    async fn count_bundles(&self) -> Result<u64, DataStoreError> {
        self.enter("count_bundles").await?;
        self.inner.count_bundles().await
    }

    async fn create_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError> {
        self.enter_for("create_bundle", Some(&bundle.trust_domain_id)).await?;
        self.inner.create_bundle(bundle).await
    }

    async fn update_bundle(
        &self,
        bundle: StoredBundle,
        input_mask: Option<StoredBundleMask>,
    ) -> Result<StoredBundle, DataStoreError> {
        self.enter_for("update_bundle", Some(&bundle.trust_domain_id)).await?;
        self.inner.update_bundle(bundle, input_mask).await
    }

    async fn set_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError> {
        self.enter_for("set_bundle", Some(&bundle.trust_domain_id)).await?;
        self.inner.set_bundle(bundle).await
    }

    async fn append_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError> {
        self.enter("append_bundle").await?;
        self.inner.append_bundle(bundle).await
    }

    async fn delete_bundle(
        &self,
        trust_domain_id: &str,
        mode: DeleteBundleMode,
    ) -> Result<(), DataStoreError> {
        self.enter_for("delete_bundle", Some(trust_domain_id)).await?;
        self.inner.delete_bundle(trust_domain_id, mode).await
    }
}

/// Publisher double that counts calls and echoes the published key after `existing`.
#[derive(Debug, Default)]
pub struct CountingPublisher {
    calls: AtomicUsize,
    existing: Vec<StoredPublicKey>,
}

impl CountingPublisher {
    pub fn with_existing(existing: Vec<StoredPublicKey>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            existing,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamPublisher for CountingPublisher {
    async fn publish_jwt_key(
        &self,
        key: StoredPublicKey,
    ) -> Result<Vec<StoredPublicKey>, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut keys = self.existing.clone();
        keys.push(key);
        Ok(keys)
    }
}

pub struct Fixture {
    pub service: BundleService,
    pub store: Arc<RecordingDataStore>,
    pub publisher: Arc<CountingPublisher>,
}

pub fn fixture(bundles: Vec<StoredBundle>) -> Fixture {
    fixture_with(bundles, PublishLimits::default(), 1)
}

pub fn fixture_with(
    bundles: Vec<StoredBundle>,
    limits: PublishLimits,
    batch_concurrency: usize,
) -> Fixture {
    let store = Arc::new(RecordingDataStore::new(MemoryDataStore::with_bundles(
        bundles,
    )));
    let publisher = Arc::new(CountingPublisher::default());

    let service = BundleService::builder(TrustDomain::new(SERVER_TRUST_DOMAIN).unwrap())
        .with_data_store(store.clone())
        .with_upstream_publisher(publisher.clone())
        .with_publish_limits(limits)
        .with_batch_concurrency(batch_concurrency)
        .build()
        .unwrap();

    Fixture {
        service,
        store,
        publisher,
    }
}

pub fn stored_bundle(trust_domain: &str) -> StoredBundle {
    StoredBundle {
        trust_domain_id: format!("spiffe://{trust_domain}"),
        root_cas: vec![StoredCertificate {
            der_bytes: CA1.to_vec(),
            tainted_key: false,
        }],
        jwt_signing_keys: vec![StoredPublicKey {
            pkix_bytes: JWT_KEY1.to_vec(),
            kid: "kid-1".to_owned(),
            not_after: 1_700_000_000,
            tainted_key: false,
        }],
        refresh_hint: 60,
        sequence_number: 1,
    }
}

pub fn api_bundle(trust_domain: &str) -> Bundle {
    Bundle {
        trust_domain: trust_domain.to_owned(),
        x509_authorities: vec![X509Authority {
            asn1: CA2.to_vec(),
            tainted: false,
        }],
        jwt_authorities: vec![jwt_authority("kid-2", JWT_KEY2)],
        refresh_hint: 30,
        sequence_number: 5,
    }
}

pub fn jwt_authority(kid: &str, key: &[u8]) -> JwtAuthority {
    JwtAuthority {
        public_key: key.to_vec(),
        key_id: kid.to_owned(),
        expires_at: 1_800_000_000,
        tainted: false,
    }
}
