use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    DataStore, DataStoreError, DeleteBundleMode, ListBundlesResponse, Pagination, StoredBundle,
    StoredBundleMask,
};

/// In-process [`DataStore`].
///
/// Bundles are kept ordered by trust domain id, which is also the pagination order; the
/// continuation token is the id of the last bundle of the previous page. Registration
/// entries that federate with a trust domain are tracked as plain entry ids so the three
/// deletion modes behave as they would against a durable store.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    bundles: BTreeMap<String, StoredBundle>,
    // trust domain id -> ids of the entries federating with it
    federations: BTreeMap<String, BTreeSet<String>>,
    removed_entries: Vec<String>,
}

impl MemoryDataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `bundles`.
    pub fn with_bundles(bundles: impl IntoIterator<Item = StoredBundle>) -> Self {
        let bundles = bundles
            .into_iter()
            .map(|b| (b.trust_domain_id.clone(), b))
            .collect();
        Self {
            state: RwLock::new(State {
                bundles,
                ..State::default()
            }),
        }
    }

    /// Records that registration entry `entry_id` federates with `trust_domain_id`.
    pub async fn add_federation(&self, entry_id: impl Into<String>, trust_domain_id: &str) {
        self.state
            .write()
            .await
            .federations
            .entry(trust_domain_id.to_owned())
            .or_default()
            .insert(entry_id.into());
    }

    /// Returns the ids of the entries federating with `trust_domain_id`.
    pub async fn federated_entries(&self, trust_domain_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .federations
            .get(trust_domain_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drains the ids of the entries removed by deletes in [`DeleteBundleMode::Delete`]
    /// since the previous call.
    pub async fn take_removed_entries(&self) -> Vec<String> {
        std::mem::take(&mut self.state.write().await.removed_entries)
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn fetch_bundle(
        &self,
        trust_domain_id: &str,
    ) -> Result<Option<StoredBundle>, DataStoreError> {
        Ok(self.state.read().await.bundles.get(trust_domain_id).cloned())
    }

    async fn list_bundles(
        &self,
        pagination: Option<Pagination>,
    ) -> Result<ListBundlesResponse, DataStoreError> {
        let state = self.state.read().await;

        let Some(pagination) = pagination else {
            return Ok(ListBundlesResponse {
                bundles: state.bundles.values().cloned().collect(),
                pagination: None,
            });
        };

        if pagination.page_size == 0 {
            return Err(DataStoreError::internal(
                "cannot paginate with pagesize = 0",
            ));
        }

        let start = if pagination.token.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(pagination.token.as_str())
        };

        let bundles: Vec<StoredBundle> = state
            .bundles
            .range::<str, _>((start, Bound::Unbounded))
            .take(pagination.page_size as usize)
            .map(|(_, b)| b.clone())
            .collect();

        let token = match bundles.last() {
            Some(last) if bundles.len() == pagination.page_size as usize => {
                last.trust_domain_id.clone()
            }
            _ => String::new(),
        };

        Ok(ListBundlesResponse {
            bundles,
            pagination: Some(Pagination {
                page_size: pagination.page_size,
                token,
            }),
        })
    }

    async fn count_bundles(&self) -> Result<u64, DataStoreError> {
        Ok(self.state.read().await.bundles.len() as u64)
    }

    async fn create_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError> {
        let mut state = self.state.write().await;
        if state.bundles.contains_key(&bundle.trust_domain_id) {
            return Err(DataStoreError::AlreadyExists);
        }
        state
            .bundles
            .insert(bundle.trust_domain_id.clone(), bundle.clone());
        Ok(bundle)
    }

    async fn update_bundle(
        &self,
        bundle: StoredBundle,
        input_mask: Option<StoredBundleMask>,
    ) -> Result<StoredBundle, DataStoreError> {
        let mask = input_mask.unwrap_or(StoredBundleMask {
            root_cas: true,
            jwt_signing_keys: true,
            refresh_hint: true,
            sequence_number: true,
        });

        let mut state = self.state.write().await;
        let existing = state
            .bundles
            .get_mut(&bundle.trust_domain_id)
            .ok_or(DataStoreError::NotFound)?;

        if mask.root_cas {
            existing.root_cas = bundle.root_cas;
        }
        if mask.jwt_signing_keys {
            existing.jwt_signing_keys = bundle.jwt_signing_keys;
        }
        if mask.refresh_hint {
            existing.refresh_hint = bundle.refresh_hint;
        }
        if mask.sequence_number {
            existing.sequence_number = bundle.sequence_number;
        }

        Ok(existing.clone())
    }

    async fn set_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError> {
        self.state
            .write()
            .await
            .bundles
            .insert(bundle.trust_domain_id.clone(), bundle.clone());
        Ok(bundle)
    }

    async fn append_bundle(&self, bundle: StoredBundle) -> Result<StoredBundle, DataStoreError> {
        let mut state = self.state.write().await;

        let Some(existing) = state.bundles.get_mut(&bundle.trust_domain_id) else {
            state
                .bundles
                .insert(bundle.trust_domain_id.clone(), bundle.clone());
            return Ok(bundle);
        };

        let mut changed = false;
        for ca in bundle.root_cas {
            if !existing.root_cas.iter().any(|c| c.der_bytes == ca.der_bytes) {
                existing.root_cas.push(ca);
                changed = true;
            }
        }
        for key in bundle.jwt_signing_keys {
            if !existing.jwt_signing_keys.iter().any(|k| k.kid == key.kid) {
                existing.jwt_signing_keys.push(key);
                changed = true;
            }
        }
        if changed {
            existing.sequence_number = existing.sequence_number.saturating_add(1);
        }

        Ok(existing.clone())
    }

    async fn delete_bundle(
        &self,
        trust_domain_id: &str,
        mode: DeleteBundleMode,
    ) -> Result<(), DataStoreError> {
        let mut state = self.state.write().await;
        if !state.bundles.contains_key(trust_domain_id) {
            return Err(DataStoreError::NotFound);
        }

        let entries = state
            .federations
            .get(trust_domain_id)
            .map(BTreeSet::len)
            .unwrap_or_default();

        match mode {
            DeleteBundleMode::Restrict if entries > 0 => {
                return Err(DataStoreError::FailedPrecondition(format!(
                    "cannot delete bundle; federated with {entries} registration entries"
                )));
            }
            DeleteBundleMode::Restrict | DeleteBundleMode::Dissociate => {
                state.federations.remove(trust_domain_id);
            }
            DeleteBundleMode::Delete => {
                if let Some(removed) = state.federations.remove(trust_domain_id) {
                    state.removed_entries.extend(removed);
                }
            }
        }

        state.bundles.remove(trust_domain_id);
        Ok(())
    }
}
