//! Restore orchestrator: rebuilds local state from the remote store.
//!
//! Runs on demand (first run, explicit restore, recovery after wipe).
//! Categories are independent, so they restore concurrently and a failure in
//! one never aborts the others. Anything that smells like corrupted or
//! foreign data (undecodable payload, failed decryption, missing expected
//! keys) is treated as "no backup found" rather than an error: better an
//! empty category than a poisoned domain write.

use crate::registry::{BackupCategory, CategoryRegistry, Network};
use crate::state::SyncStateStore;
use crate::transport::payload::BackupPayload;
use crate::transport::BackupTransport;
use crate::utils::errors::{EngineError, Result};
use crate::utils::now_millis;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of restoring one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Applied the remote record with this server timestamp.
    Restored { timestamp: u64 },
    /// No usable record on either endpoint. Normal for fresh identities.
    NoBackupFound,
    /// Transport-level failure (network, auth); the category can be retried
    /// by re-running the orchestrator.
    Failed { reason: String },
}

/// Aggregated per-category outcomes of one `restore_all` run.
#[derive(Debug)]
pub struct RestoreReport {
    outcomes: HashMap<BackupCategory, RestoreOutcome>,
}

impl RestoreReport {
    pub fn outcome(&self, category: BackupCategory) -> &RestoreOutcome {
        // Every category is attempted, so the entry always exists.
        &self.outcomes[&category]
    }

    pub fn restored_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, RestoreOutcome::Restored { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, RestoreOutcome::Failed { .. }))
            .count()
    }

    pub fn all_outcomes(&self) -> &HashMap<BackupCategory, RestoreOutcome> {
        &self.outcomes
    }
}

pub struct RestoreOrchestrator {
    registry: Arc<CategoryRegistry>,
    store: Arc<SyncStateStore>,
    current: Arc<dyn BackupTransport>,
    legacy: Option<Arc<dyn BackupTransport>>,
    network: Network,
}

impl RestoreOrchestrator {
    pub fn new(
        registry: Arc<CategoryRegistry>,
        store: Arc<SyncStateStore>,
        current: Arc<dyn BackupTransport>,
        legacy: Option<Arc<dyn BackupTransport>>,
        network: Network,
    ) -> Self {
        Self {
            registry,
            store,
            current,
            legacy,
            network,
        }
    }

    /// Restore every category from the remote store. Always completes with a
    /// report; per-category problems are outcomes, not errors.
    pub async fn restore_all(&self) -> Result<RestoreReport> {
        info!(network = %self.network, "restoring all categories from remote backup");

        let attempts = BackupCategory::ALL.map(|category| async move {
            let outcome = self.restore_category(category).await;
            (category, outcome)
        });

        let outcomes: HashMap<_, _> = join_all(attempts).await.into_iter().collect();

        info!(
            restored = outcomes
                .values()
                .filter(|o| matches!(o, RestoreOutcome::Restored { .. }))
                .count(),
            "restore pass complete"
        );
        Ok(RestoreReport { outcomes })
    }

    async fn restore_category(&self, category: BackupCategory) -> RestoreOutcome {
        let (transport, timestamp) = match self.locate_newest(category).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!(category = %category, "no backup record on any endpoint");
                return RestoreOutcome::NoBackupFound;
            }
            Err(e) => {
                warn!(category = %category, error = %e, "restore lookup failed");
                return RestoreOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let bytes = match transport.fetch(category, self.network, timestamp).await {
            Ok(bytes) => bytes,
            // Wrong key or corrupted record: most often a foreign record,
            // not a reason to fail the restore
            Err(EngineError::Decrypt(e)) => {
                warn!(category = %category, error = %e, "backup record undecryptable, treating as absent");
                return RestoreOutcome::NoBackupFound;
            }
            Err(EngineError::NotFound(_)) => return RestoreOutcome::NoBackupFound,
            Err(e) => {
                warn!(category = %category, error = %e, "backup fetch failed");
                return RestoreOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let payload = match BackupPayload::from_bytes(&bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(category = %category, error = %e, "backup payload undecodable, treating as absent");
                return RestoreOutcome::NoBackupFound;
            }
        };

        if let Err(e) = self.registry.validate_shape(category, &payload.data) {
            warn!(category = %category, error = %e, "backup payload failed shape validation, treating as absent");
            return RestoreOutcome::NoBackupFound;
        }

        if let Err(e) = self.registry.apply(category, payload.data) {
            warn!(category = %category, error = %e, "restored payload could not be applied");
            return RestoreOutcome::Failed {
                reason: e.to_string(),
            };
        }

        // Freshly-restored state must not be re-uploaded as locally dirty
        self.store.mark_restored(category, now_millis());
        debug!(category = %category, timestamp, "category restored");
        RestoreOutcome::Restored { timestamp }
    }

    /// Find the newest record for a category: current endpoint first, legacy
    /// fallback before declaring "no backup exists".
    async fn locate_newest(
        &self,
        category: BackupCategory,
    ) -> Result<Option<(Arc<dyn BackupTransport>, u64)>> {
        match self.list_on(&self.current, category).await? {
            Some(ts) => Ok(Some((self.current.clone(), ts))),
            None => match &self.legacy {
                Some(legacy) => {
                    debug!(category = %category, "probing legacy endpoint");
                    Ok(self
                        .list_on(legacy, category)
                        .await?
                        .map(|ts| (legacy.clone(), ts)))
                }
                None => Ok(None),
            },
        }
    }

    async fn list_on(
        &self,
        transport: &Arc<dyn BackupTransport>,
        category: BackupCategory,
    ) -> Result<Option<u64>> {
        match transport.list(category, self.network).await {
            Ok(timestamps) => Ok(timestamps.into_iter().max()),
            Err(EngineError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainStateHandle;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// In-memory remote store: one optional (timestamp, plaintext) record
    /// per category, or a forced error.
    struct FakeStore {
        records: Mutex<HashMap<BackupCategory, (u64, Vec<u8>)>>,
        list_error: Option<fn() -> EngineError>,
        decrypt_fails: bool,
    }

    impl FakeStore {
        fn empty() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                list_error: None,
                decrypt_fails: false,
            }
        }

        fn with_payload(category: BackupCategory, timestamp: u64, data: Value) -> Self {
            let store = Self::empty();
            store.insert_payload(category, timestamp, data);
            store
        }

        fn insert_payload(&self, category: BackupCategory, timestamp: u64, data: Value) {
            let payload = BackupPayload::new(category, Network::Regtest, data);
            self.records
                .lock()
                .unwrap()
                .insert(category, (timestamp, payload.to_bytes().unwrap()));
        }

        fn insert_raw(&self, category: BackupCategory, timestamp: u64, bytes: Vec<u8>) {
            self.records
                .lock()
                .unwrap()
                .insert(category, (timestamp, bytes));
        }
    }

    #[async_trait]
    impl BackupTransport for FakeStore {
        async fn upload(&self, _: BackupCategory, _: Network, _: &[u8]) -> crate::Result<u64> {
            unreachable!("restore never uploads")
        }

        async fn list(&self, category: BackupCategory, _: Network) -> crate::Result<Vec<u64>> {
            if let Some(make_err) = self.list_error {
                return Err(make_err());
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&category)
                .map(|(ts, _)| vec![*ts])
                .unwrap_or_default())
        }

        async fn fetch(
            &self,
            category: BackupCategory,
            _: Network,
            timestamp: u64,
        ) -> crate::Result<Bytes> {
            if self.decrypt_fails {
                return Err(EngineError::Decrypt("wrong key".into()));
            }
            let records = self.records.lock().unwrap();
            match records.get(&category) {
                Some((ts, bytes)) if *ts == timestamp => Ok(Bytes::from(bytes.clone())),
                _ => Err(EngineError::NotFound(format!("{category}/{timestamp}"))),
            }
        }
    }

    struct Fixture {
        orchestrator: RestoreOrchestrator,
        domain: DomainStateHandle,
        store: Arc<SyncStateStore>,
    }

    fn fixture(current: FakeStore, legacy: Option<FakeStore>) -> Fixture {
        let domain = DomainStateHandle::new();
        let registry = Arc::new(CategoryRegistry::new(domain.clone()));
        let store = Arc::new(SyncStateStore::new());
        let orchestrator = RestoreOrchestrator::new(
            registry,
            store.clone(),
            Arc::new(current),
            legacy.map(|l| Arc::new(l) as Arc<dyn BackupTransport>),
            Network::Regtest,
        );
        Fixture {
            orchestrator,
            domain,
            store,
        }
    }

    #[tokio::test]
    async fn test_restore_applies_newest_record() {
        let current = FakeStore::with_payload(
            BackupCategory::Contacts,
            500,
            json!({"contacts": {"pk1": {"name": "alice"}}}),
        );
        let fixture = fixture(current, None);

        let report = fixture.orchestrator.restore_all().await.unwrap();

        assert_eq!(
            report.outcome(BackupCategory::Contacts),
            &RestoreOutcome::Restored { timestamp: 500 }
        );
        let doc = fixture.domain.get(BackupCategory::Contacts).unwrap();
        assert_eq!(doc["contacts"]["pk1"]["name"], "alice");
        // Restored state is stamped synced, not dirty
        let record = fixture.store.get(BackupCategory::Contacts);
        assert!(record.synced > 0);
        assert_eq!(record.required, None);
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_no_backup_found() {
        let fixture = fixture(FakeStore::empty(), Some(FakeStore::empty()));

        let report = fixture.orchestrator.restore_all().await.unwrap();

        assert_eq!(
            report.outcome(BackupCategory::Contacts),
            &RestoreOutcome::NoBackupFound
        );
        assert_eq!(report.restored_count(), 0);
        assert_eq!(report.failed_count(), 0);
    }

    #[tokio::test]
    async fn test_legacy_fallback_is_probed() {
        let legacy = FakeStore::with_payload(
            BackupCategory::Metadata,
            42,
            json!({"tags": {"tx1": ["lunch"]}, "lastUsedTags": ["lunch"],
                   "pendingInvoices": [], "slashTagsUrls": {}}),
        );
        let fixture = fixture(FakeStore::empty(), Some(legacy));

        let report = fixture.orchestrator.restore_all().await.unwrap();

        assert_eq!(
            report.outcome(BackupCategory::Metadata),
            &RestoreOutcome::Restored { timestamp: 42 }
        );
        let doc = fixture.domain.get(BackupCategory::Metadata).unwrap();
        assert_eq!(doc["tags"]["tx1"], json!(["lunch"]));
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_treated_as_absent() {
        // Payload missing the keys the metadata shape requires
        let current =
            FakeStore::with_payload(BackupCategory::Metadata, 10, json!({"tags": {}}));
        let fixture = fixture(current, None);

        let report = fixture.orchestrator.restore_all().await.unwrap();

        assert_eq!(
            report.outcome(BackupCategory::Metadata),
            &RestoreOutcome::NoBackupFound
        );
        // Nothing was written into domain state
        assert_eq!(fixture.domain.get(BackupCategory::Metadata), None);
    }

    #[tokio::test]
    async fn test_undecodable_record_is_treated_as_absent() {
        let current = FakeStore::empty();
        current.insert_raw(BackupCategory::Widgets, 9, b"corrupted bytes".to_vec());
        let fixture = fixture(current, None);

        let report = fixture.orchestrator.restore_all().await.unwrap();
        assert_eq!(
            report.outcome(BackupCategory::Widgets),
            &RestoreOutcome::NoBackupFound
        );
    }

    #[tokio::test]
    async fn test_decrypt_failure_is_treated_as_absent() {
        let mut current = FakeStore::with_payload(
            BackupCategory::Settings,
            7,
            json!({"currency": "EUR", "unit": "satoshi", "transactionSpeed": "normal",
                   "hideBalance": false, "pin": true, "pinOnLaunch": false, "biometrics": true}),
        );
        current.decrypt_fails = true;
        let fixture = fixture(current, None);

        let report = fixture.orchestrator.restore_all().await.unwrap();
        assert_eq!(
            report.outcome(BackupCategory::Settings),
            &RestoreOutcome::NoBackupFound
        );
    }

    #[tokio::test]
    async fn test_security_fields_stripped_on_restore() {
        let current = FakeStore::with_payload(
            BackupCategory::Settings,
            77,
            json!({"currency": "CHF", "unit": "bitcoin", "transactionSpeed": "fast",
                   "hideBalance": true, "pin": true, "pinOnLaunch": false, "biometrics": true}),
        );
        let fixture = fixture(current, None);

        let report = fixture.orchestrator.restore_all().await.unwrap();
        assert_eq!(
            report.outcome(BackupCategory::Settings),
            &RestoreOutcome::Restored { timestamp: 77 }
        );

        let doc = fixture.domain.get(BackupCategory::Settings).unwrap();
        assert_eq!(doc["currency"], "CHF");
        assert_eq!(doc["hideBalance"], true);
        assert_eq!(doc["pin"], false);
        assert_eq!(doc["biometrics"], false);
        assert_eq!(doc["pinOnLaunch"], true);
    }

    #[tokio::test]
    async fn test_transport_failure_contained_to_category() {
        // Every list call fails with a network error, so all categories
        // individually fail, but restore_all still completes
        let mut current = FakeStore::empty();
        current.list_error = Some(|| EngineError::Network("offline".into()));
        let fixture = fixture(current, None);

        let report = fixture.orchestrator.restore_all().await.unwrap();
        assert_eq!(report.failed_count(), BackupCategory::ALL.len());
        for category in BackupCategory::ALL {
            assert!(matches!(
                report.outcome(category),
                RestoreOutcome::Failed { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_not_found_on_current_falls_through_to_legacy() {
        // Current endpoint answers 404-style NotFound instead of an empty
        // list; the legacy endpoint still gets probed
        let mut current = FakeStore::empty();
        current.list_error = Some(|| EngineError::NotFound("no such namespace".into()));
        let legacy =
            FakeStore::with_payload(BackupCategory::Contacts, 3, json!({"contacts": {}}));
        let fixture = fixture(current, Some(legacy));

        let report = fixture.orchestrator.restore_all().await.unwrap();
        assert_eq!(
            report.outcome(BackupCategory::Contacts),
            &RestoreOutcome::Restored { timestamp: 3 }
        );
    }
}
