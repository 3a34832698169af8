//! Per-category sync state: the record of what still needs backing up.
//!
//! One record per category, mutated from three sides: the dirty tracker
//! stamps `required`, the scheduler flips `running` and advances `synced`,
//! and status/diagnostics read snapshots. Records are independent: updates
//! go through the dashmap entry API so there is per-category atomicity and
//! no cross-category locking.

use crate::registry::BackupCategory;
use crate::utils::now_millis;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;

/// Sync record for one category. All timestamps are unix milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    /// Set when the category became dirty and not yet cleared. Absent means
    /// "no pending change".
    pub required: Option<u64>,
    /// Time of last confirmed successful upload (0 = never).
    pub synced: u64,
    /// True while an upload for this category is in flight.
    pub running: bool,
    /// Consecutive failed upload attempts since the category last converged.
    pub failures: u32,
    /// Whether the most recent failure was an authentication failure.
    pub auth_failure: bool,
}

impl SyncState {
    /// A category needs backup iff a change is pending and the last
    /// confirmed upload predates it.
    pub fn needs_backup(&self) -> bool {
        match self.required {
            Some(required) => self.synced == 0 || self.synced < required,
            None => false,
        }
    }
}

/// Concurrent store of per-category sync records.
pub struct SyncStateStore {
    records: DashMap<BackupCategory, SyncState>,
}

impl SyncStateStore {
    pub fn new() -> Self {
        let records = DashMap::new();
        for category in BackupCategory::ALL {
            records.insert(category, SyncState::default());
        }
        Self { records }
    }

    fn with_record<R>(&self, category: BackupCategory, f: impl FnOnce(&mut SyncState) -> R) -> R {
        let mut entry = self.records.entry(category).or_default();
        f(entry.value_mut())
    }

    /// Stamp the category dirty. Idempotent while idle or debouncing: many
    /// rapid mutations produce one pending backup. A mutation arriving while
    /// an upload is in flight re-stamps strictly past the stamp the upload
    /// observed, so wall-clock resolution cannot make the re-stamp equal the
    /// original and let `mark_synced` clear it.
    pub fn mark_required(&self, category: BackupCategory) {
        let now = now_millis();
        self.with_record(category, |record| match record.required {
            None => record.required = Some(now),
            Some(stamp) if record.running => {
                record.required = Some(now.max(stamp + 1));
            }
            Some(_) => {}
        });
    }

    /// At-most-one-in-flight gate. If the category is dirty and no upload is
    /// running, flips `running` and returns the `required` stamp the upload
    /// is acting on; otherwise `None`.
    pub fn try_begin(&self, category: BackupCategory) -> Option<u64> {
        self.with_record(category, |record| {
            if record.running || !record.needs_backup() {
                return None;
            }
            record.running = true;
            record.required
        })
    }

    /// Record a confirmed upload. Clears `required` only if no newer
    /// mutation was stamped while the upload was in flight; otherwise the
    /// category stays dirty and will be retried.
    pub fn mark_synced(&self, category: BackupCategory, at: u64, observed_required: u64) {
        self.with_record(category, |record| {
            record.running = false;
            record.synced = at;
            match record.required {
                Some(required) if required == observed_required => {
                    record.required = None;
                    record.failures = 0;
                    record.auth_failure = false;
                }
                Some(required) => {
                    // A mutation raced the upload. The server-assigned
                    // `synced` stamp may postdate the local re-stamp, which
                    // would mask the pending change; keep the invariant
                    // `required > synced` so the retry actually happens.
                    record.required = Some(required.max(at + 1));
                }
                None => {}
            }
        });
    }

    /// Record a failed upload attempt. `required` is left set so the next
    /// evaluation tick retries.
    pub fn mark_failed(&self, category: BackupCategory, auth: bool) {
        self.with_record(category, |record| {
            record.running = false;
            record.failures = record.failures.saturating_add(1);
            record.auth_failure = auth;
        });
    }

    /// An in-flight upload was abandoned (wipe). Not a failure.
    pub fn abandon(&self, category: BackupCategory) {
        self.with_record(category, |record| {
            record.running = false;
        });
    }

    /// Record a successful restore: the freshly-restored state must not be
    /// re-uploaded as if it were locally dirty.
    pub fn mark_restored(&self, category: BackupCategory, at: u64) {
        self.with_record(category, |record| {
            record.required = None;
            record.synced = at;
            record.running = false;
            record.failures = 0;
            record.auth_failure = false;
        });
    }

    pub fn needs_backup(&self, category: BackupCategory) -> bool {
        self.records
            .get(&category)
            .map(|r| r.needs_backup())
            .unwrap_or(false)
    }

    pub fn get(&self, category: BackupCategory) -> SyncState {
        self.records
            .get(&category)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Read-only snapshot for status UIs and tests.
    pub fn snapshot(&self) -> HashMap<BackupCategory, SyncState> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Reset every record to defaults (wipe-all).
    pub fn reset(&self) {
        for category in BackupCategory::ALL {
            self.records.insert(category, SyncState::default());
        }
    }
}

impl Default for SyncStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_required_is_idempotent_while_idle() {
        let store = SyncStateStore::new();
        store.mark_required(BackupCategory::Metadata);
        let first = store.get(BackupCategory::Metadata).required;
        store.mark_required(BackupCategory::Metadata);
        store.mark_required(BackupCategory::Metadata);
        assert_eq!(store.get(BackupCategory::Metadata).required, first);
    }

    #[test]
    fn test_try_begin_is_at_most_one_in_flight() {
        let store = SyncStateStore::new();
        store.mark_required(BackupCategory::Settings);

        let observed = store.try_begin(BackupCategory::Settings);
        assert!(observed.is_some());
        // Second attempt while running is rejected
        assert_eq!(store.try_begin(BackupCategory::Settings), None);
    }

    #[test]
    fn test_try_begin_rejects_clean_category() {
        let store = SyncStateStore::new();
        assert_eq!(store.try_begin(BackupCategory::Contacts), None);
    }

    #[test]
    fn test_mark_synced_clears_required() {
        let store = SyncStateStore::new();
        store.mark_required(BackupCategory::Widgets);
        let observed = store.try_begin(BackupCategory::Widgets).unwrap();

        store.mark_synced(BackupCategory::Widgets, observed + 100, observed);

        let record = store.get(BackupCategory::Widgets);
        assert_eq!(record.required, None);
        assert_eq!(record.synced, observed + 100);
        assert!(!record.running);
        assert!(!record.needs_backup());
    }

    #[test]
    fn test_mid_flight_mutation_keeps_category_dirty() {
        let store = SyncStateStore::new();
        store.mark_required(BackupCategory::Contacts);
        let observed = store.try_begin(BackupCategory::Contacts).unwrap();

        // A mutation races the in-flight upload: running=true allows a
        // re-stamp even though required is present.
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.mark_required(BackupCategory::Contacts);
        let restamped = store.get(BackupCategory::Contacts).required.unwrap();
        assert!(restamped > observed);

        // Server clock runs ahead of the local re-stamp
        store.mark_synced(BackupCategory::Contacts, restamped + 1_000, observed);

        let record = store.get(BackupCategory::Contacts);
        assert!(!record.running);
        assert!(record.needs_backup(), "mid-flight mutation must survive");
        assert!(store.try_begin(BackupCategory::Contacts).is_some());
    }

    #[test]
    fn test_same_millisecond_mid_flight_mutation_stays_dirty() {
        let store = SyncStateStore::new();
        store.mark_required(BackupCategory::Contacts);
        let observed = store.try_begin(BackupCategory::Contacts).unwrap();

        // Re-stamp in the same millisecond as the original stamp; the new
        // stamp must still be distinguishable from what the upload observed.
        store.mark_required(BackupCategory::Contacts);
        let restamped = store.get(BackupCategory::Contacts).required.unwrap();
        assert!(restamped > observed);

        store.mark_synced(BackupCategory::Contacts, observed + 50, observed);

        let record = store.get(BackupCategory::Contacts);
        assert!(!record.running);
        assert!(record.needs_backup(), "mid-flight mutation was dropped");
        assert!(store.try_begin(BackupCategory::Contacts).is_some());
    }

    #[test]
    fn test_mark_failed_leaves_required_set() {
        let store = SyncStateStore::new();
        store.mark_required(BackupCategory::ProviderOrders);
        store.try_begin(BackupCategory::ProviderOrders).unwrap();

        store.mark_failed(BackupCategory::ProviderOrders, false);

        let record = store.get(BackupCategory::ProviderOrders);
        assert!(record.needs_backup());
        assert!(!record.running);
        assert_eq!(record.failures, 1);

        // Retry is possible again
        assert!(store.try_begin(BackupCategory::ProviderOrders).is_some());
    }

    #[test]
    fn test_abandon_is_not_a_failure() {
        let store = SyncStateStore::new();
        store.mark_required(BackupCategory::Wallet);
        store.try_begin(BackupCategory::Wallet).unwrap();

        store.abandon(BackupCategory::Wallet);

        let record = store.get(BackupCategory::Wallet);
        assert!(!record.running);
        assert_eq!(record.failures, 0);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let store = SyncStateStore::new();
        store.mark_required(BackupCategory::Metadata);
        store.try_begin(BackupCategory::Metadata).unwrap();
        store.mark_failed(BackupCategory::Metadata, true);
        store.mark_required(BackupCategory::Settings);

        store.reset();

        for (_, record) in store.snapshot() {
            assert_eq!(record, SyncState::default());
            assert_eq!(record.required, None);
            assert_eq!(record.synced, 0);
            assert!(!record.running);
        }
    }

    #[test]
    fn test_snapshot_covers_every_category() {
        let store = SyncStateStore::new();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), BackupCategory::ALL.len());
    }
}
