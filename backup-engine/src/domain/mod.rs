//! Domain-state handle: the seam between the wallet's live state and the
//! backup engine.
//!
//! The wallet owns the real persisted stores (settings, widgets, tagging
//! metadata, provider orders, contacts, payment activity, core ledger). The
//! engine only needs two things from them: a synchronous snapshot/replace of
//! each category's JSON document, and a change-notification feed the dirty
//! tracker can subscribe to. `DomainStateHandle` packages both and is passed
//! into the engine at construction time, so the engine has no process-wide
//! singletons and is testable in isolation.

use crate::registry::BackupCategory;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// A single domain-state mutation, as broadcast to observers.
///
/// Fieldless on purpose: the dirty tracker only needs to know *which kind* of
/// mutation happened to resolve it to a backup category. The mutated data
/// itself is read back through the handle at collect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainEvent {
    SettingsChanged,
    WidgetSaved,
    WidgetDeleted,
    FeedUpdated,
    TagAdded,
    TagRemoved,
    PendingInvoiceUpdated,
    TransactionLinkAdded,
    OrderPaid,
    OrderStatusUpdated,
    ContactAdded,
    ContactEdited,
    ContactDeleted,
    LightningActivityRecorded,
    TransferRecorded,
}

/// Capacity of the change-notification channel. Mutations are tiny enum
/// values; a slow tracker lags rather than blocking writers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Handle over the per-category domain documents.
#[derive(Clone)]
pub struct DomainStateHandle {
    documents: Arc<RwLock<HashMap<BackupCategory, Value>>>,
    events_tx: broadcast::Sender<DomainEvent>,
}

impl DomainStateHandle {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<BackupCategory, Value>> {
        self.documents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<BackupCategory, Value>> {
        self.documents.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of a category's document, if one has been written.
    pub fn get(&self, category: BackupCategory) -> Option<Value> {
        self.read().get(&category).cloned()
    }

    /// Replace a category's document and broadcast the mutation that caused
    /// it. This is the path wallet code uses; it feeds the dirty tracker.
    pub fn replace(&self, category: BackupCategory, value: Value, event: DomainEvent) {
        self.write().insert(category, value);
        // No receivers is fine (engine not started yet)
        let _ = self.events_tx.send(event);
    }

    /// Write a restored document without broadcasting. Restore applies must
    /// not re-dirty the category they just restored.
    pub fn apply_restored(&self, category: BackupCategory, value: Value) {
        self.write().insert(category, value);
    }

    /// Subscribe to the mutation feed.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events_tx.subscribe()
    }
}

impl Default for DomainStateHandle {
    fn default() -> Self {
        Self::new()
    }
}
