//! Dirty tracker: observes domain mutations and stamps the matching
//! category's sync record.
//!
//! The event-to-category mapping is declarative: each category registers the
//! set of domain events that dirty it, as data, so the mapping can be read
//! and tested per category instead of living in one big match. The tracker
//! performs no I/O itself; it stamps the sync-state store and nudges the
//! scheduler so the debounce window restarts.

use crate::domain::DomainEvent;
use crate::registry::BackupCategory;
use crate::state::SyncStateStore;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The domain events that dirty one category.
#[derive(Debug, Clone, Copy)]
pub struct CategoryTriggers {
    pub category: BackupCategory,
    pub events: &'static [DomainEvent],
}

/// Default trigger table: which mutations belong to which category.
pub const DEFAULT_TRIGGERS: &[CategoryTriggers] = &[
    CategoryTriggers {
        category: BackupCategory::Wallet,
        events: &[DomainEvent::TransferRecorded],
    },
    CategoryTriggers {
        category: BackupCategory::Settings,
        events: &[DomainEvent::SettingsChanged],
    },
    CategoryTriggers {
        category: BackupCategory::Widgets,
        events: &[
            DomainEvent::WidgetSaved,
            DomainEvent::WidgetDeleted,
            DomainEvent::FeedUpdated,
        ],
    },
    CategoryTriggers {
        category: BackupCategory::Metadata,
        events: &[
            DomainEvent::TagAdded,
            DomainEvent::TagRemoved,
            DomainEvent::PendingInvoiceUpdated,
            DomainEvent::TransactionLinkAdded,
        ],
    },
    CategoryTriggers {
        category: BackupCategory::ProviderOrders,
        events: &[DomainEvent::OrderPaid, DomainEvent::OrderStatusUpdated],
    },
    CategoryTriggers {
        category: BackupCategory::Contacts,
        events: &[
            DomainEvent::ContactAdded,
            DomainEvent::ContactEdited,
            DomainEvent::ContactDeleted,
        ],
    },
    CategoryTriggers {
        category: BackupCategory::PaymentActivity,
        events: &[DomainEvent::LightningActivityRecorded],
    },
];

pub struct DirtyTracker {
    triggers: &'static [CategoryTriggers],
    store: Arc<SyncStateStore>,
    dirty_tx: mpsc::UnboundedSender<BackupCategory>,
}

impl DirtyTracker {
    pub fn new(store: Arc<SyncStateStore>, dirty_tx: mpsc::UnboundedSender<BackupCategory>) -> Self {
        Self::with_triggers(DEFAULT_TRIGGERS, store, dirty_tx)
    }

    pub fn with_triggers(
        triggers: &'static [CategoryTriggers],
        store: Arc<SyncStateStore>,
        dirty_tx: mpsc::UnboundedSender<BackupCategory>,
    ) -> Self {
        Self {
            triggers,
            store,
            dirty_tx,
        }
    }

    /// Resolve an event to the categories it dirties.
    pub fn categories_for(&self, event: DomainEvent) -> impl Iterator<Item = BackupCategory> + '_ {
        self.triggers
            .iter()
            .filter(move |t| t.events.contains(&event))
            .map(|t| t.category)
    }

    /// Stamp the sync state for every category the event dirties and nudge
    /// the scheduler. Side effect only; no I/O.
    pub fn observe(&self, event: DomainEvent) {
        for category in self.categories_for(event) {
            debug!(category = %category, event = ?event, "domain mutation observed");
            self.store.mark_required(category);
            // Scheduler gone means we are shutting down; the stamp survives
            // in the store either way.
            let _ = self.dirty_tx.send(category);
        }
    }

    /// Consume the domain change feed until shutdown.
    pub async fn run(
        self,
        mut events_rx: broadcast::Receiver<DomainEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("dirty tracker shutting down");
                    return;
                }
                event = events_rx.recv() => match event {
                    Ok(event) => self.observe(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Coalescing makes missed events harmless as long as
                        // we conservatively re-stamp everything.
                        warn!(missed = n, "dirty tracker lagged, re-stamping all categories");
                        for category in BackupCategory::ALL {
                            self.store.mark_required(category);
                            let _ = self.dirty_tx.send(category);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("domain event feed closed, dirty tracker stopping");
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainStateHandle;
    use serde_json::json;

    fn tracker() -> (
        DirtyTracker,
        Arc<SyncStateStore>,
        mpsc::UnboundedReceiver<BackupCategory>,
    ) {
        let store = Arc::new(SyncStateStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        (DirtyTracker::new(store.clone(), tx), store, rx)
    }

    #[test]
    fn test_trigger_table_covers_every_category() {
        for category in BackupCategory::ALL {
            assert!(
                DEFAULT_TRIGGERS.iter().any(|t| t.category == category),
                "{category} has no registered triggers"
            );
        }
    }

    #[test]
    fn test_event_resolution() {
        let (tracker, _store, _rx) = tracker();
        let categories: Vec<_> = tracker.categories_for(DomainEvent::TagAdded).collect();
        assert_eq!(categories, vec![BackupCategory::Metadata]);

        let categories: Vec<_> = tracker.categories_for(DomainEvent::OrderPaid).collect();
        assert_eq!(categories, vec![BackupCategory::ProviderOrders]);
    }

    #[test]
    fn test_observe_stamps_and_nudges() {
        let (tracker, store, mut rx) = tracker();
        tracker.observe(DomainEvent::ContactEdited);

        assert!(store.needs_backup(BackupCategory::Contacts));
        assert_eq!(rx.try_recv().unwrap(), BackupCategory::Contacts);
        // Other categories untouched
        assert!(!store.needs_backup(BackupCategory::Settings));
    }

    #[tokio::test]
    async fn test_run_consumes_domain_feed() {
        let domain = DomainStateHandle::new();
        let (tracker, store, _rx) = tracker();
        let shutdown = CancellationToken::new();

        let events_rx = domain.subscribe();
        let handle = tokio::spawn(tracker.run(events_rx, shutdown.clone()));

        domain.replace(
            BackupCategory::Widgets,
            json!({"widgets": {}, "sortOrder": []}),
            DomainEvent::WidgetSaved,
        );

        // Give the tracker task a chance to observe the broadcast
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(store.needs_backup(BackupCategory::Widgets));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_apply_does_not_dirty() {
        let domain = DomainStateHandle::new();
        let (tracker, store, _rx) = tracker();
        let shutdown = CancellationToken::new();

        let events_rx = domain.subscribe();
        let handle = tokio::spawn(tracker.run(events_rx, shutdown.clone()));

        domain.apply_restored(BackupCategory::Contacts, json!({"contacts": {}}));

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!store.needs_backup(BackupCategory::Contacts));

        shutdown.cancel();
        handle.await.unwrap();
    }
}
