//! Engine facade: wires the tracker, scheduler, transports and restore
//! orchestrator together behind the small surface the wallet calls.
//!
//! Everything is injected at construction time (domain handle, identity,
//! notification sink, and optionally the transports), so the engine runs in
//! tests without any real network or key material.

use crate::config::Config;
use crate::domain::DomainStateHandle;
use crate::identity::IdentityProvider;
use crate::notify::NotificationSink;
use crate::registry::{BackupCategory, CategoryRegistry, Network};
use crate::restore::{RestoreOrchestrator, RestoreReport};
use crate::scheduler::{BackupScheduler, SchedulerSettings};
use crate::state::{SyncState, SyncStateStore};
use crate::tracker::DirtyTracker;
use crate::transport::client::HttpBackupTransport;
use crate::transport::legacy::LegacyBackupTransport;
use crate::transport::BackupTransport;
use crate::utils::errors::{EngineError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct BackupEngine {
    network: Network,
    domain: DomainStateHandle,
    store: Arc<SyncStateStore>,
    scheduler: Arc<BackupScheduler>,
    restore: RestoreOrchestrator,
    identity: Arc<dyn IdentityProvider>,
    dirty_tx: mpsc::UnboundedSender<BackupCategory>,
    /// Consumed by `start`; present only before the engine runs.
    dirty_rx: Mutex<Option<mpsc::UnboundedReceiver<BackupCategory>>>,
    shutdown: CancellationToken,
}

impl BackupEngine {
    /// Build the engine with HTTP transports from config. Also installs the
    /// tracing subscriber per `[log]` unless the embedding app already did.
    pub fn new(
        config: &Config,
        domain: DomainStateHandle,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        crate::utils::logger::init(&config.log.level);

        let timeout = config.sync.transport_timeout();
        let current: Arc<dyn BackupTransport> = Arc::new(HttpBackupTransport::new(
            &config.server.url,
            identity.clone(),
            timeout,
        )?);
        let legacy: Option<Arc<dyn BackupTransport>> = match &config.server.legacy_url {
            Some(url) => Some(Arc::new(LegacyBackupTransport::new(
                url,
                identity.clone(),
                timeout,
            )?)),
            None => None,
        };
        Self::with_transports(config, domain, identity, notifier, current, legacy)
    }

    /// Build the engine around caller-supplied transports (tests, custom
    /// stores).
    pub fn with_transports(
        config: &Config,
        domain: DomainStateHandle,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSink>,
        current: Arc<dyn BackupTransport>,
        legacy: Option<Arc<dyn BackupTransport>>,
    ) -> Result<Self> {
        let network = config.engine.network;
        let store = Arc::new(SyncStateStore::new());
        let registry = Arc::new(CategoryRegistry::new(domain.clone()));

        let scheduler = Arc::new(BackupScheduler::new(
            SchedulerSettings::from(&config.sync),
            network,
            store.clone(),
            registry.clone(),
            current.clone(),
            notifier,
        ));

        let restore = RestoreOrchestrator::new(
            registry,
            store.clone(),
            current,
            legacy,
            network,
        );

        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();

        Ok(Self {
            network,
            domain,
            store,
            scheduler,
            restore,
            identity,
            dirty_tx,
            dirty_rx: Mutex::new(Some(dirty_rx)),
            shutdown: CancellationToken::new(),
        })
    }

    /// Wait for the identity, then spawn the dirty tracker and scheduler
    /// background tasks. Call once.
    pub async fn start(&self) -> Result<()> {
        self.identity.ready().await?;

        let dirty_rx = self
            .dirty_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| EngineError::Config("engine already started".to_string()))?;

        let tracker = DirtyTracker::new(self.store.clone(), self.dirty_tx.clone());
        tokio::spawn(tracker.run(self.domain.subscribe(), self.shutdown.child_token()));
        tokio::spawn(
            self.scheduler
                .clone()
                .run(dirty_rx, self.shutdown.child_token()),
        );

        info!(network = %self.network, "backup engine started");
        Ok(())
    }

    /// Manually mark a category dirty and let the scheduler pick it up
    /// (manual "retry" action).
    pub fn force_backup(&self, category: BackupCategory) {
        info!(category = %category, "backup forced");
        self.store.mark_required(category);
        let _ = self.dirty_tx.send(category);
    }

    /// Reconstruct local state from the remote store. Errors only when the
    /// identity cannot be brought up at all; per-category problems live in
    /// the report.
    pub async fn restore_all(&self) -> Result<RestoreReport> {
        self.identity.ready().await?;
        self.restore.restore_all().await
    }

    /// Read-only per-category sync state, for status/diagnostics screens.
    pub fn status(&self) -> HashMap<BackupCategory, SyncState> {
        self.store.snapshot()
    }

    /// Wipe-all signal: reset sync state to defaults and abandon in-flight
    /// uploads without treating that abandonment as failure.
    pub fn wipe(&self) {
        info!("wipe signal received, resetting backup sync state");
        self.scheduler.abandon_uploads();
        self.store.reset();
    }

    /// Stop background tasks and close the identity.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        self.identity.close().await
    }
}
