//! Debounced, retrying backup scheduler.
//!
//! One long-lived loop serves all categories: dirty nudges restart that
//! category's debounce deadline, a low-frequency sweep re-checks everything
//! still dirty (so a failed upload keeps retrying without new mutations),
//! and a category continuously dirty past the escalation threshold produces
//! a recurring user-visible warning. Uploads run as spawned per-category
//! tasks, concurrent across categories but never within one (the sync-state
//! `running` gate enforces that), and the loop itself never awaits network
//! I/O.

use crate::config::SyncConfig;
use crate::notify::NotificationSink;
use crate::registry::{BackupCategory, CategoryRegistry, Network};
use crate::state::SyncStateStore;
use crate::transport::payload::BackupPayload;
use crate::transport::BackupTransport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scheduler timing knobs, all taken from `[sync]` config.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Quiescence window collapsing a burst of dirty-marks into one upload.
    pub debounce: Duration,
    /// Periodic re-check of all dirty, not-running categories.
    pub sweep_interval: Duration,
    /// Continuous dirtiness beyond this emits a user-visible warning.
    pub escalation_threshold: Duration,
    /// Minimum gap between repeated warnings for the same category.
    pub warning_repeat: Duration,
    /// Per-call bound on transport uploads.
    pub upload_timeout: Duration,
}

impl From<&SyncConfig> for SchedulerSettings {
    fn from(sync: &SyncConfig) -> Self {
        Self {
            debounce: sync.debounce(),
            sweep_interval: non_zero(sync.sweep_interval()),
            escalation_threshold: sync.escalation_threshold(),
            warning_repeat: sync.warning_repeat(),
            upload_timeout: non_zero(sync.transport_timeout()),
        }
    }
}

/// `tokio::time::interval` panics on a zero period, and a zero timeout would
/// fail every upload; a misconfigured zero falls back to one second.
fn non_zero(d: Duration) -> Duration {
    if d.is_zero() {
        Duration::from_secs(1)
    } else {
        d
    }
}

/// Per-category escalation bookkeeping, kept on the loop's monotonic clock.
struct Escalation {
    dirty_since: Instant,
    last_warned: Option<Instant>,
    /// `synced` as observed when the current dirtiness span started; an
    /// advance means an upload succeeded in between sweeps.
    last_synced: u64,
}

pub struct BackupScheduler {
    settings: SchedulerSettings,
    network: Network,
    store: Arc<SyncStateStore>,
    registry: Arc<CategoryRegistry>,
    transport: Arc<dyn BackupTransport>,
    notifier: Arc<dyn NotificationSink>,
    /// Parent token for in-flight upload tasks; swapped on wipe so those
    /// tasks are abandoned without counting as failures.
    uploads: Mutex<CancellationToken>,
}

impl BackupScheduler {
    pub fn new(
        settings: SchedulerSettings,
        network: Network,
        store: Arc<SyncStateStore>,
        registry: Arc<CategoryRegistry>,
        transport: Arc<dyn BackupTransport>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            settings,
            network,
            store,
            registry,
            transport,
            notifier,
            uploads: Mutex::new(CancellationToken::new()),
        }
    }

    /// Abandon every in-flight upload (wipe path). The abandoned categories
    /// are not marked failed; the store reset that accompanies a wipe
    /// makes the question moot.
    pub fn abandon_uploads(&self) {
        let mut guard = self.uploads.lock().unwrap_or_else(|e| e.into_inner());
        let old = std::mem::replace(&mut *guard, CancellationToken::new());
        old.cancel();
    }

    fn upload_token(&self) -> CancellationToken {
        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .child_token()
    }

    /// Run the scheduler until shutdown. `dirty_rx` carries nudges from the
    /// dirty tracker and from manual force-backup calls.
    pub async fn run(
        self: Arc<Self>,
        mut dirty_rx: mpsc::UnboundedReceiver<BackupCategory>,
        shutdown: CancellationToken,
    ) {
        info!(
            debounce_ms = self.settings.debounce.as_millis() as u64,
            sweep_ms = self.settings.sweep_interval.as_millis() as u64,
            network = %self.network,
            "backup scheduler started"
        );

        let mut deadlines: HashMap<BackupCategory, Instant> = HashMap::new();
        let mut escalation: HashMap<BackupCategory, Escalation> = HashMap::new();

        // First tick a full interval out: an interval's immediate first tick
        // would sweep categories already dirty at startup past their
        // debounce window.
        let mut sweep = interval_at(
            Instant::now() + self.settings.sweep_interval,
            self.settings.sweep_interval,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_deadline = deadlines.values().min().copied();
            let debounce_fired = async {
                match next_deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("backup scheduler shutting down");
                    return;
                }

                Some(category) = dirty_rx.recv() => {
                    // A fresh mark restarts the quiescence window rather
                    // than queueing an extra upload.
                    deadlines.insert(category, Instant::now() + self.settings.debounce);
                }

                _ = debounce_fired => {
                    let now = Instant::now();
                    let due: Vec<BackupCategory> = deadlines
                        .iter()
                        .filter(|(_, at)| **at <= now)
                        .map(|(category, _)| *category)
                        .collect();
                    for category in due {
                        deadlines.remove(&category);
                        self.start_upload(category);
                    }
                }

                _ = sweep.tick() => {
                    self.sweep_once(&deadlines, &mut escalation);
                }
            }
        }
    }

    /// One pass over every category: retry anything dirty and idle, and
    /// escalate anything that has been failing for too long.
    fn sweep_once(
        self: &Arc<Self>,
        deadlines: &HashMap<BackupCategory, Instant>,
        escalation: &mut HashMap<BackupCategory, Escalation>,
    ) {
        let now = Instant::now();

        for category in BackupCategory::ALL {
            let record = self.store.get(category);

            if !record.needs_backup() {
                escalation.remove(&category);
                continue;
            }

            let entry = escalation.entry(category).or_insert(Escalation {
                dirty_since: now,
                last_warned: None,
                last_synced: record.synced,
            });

            // An upload succeeded since the last sweep, so whatever is dirty
            // now is newer than that upload. A busy category whose backups
            // keep landing is not "continuously failing": restart the span.
            if record.synced != entry.last_synced {
                entry.dirty_since = now;
                entry.last_warned = None;
                entry.last_synced = record.synced;
            }

            // Silent retry, independent of new mutations. A pending debounce
            // deadline means an upload is about to start anyway.
            if !record.running && !deadlines.contains_key(&category) {
                debug!(category = %category, failures = record.failures, "sweep retrying dirty category");
                self.start_upload(category);
            }

            // Auth failures escalate immediately: indefinite silent retry of
            // a key mismatch would delay diagnosis by half an hour.
            let overdue = now.duration_since(entry.dirty_since) >= self.settings.escalation_threshold;
            let rate_ok = entry
                .last_warned
                .map_or(true, |at| now.duration_since(at) >= self.settings.warning_repeat);

            if (overdue || record.auth_failure) && rate_ok {
                entry.last_warned = Some(now);
                error!(
                    category = %category,
                    failures = record.failures,
                    auth = record.auth_failure,
                    "backup keeps failing, warning user"
                );
                self.notifier.warn(
                    "Backup not working",
                    &format!("The {category} backup could not be saved to the server. Retrying..."),
                );
            }
        }
    }

    /// Begin an upload for one category if it is dirty and idle. Collect is
    /// synchronous and fast; the network call runs in a spawned task so the
    /// scheduler loop never blocks on I/O.
    fn start_upload(self: &Arc<Self>, category: BackupCategory) {
        let Some(observed_required) = self.store.try_begin(category) else {
            // Already running or no longer dirty
            return;
        };

        let bytes = match self
            .registry
            .collect(category)
            .and_then(|data| BackupPayload::new(category, self.network, data).to_bytes())
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(category = %category, error = %e, "failed to collect backup payload");
                self.store.mark_failed(category, false);
                return;
            }
        };

        let token = self.upload_token();
        let this = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(category = %category, "upload abandoned");
                    this.store.abandon(category);
                }

                result = timeout(
                    this.settings.upload_timeout,
                    this.transport.upload(category, this.network, &bytes),
                ) => match result {
                    Ok(Ok(timestamp)) => {
                        this.store.mark_synced(category, timestamp, observed_required);
                        debug!(category = %category, timestamp, "backup uploaded");
                    }
                    Ok(Err(e)) => {
                        warn!(category = %category, error = %e, "backup upload failed");
                        this.store.mark_failed(category, e.is_auth());
                    }
                    Err(_) => {
                        warn!(
                            category = %category,
                            timeout_ms = this.settings.upload_timeout.as_millis() as u64,
                            "backup upload timed out"
                        );
                        this.store.mark_failed(category, false);
                    }
                },
            }
        });
    }
}
