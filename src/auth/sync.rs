//! Authorization data synchronizer
//!
//! Polls the remote source on a fixed interval, compares the version hash
//! with the one currently published, and swaps in a freshly decoded snapshot
//! only when it changed. A failed cycle keeps the previous snapshot and is
//! retried exactly one interval later.
//!
//! The current snapshot lives in an [`ArcSwap`]: a single writer replaces the
//! whole value, readers never block and never see a partial update.

use crate::auth::snapshot::Snapshot;
use crate::auth::source::AuthSource;
use crate::error::Result;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Read-only access to the currently published snapshot
#[derive(Clone)]
pub struct SnapshotHandle {
    current: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotHandle {
    /// Handle over a fixed snapshot, not connected to any synchronizer
    pub fn fixed(snapshot: Snapshot) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    /// Latest published snapshot
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Version hash of the latest published snapshot
    pub fn version(&self) -> String {
        self.current.load().version().to_string()
    }
}

/// What a synchronization cycle did
///
/// A failed master password refresh does not change the outcome; it is
/// counted in [`SyncStatus::master_password_failures`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Hash matched the published snapshot
    Unchanged,
    /// A new snapshot was published under `version`
    Updated { version: String },
    /// Only the master password changed
    MasterPasswordUpdated,
}

/// Synchronization health, for logging
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub version: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub updates: u64,
    /// Cycles whose master password refresh failed
    pub master_password_failures: u64,
}

/// State shared between the synchronizer and its background task
#[derive(Clone)]
struct SyncWorker {
    source: Arc<dyn AuthSource>,
    current: Arc<ArcSwap<Snapshot>>,
    status: Arc<Mutex<SyncStatus>>,
}

impl SyncWorker {
    async fn sync_once(&self) -> Result<SyncOutcome> {
        let current = self.current.load_full();
        let mut outcome = SyncOutcome::Unchanged;
        let mut next: Option<Snapshot> = None;

        let master = self.source.fetch_master_password().await;

        let failure = match self.source.fetch_version().await {
            Ok(version) if version == current.version() => {
                debug!("Auth hash unchanged ({})", version);
                None
            }
            Ok(version) => match self.source.fetch_snapshot(&version).await {
                Ok(snapshot) => {
                    outcome = SyncOutcome::Updated { version };
                    next = Some(snapshot);
                    None
                }
                Err(e) => Some(e),
            },
            Err(e) => Some(e),
        };

        // The master password endpoint is best effort and never fails the cycle
        let master_password = match master {
            Ok(password) => password,
            Err(e) => {
                warn!(
                    "Failed to refresh master password, keeping the current one: {}",
                    e
                );
                lock(&self.status).master_password_failures += 1;
                next.as_ref()
                    .map(|_| current.master_password().to_string())
            }
        };

        if let Some(password) = master_password {
            match next.take() {
                Some(snapshot) => next = Some(snapshot.with_master_password(password)),
                None if password != current.master_password() => {
                    next = Some(Snapshot::clone(&current).with_master_password(password));
                    outcome = SyncOutcome::MasterPasswordUpdated;
                }
                None => {}
            }
        }

        if let Some(snapshot) = next {
            self.publish(snapshot);
        }

        self.record(failure.is_none(), &outcome);

        match failure {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        info!(
            "Publishing auth snapshot {} ({} proxies, {} credentials, {} allowlisted IPs, {} backconnect servers)",
            snapshot.version(),
            snapshot.proxy_count(),
            snapshot.credential_count(),
            snapshot.allowed_ip_count(),
            snapshot.backconnect_servers().len()
        );
        self.current.store(Arc::new(snapshot));
    }

    fn record(&self, success: bool, outcome: &SyncOutcome) {
        let now = Utc::now();
        let version = self.current.load().version().to_string();
        let mut status = lock(&self.status);

        status.last_attempt = Some(now);
        if !version.is_empty() {
            status.version = Some(version);
        }
        if *outcome != SyncOutcome::Unchanged {
            status.updates += 1;
        }
        if success {
            status.last_success = Some(now);
            status.consecutive_failures = 0;
        } else {
            status.consecutive_failures += 1;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct BackgroundTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owner of the published snapshot and of the polling task
pub struct Synchronizer {
    worker: SyncWorker,
    interval: Duration,
    task: Mutex<Option<BackgroundTask>>,
}

impl Synchronizer {
    /// Create a synchronizer with an empty snapshot published
    pub fn new(source: Arc<dyn AuthSource>, interval: Duration) -> Self {
        Self {
            worker: SyncWorker {
                source,
                current: Arc::new(ArcSwap::from_pointee(Snapshot::empty())),
                status: Arc::new(Mutex::new(SyncStatus::default())),
            },
            interval,
            task: Mutex::new(None),
        }
    }

    /// Read-only handle for decision makers
    pub fn handle(&self) -> SnapshotHandle {
        SnapshotHandle {
            current: Arc::clone(&self.worker.current),
        }
    }

    pub fn status(&self) -> SyncStatus {
        lock(&self.worker.status).clone()
    }

    /// Run one synchronization cycle now
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        self.worker.sync_once().await
    }

    /// Synchronous first cycle at startup
    ///
    /// Failure is logged and returned; the empty snapshot stays published and
    /// the background task keeps retrying.
    pub async fn initial_sync(&self) -> Result<SyncOutcome> {
        info!("Running initial auth synchronization");
        match self.worker.sync_once().await {
            Ok(outcome) => {
                info!("Initial auth synchronization complete: {:?}", outcome);
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    "Initial auth synchronization failed ({}): {}; denying until the next successful cycle",
                    e.category(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Spawn the polling task; does nothing if it is already running
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.is_some() {
            debug!("Background synchronization already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let worker = self.worker.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            info!("Background auth synchronization started (every {:?})", interval);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }

                match worker.sync_once().await {
                    Ok(outcome) => debug!("Auth synchronization cycle: {:?}", outcome),
                    Err(e) if e.is_retryable() => warn!(
                        "Auth synchronization cycle failed ({}): {}; keeping snapshot {:?}",
                        e.category(),
                        e,
                        worker.current.load().version()
                    ),
                    Err(e) => error!(
                        "Auth synchronization cycle failed and will not recover by retrying ({}): {}; keeping snapshot {:?}",
                        e.category(),
                        e,
                        worker.current.load().version()
                    ),
                }
            }
            info!("Background auth synchronization stopped");
        });

        *task = Some(BackgroundTask { shutdown, handle });
    }

    /// Signal the polling task and wait for it to finish
    pub async fn stop(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                warn!("Background synchronization task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).is_some()
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.handle.abort();
        }
    }
}
