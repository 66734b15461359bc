//! Background reconciliation of the offline cache with the remote store.
//!
//! The loop runs only while a principal is signed in: one pass right away,
//! then one per interval. Passes never overlap; a tick that arrives while a
//! pass is still running is skipped. Failed passes are reported and retried
//! on the next tick, the loop itself never stops because of them.

pub mod cache;
pub mod notify;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::persistence::StorageError;
use crate::remote::RemoteError;
use crate::session::{next_transition, SessionState, SessionStore};

pub use cache::{AccessTokenSource, CacheReconciler, LocalCache, PendingRecord, RemoteStore};
pub use notify::{Notification, NotificationFeed, NotificationLevel, Notifier};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Remote store rejected sync: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local cache unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("Sync pass aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pushed: usize,
    pub tables: usize,
}

/// One reconciliation pass against the remote store
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self) -> Result<SyncReport, SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub active: bool,
    /// In-memory cursor, reset for every new signed-in session
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_report: Option<SyncReport>,
    pub passes: u64,
    pub failures: u64,
    pub skipped: u64,
    #[serde(skip)]
    generation: u64,
    /// Generation the running pass was started for
    #[serde(skip)]
    running: u64,
    /// A pass for the current generation waits on a stale one
    #[serde(skip)]
    queued: bool,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            active: false,
            last_success: None,
            last_error: None,
            last_report: None,
            passes: 0,
            failures: 0,
            skipped: 0,
            generation: 0,
            running: 0,
            queued: false,
        }
    }
}

/// Owner-side handle; dropping it stops the loop
pub struct SyncHandle {
    shared: Arc<Mutex<SyncSnapshot>>,
    trigger: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn snapshot(&self) -> SyncSnapshot {
        self.shared.lock().clone()
    }

    /// Request an immediate pass; ignored while signed out.
    /// Returns false when a request is already queued or the loop is gone.
    pub fn trigger(&self) -> bool {
        self.trigger.try_send(()).is_ok()
    }

    /// Stop scheduling passes. A pass already running is left to finish.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
        let mut snapshot = self.shared.lock();
        snapshot.active = false;
        snapshot.queued = false;
    }
}

pub struct SyncLoop {
    sessions: Arc<dyn SessionStore>,
    period: Duration,
    shared: Arc<Mutex<SyncSnapshot>>,
    runner: PassRunner,
}

/// Starts passes; cloned into each pass task so a finished stale pass can start the queued one
#[derive(Clone)]
struct PassRunner {
    reconciler: Arc<dyn Reconciler>,
    notifier: Arc<dyn Notifier>,
    notify_failures: bool,
    shared: Arc<Mutex<SyncSnapshot>>,
}

/// Ticker bound to the principal it was started for
struct ActiveSession {
    principal: Uuid,
    ticker: Interval,
}

impl SyncLoop {
    pub fn spawn(
        sessions: Arc<dyn SessionStore>,
        reconciler: Arc<dyn Reconciler>,
        notifier: Arc<dyn Notifier>,
        config: &SyncConfig,
    ) -> SyncHandle {
        let shared = Arc::new(Mutex::new(SyncSnapshot::default()));
        let (trigger, triggers) = mpsc::channel(1);

        let sync_loop = SyncLoop {
            sessions,
            period: config.interval(),
            shared: shared.clone(),
            runner: PassRunner {
                reconciler,
                notifier,
                notify_failures: config.notify_failures,
                shared: shared.clone(),
            },
        };

        tracing::info!("Starting sync loop (interval {:?})", sync_loop.period);
        let task = tokio::spawn(sync_loop.run(triggers));

        SyncHandle { shared, trigger, task }
    }

    async fn run(self, mut triggers: mpsc::Receiver<()>) {
        let mut events = self.sessions.subscribe();
        let mut active: Option<ActiveSession> = None;
        self.apply(&self.sessions.current(), &mut active);

        loop {
            tokio::select! {
                transition = next_transition(self.sessions.as_ref(), &mut events) => {
                    match transition {
                        Some(state) => self.apply(&state, &mut active),
                        None => break,
                    }
                }
                _ = next_tick(&mut active) => self.runner.start("interval"),
                Some(()) = triggers.recv() => {
                    if active.is_some() {
                        self.runner.start("manual");
                    } else {
                        tracing::debug!("Manual sync ignored: no signed-in principal");
                    }
                }
            }
        }

        tracing::debug!("Sync loop stopped: session store closed");
    }

    fn apply(&self, state: &SessionState, active: &mut Option<ActiveSession>) {
        match state.principal() {
            Some(principal) => {
                if active.as_ref().map(|session| session.principal) == Some(principal.id) {
                    return;
                }

                let mut ticker = tokio::time::interval(self.period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *active = Some(ActiveSession {
                    principal: principal.id,
                    ticker,
                });

                let mut snapshot = self.shared.lock();
                snapshot.generation += 1;
                snapshot.active = true;
                snapshot.last_success = None;
                snapshot.last_error = None;
                snapshot.last_report = None;
                tracing::info!("Sync enabled for {}", principal.id);
            }
            None => {
                if active.take().is_some() {
                    let mut snapshot = self.shared.lock();
                    snapshot.active = false;
                    snapshot.queued = false;
                    tracing::info!("Sync paused: no signed-in principal");
                }
            }
        }
    }
}

impl PassRunner {
    fn start(&self, reason: &'static str) {
        let generation = {
            let mut snapshot = self.shared.lock();
            if snapshot.status == SyncStatus::Syncing {
                if snapshot.running == snapshot.generation {
                    snapshot.skipped += 1;
                    tracing::debug!("Sync pass ({}) skipped: previous pass still running", reason);
                } else {
                    snapshot.queued = true;
                    tracing::debug!("Sync pass ({}) queued behind a pass from the previous session", reason);
                }
                return;
            }
            snapshot.status = SyncStatus::Syncing;
            snapshot.running = snapshot.generation;
            snapshot.generation
        };

        tracing::debug!("Sync pass started ({})", reason);

        let runner = self.clone();

        // Detached so stopping the loop never cuts a pass short
        tokio::spawn(async move {
            let reconciler = runner.reconciler.clone();
            let result = match tokio::spawn(async move { reconciler.reconcile().await }).await {
                Ok(result) => result,
                Err(e) => Err(SyncError::Aborted(e.to_string())),
            };

            let (failure, rerun) = {
                let mut snapshot = runner.shared.lock();
                snapshot.status = SyncStatus::Idle;
                snapshot.passes += 1;
                let current = snapshot.generation == generation;

                let failure = match result {
                    Ok(report) => {
                        tracing::info!(
                            "Sync pass completed: {} records across {} tables",
                            report.pushed,
                            report.tables
                        );
                        if current {
                            snapshot.last_success = Some(Utc::now());
                            snapshot.last_error = None;
                            snapshot.last_report = Some(report);
                        }
                        None
                    }
                    Err(e) => {
                        snapshot.failures += 1;
                        if current {
                            snapshot.last_error = Some(e.to_string());
                        }
                        Some(e)
                    }
                };

                let rerun = std::mem::take(&mut snapshot.queued) && snapshot.active;
                (failure, rerun)
            };

            if let Some(e) = failure {
                tracing::warn!("Sync pass failed, retrying next interval: {}", e);
                if runner.notify_failures {
                    runner.notifier.notify(Notification::error(format!("Sync failed: {}", e)));
                }
            }

            if rerun {
                runner.start("queued");
            }
        });
    }
}

async fn next_tick(active: &mut Option<ActiveSession>) {
    match active {
        Some(session) => {
            session.ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
