//! The background daemon: one process per user that owns the single write
//! path to the remote provider, woken by a timer, an IPC notify, or a
//! shutdown request.

pub mod client;
pub mod ipc;

pub use client::DaemonClient;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};

use crate::daemon::ipc::{Request, Response};
use crate::error::{Error, Result};
use crate::journal::SyncJournal;
use crate::provider::RemoteProvider;
use crate::store::TaskStore;
use crate::sync::engine::{SyncEngine, SyncEngineConfig};
use crate::sync::progress::{feedback_channel, FeedbackReceiver, FeedbackSender, SyncProgress};
use crate::utils::Cancellation;

#[derive(Clone, Copy, Debug)]
pub struct DaemonConfig {
    pub interval: Duration,
    pub heartbeat_interval: Duration,
    /// Exit cleanly after this much inactivity. Zero disables the timeout.
    pub idle_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(60),
            idle_timeout: Duration::ZERO,
        }
    }
}

struct SharedStatus {
    sync_count: u64,
    last_sync: Option<chrono::DateTime<Utc>>,
}

/// One running daemon instance. Constructed, then consumed by [`Daemon::run`].
pub struct Daemon {
    store: TaskStore,
    journal: SyncJournal,
    provider: Arc<dyn RemoteProvider + Send + Sync>,
    sync_config: SyncEngineConfig,
    daemon_config: DaemonConfig,
    pid_path: PathBuf,
    socket_path: PathBuf,
    heartbeat_path: PathBuf,
    feedback_tx: FeedbackSender,
}

impl Daemon {
    pub fn new(
        store: TaskStore,
        journal: SyncJournal,
        provider: Arc<dyn RemoteProvider + Send + Sync>,
        sync_config: SyncEngineConfig,
        daemon_config: DaemonConfig,
        pid_path: PathBuf,
        socket_path: PathBuf,
        heartbeat_path: PathBuf,
    ) -> Self {
        let (feedback_tx, _rx) = feedback_channel();
        Self {
            store,
            journal,
            provider,
            sync_config,
            daemon_config,
            pid_path,
            socket_path,
            heartbeat_path,
            feedback_tx,
        }
    }

    /// Subscribe to sync progress events, observed externally by whatever
    /// notification sink the caller wires up (a desktop notifier, a log
    /// sink, a test probe). The daemon only ever produces events here.
    pub fn subscribe(&self) -> FeedbackReceiver {
        self.feedback_tx.subscribe()
    }

    /// Claim the PID file and listening socket, refusing if a daemon is
    /// already live, then run the sync loop until told to stop.
    pub async fn start(self) -> Result<()> {
        let client = DaemonClient::new(self.pid_path.clone(), self.socket_path.clone());
        if client.is_running().await {
            return Err(Error::Fatal("a daemon is already running".into()));
        }
        std::fs::write(&self.pid_path, std::process::id().to_string()).map_err(|source| {
            Error::StorageIo {
                path: self.pid_path.clone(),
                source,
            }
        })?;
        let listener = ipc::bind(&self.socket_path).await?;
        let result = self.run(listener).await;
        let _ = std::fs::remove_file(&self.pid_path);
        let _ = std::fs::remove_file(&self.socket_path);
        result
    }

    async fn run(&self, listener: UnixListener) -> Result<()> {
        let status = Arc::new(AsyncMutex::new(SharedStatus {
            sync_count: 0,
            last_sync: self.journal.last_sync().unwrap_or(None),
        }));
        let notify = Arc::new(Notify::new());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let interval_sec = self.daemon_config.interval.as_secs();

        let accept_status = Arc::clone(&status);
        let accept_notify = Arc::clone(&notify);
        let accept_handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let request = match ipc::read_request(&mut stream).await {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                match request {
                    Request::Notify => {
                        // `notify_one` coalesces: a burst of notifies before the
                        // run loop gets back around to its `select!` collapses
                        // into a single pending wake, not one cycle per call.
                        accept_notify.notify_one();
                        let _ = ipc::write_response(&mut stream, &Response::ok(true, 0, None, interval_sec)).await;
                    }
                    Request::Stop => {
                        let _ = shutdown_tx.send(()).await;
                        let _ = ipc::write_response(&mut stream, &Response::ok(true, 0, None, interval_sec)).await;
                    }
                    Request::Status => {
                        let guard = accept_status.lock().await;
                        let response = Response::ok(
                            true,
                            guard.sync_count,
                            guard.last_sync.map(|t| t.to_rfc3339()),
                            interval_sec,
                        );
                        let _ = ipc::write_response(&mut stream, &response).await;
                    }
                }
            }
        });

        let mut interval_timer = tokio::time::interval(self.daemon_config.interval);
        let mut heartbeat_timer = tokio::time::interval(self.daemon_config.heartbeat_interval);
        let mut last_activity = Instant::now();

        loop {
            let idle_deadline = if self.daemon_config.idle_timeout.is_zero() {
                None
            } else {
                Some(tokio::time::sleep(
                    self.daemon_config
                        .idle_timeout
                        .saturating_sub(last_activity.elapsed()),
                ))
            };

            tokio::select! {
                _ = interval_timer.tick() => {
                    self.cycle(&status).await;
                    last_activity = Instant::now();
                }
                _ = notify.notified() => {
                    self.cycle(&status).await;
                    last_activity = Instant::now();
                }
                _ = heartbeat_timer.tick() => {
                    self.write_heartbeat();
                }
                _ = shutdown_rx.recv() => {
                    log::info!("daemon received stop request");
                    break;
                }
                _ = async { if let Some(d) = idle_deadline { d.await } else { std::future::pending::<()>().await } } => {
                    log::info!("daemon idle timeout elapsed, exiting");
                    break;
                }
            }
        }

        accept_handle.abort();
        Ok(())
    }

    async fn cycle(&self, status: &Arc<AsyncMutex<SharedStatus>>) {
        let mut progress = SyncProgress::with_feedback_channel(self.feedback_tx.clone());
        let engine = SyncEngine::new(&self.store, &self.journal, self.provider.as_ref(), self.sync_config);
        let cancel = Cancellation::new();
        match engine.reconcile(&mut progress, &cancel).await {
            Ok(report) => {
                log::info!(
                    "sync cycle complete: pushed={} push_errors={} pulled_new={} pulled_updated={} pulled_deleted={}",
                    report.pushed, report.push_errors, report.pulled_new, report.pulled_updated, report.pulled_deleted
                );
            }
            Err(e) => log::error!("sync cycle failed: {e}"),
        }
        let mut guard = status.lock().await;
        guard.sync_count += 1;
        guard.last_sync = self.journal.last_sync().ok().flatten();
    }

    fn write_heartbeat(&self) {
        let _ = std::fs::write(&self.heartbeat_path, Utc::now().to_rfc3339());
    }
}
