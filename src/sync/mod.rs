//! Offline sync for CasaLink writes.
//!
//! - `queue`: durable FIFO of pending operations plus the attention list
//! - `connectivity`: host-signal driven online/offline monitor
//! - `dispatcher`: runs writes directly or queues them
//! - `engine`: ordered, stop-on-first-failure replay
//!
//! `SyncDaemon` ties them together in a tokio task that drains the queue
//! whenever connectivity returns or a manual sync is requested.

pub mod connectivity;
pub mod dispatcher;
pub mod engine;
pub mod queue;

pub use connectivity::ConnectivityMonitor;
pub use dispatcher::{MutationDispatcher, MutationError, MutationOutcome, OutcomeTag};
pub use engine::{DrainOutcome, EngineState, SyncEngine};
pub use queue::{
    FailureDisposition, Mutation, OperationKind, OperationQueue, PendingOperation,
    QuarantinedEntry, QueueError,
};

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::api::RemoteStore;

/// Channel sender type for requesting a drain. Capacity 1: requests made
/// while one is already pending coalesce.
pub type SyncTrigger = mpsc::Sender<()>;

/// Create a trigger and the receiver the daemon listens on.
pub fn sync_channel() -> (SyncTrigger, mpsc::Receiver<()>) {
    mpsc::channel(1)
}

/// The background sync daemon.
///
/// Runs in a tokio task, draining the queue on connectivity transitions and
/// on manual "sync now" requests. Drains run one at a time inside the loop,
/// so triggers that arrive mid-drain wait for it to finish.
pub struct SyncDaemon<R: RemoteStore> {
    engine: Arc<SyncEngine<R>>,
    /// Fired by the connectivity monitor on offline -> online.
    connectivity_rx: mpsc::Receiver<()>,
    /// Manual triggers (UI "Sync now", writes queued while online, retries).
    sync_now_rx: mpsc::Receiver<()>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl<R: RemoteStore> SyncDaemon<R> {
    pub fn new(
        engine: Arc<SyncEngine<R>>,
        connectivity_rx: mpsc::Receiver<()>,
        sync_now_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            engine,
            connectivity_rx,
            sync_now_rx,
            shutdown_rx: None,
        }
    }

    /// Stop the loop when the returned sender fires (or is dropped). A drain
    /// in progress finishes first.
    pub fn shutdown_handle(&mut self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.shutdown_rx = Some(rx);
        tx
    }

    /// Main run loop. Call from a spawned tokio task.
    ///
    /// Uses `tokio::select!` to wait on a connectivity trigger, a manual
    /// trigger, or shutdown. Starts with one drain so writes queued before a
    /// restart go out without waiting for a network transition.
    pub async fn run(mut self) {
        log::info!("Sync daemon started");
        self.drain("startup").await;

        let mut shutdown = self.shutdown_rx.take();
        loop {
            tokio::select! {
                Some(()) = self.connectivity_rx.recv() => {
                    log::info!("Connectivity restored, draining queue");
                    self.drain("reconnect").await;
                }
                Some(()) = self.sync_now_rx.recv() => {
                    log::info!("Manual sync triggered");
                    self.drain("manual").await;
                }
                _ = wait_for_shutdown(&mut shutdown), if shutdown.is_some() => {
                    break;
                }
                else => break,
            }
        }
        log::info!("Sync daemon stopped");
    }

    async fn drain(&self, reason: &str) {
        match self.engine.drain().await {
            Ok(DrainOutcome::Completed { replayed }) if replayed > 0 => {
                log::info!("Sync ({}) complete: {} writes applied", reason, replayed);
            }
            Ok(DrainOutcome::Completed { .. }) => {
                log::debug!("Sync ({}): nothing to replay", reason);
            }
            Ok(DrainOutcome::Stopped {
                replayed,
                operation_id,
                error,
                ..
            }) => {
                log::warn!(
                    "Sync ({}) stopped after {} writes at {}: {}",
                    reason,
                    replayed,
                    operation_id,
                    error
                );
            }
            Ok(DrainOutcome::AlreadyDraining) => {
                log::debug!("Sync ({}) skipped, drain already running", reason);
            }
            Ok(DrainOutcome::Offline) => {
                log::debug!("Sync ({}) skipped, offline", reason);
            }
            Err(e) => {
                log::error!("Sync ({}) aborted, queue storage failed: {}", reason, e);
            }
        }
    }
}

async fn wait_for_shutdown(rx: &mut Option<oneshot::Receiver<()>>) {
    if let Some(rx) = rx {
        let _ = rx.await;
    }
}
