//! Sync engine: replays the pending queue against the remote store.
//!
//! State machine: `Idle -> Draining -> Idle`. A drain works on a snapshot of
//! the queue taken when it starts and stops at the first failure, leaving
//! that operation and everything behind it queued in their original order.
//! It is retried on the next trigger, never in a loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::{RemoteError, RemoteStore};
use crate::status::StatusBoard;

use super::connectivity::ConnectivityMonitor;
use super::dispatcher::execute;
use super::queue::{FailureDisposition, OperationQueue, QueueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Draining,
}

/// How a drain request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every operation in the snapshot was applied.
    Completed { replayed: usize },
    /// Replay stopped at `operation_id`; it and everything after it stay queued
    /// (unless `disposition` moved it to the attention list).
    Stopped {
        replayed: usize,
        operation_id: String,
        error: RemoteError,
        disposition: FailureDisposition,
    },
    /// Another drain was in progress; this request did nothing.
    AlreadyDraining,
    /// The monitor reports offline; nothing was attempted.
    Offline,
}

/// Clears the draining flag however the drain ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine<R: RemoteStore> {
    remote: Arc<R>,
    queue: Arc<OperationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    board: Arc<StatusBoard>,
    draining: AtomicBool,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(
        remote: Arc<R>,
        queue: Arc<OperationQueue>,
        monitor: Arc<ConnectivityMonitor>,
        board: Arc<StatusBoard>,
    ) -> Self {
        Self {
            remote,
            queue,
            monitor,
            board,
            draining: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> EngineState {
        if self.draining.load(Ordering::Acquire) {
            EngineState::Draining
        } else {
            EngineState::Idle
        }
    }

    /// Replay the queue in order. A call made while a drain is running
    /// returns `AlreadyDraining` immediately.
    pub async fn drain(&self) -> Result<DrainOutcome, QueueError> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Drain requested while draining, ignored");
            return Ok(DrainOutcome::AlreadyDraining);
        }
        let _guard = DrainGuard(&self.draining);

        if !self.monitor.is_online() {
            log::debug!("Drain skipped, offline");
            return Ok(DrainOutcome::Offline);
        }

        self.board.set_syncing(true);
        let result = self.replay_snapshot().await;
        self.board
            .set_counts(self.queue.len(), self.queue.attention_len());
        self.board.set_syncing(false);
        result
    }

    async fn replay_snapshot(&self) -> Result<DrainOutcome, QueueError> {
        let snapshot = self.queue.peek_all();
        if snapshot.is_empty() {
            return Ok(DrainOutcome::Completed { replayed: 0 });
        }
        log::info!("Replaying {} queued writes", snapshot.len());

        let mut replayed = 0;
        for op in snapshot {
            // Discarded or retried elsewhere since the snapshot was taken.
            if !self.queue.contains(&op.id) {
                continue;
            }

            match execute(self.remote.as_ref(), &op).await {
                Ok(record_id) => {
                    self.queue.remove(&op.id)?;
                    replayed += 1;
                    log::info!(
                        "Replayed {} ({} -> {})",
                        op.kind().label(),
                        op.id,
                        record_id
                    );
                    self.board
                        .set_counts(self.queue.len(), self.queue.attention_len());
                }
                Err(error) => {
                    let disposition = self.queue.record_failure(&op.id, &error)?;
                    if let FailureDisposition::Retained { attempts } = disposition {
                        log::warn!(
                            "Replay of {} ({}) failed, attempt {}/{}: {}",
                            op.kind().label(),
                            op.id,
                            attempts,
                            self.queue.max_attempts(),
                            error
                        );
                    }
                    return Ok(DrainOutcome::Stopped {
                        replayed,
                        operation_id: op.id,
                        error,
                        disposition,
                    });
                }
            }
        }

        log::info!("Queue drained ({} writes replayed)", replayed);
        Ok(DrainOutcome::Completed { replayed })
    }
}
