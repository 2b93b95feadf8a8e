//! Sync service: the explicitly constructed owner of the queue, monitor,
//! engine and dispatcher.
//!
//! UI code receives a `SyncService` (or the `Arc`s it hands out) instead of
//! reaching for a global. Construction returns the `SyncDaemon` separately
//! so the caller decides where it runs.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::api::{ApiClient, HttpRemoteStore, RemoteStore};
use crate::config::SyncConfig;
use crate::status::{StatusBoard, SyncSnapshot};
use crate::storage::{FileStorage, KeyValueStorage, StorageError};
use crate::sync::connectivity::request_sync;
use crate::sync::{
    sync_channel, ConnectivityMonitor, DrainOutcome, MutationDispatcher, OperationQueue, PendingOperation,
    QuarantinedEntry, QueueError, SyncDaemon, SyncEngine, SyncTrigger,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Thread-safe sync state shared with UI collaborators.
pub struct SyncService<R: RemoteStore> {
    queue: Arc<OperationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine<R>>,
    dispatcher: Arc<MutationDispatcher<R>>,
    board: Arc<StatusBoard>,
    sync_now: SyncTrigger,
}

impl<R: RemoteStore> SyncService<R> {
    /// Wire the components together over the given remote store and storage.
    pub fn new(
        remote: Arc<R>,
        storage: Arc<dyn KeyValueStorage>,
        max_attempts: u32,
        initially_online: bool,
    ) -> Result<(Self, SyncDaemon<R>), QueueError> {
        let queue = Arc::new(OperationQueue::open(storage, max_attempts)?);
        let board = Arc::new(StatusBoard::new(
            initially_online,
            queue.len(),
            queue.attention_len(),
        ));

        let (connectivity_tx, connectivity_rx) = sync_channel();
        let (sync_now, sync_now_rx) = sync_channel();

        let monitor = Arc::new(ConnectivityMonitor::new(initially_online, connectivity_tx));
        {
            let board = board.clone();
            monitor.on_change(move |online| board.set_online(online));
        }

        let engine = Arc::new(SyncEngine::new(
            remote.clone(),
            queue.clone(),
            monitor.clone(),
            board.clone(),
        ));
        let dispatcher = Arc::new(MutationDispatcher::new(
            remote,
            queue.clone(),
            monitor.clone(),
            board.clone(),
            sync_now.clone(),
        ));
        let daemon = SyncDaemon::new(engine.clone(), connectivity_rx, sync_now_rx);

        let service = Self {
            queue,
            monitor,
            engine,
            dispatcher,
            board,
            sync_now,
        };
        Ok((service, daemon))
    }

    pub fn dispatcher(&self) -> &Arc<MutationDispatcher<R>> {
        &self.dispatcher
    }

    pub fn engine(&self) -> &Arc<SyncEngine<R>> {
        &self.engine
    }

    /// Forward a host network signal.
    pub fn set_online(&self, online: bool) -> bool {
        self.monitor.set_online(online)
    }

    /// Pending sync count for the indicator badge.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn pending(&self) -> Vec<PendingOperation> {
        self.queue.peek_all()
    }

    pub fn needs_attention(&self) -> Vec<PendingOperation> {
        self.queue.needs_attention()
    }

    pub fn quarantined(&self) -> Result<Vec<QuarantinedEntry>, QueueError> {
        self.queue.quarantined()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.board.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.board.subscribe()
    }

    /// Ask the daemon for a drain now (UI "Sync now").
    pub fn sync_now(&self) {
        request_sync(&self.sync_now, "sync now");
    }

    /// Drain in the caller's task if online with writes pending.
    ///
    /// For one-shot callers that never start the daemon: a write queued
    /// behind older ones sends a sync request nobody receives.
    pub async fn drain_backlog(&self) -> Result<Option<DrainOutcome>, QueueError> {
        if !self.monitor.is_online() || self.queue.is_empty() {
            return Ok(None);
        }
        self.engine.drain().await.map(Some)
    }

    /// Give an attention entry a fresh attempt budget and schedule a drain.
    pub fn retry(&self, operation_id: &str) -> Result<bool, QueueError> {
        let moved = self.queue.retry(operation_id)?;
        if moved {
            self.refresh_counts();
            request_sync(&self.sync_now, "retry");
        }
        Ok(moved)
    }

    /// Drop an attention entry for good.
    pub fn discard(&self, operation_id: &str) -> Result<Option<PendingOperation>, QueueError> {
        let discarded = self.queue.discard(operation_id)?;
        if discarded.is_some() {
            self.refresh_counts();
        }
        Ok(discarded)
    }

    fn refresh_counts(&self) {
        self.board
            .set_counts(self.queue.len(), self.queue.attention_len());
    }
}

impl SyncService<HttpRemoteStore> {
    /// Build the production service: file-backed queue in `config.data_dir`,
    /// HTTP remote store at `config.api_url`.
    pub async fn connect(
        config: &SyncConfig,
        initially_online: bool,
    ) -> Result<(Self, SyncDaemon<HttpRemoteStore>), ServiceError> {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::open(&config.data_dir)?);
        Self::connect_with_storage(config, storage, initially_online).await
    }

    /// Same as `connect`, over caller-supplied storage.
    pub async fn connect_with_storage(
        config: &SyncConfig,
        storage: Arc<dyn KeyValueStorage>,
        initially_online: bool,
    ) -> Result<(Self, SyncDaemon<HttpRemoteStore>), ServiceError> {
        let api = Arc::new(ApiClient::new(&config.api_url, &config.client_id));
        if let Some(token) = &config.api_token {
            api.set_access_token(token.clone()).await;
        }
        log::info!(
            "Sync service for {} (data: {}, max attempts: {})",
            api.base_url(),
            config.data_dir.display(),
            config.max_attempts
        );
        let remote = Arc::new(HttpRemoteStore::new(api));
        Ok(Self::new(
            remote,
            storage,
            config.max_attempts,
            initially_online,
        )?)
    }
}
