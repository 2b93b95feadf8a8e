//! Connectivity monitor driven by host network signals.
//!
//! The host (browser shell, NetworkManager feed, stdin in `watch` mode) calls
//! `set_online` on every `online`/`offline` event. Nothing here polls.
//!
//! On an offline -> online transition the monitor sends one request on the
//! sync trigger channel. The channel holds a single slot, so a burst of
//! flaps while a drain is already pending collapses into that one request.

use std::sync::{PoisonError, RwLock};

use tokio::sync::{mpsc, watch};

use super::SyncTrigger;

type ChangeCallback = Box<dyn Fn(bool) + Send + Sync>;

pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    /// Called synchronously on every transition. Callbacks must not register
    /// further callbacks.
    subscribers: RwLock<Vec<ChangeCallback>>,
    sync_trigger: SyncTrigger,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool, sync_trigger: SyncTrigger) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self {
            state,
            subscribers: RwLock::new(Vec::new()),
            sync_trigger,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Register a callback fired with the new state on every transition.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// Receiver for async consumers that want to await state changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Apply a host network signal. Returns `true` if the state changed.
    ///
    /// Repeated signals for the current state are ignored entirely.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return false;
        }

        if online {
            log::info!("Network: online");
        } else {
            log::warn!("Network: offline, new writes will be queued");
        }

        for callback in self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            callback(online);
        }

        if online {
            request_sync(&self.sync_trigger, "connectivity restored");
        }
        true
    }
}

/// Ask the sync daemon for a drain. A full slot means one is already pending.
pub(crate) fn request_sync(trigger: &SyncTrigger, reason: &str) {
    match trigger.try_send(()) {
        Ok(()) => log::debug!("Sync requested ({})", reason),
        Err(mpsc::error::TrySendError::Full(())) => {
            log::debug!("Sync already pending, coalesced ({})", reason)
        }
        Err(mpsc::error::TrySendError::Closed(())) => {
            log::warn!("Sync daemon not running, request dropped ({})", reason)
        }
    }
}
