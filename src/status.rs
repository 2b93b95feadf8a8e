//! Status state machine for the pending-sync indicator.
//!
//! Represents everything the UI needs to show an unobtrusive sync badge:
//! connectivity, how many writes are waiting, and whether any need the
//! user's attention.

use serde::Serialize;
use tokio::sync::watch;

/// All possible states of the sync indicator.
///
/// The badge displays the human-readable label returned by `SyncStatus::label()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SyncStatus {
    /// Network unavailable -- writes are queued locally.
    Offline,
    /// Up to date -- nothing pending.
    Synced,
    /// Online with writes still waiting for the next drain.
    Pending { count: usize },
    /// A drain is replaying queued writes.
    Syncing,
    /// At least one write failed permanently and needs manual action.
    NeedsAttention { count: usize },
}

impl SyncStatus {
    /// Derive the indicator state. Attention outranks everything but an
    /// in-flight drain.
    pub fn from_parts(online: bool, pending: usize, needs_attention: usize, syncing: bool) -> Self {
        if syncing {
            SyncStatus::Syncing
        } else if needs_attention > 0 {
            SyncStatus::NeedsAttention {
                count: needs_attention,
            }
        } else if !online {
            SyncStatus::Offline
        } else if pending > 0 {
            SyncStatus::Pending { count: pending }
        } else {
            SyncStatus::Synced
        }
    }

    /// Human-readable status text for the indicator.
    pub fn label(&self) -> &str {
        match self {
            SyncStatus::Offline => "Offline",
            SyncStatus::Synced => "Synced",
            SyncStatus::Pending { .. } => "Pending",
            SyncStatus::Syncing => "Syncing...",
            SyncStatus::NeedsAttention { .. } => "Needs attention",
        }
    }
}

/// Point-in-time view for UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub online: bool,
    pub pending: usize,
    pub needs_attention: usize,
    pub syncing: bool,
    pub status: SyncStatus,
}

impl SyncSnapshot {
    fn new(online: bool, pending: usize, needs_attention: usize, syncing: bool) -> Self {
        Self {
            online,
            pending,
            needs_attention,
            syncing,
            status: SyncStatus::from_parts(online, pending, needs_attention, syncing),
        }
    }

    fn recompute(&mut self) {
        self.status =
            SyncStatus::from_parts(self.online, self.pending, self.needs_attention, self.syncing);
    }
}

/// Publishes `SyncSnapshot` changes to any number of watchers.
pub struct StatusBoard {
    tx: watch::Sender<SyncSnapshot>,
}

impl StatusBoard {
    pub fn new(online: bool, pending: usize, needs_attention: usize) -> Self {
        let (tx, _) = watch::channel(SyncSnapshot::new(online, pending, needs_attention, false));
        Self { tx }
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.tx.subscribe()
    }

    pub fn set_online(&self, online: bool) {
        self.update(|s| s.online = online);
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.update(|s| s.syncing = syncing);
    }

    pub fn set_counts(&self, pending: usize, needs_attention: usize) {
        self.update(|s| {
            s.pending = pending;
            s.needs_attention = needs_attention;
        });
    }

    fn update(&self, apply: impl FnOnce(&mut SyncSnapshot)) {
        self.tx.send_if_modified(|snapshot| {
            let before = snapshot.clone();
            apply(snapshot);
            snapshot.recompute();
            if *snapshot != before {
                log::debug!("Sync status: {}", snapshot.status.label());
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(SyncStatus::Offline.label(), "Offline");
        assert_eq!(SyncStatus::Synced.label(), "Synced");
        assert_eq!(SyncStatus::Pending { count: 2 }.label(), "Pending");
        assert_eq!(SyncStatus::Syncing.label(), "Syncing...");
        assert_eq!(
            SyncStatus::NeedsAttention { count: 1 }.label(),
            "Needs attention"
        );
    }

    #[test]
    fn test_from_parts_precedence() {
        assert_eq!(SyncStatus::from_parts(true, 0, 0, false), SyncStatus::Synced);
        assert_eq!(
            SyncStatus::from_parts(true, 3, 0, false),
            SyncStatus::Pending { count: 3 }
        );
        assert_eq!(SyncStatus::from_parts(false, 3, 0, false), SyncStatus::Offline);
        assert_eq!(
            SyncStatus::from_parts(false, 3, 1, false),
            SyncStatus::NeedsAttention { count: 1 }
        );
        assert_eq!(SyncStatus::from_parts(true, 3, 1, true), SyncStatus::Syncing);
    }

    #[test]
    fn test_board_tracks_updates() {
        let board = StatusBoard::new(true, 0, 0);
        assert_eq!(board.snapshot().status, SyncStatus::Synced);

        board.set_online(false);
        board.set_counts(2, 0);
        let snapshot = board.snapshot();
        assert!(!snapshot.online);
        assert_eq!(snapshot.pending, 2);
        assert_eq!(snapshot.status, SyncStatus::Offline);

        board.set_online(true);
        assert_eq!(board.snapshot().status, SyncStatus::Pending { count: 2 });
    }

    #[tokio::test]
    async fn test_board_notifies_only_on_change() {
        let board = StatusBoard::new(true, 0, 0);
        let mut rx = board.subscribe();

        board.set_counts(0, 0);
        assert!(!rx.has_changed().unwrap());

        board.set_syncing(true);
        assert!(rx.has_changed().unwrap());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, SyncStatus::Syncing);
    }

    #[test]
    fn test_snapshot_serialization() {
        let board = StatusBoard::new(true, 1, 0);
        let json = serde_json::to_string(&board.snapshot()).unwrap();
        assert!(json.contains("\"needsAttention\":0"));
        assert!(json.contains("\"status\":{\"state\":\"pending\",\"count\":1}"));
    }
}
