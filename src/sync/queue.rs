//! Durable FIFO queue of mutations awaiting replay.
//!
//! Every mutation attempted while offline (or interrupted by a network
//! failure) is appended here and persisted before the caller is told it was
//! queued. Entries leave the pending list only when their replay succeeds or
//! when they are moved to the attention list after repeated failures.
//!
//! Persisted entries that no longer parse are quarantined under a separate
//! key instead of blocking the rest of the queue.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::api::RemoteError;
use crate::models::{
    MaintenanceRequest, NewBill, NewTenant, PaymentRecord, Validate, ValidationError, BILLS,
    MAINTENANCE_REQUESTS, PAYMENTS, TENANTS,
};
use crate::storage::{KeyValueStorage, StorageError};

/// Storage key for the ordered pending list.
pub const QUEUE_KEY: &str = "casalink.pendingOperations";
/// Storage key for operations that exhausted their retries.
pub const ATTENTION_KEY: &str = "casalink.needsAttention";
/// Storage key for persisted entries that could not be parsed.
pub const QUARANTINE_KEY: &str = "casalink.quarantinedOperations";
/// Version written into every persisted envelope.
pub const SCHEMA_VERSION: u32 = 1;
/// Default number of consecutive failed replays before an operation needs attention.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("Queue serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The four mutation types the dispatcher knows how to defer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    AddTenant,
    CreateBill,
    SubmitMaintenance,
    RecordPayment,
}

impl OperationKind {
    /// Collection the operation's primary record is created in.
    pub fn collection(&self) -> &'static str {
        match self {
            OperationKind::AddTenant => TENANTS,
            OperationKind::CreateBill => BILLS,
            OperationKind::SubmitMaintenance => MAINTENANCE_REQUESTS,
            OperationKind::RecordPayment => PAYMENTS,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::AddTenant => "add tenant",
            OperationKind::CreateBill => "create bill",
            OperationKind::SubmitMaintenance => "submit maintenance request",
            OperationKind::RecordPayment => "record payment",
        }
    }
}

/// A domain mutation together with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Mutation {
    AddTenant(NewTenant),
    CreateBill(NewBill),
    SubmitMaintenance(MaintenanceRequest),
    RecordPayment(PaymentRecord),
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::AddTenant(_) => OperationKind::AddTenant,
            Mutation::CreateBill(_) => OperationKind::CreateBill,
            Mutation::SubmitMaintenance(_) => OperationKind::SubmitMaintenance,
            Mutation::RecordPayment(_) => OperationKind::RecordPayment,
        }
    }

    /// The record body sent to the remote store.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Mutation::AddTenant(tenant) => serde_json::to_value(tenant),
            Mutation::CreateBill(bill) => serde_json::to_value(bill),
            Mutation::SubmitMaintenance(request) => serde_json::to_value(request),
            Mutation::RecordPayment(payment) => serde_json::to_value(payment),
        }
    }
}

impl Validate for Mutation {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Mutation::AddTenant(tenant) => tenant.validate(),
            Mutation::CreateBill(bill) => bill.validate(),
            Mutation::SubmitMaintenance(request) => request.validate(),
            Mutation::RecordPayment(payment) => payment.validate(),
        }
    }
}

/// A single queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Time-ordered unique id. Also used as the remote document id, which
    /// makes replay idempotent.
    pub id: String,
    pub mutation: Mutation,
    /// When this operation was queued (Unix ms).
    pub enqueued_at: u64,
    /// Consecutive failed replays.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingOperation {
    pub fn new(mutation: Mutation) -> Self {
        Self {
            id: next_operation_id(),
            mutation,
            enqueued_at: now_ms(),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.mutation.kind()
    }
}

/// What `record_failure` did with the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Still pending; will be retried on the next drain.
    Retained { attempts: u32 },
    /// Moved to the attention list.
    NeedsAttention { attempts: u32 },
    /// The id was not pending (already removed or discarded).
    Unknown,
}

/// A persisted entry that failed to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantinedEntry {
    pub source_key: String,
    pub raw: Value,
    pub reason: String,
    pub quarantined_at: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T: Serialize> {
    schema_version: u32,
    operations: &'a T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default)]
    schema_version: u32,
    operations: Vec<Value>,
}

struct QueueState {
    pending: VecDeque<PendingOperation>,
    attention: Vec<PendingOperation>,
}

/// Ordered, durable list of pending operations plus the attention list.
///
/// All mutating calls take one lock around both the in-memory change and the
/// storage write, so concurrent enqueues never interleave. If the write fails
/// the in-memory change is rolled back and the error returned.
pub struct OperationQueue {
    storage: Arc<dyn KeyValueStorage>,
    state: Mutex<QueueState>,
    max_attempts: u32,
}

impl OperationQueue {
    /// Load the queue from storage, quarantining entries that fail to parse.
    pub fn open(storage: Arc<dyn KeyValueStorage>, max_attempts: u32) -> Result<Self, QueueError> {
        let mut quarantine = Vec::new();
        let mut pending: VecDeque<PendingOperation> =
            load_operations(storage.as_ref(), QUEUE_KEY, &mut quarantine)?.into();
        let attention = load_operations(storage.as_ref(), ATTENTION_KEY, &mut quarantine)?;

        // A crash between the two writes of a move can leave an operation in
        // both lists. The attention copy wins.
        let flagged: HashSet<&str> = attention.iter().map(|op| op.id.as_str()).collect();
        let before = pending.len();
        pending.retain(|op| !flagged.contains(op.id.as_str()));
        if pending.len() != before {
            log::warn!(
                "Dropped {} pending duplicates of attention entries",
                before - pending.len()
            );
        }

        let queue = Self {
            storage,
            state: Mutex::new(QueueState { pending, attention }),
            max_attempts: max_attempts.max(1),
        };

        if !quarantine.is_empty() {
            log::error!(
                "Quarantined {} unreadable queue entries under '{}'",
                quarantine.len(),
                QUARANTINE_KEY
            );
            queue.append_quarantine(quarantine)?;
            let state = queue.lock();
            queue.persist(QUEUE_KEY, &state.pending)?;
            queue.persist(ATTENTION_KEY, &state.attention)?;
        }

        {
            let state = queue.lock();
            log::info!(
                "Operation queue loaded: {} pending, {} needing attention",
                state.pending.len(),
                state.attention.len()
            );
        }
        Ok(queue)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Append an operation and persist it before returning.
    pub fn enqueue(&self, op: PendingOperation) -> Result<(), QueueError> {
        let mut state = self.lock();
        let id = op.id.clone();
        let kind = op.kind();
        state.pending.push_back(op);
        if let Err(e) = self.persist(QUEUE_KEY, &state.pending) {
            state.pending.pop_back();
            return Err(e);
        }
        log::info!(
            "Queued {} ({}), {} pending",
            kind.label(),
            id,
            state.pending.len()
        );
        Ok(())
    }

    /// Snapshot of the pending list in FIFO order.
    pub fn peek_all(&self) -> Vec<PendingOperation> {
        self.lock().pending.iter().cloned().collect()
    }

    /// Remove a pending operation by id. Returns `false` if it was not pending.
    pub fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let mut state = self.lock();
        let Some(index) = state.pending.iter().position(|op| op.id == id) else {
            return Ok(false);
        };
        let removed = state.pending.remove(index);
        if let Err(e) = self.persist(QUEUE_KEY, &state.pending) {
            if let Some(op) = removed {
                state.pending.insert(index, op);
            }
            return Err(e);
        }
        Ok(true)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().pending.iter().any(|op| op.id == id)
    }

    /// Number of operations waiting to sync.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Record a failed replay of `id`.
    ///
    /// Connectivity failures count toward `max_attempts`; domain failures
    /// (validation, permission, ...) cannot succeed on retry and move the
    /// operation to the attention list immediately.
    pub fn record_failure(
        &self,
        id: &str,
        error: &RemoteError,
    ) -> Result<FailureDisposition, QueueError> {
        let mut state = self.lock();
        let Some(index) = state.pending.iter().position(|op| op.id == id) else {
            return Ok(FailureDisposition::Unknown);
        };

        let previous = state.pending[index].clone();
        let attempts = previous.attempts.saturating_add(1);
        let exhausted = !error.is_connectivity() || attempts >= self.max_attempts;

        if !exhausted {
            let op = &mut state.pending[index];
            op.attempts = attempts;
            op.last_error = Some(error.to_string());
            if let Err(e) = self.persist(QUEUE_KEY, &state.pending) {
                state.pending[index] = previous;
                return Err(e);
            }
            return Ok(FailureDisposition::Retained { attempts });
        }

        let Some(mut op) = state.pending.remove(index) else {
            return Ok(FailureDisposition::Unknown);
        };
        let label = op.kind().label();
        op.attempts = attempts;
        op.last_error = Some(error.to_string());
        state.attention.push(op);

        // Attention first: a crash in between leaves a duplicate that `open`
        // resolves, never a lost operation.
        let written = self
            .persist(ATTENTION_KEY, &state.attention)
            .and_then(|()| self.persist(QUEUE_KEY, &state.pending));
        if let Err(e) = written {
            state.attention.pop();
            state.pending.insert(index, previous);
            return Err(e);
        }

        log::error!(
            "{} ({}) needs attention after {} failed attempts: {}",
            label,
            id,
            attempts,
            error
        );
        Ok(FailureDisposition::NeedsAttention { attempts })
    }

    /// Put an operation straight onto the attention list under its own id.
    ///
    /// For writes that were partly applied and then rejected: a later
    /// `retry` replays them with the same id, so the applied part is
    /// recognised instead of duplicated.
    pub fn flag(&self, mut op: PendingOperation, error: &RemoteError) -> Result<(), QueueError> {
        let mut state = self.lock();
        let id = op.id.clone();
        let label = op.kind().label();
        op.attempts = op.attempts.saturating_add(1);
        op.last_error = Some(error.to_string());
        state.attention.push(op);
        if let Err(e) = self.persist(ATTENTION_KEY, &state.attention) {
            state.attention.pop();
            return Err(e);
        }
        log::error!("{} ({}) needs attention: {}", label, id, error);
        Ok(())
    }

    /// Operations that exhausted their retries, oldest first.
    pub fn needs_attention(&self) -> Vec<PendingOperation> {
        self.lock().attention.clone()
    }

    pub fn attention_len(&self) -> usize {
        self.lock().attention.len()
    }

    /// Move an attention entry back to the tail of the pending list with a
    /// fresh attempt budget. Returns `false` if no such entry exists.
    pub fn retry(&self, id: &str) -> Result<bool, QueueError> {
        let mut state = self.lock();
        let Some(index) = state.attention.iter().position(|op| op.id == id) else {
            return Ok(false);
        };
        let mut op = state.attention.remove(index);
        let original = op.clone();
        op.attempts = 0;
        op.last_error = None;
        state.pending.push_back(op);

        let written = self
            .persist(QUEUE_KEY, &state.pending)
            .and_then(|()| self.persist(ATTENTION_KEY, &state.attention));
        if let Err(e) = written {
            state.pending.pop_back();
            state.attention.insert(index, original);
            return Err(e);
        }
        log::info!("Operation {} moved back to the pending queue", id);
        Ok(true)
    }

    /// Permanently drop an attention entry.
    pub fn discard(&self, id: &str) -> Result<Option<PendingOperation>, QueueError> {
        let mut state = self.lock();
        let Some(index) = state.attention.iter().position(|op| op.id == id) else {
            return Ok(None);
        };
        let op = state.attention.remove(index);
        if let Err(e) = self.persist(ATTENTION_KEY, &state.attention) {
            state.attention.insert(index, op);
            return Err(e);
        }
        log::warn!("Discarded {} ({})", op.kind().label(), op.id);
        Ok(Some(op))
    }

    /// Entries set aside because they could not be parsed.
    pub fn quarantined(&self) -> Result<Vec<QuarantinedEntry>, QueueError> {
        match self.storage.get(QUARANTINE_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist<T: Serialize>(&self, key: &str, operations: &T) -> Result<(), QueueError> {
        let json = serde_json::to_string(&Envelope {
            schema_version: SCHEMA_VERSION,
            operations,
        })?;
        self.storage.set(key, &json)?;
        Ok(())
    }

    fn append_quarantine(&self, entries: Vec<QuarantinedEntry>) -> Result<(), QueueError> {
        let mut all = self.quarantined().unwrap_or_else(|e| {
            log::warn!("Existing quarantine unreadable, starting fresh: {}", e);
            Vec::new()
        });
        all.extend(entries);
        self.storage.set(QUARANTINE_KEY, &serde_json::to_string(&all)?)?;
        Ok(())
    }
}

/// Parse one persisted list, moving anything unreadable into `quarantine`.
fn load_operations(
    storage: &dyn KeyValueStorage,
    key: &str,
    quarantine: &mut Vec<QuarantinedEntry>,
) -> Result<Vec<PendingOperation>, QueueError> {
    let Some(json) = storage.get(key)? else {
        return Ok(Vec::new());
    };

    let envelope: RawEnvelope = match serde_json::from_str(&json) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::error!("Queue envelope '{}' is unreadable: {}", key, e);
            quarantine.push(QuarantinedEntry {
                source_key: key.to_string(),
                raw: Value::String(json),
                reason: e.to_string(),
                quarantined_at: now_ms(),
            });
            return Ok(Vec::new());
        }
    };

    if envelope.schema_version > SCHEMA_VERSION {
        log::warn!(
            "Queue '{}' written by schema v{} (this build reads v{})",
            key,
            envelope.schema_version,
            SCHEMA_VERSION
        );
    }

    let mut operations = Vec::with_capacity(envelope.operations.len());
    for raw in envelope.operations {
        match serde_json::from_value::<PendingOperation>(raw.clone()) {
            Ok(op) => operations.push(op),
            Err(e) => {
                log::warn!("Skipping unreadable entry in '{}': {}", key, e);
                quarantine.push(QuarantinedEntry {
                    source_key: key.to_string(),
                    raw,
                    reason: e.to_string(),
                    quarantined_at: now_ms(),
                });
            }
        }
    }
    Ok(operations)
}

/// Time-ordered unique id: zero-padded Unix ms plus 48 random bits.
pub fn next_operation_id() -> String {
    let mut suffix = [0u8; 6];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    format!("{:013}-{}", now_ms(), hex::encode(suffix))
}

/// Get the current time in milliseconds since Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
