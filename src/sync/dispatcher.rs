//! Mutation dispatcher: run a write now, or queue it for later.
//!
//! Every domain write goes through `dispatch`:
//! 1. Validate locally (failures are returned, never queued)
//! 2. Offline, or older writes still queued -> queue and return `Queued`
//! 3. Otherwise execute against the remote store
//! 4. Connectivity-class failure -> queue and return `Queued`
//! 5. Any other failure -> returned to the caller untouched, unless part of
//!    the write already landed; then it goes to the attention list too

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::api::types::BillPaymentPatch;
use crate::api::{RemoteError, RemoteStore};
use crate::models::{
    BillStatus, MaintenanceRequest, NewBill, NewTenant, PaymentRecord, Validate, ValidationError,
    BILLS,
};
use crate::status::StatusBoard;

use super::connectivity::{request_sync, ConnectivityMonitor};
use super::queue::{Mutation, OperationQueue, PendingOperation, QueueError};
use super::SyncTrigger;

/// Outcome of a write that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied to the remote store.
    Succeeded { record_id: String },
    /// Stored locally; will be applied when connectivity returns.
    Queued { operation_id: String },
}

impl MutationOutcome {
    pub fn tag(&self) -> OutcomeTag {
        match self {
            MutationOutcome::Succeeded { .. } => OutcomeTag::Succeeded,
            MutationOutcome::Queued { .. } => OutcomeTag::Queued,
        }
    }
}

/// Three-way result tag handed to UI collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeTag {
    Succeeded,
    Queued,
    Failed,
}

impl OutcomeTag {
    pub fn of(result: &Result<MutationOutcome, MutationError>) -> Self {
        match result {
            Ok(outcome) => outcome.tag(),
            Err(_) => OutcomeTag::Failed,
        }
    }
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Domain-class remote failure (validation, permission, ...).
    #[error(transparent)]
    Remote(RemoteError),
    /// The record was created but a follow-up write was rejected. The
    /// operation is on the attention list under `operation_id`.
    #[error("{record_id} was created but its follow-up write failed: {source}")]
    PartiallyApplied {
        operation_id: String,
        record_id: String,
        source: RemoteError,
    },
    #[error("Could not queue write: {0}")]
    Queue(#[from] QueueError),
}

/// Wraps each CasaLink write with the offline fallback.
pub struct MutationDispatcher<R: RemoteStore> {
    remote: Arc<R>,
    queue: Arc<OperationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    board: Arc<StatusBoard>,
    sync_now: SyncTrigger,
}

impl<R: RemoteStore> MutationDispatcher<R> {
    pub fn new(
        remote: Arc<R>,
        queue: Arc<OperationQueue>,
        monitor: Arc<ConnectivityMonitor>,
        board: Arc<StatusBoard>,
        sync_now: SyncTrigger,
    ) -> Self {
        Self {
            remote,
            queue,
            monitor,
            board,
            sync_now,
        }
    }

    pub async fn add_tenant(&self, tenant: NewTenant) -> Result<MutationOutcome, MutationError> {
        self.dispatch(Mutation::AddTenant(tenant)).await
    }

    pub async fn create_bill(&self, bill: NewBill) -> Result<MutationOutcome, MutationError> {
        self.dispatch(Mutation::CreateBill(bill)).await
    }

    pub async fn submit_maintenance(
        &self,
        request: MaintenanceRequest,
    ) -> Result<MutationOutcome, MutationError> {
        self.dispatch(Mutation::SubmitMaintenance(request)).await
    }

    /// Record a payment and mark its bill paid.
    pub async fn record_payment(
        &self,
        payment: PaymentRecord,
    ) -> Result<MutationOutcome, MutationError> {
        self.dispatch(Mutation::RecordPayment(payment)).await
    }

    pub async fn dispatch(&self, mutation: Mutation) -> Result<MutationOutcome, MutationError> {
        mutation.validate()?;
        let op = PendingOperation::new(mutation);

        if !self.monitor.is_online() {
            return self.defer(op);
        }

        // Executing directly would let this write overtake older queued ones
        // (e.g. a payment landing before its bill).
        if !self.queue.is_empty() {
            log::info!(
                "{} queued behind {} pending writes",
                op.kind().label(),
                self.queue.len()
            );
            let outcome = self.defer(op);
            request_sync(&self.sync_now, "write queued while online");
            return outcome;
        }

        let record_id = match create(self.remote.as_ref(), &op).await {
            Ok(record_id) => record_id,
            Err(e) if e.is_connectivity() => {
                log::warn!("{} deferred: {}", op.kind().label(), e);
                return self.defer(op);
            }
            Err(e) => {
                log::warn!("{} rejected: {}", op.kind().label(), e);
                return Err(MutationError::Remote(e));
            }
        };

        // The record exists from here on. Replay under the same id skips the
        // create and only redoes the follow-up.
        match follow_up(self.remote.as_ref(), &op, &record_id).await {
            Ok(()) => {
                log::info!("{} applied ({})", op.kind().label(), record_id);
                Ok(MutationOutcome::Succeeded { record_id })
            }
            Err(e) if e.is_connectivity() => {
                log::warn!("{} partly applied, deferred: {}", op.kind().label(), e);
                self.defer(op)
            }
            Err(e) => {
                let operation_id = op.id.clone();
                self.queue.flag(op, &e)?;
                self.board
                    .set_counts(self.queue.len(), self.queue.attention_len());
                Err(MutationError::PartiallyApplied {
                    operation_id,
                    record_id,
                    source: e,
                })
            }
        }
    }

    fn defer(&self, op: PendingOperation) -> Result<MutationOutcome, MutationError> {
        let operation_id = op.id.clone();
        self.queue.enqueue(op)?;
        self.board
            .set_counts(self.queue.len(), self.queue.attention_len());
        Ok(MutationOutcome::Queued { operation_id })
    }
}

/// Apply one operation to the remote store. Used for both direct execution
/// and replay, so both paths write exactly the same records.
///
/// The operation id is the document id of the created record. A replay that
/// finds the record already present treats the create as done.
pub(crate) async fn execute<R: RemoteStore>(
    remote: &R,
    op: &PendingOperation,
) -> Result<String, RemoteError> {
    let record_id = create(remote, op).await?;
    follow_up(remote, op, &record_id).await?;
    Ok(record_id)
}

async fn create<R: RemoteStore>(remote: &R, op: &PendingOperation) -> Result<String, RemoteError> {
    let collection = op.kind().collection();
    let payload = op
        .mutation
        .payload()
        .map_err(|e| RemoteError::Unexpected(format!("Failed to encode payload: {}", e)))?;

    let record_id = match remote.create_record(collection, &op.id, &payload).await {
        Ok(id) => id,
        Err(RemoteError::AlreadyExists(_)) => {
            log::info!("{}/{} already exists, treating as applied", collection, op.id);
            op.id.clone()
        }
        Err(e) => return Err(e),
    };
    Ok(record_id)
}

/// Writes that depend on the created record. Payments mark their bill paid.
async fn follow_up<R: RemoteStore>(
    remote: &R,
    op: &PendingOperation,
    record_id: &str,
) -> Result<(), RemoteError> {
    if let Mutation::RecordPayment(payment) = &op.mutation {
        let patch = BillPaymentPatch {
            status: BillStatus::Paid,
            payment_id: record_id,
            paid_at: payment.paid_at,
        };
        let patch = serde_json::to_value(&patch)
            .map_err(|e| RemoteError::Unexpected(format!("Failed to encode bill patch: {}", e)))?;
        log::debug!(
            "Marking bill {} paid ({} payment {})",
            payment.bill_id,
            payment.method,
            record_id
        );
        remote.update_record(BILLS, &payment.bill_id, &patch).await?;
    }
    Ok(())
}
