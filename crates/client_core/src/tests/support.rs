//! In-process payroll service for engine tests: scripted data, injectable
//! failures, call recording, and gates that hold a response until released.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use shared::{
    domain::{BatchId, EntryId},
    protocol::{Amount, BatchRecord, BatchUpdateRequest, PayrollEntry},
};
use tokio::sync::{broadcast, oneshot};

use crate::{
    events::ClientEvent,
    remote::{PayrollRemote, RemoteError, RemoteFailure, RemoteOperation},
    session::BatchSessionController,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RemoteCall {
    ListBatches,
    GetBatch(BatchId),
    UpdateBatch(BatchId, BatchUpdateRequest),
    ListEntries(BatchId),
    CreateEntry(BatchId, PayrollEntry),
    UpdateEntry(EntryId, PayrollEntry),
    DeleteEntry(EntryId),
}

pub(crate) struct Gate {
    pub(crate) reached: oneshot::Receiver<()>,
    pub(crate) release: oneshot::Sender<()>,
}

struct PendingGate {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

#[derive(Default)]
pub(crate) struct ScriptedRemote {
    batches: Mutex<Vec<BatchRecord>>,
    entries: Mutex<HashMap<BatchId, Vec<PayrollEntry>>>,
    failing: Mutex<HashSet<RemoteOperation>>,
    gates: Mutex<HashMap<(RemoteOperation, Option<BatchId>), PendingGate>>,
    calls: Mutex<Vec<RemoteCall>>,
    next_entry_id: AtomicI64,
}

impl ScriptedRemote {
    pub(crate) fn new() -> Arc<Self> {
        let remote = Self::default();
        remote.next_entry_id.store(100, Ordering::SeqCst);
        Arc::new(remote)
    }

    pub(crate) fn with_batch(self: Arc<Self>, batch: BatchRecord) -> Arc<Self> {
        self.batches.lock().expect("batches").push(batch);
        self
    }

    pub(crate) fn with_entries(
        self: Arc<Self>,
        batch_id: &str,
        entries: Vec<PayrollEntry>,
    ) -> Arc<Self> {
        self.set_entries(batch_id, entries);
        self
    }

    pub(crate) fn set_entries(&self, batch_id: &str, entries: Vec<PayrollEntry>) {
        self.entries
            .lock()
            .expect("entries")
            .insert(BatchId::from(batch_id), entries);
    }

    pub(crate) fn fail(&self, operation: RemoteOperation) {
        self.failing.lock().expect("failing").insert(operation);
    }

    pub(crate) fn recover(&self, operation: RemoteOperation) {
        self.failing.lock().expect("failing").remove(&operation);
    }

    /// Holds the next `operation` call for `batch_id` until the returned
    /// gate is released. The response is computed before the gate.
    pub(crate) fn hold(&self, operation: RemoteOperation, batch_id: Option<&str>) -> Gate {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.gates.lock().expect("gates").insert(
            (operation, batch_id.map(BatchId::from)),
            PendingGate {
                reached: reached_tx,
                release: release_rx,
            },
        );
        Gate {
            reached: reached_rx,
            release: release_tx,
        }
    }

    pub(crate) fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&RemoteCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().expect("calls").push(call);
    }

    fn check(&self, operation: RemoteOperation) -> Result<(), RemoteError> {
        if self.failing.lock().expect("failing").contains(&operation) {
            return Err(RemoteError::new(
                operation,
                RemoteFailure::Status {
                    status: 500,
                    body: "scripted failure".to_string(),
                },
            ));
        }
        Ok(())
    }

    async fn pass_gate(&self, operation: RemoteOperation, batch_id: Option<&BatchId>) {
        let gate = self
            .gates
            .lock()
            .expect("gates")
            .remove(&(operation, batch_id.cloned()));
        if let Some(gate) = gate {
            let _ = gate.reached.send(());
            let _ = gate.release.await;
        }
    }

    fn not_found(operation: RemoteOperation) -> RemoteError {
        RemoteError::new(
            operation,
            RemoteFailure::Status {
                status: 404,
                body: "not found".to_string(),
            },
        )
    }
}

#[async_trait]
impl PayrollRemote for ScriptedRemote {
    async fn list_batches(&self) -> Result<Vec<BatchRecord>, RemoteError> {
        self.record(RemoteCall::ListBatches);
        let result = self
            .check(RemoteOperation::ListBatches)
            .map(|_| self.batches.lock().expect("batches").clone());
        self.pass_gate(RemoteOperation::ListBatches, None).await;
        result
    }

    async fn get_batch(&self, batch_id: &BatchId) -> Result<BatchRecord, RemoteError> {
        self.record(RemoteCall::GetBatch(batch_id.clone()));
        let result = self.check(RemoteOperation::GetBatch).and_then(|_| {
            self.batches
                .lock()
                .expect("batches")
                .iter()
                .find(|batch| &batch.id == batch_id)
                .cloned()
                .ok_or_else(|| Self::not_found(RemoteOperation::GetBatch))
        });
        self.pass_gate(RemoteOperation::GetBatch, Some(batch_id))
            .await;
        result
    }

    async fn update_batch(
        &self,
        batch_id: &BatchId,
        body: &BatchUpdateRequest,
    ) -> Result<BatchRecord, RemoteError> {
        self.record(RemoteCall::UpdateBatch(batch_id.clone(), body.clone()));
        self.check(RemoteOperation::UpdateBatch)?;
        let mut batches = self.batches.lock().expect("batches");
        let batch = batches
            .iter_mut()
            .find(|batch| &batch.id == batch_id)
            .ok_or_else(|| Self::not_found(RemoteOperation::UpdateBatch))?;
        batch.payment_type = Some(body.payment_type.clone());
        batch.debit_account = Some(body.debit_account.clone());
        batch.account_type = Some(body.account_type.clone());
        batch.payment_date = Some(body.payment_date.clone());
        if body.status.is_some() {
            batch.status = body.status;
        }
        Ok(batch.clone())
    }

    async fn list_entries(&self, batch_id: &BatchId) -> Result<Vec<PayrollEntry>, RemoteError> {
        self.record(RemoteCall::ListEntries(batch_id.clone()));
        let result = self.check(RemoteOperation::ListEntries).map(|_| {
            self.entries
                .lock()
                .expect("entries")
                .get(batch_id)
                .cloned()
                .unwrap_or_default()
        });
        self.pass_gate(RemoteOperation::ListEntries, Some(batch_id))
            .await;
        result
    }

    async fn create_entry(
        &self,
        batch_id: &BatchId,
        draft: &PayrollEntry,
    ) -> Result<PayrollEntry, RemoteError> {
        self.record(RemoteCall::CreateEntry(batch_id.clone(), draft.clone()));
        let result = self.check(RemoteOperation::CreateEntry).map(|_| {
            let mut created = draft.clone();
            created.id = Some(EntryId(self.next_entry_id.fetch_add(1, Ordering::SeqCst)));
            self.entries
                .lock()
                .expect("entries")
                .entry(batch_id.clone())
                .or_default()
                .push(created.clone());
            created
        });
        self.pass_gate(RemoteOperation::CreateEntry, Some(batch_id))
            .await;
        result
    }

    async fn update_entry(
        &self,
        entry_id: EntryId,
        entry: &PayrollEntry,
    ) -> Result<PayrollEntry, RemoteError> {
        self.record(RemoteCall::UpdateEntry(entry_id, entry.clone()));
        self.check(RemoteOperation::UpdateEntry)?;
        let mut all = self.entries.lock().expect("entries");
        let stored = all
            .values_mut()
            .flat_map(|entries| entries.iter_mut())
            .find(|stored| stored.id == Some(entry_id))
            .ok_or_else(|| Self::not_found(RemoteOperation::UpdateEntry))?;
        *stored = entry.clone();
        stored.id = Some(entry_id);
        Ok(stored.clone())
    }

    async fn delete_entry(&self, entry_id: EntryId) -> Result<(), RemoteError> {
        self.record(RemoteCall::DeleteEntry(entry_id));
        self.check(RemoteOperation::DeleteEntry)?;
        let mut all = self.entries.lock().expect("entries");
        for entries in all.values_mut() {
            entries.retain(|stored| stored.id != Some(entry_id));
        }
        Ok(())
    }
}

pub(crate) fn batch(id: &str) -> BatchRecord {
    BatchRecord::bare(id)
}

pub(crate) fn entry(id: i64, payee_name: &str, amount: Amount) -> PayrollEntry {
    PayrollEntry {
        id: Some(EntryId(id)),
        payee_name: payee_name.to_string(),
        amount,
        ..PayrollEntry::default()
    }
}

pub(crate) fn controller(remote: &Arc<ScriptedRemote>) -> Arc<BatchSessionController> {
    BatchSessionController::new(Arc::clone(remote) as Arc<dyn PayrollRemote>)
}

pub(crate) fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub(crate) fn error_notices(events: &[ClientEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::Notice(notice) if notice.is_error() => Some(notice.message.clone()),
            _ => None,
        })
        .collect()
}
