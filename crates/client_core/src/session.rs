//! Batch selection state machine and batch-level fields.
//!
//! `NoBatch -> Loading(id) -> Ready(id)`. Every load is tagged with a
//! [`LoadTicket`]; a response is applied only while its ticket is still the
//! current one, so a slow answer for a previous selection never overwrites
//! the batch the user switched to.

use std::{str::FromStr, sync::Arc};

use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    domain::{BatchId, BatchStatus},
    protocol::{BatchRecord, BatchUpdateRequest, PayrollEntry},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    entries::{normalize_field_name, EntryCollection, EntryCollectionStore},
    error::SessionError,
    events::{notify_failure, ClientEvent, Notification},
    remote::{HttpPayrollRemote, PayrollRemote, RemoteFailure},
};

pub const DEFAULT_PAYMENT_TYPE: &str = "Domestic";
pub const DISPLAY_CURRENCY: &str = "INR (India)";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "batchId", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    NoBatch,
    Loading(BatchId),
    Ready(BatchId),
}

impl Selection {
    pub fn batch_id(&self) -> Option<&BatchId> {
        match self {
            Self::NoBatch => None,
            Self::Loading(batch_id) | Self::Ready(batch_id) => Some(batch_id),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Identity of one load: the batch it was issued for and the selection
/// generation at issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub batch_id: BatchId,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// Applied, but entries or details could not be fetched and were left
    /// blank.
    Degraded,
    /// A newer selection took over; nothing was applied.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// No batch is ready; no request was made.
    Skipped,
    Pushed(BatchRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchField {
    PaymentType,
    DebitAccount,
    AccountType,
    PaymentDate,
}

impl FromStr for BatchField {
    type Err = SessionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_field_name(raw).as_str() {
            "paymenttype" => Ok(Self::PaymentType),
            "debitaccount" => Ok(Self::DebitAccount),
            "accounttype" => Ok(Self::AccountType),
            "paymentdate" | "date" => Ok(Self::PaymentDate),
            _ => Err(SessionError::UnknownField(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFields {
    pub payment_type: String,
    pub currency: String,
    pub debit_account: String,
    pub account_type: String,
    pub payment_date: String,
    pub status: BatchStatus,
}

impl Default for BatchFields {
    fn default() -> Self {
        Self {
            payment_type: DEFAULT_PAYMENT_TYPE.to_string(),
            currency: DISPLAY_CURRENCY.to_string(),
            debit_account: String::new(),
            account_type: String::new(),
            payment_date: String::new(),
            status: BatchStatus::Draft,
        }
    }
}

impl BatchFields {
    /// Wholesale replacement from a fetched record; absent values fall back
    /// to the defaults.
    pub fn from_record(record: &BatchRecord) -> Self {
        Self {
            payment_type: record
                .payment_type
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_PAYMENT_TYPE.to_string()),
            currency: DISPLAY_CURRENCY.to_string(),
            debit_account: record.debit_account.clone().unwrap_or_default(),
            account_type: record.account_type.clone().unwrap_or_default(),
            payment_date: record.payment_date.clone().unwrap_or_default(),
            status: record.status.unwrap_or_default(),
        }
    }

    pub fn set(&mut self, field: BatchField, value: String) {
        match field {
            BatchField::PaymentType => self.payment_type = value,
            BatchField::DebitAccount => self.debit_account = value,
            BatchField::AccountType => self.account_type = value,
            BatchField::PaymentDate => self.payment_date = value,
        }
    }

    pub fn update_request(&self, status: Option<BatchStatus>) -> BatchUpdateRequest {
        BatchUpdateRequest {
            payment_type: self.payment_type.clone(),
            debit_account: self.debit_account.clone(),
            account_type: self.account_type.clone(),
            payment_date: self.payment_date.clone(),
            status,
        }
    }
}

/// The single live session. Fields and entries are only ever swapped
/// together, under one lock.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) selection: Selection,
    pub(crate) generation: u64,
    pub(crate) batches: Vec<BatchRecord>,
    pub(crate) fields: BatchFields,
    pub(crate) entries: EntryCollection,
}

impl SessionState {
    pub(crate) fn begin_load(&mut self, batch_id: BatchId) -> LoadTicket {
        self.generation += 1;
        self.selection = Selection::Loading(batch_id.clone());
        self.fields = BatchFields::default();
        self.entries = EntryCollection::default();
        LoadTicket {
            batch_id,
            generation: self.generation,
        }
    }

    pub(crate) fn current_ticket(&self) -> Option<LoadTicket> {
        self.selection.batch_id().map(|batch_id| LoadTicket {
            batch_id: batch_id.clone(),
            generation: self.generation,
        })
    }

    pub(crate) fn ready_ticket(&self) -> Option<LoadTicket> {
        if self.selection.is_ready() {
            self.current_ticket()
        } else {
            None
        }
    }

    pub(crate) fn ticket_for(&self, batch_id: &BatchId) -> Option<LoadTicket> {
        self.current_ticket()
            .filter(|ticket| &ticket.batch_id == batch_id)
    }

    pub(crate) fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.generation == ticket.generation && self.selection.batch_id() == Some(&ticket.batch_id)
    }
}

/// Read model handed to the presentation shell.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub batches: Vec<BatchRecord>,
    pub selection: Selection,
    pub fields: BatchFields,
    pub entries: Vec<PayrollEntry>,
    pub total_amount: Decimal,
}

pub struct BatchSessionController {
    remote: Arc<dyn PayrollRemote>,
    state: Arc<Mutex<SessionState>>,
    entries: EntryCollectionStore,
    events: broadcast::Sender<ClientEvent>,
}

impl BatchSessionController {
    pub fn new(remote: Arc<dyn PayrollRemote>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let state = Arc::new(Mutex::new(SessionState::default()));
        let entries = EntryCollectionStore::new(
            Arc::clone(&remote),
            Arc::clone(&state),
            events.clone(),
        );
        Arc::new(Self {
            remote,
            state,
            entries,
            events,
        })
    }

    pub fn connect(base_url: &str) -> Result<Arc<Self>, RemoteFailure> {
        let remote = HttpPayrollRemote::new(base_url)?;
        Ok(Self::new(Arc::new(remote)))
    }

    pub fn entries(&self) -> &EntryCollectionStore {
        &self.entries
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn selection(&self) -> Selection {
        self.state.lock().await.selection.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            batches: state.batches.clone(),
            selection: state.selection.clone(),
            fields: state.fields.clone(),
            entries: state.entries.as_slice().to_vec(),
            total_amount: state.entries.total_amount(),
        }
    }

    /// Fetches the batch list. With nothing selected yet, the first batch
    /// returned is selected and loaded before this returns.
    pub async fn list_batches(&self) -> Result<Vec<BatchRecord>, SessionError> {
        let batches = match self.remote.list_batches().await {
            Ok(batches) => batches,
            Err(err) => {
                warn!(error = %err, "session: failed to fetch batches");
                self.state.lock().await.batches.clear();
                let _ = self.events.send(ClientEvent::BatchesListed(Vec::new()));
                return Err(SessionError::Fetch(err));
            }
        };

        let auto_selected = {
            let mut state = self.state.lock().await;
            state.batches = batches.clone();
            match batches.first() {
                Some(first) if state.selection == Selection::NoBatch => {
                    Some(state.begin_load(first.id.clone()))
                }
                _ => None,
            }
        };

        info!(count = batches.len(), "session: batches listed");
        let _ = self.events.send(ClientEvent::BatchesListed(batches.clone()));

        if let Some(ticket) = auto_selected {
            info!(batch = %ticket.batch_id, "session: selecting first batch by default");
            let _ = self
                .events
                .send(ClientEvent::SelectionChanged(Selection::Loading(
                    ticket.batch_id.clone(),
                )));
            self.complete_load(ticket).await;
        }
        Ok(batches)
    }

    pub async fn select_batch(&self, batch_id: BatchId) -> LoadOutcome {
        let ticket = self.state.lock().await.begin_load(batch_id.clone());
        info!(batch = %batch_id, generation = ticket.generation, "session: loading batch");
        let _ = self
            .events
            .send(ClientEvent::SelectionChanged(Selection::Loading(batch_id)));
        self.complete_load(ticket).await
    }

    /// Fire-and-forget variant of [`Self::select_batch`] for shells that
    /// must stay responsive while the batch loads.
    pub fn spawn_select_batch(self: &Arc<Self>, batch_id: BatchId) -> JoinHandle<LoadOutcome> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.select_batch(batch_id).await })
    }

    async fn complete_load(&self, ticket: LoadTicket) -> LoadOutcome {
        let (entries, detail) = futures::join!(
            self.entries.fetch(&ticket),
            self.remote.get_batch(&ticket.batch_id)
        );

        let mut state = self.state.lock().await;
        if !state.is_current(&ticket) {
            debug!(
                batch = %ticket.batch_id,
                generation = ticket.generation,
                "session: discarding stale batch load"
            );
            return LoadOutcome::Superseded;
        }

        let mut outcome = LoadOutcome::Applied;
        match entries {
            Ok(entries) => state.entries.replace(entries),
            Err(err) => {
                warn!(batch = %ticket.batch_id, error = %err, "session: failed to fetch payroll entries");
                outcome = LoadOutcome::Degraded;
            }
        }
        match detail {
            Ok(record) => state.fields = BatchFields::from_record(&record),
            Err(err) => {
                warn!(batch = %ticket.batch_id, error = %err, "session: failed to fetch batch details");
                outcome = LoadOutcome::Degraded;
            }
        }
        state.selection = Selection::Ready(ticket.batch_id.clone());
        let fields = state.fields.clone();
        let entries = state.entries.as_slice().to_vec();
        drop(state);

        info!(batch = %ticket.batch_id, entries = entries.len(), "session: batch ready");
        let _ = self
            .events
            .send(ClientEvent::SelectionChanged(Selection::Ready(
                ticket.batch_id.clone(),
            )));
        let _ = self.events.send(ClientEvent::BatchLoaded {
            batch_id: ticket.batch_id,
            fields,
            entries,
        });
        outcome
    }

    /// Local edit only; fields reach the service on save or submit.
    pub async fn update_batch_field(&self, field: BatchField, value: impl Into<String>) {
        let fields = {
            let mut state = self.state.lock().await;
            state.fields.set(field, value.into());
            state.fields.clone()
        };
        let _ = self.events.send(ClientEvent::FieldsChanged(fields));
    }

    pub async fn save_details(&self) -> Result<PushOutcome, SessionError> {
        self.push_details(None).await
    }

    /// Saves the fields and marks the batch submitted in the same request.
    pub async fn submit_for_processing(&self) -> Result<PushOutcome, SessionError> {
        self.push_details(Some(BatchStatus::Submitted)).await
    }

    async fn push_details(&self, status: Option<BatchStatus>) -> Result<PushOutcome, SessionError> {
        let (ticket, body) = {
            let state = self.state.lock().await;
            let Some(ticket) = state.ready_ticket() else {
                debug!("session: no batch ready, push skipped");
                return Ok(PushOutcome::Skipped);
            };
            (ticket, state.fields.update_request(status))
        };
        let submitting = status == Some(BatchStatus::Submitted);

        let record = match self.remote.update_batch(&ticket.batch_id, &body).await {
            Ok(record) => record,
            Err(err) => {
                let message = if submitting {
                    "Failed to submit batch"
                } else {
                    "Failed to save batch details"
                };
                notify_failure(&self.events, &err, message);
                return Err(SessionError::Mutation(err));
            }
        };

        if submitting {
            let fields = {
                let mut state = self.state.lock().await;
                if state.is_current(&ticket) {
                    state.fields.status = BatchStatus::Submitted;
                    Some(state.fields.clone())
                } else {
                    None
                }
            };
            if let Some(fields) = fields {
                let _ = self.events.send(ClientEvent::FieldsChanged(fields));
            }
            info!(batch = %ticket.batch_id, "session: batch submitted for processing");
            let _ = self.events.send(ClientEvent::Notice(Notification::success(
                "Submitted successfully!",
            )));
        } else {
            info!(batch = %ticket.batch_id, "session: batch details saved");
        }
        Ok(PushOutcome::Pushed(record))
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
