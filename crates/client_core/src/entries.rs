//! Ordered entry collection of the selected batch and the intents that keep
//! it consistent with the payroll service.
//!
//! Creation is pessimistic: a row only appears once the service has assigned
//! its id. Field edits and deletions target rows that already have an id, so
//! edits are applied locally first and deletions wait for the acknowledgment.

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use chrono::Utc;
use rust_decimal::Decimal;
use shared::{
    domain::{BatchId, EntryId, PaymentMethod},
    protocol::{Amount, PayrollEntry},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::SessionError,
    events::{notify_failure, ClientEvent},
    remote::{PayrollRemote, RemoteError, RemoteFailure, RemoteOperation},
    session::{LoadOutcome, LoadTicket, SessionState},
};

const DEFAULT_PAYEE_DETAILS: &str = "Empl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryField {
    Method,
    PayeeDetails,
    PayeeName,
    BankDetails,
    YourReference,
    PaymentReference,
    Amount,
    Notes,
}

impl EntryField {
    pub fn apply(self, entry: &mut PayrollEntry, value: String) {
        match self {
            Self::Method => entry.method = PaymentMethod::from(value),
            Self::PayeeDetails => entry.payee_details = value,
            Self::PayeeName => entry.payee_name = value,
            Self::BankDetails => entry.bank_details = value,
            Self::YourReference => entry.your_reference = value,
            Self::PaymentReference => entry.payment_reference = value,
            // Kept as typed; totals read it leniently.
            Self::Amount => entry.amount = Amount::Text(value),
            Self::Notes => entry.notes = value,
        }
    }
}

impl FromStr for EntryField {
    type Err = SessionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_field_name(raw).as_str() {
            "method" => Ok(Self::Method),
            "payeedetails" => Ok(Self::PayeeDetails),
            "payeename" => Ok(Self::PayeeName),
            "bankdetails" => Ok(Self::BankDetails),
            "yourreference" => Ok(Self::YourReference),
            "paymentreference" => Ok(Self::PaymentReference),
            "amount" => Ok(Self::Amount),
            "notes" => Ok(Self::Notes),
            _ => Err(SessionError::UnknownField(raw.to_string())),
        }
    }
}

/// Accepts `payeeName`, `payee_name` and `payee-name` alike.
pub(crate) fn normalize_field_name(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryCollection {
    entries: Vec<PayrollEntry>,
}

impl EntryCollection {
    pub fn as_slice(&self) -> &[PayrollEntry] {
        &self.entries
    }

    pub fn get(&self, entry_id: EntryId) -> Option<&PayrollEntry> {
        self.entries
            .iter()
            .find(|entry| entry.id == Some(entry_id))
    }

    pub fn replace(&mut self, entries: Vec<PayrollEntry>) {
        self.entries = entries;
    }

    pub fn append(&mut self, entry: PayrollEntry) {
        self.entries.push(entry);
    }

    /// Applies one field change and returns the updated row.
    pub fn apply_field(
        &mut self,
        entry_id: EntryId,
        field: EntryField,
        value: String,
    ) -> Option<PayrollEntry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == Some(entry_id))?;
        field.apply(entry, value);
        Some(entry.clone())
    }

    pub fn remove(&mut self, entry_id: EntryId) -> Option<PayrollEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.id == Some(entry_id))?;
        Some(self.entries.remove(index))
    }

    /// Saturates at `Decimal::MAX` rather than overflowing.
    pub fn total_amount(&self) -> Decimal {
        self.entries
            .iter()
            .fold(Decimal::ZERO, |total, entry| {
                total.saturating_add(entry.amount.value())
            })
    }

    /// Draft row for the next position in `batch_id`.
    pub fn draft(&self, batch_id: &BatchId, payment_reference: String) -> PayrollEntry {
        let position = self.entries.len() + 1;
        PayrollEntry {
            id: None,
            method: PaymentMethod::Neft,
            payee_details: DEFAULT_PAYEE_DETAILS.to_string(),
            payee_name: format!("Employee {position}"),
            bank_details: String::new(),
            your_reference: format!("Salary-{batch_id}-{position}"),
            payment_reference,
            amount: Amount::zero(),
            notes: String::new(),
        }
    }
}

/// Hands out `PAY-<millis>` references that never repeat within a process,
/// even when two drafts are built in the same millisecond.
#[derive(Debug, Default)]
pub struct PaymentReferenceSource {
    last: AtomicI64,
}

impl PaymentReferenceSource {
    pub fn next_reference(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        format!("PAY-{}", now.max(previous + 1))
    }
}

pub struct EntryCollectionStore {
    remote: Arc<dyn PayrollRemote>,
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<ClientEvent>,
    references: PaymentReferenceSource,
}

impl EntryCollectionStore {
    pub(crate) fn new(
        remote: Arc<dyn PayrollRemote>,
        state: Arc<Mutex<SessionState>>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            remote,
            state,
            events,
            references: PaymentReferenceSource::default(),
        }
    }

    pub(crate) async fn fetch(
        &self,
        ticket: &LoadTicket,
    ) -> Result<Vec<PayrollEntry>, RemoteError> {
        self.remote.list_entries(&ticket.batch_id).await
    }

    pub async fn entries(&self) -> Vec<PayrollEntry> {
        self.state.lock().await.entries.as_slice().to_vec()
    }

    pub async fn total_amount(&self) -> Decimal {
        self.state.lock().await.entries.total_amount()
    }

    /// Reloads the whole sequence of the selected batch. The result is
    /// dropped if another selection happened while the fetch was in flight.
    pub async fn load_entries(&self, batch_id: &BatchId) -> LoadOutcome {
        let Some(ticket) = self.state.lock().await.ticket_for(batch_id) else {
            debug!(batch = %batch_id, "entries: batch is not selected, load ignored");
            return LoadOutcome::Superseded;
        };

        let fetched = self.fetch(&ticket).await;

        let mut state = self.state.lock().await;
        if !state.is_current(&ticket) {
            debug!(
                batch = %ticket.batch_id,
                generation = ticket.generation,
                "entries: discarding stale entry load"
            );
            return LoadOutcome::Superseded;
        }

        let outcome = match fetched {
            Ok(entries) => {
                state.entries.replace(entries);
                LoadOutcome::Applied
            }
            Err(err) => {
                warn!(batch = %batch_id, error = %err, "entries: failed to fetch payroll entries");
                state.entries.replace(Vec::new());
                LoadOutcome::Degraded
            }
        };
        let entries = state.entries.as_slice().to_vec();
        drop(state);

        let _ = self.events.send(ClientEvent::EntriesReplaced {
            batch_id: ticket.batch_id,
            entries,
        });
        outcome
    }

    /// Creates a draft row remotely and appends it once the service returns
    /// it with an id. Returns `Ok(None)` when no batch is ready.
    pub async fn add_row(&self) -> Result<Option<PayrollEntry>, SessionError> {
        let (ticket, draft) = {
            let state = self.state.lock().await;
            let Some(ticket) = state.ready_ticket() else {
                debug!("entries: no batch ready, add_row ignored");
                return Ok(None);
            };
            let draft = state
                .entries
                .draft(&ticket.batch_id, self.references.next_reference());
            (ticket, draft)
        };

        let created = self
            .remote
            .create_entry(&ticket.batch_id, &draft)
            .await
            .and_then(|created| match created.id {
                Some(_) => Ok(created),
                None => Err(RemoteError::new(
                    RemoteOperation::CreateEntry,
                    RemoteFailure::Decode("created entry carries no id".to_string()),
                )),
            });

        let created = match created {
            Ok(created) => created,
            Err(err) => {
                notify_failure(&self.events, &err, "Failed to add payroll entry");
                return Err(SessionError::Mutation(err));
            }
        };

        let mut state = self.state.lock().await;
        if !state.is_current(&ticket) {
            warn!(
                batch = %ticket.batch_id,
                entry = ?created.id,
                "entries: created entry belongs to a batch that is no longer selected"
            );
            return Ok(Some(created));
        }
        state.entries.append(created.clone());
        drop(state);

        info!(batch = %ticket.batch_id, entry = ?created.id, "entries: payroll entry created");
        let _ = self.events.send(ClientEvent::EntryAdded {
            batch_id: ticket.batch_id,
            entry: created.clone(),
        });
        Ok(Some(created))
    }

    /// Edits one field locally, then pushes the whole row. A failed push is
    /// reported but the local value stays.
    pub async fn update_entry_field(
        &self,
        entry_id: EntryId,
        field: EntryField,
        value: impl Into<String>,
    ) -> Result<PayrollEntry, SessionError> {
        let (batch_id, updated) = {
            let mut state = self.state.lock().await;
            let Some(batch_id) = state.selection.batch_id().cloned() else {
                return Err(SessionError::UnknownEntry(entry_id));
            };
            let updated = state
                .entries
                .apply_field(entry_id, field, value.into())
                .ok_or(SessionError::UnknownEntry(entry_id))?;
            (batch_id, updated)
        };

        let _ = self.events.send(ClientEvent::EntryChanged {
            batch_id,
            entry: updated.clone(),
        });

        match self.remote.update_entry(entry_id, &updated).await {
            Ok(_) => {
                debug!(entry = %entry_id, ?field, "entries: payroll entry pushed");
                Ok(updated)
            }
            Err(err) => {
                notify_failure(&self.events, &err, "Failed to update payroll entry");
                Err(SessionError::Mutation(err))
            }
        }
    }

    /// Deletes a persisted row and drops it locally once acknowledged.
    /// A row without an id was never stored remotely; nothing is sent.
    pub async fn remove_row(&self, entry_id: Option<EntryId>) -> Result<bool, SessionError> {
        let Some(entry_id) = entry_id else {
            debug!("entries: row has no id, nothing to delete");
            return Ok(false);
        };

        let ticket = {
            let state = self.state.lock().await;
            match state.current_ticket() {
                Some(ticket) if state.entries.get(entry_id).is_some() => ticket,
                _ => return Err(SessionError::UnknownEntry(entry_id)),
            }
        };

        if let Err(err) = self.remote.delete_entry(entry_id).await {
            notify_failure(&self.events, &err, "Failed to delete payroll entry");
            return Err(SessionError::Mutation(err));
        }

        let mut state = self.state.lock().await;
        if state.is_current(&ticket) && state.entries.remove(entry_id).is_some() {
            drop(state);
            info!(batch = %ticket.batch_id, entry = %entry_id, "entries: payroll entry deleted");
            let _ = self.events.send(ClientEvent::EntryRemoved {
                batch_id: ticket.batch_id,
                entry_id,
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "tests/entries_tests.rs"]
mod tests;
