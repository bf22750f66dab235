use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{BatchId, EntryId},
    protocol::{BatchRecord, PayrollEntry},
};
use tokio::sync::broadcast;

pub mod entries;
pub mod error;
pub mod events;
pub mod remote;
pub mod session;

pub use entries::{EntryCollection, EntryCollectionStore, EntryField, PaymentReferenceSource};
pub use error::SessionError;
pub use events::{ClientEvent, NoticeLevel, Notification};
pub use remote::{HttpPayrollRemote, PayrollRemote, RemoteError, RemoteFailure, RemoteOperation};
pub use session::{
    BatchField, BatchFields, BatchSessionController, LoadOutcome, LoadTicket, PushOutcome,
    Selection, SessionSnapshot,
};

/// Intents a presentation shell forwards into the engine, plus the read
/// side it renders from.
#[async_trait]
pub trait PayrollHandle: Send + Sync {
    async fn list_batches(&self) -> Result<Vec<BatchRecord>, SessionError>;
    async fn select_batch(&self, batch_id: BatchId) -> LoadOutcome;
    async fn update_batch_field(&self, field: BatchField, value: String);
    async fn save_details(&self) -> Result<PushOutcome, SessionError>;
    async fn submit(&self) -> Result<PushOutcome, SessionError>;
    async fn add_row(&self) -> Result<Option<PayrollEntry>, SessionError>;
    async fn update_entry_field(
        &self,
        entry_id: EntryId,
        field: EntryField,
        value: String,
    ) -> Result<PayrollEntry, SessionError>;
    async fn remove_row(&self, entry_id: Option<EntryId>) -> Result<bool, SessionError>;
    async fn snapshot(&self) -> SessionSnapshot;
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

#[async_trait]
impl PayrollHandle for Arc<BatchSessionController> {
    async fn list_batches(&self) -> Result<Vec<BatchRecord>, SessionError> {
        BatchSessionController::list_batches(self).await
    }

    async fn select_batch(&self, batch_id: BatchId) -> LoadOutcome {
        BatchSessionController::select_batch(self, batch_id).await
    }

    async fn update_batch_field(&self, field: BatchField, value: String) {
        BatchSessionController::update_batch_field(self, field, value).await
    }

    async fn save_details(&self) -> Result<PushOutcome, SessionError> {
        BatchSessionController::save_details(self).await
    }

    async fn submit(&self) -> Result<PushOutcome, SessionError> {
        self.submit_for_processing().await
    }

    async fn add_row(&self) -> Result<Option<PayrollEntry>, SessionError> {
        self.entries().add_row().await
    }

    async fn update_entry_field(
        &self,
        entry_id: EntryId,
        field: EntryField,
        value: String,
    ) -> Result<PayrollEntry, SessionError> {
        self.entries()
            .update_entry_field(entry_id, field, value)
            .await
    }

    async fn remove_row(&self, entry_id: Option<EntryId>) -> Result<bool, SessionError> {
        self.entries().remove_row(entry_id).await
    }

    async fn snapshot(&self) -> SessionSnapshot {
        BatchSessionController::snapshot(self).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        BatchSessionController::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
