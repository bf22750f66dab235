//! Typed transport wrapper around the payroll service.
//!
//! Every call either yields its payload or a [`RemoteError`] naming the
//! operation that failed. There is no retry, timeout or business logic here.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{BatchId, EntryId},
    protocol::{BatchRecord, BatchUpdateRequest, PayrollEntry},
};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    ListBatches,
    GetBatch,
    UpdateBatch,
    ListEntries,
    CreateEntry,
    UpdateEntry,
    DeleteEntry,
}

impl RemoteOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListBatches => "list_batches",
            Self::GetBatch => "get_batch",
            Self::UpdateBatch => "update_batch",
            Self::ListEntries => "list_entries",
            Self::CreateEntry => "create_entry",
            Self::UpdateEntry => "update_entry",
            Self::DeleteEntry => "delete_entry",
        }
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid base url '{0}'")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {failure}")]
pub struct RemoteError {
    pub operation: RemoteOperation,
    #[source]
    pub failure: RemoteFailure,
}

impl RemoteError {
    pub fn new(operation: RemoteOperation, failure: RemoteFailure) -> Self {
        Self { operation, failure }
    }
}

#[async_trait]
pub trait PayrollRemote: Send + Sync {
    async fn list_batches(&self) -> Result<Vec<BatchRecord>, RemoteError>;
    async fn get_batch(&self, batch_id: &BatchId) -> Result<BatchRecord, RemoteError>;
    async fn update_batch(
        &self,
        batch_id: &BatchId,
        body: &BatchUpdateRequest,
    ) -> Result<BatchRecord, RemoteError>;
    async fn list_entries(&self, batch_id: &BatchId) -> Result<Vec<PayrollEntry>, RemoteError>;
    async fn create_entry(
        &self,
        batch_id: &BatchId,
        draft: &PayrollEntry,
    ) -> Result<PayrollEntry, RemoteError>;
    async fn update_entry(
        &self,
        entry_id: EntryId,
        entry: &PayrollEntry,
    ) -> Result<PayrollEntry, RemoteError>;
    async fn delete_entry(&self, entry_id: EntryId) -> Result<(), RemoteError>;
}

/// [`PayrollRemote`] over HTTP/JSON, rooted at a base URL such as
/// `http://localhost:8080/api`.
#[derive(Clone)]
pub struct HttpPayrollRemote {
    http: Client,
    base_url: Url,
}

impl HttpPayrollRemote {
    pub fn new(base_url: &str) -> Result<Self, RemoteFailure> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, RemoteFailure> {
        let invalid = || RemoteFailure::InvalidBaseUrl(base_url.to_string());
        let parsed = Url::parse(base_url.trim()).map_err(|_| invalid())?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(invalid());
        }
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        operation: RemoteOperation,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = request.send().await.map_err(|err| {
            RemoteError::new(operation, RemoteFailure::Transport(err.to_string()))
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(
            operation,
            RemoteFailure::Status {
                status: status.as_u16(),
                body,
            },
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: RemoteOperation,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| RemoteError::new(operation, RemoteFailure::Decode(err.to_string())))
    }
}

#[async_trait]
impl PayrollRemote for HttpPayrollRemote {
    async fn list_batches(&self) -> Result<Vec<BatchRecord>, RemoteError> {
        let url = self.endpoint(&["batches"]);
        self.send_json(RemoteOperation::ListBatches, self.http.get(url))
            .await
    }

    async fn get_batch(&self, batch_id: &BatchId) -> Result<BatchRecord, RemoteError> {
        let url = self.endpoint(&["batches", batch_id.as_str()]);
        self.send_json(RemoteOperation::GetBatch, self.http.get(url))
            .await
    }

    async fn update_batch(
        &self,
        batch_id: &BatchId,
        body: &BatchUpdateRequest,
    ) -> Result<BatchRecord, RemoteError> {
        let url = self.endpoint(&["batches", batch_id.as_str()]);
        self.send_json(RemoteOperation::UpdateBatch, self.http.put(url).json(body))
            .await
    }

    async fn list_entries(&self, batch_id: &BatchId) -> Result<Vec<PayrollEntry>, RemoteError> {
        let url = self.endpoint(&["batches", batch_id.as_str(), "entries"]);
        self.send_json(RemoteOperation::ListEntries, self.http.get(url))
            .await
    }

    async fn create_entry(
        &self,
        batch_id: &BatchId,
        draft: &PayrollEntry,
    ) -> Result<PayrollEntry, RemoteError> {
        let url = self.endpoint(&["batches", batch_id.as_str(), "entries"]);
        self.send_json(RemoteOperation::CreateEntry, self.http.post(url).json(draft))
            .await
    }

    async fn update_entry(
        &self,
        entry_id: EntryId,
        entry: &PayrollEntry,
    ) -> Result<PayrollEntry, RemoteError> {
        let id = entry_id.to_string();
        let url = self.endpoint(&["batches", "entries", id.as_str()]);
        self.send_json(RemoteOperation::UpdateEntry, self.http.put(url).json(entry))
            .await
    }

    async fn delete_entry(&self, entry_id: EntryId) -> Result<(), RemoteError> {
        let id = entry_id.to_string();
        let url = self.endpoint(&["batches", "entries", id.as_str()]);
        self.send(RemoteOperation::DeleteEntry, self.http.delete(url))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
