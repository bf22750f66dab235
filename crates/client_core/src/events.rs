//! Events broadcast to the presentation shell.

use serde::Serialize;
use shared::{
    domain::{BatchId, EntryId},
    protocol::{BatchRecord, PayrollEntry},
};
use tokio::sync::broadcast;
use tracing::warn;

use crate::{
    remote::{RemoteError, RemoteOperation},
    session::{BatchFields, Selection},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-visible message raised by an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NoticeLevel,
    pub message: String,
    #[serde(skip)]
    pub operation: Option<RemoteOperation>,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            operation: None,
        }
    }

    pub fn error(operation: RemoteOperation, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            operation: Some(operation),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    BatchesListed(Vec<BatchRecord>),
    SelectionChanged(Selection),
    BatchLoaded {
        batch_id: BatchId,
        fields: BatchFields,
        entries: Vec<PayrollEntry>,
    },
    EntriesReplaced {
        batch_id: BatchId,
        entries: Vec<PayrollEntry>,
    },
    FieldsChanged(BatchFields),
    EntryAdded {
        batch_id: BatchId,
        entry: PayrollEntry,
    },
    EntryChanged {
        batch_id: BatchId,
        entry: PayrollEntry,
    },
    EntryRemoved {
        batch_id: BatchId,
        entry_id: EntryId,
    },
    Notice(Notification),
}

pub(crate) fn notify_failure(
    events: &broadcast::Sender<ClientEvent>,
    err: &RemoteError,
    message: &str,
) {
    warn!(operation = %err.operation, error = %err, "{message}");
    let _ = events.send(ClientEvent::Notice(Notification::error(
        err.operation,
        message,
    )));
}
