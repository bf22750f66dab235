use shared::domain::EntryId;
use thiserror::Error;

use crate::remote::RemoteError;

/// Failure of one session intent. Nothing here is fatal to the session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Listing or loading failed; state degraded to empty or unchanged.
    #[error("fetch failed: {0}")]
    Fetch(#[source] RemoteError),
    /// A push was rejected; local state was kept as the user left it.
    #[error("mutation failed: {0}")]
    Mutation(#[source] RemoteError),
    #[error("no entry {0} in the current batch")]
    UnknownEntry(EntryId),
    #[error("unknown field '{0}'")]
    UnknownField(String),
}
