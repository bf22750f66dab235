//! Console command language and the text rendering of the session.

use std::fmt::Write as _;

use clap::{Parser, Subcommand};
use client_core::{
    BatchField, ClientEvent, EntryField, LoadOutcome, NoticeLevel, PayrollHandle, PushOutcome,
    SessionError, SessionSnapshot,
};
use shared::{
    domain::{BatchId, EntryId},
    protocol::BatchRecord,
};
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Reload the batch list.
    Batches,
    /// Switch to another batch.
    Select { batch_id: String },
    /// Print the selected batch and its entries.
    Show {
        #[arg(long)]
        json: bool,
    },
    AddRow,
    /// Edit one entry field; the row is pushed right away.
    SetEntry {
        entry_id: i64,
        field: EntryField,
        #[arg(num_args = 0.., allow_hyphen_values = true)]
        value: Vec<String>,
    },
    RemoveRow { entry_id: Option<i64> },
    /// Edit one batch field locally; `save` pushes it.
    SetBatch {
        field: BatchField,
        #[arg(num_args = 0.., allow_hyphen_values = true)]
        value: Vec<String>,
    },
    Save,
    Submit,
    #[command(alias = "exit")]
    Quit,
}

impl ConsoleCommand {
    pub fn parse_words<I, S>(words: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString> + Clone,
    {
        CommandLine::try_parse_from(words).map(|line| line.command)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Output(String),
    Quit,
}

pub async fn execute(
    handle: &dyn PayrollHandle,
    command: ConsoleCommand,
) -> Result<Outcome, SessionError> {
    tracing::debug!(?command, "console command");
    let output = match command {
        ConsoleCommand::Batches => render_batches(&handle.list_batches().await?),
        ConsoleCommand::Select { batch_id } => {
            match handle.select_batch(BatchId::from(batch_id)).await {
                LoadOutcome::Superseded => "selection was superseded".to_string(),
                LoadOutcome::Degraded => {
                    let mut out = render_snapshot(&handle.snapshot().await);
                    out.push_str("(some batch data could not be loaded)\n");
                    out
                }
                LoadOutcome::Applied => render_snapshot(&handle.snapshot().await),
            }
        }
        ConsoleCommand::Show { json: true } => serde_json::to_string_pretty(&handle.snapshot().await)
            .unwrap_or_else(|err| format!("snapshot could not be encoded: {err}")),
        ConsoleCommand::Show { json: false } => render_snapshot(&handle.snapshot().await),
        ConsoleCommand::AddRow => match handle.add_row().await? {
            Some(entry) => format!(
                "added entry {} ({})",
                entry.id.map(|id| id.to_string()).unwrap_or_default(),
                entry.payment_reference
            ),
            None => "no batch is ready; nothing added".to_string(),
        },
        ConsoleCommand::SetEntry {
            entry_id,
            field,
            value,
        } => {
            let entry = handle
                .update_entry_field(EntryId(entry_id), field, value.join(" "))
                .await?;
            format!("entry {entry_id} saved ({} {})", entry.payee_name, entry.amount.value())
        }
        ConsoleCommand::RemoveRow { entry_id } => {
            if handle.remove_row(entry_id.map(EntryId)).await? {
                format!("entry {} removed", entry_id.unwrap_or_default())
            } else {
                "row has no id; nothing to delete".to_string()
            }
        }
        ConsoleCommand::SetBatch { field, value } => {
            handle.update_batch_field(field, value.join(" ")).await;
            "batch field updated locally; run `save` to push it".to_string()
        }
        ConsoleCommand::Save => describe_push(handle.save_details().await?, "batch details saved"),
        ConsoleCommand::Submit => describe_push(handle.submit().await?, "batch submitted"),
        ConsoleCommand::Quit => return Ok(Outcome::Quit),
    };
    Ok(Outcome::Output(output))
}

fn describe_push(outcome: PushOutcome, done: &str) -> String {
    match outcome {
        PushOutcome::Skipped => "no batch is ready; nothing sent".to_string(),
        PushOutcome::Pushed(_) => done.to_string(),
    }
}

/// Notices raised since the last call, one `[ok]`/`[error]` line each.
pub fn drain_notices(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        match events.try_recv() {
            Ok(ClientEvent::Notice(notice)) => {
                let tag = match notice.level {
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Error => "error",
                };
                lines.push(format!("[{tag}] {}", notice.message));
            }
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "console fell behind on session events");
            }
            Err(_) => break,
        }
    }
    lines
}

pub fn render_batches(batches: &[BatchRecord]) -> String {
    if batches.is_empty() {
        return "no batches\n".to_string();
    }
    let mut out = String::new();
    for batch in batches {
        let status = batch.status.unwrap_or_default();
        let _ = writeln!(
            out,
            "{:<16} {:<10} {}",
            batch.id.as_str(),
            status.as_str(),
            batch.payment_date.as_deref().unwrap_or("-")
        );
    }
    out
}

pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    let Some(batch_id) = snapshot.selection.batch_id() else {
        return "no batch selected\n".to_string();
    };
    let state = if snapshot.selection.is_ready() {
        "ready"
    } else {
        "loading"
    };
    let fields = &snapshot.fields;
    let _ = writeln!(out, "batch {batch_id} [{state}] {}", fields.status.as_str());
    let _ = writeln!(
        out,
        "  payment type: {}  currency: {}  debit account: {}  account type: {}  date: {}",
        fields.payment_type,
        fields.currency,
        blank_as_dash(&fields.debit_account),
        blank_as_dash(&fields.account_type),
        blank_as_dash(&fields.payment_date)
    );
    for entry in &snapshot.entries {
        let _ = writeln!(
            out,
            "  {:>6}  {:<5} {:<24} {:<18} {:>14}",
            entry.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            entry.method.as_str(),
            entry.payee_name,
            entry.payment_reference,
            entry.amount.value().to_string()
        );
    }
    let _ = writeln!(
        out,
        "  {} entries, total {}",
        snapshot.entries.len(),
        snapshot.total_amount
    );
    out
}

fn blank_as_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
