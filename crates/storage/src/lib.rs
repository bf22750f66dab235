use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{BatchId, BatchStatus, EntryId};

const BATCH_COLUMNS: &str =
    "id, payment_type, debit_account, account_type, payment_date, status, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, batch_id, method, payee_details, payee_name, bank_details, \
     your_reference, payment_reference, amount, notes, created_at, updated_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredBatch {
    pub id: BatchId,
    pub payment_type: Option<String>,
    pub debit_account: Option<String>,
    pub account_type: Option<String>,
    pub payment_date: Option<String>,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Batch-level values written on create or update. `status: None` keeps the
/// stored status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchValues {
    pub payment_type: Option<String>,
    pub debit_account: Option<String>,
    pub account_type: Option<String>,
    pub payment_date: Option<String>,
    pub status: Option<BatchStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub id: EntryId,
    pub batch_id: BatchId,
    pub values: EntryValues,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated entry columns. The amount is already a checked decimal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryValues {
    pub method: String,
    pub payee_details: String,
    pub payee_name: String,
    pub bank_details: String,
    pub your_reference: String,
    pub payment_reference: String,
    pub amount: Option<Decimal>,
    pub notes: String,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_batch(&self, id: &BatchId, values: &BatchValues) -> Result<StoredBatch> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO batches
                 (id, payment_type, debit_account, account_type, payment_date, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {BATCH_COLUMNS}"
        ))
        .bind(id.as_str())
        .bind(values.payment_type.as_deref())
        .bind(values.debit_account.as_deref())
        .bind(values.account_type.as_deref())
        .bind(values.payment_date.as_deref())
        .bind(values.status.unwrap_or_default().as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to create batch '{id}'"))?;
        batch_from_row(&row)
    }

    pub async fn list_batches(&self) -> Result<Vec<StoredBatch>> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_from_row).collect()
    }

    pub async fn get_batch(&self, id: &BatchId) -> Result<Option<StoredBatch>> {
        let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    /// Overwrites every batch-level field. Returns `None` for an unknown id.
    pub async fn update_batch(
        &self,
        id: &BatchId,
        values: &BatchValues,
    ) -> Result<Option<StoredBatch>> {
        let row = sqlx::query(&format!(
            "UPDATE batches
             SET payment_type = ?, debit_account = ?, account_type = ?, payment_date = ?,
                 status = COALESCE(?, status), updated_at = ?
             WHERE id = ?
             RETURNING {BATCH_COLUMNS}"
        ))
        .bind(values.payment_type.as_deref())
        .bind(values.debit_account.as_deref())
        .bind(values.account_type.as_deref())
        .bind(values.payment_date.as_deref())
        .bind(values.status.map(BatchStatus::as_str))
        .bind(Utc::now())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to update batch '{id}'"))?;
        row.as_ref().map(batch_from_row).transpose()
    }

    pub async fn list_entries(&self, batch_id: &BatchId) -> Result<Vec<StoredEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM payroll_entries WHERE batch_id = ? ORDER BY id"
        ))
        .bind(batch_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    pub async fn get_entry(&self, id: EntryId) -> Result<Option<StoredEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM payroll_entries WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    pub async fn create_entry(
        &self,
        batch_id: &BatchId,
        values: &EntryValues,
    ) -> Result<StoredEntry> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO payroll_entries
                 (batch_id, method, payee_details, payee_name, bank_details, your_reference,
                  payment_reference, amount, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(batch_id.as_str())
        .bind(values.method.as_str())
        .bind(values.payee_details.as_str())
        .bind(values.payee_name.as_str())
        .bind(values.bank_details.as_str())
        .bind(values.your_reference.as_str())
        .bind(values.payment_reference.as_str())
        .bind(values.amount.map(|amount| amount.normalize().to_string()))
        .bind(values.notes.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to create entry in batch '{batch_id}'"))?;
        entry_from_row(&row)
    }

    /// Replaces every column of an entry. Returns `None` for an unknown id.
    pub async fn update_entry(
        &self,
        id: EntryId,
        values: &EntryValues,
    ) -> Result<Option<StoredEntry>> {
        let row = sqlx::query(&format!(
            "UPDATE payroll_entries
             SET method = ?, payee_details = ?, payee_name = ?, bank_details = ?,
                 your_reference = ?, payment_reference = ?, amount = ?, notes = ?,
                 updated_at = ?
             WHERE id = ?
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(values.method.as_str())
        .bind(values.payee_details.as_str())
        .bind(values.payee_name.as_str())
        .bind(values.bank_details.as_str())
        .bind(values.your_reference.as_str())
        .bind(values.payment_reference.as_str())
        .bind(values.amount.map(|amount| amount.normalize().to_string()))
        .bind(values.notes.as_str())
        .bind(Utc::now())
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to update entry {id}"))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    /// Returns whether a row was deleted.
    pub async fn delete_entry(&self, id: EntryId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM payroll_entries WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete entry {id}"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn batch_from_row(row: &SqliteRow) -> Result<StoredBatch> {
    let status: String = row.try_get("status")?;
    Ok(StoredBatch {
        id: BatchId(row.try_get("id")?),
        payment_type: row.try_get("payment_type")?,
        debit_account: row.try_get("debit_account")?,
        account_type: row.try_get("account_type")?,
        payment_date: row.try_get("payment_date")?,
        status: BatchStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown batch status '{status}' in storage"))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<StoredEntry> {
    let id = EntryId(row.try_get("id")?);
    let amount = row
        .try_get::<Option<String>, _>("amount")?
        .map(|raw| {
            Decimal::from_str(&raw).with_context(|| format!("entry {id} has a corrupt amount '{raw}'"))
        })
        .transpose()?;
    Ok(StoredEntry {
        id,
        batch_id: BatchId(row.try_get("batch_id")?),
        values: EntryValues {
            method: row.try_get("method")?,
            payee_details: row.try_get("payee_details")?,
            payee_name: row.try_get("payee_name")?,
            bank_details: row.try_get("bank_details")?,
            your_reference: row.try_get("your_reference")?,
            payment_reference: row.try_get("payment_reference")?,
            amount,
            notes: row.try_get("notes")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
