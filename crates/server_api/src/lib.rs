use chrono::NaiveDate;
use shared::{
    domain::{BatchId, EntryId, PaymentMethod},
    error::{ApiError, ErrorCode},
    protocol::{Amount, BatchRecord, BatchUpdateRequest, PayrollEntry},
};
use storage::{BatchValues, EntryValues, Storage, StoredBatch, StoredEntry};
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_batches(ctx: &ApiContext) -> Result<Vec<BatchRecord>, ApiError> {
    let batches = ctx.storage.list_batches().await.map_err(internal)?;
    Ok(batches.into_iter().map(batch_record).collect())
}

pub async fn get_batch(ctx: &ApiContext, batch_id: &BatchId) -> Result<BatchRecord, ApiError> {
    ctx.storage
        .get_batch(batch_id)
        .await
        .map_err(internal)?
        .map(batch_record)
        .ok_or_else(|| unknown_batch(batch_id))
}

pub async fn update_batch(
    ctx: &ApiContext,
    batch_id: &BatchId,
    request: BatchUpdateRequest,
) -> Result<BatchRecord, ApiError> {
    let payment_date = request.payment_date.trim();
    if !payment_date.is_empty() && NaiveDate::parse_from_str(payment_date, "%Y-%m-%d").is_err() {
        return Err(ApiError::validation(format!(
            "paymentDate '{payment_date}' must be YYYY-MM-DD"
        )));
    }

    let values = BatchValues {
        payment_type: Some(request.payment_type),
        debit_account: Some(request.debit_account),
        account_type: Some(request.account_type),
        payment_date: Some(payment_date.to_string()),
        status: request.status,
    };
    let updated = ctx
        .storage
        .update_batch(batch_id, &values)
        .await
        .map_err(internal)?
        .ok_or_else(|| unknown_batch(batch_id))?;
    info!(batch = %batch_id, status = updated.status.as_str(), "batch details saved");
    Ok(batch_record(updated))
}

pub async fn list_entries(
    ctx: &ApiContext,
    batch_id: &BatchId,
) -> Result<Vec<PayrollEntry>, ApiError> {
    ensure_batch_exists(ctx, batch_id).await?;
    let entries = ctx
        .storage
        .list_entries(batch_id)
        .await
        .map_err(internal)?;
    Ok(entries.into_iter().map(entry_record).collect())
}

/// Stores a new entry. Any id in the request body is ignored; the stored
/// row's id is returned.
pub async fn create_entry(
    ctx: &ApiContext,
    batch_id: &BatchId,
    draft: &PayrollEntry,
) -> Result<PayrollEntry, ApiError> {
    let values = entry_values(draft)?;
    ensure_batch_exists(ctx, batch_id).await?;
    let created = ctx
        .storage
        .create_entry(batch_id, &values)
        .await
        .map_err(internal)?;
    info!(batch = %batch_id, entry = %created.id, "payroll entry created");
    Ok(entry_record(created))
}

pub async fn update_entry(
    ctx: &ApiContext,
    entry_id: EntryId,
    entry: &PayrollEntry,
) -> Result<PayrollEntry, ApiError> {
    let values = entry_values(entry)?;
    let updated = ctx
        .storage
        .update_entry(entry_id, &values)
        .await
        .map_err(internal)?
        .ok_or_else(|| unknown_entry(entry_id))?;
    Ok(entry_record(updated))
}

pub async fn delete_entry(ctx: &ApiContext, entry_id: EntryId) -> Result<(), ApiError> {
    if !ctx
        .storage
        .delete_entry(entry_id)
        .await
        .map_err(internal)?
    {
        return Err(unknown_entry(entry_id));
    }
    info!(entry = %entry_id, "payroll entry deleted");
    Ok(())
}

async fn ensure_batch_exists(ctx: &ApiContext, batch_id: &BatchId) -> Result<(), ApiError> {
    match ctx.storage.get_batch(batch_id).await.map_err(internal)? {
        Some(_) => Ok(()),
        None => Err(unknown_batch(batch_id)),
    }
}

fn entry_values(entry: &PayrollEntry) -> Result<EntryValues, ApiError> {
    let amount = entry
        .amount
        .non_negative()
        .map_err(|err| ApiError::validation(err.to_string()))?;
    Ok(EntryValues {
        method: entry.method.as_str().to_string(),
        payee_details: entry.payee_details.clone(),
        payee_name: entry.payee_name.clone(),
        bank_details: entry.bank_details.clone(),
        your_reference: entry.your_reference.clone(),
        payment_reference: entry.payment_reference.clone(),
        amount,
        notes: entry.notes.clone(),
    })
}

fn batch_record(batch: StoredBatch) -> BatchRecord {
    BatchRecord {
        id: batch.id,
        payment_type: batch.payment_type,
        debit_account: batch.debit_account,
        account_type: batch.account_type,
        payment_date: batch.payment_date,
        status: Some(batch.status),
    }
}

fn entry_record(entry: StoredEntry) -> PayrollEntry {
    let values = entry.values;
    PayrollEntry {
        id: Some(entry.id),
        method: PaymentMethod::from(values.method),
        payee_details: values.payee_details,
        payee_name: values.payee_name,
        bank_details: values.bank_details,
        your_reference: values.your_reference,
        payment_reference: values.payment_reference,
        amount: values
            .amount
            .map(Amount::from_decimal)
            .unwrap_or(Amount::Missing),
        notes: values.notes,
    }
}

fn unknown_batch(batch_id: &BatchId) -> ApiError {
    ApiError::not_found(format!("batch '{batch_id}' not found"))
}

fn unknown_entry(entry_id: EntryId) -> ApiError {
    ApiError::not_found(format!("entry {entry_id} not found"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
