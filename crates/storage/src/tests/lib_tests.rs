use super::*;

async fn storage_with_batch(id: &str) -> (Storage, BatchId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let batch_id = BatchId::from(id);
    storage
        .create_batch(&batch_id, &BatchValues::default())
        .await
        .expect("batch");
    (storage, batch_id)
}

fn salary(payee_name: &str, amount: &str) -> EntryValues {
    EntryValues {
        method: "NEFT".to_string(),
        payee_details: "Empl".to_string(),
        payee_name: payee_name.to_string(),
        amount: Some(Decimal::from_str(amount).expect("decimal")),
        ..EntryValues::default()
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("payroll_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("payroll.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn new_batches_start_as_sparse_drafts() {
    let (storage, batch_id) = storage_with_batch("PB-2026-10").await;

    let batch = storage
        .get_batch(&batch_id)
        .await
        .expect("query")
        .expect("batch exists");

    assert_eq!(batch.status, BatchStatus::Draft);
    assert_eq!(batch.payment_type, None);
    assert_eq!(batch.debit_account, None);
    assert!(storage
        .get_batch(&BatchId::from("unknown"))
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn lists_batches_in_creation_order() {
    let (storage, first) = storage_with_batch("b1").await;
    let second = BatchId::from("b2");
    storage
        .create_batch(
            &second,
            &BatchValues {
                debit_account: Some("ACC-2".to_string()),
                ..BatchValues::default()
            },
        )
        .await
        .expect("second batch");

    let batches = storage.list_batches().await.expect("batches");

    let ids: Vec<_> = batches.iter().map(|batch| batch.id.clone()).collect();
    assert_eq!(ids, vec![first, second]);
    assert_eq!(batches[1].debit_account.as_deref(), Some("ACC-2"));
}

#[tokio::test]
async fn duplicate_batch_id_is_rejected() {
    let (storage, batch_id) = storage_with_batch("b1").await;

    let err = storage
        .create_batch(&batch_id, &BatchValues::default())
        .await
        .expect_err("duplicate id");

    assert!(err.to_string().contains("b1"));
}

#[tokio::test]
async fn update_batch_keeps_status_unless_given() {
    let (storage, batch_id) = storage_with_batch("b1").await;

    let saved = storage
        .update_batch(
            &batch_id,
            &BatchValues {
                payment_type: Some("Domestic".to_string()),
                debit_account: Some("ACC-1".to_string()),
                account_type: Some("Current".to_string()),
                payment_date: Some("2026-10-31".to_string()),
                status: None,
            },
        )
        .await
        .expect("update")
        .expect("batch exists");
    assert_eq!(saved.status, BatchStatus::Draft);
    assert_eq!(saved.payment_date.as_deref(), Some("2026-10-31"));

    let submitted = storage
        .update_batch(
            &batch_id,
            &BatchValues {
                status: Some(BatchStatus::Submitted),
                ..BatchValues::default()
            },
        )
        .await
        .expect("update")
        .expect("batch exists");
    assert_eq!(submitted.status, BatchStatus::Submitted);
    assert_eq!(submitted.debit_account, None);
    assert!(submitted.updated_at >= saved.updated_at);
}

#[tokio::test]
async fn update_of_unknown_batch_returns_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let updated = storage
        .update_batch(&BatchId::from("missing"), &BatchValues::default())
        .await
        .expect("update");

    assert!(updated.is_none());
}

#[tokio::test]
async fn entries_get_increasing_ids_and_keep_amounts() {
    let (storage, batch_id) = storage_with_batch("b1").await;

    let first = storage
        .create_entry(&batch_id, &salary("Asha", "1200.50"))
        .await
        .expect("first");
    let second = storage
        .create_entry(
            &batch_id,
            &EntryValues {
                amount: None,
                ..salary("Ravi", "0")
            },
        )
        .await
        .expect("second");

    assert!(second.id.0 > first.id.0);
    let entries = storage.list_entries(&batch_id).await.expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[0].values.amount,
        Some(Decimal::from_str("1200.5").expect("decimal"))
    );
    assert_eq!(entries[1].values.amount, None);
    assert_eq!(entries[1].values.payee_name, "Ravi");
}

#[tokio::test]
async fn entries_are_scoped_to_their_batch() {
    let (storage, b1) = storage_with_batch("b1").await;
    let b2 = BatchId::from("b2");
    storage
        .create_batch(&b2, &BatchValues::default())
        .await
        .expect("b2");
    storage
        .create_entry(&b1, &salary("Asha", "10"))
        .await
        .expect("entry");

    assert_eq!(storage.list_entries(&b1).await.expect("b1").len(), 1);
    assert!(storage.list_entries(&b2).await.expect("b2").is_empty());
}

#[tokio::test]
async fn entry_for_unknown_batch_is_rejected() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    storage
        .create_entry(&BatchId::from("missing"), &salary("Asha", "10"))
        .await
        .expect_err("foreign key");
}

#[tokio::test]
async fn update_entry_replaces_every_column() {
    let (storage, batch_id) = storage_with_batch("b1").await;
    let created = storage
        .create_entry(&batch_id, &salary("Asha", "10"))
        .await
        .expect("entry");

    let replacement = EntryValues {
        method: "RTGS".to_string(),
        notes: "october bonus".to_string(),
        ..salary("Asha K", "99.99")
    };
    let updated = storage
        .update_entry(created.id, &replacement)
        .await
        .expect("update")
        .expect("entry exists");

    assert_eq!(updated.values, replacement);
    assert_eq!(updated.batch_id, batch_id);
    assert_eq!(
        storage
            .get_entry(created.id)
            .await
            .expect("query")
            .expect("entry exists")
            .values,
        replacement
    );
    assert!(storage
        .update_entry(EntryId(9999), &replacement)
        .await
        .expect("update")
        .is_none());
}

#[tokio::test]
async fn delete_entry_reports_whether_a_row_went_away() {
    let (storage, batch_id) = storage_with_batch("b1").await;
    let created = storage
        .create_entry(&batch_id, &salary("Asha", "10"))
        .await
        .expect("entry");

    assert!(storage.delete_entry(created.id).await.expect("delete"));
    assert!(!storage.delete_entry(created.id).await.expect("delete again"));
    assert!(storage.list_entries(&batch_id).await.expect("entries").is_empty());
}

#[test]
fn sqlite_path_ignores_memory_and_query_strings() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/payroll.db?mode=rwc"),
        Some(PathBuf::from("./data/payroll.db"))
    );
    assert_eq!(sqlite_path("postgres://localhost/payroll"), None);
}
