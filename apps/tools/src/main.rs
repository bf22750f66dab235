use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use shared::domain::BatchId;
use storage::{BatchValues, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/payroll.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed an empty draft batch.
    CreateBatch {
        /// Defaults to `PB-<utc timestamp>`.
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        payment_type: Option<String>,
        #[arg(long)]
        debit_account: Option<String>,
        #[arg(long)]
        account_type: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        payment_date: Option<String>,
    },
    ListBatches,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateBatch {
            id,
            payment_type,
            debit_account,
            account_type,
            payment_date,
        } => {
            if let Some(date) = payment_date.as_deref() {
                if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                    bail!("payment date '{date}' must be YYYY-MM-DD");
                }
            }
            let id = id.unwrap_or_else(|| format!("PB-{}", Utc::now().format("%Y%m%d-%H%M%S")));
            let batch = storage
                .create_batch(
                    &BatchId::from(id),
                    &BatchValues {
                        payment_type,
                        debit_account,
                        account_type,
                        payment_date,
                        status: None,
                    },
                )
                .await?;
            println!("created batch id={}", batch.id);
        }
        Command::ListBatches => {
            for batch in storage.list_batches().await? {
                let entries = storage.list_entries(&batch.id).await?;
                println!(
                    "{}\t{}\t{}\t{} entries",
                    batch.id,
                    batch.status.as_str(),
                    batch.payment_date.as_deref().unwrap_or("-"),
                    entries.len()
                );
            }
        }
    }

    Ok(())
}
