use std::{io::Write as _, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{BatchSessionController, ClientEvent, PayrollHandle};
use shared::domain::BatchId;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{drain_notices, execute, ConsoleCommand, Outcome};
use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "payroll-console", about = "Edit payroll batches against a payroll service")]
struct Args {
    /// Service root, e.g. http://localhost:8080/api.
    #[arg(long)]
    api_base: Option<String>,
    /// Batch to open instead of the first one listed.
    #[arg(long)]
    batch: Option<String>,
    /// Run a single command and exit, e.g. `show --json`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(api_base) = args.api_base {
        settings.api_base = api_base;
    }
    let controller = BatchSessionController::connect(&settings.api_base)
        .with_context(|| format!("cannot use api base '{}'", settings.api_base))?;
    let handle: Arc<dyn PayrollHandle> = Arc::new(controller);
    let mut events = handle.subscribe_events();

    if let Err(err) = handle.list_batches().await {
        eprintln!("could not list batches: {err}");
    }
    if let Some(batch) = args.batch {
        handle.select_batch(BatchId::from(batch)).await;
    }
    report_notices(&mut events);

    if !args.command.is_empty() {
        run_words(handle.as_ref(), &mut events, args.command).await;
        return Ok(());
    }

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("payroll> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let words: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            continue;
        }
        if run_words(handle.as_ref(), &mut events, words).await == Some(Outcome::Quit) {
            break;
        }
    }
    Ok(())
}

async fn run_words(
    handle: &dyn PayrollHandle,
    events: &mut broadcast::Receiver<ClientEvent>,
    words: Vec<String>,
) -> Option<Outcome> {
    let command = match ConsoleCommand::parse_words(words) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}");
            return None;
        }
    };
    let outcome = match execute(handle, command).await {
        Ok(Outcome::Output(text)) => {
            println!("{}", text.trim_end());
            Some(Outcome::Output(text))
        }
        Ok(Outcome::Quit) => Some(Outcome::Quit),
        Err(err) => {
            eprintln!("error: {err}");
            None
        }
    };
    report_notices(events);
    outcome
}

fn report_notices(events: &mut broadcast::Receiver<ClientEvent>) {
    for line in drain_notices(events) {
        eprintln!("{line}");
    }
}
