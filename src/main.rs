//! Ledger Vault - archival and expiry job runner
//!
//! ```text
//! ledger_vault [--env dev] <command> [--date YYYY-MM-DD]
//!
//!   scheduler          run every enabled job on its schedule (default)
//!   archive-daily      archive one day (default: yesterday)
//!   archive-weekly     snapshot one ISO week (default: last week)
//!   archive-expired    archive savings accounts whose block started
//!   unarchive-expired  reactivate archived accounts whose block ended
//!   init-schema        create tables in all three databases
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;

use ledger_vault::account::AccountLifecycleManager;
use ledger_vault::config::AppConfig;
use ledger_vault::db::Database;
use ledger_vault::jobs::{
    DailyArchiveJob, ExpiryJobs, JobKind, JobRunner, Schedule, Scheduler, WeeklySnapshotJob,
};
use ledger_vault::notify::NotificationDispatcher;
use ledger_vault::store::{PgArchiveStore, PgDocumentStore, PgLedgerStore, PgRunLedger, schema};

// ============================================================
// ARGUMENTS
// ============================================================

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn get_date() -> anyhow::Result<Option<NaiveDate>> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--date" && i + 1 < args.len() {
            let date = NaiveDate::parse_from_str(&args[i + 1], "%Y-%m-%d")
                .with_context(|| format!("--date expects YYYY-MM-DD, got {}", args[i + 1]))?;
            return Ok(Some(date));
        }
    }
    Ok(None)
}

/// First positional argument, skipping option values
fn get_command() -> String {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--env" | "-e" | "--date" => i += 2,
            arg if arg.starts_with('-') => i += 1,
            arg => return arg.to_string(),
        }
    }
    "scheduler".to_string()
}

// ============================================================
// WIRING
// ============================================================

struct Stores {
    primary: Database,
    archive: Database,
    documents: Database,
}

async fn connect(config: &AppConfig) -> anyhow::Result<Stores> {
    let db = &config.database;
    let primary = Database::connect(&db.primary_url, db.max_connections)
        .await
        .context("Failed to connect to primary database")?;
    // archive-side outages are handled per job run
    let archive = Database::connect_lazy(&db.archive_url, db.max_connections)
        .context("Invalid archive database URL")?;
    let documents = Database::connect_lazy(db.document_url(), db.max_connections)
        .context("Invalid document database URL")?;
    Ok(Stores {
        primary,
        archive,
        documents,
    })
}

fn build_runner(stores: &Stores, schedule: &Schedule) -> JobRunner {
    let ledger = Arc::new(PgLedgerStore::new(stores.primary.pool().clone()));
    let runs = Arc::new(PgRunLedger::new(stores.primary.pool().clone()));
    let archive = Arc::new(PgArchiveStore::new(stores.archive.pool().clone()));
    let documents = Arc::new(PgDocumentStore::new(stores.documents.pool().clone()));

    let manager = AccountLifecycleManager::new(ledger.clone(), NotificationDispatcher::tracing());

    JobRunner::new(
        DailyArchiveJob::new(ledger.clone(), archive, runs.clone(), schedule.retry),
        WeeklySnapshotJob::new(ledger.clone(), documents, runs),
        ExpiryJobs::new(ledger, manager),
    )
}

async fn init_schema(stores: &Stores) -> anyhow::Result<()> {
    schema::init_primary_schema(stores.primary.pool()).await?;
    schema::init_archive_schema(stores.archive.pool()).await?;
    schema::init_document_schema(stores.documents.pool()).await?;
    tracing::info!("Schema initialized");
    Ok(())
}

// ============================================================
// MAIN
// ============================================================

async fn run(config: AppConfig, command: &str, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let schedule = Schedule::from_config(&config.jobs)?;
    let stores = connect(&config).await?;

    if command == "init-schema" {
        return init_schema(&stores).await;
    }

    let runner = build_runner(&stores, &schedule);

    if command == "scheduler" {
        let scheduler = Scheduler::new(runner, schedule);
        tokio::select! {
            _ = scheduler.run() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping scheduler");
            }
        }
        return Ok(());
    }

    let job: JobKind = command
        .parse()
        .map_err(|e: String| {
            anyhow::anyhow!(
                "{}; expected scheduler, init-schema, archive-daily, archive-weekly, archive-expired or unarchive-expired",
                e
            )
        })?;
    let report = runner.run(job, date).await?;
    tracing::info!(job = job.as_str(), "Job finished");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let env = get_env();
    let command = get_command();

    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = match ledger_vault::logging::init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(env = %env, command = %command, "Starting Ledger Vault");

    let result = match get_date() {
        Ok(date) => run(config, &command, date).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
