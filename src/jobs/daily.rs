//! Daily Archival Job
//!
//! Moves one day's non-archived transactions to the archive store:
//!
//! 1. claim the day (skip if the weekly job owns it)
//! 2. select the day's rows joined with their accounts
//! 3. write archive copies (idempotent) - any failure aborts the attempt
//! 4. flag the rows archived, then delete them; both are best effort
//!
//! Step 3 is retried as a whole under [`RetryPolicy`]. Steps 4 never fail the
//! job: the archive copy is already durable.
//!
//! When the retries run out the claim is released, so the day falls back to
//! the weekly snapshot (or a later daily run of the same date).

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::{JobError, JobKind, RetryPolicy};
use crate::archive::record::ArchiveRecord;
use crate::core_types::TransactionId;
use crate::store::{ArchiveStore, RunLedger, TransactionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyOutcome {
    /// The weekly job owns the day
    Skipped,
    /// Nothing left to archive
    Empty,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyArchiveReport {
    pub day: NaiveDate,
    pub outcome: DailyOutcome,
    pub selected: usize,
    /// Archive rows newly written (re-runs write 0 for already copied rows)
    pub inserted: u64,
    pub flagged: u64,
    pub deleted: u64,
    pub attempts: u32,
}

impl DailyArchiveReport {
    fn new(day: NaiveDate, outcome: DailyOutcome, attempts: u32) -> Self {
        Self {
            day,
            outcome,
            selected: 0,
            inserted: 0,
            flagged: 0,
            deleted: 0,
            attempts,
        }
    }
}

/// Daily Archival Job
#[derive(Clone)]
pub struct DailyArchiveJob {
    transactions: Arc<dyn TransactionStore>,
    archive: Arc<dyn ArchiveStore>,
    runs: Arc<dyn RunLedger>,
    retry: RetryPolicy,
}

impl DailyArchiveJob {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        archive: Arc<dyn ArchiveStore>,
        runs: Arc<dyn RunLedger>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transactions,
            archive,
            runs,
            retry,
        }
    }

    /// Archive `day` with bounded retries
    pub async fn run(&self, day: NaiveDate) -> Result<DailyArchiveReport, JobError> {
        tracing::info!(job = JobKind::DailyArchive.as_str(), %day, "Daily archival started");

        let report = match self
            .retry
            .run(JobKind::DailyArchive, |attempt| self.attempt(day, attempt))
            .await
        {
            Ok(report) => report,
            Err(e) => {
                self.release(day).await;
                return Err(e);
            }
        };

        tracing::info!(
            job = JobKind::DailyArchive.as_str(),
            %day,
            outcome = ?report.outcome,
            selected = report.selected,
            inserted = report.inserted,
            flagged = report.flagged,
            deleted = report.deleted,
            attempts = report.attempts,
            "Daily archival finished"
        );
        Ok(report)
    }

    /// Give a failed day back; nothing was flagged or deleted for it
    async fn release(&self, day: NaiveDate) {
        match self.runs.release(JobKind::DailyArchive, &[day]).await {
            Ok(released) => {
                tracing::warn!(%day, released, "Daily archival gave up, day released");
            }
            Err(e) => {
                tracing::error!(%day, error = %e, "Failed to release claim on failed day");
            }
        }
    }

    async fn attempt(&self, day: NaiveDate, attempt: u32) -> Result<DailyArchiveReport, JobError> {
        let owned = self.runs.claim(JobKind::DailyArchive, &[day]).await?;
        if owned.is_empty() {
            tracing::info!(%day, "Day already covered by the weekly snapshot, skipping");
            return Ok(DailyArchiveReport::new(day, DailyOutcome::Skipped, attempt));
        }

        let candidates = self.transactions.pending_for_day(day).await?;
        if candidates.is_empty() {
            tracing::debug!(%day, "No transactions to archive");
            return Ok(DailyArchiveReport::new(day, DailyOutcome::Empty, attempt));
        }

        if !self.archive.is_reachable().await {
            return Err(JobError::ArchiveUnavailable);
        }

        let archived_at = Utc::now();
        let records: Vec<ArchiveRecord> = candidates
            .into_iter()
            .map(|c| ArchiveRecord::new(c, archived_at))
            .collect();
        let ids: Vec<TransactionId> = records.iter().map(ArchiveRecord::id).collect();

        // fail closed: nothing local changes unless the copy is durable
        let inserted = self
            .archive
            .insert_batch(&records)
            .await
            .map_err(JobError::ArchiveWrite)?;

        let flagged = match self.transactions.mark_archived(&ids).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(%day, error = %e, "Failed to flag archived transactions");
                0
            }
        };
        let deleted = match self.transactions.delete_transactions(&ids).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    %day,
                    count = ids.len(),
                    error = %e,
                    "Failed to delete archived transactions, leaving them flagged in place"
                );
                0
            }
        };

        Ok(DailyArchiveReport {
            day,
            outcome: DailyOutcome::Archived,
            selected: records.len(),
            inserted,
            flagged,
            deleted,
            attempts: attempt,
        })
    }
}
