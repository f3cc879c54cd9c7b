//! Weekly Snapshot Job
//!
//! Copies an ISO week of transactions into the document store partition
//! `transactions_week_<ISOYEAR>_<WW>` and flags them archived in place.
//! Days already claimed by the daily job are left out, so the two archival
//! paths never disagree about a row.

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{JobError, JobKind, week_days};
use crate::archive::record::{SnapshotDocument, partition_name};
use crate::core_types::TransactionId;
use crate::ledger::models::start_of_day;
use crate::store::{DocumentStore, RunLedger, StoreError, TransactionStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklySnapshotReport {
    pub partition: String,
    pub week_start: NaiveDate,
    /// Days of the week owned by the daily job
    pub skipped_days: Vec<NaiveDate>,
    pub selected: usize,
    pub written: u64,
    pub flagged: u64,
}

/// Weekly Snapshot Job
#[derive(Clone)]
pub struct WeeklySnapshotJob {
    transactions: Arc<dyn TransactionStore>,
    documents: Arc<dyn DocumentStore>,
    runs: Arc<dyn RunLedger>,
}

impl WeeklySnapshotJob {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        documents: Arc<dyn DocumentStore>,
        runs: Arc<dyn RunLedger>,
    ) -> Self {
        Self {
            transactions,
            documents,
            runs,
        }
    }

    /// Snapshot the week starting at `week_start` (a Monday)
    pub async fn run(&self, week_start: NaiveDate) -> Result<WeeklySnapshotReport, JobError> {
        let partition = partition_name(week_start);
        tracing::info!(
            job = JobKind::WeeklySnapshot.as_str(),
            %week_start,
            %partition,
            "Weekly snapshot started"
        );

        let days = week_days(week_start);
        let owned: BTreeSet<NaiveDate> = self
            .runs
            .claim(JobKind::WeeklySnapshot, &days)
            .await?
            .into_iter()
            .collect();
        let skipped_days: Vec<NaiveDate> =
            days.iter().copied().filter(|d| !owned.contains(d)).collect();

        let window_end = week_start
            .checked_add_days(Days::new(7))
            .ok_or_else(|| StoreError::Corrupt(format!("date overflow after {}", week_start)))?;
        let rows = self
            .transactions
            .in_window(start_of_day(week_start), start_of_day(window_end))
            .await?;
        let selected: Vec<_> = rows
            .into_iter()
            .filter(|t| owned.contains(&t.occurred_at.date_naive()))
            .collect();

        let mut report = WeeklySnapshotReport {
            partition,
            week_start,
            skipped_days,
            selected: selected.len(),
            written: 0,
            flagged: 0,
        };

        if selected.is_empty() {
            tracing::info!(
                partition = %report.partition,
                skipped_days = report.skipped_days.len(),
                "No transactions in window, nothing written"
            );
            return Ok(report);
        }

        let archived_at = Utc::now();
        let ids: Vec<TransactionId> = selected.iter().map(|t| t.id).collect();
        let documents: Vec<SnapshotDocument> = selected
            .into_iter()
            .map(|mut t| {
                t.archived = true;
                SnapshotDocument::new(t, archived_at)
            })
            .collect();

        report.written = self
            .documents
            .insert_batch(&report.partition, &documents)
            .await
            .map_err(JobError::DocumentWrite)?;
        report.flagged = self.transactions.mark_archived(&ids).await?;

        tracing::info!(
            partition = %report.partition,
            selected = report.selected,
            written = report.written,
            flagged = report.flagged,
            skipped_days = report.skipped_days.len(),
            "Weekly snapshot finished"
        );
        Ok(report)
    }
}
