//! Scheduled background jobs
//!
//! | Job | Effect |
//! |-----|--------|
//! | [`daily::DailyArchiveJob`] | copy a day to the archive store, then delete locally |
//! | [`weekly::WeeklySnapshotJob`] | copy a week to the document store, flag in place |
//! | [`expiry::ExpiryJobs`] | archive / unarchive accounts whose blocking window moved on |
//!
//! Daily and weekly archival never touch the same calendar day: each claims
//! days in the [`RunLedger`](crate::store::RunLedger) and processes only the
//! days it owns.

pub mod daily;
pub mod expiry;
pub mod scheduler;
pub mod weekly;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;

pub use daily::{DailyArchiveJob, DailyArchiveReport, DailyOutcome};
pub use expiry::{ExpiryJobs, ExpirySweepReport};
pub use scheduler::{JobReport, JobRunner, Schedule, Scheduler};
pub use weekly::{WeeklySnapshotJob, WeeklySnapshotReport};

// ============================================================================
// Job kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DailyArchive,
    WeeklySnapshot,
    ArchiveExpired,
    UnarchiveExpired,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::ArchiveExpired,
        JobKind::UnarchiveExpired,
        JobKind::DailyArchive,
        JobKind::WeeklySnapshot,
    ];

    /// Stored in `archive_runs.job` and used as the log field value
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::DailyArchive => "daily_archive",
            JobKind::WeeklySnapshot => "weekly_snapshot",
            JobKind::ArchiveExpired => "archive_expired",
            JobKind::UnarchiveExpired => "unarchive_expired",
        }
    }

    /// CLI sub-command name
    pub fn command(&self) -> &'static str {
        match self {
            JobKind::DailyArchive => "archive-daily",
            JobKind::WeeklySnapshot => "archive-weekly",
            JobKind::ArchiveExpired => "archive-expired",
            JobKind::UnarchiveExpired => "unarchive-expired",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    /// Accepts both the CLI command and the stored name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.command() == s || k.as_str() == s)
            .ok_or_else(|| format!("unknown job: {}", s))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Archive store unreachable")]
    ArchiveUnavailable,

    #[error("Archive write failed: {0}")]
    ArchiveWrite(StoreError),

    #[error("Document store write failed: {0}")]
    DocumentWrite(StoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{job} gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        job: JobKind,
        attempts: u32,
        last_error: String,
    },
}

impl JobError {
    pub fn code(&self) -> &'static str {
        match self {
            JobError::ArchiveUnavailable => "ARCHIVE_UNAVAILABLE",
            JobError::ArchiveWrite(_) => "ARCHIVE_WRITE_FAILED",
            JobError::DocumentWrite(_) => "DOCUMENT_WRITE_FAILED",
            JobError::Store(_) => "DATABASE_ERROR",
            JobError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Bounded retry with fixed backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No retries
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or attempts run out
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, job: JobKind, mut op: F) -> Result<T, JobError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, JobError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    tracing::error!(
                        job = job.as_str(),
                        attempt,
                        error = %e,
                        "Job failed, no attempts left"
                    );
                    if attempts == 1 {
                        return Err(e);
                    }
                    return Err(JobError::RetriesExhausted {
                        job,
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        job = job.as_str(),
                        attempt,
                        backoff_secs = self.backoff.as_secs(),
                        error = %e,
                        "Job attempt failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

// ============================================================================
// Calendar helpers
// ============================================================================

/// Default daily target
pub fn yesterday(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

/// Monday of the ISO week containing `day`
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_monday())))
        .unwrap_or(day)
}

/// Monday of the ISO week before the one containing `today`
pub fn previous_week(today: NaiveDate) -> NaiveDate {
    let this_week = week_start(today);
    this_week.checked_sub_days(Days::new(7)).unwrap_or(this_week)
}

/// The seven days starting at `monday`
pub fn week_days(monday: NaiveDate) -> Vec<NaiveDate> {
    monday.iter_days().take(7).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_job_kind_parse() {
        assert_eq!("archive-daily".parse::<JobKind>(), Ok(JobKind::DailyArchive));
        assert_eq!(
            "weekly_snapshot".parse::<JobKind>(),
            Ok(JobKind::WeeklySnapshot)
        );
        assert!("vacuum".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_previous_week() {
        // Wednesday 2024-03-13 → week of Monday 2024-03-04
        assert_eq!(previous_week(date(2024, 3, 13)), date(2024, 3, 4));
        // on a Monday the previous week is the one that just ended
        assert_eq!(previous_week(date(2024, 3, 11)), date(2024, 3, 4));
        // across the year boundary
        assert_eq!(previous_week(date(2025, 1, 1)), date(2024, 12, 23));
    }

    #[test]
    fn test_week_start_and_days() {
        assert_eq!(week_start(date(2024, 3, 17)), date(2024, 3, 11));
        let days = week_days(date(2024, 3, 11));
        assert_eq!(days.len(), 7);
        assert_eq!(days[0].weekday(), Weekday::Mon);
        assert_eq!(days[6], date(2024, 3, 17));
    }

    #[test]
    fn test_yesterday() {
        assert_eq!(yesterday(date(2024, 3, 1)), date(2024, 2, 29));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        };
        let result = policy
            .run(JobKind::DailyArchive, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(JobError::ArchiveUnavailable)
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        };
        let err = policy
            .run(JobKind::DailyArchive, |_| async {
                Err::<(), _>(JobError::ArchiveUnavailable)
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::RetriesExhausted { attempts: 3, .. }
        ));
    }
}
