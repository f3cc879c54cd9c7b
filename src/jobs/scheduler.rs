//! Job scheduling
//!
//! [`JobRunner`] runs one job once (used by the CLI commands), [`Scheduler`]
//! keeps one tokio task per enabled job that sleeps until the job's next slot.

use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::{
    DailyArchiveJob, DailyArchiveReport, ExpiryJobs, ExpirySweepReport, JobError, JobKind,
    RetryPolicy, WeeklySnapshotJob, WeeklySnapshotReport, previous_week, week_start, yesterday,
};
use crate::config::JobsConfig;
use crate::ledger::models::start_of_day;

// ============================================================================
// Schedule
// ============================================================================

/// UTC wall-clock slots for every job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub archive_expired_at: NaiveTime,
    pub unarchive_expired_at: NaiveTime,
    pub daily_archive_at: NaiveTime,
    pub weekly_snapshot_at: NaiveTime,
    pub weekly_snapshot_day: Weekday,
    pub daily_archive_enabled: bool,
    pub weekly_snapshot_enabled: bool,
    pub retry: RetryPolicy,
}

fn parse_time(field: &str, value: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("jobs.{}: expected HH:MM, got {:?}", field, value))
}

impl Schedule {
    pub fn from_config(config: &JobsConfig) -> anyhow::Result<Self> {
        let weekly_snapshot_day = config
            .weekly_snapshot_day
            .parse::<Weekday>()
            .map_err(|_| {
                anyhow::anyhow!(
                    "jobs.weekly_snapshot_day: unknown weekday {:?}",
                    config.weekly_snapshot_day
                )
            })?;
        Ok(Self {
            archive_expired_at: parse_time("archive_expired_at", &config.archive_expired_at)?,
            unarchive_expired_at: parse_time("unarchive_expired_at", &config.unarchive_expired_at)?,
            daily_archive_at: parse_time("daily_archive_at", &config.daily_archive_at)?,
            weekly_snapshot_at: parse_time("weekly_snapshot_at", &config.weekly_snapshot_at)?,
            weekly_snapshot_day,
            daily_archive_enabled: config.daily_archive_enabled,
            weekly_snapshot_enabled: config.weekly_snapshot_enabled,
            retry: RetryPolicy {
                max_attempts: config.retry_attempts,
                backoff: Duration::from_secs(config.retry_backoff_secs),
            },
        })
    }

    pub fn enabled_jobs(&self) -> Vec<JobKind> {
        JobKind::ALL
            .into_iter()
            .filter(|job| match job {
                JobKind::DailyArchive => self.daily_archive_enabled,
                JobKind::WeeklySnapshot => self.weekly_snapshot_enabled,
                _ => true,
            })
            .collect()
    }

    /// First slot of `job` strictly after `after`
    pub fn next_run(&self, job: JobKind, after: DateTime<Utc>) -> DateTime<Utc> {
        let at = match job {
            JobKind::ArchiveExpired => self.archive_expired_at,
            JobKind::UnarchiveExpired => self.unarchive_expired_at,
            JobKind::DailyArchive => self.daily_archive_at,
            JobKind::WeeklySnapshot => self.weekly_snapshot_at,
        };
        let weekday = match job {
            JobKind::WeeklySnapshot => Some(self.weekly_snapshot_day),
            _ => None,
        };

        // at most 8 candidate days cover a weekly slot
        after
            .date_naive()
            .iter_days()
            .take(8)
            .filter(|day| weekday.is_none_or(|w| day.weekday() == w))
            .map(|day| day.and_time(at).and_utc())
            .find(|slot| *slot > after)
            .unwrap_or_else(|| after + chrono::Duration::days(1))
    }
}

// ============================================================================
// Runner
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobReport {
    DailyArchive(DailyArchiveReport),
    WeeklySnapshot(WeeklySnapshotReport),
    ArchiveExpired(ExpirySweepReport),
    UnarchiveExpired(ExpirySweepReport),
}

/// Runs a single job once
#[derive(Clone)]
pub struct JobRunner {
    daily: DailyArchiveJob,
    weekly: WeeklySnapshotJob,
    expiry: ExpiryJobs,
}

impl JobRunner {
    pub fn new(daily: DailyArchiveJob, weekly: WeeklySnapshotJob, expiry: ExpiryJobs) -> Self {
        Self {
            daily,
            weekly,
            expiry,
        }
    }

    /// Run `job` against `date`, or its default target as of now
    ///
    /// - daily: the given day, default yesterday
    /// - weekly: the ISO week containing the given day, default last week
    /// - expiry sweeps: start of the given day, default now
    pub async fn run(&self, job: JobKind, date: Option<NaiveDate>) -> Result<JobReport, JobError> {
        let now = Utc::now();
        let today = now.date_naive();
        match job {
            JobKind::DailyArchive => {
                let day = date.unwrap_or_else(|| yesterday(today));
                Ok(JobReport::DailyArchive(self.daily.run(day).await?))
            }
            JobKind::WeeklySnapshot => {
                let monday = date.map(week_start).unwrap_or_else(|| previous_week(today));
                Ok(JobReport::WeeklySnapshot(self.weekly.run(monday).await?))
            }
            JobKind::ArchiveExpired => {
                let at = date.map(start_of_day).unwrap_or(now);
                Ok(JobReport::ArchiveExpired(
                    self.expiry.archive_expired(at).await?,
                ))
            }
            JobKind::UnarchiveExpired => {
                let at = date.map(start_of_day).unwrap_or(now);
                Ok(JobReport::UnarchiveExpired(
                    self.expiry.unarchive_expired(at).await?,
                ))
            }
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler {
    runner: Arc<JobRunner>,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(runner: JobRunner, schedule: Schedule) -> Self {
        Self {
            runner: Arc::new(runner),
            schedule,
        }
    }

    /// Drive every enabled job until the process stops
    pub async fn run(&self) {
        let jobs = self.schedule.enabled_jobs();
        info!(jobs = ?jobs, "Starting scheduler");

        let handles = jobs.into_iter().map(|job| {
            let runner = self.runner.clone();
            let schedule = self.schedule.clone();
            tokio::spawn(async move { job_loop(job, runner, schedule).await })
        });

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Scheduler task aborted");
            }
        }
    }
}

async fn job_loop(job: JobKind, runner: Arc<JobRunner>, schedule: Schedule) {
    loop {
        let now = Utc::now();
        let next = schedule.next_run(job, now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(job = job.as_str(), next_run = %next, "Job scheduled");

        tokio::time::sleep(wait).await;

        match runner.run(job, None).await {
            Ok(report) => info!(job = job.as_str(), report = ?report, "Scheduled job completed"),
            Err(e) => error!(job = job.as_str(), code = e.code(), error = %e, "Scheduled job failed"),
        }
    }
}
