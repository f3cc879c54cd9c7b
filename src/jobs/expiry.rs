//! Expiry sweeps over blocked savings accounts
//!
//! - archive-expired: Blocked accounts whose block has started get archived
//! - unarchive-expired: archived accounts whose block has ended become Active
//!
//! Every candidate goes through [`AccountLifecycleManager::apply`], so the
//! sweeps obey the same transition rules and CAS retries as interactive calls.
//! A failing account is logged and the sweep moves on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::{JobError, JobKind};
use crate::account::lifecycle::Transition;
use crate::account::manager::AccountLifecycleManager;
use crate::account::models::Account;
use crate::store::AccountStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySweepReport {
    pub candidates: usize,
    pub transitioned: usize,
    /// Changed state between selection and transition
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ExpiryJobs {
    accounts: Arc<dyn AccountStore>,
    manager: AccountLifecycleManager,
}

impl ExpiryJobs {
    pub fn new(accounts: Arc<dyn AccountStore>, manager: AccountLifecycleManager) -> Self {
        Self { accounts, manager }
    }

    pub async fn archive_expired(&self, now: DateTime<Utc>) -> Result<ExpirySweepReport, JobError> {
        let candidates = self.accounts.archive_candidates(now).await?;
        Ok(self
            .sweep(JobKind::ArchiveExpired, candidates, Transition::Archive, now)
            .await)
    }

    pub async fn unarchive_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ExpirySweepReport, JobError> {
        let candidates = self.accounts.unarchive_candidates(now).await?;
        Ok(self
            .sweep(JobKind::UnarchiveExpired, candidates, Transition::Unarchive, now)
            .await)
    }

    async fn sweep(
        &self,
        job: JobKind,
        candidates: Vec<Account>,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> ExpirySweepReport {
        let mut report = ExpirySweepReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        for account in candidates {
            match self.manager.apply(account.id, transition, now).await {
                Ok(_) => report.transitioned += 1,
                Err(e) if e.is_state_conflict() => {
                    tracing::debug!(
                        job = job.as_str(),
                        account_id = %account.id,
                        reason = e.code(),
                        "Account no longer eligible, skipping"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(
                        job = job.as_str(),
                        account_id = %account.id,
                        account_number = %account.account_number,
                        error = %e,
                        "Expiry transition failed"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            job = job.as_str(),
            candidates = report.candidates,
            transitioned = report.transitioned,
            skipped = report.skipped,
            failed = report.failed,
            "Expiry sweep finished"
        );
        report
    }
}
