//! Archive Query Service
//!
//! Reconstructs an account's transaction history from the primary store and,
//! when the request reaches into the past, the archive store. An unreachable
//! archive degrades the answer to local rows instead of failing it.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::account::models::AccountScope;
use crate::archive::record::ArchiveRecord;
use crate::core_types::{AccountId, TransactionId};
use crate::ledger::models::{Transaction, TransactionFilter, TransactionKind, TransactionStatus};
use crate::store::{AccountStore, ArchiveStore, StoreError, TransactionStore};

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl HistoryError {
    pub fn code(&self) -> &'static str {
        match self {
            HistoryError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            HistoryError::Store(_) => "DATABASE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            HistoryError::AccountNotFound(_) => 404,
            HistoryError::Store(_) => 500,
        }
    }
}

/// Merged history, newest first
#[derive(Debug, Clone, Serialize)]
pub struct TransactionHistory {
    pub transactions: Vec<Transaction>,
    /// Archived data was warranted and requested
    pub archive_consulted: bool,
    /// The archive store could not be read; only local rows are included
    pub degraded: bool,
}

/// Single-transaction lookup across the primary and archive stores
#[derive(Debug, Clone, Serialize)]
pub struct TransactionLookup {
    pub transaction: Option<Transaction>,
    /// Served from the archive store
    pub from_archive: bool,
    /// The archive could not be read, so a miss is not conclusive
    pub degraded: bool,
}

/// Full-history totals for one account
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatistics {
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub transaction_count: usize,
    pub last_transaction: Option<Transaction>,
    pub degraded: bool,
}

/// Whether a request needs archived data
///
/// True when explicitly asked for, when the range starts before `today`, or
/// when there is no lower bound at all.
pub fn should_include_archived(filter: &TransactionFilter, today: NaiveDate) -> bool {
    if filter.include_archived {
        return true;
    }
    match filter.date_from {
        Some(from) => from < today,
        None => true,
    }
}

/// Archive Query Service
#[derive(Clone)]
pub struct ArchiveQueryService {
    accounts: Arc<dyn AccountStore>,
    transactions: Arc<dyn TransactionStore>,
    archive: Arc<dyn ArchiveStore>,
}

impl ArchiveQueryService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        transactions: Arc<dyn TransactionStore>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Self {
        Self {
            accounts,
            transactions,
            archive,
        }
    }

    /// Transaction history of an account (archived accounts included)
    pub async fn history(
        &self,
        account_id: AccountId,
        filter: &TransactionFilter,
    ) -> Result<TransactionHistory, HistoryError> {
        if self
            .accounts
            .find_account(account_id, AccountScope::All)
            .await?
            .is_none()
        {
            return Err(HistoryError::AccountNotFound(account_id));
        }

        let warranted = should_include_archived(filter, Utc::now().date_naive());
        // flagged-in-place rows are history too
        let local = self
            .transactions
            .list_for_account(account_id, filter, warranted)
            .await?;

        if !warranted {
            return Ok(TransactionHistory {
                transactions: local,
                archive_consulted: false,
                degraded: false,
            });
        }

        let (archived, degraded) = self.read_archive(account_id, filter).await;

        // a row present in both places keeps its primary copy
        let mut seen: HashSet<_> = local.iter().map(|t| t.id).collect();
        let mut transactions = local;
        transactions.extend(
            archived
                .into_iter()
                .map(|r| r.transaction)
                .filter(|t| seen.insert(t.id)),
        );
        transactions.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        if let Some(limit) = filter.limit {
            transactions.truncate(limit);
        }

        tracing::debug!(
            account_id = %account_id,
            count = transactions.len(),
            degraded,
            "History assembled"
        );

        Ok(TransactionHistory {
            transactions,
            archive_consulted: true,
            degraded,
        })
    }

    async fn read_archive(
        &self,
        account_id: AccountId,
        filter: &TransactionFilter,
    ) -> (Vec<ArchiveRecord>, bool) {
        if !self.archive.is_reachable().await {
            tracing::warn!(account_id = %account_id, "Archive store unreachable, serving local history only");
            return (Vec::new(), true);
        }
        match self.archive.query(account_id, filter).await {
            Ok(records) => (records, false),
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %e,
                    "Archive query failed, serving local history only"
                );
                (Vec::new(), true)
            }
        }
    }

    /// One transaction of `account_id`, primary store first, then archive
    pub async fn find_transaction(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
    ) -> Result<TransactionLookup, HistoryError> {
        if self
            .accounts
            .find_account(account_id, AccountScope::All)
            .await?
            .is_none()
        {
            return Err(HistoryError::AccountNotFound(account_id));
        }

        let local = self
            .transactions
            .get_transaction(transaction_id)
            .await?
            .filter(|t| t.account_id == account_id);
        if local.is_some() {
            return Ok(TransactionLookup {
                transaction: local,
                from_archive: false,
                degraded: false,
            });
        }

        if !self.archive.is_reachable().await {
            tracing::warn!(
                account_id = %account_id,
                transaction_id = %transaction_id,
                "Archive store unreachable, lookup limited to local rows"
            );
            return Ok(TransactionLookup {
                transaction: None,
                from_archive: false,
                degraded: true,
            });
        }
        match self.archive.find(transaction_id).await {
            Ok(record) => {
                let transaction = record
                    .map(|r| r.transaction)
                    .filter(|t| t.account_id == account_id);
                Ok(TransactionLookup {
                    from_archive: transaction.is_some(),
                    transaction,
                    degraded: false,
                })
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    transaction_id = %transaction_id,
                    error = %e,
                    "Archive lookup failed, lookup limited to local rows"
                );
                Ok(TransactionLookup {
                    transaction: None,
                    from_archive: false,
                    degraded: true,
                })
            }
        }
    }

    /// Totals over the account's full history (failed entries excluded)
    pub async fn account_statistics(
        &self,
        account_id: AccountId,
    ) -> Result<AccountStatistics, HistoryError> {
        let filter = TransactionFilter {
            include_archived: true,
            ..Default::default()
        };
        let history = self.history(account_id, &filter).await?;

        let mut total_credits = Decimal::ZERO;
        let mut total_debits = Decimal::ZERO;
        for tx in history
            .transactions
            .iter()
            .filter(|t| t.status != TransactionStatus::Failed)
        {
            match tx.kind {
                TransactionKind::Credit => total_credits += tx.amount,
                TransactionKind::Debit => total_debits += tx.amount,
            }
        }

        Ok(AccountStatistics {
            total_credits,
            total_debits,
            transaction_count: history.transactions.len(),
            last_transaction: history.transactions.first().cloned(),
            degraded: history.degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn test_explicit_flag_wins() {
        let filter = TransactionFilter {
            include_archived: true,
            date_from: Some(today()),
            ..Default::default()
        };
        assert!(should_include_archived(&filter, today()));
    }

    #[test]
    fn test_no_range_includes_archive() {
        assert!(should_include_archived(
            &TransactionFilter::default(),
            today()
        ));
    }

    #[test]
    fn test_past_start_includes_archive() {
        let filter = TransactionFilter {
            date_from: Some(today() - Duration::days(1)),
            date_to: Some(today()),
            ..Default::default()
        };
        assert!(should_include_archived(&filter, today()));
    }

    #[test]
    fn test_today_only_is_local() {
        let filter = TransactionFilter {
            date_from: Some(today()),
            ..Default::default()
        };
        assert!(!should_include_archived(&filter, today()));
    }

    #[test]
    fn test_open_start_includes_archive() {
        let filter = TransactionFilter {
            date_to: Some(today()),
            ..Default::default()
        };
        assert!(should_include_archived(&filter, today()));
    }
}
