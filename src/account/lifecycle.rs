//! Account lifecycle state machine
//!
//! Transitions are pure functions over an [`Account`]: they validate the
//! current state, mutate the in-memory row and report whether the owning
//! transactions must be re-flagged. Persistence (and the compare-and-swap
//! that serializes concurrent writers) lives in [`super::manager`].

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::{Account, AccountKind, AccountStatus};
use super::validation::ValidationError;
use crate::core_types::AccountId;
use crate::store::StoreError;

/// Lifecycle errors (not-found, state-conflict and infrastructure)
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Only savings accounts can be blocked or archived (account is {0})")]
    NotSavings(AccountKind),

    #[error("Cannot {action} an account in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: AccountStatus,
    },

    #[error("Block end must be in the future")]
    BlockEndNotInFuture,

    #[error("Blocking window has not started yet")]
    BlockNotStarted,

    #[error("Blocking window has not elapsed (ends {0})")]
    BlockNotExpired(DateTime<Utc>),

    #[error("Account is already archived")]
    AlreadyArchived,

    #[error("Account is not archived")]
    NotArchived,

    #[error("Account is already deleted")]
    AlreadyDeleted,

    #[error("Account is not deleted")]
    NotDeleted,

    #[error("Account {0} has no client record")]
    NoClient(AccountId),

    #[error("Account {0} kept changing concurrently, transition abandoned")]
    ConcurrentModification(AccountId),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LifecycleError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LifecycleError::NotSavings(_) => "INVALID_ACCOUNT_TYPE",
            LifecycleError::InvalidTransition { .. } => "INVALID_ACCOUNT_STATE",
            LifecycleError::BlockEndNotInFuture => "BLOCK_END_NOT_IN_FUTURE",
            LifecycleError::BlockNotStarted => "BLOCK_NOT_STARTED",
            LifecycleError::BlockNotExpired(_) => "BLOCK_NOT_EXPIRED",
            LifecycleError::AlreadyArchived => "ALREADY_ARCHIVED",
            LifecycleError::NotArchived => "NOT_ARCHIVED",
            LifecycleError::AlreadyDeleted => "ALREADY_DELETED",
            LifecycleError::NotDeleted => "NOT_DELETED",
            LifecycleError::NoClient(_) => "CLIENT_NOT_FOUND",
            LifecycleError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            LifecycleError::Validation(_) => "VALIDATION_ERROR",
            LifecycleError::Store(_) => "DATABASE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LifecycleError::AccountNotFound(_) | LifecycleError::NoClient(_) => 404,
            LifecycleError::Validation(_) => 400,
            LifecycleError::ConcurrentModification(_) => 409,
            LifecycleError::Store(_) => 500,
            _ => 422,
        }
    }

    /// State conflicts are deterministic and never retried
    pub fn is_state_conflict(&self) -> bool {
        !matches!(
            self,
            LifecycleError::AccountNotFound(_)
                | LifecycleError::NoClient(_)
                | LifecycleError::Validation(_)
                | LifecycleError::Store(_)
                | LifecycleError::ConcurrentModification(_)
        )
    }
}

/// A requested lifecycle change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Block { until: DateTime<Utc> },
    Unblock,
    Archive,
    Unarchive,
    Close,
    Delete,
    Restore,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Block { .. } => "block",
            Transition::Unblock => "unblock",
            Transition::Archive => "archive",
            Transition::Unarchive => "unarchive",
            Transition::Close => "close",
            Transition::Delete => "delete",
            Transition::Restore => "restore",
        }
    }

    /// Apply the transition to `account` as of `now`
    ///
    /// Returns the value the owning transactions' `archived` flag must be set
    /// to in the same write, or `None` when transactions are untouched.
    /// On error the account is left unmodified.
    pub fn apply(
        &self,
        account: &mut Account,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>, LifecycleError> {
        match *self {
            Transition::Block { until } => {
                require_savings(account)?;
                self.require_status(account, AccountStatus::Active)?;
                if until <= now {
                    return Err(LifecycleError::BlockEndNotInFuture);
                }
                account.status = AccountStatus::Blocked;
                account.block_start = Some(now);
                account.block_end = Some(until);
                Ok(None)
            }
            Transition::Unblock => {
                require_savings(account)?;
                self.require_status(account, AccountStatus::Blocked)?;
                account.status = AccountStatus::Active;
                account.block_start = None;
                account.block_end = None;
                Ok(None)
            }
            Transition::Archive => {
                if account.archived {
                    return Err(LifecycleError::AlreadyArchived);
                }
                require_savings(account)?;
                self.require_status(account, AccountStatus::Blocked)?;
                match account.block_start {
                    Some(start) if start <= now => {}
                    _ => return Err(LifecycleError::BlockNotStarted),
                }
                account.status = AccountStatus::Archived;
                account.archived = true;
                // archived ⇒ soft-deleted
                if account.deleted_at.is_none() {
                    account.deleted_at = Some(now);
                }
                Ok(Some(true))
            }
            Transition::Unarchive => {
                if !account.archived {
                    return Err(LifecycleError::NotArchived);
                }
                if account.status.is_terminal() {
                    return Err(self.invalid(account));
                }
                if let Some(end) = account.block_end
                    && end > now
                {
                    return Err(LifecycleError::BlockNotExpired(end));
                }
                account.status = AccountStatus::Active;
                account.archived = false;
                account.deleted_at = None;
                account.block_start = None;
                account.block_end = None;
                Ok(Some(false))
            }
            Transition::Close => {
                if account.status.is_terminal() {
                    return Err(self.invalid(account));
                }
                account.status = AccountStatus::Closed;
                account.block_start = None;
                account.block_end = None;
                Ok(None)
            }
            Transition::Delete => {
                self.require_status(account, AccountStatus::Active)?;
                if account.is_deleted() {
                    return Err(LifecycleError::AlreadyDeleted);
                }
                account.deleted_at = Some(now);
                Ok(None)
            }
            Transition::Restore => {
                if !account.is_deleted() {
                    return Err(LifecycleError::NotDeleted);
                }
                // archived accounts come back through unarchive only
                if account.archived {
                    return Err(self.invalid(account));
                }
                account.deleted_at = None;
                Ok(None)
            }
        }
    }

    fn require_status(
        &self,
        account: &Account,
        expected: AccountStatus,
    ) -> Result<(), LifecycleError> {
        if account.status == expected {
            Ok(())
        } else {
            Err(self.invalid(account))
        }
    }

    fn invalid(&self, account: &Account) -> LifecycleError {
        LifecycleError::InvalidTransition {
            action: self.name(),
            status: account.status,
        }
    }
}

fn require_savings(account: &Account) -> Result<(), LifecycleError> {
    if account.kind == AccountKind::Savings {
        Ok(())
    } else {
        Err(LifecycleError::NotSavings(account.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::validation::CurrencyCode;
    use chrono::Duration;

    fn account(kind: AccountKind) -> Account {
        Account::open(
            "C12345678".to_string(),
            "Moussa Fall".to_string(),
            kind,
            CurrencyCode::new("XOF").unwrap(),
            None,
            Utc::now() - Duration::days(90),
        )
    }

    fn blocked_savings(now: DateTime<Utc>, start_ago: i64, end_in: i64) -> Account {
        let mut acc = account(AccountKind::Savings);
        acc.status = AccountStatus::Blocked;
        acc.block_start = Some(now - Duration::days(start_ago));
        acc.block_end = Some(now + Duration::days(end_in));
        acc
    }

    #[test]
    fn test_block_savings() {
        let now = Utc::now();
        let mut acc = account(AccountKind::Savings);
        let until = now + Duration::days(30);

        let cascade = Transition::Block { until }.apply(&mut acc, now).unwrap();

        assert_eq!(cascade, None);
        assert_eq!(acc.status, AccountStatus::Blocked);
        assert_eq!(acc.block_start, Some(now));
        assert_eq!(acc.block_end, Some(until));
        assert!(acc.invariants_hold());
    }

    #[test]
    fn test_block_checking_rejected() {
        let now = Utc::now();
        let mut acc = account(AccountKind::Checking);
        let before = acc.clone();

        let err = Transition::Block {
            until: now + Duration::days(1),
        }
        .apply(&mut acc, now)
        .unwrap_err();

        assert!(matches!(err, LifecycleError::NotSavings(AccountKind::Checking)));
        assert_eq!(err.code(), "INVALID_ACCOUNT_TYPE");
        assert_eq!(acc, before);
    }

    #[test]
    fn test_block_requires_future_end() {
        let now = Utc::now();
        let mut acc = account(AccountKind::Savings);
        let err = Transition::Block { until: now }
            .apply(&mut acc, now)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::BlockEndNotInFuture));
        assert_eq!(acc.status, AccountStatus::Active);
    }

    #[test]
    fn test_block_twice_rejected() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 1, 10);
        let err = Transition::Block {
            until: now + Duration::days(5),
        }
        .apply(&mut acc, now)
        .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                action: "block",
                status: AccountStatus::Blocked
            }
        ));
    }

    #[test]
    fn test_unblock_clears_window() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 1, 10);
        Transition::Unblock.apply(&mut acc, now).unwrap();
        assert_eq!(acc.status, AccountStatus::Active);
        assert!(acc.block_start.is_none() && acc.block_end.is_none());
        assert!(acc.invariants_hold());
    }

    #[test]
    fn test_unblock_active_rejected() {
        let now = Utc::now();
        let mut acc = account(AccountKind::Savings);
        assert!(Transition::Unblock.apply(&mut acc, now).is_err());
    }

    #[test]
    fn test_archive_blocked_savings() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 2, 10);

        let cascade = Transition::Archive.apply(&mut acc, now).unwrap();

        assert_eq!(cascade, Some(true));
        assert_eq!(acc.status, AccountStatus::Archived);
        assert!(acc.archived);
        assert!(acc.is_deleted());
        assert!(acc.block_end.is_some(), "block end kept for unarchive");
        assert!(acc.invariants_hold());
    }

    #[test]
    fn test_archive_requires_started_block() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, -1, 10);
        let err = Transition::Archive.apply(&mut acc, now).unwrap_err();
        assert!(matches!(err, LifecycleError::BlockNotStarted));
        assert!(!acc.archived);
    }

    #[test]
    fn test_archive_active_rejected() {
        let now = Utc::now();
        let mut acc = account(AccountKind::Savings);
        let err = Transition::Archive.apply(&mut acc, now).unwrap_err();
        assert!(err.is_state_conflict());
    }

    #[test]
    fn test_unarchive_after_block_end() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 10, -1);
        Transition::Archive.apply(&mut acc, now).unwrap();

        let cascade = Transition::Unarchive.apply(&mut acc, now).unwrap();

        assert_eq!(cascade, Some(false));
        assert_eq!(acc.status, AccountStatus::Active);
        assert!(!acc.archived);
        assert!(!acc.is_deleted());
        assert!(acc.block_start.is_none() && acc.block_end.is_none());
        assert!(acc.invariants_hold());
    }

    #[test]
    fn test_unarchive_before_block_end_rejected() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 2, 5);
        Transition::Archive.apply(&mut acc, now).unwrap();

        let err = Transition::Unarchive.apply(&mut acc, now).unwrap_err();
        assert!(matches!(err, LifecycleError::BlockNotExpired(_)));
        assert!(acc.archived);
    }

    #[test]
    fn test_unarchive_not_archived_rejected() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 2, -1);
        let err = Transition::Unarchive.apply(&mut acc, now).unwrap_err();
        assert!(matches!(err, LifecycleError::NotArchived));
    }

    #[test]
    fn test_close_is_terminal() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 1, 3);
        Transition::Close.apply(&mut acc, now).unwrap();
        assert_eq!(acc.status, AccountStatus::Closed);
        assert!(acc.block_start.is_none());

        assert!(Transition::Close.apply(&mut acc, now).is_err());
        assert!(
            Transition::Block {
                until: now + Duration::days(1)
            }
            .apply(&mut acc, now)
            .is_err()
        );
    }

    #[test]
    fn test_closed_archived_account_cannot_unarchive() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 5, -1);
        Transition::Archive.apply(&mut acc, now).unwrap();
        Transition::Close.apply(&mut acc, now).unwrap();

        let err = Transition::Unarchive.apply(&mut acc, now).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn test_delete_and_restore() {
        let now = Utc::now();
        let mut acc = account(AccountKind::Checking);

        Transition::Delete.apply(&mut acc, now).unwrap();
        assert!(acc.is_deleted());
        assert!(!acc.is_live());
        assert!(matches!(
            Transition::Delete.apply(&mut acc, now),
            Err(LifecycleError::AlreadyDeleted)
        ));

        Transition::Restore.apply(&mut acc, now).unwrap();
        assert!(acc.is_live());
        assert!(matches!(
            Transition::Restore.apply(&mut acc, now),
            Err(LifecycleError::NotDeleted)
        ));
    }

    #[test]
    fn test_delete_blocked_rejected() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 1, 1);
        assert!(Transition::Delete.apply(&mut acc, now).is_err());
    }

    #[test]
    fn test_restore_archived_rejected() {
        let now = Utc::now();
        let mut acc = blocked_savings(now, 1, 1);
        Transition::Archive.apply(&mut acc, now).unwrap();
        assert!(matches!(
            Transition::Restore.apply(&mut acc, now),
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_error_codes_and_status() {
        let id = AccountId::new();
        assert_eq!(LifecycleError::AccountNotFound(id).http_status(), 404);
        assert_eq!(LifecycleError::BlockEndNotInFuture.http_status(), 422);
        assert_eq!(
            LifecycleError::ConcurrentModification(id).code(),
            "CONCURRENT_MODIFICATION"
        );
        assert!(!LifecycleError::ConcurrentModification(id).is_state_conflict());
    }
}
