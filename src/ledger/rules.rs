//! Ledger Rule Engine
//!
//! Business-rule gate evaluated against a locked view of the account right
//! before a transaction is committed. The engine is pure: stores call it from
//! inside their per-account critical section.
//!
//! # Evaluation Order
//!
//! 1. Account existence
//! 2. Currency match
//! 3. Account state (closed / archived / blocked debit)
//! 4. Amount bounds
//! 5. Debit: disposable balance
//! 6. Credit: daily deposit cap

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::{Transaction, TransactionKind};
use crate::account::models::{Account, AccountKind, AccountStatus};
use crate::account::validation::CurrencyCode;
use crate::core_types::AccountId;

/// Configured thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLimits {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub daily_deposit_cap: Decimal,
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            min_amount: Decimal::from(100),
            max_amount: Decimal::from(5_000_000),
            daily_deposit_cap: Decimal::from(1_000_000),
        }
    }
}

/// Account state as seen under the per-account lock
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    pub kind: AccountKind,
    pub status: AccountStatus,
    pub currency: CurrencyCode,
    pub balance: Decimal,
    pub archived: bool,
    pub deleted: bool,
    /// Sum of today's non-failed credits already on the account
    pub credits_today: Decimal,
}

impl AccountSnapshot {
    pub fn new(account: &Account, credits_today: Decimal) -> Self {
        Self {
            account_id: account.id,
            kind: account.kind,
            status: account.status,
            currency: account.currency.clone(),
            balance: account.balance,
            archived: account.archived,
            deleted: account.is_deleted(),
            credits_today,
        }
    }

    /// Amount available for debit: zero for a blocked savings account
    pub fn disposable_balance(&self) -> Decimal {
        if self.kind == AccountKind::Savings && self.status == AccountStatus::Blocked {
            Decimal::ZERO
        } else {
            self.balance
        }
    }
}

/// The part of a transaction the gate looks at
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

impl From<&Transaction> for Proposal {
    fn from(tx: &Transaction) -> Self {
        Self {
            kind: tx.kind,
            amount: tx.amount,
            currency: tx.currency.clone(),
        }
    }
}

/// Business-rule violations, always surfaced with a reason code
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleViolation {
    #[error("Account not found")]
    AccountNotFound,

    #[error("Currency mismatch: account is {expected}, transaction is {actual}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        actual: CurrencyCode,
    },

    #[error("Account is closed")]
    AccountClosed,

    #[error("Account is archived")]
    AccountArchived,

    #[error("Account is blocked")]
    AccountBlocked,

    #[error("Amount {amount} is below the minimum of {minimum}")]
    AmountTooLow { amount: Decimal, minimum: Decimal },

    #[error("Amount {amount} exceeds the maximum of {maximum}")]
    AmountTooHigh { amount: Decimal, maximum: Decimal },

    #[error("Insufficient funds: {available} available, {requested} requested")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Daily deposit limit exceeded: {deposited} already deposited today, limit {limit}")]
    DailyDepositLimitExceeded { deposited: Decimal, limit: Decimal },
}

impl RuleViolation {
    pub fn code(&self) -> &'static str {
        match self {
            RuleViolation::AccountNotFound => "ACCOUNT_NOT_FOUND",
            RuleViolation::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            RuleViolation::AccountClosed => "ACCOUNT_CLOSED",
            RuleViolation::AccountArchived => "ACCOUNT_ARCHIVED",
            RuleViolation::AccountBlocked => "ACCOUNT_BLOCKED",
            RuleViolation::AmountTooLow { .. } => "AMOUNT_TOO_LOW",
            RuleViolation::AmountTooHigh { .. } => "AMOUNT_TOO_HIGH",
            RuleViolation::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            RuleViolation::DailyDepositLimitExceeded { .. } => "DAILY_DEPOSIT_LIMIT_EXCEEDED",
        }
    }
}

/// Ledger Rule Engine
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    limits: LedgerLimits,
}

impl RuleEngine {
    pub fn new(limits: LedgerLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &LedgerLimits {
        &self.limits
    }

    /// Evaluate `proposal` against the locked account snapshot
    pub fn evaluate(
        &self,
        snapshot: Option<&AccountSnapshot>,
        proposal: &Proposal,
    ) -> Result<(), RuleViolation> {
        // 1. Existence (soft-deleted live accounts are invisible)
        let account = match snapshot {
            Some(s) if s.archived || !s.deleted => s,
            _ => return Err(RuleViolation::AccountNotFound),
        };

        // 2. Currency
        if proposal.currency != account.currency {
            return Err(RuleViolation::CurrencyMismatch {
                expected: account.currency.clone(),
                actual: proposal.currency.clone(),
            });
        }

        // 3. State
        match account.status {
            AccountStatus::Closed => return Err(RuleViolation::AccountClosed),
            AccountStatus::Archived => return Err(RuleViolation::AccountArchived),
            _ if account.archived => return Err(RuleViolation::AccountArchived),
            AccountStatus::Blocked if proposal.kind == TransactionKind::Debit => {
                return Err(RuleViolation::AccountBlocked);
            }
            _ => {}
        }

        // 4. Bounds
        if proposal.amount < self.limits.min_amount {
            return Err(RuleViolation::AmountTooLow {
                amount: proposal.amount,
                minimum: self.limits.min_amount,
            });
        }
        if proposal.amount > self.limits.max_amount {
            return Err(RuleViolation::AmountTooHigh {
                amount: proposal.amount,
                maximum: self.limits.max_amount,
            });
        }

        match proposal.kind {
            // 5. Funds
            TransactionKind::Debit => {
                let available = account.disposable_balance();
                if available < proposal.amount {
                    return Err(RuleViolation::InsufficientFunds {
                        available,
                        requested: proposal.amount,
                    });
                }
            }
            // 6. Daily deposit cap
            TransactionKind::Credit => {
                if account.credits_today + proposal.amount > self.limits.daily_deposit_cap {
                    return Err(RuleViolation::DailyDepositLimitExceeded {
                        deposited: account.credits_today,
                        limit: self.limits.daily_deposit_cap,
                    });
                }
            }
        }

        Ok(())
    }
}
