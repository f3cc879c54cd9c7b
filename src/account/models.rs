//! Data models for accounts and clients

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::validation::CurrencyCode;
use crate::core_types::{AccountId, ClientId};

// ============================================================================
// Account Kind
// ============================================================================

/// Account type. Only savings accounts may be blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum AccountKind {
    Checking = 1,
    Savings = 2,
}

impl AccountKind {
    /// Get numeric ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AccountKind::Checking),
            2 => Some(AccountKind::Savings),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Checking => "checking",
            AccountKind::Savings => "savings",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Account Status
// ============================================================================

/// Account lifecycle status
///
/// ```text
/// ACTIVE ──block──▶ BLOCKED ──archive──▶ ARCHIVED
///   ▲                  │                    │
///   └─────unblock──────┘                    │
///   └────────────────unarchive──────────────┘
///
/// any ──close──▶ CLOSED (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum AccountStatus {
    Active = 1,
    Blocked = 2,
    Archived = 3,
    Closed = 4,
}

impl AccountStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AccountStatus::Active),
            2 => Some(AccountStatus::Blocked),
            3 => Some(AccountStatus::Archived),
            4 => Some(AccountStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Blocked => "blocked",
            AccountStatus::Archived => "archived",
            AccountStatus::Closed => "closed",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, AccountStatus::Closed)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Account
// ============================================================================

/// Bank account row
///
/// # Invariants
/// - `Blocked` ⇒ `block_start` and `block_end` are both set
/// - `Active` ⇒ both are `None`
/// - `archived` ⇒ `deleted_at.is_some()` (the reverse is not required)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub account_number: String,
    pub holder_name: String,
    pub kind: AccountKind,
    pub currency: CurrencyCode,
    pub status: AccountStatus,
    /// Running balance, updated in the same database transaction as every
    /// completed ledger entry
    pub balance: Decimal,
    pub block_start: Option<DateTime<Utc>>,
    pub block_end: Option<DateTime<Utc>>,
    pub archived: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub client_id: Option<ClientId>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by every write to the row
    pub version: i64,
}

impl Account {
    /// New active account with a zero balance
    pub fn open(
        account_number: String,
        holder_name: String,
        kind: AccountKind,
        currency: CurrencyCode,
        client_id: Option<ClientId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AccountId::new(),
            account_number,
            holder_name,
            kind,
            currency,
            status: AccountStatus::Active,
            balance: Decimal::ZERO,
            block_start: None,
            block_end: None,
            archived: false,
            deleted_at: None,
            client_id,
            created_at: now,
            version: 0,
        }
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Visible under the default (live) scope
    #[inline]
    pub fn is_live(&self) -> bool {
        !self.archived && !self.is_deleted()
    }

    /// Check the status/timestamp invariants documented on the type
    pub fn invariants_hold(&self) -> bool {
        let blocking_ok = match self.status {
            AccountStatus::Blocked => self.block_start.is_some() && self.block_end.is_some(),
            AccountStatus::Active => self.block_start.is_none() && self.block_end.is_none(),
            _ => true,
        };
        let archive_ok = !self.archived || self.is_deleted();
        blocking_ok && archive_ok
    }
}

// ============================================================================
// Client
// ============================================================================

/// Account holder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub holder_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Query scope and filters
// ============================================================================

/// Which account rows a lookup may see
///
/// There is no implicit global filter: every repository read states its
/// scope. Jobs and admin paths pass `All` to see archived and soft-deleted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountScope {
    /// Excludes archived and soft-deleted accounts
    #[default]
    Live,
    /// Every row, including archived and soft-deleted accounts
    All,
}

impl AccountScope {
    pub fn admits(&self, account: &Account) -> bool {
        match self {
            AccountScope::Live => account.is_live(),
            AccountScope::All => true,
        }
    }
}

/// Listing filter
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub kind: Option<AccountKind>,
    pub status: Option<AccountStatus>,
    /// Case-insensitive match on holder name or account number
    pub search: Option<String>,
    pub archived_only: bool,
    pub limit: Option<i64>,
}

impl AccountFilter {
    /// In-memory evaluation of the filter (scope is applied separately)
    pub fn matches(&self, account: &Account) -> bool {
        if let Some(kind) = self.kind
            && account.kind != kind
        {
            return false;
        }
        if let Some(status) = self.status
            && account.status != status
        {
            return false;
        }
        if self.archived_only && !account.archived {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !account.holder_name.to_lowercase().contains(&term)
                && !account.account_number.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        true
    }
}
