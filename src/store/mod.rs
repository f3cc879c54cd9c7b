//! Storage Traits
//!
//! The core talks to three stores through these traits:
//! - primary relational store ([`AccountStore`] + [`TransactionStore`])
//! - archive store ([`ArchiveStore`])
//! - weekly document store ([`DocumentStore`])
//!
//! plus [`RunLedger`], which records which archival job owns a calendar day.
//!
//! PostgreSQL implementations live in [`postgres`], [`archive`], [`document`]
//! and [`runs`]; [`memory`] provides in-process implementations with fault
//! injection for tests and local runs.

pub mod archive;
pub mod document;
pub mod memory;
pub mod postgres;
pub mod runs;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::account::models::{Account, AccountFilter, AccountScope, Client};
use crate::archive::record::{ArchiveCandidate, ArchiveRecord, SnapshotDocument};
use crate::core_types::{AccountId, ClientId, TransactionId};
use crate::jobs::JobKind;
use crate::ledger::error::LedgerError;
use crate::ledger::models::{Transaction, TransactionFilter};
use crate::ledger::rules::RuleEngine;

pub use archive::PgArchiveStore;
pub use document::PgDocumentStore;
pub use memory::{MemoryArchiveStore, MemoryDocumentStore, MemoryLedgerStore, MemoryRunLedger};
pub use postgres::PgLedgerStore;
pub use runs::PgRunLedger;

/// Infrastructure errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::Corrupt(_) => "CORRUPT_ROW",
            StoreError::Unavailable(_) => "STORE_UNAVAILABLE",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Account rows in the primary store
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError>;

    async fn find_client(&self, id: ClientId) -> Result<Option<Client>, StoreError>;

    /// Write `client`'s contact fields, serialized through the owning
    /// account's version: succeeds only while `account_id` is still at
    /// `expected_version`, and bumps it. Returns false if the CAS lost.
    async fn save_client_contact(
        &self,
        client: &Client,
        account_id: AccountId,
        expected_version: i64,
    ) -> Result<bool, StoreError>;

    /// Insert a new account; a taken account number yields [`StoreError::Conflict`]
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_account(
        &self,
        id: AccountId,
        scope: AccountScope,
    ) -> Result<Option<Account>, StoreError>;

    async fn find_by_number(
        &self,
        account_number: &str,
        scope: AccountScope,
    ) -> Result<Option<Account>, StoreError>;

    async fn list_accounts(
        &self,
        filter: &AccountFilter,
        scope: AccountScope,
    ) -> Result<Vec<Account>, StoreError>;

    /// Blocked, non-archived accounts whose block has started by `now`
    async fn archive_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Account>, StoreError>;

    /// Archived, non-closed accounts whose block has ended by `now`
    /// (soft-deleted rows included)
    async fn unarchive_candidates(&self, now: DateTime<Utc>)
    -> Result<Vec<Account>, StoreError>;

    /// Compare-and-swap write of a transitioned account
    ///
    /// Persists `account` with `version = expected_version + 1` only if the
    /// stored version still equals `expected_version`. When `cascade` is set,
    /// every transaction of the account gets that `archived` value in the same
    /// database transaction. Returns false if the CAS lost.
    async fn save_transition(
        &self,
        account: &Account,
        expected_version: i64,
        cascade: Option<bool>,
    ) -> Result<bool, StoreError>;
}

/// Transaction rows in the primary store
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Gate-and-commit under the per-account critical section
    ///
    /// Locks the owning account, evaluates `rules` against it, inserts the
    /// row and applies the balance change atomically. Rejections leave the
    /// store untouched.
    async fn record_checked(
        &self,
        tx: Transaction,
        rules: &RuleEngine,
    ) -> Result<Transaction, LedgerError>;

    async fn get_transaction(&self, id: TransactionId)
    -> Result<Option<Transaction>, StoreError>;

    /// Filtered rows of one account, newest first; rows flagged archived are
    /// returned only when `include_flagged` is set
    async fn list_for_account(
        &self,
        account_id: AccountId,
        filter: &TransactionFilter,
        include_flagged: bool,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Non-archived transactions dated on `day`, joined with their accounts
    async fn pending_for_day(&self, day: NaiveDate) -> Result<Vec<ArchiveCandidate>, StoreError>;

    /// All transactions in `[from, to)`, archived or not
    async fn in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn mark_archived(&self, ids: &[TransactionId]) -> Result<u64, StoreError>;

    /// Physically remove rows (balances are unaffected)
    async fn delete_transactions(&self, ids: &[TransactionId]) -> Result<u64, StoreError>;
}

/// Secondary relational store of archived transactions
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Idempotent insert keyed by transaction id; returns rows newly written
    async fn insert_batch(&self, records: &[ArchiveRecord]) -> Result<u64, StoreError>;

    async fn query(
        &self,
        account_id: AccountId,
        filter: &TransactionFilter,
    ) -> Result<Vec<ArchiveRecord>, StoreError>;

    async fn find(&self, id: TransactionId) -> Result<Option<ArchiveRecord>, StoreError>;

    async fn is_reachable(&self) -> bool;
}

/// Weekly-partitioned cold store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Idempotent insert keyed by (partition, transaction id); returns
    /// documents newly written
    async fn insert_batch(
        &self,
        partition: &str,
        documents: &[SnapshotDocument],
    ) -> Result<u64, StoreError>;
}

/// Day-ownership claims between the daily and weekly archival jobs
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Claim `days` for `job`
    ///
    /// Unclaimed days are taken atomically. Returns the subset of `days` owned
    /// by `job` afterwards (newly claimed or already owned).
    async fn claim(&self, job: JobKind, days: &[NaiveDate]) -> Result<Vec<NaiveDate>, StoreError>;

    /// Drop `job`'s claim on `days`; days owned by another job are untouched.
    /// Returns the number of claims removed.
    async fn release(&self, job: JobKind, days: &[NaiveDate]) -> Result<u64, StoreError>;
}
