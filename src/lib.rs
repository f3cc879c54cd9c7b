//! Ledger Vault - account lifecycle ledger with cross-store archival
//!
//! # Modules
//!
//! - [`core_types`] - Account, transaction and client ids
//! - [`account`] - Account model, lifecycle state machine and manager
//! - [`ledger`] - Transactions, rule engine and the gated submission service
//! - [`archive`] - Archive records and the merged history read path
//! - [`store`] - Storage traits with PostgreSQL and in-memory backends
//! - [`jobs`] - Daily archival, weekly snapshot, expiry sweeps, scheduler
//! - [`notify`] - Fire-and-forget ledger event notifications
//! - [`config`] / [`logging`] / [`db`] - Runtime plumbing

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod archive;
pub mod ledger;
pub mod notify;

// Persistence
pub mod db;
pub mod store;

// Background work
pub mod jobs;

pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use account::{
    Account, AccountKind, AccountLifecycleManager, AccountScope, AccountStatus, LifecycleError,
    OpenAccountRequest, Transition,
};
pub use archive::{AccountStatistics, ArchiveQueryService, TransactionHistory, TransactionLookup};
pub use core_types::{AccountId, ClientId, TransactionId};
pub use jobs::{JobError, JobKind, JobRunner, RetryPolicy, Scheduler};
pub use ledger::{
    LedgerError, LedgerLimits, LedgerService, RuleEngine, RuleViolation, Transaction,
    TransactionFilter, TransactionRequest,
};
pub use notify::{LedgerEvent, NotificationDispatcher, Notifier};
pub use store::StoreError;
