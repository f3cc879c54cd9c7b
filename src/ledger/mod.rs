//! Ledger module
//!
//! Transactions, the rule gate evaluated before every commit, and the
//! submission service tying them to the transaction store.

pub mod error;
pub mod models;
pub mod rules;
pub mod service;

pub use error::LedgerError;
pub use models::{
    Transaction, TransactionFilter, TransactionKind, TransactionRequest, TransactionStatus,
};
pub use rules::{LedgerLimits, RuleEngine, RuleViolation};
pub use service::LedgerService;
