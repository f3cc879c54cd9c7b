//! Ledger Error Types

use thiserror::Error;

use super::rules::RuleViolation;
use crate::account::validation::ValidationError;
use crate::store::StoreError;

/// Errors returned by transaction submission
#[derive(Error, Debug)]
pub enum LedgerError {
    // === Shape ===
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // === Business rules ===
    #[error("Rejected: {0}")]
    Rejected(#[from] RuleViolation),

    #[error("Duplicate transaction reference: {0}")]
    DuplicateReference(String),

    // === Infrastructure ===
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::Rejected(v) => v.code(),
            LedgerError::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            LedgerError::Store(_) => "DATABASE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation(_) => 400,
            LedgerError::Rejected(RuleViolation::AccountNotFound) => 404,
            LedgerError::Rejected(_) => 422,
            LedgerError::DuplicateReference(_) => 409,
            LedgerError::Store(_) => 500,
        }
    }

    /// The rule violation behind a rejection, if any
    pub fn violation(&self) -> Option<&RuleViolation> {
        match self {
            LedgerError::Rejected(v) => Some(v),
            _ => None,
        }
    }
}
