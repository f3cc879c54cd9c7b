//! Transaction submission

use chrono::Utc;
use std::sync::Arc;

use super::error::LedgerError;
use super::models::{Transaction, TransactionRequest};
use super::rules::RuleEngine;
use crate::notify::{LedgerEvent, NotificationDispatcher};
use crate::store::TransactionStore;

/// Entry point for money movement
///
/// Every write goes validate → gate → commit in that order; there is no
/// other path into the transaction store.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn TransactionStore>,
    rules: RuleEngine,
    notifications: NotificationDispatcher,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        rules: RuleEngine,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            rules,
            notifications,
        }
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    /// Validate, gate and commit a transaction
    ///
    /// On success a `TransactionRecorded` notification is dispatched. Rule
    /// violations are returned as [`LedgerError::Rejected`] and never retried.
    pub async fn submit_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Transaction, LedgerError> {
        let account_id = request.account_id;
        let tx = request.validate(Utc::now())?;

        match self.store.record_checked(tx, &self.rules).await {
            Ok(tx) => {
                tracing::info!(
                    transaction_id = %tx.id,
                    account_id = %tx.account_id,
                    kind = %tx.kind,
                    amount = %tx.amount,
                    reference = %tx.reference,
                    "Transaction recorded"
                );
                self.notifications
                    .dispatch(LedgerEvent::transaction_recorded(&tx));
                Ok(tx)
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    code = e.code(),
                    error = %e,
                    "Transaction rejected"
                );
                Err(e)
            }
        }
    }
}
