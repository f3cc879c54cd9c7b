//! Notification dispatch
//!
//! Events leave the core through a [`Notifier`]. Delivery is fire-and-forget:
//! [`NotificationDispatcher::dispatch`] spawns the call and only logs failures,
//! so a slow or broken sink never affects the operation that raised the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::account::models::{Account, Client};
use crate::core_types::{AccountId, ClientId, TransactionId};
use crate::ledger::models::{Transaction, TransactionKind};

/// Events raised by the core
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    TransactionRecorded {
        transaction_id: TransactionId,
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        currency: String,
        reference: String,
    },
    AccountBlocked {
        account_id: AccountId,
        account_number: String,
        block_end: Option<DateTime<Utc>>,
    },
    ClientCreated {
        client_id: ClientId,
        holder_name: String,
        email: Option<String>,
    },
}

impl LedgerEvent {
    pub fn transaction_recorded(tx: &Transaction) -> Self {
        LedgerEvent::TransactionRecorded {
            transaction_id: tx.id,
            account_id: tx.account_id,
            kind: tx.kind,
            amount: tx.amount,
            currency: tx.currency.to_string(),
            reference: tx.reference.clone(),
        }
    }

    pub fn account_blocked(account: &Account) -> Self {
        LedgerEvent::AccountBlocked {
            account_id: account.id,
            account_number: account.account_number.clone(),
            block_end: account.block_end,
        }
    }

    pub fn client_created(client: &Client) -> Self {
        LedgerEvent::ClientCreated {
            client_id: client.id,
            holder_name: client.holder_name.clone(),
            email: client.email.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::TransactionRecorded { .. } => "transaction_recorded",
            LedgerEvent::AccountBlocked { .. } => "account_blocked",
            LedgerEvent::ClientCreated { .. } => "client_created",
        }
    }
}

/// Outbound notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &LedgerEvent) -> anyhow::Result<()>;
}

/// Writes events to the log
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &LedgerEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(event = event.name(), %payload, "Ledger notification");
        Ok(())
    }
}

/// Forwards events to an external consumer over a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<LedgerEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<LedgerEvent>) -> Self {
        Self { tx }
    }

    /// Notifier plus the receiving end, with the given buffer
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<LedgerEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: &LedgerEvent) -> anyhow::Result<()> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| anyhow::anyhow!("notification channel closed"))
    }
}

/// Spawns notifier calls off the caller's path
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Dispatcher logging events through [`TracingNotifier`]
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingNotifier))
    }

    /// Fire-and-forget; must be called from within a tokio runtime
    pub fn dispatch(&self, event: LedgerEvent) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                tracing::warn!(event = event.name(), error = %e, "Notification delivery failed");
            }
        });
    }
}
