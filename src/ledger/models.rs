//! Transaction models and request types

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::validation::{
    CurrencyCode, ValidationError, validate_amount, validate_description, validate_reference,
};
use crate::core_types::{AccountId, TransactionId};

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TransactionKind {
    /// Money in (deposit)
    Credit = 1,
    /// Money out (withdrawal)
    Debit = 2,
}

impl TransactionKind {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TransactionKind::Credit),
            2 => Some(TransactionKind::Debit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }

    /// Signed effect of `amount` on the account balance
    #[inline]
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Credit => amount,
            TransactionKind::Debit => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TransactionStatus {
    Pending = 0,
    Completed = 1,
    Failed = -1,
}

impl TransactionStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransactionStatus::Pending),
            1 => Some(TransactionStatus::Completed),
            -1 => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Only completed entries move the running balance
    #[inline]
    pub fn affects_balance(&self) -> bool {
        matches!(self, TransactionStatus::Completed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger entry in the primary store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub status: TransactionStatus,
    pub reference: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub archived: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Generate a system reference (`TX-<ULID>`)
pub fn generate_reference() -> String {
    format!("TX-{}", ulid::Ulid::new())
}

/// Unvalidated transaction submission as received from a caller
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequest {
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl TransactionRequest {
    pub fn new(
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        currency: &str,
    ) -> Self {
        Self {
            account_id,
            kind,
            amount,
            currency: currency.to_string(),
            reference: None,
            description: None,
            metadata: None,
        }
    }

    pub fn credit(account_id: AccountId, amount: Decimal, currency: &str) -> Self {
        Self::new(account_id, TransactionKind::Credit, amount, currency)
    }

    pub fn debit(account_id: AccountId, amount: Decimal, currency: &str) -> Self {
        Self::new(account_id, TransactionKind::Debit, amount, currency)
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Shape validation; produces the row to commit (reference assigned here
    /// when the caller did not supply one)
    pub fn validate(self, now: DateTime<Utc>) -> Result<Transaction, ValidationError> {
        let amount = validate_amount(self.amount)?;
        let currency = CurrencyCode::new(&self.currency)?;
        let reference = match self.reference.as_deref() {
            Some(r) => validate_reference(r)?,
            None => generate_reference(),
        };
        let description = validate_description(self.description.as_deref())?;
        let metadata = match self.metadata {
            None | Some(serde_json::Value::Null) => serde_json::Value::Object(Default::default()),
            Some(v @ serde_json::Value::Object(_)) => v,
            Some(_) => return Err(ValidationError::MetadataNotObject),
        };

        Ok(Transaction {
            id: TransactionId::new(),
            account_id: self.account_id,
            kind: self.kind,
            amount,
            currency,
            status: TransactionStatus::Completed,
            reference,
            description,
            occurred_at: now,
            archived: false,
            metadata,
            created_at: now,
        })
    }
}

/// Listing filter shared by the primary store, the archive store and the
/// history service
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionFilter {
    #[serde(default)]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    /// Inclusive, UTC calendar day
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Inclusive, UTC calendar day
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl TransactionFilter {
    /// Half-open timestamp window `[from, to)` covering the date range
    pub fn window(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let from = self.date_from.map(start_of_day);
        let to = self
            .date_to
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(start_of_day);
        (from, to)
    }

    /// Field match, ignoring `include_archived` and `limit`
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(kind) = self.kind
            && tx.kind != kind
        {
            return false;
        }
        if let Some(status) = self.status
            && tx.status != status
        {
            return false;
        }
        let (from, to) = self.window();
        if let Some(from) = from
            && tx.occurred_at < from
        {
            return false;
        }
        if let Some(to) = to
            && tx.occurred_at >= to
        {
            return false;
        }
        true
    }
}

/// Midnight UTC of `day`
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}
