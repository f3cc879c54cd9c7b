//! Archive copies of transactions
//!
//! Two cold representations exist:
//! - [`ArchiveRecord`]: relational row in the archive store (daily path)
//! - [`SnapshotDocument`]: JSON document in a weekly partition (weekly path)
//!
//! Both are keyed by the original [`TransactionId`], which makes every insert
//! idempotent.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{ClientId, TransactionId};
use crate::ledger::models::Transaction;

/// A transaction selected for daily archival, joined with its owning account
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveCandidate {
    pub transaction: Transaction,
    pub account_number: String,
    pub holder_name: String,
    pub client_id: Option<ClientId>,
}

/// Denormalized, read-only transaction copy held by the archive store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub account_number: String,
    pub holder_name: String,
    pub client_id: Option<ClientId>,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn new(candidate: ArchiveCandidate, archived_at: DateTime<Utc>) -> Self {
        let mut transaction = candidate.transaction;
        transaction.archived = true;
        Self {
            transaction,
            account_number: candidate.account_number,
            holder_name: candidate.holder_name,
            client_id: candidate.client_id,
            archived_at,
        }
    }

    #[inline]
    pub fn id(&self) -> TransactionId {
        self.transaction.id
    }
}

/// Weekly snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub archived_at: DateTime<Utc>,
}

impl SnapshotDocument {
    pub fn new(transaction: Transaction, archived_at: DateTime<Utc>) -> Self {
        Self {
            transaction,
            archived_at,
        }
    }

    #[inline]
    pub fn id(&self) -> TransactionId {
        self.transaction.id
    }
}

/// Partition name for the ISO week containing `day`
///
/// Uses the ISO week-numbering year, so 2024-12-30 lands in
/// `transactions_week_2025_01`.
pub fn partition_name(day: NaiveDate) -> String {
    let week = day.iso_week();
    format!("transactions_week_{}_{:02}", week.year(), week.week())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::AccountId;
    use crate::ledger::models::TransactionRequest;
    use rust_decimal::Decimal;

    fn candidate() -> ArchiveCandidate {
        ArchiveCandidate {
            transaction: TransactionRequest::credit(AccountId::new(), Decimal::from(1500), "XOF")
                .validate(Utc::now())
                .unwrap(),
            account_number: "C10203040".to_string(),
            holder_name: "Fatou Ndiaye".to_string(),
            client_id: Some(ClientId::new()),
        }
    }

    #[test]
    fn test_partition_name() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 13).unwrap();
        assert_eq!(partition_name(d), "transactions_week_2024_11");
    }

    #[test]
    fn test_partition_name_uses_iso_year() {
        let d = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(partition_name(d), "transactions_week_2025_01");

        let d = NaiveDate::from_ymd_opt(2021, 1, 3).unwrap();
        assert_eq!(partition_name(d), "transactions_week_2020_53");
    }

    #[test]
    fn test_archive_record_is_flagged() {
        let c = candidate();
        let id = c.transaction.id;
        let record = ArchiveRecord::new(c, Utc::now());
        assert_eq!(record.id(), id);
        assert!(record.transaction.archived);
        assert_eq!(record.account_number, "C10203040");
    }

    #[test]
    fn test_snapshot_document_json_is_flat() {
        let c = candidate();
        let doc = SnapshotDocument::new(c.transaction, Utc::now());
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("reference").is_some());
        assert!(json.get("archived_at").is_some());
        assert!(json.get("transaction").is_none());

        let back: SnapshotDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
