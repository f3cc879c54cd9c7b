//! Archived transaction representations and the history read path

pub mod query;
pub mod record;

pub use query::{
    AccountStatistics, ArchiveQueryService, HistoryError, TransactionHistory, TransactionLookup,
    should_include_archived,
};
pub use record::{ArchiveCandidate, ArchiveRecord, SnapshotDocument, partition_name};
