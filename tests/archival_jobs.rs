//! Archival and expiry jobs driven through the public API

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use ledger_vault::account::{AccountKind, AccountScope, AccountStatus, OpenAccountRequest, Transition};
use ledger_vault::archive::{ArchiveQueryService, partition_name};
use ledger_vault::jobs::{
    DailyArchiveJob, DailyOutcome, ExpiryJobs, JobKind, JobReport, JobRunner, RetryPolicy,
    WeeklySnapshotJob,
};
use ledger_vault::ledger::models::start_of_day;
use ledger_vault::ledger::{TransactionRequest, TransactionStatus};
use ledger_vault::store::memory::{
    MemoryArchiveStore, MemoryDocumentStore, MemoryLedgerStore, MemoryRunLedger,
};
use ledger_vault::store::TransactionStore;
use ledger_vault::{
    AccountId, AccountLifecycleManager, LedgerService, NotificationDispatcher, RuleEngine,
    TransactionFilter, TransactionId,
};

struct Harness {
    ledger_store: Arc<MemoryLedgerStore>,
    archive: Arc<MemoryArchiveStore>,
    documents: Arc<MemoryDocumentStore>,
    accounts: AccountLifecycleManager,
    ledger: LedgerService,
    runner: JobRunner,
    daily: DailyArchiveJob,
    weekly: WeeklySnapshotJob,
    expiry: ExpiryJobs,
    query: ArchiveQueryService,
}

fn harness() -> Harness {
    let ledger_store = Arc::new(MemoryLedgerStore::new());
    let archive = Arc::new(MemoryArchiveStore::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let runs = Arc::new(MemoryRunLedger::new());
    let notifications = NotificationDispatcher::tracing();

    let accounts = AccountLifecycleManager::new(ledger_store.clone(), notifications.clone());
    let ledger = LedgerService::new(ledger_store.clone(), RuleEngine::default(), notifications);
    let retry = RetryPolicy {
        max_attempts: 3,
        backoff: StdDuration::ZERO,
    };
    let daily = DailyArchiveJob::new(ledger_store.clone(), archive.clone(), runs.clone(), retry);
    let weekly = WeeklySnapshotJob::new(ledger_store.clone(), documents.clone(), runs);
    let expiry = ExpiryJobs::new(ledger_store.clone(), accounts.clone());
    let runner = JobRunner::new(daily.clone(), weekly.clone(), expiry.clone());
    let query = ArchiveQueryService::new(ledger_store.clone(), ledger_store.clone(), archive.clone());

    Harness {
        ledger_store,
        archive,
        documents,
        accounts,
        ledger,
        runner,
        daily,
        weekly,
        expiry,
        query,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn open(h: &Harness, kind: AccountKind) -> AccountId {
    h.accounts
        .open_account(OpenAccountRequest::new("Fatou Ndiaye", kind, "XOF"))
        .await
        .unwrap()
        .id
}

/// Back-dated credit written straight to the primary store
fn seed_at(h: &Harness, account_id: AccountId, at: DateTime<Utc>, amount: i64) -> TransactionId {
    let tx = TransactionRequest::credit(account_id, Decimal::from(amount), "XOF")
        .validate(at)
        .unwrap();
    let id = tx.id;
    h.ledger_store.import_transaction(tx);
    id
}

fn seed_on(h: &Harness, account_id: AccountId, day: NaiveDate, amount: i64) -> TransactionId {
    seed_at(h, account_id, start_of_day(day) + Duration::hours(10), amount)
}

async fn local(h: &Harness, id: TransactionId) -> Option<bool> {
    h.ledger_store
        .get_transaction(id)
        .await
        .unwrap()
        .map(|t| t.archived)
}

// ============================================================================
// Daily archival
// ============================================================================

#[tokio::test]
async fn test_daily_archive_moves_rows_exactly_once() {
    let h = harness();
    let account = open(&h, AccountKind::Checking).await;
    let day = date(2024, 5, 20);
    let moved = seed_on(&h, account, day, 1_000);
    let kept = seed_on(&h, account, date(2024, 5, 21), 1_000);

    let first = h.daily.run(day).await.unwrap();
    assert_eq!(first.outcome, DailyOutcome::Archived);

    let second = h.daily.run(day).await.unwrap();
    assert_eq!(second.outcome, DailyOutcome::Empty);
    assert_eq!(second.inserted, 0);

    assert_eq!(local(&h, moved).await, None);
    assert_eq!(h.archive.len(), 1);
    let record = h.archive.get(moved).unwrap();
    assert!(record.transaction.archived);
    assert_eq!(record.transaction.account_id, account);
    assert_eq!(local(&h, kept).await, Some(false));
}

#[tokio::test]
async fn test_daily_archive_fails_closed_then_recovers() {
    let h = harness();
    let account = open(&h, AccountKind::Checking).await;
    let day = date(2024, 5, 20);
    let id = seed_on(&h, account, day, 1_000);

    h.archive.set_reachable(false);
    let err = h.daily.run(day).await.unwrap_err();
    assert_eq!(err.code(), "RETRIES_EXHAUSTED");
    assert_eq!(local(&h, id).await, Some(false));

    h.archive.set_reachable(true);
    let report = h.daily.run(day).await.unwrap();
    assert_eq!(report.outcome, DailyOutcome::Archived);
    assert_eq!(local(&h, id).await, None);
}

#[tokio::test]
async fn test_failed_daily_day_falls_to_weekly_snapshot() {
    let h = harness();
    let account = open(&h, AccountKind::Checking).await;
    let monday = date(2024, 3, 11);
    let wednesday = date(2024, 3, 13);
    let thursday = date(2024, 3, 14);
    let stranded = seed_on(&h, account, wednesday, 1_000);
    let archived = seed_on(&h, account, thursday, 1_000);

    h.archive.set_reachable(false);
    h.daily.run(wednesday).await.unwrap_err();
    h.archive.set_reachable(true);
    h.daily.run(thursday).await.unwrap();

    let weekly = h.weekly.run(monday).await.unwrap();
    assert_eq!(weekly.skipped_days, vec![thursday]);
    assert_eq!(weekly.selected, 1);
    assert_eq!(weekly.flagged, 1);

    assert_eq!(local(&h, stranded).await, Some(true));
    let partition = h.documents.partition(&partition_name(monday));
    assert!(partition.iter().any(|d| d.id() == stranded));
    assert!(h.archive.get(stranded).is_none());
    assert!(h.archive.get(archived).is_some());
}

#[tokio::test]
async fn test_scheduled_runs_recover_day_lost_to_outage() {
    let h = harness();
    let account = open(&h, AccountKind::Checking).await;
    let today = Utc::now().date_naive();
    let lost_day = today - Duration::days(2);
    let yesterday = today - Duration::days(1);
    let lost = seed_on(&h, account, lost_day, 1_000);
    let next = seed_on(&h, account, yesterday, 1_000);

    // the run two days ago hit an archive outage
    h.archive.set_reachable(false);
    let err = h
        .runner
        .run(JobKind::DailyArchive, Some(lost_day))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RETRIES_EXHAUSTED");

    // today's scheduled run moves on to yesterday
    h.archive.set_reachable(true);
    match h.runner.run(JobKind::DailyArchive, None).await.unwrap() {
        JobReport::DailyArchive(r) => {
            assert_eq!(r.day, yesterday);
            assert_eq!(r.outcome, DailyOutcome::Archived);
        }
        other => panic!("unexpected report {:?}", other),
    }
    assert_eq!(local(&h, next).await, None);
    assert_eq!(local(&h, lost).await, Some(false));

    // the weekly pass over the lost day's week still covers it
    match h
        .runner
        .run(JobKind::WeeklySnapshot, Some(lost_day))
        .await
        .unwrap()
    {
        JobReport::WeeklySnapshot(r) => {
            assert!(!r.skipped_days.contains(&lost_day));
            assert_eq!(r.flagged, 1);
        }
        other => panic!("unexpected report {:?}", other),
    }
    assert_eq!(local(&h, lost).await, Some(true));
    let week = ledger_vault::jobs::week_start(lost_day);
    let partition = h.documents.partition(&partition_name(week));
    assert_eq!(partition.iter().filter(|d| d.id() == lost).count(), 1);
}

#[tokio::test]
async fn test_daily_delete_failure_keeps_flagged_rows() {
    let h = harness();
    let account = open(&h, AccountKind::Checking).await;
    let day = date(2024, 5, 20);
    let id = seed_on(&h, account, day, 1_000);

    h.ledger_store.set_fail_delete(true);
    let report = h.daily.run(day).await.unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(local(&h, id).await, Some(true));
    assert!(h.archive.get(id).is_some());
}

// ============================================================================
// Weekly snapshot
// ============================================================================

#[tokio::test]
async fn test_weekly_snapshot_keeps_rows_flagged() {
    let h = harness();
    let account = open(&h, AccountKind::Checking).await;
    let monday = date(2024, 3, 11);
    let ids: Vec<_> = (0..3)
        .map(|i| seed_on(&h, account, monday + Duration::days(i * 2), 2_000))
        .collect();

    // any day of the week selects the same partition
    let report = h
        .runner
        .run(JobKind::WeeklySnapshot, Some(date(2024, 3, 14)))
        .await
        .unwrap();
    match report {
        JobReport::WeeklySnapshot(r) => {
            assert_eq!(r.week_start, monday);
            assert_eq!(r.written, 3);
        }
        other => panic!("unexpected report {:?}", other),
    }
    h.weekly.run(monday).await.unwrap();

    let partition = h.documents.partition(&partition_name(monday));
    assert_eq!(partition.len(), 3);
    for id in ids {
        assert_eq!(local(&h, id).await, Some(true));
        assert_eq!(partition.iter().filter(|d| d.id() == id).count(), 1);
    }
}

#[tokio::test]
async fn test_iso_year_partition_at_year_boundary() {
    let h = harness();
    let account = open(&h, AccountKind::Checking).await;
    // Monday 2024-12-30 starts ISO week 1 of 2025
    let monday = date(2024, 12, 30);
    seed_on(&h, account, monday, 2_000);

    let report = h.weekly.run(monday).await.unwrap();
    assert_eq!(report.partition, "transactions_week_2025_01");
    assert_eq!(h.documents.partition("transactions_week_2025_01").len(), 1);
}

#[tokio::test]
async fn test_daily_and_weekly_never_share_a_day() {
    let h = harness();
    let account = open(&h, AccountKind::Checking).await;
    let monday = date(2024, 3, 11);
    let ids: Vec<_> = (0..7)
        .map(|i| seed_on(&h, account, monday + Duration::days(i), 1_000))
        .collect();

    let tuesday = monday + Duration::days(1);
    h.daily.run(tuesday).await.unwrap();

    let weekly = h.weekly.run(monday).await.unwrap();
    assert_eq!(weekly.skipped_days, vec![tuesday]);
    assert_eq!(weekly.selected, 6);

    // weekly now owns Thursday
    let thursday = monday + Duration::days(3);
    let late_daily = h.daily.run(thursday).await.unwrap();
    assert_eq!(late_daily.outcome, DailyOutcome::Skipped);

    let partition = h.documents.partition(&partition_name(monday));
    for id in ids {
        let in_archive = h.archive.get(id).is_some();
        let in_snapshot = partition.iter().any(|d| d.id() == id);
        assert!(in_archive ^ in_snapshot, "{} archived by exactly one job", id);
    }
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn test_expired_block_cycle_restores_active_account() {
    let h = harness();
    let now = Utc::now();
    let id = open(&h, AccountKind::Savings).await;
    h.ledger
        .submit_transaction(TransactionRequest::credit(id, Decimal::from(50_000), "XOF"))
        .await
        .unwrap();
    let tx_id = h
        .ledger_store
        .list_for_account(id, &TransactionFilter::default(), true)
        .await
        .unwrap()[0]
        .id;
    h.accounts
        .apply(
            id,
            Transition::Block {
                until: now - Duration::hours(1),
            },
            now - Duration::days(2),
        )
        .await
        .unwrap();

    let archived = h.expiry.archive_expired(now).await.unwrap();
    assert_eq!(archived.transitioned, 1);
    assert_eq!(local(&h, tx_id).await, Some(true), "cascade flags transactions");
    let account = h.accounts.get(id, AccountScope::All).await.unwrap();
    assert_eq!(account.status, AccountStatus::Archived);
    assert!(account.deleted_at.is_some());

    // a second sweep finds nothing
    assert_eq!(h.expiry.archive_expired(now).await.unwrap().candidates, 0);

    let restored = h.expiry.unarchive_expired(now).await.unwrap();
    assert_eq!(restored.transitioned, 1);
    let account = h.accounts.get(id, AccountScope::Live).await.unwrap();
    assert_eq!(account.status, AccountStatus::Active);
    assert!(!account.archived);
    assert!(account.block_start.is_none());
    assert!(account.block_end.is_none());
    assert!(account.deleted_at.is_none());
    assert_eq!(account.balance, Decimal::from(50_000));
    assert_eq!(local(&h, tx_id).await, Some(false));

    assert_eq!(h.expiry.unarchive_expired(now).await.unwrap().candidates, 0);
}

#[tokio::test]
async fn test_block_ended_yesterday_needs_archive_first() {
    let h = harness();
    let now = Utc::now();
    let id = open(&h, AccountKind::Savings).await;
    h.accounts
        .apply(
            id,
            Transition::Block {
                until: now - Duration::days(1),
            },
            now - Duration::days(5),
        )
        .await
        .unwrap();

    let report = h.expiry.unarchive_expired(now).await.unwrap();
    assert_eq!(report.candidates, 0);
    let account = h.accounts.get(id, AccountScope::All).await.unwrap();
    assert_eq!(account.status, AccountStatus::Blocked);
    assert!(!account.archived);

    h.runner.run(JobKind::ArchiveExpired, None).await.unwrap();
    h.runner.run(JobKind::UnarchiveExpired, None).await.unwrap();

    let account = h.accounts.get(id, AccountScope::Live).await.unwrap();
    assert_eq!(account.status, AccountStatus::Active);
}

// ============================================================================
// History
// ============================================================================

struct Timeline {
    account: AccountId,
    archived: TransactionId,
    snapshotted: TransactionId,
    failed: TransactionId,
}

async fn timeline(h: &Harness) -> Timeline {
    let account = open(h, AccountKind::Checking).await;

    let archived = seed_on(h, account, date(2024, 5, 20), 1_000);
    h.daily.run(date(2024, 5, 20)).await.unwrap();

    let snapshotted = seed_on(h, account, date(2024, 3, 13), 2_000);
    h.weekly.run(date(2024, 3, 11)).await.unwrap();

    let mut failed_tx = TransactionRequest::credit(account, Decimal::from(9_000), "XOF")
        .validate(start_of_day(date(2024, 4, 2)))
        .unwrap();
    failed_tx.status = TransactionStatus::Failed;
    let failed = failed_tx.id;
    h.ledger_store.import_transaction(failed_tx);

    h.ledger
        .submit_transaction(TransactionRequest::credit(account, Decimal::from(5_000), "XOF"))
        .await
        .unwrap();
    h.ledger
        .submit_transaction(TransactionRequest::debit(account, Decimal::from(1_500), "XOF"))
        .await
        .unwrap();

    Timeline {
        account,
        archived,
        snapshotted,
        failed,
    }
}

#[tokio::test]
async fn test_history_merges_every_store() {
    let h = harness();
    let t = timeline(&h).await;

    let history = h
        .query
        .history(t.account, &TransactionFilter::default())
        .await
        .unwrap();
    assert!(history.archive_consulted);
    assert!(!history.degraded);
    assert_eq!(history.transactions.len(), 5);
    assert!(
        history
            .transactions
            .windows(2)
            .all(|w| w[0].occurred_at >= w[1].occurred_at)
    );
    let ids: Vec<_> = history.transactions.iter().map(|t| t.id).collect();
    for expected in [t.archived, t.snapshotted, t.failed] {
        assert!(ids.contains(&expected));
    }
}

#[tokio::test]
async fn test_history_today_only_stays_local() {
    let h = harness();
    let t = timeline(&h).await;

    let filter = TransactionFilter {
        date_from: Some(Utc::now().date_naive()),
        ..Default::default()
    };
    let history = h.query.history(t.account, &filter).await.unwrap();
    assert!(!history.archive_consulted);
    assert_eq!(history.transactions.len(), 2);
}

#[tokio::test]
async fn test_history_limit_applies_after_merge() {
    let h = harness();
    let t = timeline(&h).await;

    let filter = TransactionFilter {
        limit: Some(3),
        ..Default::default()
    };
    let history = h.query.history(t.account, &filter).await.unwrap();
    assert_eq!(history.transactions.len(), 3);
    // the two newest are today's; the third is the archived May row
    assert_eq!(history.transactions[2].id, t.archived);
}

#[tokio::test]
async fn test_history_degrades_without_archive() {
    let h = harness();
    let t = timeline(&h).await;
    h.archive.set_reachable(false);

    let history = h
        .query
        .history(t.account, &TransactionFilter::default())
        .await
        .unwrap();
    assert!(history.degraded);
    assert_eq!(history.transactions.len(), 4);
    assert!(history.transactions.iter().all(|tx| tx.id != t.archived));
}

#[tokio::test]
async fn test_statistics_cover_full_history() {
    let h = harness();
    let t = timeline(&h).await;

    let stats = h.query.account_statistics(t.account).await.unwrap();
    assert_eq!(stats.total_credits, Decimal::from(8_000));
    assert_eq!(stats.total_debits, Decimal::from(1_500));
    assert_eq!(stats.transaction_count, 5);
    let last = stats.last_transaction.unwrap();
    assert_eq!(last.occurred_at.date_naive(), Utc::now().date_naive());
    assert!(!stats.degraded);
}

#[tokio::test]
async fn test_find_transaction_falls_back_to_archive() {
    let h = harness();
    let t = timeline(&h).await;

    let archived = h.query.find_transaction(t.account, t.archived).await.unwrap();
    assert!(archived.from_archive);
    assert_eq!(archived.transaction.map(|tx| tx.id), Some(t.archived));

    // flagged-in-place rows are still served by the primary store
    let flagged = h
        .query
        .find_transaction(t.account, t.snapshotted)
        .await
        .unwrap();
    assert!(!flagged.from_archive);
    assert!(flagged.transaction.unwrap().archived);

    let missing = h
        .query
        .find_transaction(t.account, TransactionId::new())
        .await
        .unwrap();
    assert!(missing.transaction.is_none());
    assert!(!missing.degraded);
}

#[tokio::test]
async fn test_find_transaction_scoped_to_account() {
    let h = harness();
    let t = timeline(&h).await;
    let other = open(&h, AccountKind::Checking).await;

    for id in [t.archived, t.snapshotted] {
        let lookup = h.query.find_transaction(other, id).await.unwrap();
        assert!(lookup.transaction.is_none());
    }
    let err = h
        .query
        .find_transaction(AccountId::new(), t.archived)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn test_find_transaction_degrades_without_archive() {
    let h = harness();
    let t = timeline(&h).await;
    h.archive.set_reachable(false);

    let lookup = h.query.find_transaction(t.account, t.archived).await.unwrap();
    assert!(lookup.degraded);
    assert!(lookup.transaction.is_none());

    let local_hit = h.query.find_transaction(t.account, t.failed).await.unwrap();
    assert!(!local_hit.degraded);
    assert_eq!(local_hit.transaction.map(|tx| tx.id), Some(t.failed));
}

#[tokio::test]
async fn test_history_of_unknown_account() {
    let h = harness();
    let err = h
        .query
        .history(AccountId::new(), &TransactionFilter::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ACCOUNT_NOT_FOUND");
}
