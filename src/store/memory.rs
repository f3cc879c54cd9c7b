//! In-memory stores
//!
//! Same contracts as the PostgreSQL stores, backed by mutex-guarded maps.
//! A single mutex over the whole primary state gives the per-account
//! critical section for free. Each store exposes fault switches so callers
//! can exercise the failure paths of the archival jobs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{AccountStore, ArchiveStore, DocumentStore, RunLedger, StoreError, TransactionStore};
use crate::account::models::{Account, AccountFilter, AccountScope, AccountStatus, Client};
use crate::archive::record::{ArchiveCandidate, ArchiveRecord, SnapshotDocument};
use crate::core_types::{AccountId, ClientId, TransactionId};
use crate::jobs::JobKind;
use crate::ledger::error::LedgerError;
use crate::ledger::models::{Transaction, TransactionFilter, TransactionKind, TransactionStatus};
use crate::ledger::rules::{AccountSnapshot, Proposal, RuleEngine, RuleViolation};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn newest_first(rows: &mut [Transaction]) {
    rows.sort_by(|a, b| {
        b.occurred_at
            .cmp(&a.occurred_at)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

// ============================================================================
// Primary store
// ============================================================================

#[derive(Default)]
struct LedgerState {
    clients: HashMap<ClientId, Client>,
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
}

impl LedgerState {
    fn credits_on(&self, account_id: AccountId, day: NaiveDate) -> Decimal {
        self.transactions
            .values()
            .filter(|t| {
                t.account_id == account_id
                    && t.kind == TransactionKind::Credit
                    && t.status != TransactionStatus::Failed
                    && t.occurred_at.date_naive() == day
            })
            .map(|t| t.amount)
            .sum()
    }

    fn apply(&mut self, tx: &Transaction) {
        if let Some(account) = self.accounts.get_mut(&tx.account_id) {
            if tx.status.affects_balance() {
                account.balance += tx.kind.signed(tx.amount);
            }
            account.version += 1;
        }
    }
}

/// Primary store (accounts, clients and transactions) held in memory
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
    fail_mark: AtomicBool,
    fail_delete: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `mark_archived` fail until switched off
    pub fn set_fail_mark(&self, fail: bool) {
        self.fail_mark.store(fail, Ordering::SeqCst);
    }

    /// Make `delete_transactions` fail until switched off
    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Insert a historical transaction without running the rule gate
    ///
    /// The balance is still updated, so imported history stays consistent.
    pub fn import_transaction(&self, tx: Transaction) {
        let mut state = lock(&self.state);
        state.apply(&tx);
        state.transactions.insert(tx.id, tx);
    }

    pub fn transaction_count(&self) -> usize {
        lock(&self.state).transactions.len()
    }

    pub fn client(&self, id: ClientId) -> Option<Client> {
        lock(&self.state).clients.get(&id).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryLedgerStore {
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.clients.contains_key(&client.id) {
            return Err(StoreError::Conflict(format!("client {}", client.id)));
        }
        state.clients.insert(client.id, client.clone());
        Ok(())
    }

    async fn find_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        Ok(lock(&self.state).clients.get(&id).cloned())
    }

    async fn save_client_contact(
        &self,
        client: &Client,
        account_id: AccountId,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        if !state.clients.contains_key(&client.id) {
            return Err(StoreError::Corrupt(format!("client {} missing", client.id)));
        }
        let Some(account) = state.accounts.get_mut(&account_id) else {
            return Ok(false);
        };
        if account.version != expected_version {
            return Ok(false);
        }
        account.version += 1;
        if let Some(stored) = state.clients.get_mut(&client.id) {
            stored.email = client.email.clone();
            stored.phone = client.phone.clone();
        }
        Ok(true)
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state
            .accounts
            .values()
            .any(|a| a.account_number == account.account_number)
        {
            return Err(StoreError::Conflict(format!(
                "account number {}",
                account.account_number
            )));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account(
        &self,
        id: AccountId,
        scope: AccountScope,
    ) -> Result<Option<Account>, StoreError> {
        Ok(lock(&self.state)
            .accounts
            .get(&id)
            .filter(|a| scope.admits(a))
            .cloned())
    }

    async fn find_by_number(
        &self,
        account_number: &str,
        scope: AccountScope,
    ) -> Result<Option<Account>, StoreError> {
        Ok(lock(&self.state)
            .accounts
            .values()
            .find(|a| a.account_number == account_number && scope.admits(a))
            .cloned())
    }

    async fn list_accounts(
        &self,
        filter: &AccountFilter,
        scope: AccountScope,
    ) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = lock(&self.state)
            .accounts
            .values()
            .filter(|a| scope.admits(a) && filter.matches(a))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            accounts.truncate(limit.max(0) as usize);
        }
        Ok(accounts)
    }

    async fn archive_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Account>, StoreError> {
        Ok(lock(&self.state)
            .accounts
            .values()
            .filter(|a| {
                a.status == AccountStatus::Blocked
                    && !a.archived
                    && a.block_start.is_some_and(|start| start <= now)
            })
            .cloned()
            .collect())
    }

    async fn unarchive_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Account>, StoreError> {
        Ok(lock(&self.state)
            .accounts
            .values()
            .filter(|a| {
                a.archived
                    && a.status != AccountStatus::Closed
                    && a.block_end.is_some_and(|end| end <= now)
            })
            .cloned()
            .collect())
    }

    async fn save_transition(
        &self,
        account: &Account,
        expected_version: i64,
        cascade: Option<bool>,
    ) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        let Some(current) = state.accounts.get(&account.id) else {
            return Ok(false);
        };
        if current.version != expected_version {
            return Ok(false);
        }

        let mut next = account.clone();
        // balance is owned by the ledger path
        next.balance = current.balance;
        next.version = expected_version + 1;
        state.accounts.insert(next.id, next);

        if let Some(flag) = cascade {
            for tx in state
                .transactions
                .values_mut()
                .filter(|t| t.account_id == account.id)
            {
                tx.archived = flag;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl TransactionStore for MemoryLedgerStore {
    async fn record_checked(
        &self,
        tx: Transaction,
        rules: &RuleEngine,
    ) -> Result<Transaction, LedgerError> {
        let mut state = lock(&self.state);

        let snapshot = state.accounts.get(&tx.account_id).map(|account| {
            AccountSnapshot::new(
                account,
                state.credits_on(account.id, tx.occurred_at.date_naive()),
            )
        });
        rules.evaluate(snapshot.as_ref(), &Proposal::from(&tx))?;

        if state
            .transactions
            .values()
            .any(|t| t.reference == tx.reference)
        {
            return Err(LedgerError::DuplicateReference(tx.reference));
        }
        if !state.accounts.contains_key(&tx.account_id) {
            return Err(RuleViolation::AccountNotFound.into());
        }

        state.apply(&tx);
        state.transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(lock(&self.state).transactions.get(&id).cloned())
    }

    async fn list_for_account(
        &self,
        account_id: AccountId,
        filter: &TransactionFilter,
        include_flagged: bool,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut rows: Vec<Transaction> = lock(&self.state)
            .transactions
            .values()
            .filter(|t| {
                t.account_id == account_id && (include_flagged || !t.archived) && filter.matches(t)
            })
            .cloned()
            .collect();
        newest_first(&mut rows);
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn pending_for_day(&self, day: NaiveDate) -> Result<Vec<ArchiveCandidate>, StoreError> {
        let state = lock(&self.state);
        let mut candidates: Vec<ArchiveCandidate> = state
            .transactions
            .values()
            .filter(|t| !t.archived && t.occurred_at.date_naive() == day)
            .filter_map(|t| {
                let account = state.accounts.get(&t.account_id)?;
                Some(ArchiveCandidate {
                    transaction: t.clone(),
                    account_number: account.account_number.clone(),
                    holder_name: account.holder_name.clone(),
                    client_id: account.client_id,
                })
            })
            .collect();
        candidates.sort_by_key(|c| c.transaction.occurred_at);
        Ok(candidates)
    }

    async fn in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut rows: Vec<Transaction> = lock(&self.state)
            .transactions
            .values()
            .filter(|t| t.occurred_at >= from && t.occurred_at < to)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.occurred_at);
        Ok(rows)
    }

    async fn mark_archived(&self, ids: &[TransactionId]) -> Result<u64, StoreError> {
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mark_archived disabled".to_string()));
        }
        let mut state = lock(&self.state);
        let mut updated = 0;
        for id in ids {
            if let Some(tx) = state.transactions.get_mut(id) {
                tx.archived = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_transactions(&self, ids: &[TransactionId]) -> Result<u64, StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "delete_transactions disabled".to_string(),
            ));
        }
        let mut state = lock(&self.state);
        Ok(ids
            .iter()
            .filter(|id| state.transactions.remove(*id).is_some())
            .count() as u64)
    }
}

// ============================================================================
// Archive store
// ============================================================================

/// Archive store held in memory
pub struct MemoryArchiveStore {
    records: Mutex<BTreeMap<TransactionId, ArchiveRecord>>,
    reachable: AtomicBool,
    fail_inserts: AtomicU32,
    insert_attempts: AtomicUsize,
}

impl Default for MemoryArchiveStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            fail_inserts: AtomicU32::new(0),
            insert_attempts: AtomicUsize::new(0),
        }
    }
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `insert_batch`
    pub fn fail_next_inserts(&self, n: u32) {
        self.fail_inserts.store(n, Ordering::SeqCst);
    }

    /// Number of `insert_batch` calls seen so far
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: TransactionId) -> Option<ArchiveRecord> {
        lock(&self.records).get(&id).cloned()
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("archive store unreachable".to_string()))
        }
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn insert_batch(&self, records: &[ArchiveRecord]) -> Result<u64, StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let failing = self
            .fail_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("archive insert failed".to_string()));
        }

        let mut stored = lock(&self.records);
        let mut inserted = 0;
        for record in records {
            if !stored.contains_key(&record.id()) {
                stored.insert(record.id(), record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn query(
        &self,
        account_id: AccountId,
        filter: &TransactionFilter,
    ) -> Result<Vec<ArchiveRecord>, StoreError> {
        self.check_reachable()?;
        let mut rows: Vec<ArchiveRecord> = lock(&self.records)
            .values()
            .filter(|r| r.transaction.account_id == account_id && filter.matches(&r.transaction))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.transaction.occurred_at.cmp(&a.transaction.occurred_at));
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn find(&self, id: TransactionId) -> Result<Option<ArchiveRecord>, StoreError> {
        self.check_reachable()?;
        Ok(self.get(id))
    }

    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Document store
// ============================================================================

/// Weekly document store held in memory
#[derive(Default)]
pub struct MemoryDocumentStore {
    partitions: Mutex<BTreeMap<String, BTreeMap<TransactionId, SnapshotDocument>>>,
    fail: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn partition(&self, name: &str) -> Vec<SnapshotDocument> {
        lock(&self.partitions)
            .get(name)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn partition_names(&self) -> Vec<String> {
        lock(&self.partitions).keys().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_batch(
        &self,
        partition: &str,
        documents: &[SnapshotDocument],
    ) -> Result<u64, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("document store unreachable".to_string()));
        }
        let mut partitions = lock(&self.partitions);
        let docs = partitions.entry(partition.to_string()).or_default();
        let mut inserted = 0;
        for doc in documents {
            if !docs.contains_key(&doc.id()) {
                docs.insert(doc.id(), doc.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

// ============================================================================
// Run ledger
// ============================================================================

/// Day-ownership claims held in memory
#[derive(Default)]
pub struct MemoryRunLedger {
    owners: Mutex<BTreeMap<NaiveDate, JobKind>>,
}

impl MemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, day: NaiveDate) -> Option<JobKind> {
        lock(&self.owners).get(&day).copied()
    }
}

#[async_trait]
impl RunLedger for MemoryRunLedger {
    async fn claim(&self, job: JobKind, days: &[NaiveDate]) -> Result<Vec<NaiveDate>, StoreError> {
        let mut owners = lock(&self.owners);
        Ok(days
            .iter()
            .copied()
            .filter(|day| *owners.entry(*day).or_insert(job) == job)
            .collect())
    }

    async fn release(&self, job: JobKind, days: &[NaiveDate]) -> Result<u64, StoreError> {
        let mut owners = lock(&self.owners);
        let mut released = 0;
        for day in days {
            if owners.get(day) == Some(&job) {
                owners.remove(day);
                released += 1;
            }
        }
        Ok(released)
    }
}
