//! Account Lifecycle Manager
//!
//! Persists [`Transition`]s through a compare-and-swap on `accounts.version`.
//! A lost CAS means another writer (a lifecycle call or a ledger write)
//! touched the row; the transition is re-validated against fresh state.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;

use super::lifecycle::{LifecycleError, Transition};
use super::models::{Account, AccountFilter, AccountKind, AccountScope, Client};
use super::validation::{
    CurrencyCode, ValidationError, validate_email, validate_holder_name, validate_phone,
};
use crate::core_types::{AccountId, ClientId};
use crate::notify::{LedgerEvent, NotificationDispatcher};
use crate::store::{AccountStore, StoreError};

/// CAS attempts before giving up with `ConcurrentModification`
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const ACCOUNT_NUMBER_ATTEMPTS: u32 = 5;

/// Contact details for a client created together with its first account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClient {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Account opening request
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAccountRequest {
    pub holder_name: String,
    pub kind: AccountKind,
    pub currency: String,
    /// Attach to an existing client
    #[serde(default)]
    pub client_id: Option<ClientId>,
    /// Create a new client for the holder (ignored when `client_id` is set)
    #[serde(default)]
    pub new_client: Option<NewClient>,
}

/// Client contact change; absent fields are left as they are
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactUpdate {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl OpenAccountRequest {
    pub fn new(holder_name: &str, kind: AccountKind, currency: &str) -> Self {
        Self {
            holder_name: holder_name.to_string(),
            kind,
            currency: currency.to_string(),
            client_id: None,
            new_client: None,
        }
    }

    pub fn with_new_client(mut self, client: NewClient) -> Self {
        self.new_client = Some(client);
        self
    }
}

/// `C` followed by 8 random digits
pub fn generate_account_number() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..100_000_000);
    format!("C{:08}", n)
}

/// Owns the account state machine
#[derive(Clone)]
pub struct AccountLifecycleManager {
    store: Arc<dyn AccountStore>,
    notifications: NotificationDispatcher,
    max_attempts: u32,
}

impl AccountLifecycleManager {
    pub fn new(store: Arc<dyn AccountStore>, notifications: NotificationDispatcher) -> Self {
        Self {
            store,
            notifications,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    // ========================================================================
    // Opening and reads
    // ========================================================================

    /// Open an active account with a zero balance
    ///
    /// Opening deposits are regular credits submitted through the ledger.
    pub async fn open_account(&self, req: OpenAccountRequest) -> Result<Account, LifecycleError> {
        let holder_name = validate_holder_name(&req.holder_name)?;
        let currency = CurrencyCode::new(&req.currency)?;
        let now = Utc::now();

        let client_id = match (req.client_id, req.new_client) {
            (Some(id), _) => Some(id),
            (None, Some(contact)) => {
                let client = Client {
                    id: ClientId::new(),
                    holder_name: holder_name.clone(),
                    email: contact.email,
                    phone: contact.phone,
                    created_at: now,
                };
                self.store.insert_client(&client).await?;
                tracing::info!(client_id = %client.id, "Client created");
                self.notifications
                    .dispatch(LedgerEvent::client_created(&client));
                Some(client.id)
            }
            (None, None) => None,
        };

        for attempt in 1..=ACCOUNT_NUMBER_ATTEMPTS {
            let account = Account::open(
                generate_account_number(),
                holder_name.clone(),
                req.kind,
                currency.clone(),
                client_id,
                now,
            );
            match self.store.insert_account(&account).await {
                Ok(()) => {
                    tracing::info!(
                        account_id = %account.id,
                        account_number = %account.account_number,
                        kind = %account.kind,
                        currency = %account.currency,
                        "Account opened"
                    );
                    return Ok(account);
                }
                Err(StoreError::Conflict(what)) => {
                    tracing::debug!(attempt, conflict = %what, "Account number taken, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Conflict("no free account number after retries".to_string()).into())
    }

    pub async fn get(&self, id: AccountId, scope: AccountScope) -> Result<Account, LifecycleError> {
        self.store
            .find_account(id, scope)
            .await?
            .ok_or(LifecycleError::AccountNotFound(id))
    }

    pub async fn find_by_number(
        &self,
        account_number: &str,
        scope: AccountScope,
    ) -> Result<Option<Account>, LifecycleError> {
        Ok(self.store.find_by_number(account_number, scope).await?)
    }

    /// Default listing: archived and soft-deleted accounts excluded
    pub async fn list(&self, filter: &AccountFilter) -> Result<Vec<Account>, LifecycleError> {
        Ok(self.store.list_accounts(filter, AccountScope::Live).await?)
    }

    /// Archived accounts only
    pub async fn list_archived(
        &self,
        filter: &AccountFilter,
    ) -> Result<Vec<Account>, LifecycleError> {
        let filter = AccountFilter {
            archived_only: true,
            ..filter.clone()
        };
        Ok(self.store.list_accounts(&filter, AccountScope::All).await?)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub async fn block(
        &self,
        id: AccountId,
        until: DateTime<Utc>,
    ) -> Result<Account, LifecycleError> {
        self.apply(id, Transition::Block { until }, Utc::now()).await
    }

    pub async fn unblock(&self, id: AccountId) -> Result<Account, LifecycleError> {
        self.apply(id, Transition::Unblock, Utc::now()).await
    }

    pub async fn archive(&self, id: AccountId) -> Result<Account, LifecycleError> {
        self.apply(id, Transition::Archive, Utc::now()).await
    }

    pub async fn unarchive(&self, id: AccountId) -> Result<Account, LifecycleError> {
        self.apply(id, Transition::Unarchive, Utc::now()).await
    }

    pub async fn close(&self, id: AccountId) -> Result<Account, LifecycleError> {
        self.apply(id, Transition::Close, Utc::now()).await
    }

    pub async fn delete(&self, id: AccountId) -> Result<Account, LifecycleError> {
        self.apply(id, Transition::Delete, Utc::now()).await
    }

    pub async fn restore(&self, id: AccountId) -> Result<Account, LifecycleError> {
        self.apply(id, Transition::Restore, Utc::now()).await
    }

    /// Apply `transition` as of `now` with optimistic retry
    ///
    /// Soft-deleted accounts that are not archived are invisible except to
    /// `delete` and `restore`.
    pub async fn apply(
        &self,
        id: AccountId,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Account, LifecycleError> {
        let revives = matches!(transition, Transition::Delete | Transition::Restore);
        let account = self
            .write_with_retry(id, transition.name(), |account| {
                if !revives {
                    require_visible(account)?;
                }
                transition.apply(account, now)
            })
            .await?;

        if let Transition::Block { .. } = transition {
            self.notifications
                .dispatch(LedgerEvent::account_blocked(&account));
        }
        Ok(account)
    }

    // ========================================================================
    // Holder and contact updates
    // ========================================================================

    /// Rename the account holder (closed and archived accounts included)
    pub async fn update_holder(
        &self,
        id: AccountId,
        holder_name: &str,
    ) -> Result<Account, LifecycleError> {
        let holder_name = validate_holder_name(holder_name)?;
        self.write_with_retry(id, "update_holder", |account| {
            require_visible(account)?;
            account.holder_name = holder_name.clone();
            Ok(None)
        })
        .await
    }

    /// Change the email and/or phone of the client owning `id`
    ///
    /// Serialized with lifecycle transitions through the account version.
    pub async fn update_client_contact(
        &self,
        id: AccountId,
        update: ContactUpdate,
    ) -> Result<Client, LifecycleError> {
        let email = update.email.as_deref().map(validate_email).transpose()?;
        let phone = update.phone.as_deref().map(validate_phone).transpose()?;
        if email.is_none() && phone.is_none() {
            return Err(ValidationError::EmptyUpdate.into());
        }

        for attempt in 1..=self.max_attempts {
            let account = self
                .store
                .find_account(id, AccountScope::All)
                .await?
                .ok_or(LifecycleError::AccountNotFound(id))?;
            require_visible(&account)?;

            let client_id = account.client_id.ok_or(LifecycleError::NoClient(id))?;
            let mut client = self
                .store
                .find_client(client_id)
                .await?
                .ok_or(LifecycleError::NoClient(id))?;
            if let Some(email) = &email {
                client.email = Some(email.clone());
            }
            if let Some(phone) = &phone {
                client.phone = Some(phone.clone());
            }

            if self
                .store
                .save_client_contact(&client, id, account.version)
                .await?
            {
                tracing::info!(account_id = %id, client_id = %client.id, "Client contact updated");
                return Ok(client);
            }
            tracing::debug!(account_id = %id, attempt, "Account changed concurrently, retrying");
        }

        tracing::warn!(
            account_id = %id,
            attempts = self.max_attempts,
            "Giving up on contact update after repeated conflicts"
        );
        Err(LifecycleError::ConcurrentModification(id))
    }

    /// Read-modify-CAS loop shared by every account write
    ///
    /// `change` mutates a fresh copy and returns the cascade for
    /// `save_transition`; it is re-run against the new row after a lost CAS.
    async fn write_with_retry<F>(
        &self,
        id: AccountId,
        action: &'static str,
        mut change: F,
    ) -> Result<Account, LifecycleError>
    where
        F: FnMut(&mut Account) -> Result<Option<bool>, LifecycleError> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let mut account = self
                .store
                .find_account(id, AccountScope::All)
                .await?
                .ok_or(LifecycleError::AccountNotFound(id))?;

            let expected_version = account.version;
            let cascade = change(&mut account)?;

            if self
                .store
                .save_transition(&account, expected_version, cascade)
                .await?
            {
                account.version = expected_version + 1;
                tracing::info!(
                    account_id = %id,
                    action,
                    status = %account.status,
                    cascade = ?cascade,
                    "Account updated"
                );
                return Ok(account);
            }

            tracing::debug!(
                account_id = %id,
                action,
                attempt,
                "Account changed concurrently, retrying"
            );
        }

        tracing::warn!(
            account_id = %id,
            action,
            attempts = self.max_attempts,
            "Giving up on account write after repeated conflicts"
        );
        Err(LifecycleError::ConcurrentModification(id))
    }
}

/// Soft-deleted, non-archived rows do not exist for regular operations
fn require_visible(account: &Account) -> Result<(), LifecycleError> {
    if account.is_deleted() && !account.archived {
        return Err(LifecycleError::AccountNotFound(account.id));
    }
    Ok(())
}
