//! PostgreSQL archive store
//!
//! Lives in its own database (`database.archive_url`). Rows are written once
//! per transaction id and never updated.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::postgres::{push_transaction_filter, sql_limit, transaction_from_row};
use super::{ArchiveStore, StoreError};
use crate::archive::record::ArchiveRecord;
use crate::core_types::{AccountId, ClientId, TransactionId};
use crate::ledger::models::TransactionFilter;

/// Archive store backed by PostgreSQL
#[derive(Clone)]
pub struct PgArchiveStore {
    pool: PgPool,
}

impl PgArchiveStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ARCHIVE_COLUMNS: &str = "t.id, t.account_id, t.kind, t.amount, t.currency, t.status, \
     t.reference, t.description, t.occurred_at, TRUE AS archived, t.metadata, t.created_at, \
     t.account_number, t.holder_name, t.client_id, t.archived_at";

fn record_from_row(row: &PgRow) -> Result<ArchiveRecord, StoreError> {
    Ok(ArchiveRecord {
        transaction: transaction_from_row(row)?,
        account_number: row.try_get("account_number")?,
        holder_name: row.try_get("holder_name")?,
        client_id: row
            .try_get::<Option<Uuid>, _>("client_id")?
            .map(ClientId::from_uuid),
        archived_at: row.try_get("archived_at")?,
    })
}

#[async_trait]
impl ArchiveStore for PgArchiveStore {
    async fn insert_batch(&self, records: &[ArchiveRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut db_tx = self.pool.begin().await?;
        let mut inserted = 0;
        for record in records {
            let tx = &record.transaction;
            let result = sqlx::query(
                r#"
                INSERT INTO archived_transactions
                    (id, account_id, account_number, holder_name, client_id, kind, amount,
                     currency, status, reference, description, occurred_at, metadata,
                     created_at, archived_at)
                VALUES
                    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(tx.id.as_uuid())
            .bind(tx.account_id.as_uuid())
            .bind(&record.account_number)
            .bind(&record.holder_name)
            .bind(record.client_id.map(|c| c.as_uuid()))
            .bind(tx.kind.id())
            .bind(tx.amount)
            .bind(tx.currency.as_str())
            .bind(tx.status.id())
            .bind(&tx.reference)
            .bind(&tx.description)
            .bind(tx.occurred_at)
            .bind(&tx.metadata)
            .bind(tx.created_at)
            .bind(record.archived_at)
            .execute(&mut *db_tx)
            .await?;
            inserted += result.rows_affected();
        }
        db_tx.commit().await?;

        Ok(inserted)
    }

    async fn query(
        &self,
        account_id: AccountId,
        filter: &TransactionFilter,
    ) -> Result<Vec<ArchiveRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archived_transactions t WHERE t.account_id = "
        ));
        qb.push_bind(account_id.as_uuid());
        push_transaction_filter(&mut qb, filter);
        qb.push(" ORDER BY t.occurred_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(sql_limit(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn find(&self, id: TransactionId) -> Result<Option<ArchiveRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archived_transactions t WHERE t.id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn is_reachable(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Archive store health check failed");
                false
            }
        }
    }
}
