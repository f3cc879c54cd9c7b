//! PostgreSQL run ledger (`archive_runs`)

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{RunLedger, StoreError};
use crate::jobs::JobKind;

/// Day-ownership claims backed by PostgreSQL
#[derive(Clone)]
pub struct PgRunLedger {
    pool: PgPool,
}

impl PgRunLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// An undecodable day fails the claim instead of reading as owned elsewhere
fn owned_days(rows: &[PgRow]) -> Result<Vec<NaiveDate>, StoreError> {
    rows.iter()
        .map(|row| row.try_get::<NaiveDate, _>("day").map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl RunLedger for PgRunLedger {
    async fn claim(&self, job: JobKind, days: &[NaiveDate]) -> Result<Vec<NaiveDate>, StoreError> {
        if days.is_empty() {
            return Ok(Vec::new());
        }

        let mut db_tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO archive_runs (day, job)
            SELECT d, $2 FROM UNNEST($1::date[]) AS d
            ON CONFLICT (day) DO NOTHING
            "#,
        )
        .bind(days)
        .bind(job.as_str())
        .execute(&mut *db_tx)
        .await?;

        let rows = sqlx::query(
            "SELECT day FROM archive_runs WHERE day = ANY($1) AND job = $2 ORDER BY day",
        )
        .bind(days)
        .bind(job.as_str())
        .fetch_all(&mut *db_tx)
        .await?;
        db_tx.commit().await?;

        let owned = owned_days(&rows)?;

        tracing::debug!(
            job = job.as_str(),
            requested = days.len(),
            owned = owned.len(),
            "Archive days claimed"
        );
        Ok(owned)
    }

    async fn release(&self, job: JobKind, days: &[NaiveDate]) -> Result<u64, StoreError> {
        if days.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM archive_runs WHERE day = ANY($1) AND job = $2")
            .bind(days)
            .bind(job.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
