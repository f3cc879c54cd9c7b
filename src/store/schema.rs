use anyhow::Result;
use sqlx::PgPool;

/// Create primary-store tables (accounts, clients, transactions, run claims)
pub async fn init_primary_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing primary schema...");
    exec_all(pool, PRIMARY_SCHEMA).await?;
    tracing::info!("Primary schema initialized successfully");
    Ok(())
}

/// Create the archive-store table
pub async fn init_archive_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing archive schema...");
    exec_all(pool, ARCHIVE_SCHEMA).await?;
    tracing::info!("Archive schema initialized successfully");
    Ok(())
}

/// Create the weekly snapshot table
pub async fn init_document_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing document schema...");
    exec_all(pool, DOCUMENT_SCHEMA).await?;
    tracing::info!("Document schema initialized successfully");
    Ok(())
}

async fn exec_all(pool: &PgPool, statements: &[&str]) -> Result<()> {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to apply schema statement: {}", e))?;
    }
    Ok(())
}

// =============================================================================
// Primary store
// =============================================================================
//
// kind/status columns hold the `#[repr(i16)]` ids of the Rust enums.
// `balance` is the running balance; only completed transactions move it.

pub const PRIMARY_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        id          UUID PRIMARY KEY,
        holder_name VARCHAR(120) NOT NULL,
        email       VARCHAR(255),
        phone       VARCHAR(32),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id             UUID PRIMARY KEY,
        account_number VARCHAR(16) NOT NULL UNIQUE,
        holder_name    VARCHAR(120) NOT NULL,
        kind           SMALLINT NOT NULL,
        currency       CHAR(3) NOT NULL,
        status         SMALLINT NOT NULL,
        balance        NUMERIC(20, 2) NOT NULL DEFAULT 0,
        block_start    TIMESTAMPTZ,
        block_end      TIMESTAMPTZ,
        archived       BOOLEAN NOT NULL DEFAULT FALSE,
        deleted_at     TIMESTAMPTZ,
        client_id      UUID REFERENCES clients(id),
        created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        version        BIGINT NOT NULL DEFAULT 0,
        CONSTRAINT accounts_archived_deleted CHECK (NOT archived OR deleted_at IS NOT NULL)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id          UUID PRIMARY KEY,
        account_id  UUID NOT NULL REFERENCES accounts(id),
        kind        SMALLINT NOT NULL,
        amount      NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
        currency    CHAR(3) NOT NULL,
        status      SMALLINT NOT NULL,
        reference   VARCHAR(64) NOT NULL UNIQUE,
        description VARCHAR(255),
        occurred_at TIMESTAMPTZ NOT NULL,
        archived    BOOLEAN NOT NULL DEFAULT FALSE,
        metadata    JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_transactions_account_time ON transactions (account_id, occurred_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_pending_archive ON transactions (occurred_at) WHERE NOT archived",
    r#"
    CREATE TABLE IF NOT EXISTS archive_runs (
        day        DATE PRIMARY KEY,
        job        VARCHAR(32) NOT NULL,
        claimed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

// =============================================================================
// Archive store
// =============================================================================

pub const ARCHIVE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS archived_transactions (
        id             UUID PRIMARY KEY,
        account_id     UUID NOT NULL,
        account_number VARCHAR(16) NOT NULL,
        holder_name    VARCHAR(120) NOT NULL,
        client_id      UUID,
        kind           SMALLINT NOT NULL,
        amount         NUMERIC(20, 2) NOT NULL,
        currency       CHAR(3) NOT NULL,
        status         SMALLINT NOT NULL,
        reference      VARCHAR(64) NOT NULL,
        description    VARCHAR(255),
        occurred_at    TIMESTAMPTZ NOT NULL,
        metadata       JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at     TIMESTAMPTZ NOT NULL,
        archived_at    TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_archived_account_time ON archived_transactions (account_id, occurred_at DESC)",
];

// =============================================================================
// Document store
// =============================================================================

pub const DOCUMENT_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS weekly_snapshots (
        partition_name VARCHAR(64) NOT NULL,
        transaction_id UUID NOT NULL,
        document       JSONB NOT NULL,
        archived_at    TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (partition_name, transaction_id)
    )
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for statement in PRIMARY_SCHEMA
            .iter()
            .chain(ARCHIVE_SCHEMA)
            .chain(DOCUMENT_SCHEMA)
        {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "not re-runnable: {}",
                statement.trim()
            );
        }
    }
}
