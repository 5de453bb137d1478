//! Core schema for the PostgreSQL backend.
//!
//! Rows are stored as JSONB documents with the columns the security layer
//! and foreign keys need extracted alongside. All statements are idempotent
//! so initialization doubles as migration for the core tables.

use crate::error::ProviderResult;

use super::sql::map_pg_error;

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS clients (
        id TEXT PRIMARY KEY,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS client_users (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (client_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS deliveries (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS recipes (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS vendors (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY,
        client_id TEXT,
        user_id TEXT,
        action TEXT,
        resource TEXT,
        success BOOLEAN,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_client_users_user ON client_users (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_client_users_client ON client_users (client_id)",
    "CREATE INDEX IF NOT EXISTS idx_deliveries_client ON deliveries (client_id)",
    "CREATE INDEX IF NOT EXISTS idx_recipes_client ON recipes (client_id)",
    "CREATE INDEX IF NOT EXISTS idx_vendors_client ON vendors (client_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_client ON audit_log (client_id)",
];

/// Creates the core tables and indexes if they do not exist.
pub(crate) async fn initialize_schema(client: &tokio_postgres::Client) -> ProviderResult<()> {
    for statement in SCHEMA_STATEMENTS {
        client
            .batch_execute(statement)
            .await
            .map_err(|e| map_pg_error("initialize schema", e))?;
    }
    tracing::debug!(
        statements = SCHEMA_STATEMENTS.len(),
        "postgres schema initialized"
    );
    Ok(())
}
