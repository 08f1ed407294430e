use sqlx::PgPool;
use tracing::{debug, info};

use convoflow_core::CoreError;

/// Schema migrations, applied in order and recorded in `convoflow_migrations`
pub fn migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240601000000_initial_schema",
            r#"
            -- Authored flows, stored whole; the columns drive trigger lookups
            CREATE TABLE IF NOT EXISTS interactive_flows (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                is_active BOOLEAN NOT NULL,
                trigger_type TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (tenant_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_interactive_flows_trigger
                ON interactive_flows(tenant_id, trigger_type, created_at, id)
                WHERE is_active;

            -- Executions; status and version columns are authoritative over data
            CREATE TABLE IF NOT EXISTS flow_executions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                contact TEXT NOT NULL,
                flow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                version BIGINT NOT NULL,
                data JSONB NOT NULL,
                lease_token UUID,
                lease_expires_at TIMESTAMPTZ,
                started_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            -- At most one active execution per contact
            CREATE UNIQUE INDEX IF NOT EXISTS uq_flow_executions_active_contact
                ON flow_executions(tenant_id, contact)
                WHERE status = 'active';

            CREATE INDEX IF NOT EXISTS idx_flow_executions_contact
                ON flow_executions(tenant_id, contact, started_at DESC);
            "#,
        ),
        (
            "20240602000000_execution_flow_index",
            r#"
            CREATE INDEX IF NOT EXISTS idx_flow_executions_flow_status
                ON flow_executions(flow_id, status);
            "#,
        ),
    ]
}

/// Apply pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), CoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS convoflow_migrations (
            name TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| CoreError::StateStoreError(format!("Failed to create migrations table: {}", e)))?;

    for (name, sql) in migrations() {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CoreError::StateStoreError(format!("Failed to begin migration: {}", e)))?;

        let applied: Option<(String,)> =
            sqlx::query_as("SELECT name FROM convoflow_migrations WHERE name = $1 FOR UPDATE")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| CoreError::StateStoreError(e.to_string()))?;
        if applied.is_some() {
            debug!(migration = name, "Migration already applied");
            continue;
        }

        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::StateStoreError(format!("Migration {} failed: {}", name, e)))?;
        sqlx::query("INSERT INTO convoflow_migrations (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::StateStoreError(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| CoreError::StateStoreError(format!("Failed to commit migration: {}", e)))?;

        info!(migration = name, "Applied migration");
    }

    Ok(())
}
