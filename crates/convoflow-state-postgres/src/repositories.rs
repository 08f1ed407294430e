use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Row};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use convoflow_core::{
    domain::repository::{ExecutionLease, ExecutionStore, FlowDefinitionStore},
    BlockId, ContactId, CoreError, ExecutionId, ExecutionStatus, FlowExecution, FlowId,
    InteractiveFlow, TenantId, TriggerType,
};

use crate::PostgresConnection;

fn db_error(context: &str, e: sqlx::Error) -> CoreError {
    CoreError::StateStoreError(format!("{}: {}", context, e))
}

fn lease_expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(30))
}

fn flow_from_row(row: &PgRow) -> Result<InteractiveFlow, CoreError> {
    let data: serde_json::Value = row
        .try_get("data")
        .map_err(|e| CoreError::SerializationError(format!("Error getting data: {}", e)))?;
    serde_json::from_value(data)
        .map_err(|e| CoreError::SerializationError(format!("Error deserializing flow: {}", e)))
}

/// The `status` and `version` columns win over the JSON copy
fn execution_from_row(row: &PgRow) -> Result<FlowExecution, CoreError> {
    let data: serde_json::Value = row
        .try_get("data")
        .map_err(|e| CoreError::SerializationError(format!("Error getting data: {}", e)))?;
    let mut execution: FlowExecution = serde_json::from_value(data).map_err(|e| {
        CoreError::SerializationError(format!("Error deserializing execution: {}", e))
    })?;

    let status: String = row
        .try_get("status")
        .map_err(|e| CoreError::SerializationError(format!("Error getting status: {}", e)))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| CoreError::SerializationError(format!("Error getting version: {}", e)))?;

    execution.status = status.parse()?;
    execution.version = u64::try_from(version)
        .map_err(|_| CoreError::SerializationError(format!("negative version {}", version)))?;
    Ok(execution)
}

fn to_db_version(version: u64) -> Result<i64, CoreError> {
    i64::try_from(version)
        .map_err(|_| CoreError::StateStoreError(format!("version {} out of range", version)))
}

/// Postgres implementation of the FlowDefinitionStore
#[derive(Clone)]
pub struct PostgresFlowDefinitionStore {
    conn: PostgresConnection,
}

impl PostgresFlowDefinitionStore {
    /// Create a new Postgres flow definition store
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }

    /// Insert or replace a flow
    pub async fn save_flow(&self, flow: &InteractiveFlow) -> Result<(), CoreError> {
        let data = serde_json::to_value(flow)
            .map_err(|e| CoreError::SerializationError(format!("Error serializing flow: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO interactive_flows (tenant_id, id, is_active, trigger_type, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, id) DO UPDATE
            SET is_active = EXCLUDED.is_active,
                trigger_type = EXCLUDED.trigger_type,
                data = EXCLUDED.data,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(flow.tenant_id.as_str())
        .bind(flow.id.as_str())
        .bind(flow.is_active)
        .bind(flow.trigger_type.as_str())
        .bind(data)
        .bind(flow.created_at)
        .bind(flow.updated_at)
        .execute(self.conn.pool())
        .await
        .map_err(|e| db_error("Error saving flow", e))?;

        debug!(flow_id = %flow.id, tenant_id = %flow.tenant_id, "Flow saved");
        Ok(())
    }

    /// Remove a flow; returns whether it existed
    pub async fn delete_flow(&self, tenant_id: &TenantId, flow_id: &FlowId) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM interactive_flows WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_str())
            .bind(flow_id.as_str())
            .execute(self.conn.pool())
            .await
            .map_err(|e| db_error("Error deleting flow", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FlowDefinitionStore for PostgresFlowDefinitionStore {
    async fn get_active_flow(
        &self,
        tenant_id: &TenantId,
        flow_id: &FlowId,
    ) -> Result<Option<InteractiveFlow>, CoreError> {
        let row = sqlx::query(
            "SELECT data FROM interactive_flows WHERE tenant_id = $1 AND id = $2 AND is_active",
        )
        .bind(tenant_id.as_str())
        .bind(flow_id.as_str())
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Error loading flow", e))?;

        row.as_ref().map(flow_from_row).transpose()
    }

    async fn list_active_flows(
        &self,
        tenant_id: &TenantId,
        trigger_type: TriggerType,
    ) -> Result<Vec<InteractiveFlow>, CoreError> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM interactive_flows
            WHERE tenant_id = $1 AND trigger_type = $2 AND is_active
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(trigger_type.as_str())
        .fetch_all(self.conn.pool())
        .await
        .map_err(|e| db_error("Error listing flows", e))?;

        rows.iter().map(flow_from_row).collect()
    }
}

/// Postgres implementation of the ExecutionStore.
///
/// Claims are conditional updates: a lease is taken only when no unexpired
/// lease token is set. Saves compare lease token and version in the same
/// statement that writes the row.
#[derive(Clone)]
pub struct PostgresExecutionStore {
    conn: PostgresConnection,
}

impl PostgresExecutionStore {
    /// Create a new Postgres execution store
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }

    async fn status_of(&self, id: &ExecutionId) -> Result<Option<ExecutionStatus>, CoreError> {
        let row = sqlx::query("SELECT status FROM flow_executions WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Error loading execution status", e))?;

        match row {
            Some(row) => {
                let status: String = row
                    .try_get("status")
                    .map_err(|e| CoreError::SerializationError(format!("Error getting status: {}", e)))?;
                Ok(Some(status.parse()?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ExecutionStore for PostgresExecutionStore {
    async fn get_active(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Option<FlowExecution>, CoreError> {
        let row = sqlx::query(
            r#"
            SELECT data, status, version FROM flow_executions
            WHERE tenant_id = $1 AND contact = $2 AND status = 'active'
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(contact.as_str())
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Error loading active execution", e))?;

        row.as_ref().map(execution_from_row).transpose()
    }

    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<FlowExecution>, CoreError> {
        let row = sqlx::query("SELECT data, status, version FROM flow_executions WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| db_error("Error loading execution", e))?;

        row.as_ref().map(execution_from_row).transpose()
    }

    async fn claim(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        flow_id: &FlowId,
        start_block_id: &BlockId,
        ttl: Duration,
    ) -> Result<(FlowExecution, ExecutionLease), CoreError> {
        let mut execution = FlowExecution::new(
            flow_id.clone(),
            tenant_id.clone(),
            contact.clone(),
            start_block_id.clone(),
        );
        execution.version = 1;
        let lease = ExecutionLease::issue(execution.id.clone(), ttl);

        let data = serde_json::to_value(&execution).map_err(|e| {
            CoreError::SerializationError(format!("Error serializing execution: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO flow_executions
                (id, tenant_id, contact, flow_id, status, version, data,
                 lease_token, lease_expires_at, started_at, updated_at)
            VALUES ($1, $2, $3, $4, 'active', 1, $5, $6, $7, $8, $8)
            ON CONFLICT (tenant_id, contact) WHERE status = 'active' DO NOTHING
            "#,
        )
        .bind(execution.id.as_str())
        .bind(tenant_id.as_str())
        .bind(contact.as_str())
        .bind(flow_id.as_str())
        .bind(data)
        .bind(lease.token)
        .bind(lease.expires_at)
        .bind(execution.started_at)
        .execute(self.conn.pool())
        .await
        .map_err(|e| db_error("Error creating execution", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::AlreadyActive {
                tenant_id: tenant_id.to_string(),
                contact: contact.to_string(),
            });
        }

        debug!(execution_id = %execution.id, flow_id = %flow_id, "Execution created");
        Ok((execution, lease))
    }

    async fn claim_active(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        ttl: Duration,
    ) -> Result<Option<(FlowExecution, ExecutionLease)>, CoreError> {
        let now = Utc::now();
        let token = Uuid::new_v4();
        let expires_at = lease_expiry(now, ttl);

        let row = sqlx::query(
            r#"
            UPDATE flow_executions
            SET lease_token = $3, lease_expires_at = $4, updated_at = $5
            WHERE tenant_id = $1 AND contact = $2 AND status = 'active'
              AND (lease_token IS NULL OR lease_expires_at <= $5)
            RETURNING data, status, version
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(contact.as_str())
        .bind(token)
        .bind(expires_at)
        .bind(now)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Error claiming execution", e))?;

        match row {
            Some(row) => {
                let execution = execution_from_row(&row)?;
                let lease = ExecutionLease {
                    execution_id: execution.id.clone(),
                    token,
                    expires_at,
                };
                Ok(Some((execution, lease)))
            }
            None => match self.get_active(tenant_id, contact).await? {
                Some(execution) => Err(CoreError::Busy(format!("execution {} is claimed", execution.id))),
                None => Ok(None),
            },
        }
    }

    async fn claim_execution(
        &self,
        id: &ExecutionId,
        ttl: Duration,
    ) -> Result<(FlowExecution, ExecutionLease), CoreError> {
        let now = Utc::now();
        let token = Uuid::new_v4();
        let expires_at = lease_expiry(now, ttl);

        let row = sqlx::query(
            r#"
            UPDATE flow_executions
            SET lease_token = $2, lease_expires_at = $3, updated_at = $4
            WHERE id = $1 AND status = 'active'
              AND (lease_token IS NULL OR lease_expires_at <= $4)
            RETURNING data, status, version
            "#,
        )
        .bind(id.as_str())
        .bind(token)
        .bind(expires_at)
        .bind(now)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Error claiming execution", e))?;

        if let Some(row) = row {
            let execution = execution_from_row(&row)?;
            let lease = ExecutionLease {
                execution_id: id.clone(),
                token,
                expires_at,
            };
            return Ok((execution, lease));
        }

        match self.status_of(id).await? {
            None => Err(CoreError::ExecutionNotFound(id.to_string())),
            Some(status) if status.is_terminal() => Err(CoreError::ExecutionNotActive(id.to_string())),
            Some(_) => Err(CoreError::Busy(format!("execution {} is claimed", id))),
        }
    }

    async fn renew(&self, lease: &ExecutionLease, ttl: Duration) -> Result<ExecutionLease, CoreError> {
        let now = Utc::now();
        let expires_at = lease_expiry(now, ttl);

        let result = sqlx::query(
            r#"
            UPDATE flow_executions
            SET lease_expires_at = $3, updated_at = $4
            WHERE id = $1 AND lease_token = $2 AND status = 'active'
            "#,
        )
        .bind(lease.execution_id.as_str())
        .bind(lease.token)
        .bind(expires_at)
        .bind(now)
        .execute(self.conn.pool())
        .await
        .map_err(|e| db_error("Error renewing lease", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ClaimLost(format!(
                "lease on execution {} is no longer held",
                lease.execution_id
            )));
        }
        Ok(ExecutionLease {
            execution_id: lease.execution_id.clone(),
            token: lease.token,
            expires_at,
        })
    }

    async fn save(&self, execution: &FlowExecution, lease: &ExecutionLease) -> Result<u64, CoreError> {
        let data = serde_json::to_value(execution).map_err(|e| {
            CoreError::SerializationError(format!("Error serializing execution: {}", e))
        })?;

        let row = sqlx::query(
            r#"
            UPDATE flow_executions
            SET data = $1, status = $2, version = version + 1, updated_at = $3
            WHERE id = $4 AND lease_token = $5 AND version = $6
            RETURNING version
            "#,
        )
        .bind(data)
        .bind(execution.status.as_str())
        .bind(Utc::now())
        .bind(execution.id.as_str())
        .bind(lease.token)
        .bind(to_db_version(execution.version)?)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| db_error("Error saving execution", e))?;

        let Some(row) = row else {
            return Err(CoreError::ClaimLost(format!(
                "lease or version {} on execution {} is no longer current",
                execution.version, execution.id
            )));
        };
        let version: i64 = row
            .try_get("version")
            .map_err(|e| CoreError::SerializationError(format!("Error getting version: {}", e)))?;
        u64::try_from(version)
            .map_err(|_| CoreError::SerializationError(format!("negative version {}", version)))
    }

    async fn release(&self, lease: &ExecutionLease, status: ExecutionStatus) -> Result<(), CoreError> {
        let forced = status.is_terminal().then(|| status.as_str());

        let result = sqlx::query(
            r#"
            UPDATE flow_executions
            SET lease_token = NULL,
                lease_expires_at = NULL,
                status = COALESCE(CASE WHEN status = 'active' THEN $3::TEXT END, status),
                updated_at = $4
            WHERE id = $1 AND lease_token = $2
            "#,
        )
        .bind(lease.execution_id.as_str())
        .bind(lease.token)
        .bind(forced)
        .bind(Utc::now())
        .execute(self.conn.pool())
        .await
        .map_err(|e| db_error("Error releasing execution", e))?;

        if result.rows_affected() == 0 {
            warn!(execution_id = %lease.execution_id, "Release of a lease no longer held");
        }
        Ok(())
    }

    async fn list_for_contact(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Vec<FlowExecution>, CoreError> {
        let rows = sqlx::query(
            r#"
            SELECT data, status, version FROM flow_executions
            WHERE tenant_id = $1 AND contact = $2
            ORDER BY started_at DESC, id DESC
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(contact.as_str())
        .fetch_all(self.conn.pool())
        .await
        .map_err(|e| db_error("Error listing executions", e))?;

        rows.iter().map(execution_from_row).collect()
    }
}
