//! Store traits for the convoflow engine
//!
//! The engine reads flow definitions and owns execution records through these
//! traits. Backends live in their own crates (`convoflow-state-inmemory`,
//! `convoflow-state-postgres`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use super::flow_definition::{InteractiveFlow, TriggerType};
use super::flow_execution::{ExecutionStatus, FlowExecution};
use super::identifiers::{BlockId, ContactId, ExecutionId, FlowId, TenantId};
use crate::CoreError;

/// Proof that the holder may advance an execution.
///
/// A lease is handed out by the claim operations and must be presented on
/// every save. After its TTL another claim may take it over, so a crashed
/// invocation never locks a contact forever. Until that happens a lapsed
/// lease stays usable and [`ExecutionStore::renew`] can extend it. A save or
/// renew with a superseded lease fails with [`CoreError::ClaimLost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLease {
    /// Claimed execution
    pub execution_id: ExecutionId,

    /// Token identifying this claim
    pub token: Uuid,

    /// When the claim lapses
    pub expires_at: DateTime<Utc>,
}

impl ExecutionLease {
    /// Issue a new lease valid for `ttl`
    pub fn issue(execution_id: ExecutionId, ttl: Duration) -> Self {
        Self {
            execution_id,
            token: Uuid::new_v4(),
            expires_at: expiry_after(ttl),
        }
    }

    /// The same claim, valid for `ttl` from now
    pub fn extended(&self, ttl: Duration) -> Self {
        Self {
            execution_id: self.execution_id.clone(),
            token: self.token,
            expires_at: expiry_after(ttl),
        }
    }

    /// Whether the lease has lapsed at `now`
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(30))
}

/// Read-only access to authored flows
#[async_trait]
pub trait FlowDefinitionStore: Send + Sync {
    /// Find an active flow of the tenant
    async fn get_active_flow(
        &self,
        tenant_id: &TenantId,
        flow_id: &FlowId,
    ) -> Result<Option<InteractiveFlow>, CoreError>;

    /// Active flows of the tenant with the given trigger, oldest first (ties by flow id)
    async fn list_active_flows(
        &self,
        tenant_id: &TenantId,
        trigger_type: TriggerType,
    ) -> Result<Vec<InteractiveFlow>, CoreError>;
}

/// Durable execution records and the per-contact serialization boundary.
///
/// Implementations guarantee that at most one execution per
/// `(tenant, contact)` is `active`, and that at most one lease token is
/// current per execution. Taking over a lapsed lease replaces its token.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// The active execution of a contact, without claiming it
    async fn get_active(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Option<FlowExecution>, CoreError>;

    /// Any execution by id
    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<FlowExecution>, CoreError>;

    /// Create an active execution for the contact and claim it.
    ///
    /// Fails with [`CoreError::AlreadyActive`] when the contact already has an
    /// active execution.
    async fn claim(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        flow_id: &FlowId,
        start_block_id: &BlockId,
        ttl: Duration,
    ) -> Result<(FlowExecution, ExecutionLease), CoreError>;

    /// Claim the contact's active execution.
    ///
    /// Returns `Ok(None)` when there is none and [`CoreError::Busy`] when
    /// another unexpired lease holds it.
    async fn claim_active(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        ttl: Duration,
    ) -> Result<Option<(FlowExecution, ExecutionLease)>, CoreError>;

    /// Claim an active execution by id (administrative paths)
    async fn claim_execution(
        &self,
        id: &ExecutionId,
        ttl: Duration,
    ) -> Result<(FlowExecution, ExecutionLease), CoreError>;

    /// Push the lease's expiry to `ttl` from now, keeping its token.
    ///
    /// Fails with [`CoreError::ClaimLost`] once another claim has taken the
    /// execution over or it is no longer active.
    async fn renew(&self, lease: &ExecutionLease, ttl: Duration)
        -> Result<ExecutionLease, CoreError>;

    /// Persist the execution under the lease and return the new version.
    ///
    /// The lease token and the stored version must both match. A terminal
    /// status frees the contact's active slot.
    async fn save(&self, execution: &FlowExecution, lease: &ExecutionLease)
        -> Result<u64, CoreError>;

    /// End the claim.
    ///
    /// `status` is the status the holder last persisted. If the record is
    /// still active and `status` is terminal, the record is forced to that
    /// status so a failed save never leaves the contact locked in a flow.
    async fn release(&self, lease: &ExecutionLease, status: ExecutionStatus)
        -> Result<(), CoreError>;

    /// Every execution of the contact, newest first
    async fn list_for_contact(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Vec<FlowExecution>, CoreError>;
}
