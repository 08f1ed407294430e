use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use convoflow_core::{
    domain::identifiers::ContactKey,
    domain::repository::{ExecutionLease, ExecutionStore, FlowDefinitionStore},
    BlockId, ContactId, CoreError, ExecutionId, ExecutionStatus, FlowExecution, FlowId,
    InteractiveFlow, TenantId, TriggerType,
};

/// In-memory implementation of the FlowDefinitionStore
#[derive(Default)]
pub struct InMemoryFlowDefinitionStore {
    definitions: RwLock<HashMap<(TenantId, FlowId), InteractiveFlow>>,
}

impl InMemoryFlowDefinitionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a flow
    pub async fn save(&self, flow: InteractiveFlow) {
        let mut definitions = self.definitions.write().await;
        definitions.insert((flow.tenant_id.clone(), flow.id.clone()), flow);
    }

    /// Remove a flow
    pub async fn delete(&self, tenant_id: &TenantId, flow_id: &FlowId) -> Option<InteractiveFlow> {
        let mut definitions = self.definitions.write().await;
        definitions.remove(&(tenant_id.clone(), flow_id.clone()))
    }

    /// Every stored flow of a tenant, active or not
    pub async fn find_all(&self, tenant_id: &TenantId) -> Vec<InteractiveFlow> {
        let definitions = self.definitions.read().await;
        definitions
            .values()
            .filter(|flow| &flow.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FlowDefinitionStore for InMemoryFlowDefinitionStore {
    async fn get_active_flow(
        &self,
        tenant_id: &TenantId,
        flow_id: &FlowId,
    ) -> Result<Option<InteractiveFlow>, CoreError> {
        let definitions = self.definitions.read().await;
        Ok(definitions
            .get(&(tenant_id.clone(), flow_id.clone()))
            .filter(|flow| flow.is_active)
            .cloned())
    }

    async fn list_active_flows(
        &self,
        tenant_id: &TenantId,
        trigger_type: TriggerType,
    ) -> Result<Vec<InteractiveFlow>, CoreError> {
        let definitions = self.definitions.read().await;
        let mut flows: Vec<_> = definitions
            .values()
            .filter(|flow| {
                &flow.tenant_id == tenant_id && flow.is_active && flow.trigger_type == trigger_type
            })
            .cloned()
            .collect();
        flows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(flows)
    }
}

#[derive(Default)]
struct ExecutionTable {
    records: HashMap<ExecutionId, FlowExecution>,
    // One entry per contact with an active execution
    active: HashMap<ContactKey, ExecutionId>,
    leases: HashMap<ExecutionId, ExecutionLease>,
}

impl ExecutionTable {
    fn take_lease(&mut self, id: &ExecutionId, ttl: Duration) -> Result<ExecutionLease, CoreError> {
        if let Some(held) = self.leases.get(id) {
            if !held.is_expired_at(Utc::now()) {
                return Err(CoreError::Busy(format!("execution {} is claimed", id)));
            }
            debug!(execution_id = %id, "Taking over expired lease");
        }
        let lease = ExecutionLease::issue(id.clone(), ttl);
        self.leases.insert(id.clone(), lease.clone());
        Ok(lease)
    }

    fn holds(&self, lease: &ExecutionLease) -> bool {
        self.leases
            .get(&lease.execution_id)
            .map_or(false, |held| held.token == lease.token)
    }

    fn set_status(&mut self, id: &ExecutionId, status: ExecutionStatus) {
        if let Some(record) = self.records.get_mut(id) {
            record.status = status;
            if status.is_terminal() {
                let key = ContactKey::new(&record.tenant_id, &record.contact);
                if self.active.get(&key) == Some(id) {
                    self.active.remove(&key);
                }
            }
        }
    }
}

/// In-memory implementation of the ExecutionStore.
///
/// A single mutex guards records, the per-contact active index and the
/// leases, so every claim and save is atomic.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    table: Mutex<ExecutionTable>,
}

impl InMemoryExecutionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored executions, any status
    pub async fn len(&self) -> usize {
        self.table.lock().await.records.len()
    }

    /// Whether the store holds no executions
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn get_active(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Option<FlowExecution>, CoreError> {
        let table = self.table.lock().await;
        Ok(table
            .active
            .get(&ContactKey::new(tenant_id, contact))
            .and_then(|id| table.records.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<FlowExecution>, CoreError> {
        let table = self.table.lock().await;
        Ok(table.records.get(id).cloned())
    }

    async fn claim(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        flow_id: &FlowId,
        start_block_id: &BlockId,
        ttl: Duration,
    ) -> Result<(FlowExecution, ExecutionLease), CoreError> {
        let key = ContactKey::new(tenant_id, contact);
        let mut table = self.table.lock().await;
        if table.active.contains_key(&key) {
            return Err(CoreError::AlreadyActive {
                tenant_id: tenant_id.to_string(),
                contact: contact.to_string(),
            });
        }

        let mut execution = FlowExecution::new(
            flow_id.clone(),
            tenant_id.clone(),
            contact.clone(),
            start_block_id.clone(),
        );
        execution.version = 1;

        let lease = table.take_lease(&execution.id, ttl)?;
        table.active.insert(key, execution.id.clone());
        table.records.insert(execution.id.clone(), execution.clone());

        debug!(execution_id = %execution.id, flow_id = %flow_id, "Execution created");
        Ok((execution, lease))
    }

    async fn claim_active(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        ttl: Duration,
    ) -> Result<Option<(FlowExecution, ExecutionLease)>, CoreError> {
        let mut table = self.table.lock().await;
        let Some(id) = table.active.get(&ContactKey::new(tenant_id, contact)).cloned() else {
            return Ok(None);
        };
        let lease = table.take_lease(&id, ttl)?;
        let execution = table
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::ExecutionNotFound(id.to_string()))?;
        Ok(Some((execution, lease)))
    }

    async fn claim_execution(
        &self,
        id: &ExecutionId,
        ttl: Duration,
    ) -> Result<(FlowExecution, ExecutionLease), CoreError> {
        let mut table = self.table.lock().await;
        let execution = table
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::ExecutionNotFound(id.to_string()))?;
        if !execution.is_active() {
            return Err(CoreError::ExecutionNotActive(id.to_string()));
        }
        let lease = table.take_lease(id, ttl)?;
        Ok((execution, lease))
    }

    async fn renew(&self, lease: &ExecutionLease, ttl: Duration) -> Result<ExecutionLease, CoreError> {
        let mut table = self.table.lock().await;
        let id = &lease.execution_id;
        let active = table.records.get(id).map_or(false, FlowExecution::is_active);
        if !active || !table.holds(lease) {
            return Err(CoreError::ClaimLost(format!("lease on execution {} is no longer held", id)));
        }

        let renewed = lease.extended(ttl);
        table.leases.insert(id.clone(), renewed.clone());
        Ok(renewed)
    }

    async fn save(&self, execution: &FlowExecution, lease: &ExecutionLease) -> Result<u64, CoreError> {
        let mut table = self.table.lock().await;
        let id = &execution.id;

        let valid = table.leases.get(id).map_or(false, |held| held.token == lease.token);
        if !valid {
            return Err(CoreError::ClaimLost(format!("lease on execution {} is no longer held", id)));
        }

        let stored_version = table
            .records
            .get(id)
            .map(|record| record.version)
            .ok_or_else(|| CoreError::ExecutionNotFound(id.to_string()))?;
        if stored_version != execution.version {
            return Err(CoreError::ClaimLost(format!(
                "execution {} is at version {}, write was based on {}",
                id, stored_version, execution.version
            )));
        }

        let mut record = execution.clone();
        record.version = stored_version + 1;
        let version = record.version;
        let status = record.status;
        table.records.insert(id.clone(), record);
        table.set_status(id, status);
        Ok(version)
    }

    async fn release(&self, lease: &ExecutionLease, status: ExecutionStatus) -> Result<(), CoreError> {
        let mut table = self.table.lock().await;
        if !table.holds(lease) {
            debug!(execution_id = %lease.execution_id, "Release of a lease no longer held");
            return Ok(());
        }
        table.leases.remove(&lease.execution_id);

        let still_active = table
            .records
            .get(&lease.execution_id)
            .map_or(false, FlowExecution::is_active);
        if still_active && status.is_terminal() {
            table.set_status(&lease.execution_id, status);
        }
        Ok(())
    }

    async fn list_for_contact(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Vec<FlowExecution>, CoreError> {
        let table = self.table.lock().await;
        let mut found: Vec<_> = table
            .records
            .values()
            .filter(|e| &e.tenant_id == tenant_id && &e.contact == contact)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }
}
