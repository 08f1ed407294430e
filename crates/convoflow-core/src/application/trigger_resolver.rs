use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::flow_definition::{InteractiveFlow, TriggerType};
use crate::domain::identifiers::{ContactId, ExecutionId, FlowId, TenantId};
use crate::domain::repository::{ExecutionStore, FlowDefinitionStore};
use crate::CoreError;

/// What to do with an inbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    /// Feed the event to the contact's active execution
    Resume {
        /// Active execution
        execution_id: ExecutionId,
    },
    /// Start this flow
    Start {
        /// Flow whose trigger matched
        flow_id: FlowId,
    },
    /// No flow handles the event; the caller routes it elsewhere
    Decline,
}

/// Decides, per inbound event, between resuming, starting and declining.
///
/// Priority: an active execution always wins, then `always` flows, then the
/// first keyword flow with a matching keyword. Candidate flows are tried
/// oldest first, ties broken by flow id. Flows that fail validation are
/// skipped so a broken definition keeps declining instead of erroring.
pub struct TriggerResolver {
    flows: Arc<dyn FlowDefinitionStore>,
    executions: Arc<dyn ExecutionStore>,
}

impl TriggerResolver {
    /// Create a new trigger resolver
    pub fn new(flows: Arc<dyn FlowDefinitionStore>, executions: Arc<dyn ExecutionStore>) -> Self {
        Self { flows, executions }
    }

    /// Resolve an inbound event.
    ///
    /// An interactive reply (a tapped button or list row) never starts a
    /// flow: without an active execution it belongs to a stale prompt.
    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        inbound_text: &str,
        is_interactive_reply: bool,
    ) -> Result<TriggerDecision, CoreError> {
        if let Some(execution) = self.executions.get_active(tenant_id, contact).await? {
            debug!(execution_id = %execution.id, "Resuming active execution");
            return Ok(TriggerDecision::Resume {
                execution_id: execution.id,
            });
        }

        if is_interactive_reply {
            debug!(tenant_id = %tenant_id, contact = %contact, "Stale interactive reply declined");
            return Ok(TriggerDecision::Decline);
        }

        let always = self.candidates(tenant_id, TriggerType::Always).await?;
        if let Some(flow) = always.into_iter().next() {
            return Ok(TriggerDecision::Start { flow_id: flow.id });
        }

        let keyword = self.candidates(tenant_id, TriggerType::Keyword).await?;
        if let Some(flow) = keyword
            .into_iter()
            .find(|flow| flow.matches_keyword(inbound_text))
        {
            return Ok(TriggerDecision::Start { flow_id: flow.id });
        }

        Ok(TriggerDecision::Decline)
    }

    /// Valid active flows of a trigger type in tie-break order
    async fn candidates(
        &self,
        tenant_id: &TenantId,
        trigger_type: TriggerType,
    ) -> Result<Vec<InteractiveFlow>, CoreError> {
        let mut flows = self
            .flows
            .list_active_flows(tenant_id, trigger_type)
            .await?;
        flows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        flows.retain(|flow| match flow.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(flow_id = %flow.id, error = %e, "Skipping invalid flow");
                false
            }
        });
        Ok(flows)
    }
}
