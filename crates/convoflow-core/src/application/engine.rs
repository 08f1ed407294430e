use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::disposition::Disposition;
use super::flow_executor::FlowExecutor;
use super::trigger_resolver::{TriggerDecision, TriggerResolver};
use crate::config::EngineConfig;
use crate::domain::collaborators::Collaborators;
use crate::domain::events::ExecutionEventHandler;
use crate::domain::identifiers::{ContactId, ExecutionId, FlowId, TenantId};
use crate::domain::repository::{ExecutionStore, FlowDefinitionStore};
use crate::interpreter::UserInput;
use crate::CoreError;

/// Result of handing an inbound event to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InboundOutcome {
    /// A flow started or resumed and ran to the given disposition
    Handled {
        /// How the run ended
        disposition: Disposition,
    },
    /// No flow owns the event
    Declined,
    /// The event would have started `flow_id`, but a concurrent invocation
    /// had just started a flow for the contact. Nothing was sent.
    Duplicate {
        /// Flow the event resolved to
        flow_id: FlowId,
    },
}

/// Entry point for webhook handlers: resolves the trigger, then starts or
/// continues the matching execution.
#[derive(Clone)]
pub struct FlowEngine {
    resolver: Arc<TriggerResolver>,
    executor: FlowExecutor,
}

impl FlowEngine {
    /// Wire an engine over the given stores and collaborators
    pub fn new(
        flows: Arc<dyn FlowDefinitionStore>,
        executions: Arc<dyn ExecutionStore>,
        collaborators: Collaborators,
        event_handler: Arc<dyn ExecutionEventHandler>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let resolver = Arc::new(TriggerResolver::new(flows.clone(), executions.clone()));
        let executor = FlowExecutor::new(flows, executions, collaborators, event_handler, config);
        Ok(Self { resolver, executor })
    }

    /// Trigger resolver in use
    pub fn resolver(&self) -> &TriggerResolver {
        &self.resolver
    }

    /// Flow executor in use
    pub fn executor(&self) -> &FlowExecutor {
        &self.executor
    }

    /// Handle one inbound message for a contact.
    ///
    /// A reply carrying a `choice_id` counts as an interactive reply. An event
    /// that loses a start race to a concurrent invocation is reported as
    /// [`InboundOutcome::Duplicate`] instead of being fed to the new flow's
    /// first prompt, which would only present that prompt a second time.
    pub async fn handle_inbound(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        input: UserInput,
    ) -> Result<InboundOutcome, CoreError> {
        let decision = self
            .resolver
            .resolve(tenant_id, contact, &input.text, input.choice_id.is_some())
            .await?;

        match decision {
            TriggerDecision::Resume { execution_id } => {
                debug!(execution_id = %execution_id, "Continuing execution");
                self.continue_or_decline(tenant_id, contact, input).await
            }
            TriggerDecision::Start { flow_id } => {
                match self.executor.start_flow(&flow_id, tenant_id, contact).await {
                    Ok(disposition) => Ok(InboundOutcome::Handled { disposition }),
                    Err(CoreError::AlreadyActive { .. }) => {
                        info!(flow_id = %flow_id, "Contact entered a flow concurrently, dropping event");
                        Ok(InboundOutcome::Duplicate { flow_id })
                    }
                    Err(e) => Err(e),
                }
            }
            TriggerDecision::Decline => Ok(InboundOutcome::Declined),
        }
    }

    /// Hand an execution to the AI agent
    pub async fn transfer_to_bot(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Disposition, CoreError> {
        self.executor.transfer_to_bot(execution_id).await
    }

    /// Hand an execution to a human operator
    pub async fn transfer_to_human(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Disposition, CoreError> {
        self.executor.transfer_to_human(execution_id).await
    }

    async fn continue_or_decline(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        input: UserInput,
    ) -> Result<InboundOutcome, CoreError> {
        match self.executor.continue_flow(tenant_id, contact, input).await {
            Ok(disposition) => Ok(InboundOutcome::Handled { disposition }),
            // Finished between resolve and claim
            Err(CoreError::NoActiveExecution { .. }) => Ok(InboundOutcome::Declined),
            Err(e) => Err(e),
        }
    }
}
