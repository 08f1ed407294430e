use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use super::disposition::Disposition;
use crate::config::EngineConfig;
use crate::domain::collaborators::Collaborators;
use crate::domain::events::ExecutionEventHandler;
use crate::domain::flow_definition::InteractiveFlow;
use crate::domain::flow_execution::{ExecutionStatus, FlowExecution, ServicingMode};
use crate::domain::identifiers::{ContactId, ExecutionId, FlowId, TenantId};
use crate::domain::repository::{ExecutionLease, ExecutionStore, FlowDefinitionStore};
use crate::interpreter::{apply_mutations, interpret, SideEffect, StepOutcome, UserInput};
use crate::CoreError;

/// Why a run stopped before reaching a suspend point or a terminal block
enum Stop {
    /// The flow definition cannot be executed
    Definition(String),
    /// Runaway graph or collaborator failure
    Abort(String),
}

/// Drives executions through the block interpreter, performing side effects
/// and persisting every step under a claim.
pub struct FlowExecutor {
    /// Authored flows
    flows: Arc<dyn FlowDefinitionStore>,

    /// Execution records and claims
    executions: Arc<dyn ExecutionStore>,

    /// External systems
    collaborators: Collaborators,

    /// Event handler
    event_handler: Arc<dyn ExecutionEventHandler>,

    /// Limits and retry policy
    config: EngineConfig,
}

impl Clone for FlowExecutor {
    fn clone(&self) -> Self {
        Self {
            flows: self.flows.clone(),
            executions: self.executions.clone(),
            collaborators: self.collaborators.clone(),
            event_handler: self.event_handler.clone(),
            config: self.config.clone(),
        }
    }
}

impl FlowExecutor {
    /// Create a new flow executor
    pub fn new(
        flows: Arc<dyn FlowDefinitionStore>,
        executions: Arc<dyn ExecutionStore>,
        collaborators: Collaborators,
        event_handler: Arc<dyn ExecutionEventHandler>,
        config: EngineConfig,
    ) -> Self {
        Self {
            flows,
            executions,
            collaborators,
            event_handler,
            config,
        }
    }

    /// Engine configuration in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a flow for a contact and drive it to its first suspend point or end.
    ///
    /// Fails with [`CoreError::AlreadyActive`] when the contact is already in a
    /// flow and with [`CoreError::FlowNotFound`] when the flow is not active.
    /// A definition that does not validate yields [`Disposition::Error`]
    /// without creating an execution.
    pub async fn start_flow(
        &self,
        flow_id: &FlowId,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Disposition, CoreError> {
        let span = info_span!(
            "flow_execution",
            op = "start",
            tenant_id = %tenant_id,
            contact = %contact,
            flow_id = %flow_id
        );

        async move {
            let flow = self
                .flows
                .get_active_flow(tenant_id, flow_id)
                .await?
                .ok_or_else(|| CoreError::FlowNotFound(flow_id.to_string()))?;

            if let Err(e) = flow.validate() {
                error!(error = %e, "Refusing to start invalid flow");
                return Ok(Disposition::Error {
                    execution_id: None,
                    detail: e.to_string(),
                });
            }

            let (mut execution, mut lease) = self
                .executions
                .claim(
                    tenant_id,
                    contact,
                    &flow.id,
                    &flow.start_block_id,
                    self.config.claim_ttl(),
                )
                .await?;

            info!(execution_id = %execution.id, "Flow started");
            execution.enter_block(flow.start_block_id.clone(), "start")?;
            self.drive(&flow, &mut execution, &mut lease, None).await
        }
        .instrument(span)
        .await
    }

    /// Feed an inbound reply to the contact's active execution.
    ///
    /// Fails with [`CoreError::NoActiveExecution`] when the contact is not in a
    /// flow, and with [`CoreError::Busy`] when another invocation keeps the
    /// execution claimed or advanced it while this call waited.
    pub async fn continue_flow(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        input: UserInput,
    ) -> Result<Disposition, CoreError> {
        let span = info_span!(
            "flow_execution",
            op = "continue",
            tenant_id = %tenant_id,
            contact = %contact
        );

        async move {
            let no_active = || CoreError::NoActiveExecution {
                tenant_id: tenant_id.to_string(),
                contact: contact.to_string(),
            };

            let observed = self
                .executions
                .get_active(tenant_id, contact)
                .await?
                .ok_or_else(no_active)?;

            let ttl = self.config.claim_ttl();
            let (mut execution, mut lease) = self
                .with_claim_retries(|| self.executions.claim_active(tenant_id, contact, ttl))
                .await?
                .ok_or_else(no_active)?;

            if execution.id != observed.id || execution.version != observed.version {
                // The input answered a prompt that is no longer current
                self.release(&lease, ExecutionStatus::Active).await;
                return Err(CoreError::Busy(format!(
                    "execution {} advanced while the reply was waiting",
                    execution.id
                )));
            }

            let flow = match self
                .flows
                .get_active_flow(tenant_id, &execution.flow_id)
                .await?
            {
                Some(flow) => flow,
                None => {
                    let detail = format!("flow '{}' is no longer active", execution.flow_id);
                    return self
                        .stop(&mut execution, &lease, Stop::Definition(detail))
                        .await;
                }
            };

            if let Err(e) = flow.validate() {
                return self
                    .stop(&mut execution, &lease, Stop::Definition(e.to_string()))
                    .await;
            }

            debug!(
                execution_id = %execution.id,
                block_id = %execution.current_block_id,
                "Resuming execution"
            );
            execution.resume()?;
            self.drive(&flow, &mut execution, &mut lease, Some(input)).await
        }
        .instrument(span)
        .await
    }

    /// Hand an active execution to the AI agent, outside the block flow
    pub async fn transfer_to_bot(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Disposition, CoreError> {
        self.transfer(execution_id, ServicingMode::Bot).await
    }

    /// Hand an active execution to a human operator, outside the block flow
    pub async fn transfer_to_human(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Disposition, CoreError> {
        self.transfer(execution_id, ServicingMode::Human).await
    }

    async fn transfer(
        &self,
        execution_id: &ExecutionId,
        mode: ServicingMode,
    ) -> Result<Disposition, CoreError> {
        let span = info_span!(
            "flow_execution",
            op = "transfer",
            execution_id = %execution_id,
            mode = %mode
        );

        async move {
            let ttl = self.config.claim_ttl();
            let (mut execution, lease) = self
                .with_claim_retries(|| self.executions.claim_execution(execution_id, ttl))
                .await?;

            if let Err(e) = self
                .collaborators
                .mode_switch
                .set_servicing_mode(&execution.tenant_id, &execution.contact, mode)
                .await
            {
                self.release(&lease, ExecutionStatus::Active).await;
                return Err(CoreError::ExternalDependencyError(format!(
                    "failed to switch servicing mode: {}",
                    e
                )));
            }

            execution.transfer(mode)?;
            if let Err(e) = self.persist(&mut execution, &lease).await {
                return self.persistence_failed(&execution, &lease, e).await;
            }
            self.release(&lease, execution.status).await;

            info!(status = %execution.status, "Execution transferred by operator");
            Ok(Disposition::Transferred {
                execution_id: execution.id,
                mode,
            })
        }
        .instrument(span)
        .await
    }

    /// Run the interpreter from the execution's current block until it
    /// suspends, terminates or fails.
    ///
    /// The lease is renewed before every step that talks to a collaborator,
    /// so a slow provider does not let the claim lapse mid-run.
    async fn drive(
        &self,
        flow: &InteractiveFlow,
        execution: &mut FlowExecution,
        lease: &mut ExecutionLease,
        input: Option<UserInput>,
    ) -> Result<Disposition, CoreError> {
        let mut input = input;
        let mut steps: u32 = 0;

        loop {
            let block = match flow.block(&execution.current_block_id) {
                Some(block) => block,
                None => {
                    let detail = format!(
                        "current block '{}' does not exist in flow '{}'",
                        execution.current_block_id, flow.id
                    );
                    return self.stop(execution, lease, Stop::Definition(detail)).await;
                }
            };

            let result = interpret(flow, block, &execution.variables, input.take().as_ref());

            if result.effects.iter().any(SideEffect::is_external) {
                match self.executions.renew(lease, self.config.claim_ttl()).await {
                    Ok(renewed) => *lease = renewed,
                    Err(e @ CoreError::ClaimLost(_)) => {
                        warn!(
                            execution_id = %execution.id,
                            block_id = %block.id,
                            "Claim lost before the step ran"
                        );
                        return Err(e);
                    }
                    Err(e) => return self.persistence_failed(execution, lease, e).await,
                }
            }

            if let Err(e) = self.perform(execution, &result.effects).await {
                let reason = format!("side effect failed at block '{}': {}", block.id, e);
                return self.stop(execution, lease, Stop::Abort(reason)).await;
            }
            apply_mutations(&mut execution.variables, &result.effects);

            match result.outcome {
                StepOutcome::Advance { next } => {
                    steps += 1;
                    if steps > self.config.step_budget {
                        let reason = format!(
                            "step budget of {} exceeded at block '{}'",
                            self.config.step_budget, block.id
                        );
                        return self.stop(execution, lease, Stop::Abort(reason)).await;
                    }

                    let block_type = match flow.block(&next) {
                        Some(next_block) => next_block.type_name().to_string(),
                        None => {
                            let detail = format!(
                                "block '{}' routes to unknown block '{}'",
                                block.id, next
                            );
                            return self.stop(execution, lease, Stop::Definition(detail)).await;
                        }
                    };

                    execution.enter_block(next, &block_type)?;
                    if let Err(e) = self.persist(execution, lease).await {
                        return self.persistence_failed(execution, lease, e).await;
                    }
                }
                StepOutcome::Suspend { prompt } => {
                    execution.suspend()?;
                    if let Err(e) = self.persist(execution, lease).await {
                        return self.persistence_failed(execution, lease, e).await;
                    }
                    self.release(lease, ExecutionStatus::Active).await;

                    debug!(block_id = %execution.current_block_id, "Execution suspended");
                    return Ok(Disposition::Suspended {
                        execution_id: execution.id.clone(),
                        prompt,
                    });
                }
                StepOutcome::End => {
                    execution.complete()?;
                    if let Err(e) = self.persist(execution, lease).await {
                        return self.persistence_failed(execution, lease, e).await;
                    }
                    self.release(lease, execution.status).await;

                    info!(execution_id = %execution.id, "Execution completed");
                    return Ok(Disposition::Completed {
                        execution_id: execution.id.clone(),
                    });
                }
                StepOutcome::Handoff { mode } => {
                    execution.transfer(mode)?;
                    if let Err(e) = self.persist(execution, lease).await {
                        return self.persistence_failed(execution, lease, e).await;
                    }
                    self.release(lease, execution.status).await;

                    info!(execution_id = %execution.id, mode = %mode, "Execution handed off");
                    return Ok(Disposition::Transferred {
                        execution_id: execution.id.clone(),
                        mode,
                    });
                }
                StepOutcome::Error { detail } => {
                    return self.stop(execution, lease, Stop::Definition(detail)).await;
                }
            }
        }
    }

    /// Perform the external side effects of a step, in order
    async fn perform(
        &self,
        execution: &FlowExecution,
        effects: &[SideEffect],
    ) -> Result<(), CoreError> {
        let tenant_id = &execution.tenant_id;
        let contact = &execution.contact;

        for effect in effects {
            match effect {
                SideEffect::SendText { text } => {
                    let message_id = self
                        .collaborators
                        .delivery
                        .send_text(tenant_id, contact, text)
                        .await?;
                    debug!(message_id = %message_id, "Sent text");
                }
                SideEffect::SendList { prompt } => {
                    let message_id = self
                        .collaborators
                        .delivery
                        .send_list(tenant_id, contact, prompt)
                        .await?;
                    debug!(message_id = %message_id, "Sent list");
                }
                SideEffect::SendButtons { prompt } => {
                    let message_id = self
                        .collaborators
                        .delivery
                        .send_buttons(tenant_id, contact, prompt)
                        .await?;
                    debug!(message_id = %message_id, "Sent buttons");
                }
                SideEffect::AddTag { tag } => {
                    self.collaborators.tags.add_tag(tenant_id, contact, tag).await?;
                }
                SideEffect::RemoveTag { tag } => {
                    self.collaborators
                        .tags
                        .remove_tag(tenant_id, contact, tag)
                        .await?;
                }
                SideEffect::SetServicingMode { mode } => {
                    self.collaborators
                        .mode_switch
                        .set_servicing_mode(tenant_id, contact, *mode)
                        .await?;
                }
                SideEffect::SetVariable { .. } | SideEffect::ClearVariable { .. } => {}
            }
        }
        Ok(())
    }

    /// Abort the execution and persist the terminal status
    async fn stop(
        &self,
        execution: &mut FlowExecution,
        lease: &ExecutionLease,
        stop: Stop,
    ) -> Result<Disposition, CoreError> {
        let reason = match &stop {
            Stop::Definition(detail) => {
                error!(
                    flow_id = %execution.flow_id,
                    block_id = %execution.current_block_id,
                    detail = %detail,
                    "Flow definition error"
                );
                detail.clone()
            }
            Stop::Abort(reason) => {
                warn!(
                    execution_id = %execution.id,
                    block_id = %execution.current_block_id,
                    reason = %reason,
                    "Aborting execution"
                );
                reason.clone()
            }
        };

        execution.abort(reason.clone())?;
        if let Err(e) = self.persist(execution, lease).await {
            return self.persistence_failed(execution, lease, e).await;
        }
        self.release(lease, execution.status).await;

        Ok(match stop {
            Stop::Definition(detail) => Disposition::Error {
                execution_id: Some(execution.id.clone()),
                detail,
            },
            Stop::Abort(reason) => Disposition::Aborted {
                execution_id: execution.id.clone(),
                reason,
            },
        })
    }

    /// Save under the lease, retrying transient store failures. Side effects
    /// of the step were already performed, so only the write is repeated.
    async fn persist(
        &self,
        execution: &mut FlowExecution,
        lease: &ExecutionLease,
    ) -> Result<(), CoreError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.executions.save(execution, lease).await {
                Ok(version) => {
                    execution.version = version;
                    self.dispatch_events(execution).await;
                    return Ok(());
                }
                Err(CoreError::StateStoreError(msg))
                    if attempt < self.config.persist_retry_attempts =>
                {
                    warn!(attempt, error = %msg, "Persisting execution failed, retrying");
                    tokio::time::sleep(self.config.claim_retry_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Turn a failed save into a disposition. A lost claim means another
    /// invocation owns the execution now, so it is reported as an error.
    async fn persistence_failed(
        &self,
        execution: &FlowExecution,
        lease: &ExecutionLease,
        err: CoreError,
    ) -> Result<Disposition, CoreError> {
        if matches!(err, CoreError::ClaimLost(_)) {
            warn!(execution_id = %execution.id, "Claim lost before the step was saved");
            return Err(err);
        }

        error!(execution_id = %execution.id, error = %err, "Could not persist execution");
        let status = if execution.status.is_terminal() {
            execution.status
        } else {
            ExecutionStatus::Aborted
        };
        self.release(lease, status).await;

        Ok(Disposition::Aborted {
            execution_id: execution.id.clone(),
            reason: format!("state persistence failed: {}", err),
        })
    }

    async fn release(&self, lease: &ExecutionLease, status: ExecutionStatus) {
        if let Err(e) = self.executions.release(lease, status).await {
            // The lease lapses on its own after the TTL
            warn!(execution_id = %lease.execution_id, error = %e, "Failed to release claim");
        }
    }

    async fn dispatch_events(&self, execution: &mut FlowExecution) {
        for event in execution.take_events() {
            let event_type = event.event_type();
            if let Err(e) = self.event_handler.handle_event(event).await {
                warn!(event_type, error = %e, "Event handler failed");
            }
        }
    }

    /// Retry a claim while it reports [`CoreError::Busy`]
    async fn with_claim_retries<T, F, Fut>(&self, mut claim: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match claim().await {
                Err(CoreError::Busy(msg)) if attempt < self.config.claim_retry_attempts => {
                    attempt += 1;
                    debug!(attempt, reason = %msg, "Execution busy, waiting");
                    tokio::time::sleep(self.config.claim_retry_backoff()).await;
                }
                other => return other,
            }
        }
    }
}
