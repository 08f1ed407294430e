use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::events::{
    BlockEntered, DomainEvent, ExecutionFinished, ExecutionResumed, ExecutionStarted,
    ExecutionSuspended,
};
use super::identifiers::{BlockId, ContactId, ExecutionId, FlowId, TenantId};
use super::variables::Variables;
use crate::CoreError;

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Running or suspended on an interactive prompt
    Active,
    /// Reached an `end` block
    Completed,
    /// Handed to the AI agent
    TransferredBot,
    /// Handed to a human operator
    TransferredHuman,
    /// Stopped by a definition error, a runaway graph or a collaborator failure
    Aborted,
}

impl ExecutionStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Active => "active",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::TransferredBot => "transferred_bot",
            ExecutionStatus::TransferredHuman => "transferred_human",
            ExecutionStatus::Aborted => "aborted",
        }
    }

    /// Whether the status ends the execution
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Active)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ExecutionStatus::Active),
            "completed" => Ok(ExecutionStatus::Completed),
            "transferred_bot" => Ok(ExecutionStatus::TransferredBot),
            "transferred_human" => Ok(ExecutionStatus::TransferredHuman),
            "aborted" => Ok(ExecutionStatus::Aborted),
            other => Err(CoreError::SerializationError(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

/// Who services the contact once a flow hands off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServicingMode {
    /// AI agent
    Bot,
    /// Human operator
    Human,
}

impl ServicingMode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            ServicingMode::Bot => "bot",
            ServicingMode::Human => "human",
        }
    }

    /// Terminal execution status of a hand-off to this mode
    pub fn transferred_status(&self) -> ExecutionStatus {
        match self {
            ServicingMode::Bot => ExecutionStatus::TransferredBot,
            ServicingMode::Human => ExecutionStatus::TransferredHuman,
        }
    }
}

impl fmt::Display for ServicingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate: one contact's progress through one flow
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowExecution {
    /// Unique identifier
    pub id: ExecutionId,

    /// Flow definition being executed
    pub flow_id: FlowId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Contact being served
    pub contact: ContactId,

    /// Block the execution is on (suspended prompt, or last block entered)
    pub current_block_id: BlockId,

    /// Current status
    pub status: ExecutionStatus,

    /// Captured variables
    pub variables: Variables,

    /// Visited blocks in order; only grows
    pub history: Vec<BlockId>,

    /// Store version, bumped on every save
    pub version: u64,

    /// Abort reason
    pub error: Option<String>,

    /// Creation timestamp
    pub started_at: DateTime<Utc>,

    /// Last persisted step
    pub last_step_at: DateTime<Utc>,

    /// When a terminal status was reached
    pub ended_at: Option<DateTime<Utc>>,

    /// Domain events
    #[serde(skip)]
    pub events: Vec<Box<dyn DomainEvent>>,
}

// Domain events are not cloned
impl Clone for FlowExecution {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            flow_id: self.flow_id.clone(),
            tenant_id: self.tenant_id.clone(),
            contact: self.contact.clone(),
            current_block_id: self.current_block_id.clone(),
            status: self.status,
            variables: self.variables.clone(),
            history: self.history.clone(),
            version: self.version,
            error: self.error.clone(),
            started_at: self.started_at,
            last_step_at: self.last_step_at,
            ended_at: self.ended_at,
            events: Vec::new(),
        }
    }
}

impl FlowExecution {
    /// Create an active execution positioned on the flow's start block
    pub fn new(
        flow_id: FlowId,
        tenant_id: TenantId,
        contact: ContactId,
        start_block_id: BlockId,
    ) -> Self {
        let id = ExecutionId::generate();
        let now = Utc::now();

        let mut execution = Self {
            id: id.clone(),
            flow_id: flow_id.clone(),
            tenant_id: tenant_id.clone(),
            contact: contact.clone(),
            current_block_id: start_block_id,
            status: ExecutionStatus::Active,
            variables: Variables::new(),
            history: Vec::with_capacity(8),
            version: 0,
            error: None,
            started_at: now,
            last_step_at: now,
            ended_at: None,
            events: Vec::with_capacity(8),
        };

        execution.record_event(Box::new(ExecutionStarted {
            execution_id: id,
            flow_id,
            tenant_id,
            contact,
            timestamp: now,
        }));

        execution
    }

    /// Whether the execution still owns the contact
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Active
    }

    fn ensure_active(&self, action: &str) -> Result<(), CoreError> {
        if !self.is_active() {
            return Err(CoreError::ExecutionNotActive(format!(
                "cannot {} execution {} in status {}",
                action, self.id, self.status
            )));
        }
        Ok(())
    }

    /// Move onto a block and append it to the history
    pub fn enter_block(&mut self, block_id: BlockId, block_type: &str) -> Result<(), CoreError> {
        self.ensure_active("advance")?;

        self.current_block_id = block_id.clone();
        self.history.push(block_id.clone());
        self.touch();

        self.record_event(Box::new(BlockEntered {
            execution_id: self.id.clone(),
            block_id,
            block_type: block_type.to_string(),
            timestamp: Utc::now(),
        }));
        Ok(())
    }

    /// Stay on the current block waiting for input
    pub fn suspend(&mut self) -> Result<(), CoreError> {
        self.ensure_active("suspend")?;
        self.touch();

        self.record_event(Box::new(ExecutionSuspended {
            execution_id: self.id.clone(),
            block_id: self.current_block_id.clone(),
            timestamp: Utc::now(),
        }));
        Ok(())
    }

    /// Accept input for the suspended block
    pub fn resume(&mut self) -> Result<(), CoreError> {
        self.ensure_active("resume")?;
        self.touch();

        self.record_event(Box::new(ExecutionResumed {
            execution_id: self.id.clone(),
            block_id: self.current_block_id.clone(),
            timestamp: Utc::now(),
        }));
        Ok(())
    }

    /// Reach a terminal status
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> Result<(), CoreError> {
        self.ensure_active("finish")?;
        if !status.is_terminal() {
            return Err(CoreError::ValidationError(format!(
                "{} is not a terminal status",
                status
            )));
        }

        let now = Utc::now();
        self.status = status;
        self.error = error.clone();
        self.ended_at = Some(now);
        self.last_step_at = now;

        self.record_event(Box::new(ExecutionFinished {
            execution_id: self.id.clone(),
            flow_id: self.flow_id.clone(),
            status,
            error,
            timestamp: now,
        }));
        Ok(())
    }

    /// Reached an `end` block
    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.finish(ExecutionStatus::Completed, None)
    }

    /// Handed off to the AI agent or a human
    pub fn transfer(&mut self, mode: ServicingMode) -> Result<(), CoreError> {
        self.finish(mode.transferred_status(), None)
    }

    /// Stopped with a reason
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        self.finish(ExecutionStatus::Aborted, Some(reason.into()))
    }

    #[inline]
    fn touch(&mut self) {
        self.last_step_at = Utc::now();
    }

    /// Record a domain event
    pub fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Get and clear all domain events
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }
}
