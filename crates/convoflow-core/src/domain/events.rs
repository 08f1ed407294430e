use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt::Debug;

use super::flow_execution::ExecutionStatus;
use super::identifiers::{BlockId, ContactId, ExecutionId, FlowId, TenantId};
use crate::CoreError;

/// Domain event trait for everything an execution records
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the execution this event belongs to
    fn execution_id(&self) -> &ExecutionId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;

    /// Access to the concrete event for handlers that need its payload
    fn as_any(&self) -> &dyn Any;
}

/// Receives the events drained from an execution after each persisted step
#[async_trait]
pub trait ExecutionEventHandler: Send + Sync {
    /// Handle one event
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError>;
}

/// Handler that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventHandler;

#[async_trait]
impl ExecutionEventHandler for NoopEventHandler {
    async fn handle_event(&self, _event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        Ok(())
    }
}

macro_rules! impl_domain_event {
    ($ty:ty, $name:literal) => {
        impl DomainEvent for $ty {
            fn event_type(&self) -> &'static str {
                $name
            }

            fn execution_id(&self) -> &ExecutionId {
                &self.execution_id
            }

            fn timestamp(&self) -> DateTime<Utc> {
                self.timestamp
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

/// Event: execution created for a contact
#[derive(Debug, Clone)]
pub struct ExecutionStarted {
    /// Execution id
    pub execution_id: ExecutionId,
    /// Flow being executed
    pub flow_id: FlowId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Contact being served
    pub contact: ContactId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl_domain_event!(ExecutionStarted, "execution.started");

/// Event: the execution moved onto a block
#[derive(Debug, Clone)]
pub struct BlockEntered {
    /// Execution id
    pub execution_id: ExecutionId,
    /// Block entered
    pub block_id: BlockId,
    /// Block type name
    pub block_type: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl_domain_event!(BlockEntered, "execution.block_entered");

/// Event: an interactive prompt is waiting for the contact
#[derive(Debug, Clone)]
pub struct ExecutionSuspended {
    /// Execution id
    pub execution_id: ExecutionId,
    /// Block awaiting input
    pub block_id: BlockId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl_domain_event!(ExecutionSuspended, "execution.suspended");

/// Event: inbound input resumed a suspended execution
#[derive(Debug, Clone)]
pub struct ExecutionResumed {
    /// Execution id
    pub execution_id: ExecutionId,
    /// Block that received the input
    pub block_id: BlockId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl_domain_event!(ExecutionResumed, "execution.resumed");

/// Event: the execution reached a terminal status
#[derive(Debug, Clone)]
pub struct ExecutionFinished {
    /// Execution id
    pub execution_id: ExecutionId,
    /// Flow that was executed
    pub flow_id: FlowId,
    /// Terminal status
    pub status: ExecutionStatus,
    /// Abort reason, if any
    pub error: Option<String>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl_domain_event!(ExecutionFinished, "execution.finished");
