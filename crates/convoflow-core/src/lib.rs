//!
//! Convoflow Core - interactive flow execution engine
//!
//! Drives authored conversation graphs (menus, conditions, variable capture,
//! hand-off to an AI agent or a human) for messaging contacts. Every call is
//! a short-lived unit of work: the execution is claimed, advanced through the
//! block interpreter, persisted, and released.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

/// Domain layer - flow definitions, executions, events and store traits
pub mod domain;

/// Pure block semantics shared by the executor and the simulator
pub mod interpreter;

/// Application services - executor, trigger resolver, simulator, engine
pub mod application;

pub use config::EngineConfig;
pub use error::CoreError;

pub use application::disposition::Disposition;
pub use application::engine::{FlowEngine, InboundOutcome};
pub use application::flow_executor::FlowExecutor;
pub use application::simulator::{execute_block, PreviewStep, SimulationStatus, Simulator};
pub use application::trigger_resolver::{TriggerDecision, TriggerResolver};

pub use domain::block::{BlockKind, FlowBlock};
pub use domain::collaborators::{
    Collaborators, ContactTagService, MessageDelivery, Prompt, ServicingModeSwitch,
};
pub use domain::events::{DomainEvent, ExecutionEventHandler, NoopEventHandler};
pub use domain::flow_definition::{FlowEdge, InteractiveFlow, TriggerType};
pub use domain::flow_execution::{ExecutionStatus, FlowExecution, ServicingMode};
pub use domain::identifiers::{BlockId, ContactId, ExecutionId, FlowId, TenantId};
pub use domain::repository::{ExecutionLease, ExecutionStore, FlowDefinitionStore};
pub use domain::variables::{VariableValue, Variables};
pub use interpreter::{interpret, SideEffect, StepOutcome, StepResult, UserInput};
