use serde::{Deserialize, Serialize};

use crate::domain::collaborators::Prompt;
use crate::domain::flow_execution::{ExecutionStatus, ServicingMode};
use crate::domain::identifiers::ExecutionId;

/// How an engine invocation ended, returned to the caller instead of an error
/// for everything that happens inside a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// Waiting for the contact to answer a prompt
    Suspended {
        /// Execution
        execution_id: ExecutionId,
        /// Prompt that was presented
        prompt: Prompt,
    },
    /// The flow reached an end block
    Completed {
        /// Execution
        execution_id: ExecutionId,
    },
    /// The contact was handed to the AI agent or a human
    Transferred {
        /// Execution
        execution_id: ExecutionId,
        /// Receiving side
        mode: ServicingMode,
    },
    /// The run was stopped (runaway graph, collaborator or store failure)
    Aborted {
        /// Execution
        execution_id: ExecutionId,
        /// Why
        reason: String,
    },
    /// The flow definition cannot be executed
    Error {
        /// Execution, when one had been created
        execution_id: Option<ExecutionId>,
        /// What is wrong
        detail: String,
    },
}

impl Disposition {
    /// Execution the disposition refers to
    pub fn execution_id(&self) -> Option<&ExecutionId> {
        match self {
            Disposition::Suspended { execution_id, .. }
            | Disposition::Completed { execution_id }
            | Disposition::Transferred { execution_id, .. }
            | Disposition::Aborted { execution_id, .. } => Some(execution_id),
            Disposition::Error { execution_id, .. } => execution_id.as_ref(),
        }
    }

    /// Execution status implied by the disposition
    pub fn status(&self) -> Option<ExecutionStatus> {
        match self {
            Disposition::Suspended { .. } => Some(ExecutionStatus::Active),
            Disposition::Completed { .. } => Some(ExecutionStatus::Completed),
            Disposition::Transferred { mode, .. } => Some(mode.transferred_status()),
            Disposition::Aborted { .. } => Some(ExecutionStatus::Aborted),
            Disposition::Error { execution_id, .. } => {
                execution_id.as_ref().map(|_| ExecutionStatus::Aborted)
            }
        }
    }

    /// Whether the caller should fall back to its general AI or human path
    pub fn needs_fallback(&self) -> bool {
        matches!(self, Disposition::Aborted { .. } | Disposition::Error { .. })
    }
}
