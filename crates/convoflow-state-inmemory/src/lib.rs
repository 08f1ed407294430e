//! In-memory state store implementation for convoflow
//!
//! Provides the flow definition store and the execution store defined in
//! `convoflow-core`, backed by process memory. Useful for development,
//! tests, the simulator CLI and single-process deployments where
//! executions do not need to survive a restart.

use std::sync::Arc;

use convoflow_core::domain::repository::{ExecutionStore, FlowDefinitionStore};

pub mod repositories;
pub use repositories::{InMemoryExecutionStore, InMemoryFlowDefinitionStore};

/// Provider wiring both in-memory stores
#[derive(Clone, Default)]
pub struct InMemoryStateStoreProvider {
    flows: Arc<InMemoryFlowDefinitionStore>,
    executions: Arc<InMemoryExecutionStore>,
}

impl InMemoryStateStoreProvider {
    /// Create empty stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete flow store, for seeding definitions
    pub fn flow_store(&self) -> Arc<InMemoryFlowDefinitionStore> {
        self.flows.clone()
    }

    /// Concrete execution store, for inspection
    pub fn execution_store(&self) -> Arc<InMemoryExecutionStore> {
        self.executions.clone()
    }

    /// Stores as the trait objects the engine takes
    pub fn create_repositories(&self) -> (Arc<dyn FlowDefinitionStore>, Arc<dyn ExecutionStore>) {
        (self.flows.clone(), self.executions.clone())
    }
}

#[cfg(test)]
mod tests;
