//! Execution metrics.
//!
//! Counters go through the `metrics` facade, so whatever recorder the host
//! installs (Prometheus, statsd, ...) receives them. The same counts are kept
//! in-process in [`ExecutionTallies`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use convoflow_core::domain::events::{
    BlockEntered, ExecutionFinished, ExecutionResumed, ExecutionStarted, ExecutionSuspended,
};
use convoflow_core::{CoreError, DomainEvent, ExecutionEventHandler, ExecutionStatus};

/// Counter names
pub mod names {
    /// Executions created
    pub const EXECUTIONS_STARTED: &str = "convoflow_executions_started_total";
    /// Prompts presented and awaiting input
    pub const EXECUTIONS_SUSPENDED: &str = "convoflow_executions_suspended_total";
    /// Suspended executions fed an input
    pub const EXECUTIONS_RESUMED: &str = "convoflow_executions_resumed_total";
    /// Executions reaching a terminal status, labelled by `status`
    pub const EXECUTIONS_FINISHED: &str = "convoflow_executions_finished_total";
    /// Blocks entered, labelled by `block_type`
    pub const BLOCKS_ENTERED: &str = "convoflow_blocks_entered_total";
}

/// In-process counts of handled events
#[derive(Debug, Default)]
pub struct ExecutionTallies {
    started: AtomicU64,
    suspended: AtomicU64,
    resumed: AtomicU64,
    blocks_entered: AtomicU64,
    finished: DashMap<ExecutionStatus, u64>,
}

impl ExecutionTallies {
    /// Executions started
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Suspensions
    pub fn suspended(&self) -> u64 {
        self.suspended.load(Ordering::Relaxed)
    }

    /// Resumptions
    pub fn resumed(&self) -> u64 {
        self.resumed.load(Ordering::Relaxed)
    }

    /// Blocks entered, any type
    pub fn blocks_entered(&self) -> u64 {
        self.blocks_entered.load(Ordering::Relaxed)
    }

    /// Executions finished with `status`
    pub fn finished(&self, status: ExecutionStatus) -> u64 {
        self.finished.get(&status).map_or(0, |count| *count)
    }

    /// Executions finished, any status
    pub fn finished_total(&self) -> u64 {
        self.finished.iter().map(|entry| *entry.value()).sum()
    }
}

/// Execution event handler that records counters
#[derive(Debug, Clone)]
pub struct MetricsEventHandler {
    enabled: bool,
    tallies: Arc<ExecutionTallies>,
}

impl Default for MetricsEventHandler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MetricsEventHandler {
    /// Create a handler; a disabled one drops every event
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tallies: Arc::new(ExecutionTallies::default()),
        }
    }

    /// Shared tallies, updated as events arrive
    pub fn tallies(&self) -> Arc<ExecutionTallies> {
        self.tallies.clone()
    }

    fn record(&self, event: &dyn DomainEvent) {
        let any = event.as_any();

        if any.is::<ExecutionStarted>() {
            self.tallies.started.fetch_add(1, Ordering::Relaxed);
            metrics::increment_counter!(names::EXECUTIONS_STARTED);
        } else if any.is::<ExecutionSuspended>() {
            self.tallies.suspended.fetch_add(1, Ordering::Relaxed);
            metrics::increment_counter!(names::EXECUTIONS_SUSPENDED);
        } else if any.is::<ExecutionResumed>() {
            self.tallies.resumed.fetch_add(1, Ordering::Relaxed);
            metrics::increment_counter!(names::EXECUTIONS_RESUMED);
        } else if let Some(entered) = any.downcast_ref::<BlockEntered>() {
            self.tallies.blocks_entered.fetch_add(1, Ordering::Relaxed);
            metrics::increment_counter!(
                names::BLOCKS_ENTERED,
                "block_type" => entered.block_type.clone()
            );
        } else if let Some(finished) = any.downcast_ref::<ExecutionFinished>() {
            *self.tallies.finished.entry(finished.status).or_insert(0) += 1;
            metrics::increment_counter!(
                names::EXECUTIONS_FINISHED,
                "status" => finished.status.as_str()
            );
        } else {
            trace!(event_type = event.event_type(), "Unrecognized event");
        }
    }
}

#[async_trait]
impl ExecutionEventHandler for MetricsEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        if self.enabled {
            self.record(event.as_ref());
        }
        Ok(())
    }
}
