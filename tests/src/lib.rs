//! Shared helpers for the end-to-end scenarios under `e2e/`.

use convoflow_core::{Disposition, FlowExecution, InboundOutcome};
use convoflow_test_utils::TestEngine;

/// Disposition of a handled inbound event, `None` when it was declined or dropped
pub fn disposition(outcome: InboundOutcome) -> Option<Disposition> {
    match outcome {
        InboundOutcome::Handled { disposition } => Some(disposition),
        InboundOutcome::Declined | InboundOutcome::Duplicate { .. } => None,
    }
}

/// Most recent execution of `contact`
pub async fn latest(harness: &TestEngine, contact: &str) -> Option<FlowExecution> {
    harness
        .executions(contact)
        .await
        .ok()
        .and_then(|executions| executions.into_iter().next())
}
