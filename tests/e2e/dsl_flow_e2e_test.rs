//! Flows authored in the DSL, published and run through the engine.

use std::sync::Arc;

use convoflow_core::{
    ContactId, CoreError, Disposition, EngineConfig, ExecutionStatus, FlowEngine, ServicingMode,
    TenantId, UserInput,
};
use convoflow_dsl::parse_and_validate_flow_document;
use convoflow_monitoring::MetricsEventHandler;
use convoflow_state_inmemory::InMemoryStateStoreProvider;
use convoflow_test_utils::assertions::{assert_history, assert_status, assert_variable};
use convoflow_test_utils::{RecordedCall, RecordingCollaborators, TestEngine};
use convoflow_tests::{disposition, latest};
use pretty_assertions::assert_eq;

const SUPPORT_MENU: &str = include_str!("../../demos/support_menu.yaml");
const CONTACT: &str = "+5511999990400";

#[tokio::test]
async fn test_support_menu_cancel_path() -> Result<(), CoreError> {
    let document = parse_and_validate_flow_document(SUPPORT_MENU).expect("demo document is valid");
    let harness = TestEngine::new(document.flows).await?;

    let opened = disposition(harness.send(CONTACT, "I need help").await?);
    assert!(matches!(opened, Some(Disposition::Suspended { .. })));

    let asked = disposition(harness.tap(CONTACT, "cancel", "Cancel an order").await?);
    assert!(matches!(asked, Some(Disposition::Suspended { .. })));
    assert!(harness
        .recorder
        .calls()
        .contains(&RecordedCall::AddTag("cancel-request".into())));

    let done = disposition(harness.tap(CONTACT, "yes", "Yes, cancel").await?);
    assert!(matches!(done, Some(Disposition::Completed { .. })));
    assert_eq!(harness.recorder.texts().last().map(String::as_str), Some("Thanks!"));

    let execution = latest(&harness, CONTACT).await.expect("stored");
    assert_status(&execution, ExecutionStatus::Completed).unwrap();
    assert_history(
        &execution,
        &["start", "greet", "menu", "count", "tag", "check", "confirm", "bye"],
    )
    .unwrap();
    assert_variable(&execution, "topic", "Cancel an order").unwrap();
    assert_variable(&execution, "confirmed", "Yes, cancel").unwrap();
    assert_variable(&execution, "cancellations", 1.0).unwrap();
    Ok(())
}

#[tokio::test]
async fn test_support_menu_invalid_choice_notice() -> Result<(), CoreError> {
    let document = parse_and_validate_flow_document(SUPPORT_MENU).expect("demo document is valid");
    let harness = TestEngine::new(document.flows).await?;

    harness.send(CONTACT, "support please").await?;
    let outcome = disposition(harness.send(CONTACT, "refund").await?);
    assert!(matches!(outcome, Some(Disposition::Suspended { .. })));
    assert_eq!(
        harness.recorder.texts().last().map(String::as_str),
        Some("Please pick a topic from the list")
    );
    Ok(())
}

#[tokio::test]
async fn test_metrics_handler_counts_a_live_run() -> Result<(), CoreError> {
    let document = parse_and_validate_flow_document(SUPPORT_MENU).expect("demo document is valid");
    let provider = InMemoryStateStoreProvider::new();
    for flow in document.flows {
        provider.flow_store().save(flow).await;
    }

    let recorder = RecordingCollaborators::new();
    let metrics = Arc::new(MetricsEventHandler::new(true));
    let tallies = metrics.tallies();
    let (flows, executions) = provider.create_repositories();
    let engine = FlowEngine::new(
        flows,
        executions,
        recorder.collaborators(),
        metrics,
        EngineConfig::default(),
    )?;

    let tenant = TenantId::from("acme");
    let contact = ContactId::from(CONTACT);
    engine
        .handle_inbound(&tenant, &contact, UserInput::text("help"))
        .await?;
    engine
        .handle_inbound(&tenant, &contact, UserInput::choice("agent", "Talk to a person"))
        .await?;

    assert_eq!(tallies.started(), 1);
    assert_eq!(tallies.suspended(), 1);
    assert_eq!(tallies.resumed(), 1);
    assert_eq!(tallies.finished(ExecutionStatus::TransferredHuman), 1);
    assert_eq!(tallies.finished_total(), 1);
    assert!(tallies.blocks_entered() >= 3);
    assert!(recorder
        .calls()
        .contains(&RecordedCall::Mode(ServicingMode::Human)));
    Ok(())
}
