//! End-to-end runs of the canned button menu through the engine.
//!
//! `hello` starts the menu; option A ends the flow and option B hands the
//! contact to a human.

use convoflow_core::domain::collaborators::Prompt;
use convoflow_core::{CoreError, Disposition, ExecutionStatus, InboundOutcome, ServicingMode};
use convoflow_test_utils::assertions::{assert_history, assert_status};
use convoflow_test_utils::data_generators::linear_menu;
use convoflow_test_utils::{RecordedCall, TestEngine};
use convoflow_tests::{disposition, latest};
use pretty_assertions::assert_eq;

const CONTACT: &str = "+5511999990001";

#[tokio::test]
async fn test_keyword_starts_menu_and_human_option_transfers() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu()]).await?;

    let first = disposition(harness.send(CONTACT, "hello").await?);
    match first {
        Some(Disposition::Suspended {
            prompt: Prompt::Buttons(buttons),
            ..
        }) => {
            let ids: Vec<_> = buttons.buttons.iter().map(|b| b.id.as_str()).collect();
            assert_eq!(ids, vec!["A", "B"]);
        }
        other => panic!("expected the menu, got {:?}", other),
    }
    assert_eq!(harness.recorder.texts(), vec!["Hi".to_string()]);

    let second = disposition(harness.tap(CONTACT, "B", "Talk to someone").await?);
    assert!(matches!(
        second,
        Some(Disposition::Transferred {
            mode: ServicingMode::Human,
            ..
        })
    ));

    let execution = latest(&harness, CONTACT).await.expect("execution stored");
    assert_status(&execution, ExecutionStatus::TransferredHuman).unwrap();
    assert_history(&execution, &["start", "hi", "menu", "human"]).unwrap();
    assert!(harness.active(CONTACT).await?.is_none());
    assert!(harness
        .recorder
        .calls()
        .contains(&RecordedCall::Mode(ServicingMode::Human)));

    let events = harness.recorder.event_types();
    assert_eq!(events.first().map(String::as_str), Some("execution.started"));
    assert_eq!(events.last().map(String::as_str), Some("execution.finished"));
    assert!(events.iter().any(|e| e == "execution.suspended"));
    assert!(events.iter().any(|e| e == "execution.resumed"));
    Ok(())
}

#[tokio::test]
async fn test_done_option_completes() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu()]).await?;

    harness.send(CONTACT, "hello").await?;
    let outcome = disposition(harness.tap(CONTACT, "A", "All good").await?);
    assert!(matches!(outcome, Some(Disposition::Completed { .. })));

    let execution = latest(&harness, CONTACT).await.expect("execution stored");
    assert_status(&execution, ExecutionStatus::Completed).unwrap();
    assert_history(&execution, &["start", "hi", "menu", "end"]).unwrap();
    assert!(execution.ended_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_typed_title_selects_option() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu()]).await?;

    harness.send(CONTACT, "hello").await?;
    let outcome = disposition(harness.send(CONTACT, "  all GOOD ").await?);
    assert!(matches!(outcome, Some(Disposition::Completed { .. })));
    Ok(())
}

#[tokio::test]
async fn test_unknown_reply_presents_menu_again() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu()]).await?;

    harness.send(CONTACT, "hello").await?;
    let outcome = disposition(harness.send(CONTACT, "what?").await?);
    assert!(matches!(outcome, Some(Disposition::Suspended { .. })));

    let menus = harness
        .recorder
        .calls()
        .into_iter()
        .filter(|call| matches!(call, RecordedCall::Buttons(_)))
        .count();
    assert_eq!(menus, 2);

    let execution = harness.active(CONTACT).await?.expect("still waiting");
    assert_eq!(execution.current_block_id.as_str(), "menu");
    assert_eq!(harness.executions(CONTACT).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_tap_after_completion_is_declined() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu()]).await?;

    harness.send(CONTACT, "hello").await?;
    harness.tap(CONTACT, "A", "All good").await?;

    let stale = harness.tap(CONTACT, "B", "Talk to someone").await?;
    assert_eq!(stale, InboundOutcome::Declined);
    assert_eq!(harness.executions(CONTACT).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_keyword_after_completion_starts_fresh_execution() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu()]).await?;

    harness.send(CONTACT, "hello").await?;
    harness.tap(CONTACT, "A", "All good").await?;
    let again = disposition(harness.send(CONTACT, "hello again").await?);
    assert!(matches!(again, Some(Disposition::Suspended { .. })));

    let executions = harness.executions(CONTACT).await?;
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].status, ExecutionStatus::Active);
    assert_eq!(executions[1].status, ExecutionStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_operator_transfer_to_bot() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu()]).await?;

    let started = disposition(harness.send(CONTACT, "hello").await?).expect("handled");
    let execution_id = started.execution_id().cloned().expect("execution created");

    let transferred = harness.engine.transfer_to_bot(&execution_id).await?;
    assert!(matches!(
        transferred,
        Disposition::Transferred {
            mode: ServicingMode::Bot,
            ..
        }
    ));

    let execution = latest(&harness, CONTACT).await.expect("execution stored");
    assert_status(&execution, ExecutionStatus::TransferredBot).unwrap();
    assert!(harness
        .recorder
        .calls()
        .contains(&RecordedCall::Mode(ServicingMode::Bot)));

    let again = harness.engine.transfer_to_human(&execution_id).await;
    assert!(matches!(again, Err(CoreError::ExecutionNotActive(_))));
    Ok(())
}

#[tokio::test]
async fn test_failed_delivery_aborts_and_frees_contact() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu()]).await?;
    harness.recorder.set_fail_delivery(true);

    let outcome = disposition(harness.send(CONTACT, "hello").await?);
    assert!(matches!(outcome, Some(Disposition::Aborted { .. })));

    let execution = latest(&harness, CONTACT).await.expect("execution stored");
    assert_status(&execution, ExecutionStatus::Aborted).unwrap();
    assert!(execution.error.is_some());
    assert!(harness.active(CONTACT).await?.is_none());

    harness.recorder.set_fail_delivery(false);
    let retry = disposition(harness.send(CONTACT, "hello").await?);
    assert!(matches!(retry, Some(Disposition::Suspended { .. })));
    Ok(())
}
