//! Trigger precedence, condition routing and the step budget, end to end.

use convoflow_core::{
    ContactId, CoreError, Disposition, EngineConfig, ExecutionStatus, TriggerDecision, UserInput,
};
use convoflow_test_utils::assertions::{assert_history, assert_status, assert_variable};
use convoflow_test_utils::data_generators::{
    condition_routing, linear_menu, overlapping_conditions, promo, runaway_loop, survey,
};
use convoflow_test_utils::{FlowBuilder, TestEngine};
use convoflow_tests::{disposition, latest};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_active_execution_wins_over_keyword() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![linear_menu(), promo("sale")]).await?;
    let contact = "+5511999990010";

    harness.send(contact, "hello").await?;
    let decision = harness
        .engine
        .resolver()
        .resolve(&harness.tenant, &ContactId::from(contact), "big sale today", false)
        .await?;
    assert!(matches!(decision, TriggerDecision::Resume { .. }));

    let outcome = disposition(harness.send(contact, "big sale today").await?);
    assert!(matches!(outcome, Some(Disposition::Suspended { .. })));

    let executions = harness.executions(contact).await?;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].flow_id.as_str(), "linear-menu");
    assert!(!harness.recorder.texts().contains(&"20% off today".to_string()));

    // Another contact gets the promotion
    let other = disposition(harness.send("+5511999990011", "SALE?").await?);
    assert!(matches!(other, Some(Disposition::Completed { .. })));
    assert!(harness.recorder.texts().contains(&"20% off today".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_always_flow_beats_keyword_flow() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![promo("hello"), survey()]).await?;
    let contact = "+5511999990012";

    harness.send(contact, "hello").await?;
    let execution = harness.active(contact).await?.expect("survey running");
    assert_eq!(execution.flow_id.as_str(), "survey");
    Ok(())
}

#[tokio::test]
async fn test_inactive_flow_is_not_triggered() -> Result<(), CoreError> {
    let flow = FlowBuilder::new("dormant", "acme")
        .keywords(&["hello"])
        .inactive()
        .end("end")
        .edge("start", "end")
        .build();
    let harness = TestEngine::new(vec![flow]).await?;

    let outcome = harness.send("+5511999990013", "hello").await?;
    assert_eq!(disposition(outcome), None);
    assert!(harness.executions("+5511999990013").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_condition_routes_by_rule_then_default() -> Result<(), CoreError> {
    let cases = [(1.0, "x"), (2.0, "y"), (3.0, "z")];

    for (value, branch) in cases {
        let harness = TestEngine::new(vec![condition_routing(value)]).await?;
        let outcome = harness.start("routing", "+5511999990020").await?;
        assert!(matches!(outcome, Disposition::Completed { .. }));

        let execution = latest(&harness, "+5511999990020").await.expect("stored");
        assert_history(&execution, &["start", "set", "check", branch, "end"]).unwrap();
        assert_variable(&execution, "level", value).unwrap();
        assert_eq!(harness.recorder.texts(), vec![branch.to_string()]);
    }
    Ok(())
}

#[tokio::test]
async fn test_first_matching_rule_wins() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![overlapping_conditions()]).await?;

    harness.start("overlap", "+5511999990021").await?;
    let execution = latest(&harness, "+5511999990021").await.expect("stored");
    assert_history(&execution, &["start", "set", "check", "first"]).unwrap();
    assert_status(&execution, ExecutionStatus::Completed).unwrap();
    Ok(())
}

#[tokio::test]
async fn test_runaway_flow_is_aborted_by_step_budget() -> Result<(), CoreError> {
    let config = EngineConfig {
        step_budget: 10,
        claim_retry_backoff_ms: 1,
        ..Default::default()
    };
    let harness = TestEngine::with_config(vec![runaway_loop()], config).await?;
    let contact = "+5511999990030";

    let outcome = harness.start("loop", contact).await?;
    match outcome {
        Disposition::Aborted { reason, .. } => assert!(reason.contains("step budget")),
        other => panic!("expected an abort, got {:?}", other),
    }

    let execution = latest(&harness, contact).await.expect("stored");
    assert_status(&execution, ExecutionStatus::Aborted).unwrap();
    assert!(execution.history.len() <= 11);
    assert!(harness.recorder.texts().len() <= 11);
    assert!(harness.active(contact).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_survey_captures_answers_and_counts() -> Result<(), CoreError> {
    let harness = TestEngine::new(vec![survey()]).await?;
    let contact = "+5511999990040";

    harness.send(contact, "hi").await?;
    harness.resume(contact, UserInput::choice("slow", "Slow")).await?;
    let outcome = harness.resume(contact, UserInput::choice("yes", "Yes")).await?;
    assert!(matches!(outcome, Disposition::Completed { .. }));

    let execution = latest(&harness, contact).await.expect("stored");
    assert_variable(&execution, "speed", "Slow").unwrap();
    assert_variable(&execution, "answer", "Yes").unwrap();
    assert_variable(&execution, "answers", 1.0).unwrap();
    assert_history(
        &execution,
        &["start", "q1", "count", "q2", "check", "thanks"],
    )
    .unwrap();
    Ok(())
}

#[tokio::test]
async fn test_same_inputs_give_same_run() -> Result<(), CoreError> {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let harness = TestEngine::new(vec![survey()]).await?;
        let contact = "+5511999990041";

        harness.send(contact, "hi").await?;
        harness.tap(contact, "fast", "Fast").await?;
        harness.tap(contact, "no", "No").await?;

        let execution = latest(&harness, contact).await.expect("stored");
        runs.push((
            execution.status,
            execution.history,
            execution.variables,
            harness.recorder.calls(),
        ));
    }

    assert_eq!(runs[0].0, ExecutionStatus::TransferredBot);
    assert_eq!(runs[0], runs[1]);
    Ok(())
}
