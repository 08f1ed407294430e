//! Concurrent inbound events for the same contact.
//!
//! Whatever the interleaving, a contact never has two active executions and
//! one reply never advances an execution twice.

use std::sync::Arc;
use std::time::Duration;

use convoflow_core::{
    BlockId, CoreError, Disposition, EngineConfig, ExecutionStatus, InboundOutcome, InteractiveFlow,
    UserInput,
};
use convoflow_test_utils::assertions::{assert_status, assert_variable};
use convoflow_test_utils::data_generators::{linear_menu, survey, TENANT};
use convoflow_test_utils::{FlowBuilder, TestEngine};
use convoflow_tests::latest;
use futures::future::join_all;

const CONTACT: &str = "+5511999990100";

fn tolerated<T>(result: &Result<T, CoreError>) -> bool {
    matches!(result, Ok(_) | Err(CoreError::Busy(_)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_keywords_create_one_execution() -> Result<(), CoreError> {
    let harness = Arc::new(TestEngine::new(vec![linear_menu()]).await?);

    let sends = (0..16).map(|_| {
        let harness = harness.clone();
        tokio::spawn(async move { harness.send(CONTACT, "hello").await })
    });
    let results: Vec<Result<InboundOutcome, CoreError>> = join_all(sends)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert!(results.iter().all(tolerated), "unexpected result: {:?}", results);
    assert!(results.iter().any(|r| r.is_ok()));

    let executions = harness.executions(CONTACT).await?;
    assert_eq!(executions.len(), 1);
    let active = harness.active(CONTACT).await?.expect("menu waiting");
    assert_eq!(active.id, executions[0].id);
    assert_eq!(active.current_block_id, BlockId::from("menu"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_reply_advances_once() -> Result<(), CoreError> {
    let harness = Arc::new(TestEngine::new(vec![survey()]).await?);
    harness.send(CONTACT, "hi").await?;

    let replies = (0..8).map(|_| {
        let harness = harness.clone();
        tokio::spawn(async move {
            harness
                .resume(CONTACT, UserInput::choice("fast", "Fast"))
                .await
        })
    });
    let results: Vec<Result<Disposition, CoreError>> = join_all(replies)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert!(results.iter().all(tolerated), "unexpected result: {:?}", results);

    let execution = harness.active(CONTACT).await?.expect("second question waiting");
    assert_eq!(execution.current_block_id, BlockId::from("q2"));
    assert_variable(&execution, "answers", 1.0).unwrap();
    assert_variable(&execution, "speed", "Fast").unwrap();
    let counted = execution
        .history
        .iter()
        .filter(|id| id.as_str() == "count")
        .count();
    assert_eq!(counted, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contacts_run_independently() -> Result<(), CoreError> {
    let harness = Arc::new(TestEngine::new(vec![linear_menu()]).await?);
    let contacts: Vec<String> = (0..10).map(|i| format!("+55119999902{:02}", i)).collect();

    let runs = contacts.iter().cloned().map(|contact| {
        let harness = harness.clone();
        tokio::spawn(async move {
            harness.send(&contact, "hello").await?;
            harness.tap(&contact, "B", "Talk to someone").await
        })
    });
    for joined in join_all(runs).await {
        let outcome = joined.expect("task panicked")?;
        assert!(matches!(outcome, InboundOutcome::Handled { .. }));
    }

    for contact in &contacts {
        let executions = harness.executions(contact).await?;
        assert_eq!(executions.len(), 1);
        assert_status(&executions[0], ExecutionStatus::TransferredHuman).unwrap();
    }
    assert!(latest(&harness, &contacts[0]).await.is_some());
    Ok(())
}

/// Message blocks only, so every step waits on the provider
fn announcements(messages: &[&str]) -> InteractiveFlow {
    let ids: Vec<String> = (1..=messages.len()).map(|i| format!("m{}", i)).collect();
    let mut builder = FlowBuilder::new("announcements", TENANT);
    for (id, text) in ids.iter().zip(messages) {
        builder = builder.message(id, text);
    }

    let mut chain: Vec<&str> = vec!["start"];
    chain.extend(ids.iter().map(String::as_str));
    chain.push("end");
    builder.end("end").chain(&chain).build()
}

fn short_claims() -> EngineConfig {
    EngineConfig {
        claim_ttl_secs: 1,
        claim_retry_backoff_ms: 1,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_provider_run_outlives_claim_ttl() -> Result<(), CoreError> {
    let flow = announcements(&["one", "two", "three"]);
    let harness = Arc::new(TestEngine::with_config(vec![flow], short_claims()).await?);
    harness.recorder.set_delivery_delay(Duration::from_millis(600));

    let run = {
        let harness = harness.clone();
        tokio::spawn(async move { harness.start("announcements", CONTACT).await })
    };

    // Past the first lease's expiry, the claim is still held
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let meanwhile = harness.resume(CONTACT, UserInput::text("hello?")).await;
    assert!(matches!(meanwhile, Err(CoreError::Busy(_))), "got {:?}", meanwhile);

    let outcome = run.await.expect("task panicked")?;
    assert!(matches!(outcome, Disposition::Completed { .. }), "got {:?}", outcome);
    assert_eq!(harness.recorder.texts(), vec!["one", "two", "three"]);
    assert!(harness.active(CONTACT).await?.is_none());

    let execution = latest(&harness, CONTACT).await.expect("stored");
    assert_status(&execution, ExecutionStatus::Completed).unwrap();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_invocation_loses_claim_to_takeover() -> Result<(), CoreError> {
    let flow = announcements(&["one", "two"]);
    let harness = Arc::new(TestEngine::with_config(vec![flow], short_claims()).await?);
    harness.recorder.set_delivery_delay(Duration::from_millis(1500));

    let stalled = {
        let harness = harness.clone();
        tokio::spawn(async move { harness.start("announcements", CONTACT).await })
    };

    // The first send outlasts the lease, so a later reply takes the execution over
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let taken_over = harness.resume(CONTACT, UserInput::text("x")).await?;
    assert!(matches!(taken_over, Disposition::Completed { .. }), "got {:?}", taken_over);

    let stalled = stalled.await.expect("task panicked");
    assert!(matches!(stalled, Err(CoreError::ClaimLost(_))), "got {:?}", stalled);

    // The interrupted step is repeated by the new owner, nothing after it is
    assert_eq!(harness.recorder.texts(), vec!["one", "one", "two"]);
    let executions = harness.executions(CONTACT).await?;
    assert_eq!(executions.len(), 1);
    assert_status(&executions[0], ExecutionStatus::Completed).unwrap();
    assert!(harness.active(CONTACT).await?.is_none());
    Ok(())
}
