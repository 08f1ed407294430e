//! The simulator and the engine walk the same graph the same way.

use convoflow_core::{
    CoreError, ExecutionStatus, ServicingMode, SideEffect, SimulationStatus, Simulator,
};
use convoflow_test_utils::data_generators::{condition_routing, linear_menu, survey};
use convoflow_test_utils::{RecordedCall, TestEngine};
use convoflow_tests::latest;
use pretty_assertions::assert_eq;

const CONTACT: &str = "+5511999990300";

/// Collaborator calls the engine would make for the previewed effects
fn expected_calls(simulator: &Simulator) -> Vec<RecordedCall> {
    simulator
        .transcript()
        .iter()
        .flat_map(|step| step.effects.iter())
        .filter_map(|effect| match effect {
            SideEffect::SendText { text } => Some(RecordedCall::Text(text.clone())),
            SideEffect::SendList { prompt } => Some(RecordedCall::List(prompt.clone())),
            SideEffect::SendButtons { prompt } => Some(RecordedCall::Buttons(prompt.clone())),
            SideEffect::AddTag { tag } => Some(RecordedCall::AddTag(tag.clone())),
            SideEffect::RemoveTag { tag } => Some(RecordedCall::RemoveTag(tag.clone())),
            SideEffect::SetServicingMode { mode } => Some(RecordedCall::Mode(*mode)),
            SideEffect::SetVariable { .. } | SideEffect::ClearVariable { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn test_survey_preview_matches_live_run() -> Result<(), CoreError> {
    let mut simulator = Simulator::new(survey());
    simulator.start()?;
    assert_eq!(simulator.status(), &SimulationStatus::Suspended);
    simulator.handle_user_choice("fast", None)?;
    simulator.handle_user_choice("no", None)?;
    assert_eq!(
        simulator.status(),
        &SimulationStatus::Transferred {
            mode: ServicingMode::Bot
        }
    );

    let harness = TestEngine::new(vec![survey()]).await?;
    harness.send(CONTACT, "hi").await?;
    harness.tap(CONTACT, "fast", "Fast").await?;
    harness.tap(CONTACT, "no", "No").await?;
    let execution = latest(&harness, CONTACT).await.expect("stored");

    assert_eq!(execution.status, ExecutionStatus::TransferredBot);
    assert_eq!(simulator.history(), execution.history.as_slice());
    assert_eq!(simulator.variables(), &execution.variables);
    assert_eq!(expected_calls(&simulator), harness.recorder.calls());
    Ok(())
}

#[tokio::test]
async fn test_condition_preview_matches_live_run() -> Result<(), CoreError> {
    let mut simulator = Simulator::new(condition_routing(2.0));
    simulator.start()?;
    assert_eq!(simulator.status(), &SimulationStatus::Completed);

    let harness = TestEngine::new(vec![condition_routing(2.0)]).await?;
    harness.start("routing", CONTACT).await?;
    let execution = latest(&harness, CONTACT).await.expect("stored");

    assert_eq!(simulator.history(), execution.history.as_slice());
    assert_eq!(expected_calls(&simulator), harness.recorder.calls());
    Ok(())
}

#[test]
fn test_preview_go_back_reopens_menu() -> Result<(), CoreError> {
    let mut simulator = Simulator::new(linear_menu());
    simulator.start()?;
    simulator.handle_user_choice("A", None)?;
    assert_eq!(simulator.status(), &SimulationStatus::Completed);

    let back = simulator.go_back().expect("history to step back through");
    assert_eq!(back.as_str(), "menu");
    assert_eq!(simulator.status(), &SimulationStatus::Suspended);

    simulator.handle_user_choice("B", None)?;
    assert_eq!(
        simulator.status(),
        &SimulationStatus::Transferred {
            mode: ServicingMode::Human
        }
    );
    Ok(())
}
