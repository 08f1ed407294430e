//! Dry-run driver over the block interpreter.
//!
//! The simulator walks a flow exactly like the executor does but performs no
//! side effects: every instruction is kept in the returned [`PreviewStep`]s
//! and state lives in memory only.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::domain::flow_definition::InteractiveFlow;
use crate::domain::flow_execution::ServicingMode;
use crate::domain::identifiers::BlockId;
use crate::domain::variables::Variables;
use crate::interpreter::{apply_mutations, interpret, SideEffect, StepOutcome, UserInput};
use crate::CoreError;

/// One interpreted block and what it would have done
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewStep {
    /// Interpreted block
    pub block_id: BlockId,
    /// Its type name
    pub block_type: String,
    /// Side effects that would have been performed
    pub effects: Vec<SideEffect>,
    /// Where the execution would go
    pub outcome: StepOutcome,
}

/// State of a simulated run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SimulationStatus {
    /// Nothing executed yet
    Idle,
    /// Positioned on a block, not waiting for input
    Paused,
    /// Waiting for a choice on an interactive block
    Suspended,
    /// Reached an end block
    Completed,
    /// Reached a hand-off block
    Transferred {
        /// Receiving side
        mode: ServicingMode,
    },
    /// Ran out of step budget
    Aborted {
        /// Why
        reason: String,
    },
    /// Hit a definition error
    Error {
        /// What is wrong
        detail: String,
    },
}

/// Interactive preview of a flow
#[derive(Debug, Clone)]
pub struct Simulator {
    flow: InteractiveFlow,
    initial_variables: Variables,
    variables: Variables,
    history: Vec<BlockId>,
    // Variables as they were when the matching history entry was entered
    snapshots: Vec<Variables>,
    status: SimulationStatus,
    step_budget: u32,
    transcript: Vec<PreviewStep>,
}

impl Simulator {
    /// Create a simulator for a flow with the engine's default limits
    pub fn new(flow: InteractiveFlow) -> Self {
        Self::with_config(flow, &EngineConfig::default())
    }

    /// Create a simulator that stops where the engine configured by `config` would
    pub fn with_config(flow: InteractiveFlow, config: &EngineConfig) -> Self {
        Self {
            flow,
            initial_variables: Variables::new(),
            variables: Variables::new(),
            history: Vec::new(),
            snapshots: Vec::new(),
            status: SimulationStatus::Idle,
            step_budget: config.step_budget,
            transcript: Vec::new(),
        }
    }

    /// Seed the variables the run starts with
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.initial_variables = variables.clone();
        self.variables = variables;
        self
    }

    /// Override the step budget used by auto-advancing runs
    pub fn with_step_budget(mut self, step_budget: u32) -> Self {
        self.step_budget = step_budget;
        self
    }

    /// The flow being simulated
    pub fn flow(&self) -> &InteractiveFlow {
        &self.flow
    }

    /// Current variables
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Visited blocks
    pub fn history(&self) -> &[BlockId] {
        &self.history
    }

    /// Block the simulation is positioned on
    pub fn current_block_id(&self) -> Option<&BlockId> {
        self.history.last()
    }

    /// Current state
    pub fn status(&self) -> &SimulationStatus {
        &self.status
    }

    /// Every step interpreted since the last reset
    pub fn transcript(&self) -> &[PreviewStep] {
        &self.transcript
    }

    /// Forget all progress
    pub fn reset(&mut self) {
        self.variables = self.initial_variables.clone();
        self.history.clear();
        self.snapshots.clear();
        self.transcript.clear();
        self.status = SimulationStatus::Idle;
    }

    /// Restart from the start block and run to the first suspend point or end
    pub fn start(&mut self) -> Result<Vec<PreviewStep>, CoreError> {
        self.reset();
        let start = self.flow.start_block_id.clone();
        self.run_from(&start)
    }

    /// Jump to a block and run to the next suspend point or end
    pub fn run_from(&mut self, block_id: &BlockId) -> Result<Vec<PreviewStep>, CoreError> {
        self.enter(block_id)?;
        Ok(self.drive(None))
    }

    /// Interpret a single block without following its outcome
    pub fn execute_block(&mut self, block_id: &BlockId) -> Result<PreviewStep, CoreError> {
        self.enter(block_id)?;
        let step = self.step(None);
        self.status = match &step.outcome {
            StepOutcome::Suspend { .. } => SimulationStatus::Suspended,
            other => Self::terminal_status(other).unwrap_or(SimulationStatus::Paused),
        };
        Ok(step)
    }

    /// Answer the prompt of the current interactive block and run on.
    ///
    /// When `expected_target` is given, the choice must route there; a
    /// mismatch is reported without changing any state.
    pub fn handle_user_choice(
        &mut self,
        choice_id: &str,
        expected_target: Option<&BlockId>,
    ) -> Result<Vec<PreviewStep>, CoreError> {
        let current = self
            .current_block_id()
            .cloned()
            .ok_or_else(|| CoreError::ValidationError("simulation has not started".into()))?;
        let block = self
            .flow
            .block(&current)
            .ok_or_else(|| CoreError::DefinitionError(format!("unknown block '{}'", current)))?;
        if !block.kind.is_interactive() {
            return Err(CoreError::ValidationError(format!(
                "block '{}' does not wait for a choice",
                current
            )));
        }

        let input = UserInput::choice(choice_id, choice_id);
        if let Some(expected) = expected_target {
            let trial = interpret(&self.flow, block, &self.variables, Some(&input));
            match &trial.outcome {
                StepOutcome::Advance { next } if next == expected => {}
                StepOutcome::Advance { next } => {
                    return Err(CoreError::ValidationError(format!(
                        "option '{}' of block '{}' routes to '{}', expected '{}'",
                        choice_id, current, next, expected
                    )));
                }
                _ => {
                    return Err(CoreError::ValidationError(format!(
                        "option '{}' of block '{}' does not route to '{}'",
                        choice_id, current, expected
                    )));
                }
            }
        }

        Ok(self.drive(Some(input)))
    }

    /// Step back to the previously visited block, restoring its variables.
    ///
    /// Returns the block now current, or `None` when there is nothing to go
    /// back to.
    pub fn go_back(&mut self) -> Option<BlockId> {
        if self.history.len() < 2 {
            return None;
        }
        self.history.pop();
        self.snapshots.pop();

        let current = self.history.last().cloned()?;
        if let Some(snapshot) = self.snapshots.last() {
            self.variables = snapshot.clone();
        }
        self.status = match self.flow.block(&current) {
            Some(block) if block.kind.is_interactive() => SimulationStatus::Suspended,
            _ => SimulationStatus::Paused,
        };
        Some(current)
    }

    fn enter(&mut self, block_id: &BlockId) -> Result<(), CoreError> {
        if self.flow.block(block_id).is_none() {
            return Err(CoreError::DefinitionError(format!(
                "block '{}' does not exist in flow '{}'",
                block_id, self.flow.id
            )));
        }
        self.snapshots.push(self.variables.clone());
        self.history.push(block_id.clone());
        Ok(())
    }

    fn step(&mut self, input: Option<&UserInput>) -> PreviewStep {
        let current = self
            .history
            .last()
            .cloned()
            .unwrap_or_else(|| self.flow.start_block_id.clone());
        let step = match self.flow.block(&current) {
            Some(block) => {
                let result = interpret(&self.flow, block, &self.variables, input);
                PreviewStep {
                    block_id: current,
                    block_type: block.type_name().to_string(),
                    effects: result.effects,
                    outcome: result.outcome,
                }
            }
            None => PreviewStep {
                block_type: String::new(),
                effects: Vec::new(),
                outcome: StepOutcome::Error {
                    detail: format!("block '{}' does not exist", current),
                },
                block_id: current,
            },
        };
        apply_mutations(&mut self.variables, &step.effects);
        self.transcript.push(step.clone());
        step
    }

    /// Same loop as the executor, minus I/O
    fn drive(&mut self, input: Option<UserInput>) -> Vec<PreviewStep> {
        let mut input = input;
        let mut steps = Vec::new();
        let mut advances: u32 = 0;

        loop {
            let step = self.step(input.take().as_ref());
            let outcome = step.outcome.clone();
            steps.push(step);

            match outcome {
                StepOutcome::Advance { next } => {
                    advances += 1;
                    if advances > self.step_budget {
                        self.status = SimulationStatus::Aborted {
                            reason: format!("step budget of {} exceeded", self.step_budget),
                        };
                        return steps;
                    }
                    if let Err(e) = self.enter(&next) {
                        self.status = SimulationStatus::Error {
                            detail: e.to_string(),
                        };
                        return steps;
                    }
                }
                StepOutcome::Suspend { .. } => {
                    self.status = SimulationStatus::Suspended;
                    return steps;
                }
                other => {
                    self.status =
                        Self::terminal_status(&other).unwrap_or(SimulationStatus::Paused);
                    return steps;
                }
            }
        }
    }

    fn terminal_status(outcome: &StepOutcome) -> Option<SimulationStatus> {
        match outcome {
            StepOutcome::End => Some(SimulationStatus::Completed),
            StepOutcome::Handoff { mode } => Some(SimulationStatus::Transferred { mode: *mode }),
            StepOutcome::Error { detail } => Some(SimulationStatus::Error {
                detail: detail.clone(),
            }),
            StepOutcome::Advance { .. } | StepOutcome::Suspend { .. } => None,
        }
    }
}

/// Preview a single block of a flow with no variables set
pub fn execute_block(flow: &InteractiveFlow, block_id: &BlockId) -> Result<PreviewStep, CoreError> {
    Simulator::new(flow.clone()).execute_block(block_id)
}
