//! The `validate` and `simulate` commands, independent of argument parsing.

use anyhow::{bail, Context};
use serde_json::json;

use convoflow_core::{
    EngineConfig, FlowId, PreviewStep, Prompt, SideEffect, SimulationStatus, Simulator, StepOutcome,
    VariableValue, Variables,
};
use convoflow_dsl::{lint_document, parse_flow_document, DslError, ValidationError};

/// Result of linting a document
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Ids of the flows that parsed
    pub flows: Vec<String>,
    /// Every problem found
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// Whether the document is publishable
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// One line per problem, or a summary of the flows
    pub fn render(&self) -> String {
        if self.is_valid() {
            return format!("OK: {} flow(s): {}", self.flows.len(), self.flows.join(", "));
        }
        let mut out = format!("{} problem(s) found:\n", self.errors.len());
        for error in &self.errors {
            out.push_str(&format!("  {}\n", error));
        }
        out
    }
}

/// Parse and lint a flow document.
///
/// Shape problems are reported like lint errors; only unreadable documents
/// fail.
pub fn validate_source(source: &str) -> Result<ValidationReport, DslError> {
    match parse_flow_document(source) {
        Ok(document) => Ok(ValidationReport {
            flows: document.flows.iter().map(|f| f.id.to_string()).collect(),
            errors: lint_document(&document),
        }),
        Err(e) if !e.validation_errors().is_empty() => Ok(ValidationReport {
            flows: Vec::new(),
            errors: e.validation_errors().to_vec(),
        }),
        Err(e) => Err(e),
    }
}

/// Inputs of a simulated run
#[derive(Debug, Default, Clone)]
pub struct SimulateOptions {
    /// Flow to run; the first flow of the document when absent
    pub flow: Option<String>,
    /// Choices answered in order, one per prompt
    pub choices: Vec<String>,
    /// Starting variables
    pub variables: Vec<(String, VariableValue)>,
    /// Override of the auto-advance budget; the engine's configured budget otherwise
    pub step_budget: Option<u32>,
}

/// Run a flow of the document through the simulator
pub fn simulate_source(source: &str, options: &SimulateOptions) -> anyhow::Result<Simulator> {
    let document = parse_flow_document(source).context("Failed to load flow document")?;
    let flow = match &options.flow {
        Some(id) => document
            .flow(&FlowId::from(id.as_str()))
            .with_context(|| format!("No flow '{}' in document", id))?,
        None => document.default_flow().context("Document contains no flows")?,
    };

    let variables: Variables = options.variables.iter().cloned().collect();
    let mut simulator =
        Simulator::with_config(flow.clone(), &EngineConfig::load()).with_variables(variables);
    if let Some(budget) = options.step_budget {
        simulator = simulator.with_step_budget(budget);
    }

    simulator.start()?;
    for choice in &options.choices {
        if *simulator.status() != SimulationStatus::Suspended {
            bail!(
                "Flow is not waiting for a choice, cannot answer '{}' (status: {})",
                choice,
                describe_status(simulator.status())
            );
        }
        simulator.handle_user_choice(choice, None)?;
    }
    Ok(simulator)
}

/// Parse a `name=value` starting variable. Numbers and booleans are typed,
/// anything else is text.
pub fn parse_var(raw: &str) -> Result<(String, VariableValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", raw));
    }

    let value = if let Ok(number) = value.parse::<f64>() {
        VariableValue::Number(number)
    } else if let Ok(flag) = value.parse::<bool>() {
        VariableValue::Bool(flag)
    } else {
        VariableValue::Text(value.to_string())
    };
    Ok((name.to_string(), value))
}

fn describe_status(status: &SimulationStatus) -> String {
    match status {
        SimulationStatus::Idle => "idle".to_string(),
        SimulationStatus::Paused => "paused".to_string(),
        SimulationStatus::Suspended => "waiting for a choice".to_string(),
        SimulationStatus::Completed => "completed".to_string(),
        SimulationStatus::Transferred { mode } => format!("transferred to {}", mode.as_str()),
        SimulationStatus::Aborted { reason } => format!("aborted: {}", reason),
        SimulationStatus::Error { detail } => format!("error: {}", detail),
    }
}

fn describe_prompt(prompt: &Prompt) -> String {
    let kind = match prompt {
        Prompt::List(_) => "list",
        Prompt::Buttons(_) => "buttons",
    };
    format!("{} \"{}\" [{}]", kind, prompt.body(), prompt.option_ids().join(", "))
}

fn describe_effect(effect: &SideEffect) -> String {
    match effect {
        SideEffect::SendText { text } => format!("send text \"{}\"", text),
        SideEffect::SendList { prompt } => describe_prompt(&Prompt::List(prompt.clone())),
        SideEffect::SendButtons { prompt } => describe_prompt(&Prompt::Buttons(prompt.clone())),
        SideEffect::SetVariable { name, value } => format!("set {} = {}", name, value),
        SideEffect::ClearVariable { name } => format!("clear {}", name),
        SideEffect::AddTag { tag } => format!("add tag {}", tag),
        SideEffect::RemoveTag { tag } => format!("remove tag {}", tag),
        SideEffect::SetServicingMode { mode } => format!("switch contact to {}", mode.as_str()),
    }
}

fn describe_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Advance { next } => format!("-> {}", next),
        StepOutcome::Suspend { .. } => "waits for a choice".to_string(),
        StepOutcome::End => "ends the flow".to_string(),
        StepOutcome::Handoff { mode } => format!("hands off to {}", mode.as_str()),
        StepOutcome::Error { detail } => format!("error: {}", detail),
    }
}

fn render_step(step: &PreviewStep) -> String {
    let mut out = format!("[{}] {}\n", step.block_type, step.block_id);
    for effect in &step.effects {
        out.push_str(&format!("    {}\n", describe_effect(effect)));
    }
    out.push_str(&format!("    {}\n", describe_outcome(&step.outcome)));
    out
}

/// Human-readable transcript of a simulated run
pub fn render_transcript(simulator: &Simulator) -> String {
    let mut out = String::new();
    for step in simulator.transcript() {
        out.push_str(&render_step(step));
    }
    out.push_str(&format!("status: {}\n", describe_status(simulator.status())));
    let history: Vec<String> = simulator.history().iter().map(|id| id.to_string()).collect();
    out.push_str(&format!("history: {}\n", history.join(" -> ")));
    if !simulator.variables().is_empty() {
        out.push_str("variables:\n");
        for (name, value) in simulator.variables() {
            out.push_str(&format!("    {} = {}\n", name, value));
        }
    }
    out
}

/// Machine-readable summary of a simulated run
pub fn transcript_json(simulator: &Simulator) -> serde_json::Value {
    json!({
        "flow": simulator.flow().id,
        "status": simulator.status(),
        "history": simulator.history(),
        "variables": simulator.variables(),
        "transcript": simulator.transcript(),
    })
}
