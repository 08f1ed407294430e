//! Block Interpreter
//!
//! [`interpret`] maps a block, the current variables and an optional inbound
//! reply to a [`StepResult`]: the side effects to perform and where the
//! execution goes next. It performs no I/O, so the live executor and the
//! simulator drive exactly the same semantics.

pub mod action;
pub mod choice;
pub mod condition;

use serde::{Deserialize, Serialize};

use crate::domain::block::{BlockKind, ButtonsData, FlowBlock, ListData};
use crate::domain::collaborators::{
    ButtonPrompt, ListPrompt, Prompt, PromptButton, PromptRow, PromptSection,
};
use crate::domain::flow_definition::InteractiveFlow;
use crate::domain::flow_execution::ServicingMode;
use crate::domain::identifiers::BlockId;
use crate::domain::variables::{interpolate, VariableValue, Variables};

/// Inbound reply to a suspended prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    /// Message text as typed (or the title echoed by the provider)
    pub text: String,
    /// Id of the selected button or row, when the provider reports one
    pub choice_id: Option<String>,
}

impl UserInput {
    /// Free-text reply
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choice_id: None,
        }
    }

    /// Structured reply to a list or button prompt
    pub fn choice(choice_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choice_id: Some(choice_id.into()),
        }
    }
}

/// Instruction produced by the interpreter, performed by the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    /// Send a text message
    SendText {
        /// Rendered text
        text: String,
    },
    /// Present a list menu
    SendList {
        /// Rendered prompt
        prompt: ListPrompt,
    },
    /// Present reply buttons
    SendButtons {
        /// Rendered prompt
        prompt: ButtonPrompt,
    },
    /// Store a variable
    SetVariable {
        /// Variable name
        name: String,
        /// New value
        value: VariableValue,
    },
    /// Remove a variable
    ClearVariable {
        /// Variable name
        name: String,
    },
    /// Tag the contact
    AddTag {
        /// Tag name
        tag: String,
    },
    /// Untag the contact
    RemoveTag {
        /// Tag name
        tag: String,
    },
    /// Switch who services the contact
    SetServicingMode {
        /// New mode
        mode: ServicingMode,
    },
}

impl SideEffect {
    /// Whether performing the effect calls an external collaborator
    pub fn is_external(&self) -> bool {
        !matches!(
            self,
            SideEffect::SetVariable { .. } | SideEffect::ClearVariable { .. }
        )
    }
}

/// Where the execution goes after a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Continue with another block
    Advance {
        /// Next block
        next: BlockId,
    },
    /// Wait for the contact to answer the prompt
    Suspend {
        /// Prompt that was presented
        prompt: Prompt,
    },
    /// The flow is over
    End,
    /// Hand the contact to the AI agent or a human
    Handoff {
        /// Receiving side
        mode: ServicingMode,
    },
    /// The definition cannot be executed
    Error {
        /// What is wrong
        detail: String,
    },
}

/// Result of interpreting one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Side effects, in the order they must be performed
    pub effects: Vec<SideEffect>,
    /// Next position
    pub outcome: StepOutcome,
}

impl StepResult {
    fn new(effects: Vec<SideEffect>, outcome: StepOutcome) -> Self {
        Self { effects, outcome }
    }

    fn advance_or_end(effects: Vec<SideEffect>, next: Option<BlockId>) -> Self {
        let outcome = match next {
            Some(next) => StepOutcome::Advance { next },
            None => StepOutcome::End,
        };
        Self::new(effects, outcome)
    }

    fn error(detail: impl Into<String>) -> Self {
        Self::new(
            Vec::new(),
            StepOutcome::Error {
                detail: detail.into(),
            },
        )
    }
}

/// Interpret one block.
///
/// `input` is only consulted by interactive blocks; the first visit of such a
/// block (no input) presents the prompt and suspends.
pub fn interpret(
    flow: &InteractiveFlow,
    block: &FlowBlock,
    variables: &Variables,
    input: Option<&UserInput>,
) -> StepResult {
    let next_plain = || flow.plain_edge(&block.id).map(|e| e.target.clone());

    match &block.kind {
        BlockKind::Start => StepResult::advance_or_end(Vec::new(), next_plain()),

        BlockKind::Message(data) => StepResult::advance_or_end(
            vec![SideEffect::SendText {
                text: interpolate(&data.message_text, variables),
            }],
            next_plain(),
        ),

        BlockKind::InteractiveList(_) | BlockKind::InteractiveButtons(_) => {
            interpret_interactive(flow, block, variables, input)
        }

        BlockKind::Condition(data) => {
            match condition::select_branch(flow, &block.id, data, variables) {
                Ok(next) => StepResult::advance_or_end(Vec::new(), next),
                Err(detail) => StepResult::error(detail),
            }
        }

        BlockKind::Action(action) => {
            StepResult::advance_or_end(vec![action::effect_of(action, variables)], next_plain())
        }

        BlockKind::AiHandoff(data) | BlockKind::HumanHandoff(data) => {
            let mode = if matches!(block.kind, BlockKind::AiHandoff(_)) {
                ServicingMode::Bot
            } else {
                ServicingMode::Human
            };
            let mut effects = Vec::with_capacity(2);
            if let Some(text) = &data.message_text {
                effects.push(SideEffect::SendText {
                    text: interpolate(text, variables),
                });
            }
            effects.push(SideEffect::SetServicingMode { mode });
            StepResult::new(effects, StepOutcome::Handoff { mode })
        }

        BlockKind::End(data) => {
            let effects = data
                .message_text
                .iter()
                .map(|text| SideEffect::SendText {
                    text: interpolate(text, variables),
                })
                .collect();
            StepResult::new(effects, StepOutcome::End)
        }

        BlockKind::Invalid { reason, .. } => {
            StepResult::error(format!("block '{}': {}", block.id, reason))
        }
    }
}

fn interpret_interactive(
    flow: &InteractiveFlow,
    block: &FlowBlock,
    variables: &Variables,
    input: Option<&UserInput>,
) -> StepResult {
    let (prompt, variable_name, invalid_choice_text) = match &block.kind {
        BlockKind::InteractiveList(data) => (
            Prompt::List(render_list(data, variables)),
            data.variable_name.as_ref(),
            data.invalid_choice_text.as_ref(),
        ),
        BlockKind::InteractiveButtons(data) => (
            Prompt::Buttons(render_buttons(data, variables)),
            data.variable_name.as_ref(),
            data.invalid_choice_text.as_ref(),
        ),
        _ => return StepResult::error(format!("block '{}' is not interactive", block.id)),
    };

    let Some(input) = input else {
        return present(prompt, None);
    };

    let options = block.kind.choice_options();
    match choice::match_option(&options, input) {
        Some(option) => {
            let mut effects = Vec::new();
            if let Some(name) = variable_name {
                effects.push(SideEffect::SetVariable {
                    name: name.clone(),
                    value: VariableValue::Text(option.title.to_string()),
                });
            }
            StepResult::advance_or_end(effects, choice::option_target(flow, &block.id, &option))
        }
        None => present(
            prompt,
            invalid_choice_text.map(|text| interpolate(text, variables)),
        ),
    }
}

fn present(prompt: Prompt, notice: Option<String>) -> StepResult {
    let mut effects = Vec::with_capacity(2);
    if let Some(text) = notice {
        effects.push(SideEffect::SendText { text });
    }
    effects.push(match &prompt {
        Prompt::List(list) => SideEffect::SendList {
            prompt: list.clone(),
        },
        Prompt::Buttons(buttons) => SideEffect::SendButtons {
            prompt: buttons.clone(),
        },
    });
    StepResult::new(effects, StepOutcome::Suspend { prompt })
}

fn render_list(data: &ListData, variables: &Variables) -> ListPrompt {
    ListPrompt {
        body: interpolate(&data.body_text, variables),
        button_text: data.button_text.clone(),
        header: data.header_text.as_ref().map(|t| interpolate(t, variables)),
        footer: data.footer_text.as_ref().map(|t| interpolate(t, variables)),
        sections: data
            .sections
            .iter()
            .map(|section| PromptSection {
                title: section.title.clone(),
                rows: section
                    .rows
                    .iter()
                    .map(|row| PromptRow {
                        id: row.id.clone(),
                        title: row.title.clone(),
                        description: row.description.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn render_buttons(data: &ButtonsData, variables: &Variables) -> ButtonPrompt {
    ButtonPrompt {
        body: interpolate(&data.body_text, variables),
        header: data.header_text.as_ref().map(|t| interpolate(t, variables)),
        footer: data.footer_text.as_ref().map(|t| interpolate(t, variables)),
        buttons: data
            .buttons
            .iter()
            .map(|b| PromptButton {
                id: b.id.clone(),
                title: b.title.clone(),
            })
            .collect(),
    }
}

/// Apply the variable mutations among `effects`, in order
pub fn apply_mutations(variables: &mut Variables, effects: &[SideEffect]) {
    for effect in effects {
        match effect {
            SideEffect::SetVariable { name, value } => {
                variables.insert(name.clone(), value.clone());
            }
            SideEffect::ClearVariable { name } => {
                variables.remove(name);
            }
            _ => {}
        }
    }
}
