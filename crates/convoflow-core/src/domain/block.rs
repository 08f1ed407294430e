//! Flow blocks: one node of the authored graph, with a typed payload per block kind.
//!
//! Blocks arrive from the flow editor as `{ "id", "type", "data" }`. They are
//! converted into [`BlockKind`] when deserialized; an unknown `type` or a
//! `data` payload that does not fit its type becomes [`BlockKind::Invalid`]
//! so that the interpreter reports it as a definition error at run time
//! instead of the whole flow failing to load.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identifiers::BlockId;
use super::variables::VariableValue;

/// One node in a flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBlock", into = "RawBlock")]
pub struct FlowBlock {
    /// Block id, unique within its flow
    pub id: BlockId,

    /// Type-specific configuration
    pub kind: BlockKind,
}

impl FlowBlock {
    /// Create a block
    pub fn new(id: impl Into<BlockId>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// The wire name of this block's type
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }
}

/// Typed block configuration, one variant per block kind
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// Entry point of the flow
    Start,
    /// Plain text message, auto-advances
    Message(MessageData),
    /// List menu, suspends for a choice
    InteractiveList(ListData),
    /// Reply buttons, suspend for a choice
    InteractiveButtons(ButtonsData),
    /// Ordered conditional branching
    Condition(ConditionData),
    /// Variable or tag mutation, auto-advances
    Action(FlowAction),
    /// Hand the conversation to the AI agent
    AiHandoff(HandoffData),
    /// Hand the conversation to a human operator
    HumanHandoff(HandoffData),
    /// Terminal block
    End(EndData),
    /// Unknown type or payload that does not match its type
    Invalid {
        /// Type name as authored
        block_type: String,
        /// Why the block could not be understood
        reason: String,
        /// Raw payload, kept so the definition round-trips unchanged
        data: Value,
    },
}

impl BlockKind {
    /// The wire name of the block type
    pub fn type_name(&self) -> &str {
        match self {
            BlockKind::Start => "start",
            BlockKind::Message(_) => "message",
            BlockKind::InteractiveList(_) => "interactive_list",
            BlockKind::InteractiveButtons(_) => "interactive_buttons",
            BlockKind::Condition(_) => "condition",
            BlockKind::Action(_) => "action",
            BlockKind::AiHandoff(_) => "ai_handoff",
            BlockKind::HumanHandoff(_) => "human_handoff",
            BlockKind::End(_) => "end",
            BlockKind::Invalid { block_type, .. } => block_type,
        }
    }

    /// Whether the block waits for user input
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            BlockKind::InteractiveList(_) | BlockKind::InteractiveButtons(_)
        )
    }

    /// Whether reaching the block ends the execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BlockKind::End(_) | BlockKind::AiHandoff(_) | BlockKind::HumanHandoff(_)
        )
    }

    /// Selectable options of an interactive block, in presentation order
    pub fn choice_options(&self) -> Vec<ChoiceOption<'_>> {
        match self {
            BlockKind::InteractiveButtons(data) => data
                .buttons
                .iter()
                .map(|b| ChoiceOption {
                    id: &b.id,
                    title: &b.title,
                    next_block_id: b.next_block_id.as_ref(),
                })
                .collect(),
            BlockKind::InteractiveList(data) => data
                .sections
                .iter()
                .flat_map(|s| s.rows.iter())
                .map(|r| ChoiceOption {
                    id: &r.id,
                    title: &r.title,
                    next_block_id: r.next_block_id.as_ref(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Borrowed view over a button or a list row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoiceOption<'a> {
    /// Option id, also used as the edge `sourceHandle`
    pub id: &'a str,
    /// Display title
    pub title: &'a str,
    /// Inline target, used when no edge is keyed by the option id
    pub next_block_id: Option<&'a BlockId>,
}

/// Payload of a `message` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    /// Text to send; supports `{{variable}}` placeholders
    pub message_text: String,
}

/// A reply button
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonOption {
    /// Button id
    pub id: String,
    /// Button label
    pub title: String,
    /// Optional inline target block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_block_id: Option<BlockId>,
}

/// Payload of an `interactive_buttons` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonsData {
    /// Prompt body
    #[serde(alias = "messageText")]
    pub body_text: String,
    /// Optional header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_text: Option<String>,
    /// Optional footer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
    /// Buttons in display order
    pub buttons: Vec<ButtonOption>,
    /// Variable receiving the chosen button title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    /// Sent before re-presenting the prompt when the reply matches no button
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_choice_text: Option<String>,
}

/// A row of a list section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRow {
    /// Row id
    pub id: String,
    /// Row title
    pub title: String,
    /// Optional description shown under the title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional inline target block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_block_id: Option<BlockId>,
}

/// A section of a list menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSection {
    /// Section title
    #[serde(default)]
    pub title: String,
    /// Rows in display order
    pub rows: Vec<ListRow>,
}

fn default_list_button() -> String {
    "Options".to_string()
}

/// Payload of an `interactive_list` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListData {
    /// Prompt body
    #[serde(alias = "messageText")]
    pub body_text: String,
    /// Label of the button that opens the list
    #[serde(default = "default_list_button")]
    pub button_text: String,
    /// Optional header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_text: Option<String>,
    /// Optional footer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
    /// Sections in display order
    pub sections: Vec<ListSection>,
    /// Variable receiving the chosen row title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    /// Sent before re-presenting the prompt when the reply matches no row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_choice_text: Option<String>,
}

/// Comparison operator of a condition rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    /// Equality (numeric when both sides are numbers)
    #[serde(rename = "==", alias = "equals", alias = "eq")]
    Equals,
    /// Inequality
    #[serde(rename = "!=", alias = "not_equals", alias = "neq")]
    NotEquals,
    /// Numeric greater-than
    #[serde(rename = ">", alias = "greater_than", alias = "gt")]
    GreaterThan,
    /// Numeric less-than
    #[serde(rename = "<", alias = "less_than", alias = "lt")]
    LessThan,
    /// Numeric greater-or-equal
    #[serde(rename = ">=", alias = "greater_or_equal", alias = "gte")]
    GreaterOrEqual,
    /// Numeric less-or-equal
    #[serde(rename = "<=", alias = "less_or_equal", alias = "lte")]
    LessOrEqual,
    /// Case-insensitive substring
    #[serde(rename = "contains")]
    Contains,
    /// Negated case-insensitive substring
    #[serde(rename = "not_contains")]
    NotContains,
}

fn empty_value() -> VariableValue {
    VariableValue::Text(String::new())
}

/// One `(variable, operator, value, target)` rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRule {
    /// Optional rule id, usable as an edge `sourceHandle`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Variable to test
    pub variable: String,
    /// Operator
    pub operator: ConditionOperator,
    /// Right-hand side
    #[serde(default = "empty_value")]
    pub value: VariableValue,
    /// Block to go to when the rule matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_block_id: Option<BlockId>,
}

/// Payload of a `condition` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionData {
    /// Rules, evaluated in order; the first match wins
    #[serde(default)]
    pub conditions: Vec<ConditionRule>,
    /// Target when no rule matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_next_block_id: Option<BlockId>,
}

fn default_increment() -> f64 {
    1.0
}

/// Payload of an `action` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "actionType", rename_all = "snake_case")]
pub enum FlowAction {
    /// Set a variable; text values support placeholders
    SetVariable {
        /// Variable name
        variable: String,
        /// New value
        value: VariableValue,
    },
    /// Add `amount` to a numeric variable (missing or non-numeric counts as 0)
    Increment {
        /// Variable name
        variable: String,
        /// Amount to add, negative to decrement
        #[serde(default = "default_increment")]
        amount: f64,
    },
    /// Remove a variable
    ClearVariable {
        /// Variable name
        variable: String,
    },
    /// Tag the contact in the CRM
    AddTag {
        /// Tag name
        tag: String,
    },
    /// Untag the contact in the CRM
    RemoveTag {
        /// Tag name
        tag: String,
    },
}

/// Payload of `ai_handoff` and `human_handoff` blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffData {
    /// Message sent before transferring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
    /// Agent, queue or department receiving the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Payload of an `end` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndData {
    /// Closing message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
}

/// Wire shape of a block as produced by the flow editor
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawBlock {
    id: BlockId,
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    data: Value,
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    block_type: &str,
    data: &Value,
    wrap: impl FnOnce(T) -> BlockKind,
) -> BlockKind {
    // Editors omit `data` for blocks without configuration
    let payload = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data.clone()
    };
    match serde_json::from_value::<T>(payload) {
        Ok(parsed) => wrap(parsed),
        Err(e) => BlockKind::Invalid {
            block_type: block_type.to_string(),
            reason: format!("invalid data for '{}' block: {}", block_type, e),
            data: data.clone(),
        },
    }
}

impl From<RawBlock> for FlowBlock {
    fn from(raw: RawBlock) -> Self {
        let RawBlock {
            id,
            block_type,
            data,
        } = raw;
        let kind = match block_type.as_str() {
            "start" => BlockKind::Start,
            "message" => parse_payload(&block_type, &data, BlockKind::Message),
            "interactive_list" => parse_payload(&block_type, &data, BlockKind::InteractiveList),
            "interactive_buttons" => {
                parse_payload(&block_type, &data, BlockKind::InteractiveButtons)
            }
            "condition" => parse_payload(&block_type, &data, BlockKind::Condition),
            "action" => parse_payload(&block_type, &data, BlockKind::Action),
            "ai_handoff" => parse_payload(&block_type, &data, BlockKind::AiHandoff),
            "human_handoff" => parse_payload(&block_type, &data, BlockKind::HumanHandoff),
            "end" => parse_payload(&block_type, &data, BlockKind::End),
            other => BlockKind::Invalid {
                block_type: other.to_string(),
                reason: format!("unknown block type '{}'", other),
                data,
            },
        };
        FlowBlock { id, kind }
    }
}

impl From<FlowBlock> for RawBlock {
    fn from(block: FlowBlock) -> Self {
        let block_type = block.kind.type_name().to_string();
        let data = match block.kind {
            BlockKind::Start => Value::Null,
            BlockKind::Message(d) => serde_json::to_value(d).unwrap_or_default(),
            BlockKind::InteractiveList(d) => serde_json::to_value(d).unwrap_or_default(),
            BlockKind::InteractiveButtons(d) => serde_json::to_value(d).unwrap_or_default(),
            BlockKind::Condition(d) => serde_json::to_value(d).unwrap_or_default(),
            BlockKind::Action(d) => serde_json::to_value(d).unwrap_or_default(),
            BlockKind::AiHandoff(d) | BlockKind::HumanHandoff(d) => {
                serde_json::to_value(d).unwrap_or_default()
            }
            BlockKind::End(d) => serde_json::to_value(d).unwrap_or_default(),
            BlockKind::Invalid { data, .. } => data,
        };
        RawBlock {
            id: block.id,
            block_type,
            data,
        }
    }
}
