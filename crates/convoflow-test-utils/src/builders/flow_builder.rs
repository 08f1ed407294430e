use chrono::{DateTime, Utc};

use convoflow_core::domain::block::{
    ButtonOption, ButtonsData, ConditionData, ConditionOperator, ConditionRule, EndData, FlowAction,
    HandoffData, ListData, ListRow, ListSection, MessageData,
};
use convoflow_core::{BlockId, BlockKind, FlowBlock, FlowEdge, InteractiveFlow, TriggerType, VariableValue};

/// A condition rule routing to `target`
pub fn rule(
    variable: &str,
    operator: ConditionOperator,
    value: impl Into<VariableValue>,
    target: &str,
) -> ConditionRule {
    ConditionRule {
        id: None,
        variable: variable.to_string(),
        operator,
        value: value.into(),
        target_block_id: Some(BlockId::from(target)),
    }
}

/// Fluent builder for [`InteractiveFlow`]s.
///
/// The flow starts with a `start` block named "start" and a manual trigger.
/// Interactive options route through handle edges added with
/// [`FlowBuilder::route`].
///
/// ```
/// use convoflow_test_utils::FlowBuilder;
///
/// let flow = FlowBuilder::new("menu", "acme")
///     .keywords(&["menu"])
///     .message("hi", "Hi!")
///     .buttons("pick", "Pick one", &[("A", "Done"), ("B", "Agent")])
///     .end("done")
///     .human_handoff("agent")
///     .chain(&["start", "hi", "pick"])
///     .route("pick", "A", "done")
///     .route("pick", "B", "agent")
///     .build();
/// assert!(flow.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct FlowBuilder {
    flow: InteractiveFlow,
}

impl FlowBuilder {
    /// Start a flow with a `start` block
    pub fn new(id: &str, tenant_id: &str) -> Self {
        let mut flow = InteractiveFlow::new(id, tenant_id, id, TriggerType::Manual, "start");
        flow.blocks.push(FlowBlock::new("start", BlockKind::Start));
        Self { flow }
    }

    /// Display name
    pub fn name(mut self, name: &str) -> Self {
        self.flow.name = name.to_string();
        self
    }

    /// Trigger on every inbound message
    pub fn always(mut self) -> Self {
        self.flow.trigger_type = TriggerType::Always;
        self
    }

    /// Trigger on any of the keywords
    pub fn keywords(mut self, keywords: &[&str]) -> Self {
        self.flow.trigger_type = TriggerType::Keyword;
        self.flow.trigger_keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Stored but not triggerable
    pub fn inactive(mut self) -> Self {
        self.flow.is_active = false;
        self
    }

    /// Creation time, which orders competing triggers
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.flow.created_at = at;
        self.flow.updated_at = at;
        self
    }

    /// Add any block
    pub fn block(mut self, id: &str, kind: BlockKind) -> Self {
        self.flow.blocks.push(FlowBlock::new(id, kind));
        self
    }

    /// `message` block
    pub fn message(self, id: &str, text: &str) -> Self {
        self.block(
            id,
            BlockKind::Message(MessageData {
                message_text: text.to_string(),
            }),
        )
    }

    /// `interactive_buttons` block from `(id, title)` pairs
    pub fn buttons(self, id: &str, body: &str, options: &[(&str, &str)]) -> Self {
        self.block(
            id,
            BlockKind::InteractiveButtons(ButtonsData {
                body_text: body.to_string(),
                header_text: None,
                footer_text: None,
                buttons: options
                    .iter()
                    .map(|(id, title)| ButtonOption {
                        id: id.to_string(),
                        title: title.to_string(),
                        next_block_id: None,
                    })
                    .collect(),
                variable_name: None,
                invalid_choice_text: None,
            }),
        )
    }

    /// `interactive_list` block with one section of `(id, title)` rows
    pub fn list(self, id: &str, body: &str, rows: &[(&str, &str)]) -> Self {
        self.block(
            id,
            BlockKind::InteractiveList(ListData {
                body_text: body.to_string(),
                button_text: "Options".to_string(),
                header_text: None,
                footer_text: None,
                sections: vec![ListSection {
                    title: "Options".to_string(),
                    rows: rows
                        .iter()
                        .map(|(id, title)| ListRow {
                            id: id.to_string(),
                            title: title.to_string(),
                            description: None,
                            next_block_id: None,
                        })
                        .collect(),
                }],
                variable_name: None,
                invalid_choice_text: None,
            }),
        )
    }

    /// Store the chosen option title of interactive block `id` in `variable`
    pub fn capture(mut self, id: &str, variable: &str) -> Self {
        let target = BlockId::from(id);
        if let Some(block) = self.flow.blocks.iter_mut().find(|b| b.id == target) {
            match &mut block.kind {
                BlockKind::InteractiveButtons(data) => data.variable_name = Some(variable.to_string()),
                BlockKind::InteractiveList(data) => data.variable_name = Some(variable.to_string()),
                _ => {}
            }
        }
        self
    }

    /// `condition` block
    pub fn condition(self, id: &str, rules: Vec<ConditionRule>, default: Option<&str>) -> Self {
        self.block(
            id,
            BlockKind::Condition(ConditionData {
                conditions: rules,
                default_next_block_id: default.map(BlockId::from),
            }),
        )
    }

    /// `action` block setting a variable
    pub fn set_variable(self, id: &str, variable: &str, value: impl Into<VariableValue>) -> Self {
        self.block(
            id,
            BlockKind::Action(FlowAction::SetVariable {
                variable: variable.to_string(),
                value: value.into(),
            }),
        )
    }

    /// `action` block adding `amount` to a variable
    pub fn increment(self, id: &str, variable: &str, amount: f64) -> Self {
        self.block(
            id,
            BlockKind::Action(FlowAction::Increment {
                variable: variable.to_string(),
                amount,
            }),
        )
    }

    /// `action` block tagging the contact
    pub fn add_tag(self, id: &str, tag: &str) -> Self {
        self.block(id, BlockKind::Action(FlowAction::AddTag { tag: tag.to_string() }))
    }

    /// `end` block
    pub fn end(self, id: &str) -> Self {
        self.block(id, BlockKind::End(EndData::default()))
    }

    /// `ai_handoff` block
    pub fn ai_handoff(self, id: &str) -> Self {
        self.block(id, BlockKind::AiHandoff(HandoffData::default()))
    }

    /// `human_handoff` block
    pub fn human_handoff(self, id: &str) -> Self {
        self.block(id, BlockKind::HumanHandoff(HandoffData::default()))
    }

    /// Plain edge
    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.flow.edges.push(FlowEdge::new(source, target));
        self
    }

    /// Plain edges between consecutive blocks
    pub fn chain(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.flow.edges.push(FlowEdge::new(pair[0], pair[1]));
        }
        self
    }

    /// Edge leaving `source` through the option or rule `handle`
    pub fn route(mut self, source: &str, handle: &str, target: &str) -> Self {
        self.flow.edges.push(FlowEdge::with_handle(source, handle, target));
        self
    }

    /// Finish
    pub fn build(self) -> InteractiveFlow {
        self.flow
    }
}
