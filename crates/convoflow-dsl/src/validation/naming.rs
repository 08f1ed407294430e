use convoflow_core::domain::block::FlowAction;
use convoflow_core::{BlockKind, InteractiveFlow, TriggerType};
use lazy_static::lazy_static;
use regex::Regex;

use crate::validation::{error_codes, ValidationError, Validator};

lazy_static! {
    // Same shape `{{ name }}` placeholders accept
    static ref VARIABLE_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("variable name pattern is valid");
}

/// Trigger keywords and variable names
pub struct NamingValidator {}

impl NamingValidator {
    /// Create a new naming validator
    pub fn new() -> Self {
        NamingValidator {}
    }
}

fn variables_of(kind: &BlockKind) -> Vec<&str> {
    match kind {
        BlockKind::InteractiveButtons(data) => data.variable_name.iter().map(String::as_str).collect(),
        BlockKind::InteractiveList(data) => data.variable_name.iter().map(String::as_str).collect(),
        BlockKind::Condition(data) => data.conditions.iter().map(|r| r.variable.as_str()).collect(),
        BlockKind::Action(
            FlowAction::SetVariable { variable, .. }
            | FlowAction::Increment { variable, .. }
            | FlowAction::ClearVariable { variable },
        ) => vec![variable.as_str()],
        _ => Vec::new(),
    }
}

impl Validator for NamingValidator {
    fn validate(&self, flow: &InteractiveFlow, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if flow.trigger_type == TriggerType::Keyword
            && flow.trigger_keywords.iter().all(|k| k.trim().is_empty())
        {
            errors.push(ValidationError::new(
                error_codes::MISSING_KEYWORDS,
                format!("Keyword flow '{}' has no keywords and can never start", flow.id),
                Some(format!("{}.triggerKeywords", path)),
            ));
        }

        for (index, block) in flow.blocks.iter().enumerate() {
            for name in variables_of(&block.kind) {
                if !VARIABLE_NAME.is_match(name) {
                    errors.push(ValidationError::new(
                        error_codes::INVALID_VARIABLE_NAME,
                        format!("Invalid variable name '{}' in block '{}'", name, block.id),
                        Some(format!("{}.blocks[{}]", path, index)),
                    ));
                }
            }
        }

        errors
    }
}
