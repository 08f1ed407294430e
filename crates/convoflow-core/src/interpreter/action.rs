use crate::domain::block::FlowAction;
use crate::domain::variables::{interpolate, VariableValue, Variables};

use super::SideEffect;

/// Side effect of an action block, computed from the current variables
pub fn effect_of(action: &FlowAction, variables: &Variables) -> SideEffect {
    match action {
        FlowAction::SetVariable { variable, value } => {
            let value = match value {
                VariableValue::Text(text) => VariableValue::Text(interpolate(text, variables)),
                other => other.clone(),
            };
            SideEffect::SetVariable {
                name: variable.clone(),
                value,
            }
        }
        FlowAction::Increment { variable, amount } => {
            let current = variables
                .get(variable)
                .and_then(VariableValue::as_number)
                .unwrap_or(0.0);
            SideEffect::SetVariable {
                name: variable.clone(),
                value: VariableValue::Number(current + amount),
            }
        }
        FlowAction::ClearVariable { variable } => SideEffect::ClearVariable {
            name: variable.clone(),
        },
        FlowAction::AddTag { tag } => SideEffect::AddTag { tag: tag.clone() },
        FlowAction::RemoveTag { tag } => SideEffect::RemoveTag { tag: tag.clone() },
    }
}
