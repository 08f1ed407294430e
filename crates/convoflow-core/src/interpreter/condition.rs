//! Ordered evaluation of condition rules.

use crate::domain::block::{ConditionData, ConditionOperator, ConditionRule};
use crate::domain::flow_definition::InteractiveFlow;
use crate::domain::identifiers::BlockId;
use crate::domain::variables::{VariableValue, Variables};

/// Evaluate one rule against the variables.
///
/// A missing variable compares as the empty string. Ordering operators need
/// both sides to be numeric and are false otherwise.
pub fn evaluate(rule: &ConditionRule, variables: &Variables) -> bool {
    let empty = VariableValue::Text(String::new());
    let left = variables.get(&rule.variable).unwrap_or(&empty);
    let right = &rule.value;

    match rule.operator {
        ConditionOperator::Equals => equals(left, right),
        ConditionOperator::NotEquals => !equals(left, right),
        ConditionOperator::GreaterThan => compare(left, right, |a, b| a > b),
        ConditionOperator::LessThan => compare(left, right, |a, b| a < b),
        ConditionOperator::GreaterOrEqual => compare(left, right, |a, b| a >= b),
        ConditionOperator::LessOrEqual => compare(left, right, |a, b| a <= b),
        ConditionOperator::Contains => contains(left, right),
        ConditionOperator::NotContains => !contains(left, right),
    }
}

fn equals(left: &VariableValue, right: &VariableValue) -> bool {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => left.render().trim().to_lowercase() == right.render().trim().to_lowercase(),
    }
}

fn compare(left: &VariableValue, right: &VariableValue, op: impl Fn(f64, f64) -> bool) -> bool {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn contains(left: &VariableValue, right: &VariableValue) -> bool {
    left.render()
        .to_lowercase()
        .contains(&right.render().to_lowercase())
}

/// Where a condition block routes, or `Ok(None)` when it has no exit at all.
///
/// The first matching rule wins. Without a match the block falls to
/// `defaultNextBlockId`, then to its unnamed outgoing edge.
pub fn select_branch(
    flow: &InteractiveFlow,
    block_id: &BlockId,
    data: &ConditionData,
    variables: &Variables,
) -> Result<Option<BlockId>, String> {
    for (index, rule) in data.conditions.iter().enumerate() {
        if !evaluate(rule, variables) {
            continue;
        }
        if let Some(target) = &rule.target_block_id {
            return Ok(Some(target.clone()));
        }
        if let Some(edge) = rule
            .id
            .as_deref()
            .and_then(|handle| flow.edge_for_handle(block_id, handle))
        {
            return Ok(Some(edge.target.clone()));
        }
        return Err(format!(
            "condition #{} of block '{}' matched but has no target",
            index + 1,
            block_id
        ));
    }

    if let Some(target) = &data.default_next_block_id {
        return Ok(Some(target.clone()));
    }

    Ok(flow
        .outgoing_edges(block_id)
        .find(|e| e.source_handle.is_none())
        .map(|e| e.target.clone()))
}
