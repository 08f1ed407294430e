//! Matching inbound replies against the options of an interactive block.

use crate::domain::block::ChoiceOption;
use crate::domain::flow_definition::InteractiveFlow;
use crate::domain::identifiers::BlockId;

use super::UserInput;

/// Find the option the reply selects.
///
/// The provider's choice id is matched against option ids first. Without
/// one, typed text may name an option by id or by title (case-insensitive).
pub fn match_option<'a>(
    options: &[ChoiceOption<'a>],
    input: &UserInput,
) -> Option<ChoiceOption<'a>> {
    if let Some(choice_id) = input.choice_id.as_deref() {
        if let Some(option) = options.iter().find(|o| o.id == choice_id) {
            return Some(*option);
        }
    }

    let text = input.text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(option) = options.iter().find(|o| o.id == text) {
        return Some(*option);
    }

    let lowered = text.to_lowercase();
    options
        .iter()
        .find(|o| o.title.trim().to_lowercase() == lowered)
        .copied()
}

/// Target of a chosen option: the edge keyed by the option id, the option's
/// inline target, then the block's unnamed edge.
pub fn option_target(
    flow: &InteractiveFlow,
    block_id: &BlockId,
    option: &ChoiceOption<'_>,
) -> Option<BlockId> {
    if let Some(edge) = flow.edge_for_handle(block_id, option.id) {
        return Some(edge.target.clone());
    }
    if let Some(target) = option.next_block_id {
        return Some(target.clone());
    }
    flow.outgoing_edges(block_id)
        .find(|e| e.source_handle.is_none())
        .map(|e| e.target.clone())
}
