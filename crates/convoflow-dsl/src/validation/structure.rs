use convoflow_core::{BlockKind, InteractiveFlow};
use std::collections::{HashMap, HashSet};

use crate::validation::{error_codes, ValidationError, Validator};

/// Graph integrity: ids, start block, edges, targets and handles
pub struct StructureValidator {}

impl StructureValidator {
    /// Create a new structure validator
    pub fn new() -> Self {
        StructureValidator {}
    }

    fn validate_block_ids(&self, flow: &InteractiveFlow, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::with_capacity(flow.blocks.len());

        for (index, block) in flow.blocks.iter().enumerate() {
            if !seen.insert(&block.id) {
                errors.push(ValidationError::new(
                    error_codes::DUPLICATE_ID,
                    format!(
                        "Duplicate block ID: '{}' - block IDs must be unique within a flow",
                        block.id
                    ),
                    Some(format!("{}.blocks[{}]", path, index)),
                ));
            }
        }

        errors
    }

    fn validate_start_block(&self, flow: &InteractiveFlow, path: &str) -> Vec<ValidationError> {
        let message = match flow.block(&flow.start_block_id) {
            None => format!("Start block '{}' does not exist", flow.start_block_id),
            Some(block) if block.kind != BlockKind::Start => format!(
                "Start block '{}' has type '{}', expected 'start'",
                block.id,
                block.type_name()
            ),
            Some(_) => return Vec::new(),
        };
        vec![ValidationError::new(
            error_codes::INVALID_START_BLOCK,
            message,
            Some(format!("{}.startBlockId", path)),
        )]
    }

    fn validate_blocks(&self, flow: &InteractiveFlow, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (index, block) in flow.blocks.iter().enumerate() {
            let block_path = format!("{}.blocks[{}]", path, index);
            let dangling = |what: String, target: &convoflow_core::BlockId| {
                ValidationError::new(
                    error_codes::INVALID_REFERENCE,
                    format!("{} points to unknown block '{}'", what, target),
                    Some(block_path.clone()),
                )
            };

            match &block.kind {
                BlockKind::Invalid { reason, .. } => {
                    errors.push(ValidationError::new(
                        error_codes::INVALID_BLOCK,
                        format!("Block '{}': {}", block.id, reason),
                        Some(block_path.clone()),
                    ));
                }
                BlockKind::Condition(data) => {
                    for (i, rule) in data.conditions.iter().enumerate() {
                        match (&rule.target_block_id, &rule.id) {
                            (Some(target), _) => {
                                if flow.block(target).is_none() {
                                    errors.push(dangling(format!("Condition #{}", i + 1), target));
                                }
                            }
                            (None, Some(handle))
                                if flow.edge_for_handle(&block.id, handle).is_some() => {}
                            (None, _) => errors.push(ValidationError::new(
                                error_codes::MISSING_TARGET,
                                format!(
                                    "Condition #{} of block '{}' has neither targetBlockId nor an edge keyed by its id",
                                    i + 1,
                                    block.id
                                ),
                                Some(format!("{}.data.conditions[{}]", block_path, i)),
                            )),
                        }
                    }
                    if let Some(target) = &data.default_next_block_id {
                        if flow.block(target).is_none() {
                            errors.push(dangling("Default branch".to_string(), target));
                        }
                    }
                }
                kind if kind.is_interactive() => {
                    let options = kind.choice_options();
                    if options.is_empty() {
                        errors.push(ValidationError::new(
                            error_codes::MISSING_REQUIRED_FIELD,
                            format!("Interactive block '{}' has no options", block.id),
                            Some(block_path.clone()),
                        ));
                    }
                    let plain_exit = flow
                        .outgoing_edges(&block.id)
                        .any(|e| e.source_handle.is_none());
                    let mut ids = HashSet::with_capacity(options.len());
                    for option in &options {
                        if !ids.insert(option.id) {
                            errors.push(ValidationError::new(
                                error_codes::DUPLICATE_ID,
                                format!(
                                    "Duplicate option ID '{}' in block '{}'",
                                    option.id, block.id
                                ),
                                Some(block_path.clone()),
                            ));
                        }
                        match option.next_block_id {
                            Some(target) => {
                                if flow.block(target).is_none() {
                                    errors.push(dangling(format!("Option '{}'", option.id), target));
                                }
                            }
                            None if plain_exit => {}
                            None if flow.edge_for_handle(&block.id, option.id).is_some() => {}
                            None => errors.push(ValidationError::new(
                                error_codes::MISSING_TARGET,
                                format!(
                                    "Option '{}' of block '{}' has neither nextBlockId nor an edge keyed by its id",
                                    option.id, block.id
                                ),
                                Some(block_path.clone()),
                            )),
                        }
                    }
                }
                _ => {}
            }
        }

        errors
    }

    fn validate_edges(&self, flow: &InteractiveFlow, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let blocks: HashMap<_, _> = flow.blocks.iter().map(|b| (&b.id, b)).collect();

        for (index, edge) in flow.edges.iter().enumerate() {
            let edge_path = Some(format!("{}.edges[{}]", path, index));

            if !blocks.contains_key(&edge.target) {
                errors.push(ValidationError::new(
                    error_codes::INVALID_REFERENCE,
                    format!("Edge points to unknown block '{}'", edge.target),
                    edge_path.clone(),
                ));
            }

            let Some(source) = blocks.get(&edge.source) else {
                errors.push(ValidationError::new(
                    error_codes::INVALID_REFERENCE,
                    format!("Edge leaves unknown block '{}'", edge.source),
                    edge_path,
                ));
                continue;
            };

            let Some(handle) = &edge.source_handle else {
                continue;
            };
            let known = match &source.kind {
                BlockKind::Condition(data) => data
                    .conditions
                    .iter()
                    .any(|rule| rule.id.as_deref() == Some(handle.as_str())),
                kind if kind.is_interactive() => {
                    kind.choice_options().iter().any(|o| o.id == handle.as_str())
                }
                // Other blocks have a single exit; the handle is cosmetic
                _ => true,
            };
            if !known {
                errors.push(ValidationError::new(
                    error_codes::UNKNOWN_HANDLE,
                    format!(
                        "Edge handle '{}' names no option or condition of block '{}'",
                        handle, edge.source
                    ),
                    edge_path,
                ));
            }
        }

        errors
    }
}

impl Validator for StructureValidator {
    fn validate(&self, flow: &InteractiveFlow, path: &str) -> Vec<ValidationError> {
        let mut errors = self.validate_block_ids(flow, path);
        errors.extend(self.validate_start_block(flow, path));
        errors.extend(self.validate_blocks(flow, path));
        errors.extend(self.validate_edges(flow, path));
        errors
    }
}
