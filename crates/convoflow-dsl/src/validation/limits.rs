use convoflow_core::{BlockKind, InteractiveFlow};

use crate::validation::{error_codes, ValidationError, Validator};

/// Size limits of WhatsApp interactive messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderLimits {
    /// Reply buttons per message
    pub max_buttons: usize,
    /// Characters per button title
    pub max_button_title: usize,
    /// Rows across all sections of a list
    pub max_list_rows: usize,
    /// Characters per row title
    pub max_row_title: usize,
    /// Characters of the button that opens a list
    pub max_list_button_text: usize,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            max_buttons: 3,
            max_button_title: 20,
            max_list_rows: 10,
            max_row_title: 24,
            max_list_button_text: 20,
        }
    }
}

/// Rejects prompts the provider would refuse to deliver
pub struct LimitsValidator {
    limits: ProviderLimits,
}

impl LimitsValidator {
    /// Create a validator enforcing `limits`
    pub fn new(limits: ProviderLimits) -> Self {
        Self { limits }
    }

    fn too_long(&self, what: &str, text: &str, max: usize, path: String) -> Option<ValidationError> {
        let len = text.chars().count();
        (len > max).then(|| {
            ValidationError::new(
                error_codes::PROVIDER_LIMIT,
                format!("{} '{}' has {} characters, the limit is {}", what, text, len, max),
                Some(path),
            )
        })
    }
}

impl Validator for LimitsValidator {
    fn validate(&self, flow: &InteractiveFlow, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (index, block) in flow.blocks.iter().enumerate() {
            let block_path = format!("{}.blocks[{}]", path, index);
            match &block.kind {
                BlockKind::InteractiveButtons(data) => {
                    if data.buttons.len() > self.limits.max_buttons {
                        errors.push(ValidationError::new(
                            error_codes::PROVIDER_LIMIT,
                            format!(
                                "Block '{}' has {} buttons, the limit is {}",
                                block.id,
                                data.buttons.len(),
                                self.limits.max_buttons
                            ),
                            Some(block_path.clone()),
                        ));
                    }
                    for (i, button) in data.buttons.iter().enumerate() {
                        errors.extend(self.too_long(
                            "Button title",
                            &button.title,
                            self.limits.max_button_title,
                            format!("{}.data.buttons[{}]", block_path, i),
                        ));
                    }
                }
                BlockKind::InteractiveList(data) => {
                    let rows: usize = data.sections.iter().map(|s| s.rows.len()).sum();
                    if rows > self.limits.max_list_rows {
                        errors.push(ValidationError::new(
                            error_codes::PROVIDER_LIMIT,
                            format!(
                                "Block '{}' has {} list rows, the limit is {}",
                                block.id, rows, self.limits.max_list_rows
                            ),
                            Some(block_path.clone()),
                        ));
                    }
                    errors.extend(self.too_long(
                        "List button",
                        &data.button_text,
                        self.limits.max_list_button_text,
                        format!("{}.data.buttonText", block_path),
                    ));
                    for (s, section) in data.sections.iter().enumerate() {
                        for (r, row) in section.rows.iter().enumerate() {
                            errors.extend(self.too_long(
                                "Row title",
                                &row.title,
                                self.limits.max_row_title,
                                format!("{}.data.sections[{}].rows[{}]", block_path, s, r),
                            ));
                        }
                    }
                }
                _ => {}
            }
        }

        errors
    }
}
