use convoflow_core::InteractiveFlow;
use serde_json::Value;

use crate::document::{FlowDocument, RawDocument};
use crate::error::DslError;
use crate::validation::{error_codes, ValidationError};

/// Supported DSL versions
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Source format of a flow document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// YAML (the default)
    Yaml,
    /// JSON as exported by the flow editor
    Json,
}

impl DocumentFormat {
    /// Guess the format from the first significant character
    pub fn detect(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('{') => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Parse a flow document without linting it.
///
/// Flows are typed one by one; a flow that does not have the expected shape
/// is reported with its index, together with every other broken flow.
pub fn parse_flow_document(text: &str) -> Result<FlowDocument, DslError> {
    let raw: RawDocument = match DocumentFormat::detect(text) {
        DocumentFormat::Json => serde_json::from_str(text)?,
        DocumentFormat::Yaml => serde_yaml::from_str(text)?,
    };

    if !SUPPORTED_VERSIONS.contains(&raw.dsl_version.as_str()) {
        return Err(DslError::UnsupportedVersion(raw.dsl_version));
    }

    let mut flows = Vec::with_capacity(raw.flows.len());
    let mut errors = Vec::new();

    for (index, mut value) in raw.flows.into_iter().enumerate() {
        let path = format!("flows[{}]", index);

        let Some(object) = value.as_object_mut() else {
            errors.push(ValidationError::new(
                error_codes::INVALID_FLOW_SHAPE,
                "flow must be a mapping",
                Some(path),
            ));
            continue;
        };

        if !object.contains_key("tenantId") {
            match &raw.tenant_id {
                Some(tenant) => {
                    object.insert("tenantId".to_string(), Value::String(tenant.clone()));
                }
                None => {
                    errors.push(ValidationError::new(
                        error_codes::MISSING_REQUIRED_FIELD,
                        "flow has no tenantId and the document sets no tenant_id",
                        Some(format!("{}.tenantId", path)),
                    ));
                    continue;
                }
            }
        }

        match serde_json::from_value::<InteractiveFlow>(value) {
            Ok(flow) => flows.push(flow),
            Err(err) => errors.push(ValidationError::new(
                error_codes::INVALID_FLOW_SHAPE,
                err.to_string(),
                Some(path),
            )),
        }
    }

    if !errors.is_empty() {
        return Err(DslError::from_validation_errors(errors));
    }

    Ok(FlowDocument {
        dsl_version: raw.dsl_version,
        flows,
    })
}
