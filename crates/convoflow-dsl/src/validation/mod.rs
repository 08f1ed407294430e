use convoflow_core::InteractiveFlow;
use std::collections::HashSet;
use std::error::Error;
use std::fmt;

use crate::document::FlowDocument;
use crate::error::DslError;

mod limits;
mod naming;
mod structure;

pub use limits::ProviderLimits;

/// A problem found in a flow document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Error code (one of [`error_codes`])
    pub code: &'static str,

    /// Human-readable error message
    pub message: String,

    /// Location of the problem (e.g., "flows[0].blocks[2]")
    pub path: Option<String>,
}

impl ValidationError {
    /// Create a validation error
    pub fn new(code: &'static str, message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} (at {})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl Error for ValidationError {}

/// Validation error codes
pub mod error_codes {
    /// Edge or target naming a block that does not exist
    pub const INVALID_REFERENCE: &str = "ERR_DSL_VALIDATION_INVALID_REFERENCE";

    /// Duplicate flow or block id
    pub const DUPLICATE_ID: &str = "ERR_DSL_VALIDATION_DUPLICATE_ID";

    /// Start block missing or not of type `start`
    pub const INVALID_START_BLOCK: &str = "ERR_DSL_VALIDATION_INVALID_START_BLOCK";

    /// Unknown block type or malformed block data
    pub const INVALID_BLOCK: &str = "ERR_DSL_VALIDATION_INVALID_BLOCK";

    /// Edge handle naming no option or condition of its source block
    pub const UNKNOWN_HANDLE: &str = "ERR_DSL_VALIDATION_UNKNOWN_HANDLE";

    /// Condition rule without any way to reach a target
    pub const MISSING_TARGET: &str = "ERR_DSL_VALIDATION_MISSING_TARGET";

    /// Limit imposed by the messaging provider exceeded
    pub const PROVIDER_LIMIT: &str = "ERR_DSL_VALIDATION_PROVIDER_LIMIT";

    /// Keyword trigger without keywords
    pub const MISSING_KEYWORDS: &str = "ERR_DSL_VALIDATION_MISSING_KEYWORDS";

    /// Variable name that placeholders cannot reference
    pub const INVALID_VARIABLE_NAME: &str = "ERR_DSL_VALIDATION_INVALID_VARIABLE_NAME";

    /// Flow that does not have the expected shape
    pub const INVALID_FLOW_SHAPE: &str = "ERR_DSL_VALIDATION_INVALID_FLOW_SHAPE";

    /// Missing required field
    pub const MISSING_REQUIRED_FIELD: &str = "ERR_DSL_VALIDATION_MISSING_REQUIRED_FIELD";
}

/// A lint over one flow
pub trait Validator {
    /// Validate a flow located at `path` and return the problems found
    fn validate(&self, flow: &InteractiveFlow, path: &str) -> Vec<ValidationError>;
}

fn validators() -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(structure::StructureValidator::new()),
        Box::new(limits::LimitsValidator::new(ProviderLimits::default())),
        Box::new(naming::NamingValidator::new()),
    ]
}

/// Run every lint over a single flow
pub fn lint_flow(flow: &InteractiveFlow, path: &str) -> Vec<ValidationError> {
    validators()
        .iter()
        .flat_map(|validator| validator.validate(flow, path))
        .collect()
}

/// Run every lint over a document, returning all problems
pub fn lint_document(document: &FlowDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::with_capacity(document.flows.len());

    for (index, flow) in document.flows.iter().enumerate() {
        let path = format!("flows[{}]", index);
        if !seen.insert((&flow.tenant_id, &flow.id)) {
            errors.push(ValidationError::new(
                error_codes::DUPLICATE_ID,
                format!(
                    "Duplicate flow id '{}' for tenant '{}'",
                    flow.id, flow.tenant_id
                ),
                Some(format!("{}.id", path)),
            ));
        }
        errors.extend(lint_flow(flow, &path));
    }

    errors
}

/// Validate a parsed document
pub fn validate_document(document: &FlowDocument) -> Result<(), DslError> {
    let errors = lint_document(document);
    if !errors.is_empty() {
        return Err(DslError::from_validation_errors(errors));
    }
    Ok(())
}
