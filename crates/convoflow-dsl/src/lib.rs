//! # Convoflow DSL
//!
//! Authoring format for interactive flows. A document carries a version, an
//! optional default tenant, and the flows in the same camelCase shape the
//! flow editor exports:
//!
//! ```
//! use convoflow_dsl::parse_and_validate_flow_document;
//!
//! let yaml = r#"
//! dsl_version: "1.0"
//! tenant_id: acme
//! flows:
//!   - id: welcome
//!     name: Welcome
//!     triggerType: keyword
//!     triggerKeywords: [hello, hi]
//!     startBlockId: start
//!     blocks:
//!       - { id: start, type: start }
//!       - id: greet
//!         type: message
//!         data: { messageText: "Hello!" }
//!       - { id: done, type: end }
//!     edges:
//!       - { source: start, target: greet }
//!       - { source: greet, target: done }
//! "#;
//!
//! let document = parse_and_validate_flow_document(yaml).unwrap();
//! assert_eq!(document.flows.len(), 1);
//! ```
//!
//! Parsing reports every malformed flow at once; linting then checks graph
//! integrity, provider limits and naming, again collecting every problem.

mod document;
mod error;
mod parser;

pub mod validation;

pub use document::FlowDocument;
pub use error::DslError;
pub use parser::{parse_flow_document, DocumentFormat, SUPPORTED_VERSIONS};
pub use validation::{lint_document, lint_flow, validate_document, ValidationError};

/// Parse and lint a flow document.
///
/// # Errors
///
/// * Invalid YAML or JSON syntax
/// * Unsupported DSL version
/// * Flows that do not have the expected shape
/// * Lint failures (dangling references, provider limits, naming)
///
/// ```
/// use convoflow_dsl::parse_and_validate_flow_document;
///
/// let yaml = r#"
/// dsl_version: "1.0"
/// tenant_id: acme
/// flows:
///   - id: broken
///     name: Broken
///     triggerType: manual
///     startBlockId: start
///     blocks:
///       - { id: start, type: start }
///     edges:
///       - { source: start, target: nowhere }
/// "#;
///
/// let error = parse_and_validate_flow_document(yaml).unwrap_err();
/// assert!(error.error_code().contains("INVALID_REFERENCE"));
/// ```
pub fn parse_and_validate_flow_document(text: &str) -> Result<FlowDocument, DslError> {
    let document = parse_flow_document(text)?;
    validate_document(&document)?;
    Ok(document)
}

/// Version of the convoflow DSL crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
