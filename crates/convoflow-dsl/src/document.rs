use convoflow_core::{FlowId, InteractiveFlow};
use serde::{Deserialize, Serialize};

/// A parsed flow document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    /// The DSL version (e.g., "1.0")
    pub dsl_version: String,

    /// Flows in document order
    #[serde(default)]
    pub flows: Vec<InteractiveFlow>,
}

impl FlowDocument {
    /// Find a flow by id
    pub fn flow(&self, id: &FlowId) -> Option<&InteractiveFlow> {
        self.flows.iter().find(|f| &f.id == id)
    }

    /// The flow to use when the caller does not name one: the only flow, or
    /// the first one in the document
    pub fn default_flow(&self) -> Option<&InteractiveFlow> {
        self.flows.first()
    }
}

/// Document shape before the flows are typed. Flows stay untyped so a broken
/// flow is reported with its position instead of failing the whole file.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDocument {
    pub dsl_version: String,

    /// Tenant applied to flows that do not name one
    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub flows: Vec<serde_json::Value>,
}
