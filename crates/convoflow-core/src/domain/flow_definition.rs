use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::block::{BlockKind, FlowBlock};
use super::identifiers::{BlockId, FlowId, TenantId};
use crate::CoreError;

/// Condition under which a flow may start for a contact without an active execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Starts on any inbound message
    Always,
    /// Starts when the inbound text contains one of the trigger keywords
    Keyword,
    /// Started from a scanned QR code
    QrCode,
    /// Started from a deep link
    Link,
    /// Started explicitly by an operator or an API call
    Manual,
}

impl TriggerType {
    /// Wire name of the trigger type
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Always => "always",
            TriggerType::Keyword => "keyword",
            TriggerType::QrCode => "qr_code",
            TriggerType::Link => "link",
            TriggerType::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed connection between two blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    /// Edge id
    #[serde(default)]
    pub id: String,

    /// Source block
    pub source: BlockId,

    /// Target block
    pub target: BlockId,

    /// Named exit of the source block (button id, row id, condition id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,

    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FlowEdge {
    /// Create an edge without a handle
    pub fn new(source: impl Into<BlockId>, target: impl Into<BlockId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            source_handle: None,
            label: None,
        }
    }

    /// Create an edge leaving through a named exit
    pub fn with_handle(
        source: impl Into<BlockId>,
        handle: impl Into<String>,
        target: impl Into<BlockId>,
    ) -> Self {
        let handle = handle.into();
        let mut edge = Self::new(source, target);
        edge.id = format!("{}:{}->{}", edge.source, handle, edge.target);
        edge.source_handle = Some(handle);
        edge
    }
}

/// Aggregate: an authored interactive flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveFlow {
    /// Flow id
    pub id: FlowId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Human-readable name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Only active flows are considered by the engine
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Trigger kind
    pub trigger_type: TriggerType,

    /// Keywords, used only for keyword triggers
    #[serde(default)]
    pub trigger_keywords: Vec<String>,

    /// Graph nodes
    pub blocks: Vec<FlowBlock>,

    /// Graph edges
    #[serde(default)]
    pub edges: Vec<FlowEdge>,

    /// Entry block, must be a `start` block
    pub start_block_id: BlockId,

    /// Creation timestamp, used as the trigger tie-break
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl InteractiveFlow {
    /// Create an empty active flow
    pub fn new(
        id: impl Into<FlowId>,
        tenant_id: impl Into<TenantId>,
        name: impl Into<String>,
        trigger_type: TriggerType,
        start_block_id: impl Into<BlockId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            description: None,
            is_active: true,
            trigger_type,
            trigger_keywords: Vec::new(),
            blocks: Vec::new(),
            edges: Vec::new(),
            start_block_id: start_block_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a block by id
    pub fn block(&self, id: &BlockId) -> Option<&FlowBlock> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    /// Edges leaving a block, in definition order
    pub fn outgoing_edges<'a: 'b, 'b>(
        &'a self,
        id: &'b BlockId,
    ) -> impl Iterator<Item = &'a FlowEdge> + 'b {
        self.edges.iter().filter(move |e| &e.source == id)
    }

    /// The default exit of a block: the first edge without a handle, or the
    /// only edge when the block has exactly one.
    pub fn plain_edge(&self, id: &BlockId) -> Option<&FlowEdge> {
        if let Some(edge) = self.outgoing_edges(id).find(|e| e.source_handle.is_none()) {
            return Some(edge);
        }
        let mut edges = self.outgoing_edges(id);
        match (edges.next(), edges.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    /// Edge leaving a block through the named exit
    pub fn edge_for_handle(&self, id: &BlockId, handle: &str) -> Option<&FlowEdge> {
        self.outgoing_edges(id)
            .find(|e| e.source_handle.as_deref() == Some(handle))
    }

    /// Whether the inbound text contains any trigger keyword (case-insensitive)
    pub fn matches_keyword(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.trigger_keywords.iter().any(|keyword| {
            let keyword = keyword.trim().to_lowercase();
            !keyword.is_empty() && text.contains(&keyword)
        })
    }

    /// Structural problems that make the flow unsafe to run
    pub fn definition_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut ids = HashSet::with_capacity(self.blocks.len());

        for block in &self.blocks {
            if !ids.insert(&block.id) {
                errors.push(format!("duplicate block id '{}'", block.id));
            }
        }

        match self.block(&self.start_block_id) {
            None => errors.push(format!(
                "start block '{}' does not exist",
                self.start_block_id
            )),
            Some(block) if block.kind != BlockKind::Start => errors.push(format!(
                "start block '{}' has type '{}', expected 'start'",
                self.start_block_id,
                block.type_name()
            )),
            Some(_) => {}
        }

        for edge in &self.edges {
            if !ids.contains(&edge.source) {
                errors.push(format!(
                    "edge '{}' leaves unknown block '{}'",
                    edge.id, edge.source
                ));
            }
            if !ids.contains(&edge.target) {
                errors.push(format!(
                    "edge '{}' points to unknown block '{}'",
                    edge.id, edge.target
                ));
            }
        }

        for block in &self.blocks {
            let mut targets: Vec<(&BlockId, &str)> = Vec::new();
            match &block.kind {
                BlockKind::Invalid { reason, .. } => {
                    errors.push(format!("block '{}': {}", block.id, reason));
                }
                BlockKind::Condition(data) => {
                    for (index, rule) in data.conditions.iter().enumerate() {
                        match (&rule.target_block_id, &rule.id) {
                            (Some(target), _) => targets.push((target, "condition")),
                            (None, Some(handle))
                                if self.edge_for_handle(&block.id, handle).is_some() => {}
                            (None, _) => errors.push(format!(
                                "block '{}' condition #{} has no target",
                                block.id,
                                index + 1
                            )),
                        }
                    }
                    if let Some(target) = &data.default_next_block_id {
                        targets.push((target, "default branch"));
                    }
                }
                kind if kind.is_interactive() => {
                    let plain_exit = self
                        .outgoing_edges(&block.id)
                        .any(|e| e.source_handle.is_none());
                    for option in kind.choice_options() {
                        match option.next_block_id {
                            Some(target) => targets.push((target, "option")),
                            None if plain_exit => {}
                            None if self.edge_for_handle(&block.id, option.id).is_some() => {}
                            None => errors.push(format!(
                                "block '{}' option '{}' has no route",
                                block.id, option.id
                            )),
                        }
                    }
                }
                _ => {}
            }

            for (target, what) in targets {
                if !ids.contains(target) {
                    errors.push(format!(
                        "block '{}' {} points to unknown block '{}'",
                        block.id, what, target
                    ));
                }
            }
        }

        errors
    }

    /// Check the flow is structurally sound
    pub fn validate(&self) -> Result<(), CoreError> {
        let errors = self.definition_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::DefinitionError(format!(
                "flow '{}': {}",
                self.id,
                errors.join("; ")
            )))
        }
    }
}
