//! Interfaces of the external systems the executor calls out to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::flow_execution::ServicingMode;
use super::identifiers::{ContactId, TenantId};
use crate::CoreError;

/// A selectable row of a list prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRow {
    /// Row id, echoed back as the choice id
    pub id: String,
    /// Row title
    pub title: String,
    /// Optional description
    pub description: Option<String>,
}

/// A titled group of rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSection {
    /// Section title
    pub title: String,
    /// Rows
    pub rows: Vec<PromptRow>,
}

/// A list menu ready to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPrompt {
    /// Body text, placeholders already rendered
    pub body: String,
    /// Label of the button opening the list
    pub button_text: String,
    /// Optional header
    pub header: Option<String>,
    /// Optional footer
    pub footer: Option<String>,
    /// Sections
    pub sections: Vec<PromptSection>,
}

/// A reply button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptButton {
    /// Button id, echoed back as the choice id
    pub id: String,
    /// Button label
    pub title: String,
}

/// A button set ready to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonPrompt {
    /// Body text, placeholders already rendered
    pub body: String,
    /// Optional header
    pub header: Option<String>,
    /// Optional footer
    pub footer: Option<String>,
    /// Buttons
    pub buttons: Vec<PromptButton>,
}

/// Structured choice presented to a contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    /// List menu
    List(ListPrompt),
    /// Reply buttons
    Buttons(ButtonPrompt),
}

impl Prompt {
    /// Body text of the prompt
    pub fn body(&self) -> &str {
        match self {
            Prompt::List(list) => &list.body,
            Prompt::Buttons(buttons) => &buttons.body,
        }
    }

    /// Ids of the options, in presentation order
    pub fn option_ids(&self) -> Vec<&str> {
        match self {
            Prompt::List(list) => list
                .sections
                .iter()
                .flat_map(|s| s.rows.iter().map(|r| r.id.as_str()))
                .collect(),
            Prompt::Buttons(buttons) => buttons.buttons.iter().map(|b| b.id.as_str()).collect(),
        }
    }
}

/// Outbound messaging provider
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Send a plain text message; returns the provider message id
    async fn send_text(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        text: &str,
    ) -> Result<String, CoreError>;

    /// Send a list menu; returns the provider message id
    async fn send_list(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        prompt: &ListPrompt,
    ) -> Result<String, CoreError>;

    /// Send reply buttons; returns the provider message id
    async fn send_buttons(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        prompt: &ButtonPrompt,
    ) -> Result<String, CoreError>;
}

/// Switches who services a contact after a hand-off
#[async_trait]
pub trait ServicingModeSwitch: Send + Sync {
    /// Set the servicing mode of the contact
    async fn set_servicing_mode(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        mode: ServicingMode,
    ) -> Result<(), CoreError>;
}

/// CRM tag mutations
#[async_trait]
pub trait ContactTagService: Send + Sync {
    /// Tag the contact
    async fn add_tag(&self, tenant_id: &TenantId, contact: &ContactId, tag: &str)
        -> Result<(), CoreError>;

    /// Untag the contact
    async fn remove_tag(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        tag: &str,
    ) -> Result<(), CoreError>;
}

/// The external collaborators injected into the executor
#[derive(Clone)]
pub struct Collaborators {
    /// Message delivery
    pub delivery: Arc<dyn MessageDelivery>,
    /// Servicing mode switch
    pub mode_switch: Arc<dyn ServicingModeSwitch>,
    /// CRM tags
    pub tags: Arc<dyn ContactTagService>,
}

impl Collaborators {
    /// Group the collaborators
    pub fn new(
        delivery: Arc<dyn MessageDelivery>,
        mode_switch: Arc<dyn ServicingModeSwitch>,
        tags: Arc<dyn ContactTagService>,
    ) -> Self {
        Self {
            delivery,
            mode_switch,
            tags,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
