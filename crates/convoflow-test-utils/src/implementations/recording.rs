use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use convoflow_core::domain::collaborators::{ButtonPrompt, ListPrompt};
use convoflow_core::{
    Collaborators, ContactId, ContactTagService, CoreError, DomainEvent, ExecutionEventHandler,
    MessageDelivery, ServicingMode, ServicingModeSwitch, TenantId,
};

/// One collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    /// `send_text`
    Text(String),
    /// `send_list`
    List(ListPrompt),
    /// `send_buttons`
    Buttons(ButtonPrompt),
    /// `add_tag`
    AddTag(String),
    /// `remove_tag`
    RemoveTag(String),
    /// `set_servicing_mode`
    Mode(ServicingMode),
}

/// Implements every collaborator and the event handler, logging each call
/// per contact. Delivery can be switched to fail or slowed down.
#[derive(Debug, Default)]
pub struct RecordingCollaborators {
    calls: Mutex<Vec<(ContactId, RecordedCall)>>,
    events: Mutex<Vec<String>>,
    fail_delivery: AtomicBool,
    delivery_delay_ms: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingCollaborators {
    /// Create a shared recorder
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The recorder as the engine's collaborator bundle
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators::new(self.clone(), self.clone(), self.clone())
    }

    /// Make every message delivery fail (or succeed again)
    pub fn set_fail_delivery(&self, fail: bool) {
        self.fail_delivery.store(fail, Ordering::SeqCst);
    }

    /// Hold every message delivery for `delay` before it completes
    pub fn set_delivery_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delivery_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// All calls, any contact, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).iter().map(|(_, call)| call.clone()).collect()
    }

    /// Calls made for one contact
    pub fn calls_for(&self, contact: &ContactId) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|(to, _)| to == contact)
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Texts sent, any contact
    pub fn texts(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|(_, call)| match call {
                RecordedCall::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Event types handled, in order
    pub fn event_types(&self) -> Vec<String> {
        lock(&self.events).clone()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        lock(&self.calls).clear();
        lock(&self.events).clear();
    }

    async fn deliver(&self, contact: &ContactId, call: RecordedCall) -> Result<String, CoreError> {
        let delay = self.delivery_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_delivery.load(Ordering::SeqCst) {
            debug!(contact = %contact, ?call, "Failing delivery on request");
            return Err(CoreError::DeliveryError("provider unavailable".to_string()));
        }
        let mut calls = lock(&self.calls);
        calls.push((contact.clone(), call));
        Ok(format!("wamid.{}", calls.len()))
    }

    fn push(&self, contact: &ContactId, call: RecordedCall) {
        lock(&self.calls).push((contact.clone(), call));
    }
}

#[async_trait]
impl MessageDelivery for RecordingCollaborators {
    async fn send_text(
        &self,
        _tenant_id: &TenantId,
        contact: &ContactId,
        text: &str,
    ) -> Result<String, CoreError> {
        self.deliver(contact, RecordedCall::Text(text.to_string())).await
    }

    async fn send_list(
        &self,
        _tenant_id: &TenantId,
        contact: &ContactId,
        prompt: &ListPrompt,
    ) -> Result<String, CoreError> {
        self.deliver(contact, RecordedCall::List(prompt.clone())).await
    }

    async fn send_buttons(
        &self,
        _tenant_id: &TenantId,
        contact: &ContactId,
        prompt: &ButtonPrompt,
    ) -> Result<String, CoreError> {
        self.deliver(contact, RecordedCall::Buttons(prompt.clone())).await
    }
}

#[async_trait]
impl ServicingModeSwitch for RecordingCollaborators {
    async fn set_servicing_mode(
        &self,
        _tenant_id: &TenantId,
        contact: &ContactId,
        mode: ServicingMode,
    ) -> Result<(), CoreError> {
        self.push(contact, RecordedCall::Mode(mode));
        Ok(())
    }
}

#[async_trait]
impl ContactTagService for RecordingCollaborators {
    async fn add_tag(&self, _tenant_id: &TenantId, contact: &ContactId, tag: &str) -> Result<(), CoreError> {
        self.push(contact, RecordedCall::AddTag(tag.to_string()));
        Ok(())
    }

    async fn remove_tag(
        &self,
        _tenant_id: &TenantId,
        contact: &ContactId,
        tag: &str,
    ) -> Result<(), CoreError> {
        self.push(contact, RecordedCall::RemoveTag(tag.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ExecutionEventHandler for RecordingCollaborators {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        lock(&self.events).push(event.event_type().to_string());
        Ok(())
    }
}
