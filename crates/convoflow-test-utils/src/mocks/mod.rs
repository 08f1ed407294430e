//! mockall mocks of the engine's collaborator traits.
//!
//! Use these when a test needs to assert exact call arguments or inject a
//! failure on the n-th call; for plain call logs prefer
//! [`RecordingCollaborators`](crate::RecordingCollaborators).

use async_trait::async_trait;
use mockall::mock;

use convoflow_core::domain::collaborators::{ButtonPrompt, ListPrompt};
use convoflow_core::{
    ContactId, ContactTagService, CoreError, DomainEvent, ExecutionEventHandler, MessageDelivery,
    ServicingMode, ServicingModeSwitch, TenantId,
};

mock! {
    /// Mock message delivery provider
    pub Delivery {}

    #[async_trait]
    impl MessageDelivery for Delivery {
        async fn send_text(
            &self,
            tenant_id: &TenantId,
            contact: &ContactId,
            text: &str,
        ) -> Result<String, CoreError>;

        async fn send_list(
            &self,
            tenant_id: &TenantId,
            contact: &ContactId,
            prompt: &ListPrompt,
        ) -> Result<String, CoreError>;

        async fn send_buttons(
            &self,
            tenant_id: &TenantId,
            contact: &ContactId,
            prompt: &ButtonPrompt,
        ) -> Result<String, CoreError>;
    }
}

mock! {
    /// Mock servicing mode switch
    pub ModeSwitch {}

    #[async_trait]
    impl ServicingModeSwitch for ModeSwitch {
        async fn set_servicing_mode(
            &self,
            tenant_id: &TenantId,
            contact: &ContactId,
            mode: ServicingMode,
        ) -> Result<(), CoreError>;
    }
}

mock! {
    /// Mock CRM tag service
    pub TagService {}

    #[async_trait]
    impl ContactTagService for TagService {
        async fn add_tag(&self, tenant_id: &TenantId, contact: &ContactId, tag: &str)
            -> Result<(), CoreError>;

        async fn remove_tag(&self, tenant_id: &TenantId, contact: &ContactId, tag: &str)
            -> Result<(), CoreError>;
    }
}

mock! {
    /// Mock execution event handler
    pub EventHandler {}

    #[async_trait]
    impl ExecutionEventHandler for EventHandler {
        async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError>;
    }
}
