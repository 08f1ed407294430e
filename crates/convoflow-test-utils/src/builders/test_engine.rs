use std::sync::Arc;

use convoflow_core::{
    ContactId, CoreError, Disposition, EngineConfig, ExecutionStore, FlowEngine, FlowExecution, FlowId,
    InboundOutcome, InteractiveFlow, TenantId, UserInput,
};
use convoflow_state_inmemory::InMemoryStateStoreProvider;

use crate::data_generators::TENANT;
use crate::implementations::RecordingCollaborators;

/// A [`FlowEngine`] over the in-memory stores with recording collaborators
pub struct TestEngine {
    /// The engine under test
    pub engine: FlowEngine,
    /// Backing stores, shared with the engine
    pub provider: InMemoryStateStoreProvider,
    /// Collaborator and event log
    pub recorder: Arc<RecordingCollaborators>,
    /// Tenant used by the helpers
    pub tenant: TenantId,
}

impl TestEngine {
    /// Publish `flows` and build an engine with a short claim backoff
    pub async fn new(flows: Vec<InteractiveFlow>) -> Result<Self, CoreError> {
        let config = EngineConfig {
            claim_retry_backoff_ms: 1,
            ..Default::default()
        };
        Self::with_config(flows, config).await
    }

    /// Publish `flows` and build an engine with `config`
    pub async fn with_config(
        flows: Vec<InteractiveFlow>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        let provider = InMemoryStateStoreProvider::new();
        for flow in flows {
            provider.flow_store().save(flow).await;
        }

        let recorder = RecordingCollaborators::new();
        let (flow_store, execution_store) = provider.create_repositories();
        let engine = FlowEngine::new(
            flow_store,
            execution_store,
            recorder.collaborators(),
            recorder.clone(),
            config,
        )?;

        Ok(Self {
            engine,
            provider,
            recorder,
            tenant: TenantId::from(TENANT),
        })
    }

    /// Publish or replace a flow
    pub async fn publish(&self, flow: InteractiveFlow) {
        self.provider.flow_store().save(flow).await;
    }

    /// Inbound free text from `contact`
    pub async fn send(&self, contact: &str, text: &str) -> Result<InboundOutcome, CoreError> {
        self.engine
            .handle_inbound(&self.tenant, &ContactId::from(contact), UserInput::text(text))
            .await
    }

    /// Inbound button or row tap from `contact`
    pub async fn tap(
        &self,
        contact: &str,
        choice_id: &str,
        title: &str,
    ) -> Result<InboundOutcome, CoreError> {
        self.engine
            .handle_inbound(
                &self.tenant,
                &ContactId::from(contact),
                UserInput::choice(choice_id, title),
            )
            .await
    }

    /// Start `flow_id` for `contact` directly
    pub async fn start(&self, flow_id: &str, contact: &str) -> Result<Disposition, CoreError> {
        self.engine
            .executor()
            .start_flow(&FlowId::from(flow_id), &self.tenant, &ContactId::from(contact))
            .await
    }

    /// Feed input to the active execution of `contact` directly
    pub async fn resume(&self, contact: &str, input: UserInput) -> Result<Disposition, CoreError> {
        self.engine
            .executor()
            .continue_flow(&self.tenant, &ContactId::from(contact), input)
            .await
    }

    /// Active execution of `contact`
    pub async fn active(&self, contact: &str) -> Result<Option<FlowExecution>, CoreError> {
        self.provider
            .execution_store()
            .get_active(&self.tenant, &ContactId::from(contact))
            .await
    }

    /// Every execution of `contact`, newest first
    pub async fn executions(&self, contact: &str) -> Result<Vec<FlowExecution>, CoreError> {
        self.provider
            .execution_store()
            .list_for_contact(&self.tenant, &ContactId::from(contact))
            .await
    }
}
