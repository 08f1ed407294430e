//! Fakes shared by the application unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::flow_executor::FlowExecutor;
use crate::config::EngineConfig;
use crate::domain::block::{
    BlockKind, ButtonOption, ButtonsData, EndData, FlowBlock, HandoffData, MessageData,
};
use crate::domain::collaborators::{
    ButtonPrompt, Collaborators, ContactTagService, ListPrompt, MessageDelivery,
    ServicingModeSwitch,
};
use crate::domain::events::{DomainEvent, ExecutionEventHandler};
use crate::domain::flow_definition::{FlowEdge, InteractiveFlow, TriggerType};
use crate::domain::flow_execution::{ExecutionStatus, FlowExecution, ServicingMode};
use crate::domain::identifiers::{BlockId, ContactId, ExecutionId, FlowId, TenantId};
use crate::domain::repository::{ExecutionLease, ExecutionStore, FlowDefinitionStore};
use crate::CoreError;

/// `start -> hi -> menu(A -> end, B -> human)`
pub fn buttons_flow() -> InteractiveFlow {
    let mut flow = InteractiveFlow::new("menu", "t1", "Menu", TriggerType::Always, "start");
    flow.blocks = vec![
        FlowBlock::new("start", BlockKind::Start),
        FlowBlock::new(
            "hi",
            BlockKind::Message(MessageData {
                message_text: "Hi".into(),
            }),
        ),
        FlowBlock::new(
            "menu",
            BlockKind::InteractiveButtons(ButtonsData {
                body_text: "Pick".into(),
                header_text: None,
                footer_text: None,
                buttons: vec![
                    ButtonOption {
                        id: "A".into(),
                        title: "Done".into(),
                        next_block_id: None,
                    },
                    ButtonOption {
                        id: "B".into(),
                        title: "Human".into(),
                        next_block_id: None,
                    },
                ],
                variable_name: Some("choice".into()),
                invalid_choice_text: None,
            }),
        ),
        FlowBlock::new("end", BlockKind::End(EndData::default())),
        FlowBlock::new("human", BlockKind::HumanHandoff(HandoffData::default())),
    ];
    flow.edges = vec![
        FlowEdge::new("start", "hi"),
        FlowEdge::new("hi", "menu"),
        FlowEdge::with_handle("menu", "A", "end"),
        FlowEdge::with_handle("menu", "B", "human"),
    ];
    flow
}

/// `start -> a -> b -> a ...` with no suspension point
pub fn cyclic_flow() -> InteractiveFlow {
    let mut flow = InteractiveFlow::new("loop", "t1", "Loop", TriggerType::Manual, "start");
    flow.blocks = vec![
        FlowBlock::new("start", BlockKind::Start),
        FlowBlock::new(
            "a",
            BlockKind::Message(MessageData {
                message_text: "ping".into(),
            }),
        ),
        FlowBlock::new(
            "b",
            BlockKind::Message(MessageData {
                message_text: "pong".into(),
            }),
        ),
    ];
    flow.edges = vec![
        FlowEdge::new("start", "a"),
        FlowEdge::new("a", "b"),
        FlowEdge::new("b", "a"),
    ];
    flow
}

/// Flow store over a fixed list
pub struct FakeFlows(pub Vec<InteractiveFlow>);

#[async_trait]
impl FlowDefinitionStore for FakeFlows {
    async fn get_active_flow(
        &self,
        tenant_id: &TenantId,
        flow_id: &FlowId,
    ) -> Result<Option<InteractiveFlow>, CoreError> {
        Ok(self
            .0
            .iter()
            .find(|f| &f.tenant_id == tenant_id && &f.id == flow_id && f.is_active)
            .cloned())
    }

    async fn list_active_flows(
        &self,
        tenant_id: &TenantId,
        trigger_type: TriggerType,
    ) -> Result<Vec<InteractiveFlow>, CoreError> {
        let mut flows: Vec<_> = self
            .0
            .iter()
            .filter(|f| &f.tenant_id == tenant_id && f.is_active && f.trigger_type == trigger_type)
            .cloned()
            .collect();
        flows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(flows)
    }
}

#[derive(Default)]
struct StoreState {
    records: Vec<FlowExecution>,
    leases: HashMap<ExecutionId, ExecutionLease>,
}

/// Minimal execution store with the same claim rules as the real backends
#[derive(Default)]
pub struct FakeExecutions {
    state: Mutex<StoreState>,
    failing_saves: AtomicUsize,
}

impl FakeExecutions {
    /// The next `count` saves fail with a transient store error
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Drop every lease, as if another invocation had taken them over
    pub fn revoke_leases(&self) {
        self.lock().leases.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    fn take_lease(state: &mut StoreState, id: &ExecutionId, ttl: Duration) -> Result<ExecutionLease, CoreError> {
        if let Some(existing) = state.leases.get(id) {
            if !existing.is_expired_at(Utc::now()) {
                return Err(CoreError::Busy(id.to_string()));
            }
        }
        let lease = ExecutionLease::issue(id.clone(), ttl);
        state.leases.insert(id.clone(), lease.clone());
        Ok(lease)
    }
}

#[async_trait]
impl ExecutionStore for FakeExecutions {
    async fn get_active(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Option<FlowExecution>, CoreError> {
        Ok(self
            .lock()
            .records
            .iter()
            .find(|e| &e.tenant_id == tenant_id && &e.contact == contact && e.is_active())
            .cloned())
    }

    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<FlowExecution>, CoreError> {
        Ok(self.lock().records.iter().find(|e| &e.id == id).cloned())
    }

    async fn claim(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        flow_id: &FlowId,
        start_block_id: &BlockId,
        ttl: Duration,
    ) -> Result<(FlowExecution, ExecutionLease), CoreError> {
        let mut state = self.lock();
        if state
            .records
            .iter()
            .any(|e| &e.tenant_id == tenant_id && &e.contact == contact && e.is_active())
        {
            return Err(CoreError::AlreadyActive {
                tenant_id: tenant_id.to_string(),
                contact: contact.to_string(),
            });
        }
        let mut execution = FlowExecution::new(
            flow_id.clone(),
            tenant_id.clone(),
            contact.clone(),
            start_block_id.clone(),
        );
        execution.version = 1;
        let lease = Self::take_lease(&mut state, &execution.id, ttl)?;
        state.records.push(execution.clone());
        Ok((execution, lease))
    }

    async fn claim_active(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
        ttl: Duration,
    ) -> Result<Option<(FlowExecution, ExecutionLease)>, CoreError> {
        let mut state = self.lock();
        let Some(execution) = state
            .records
            .iter()
            .find(|e| &e.tenant_id == tenant_id && &e.contact == contact && e.is_active())
            .cloned()
        else {
            return Ok(None);
        };
        let lease = Self::take_lease(&mut state, &execution.id, ttl)?;
        Ok(Some((execution, lease)))
    }

    async fn claim_execution(
        &self,
        id: &ExecutionId,
        ttl: Duration,
    ) -> Result<(FlowExecution, ExecutionLease), CoreError> {
        let mut state = self.lock();
        let execution = state
            .records
            .iter()
            .find(|e| &e.id == id)
            .cloned()
            .ok_or_else(|| CoreError::ExecutionNotFound(id.to_string()))?;
        if !execution.is_active() {
            return Err(CoreError::ExecutionNotActive(id.to_string()));
        }
        let lease = Self::take_lease(&mut state, id, ttl)?;
        Ok((execution, lease))
    }

    async fn renew(&self, lease: &ExecutionLease, ttl: Duration) -> Result<ExecutionLease, CoreError> {
        let mut state = self.lock();
        match state.leases.get(&lease.execution_id) {
            Some(held) if held.token == lease.token => {}
            _ => return Err(CoreError::ClaimLost(lease.execution_id.to_string())),
        }
        let renewed = lease.extended(ttl);
        state.leases.insert(lease.execution_id.clone(), renewed.clone());
        Ok(renewed)
    }

    async fn save(&self, execution: &FlowExecution, lease: &ExecutionLease) -> Result<u64, CoreError> {
        let pending = self.failing_saves.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_saves.store(pending - 1, Ordering::SeqCst);
            return Err(CoreError::StateStoreError("connection reset".into()));
        }

        let mut state = self.lock();
        match state.leases.get(&execution.id) {
            Some(held) if held.token == lease.token => {}
            _ => return Err(CoreError::ClaimLost(execution.id.to_string())),
        }
        let record = state
            .records
            .iter_mut()
            .find(|e| e.id == execution.id)
            .ok_or_else(|| CoreError::ExecutionNotFound(execution.id.to_string()))?;
        *record = execution.clone();
        record.version = execution.version + 1;
        Ok(record.version)
    }

    async fn release(&self, lease: &ExecutionLease, status: ExecutionStatus) -> Result<(), CoreError> {
        let mut state = self.lock();
        if state
            .leases
            .get(&lease.execution_id)
            .map_or(false, |held| held.token == lease.token)
        {
            state.leases.remove(&lease.execution_id);
            if status.is_terminal() {
                if let Some(record) = state
                    .records
                    .iter_mut()
                    .find(|e| e.id == lease.execution_id && e.is_active())
                {
                    record.status = status;
                }
            }
        }
        Ok(())
    }

    async fn list_for_contact(
        &self,
        tenant_id: &TenantId,
        contact: &ContactId,
    ) -> Result<Vec<FlowExecution>, CoreError> {
        let mut found: Vec<_> = self
            .lock()
            .records
            .iter()
            .filter(|e| &e.tenant_id == tenant_id && &e.contact == contact)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found)
    }
}

/// What the collaborators were asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Text(String),
    List(Vec<String>),
    Buttons(Vec<String>),
    Tag(String),
    Untag(String),
    Mode(ServicingMode),
}

/// Collaborators that record every call
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<RecordedCall>>,
    events: Mutex<Vec<String>>,
    fail_delivery: bool,
    // Store whose leases are dropped once a message goes out
    revoke_on_send: Mutex<Option<Arc<FakeExecutions>>>,
}

impl Recorder {
    fn record(&self, call: RecordedCall) -> Result<String, CoreError> {
        if self.fail_delivery {
            return Err(CoreError::DeliveryError("provider unavailable".into()));
        }
        if let Some(store) = self.revoke_on_send.lock().unwrap().take() {
            store.revoke_leases();
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        Ok(format!("msg-{}", calls.len()))
    }
}

#[async_trait]
impl MessageDelivery for Recorder {
    async fn send_text(&self, _: &TenantId, _: &ContactId, text: &str) -> Result<String, CoreError> {
        self.record(RecordedCall::Text(text.to_string()))
    }

    async fn send_list(&self, _: &TenantId, _: &ContactId, prompt: &ListPrompt) -> Result<String, CoreError> {
        let ids = prompt
            .sections
            .iter()
            .flat_map(|s| s.rows.iter().map(|r| r.id.clone()))
            .collect();
        self.record(RecordedCall::List(ids))
    }

    async fn send_buttons(
        &self,
        _: &TenantId,
        _: &ContactId,
        prompt: &ButtonPrompt,
    ) -> Result<String, CoreError> {
        let ids = prompt.buttons.iter().map(|b| b.id.clone()).collect();
        self.record(RecordedCall::Buttons(ids))
    }
}

#[async_trait]
impl ServicingModeSwitch for Recorder {
    async fn set_servicing_mode(
        &self,
        _: &TenantId,
        _: &ContactId,
        mode: ServicingMode,
    ) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push(RecordedCall::Mode(mode));
        Ok(())
    }
}

#[async_trait]
impl ContactTagService for Recorder {
    async fn add_tag(&self, _: &TenantId, _: &ContactId, tag: &str) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push(RecordedCall::Tag(tag.to_string()));
        Ok(())
    }

    async fn remove_tag(&self, _: &TenantId, _: &ContactId, tag: &str) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push(RecordedCall::Untag(tag.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ExecutionEventHandler for Recorder {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        self.events.lock().unwrap().push(event.event_type().to_string());
        Ok(())
    }
}

/// Executor wired to the fakes
pub struct Harness {
    pub executor: FlowExecutor,
    pub flows: Arc<FakeFlows>,
    pub store: Arc<FakeExecutions>,
    pub recorder: Arc<Recorder>,
    pub tenant: TenantId,
    pub contact: ContactId,
}

impl Harness {
    pub fn new(flows: Vec<InteractiveFlow>) -> Self {
        Self::build(flows, Recorder::default())
    }

    pub fn failing_delivery(self) -> Self {
        let flows = self.flows.0.clone();
        Self::build(
            flows,
            Recorder {
                fail_delivery: true,
                ..Default::default()
            },
        )
    }

    fn build(flows: Vec<InteractiveFlow>, recorder: Recorder) -> Self {
        let flows = Arc::new(FakeFlows(flows));
        let store = Arc::new(FakeExecutions::default());
        let recorder = Arc::new(recorder);
        let collaborators = Collaborators::new(recorder.clone(), recorder.clone(), recorder.clone());
        let config = EngineConfig {
            claim_retry_backoff_ms: 1,
            ..Default::default()
        };
        let executor = FlowExecutor::new(
            flows.clone(),
            store.clone(),
            collaborators,
            recorder.clone(),
            config,
        );
        Self {
            executor,
            flows,
            store,
            recorder,
            tenant: TenantId::from("t1"),
            contact: ContactId::from("+5511999990000"),
        }
    }

    /// Another invocation takes the execution over while the first message is sent
    pub fn lose_claim_on_first_send(&self) {
        *self.recorder.revoke_on_send.lock().unwrap() = Some(self.store.clone());
    }

    pub fn executor_collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.recorder.clone(),
            self.recorder.clone(),
            self.recorder.clone(),
        )
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.recorder.calls.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.recorder.events.lock().unwrap().clone()
    }

    pub async fn active(&self) -> Option<FlowExecution> {
        self.store.get_active(&self.tenant, &self.contact).await.unwrap()
    }

    pub async fn all(&self) -> Vec<FlowExecution> {
        self.store
            .list_for_contact(&self.tenant, &self.contact)
            .await
            .unwrap()
    }
}
