use crate::InMemoryStateStoreProvider;
use chrono::{Duration as ChronoDuration, Utc};
use convoflow_core::{
    domain::repository::{ExecutionStore, FlowDefinitionStore}, BlockId, ContactId, CoreError, ExecutionStatus, FlowId,
    InteractiveFlow, TenantId, TriggerType,
};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(30);

fn ids() -> (TenantId, ContactId, FlowId, BlockId) {
    (
        TenantId::from("acme"),
        ContactId::from("+5511999990000"),
        FlowId::from("welcome"),
        BlockId::from("start"),
    )
}

#[tokio::test]
async fn test_claim_creates_single_active_execution() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let (execution, lease) = executions.claim(&tenant, &contact, &flow, &start, TTL).await?;
    assert_eq!(execution.version, 1);
    assert_eq!(execution.status, ExecutionStatus::Active);
    assert_eq!(lease.execution_id, execution.id);

    let second = executions.claim(&tenant, &contact, &flow, &start, TTL).await;
    assert!(matches!(second, Err(CoreError::AlreadyActive { .. })));

    let active = executions.get_active(&tenant, &contact).await?.unwrap();
    assert_eq!(active.id, execution.id);

    // Another contact is independent
    let other = ContactId::from("+5511888880000");
    assert!(executions.claim(&tenant, &other, &flow, &start, TTL).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_claim_active_is_exclusive_until_release() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let (_, lease) = executions.claim(&tenant, &contact, &flow, &start, TTL).await?;
    let busy = executions.claim_active(&tenant, &contact, TTL).await;
    assert!(matches!(busy, Err(CoreError::Busy(_))));

    executions.release(&lease, ExecutionStatus::Active).await?;
    let reclaimed = executions.claim_active(&tenant, &contact, TTL).await?;
    assert!(reclaimed.is_some());

    let none = executions
        .claim_active(&tenant, &ContactId::from("nobody"), TTL)
        .await?;
    assert!(none.is_none());
    Ok(())
}

#[tokio::test]
async fn test_expired_lease_is_taken_over_and_old_holder_loses() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let (mut stale, stale_lease) = executions
        .claim(&tenant, &contact, &flow, &start, Duration::from_millis(5))
        .await?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (mut fresh, fresh_lease) = executions
        .claim_active(&tenant, &contact, TTL)
        .await?
        .unwrap();
    fresh.enter_block(BlockId::from("next"), "message")?;
    let version = executions.save(&fresh, &fresh_lease).await?;
    assert_eq!(version, 2);

    stale.enter_block(BlockId::from("other"), "message")?;
    let lost = executions.save(&stale, &stale_lease).await;
    assert!(matches!(lost, Err(CoreError::ClaimLost(_))));

    // Releasing a superseded lease is a no-op
    executions.release(&stale_lease, ExecutionStatus::Aborted).await?;
    let record = executions.find_by_id(&fresh.id).await?.unwrap();
    assert_eq!(record.status, ExecutionStatus::Active);
    assert_eq!(record.current_block_id, BlockId::from("next"));
    Ok(())
}

#[tokio::test]
async fn test_renew_keeps_a_long_step_claimed() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let (mut execution, lease) = executions
        .claim(&tenant, &contact, &flow, &start, Duration::from_millis(5))
        .await?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Lapsed but not taken over: still ours to renew and save
    let renewed = executions.renew(&lease, TTL).await?;
    assert_eq!(renewed.token, lease.token);
    assert!(matches!(
        executions.claim_active(&tenant, &contact, TTL).await,
        Err(CoreError::Busy(_))
    ));

    execution.enter_block(BlockId::from("next"), "message")?;
    assert_eq!(executions.save(&execution, &renewed).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_renew_after_takeover_is_claim_lost() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let (_, stale_lease) = executions
        .claim(&tenant, &contact, &flow, &start, Duration::from_millis(5))
        .await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let (_, fresh_lease) = executions
        .claim_active(&tenant, &contact, TTL)
        .await?
        .unwrap();

    assert!(matches!(
        executions.renew(&stale_lease, TTL).await,
        Err(CoreError::ClaimLost(_))
    ));
    assert!(executions.renew(&fresh_lease, TTL).await.is_ok());

    executions.release(&fresh_lease, ExecutionStatus::Completed).await?;
    assert!(matches!(
        executions.renew(&fresh_lease, TTL).await,
        Err(CoreError::ClaimLost(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_save_checks_version() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let (mut execution, lease) = executions.claim(&tenant, &contact, &flow, &start, TTL).await?;
    execution.version = executions.save(&execution, &lease).await?;
    assert_eq!(execution.version, 2);

    let mut outdated = execution.clone();
    outdated.version = 1;
    assert!(matches!(
        executions.save(&outdated, &lease).await,
        Err(CoreError::ClaimLost(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_terminal_save_frees_the_contact() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let (mut execution, lease) = executions.claim(&tenant, &contact, &flow, &start, TTL).await?;
    execution.complete()?;
    executions.save(&execution, &lease).await?;
    executions.release(&lease, ExecutionStatus::Completed).await?;

    assert!(executions.get_active(&tenant, &contact).await?.is_none());
    assert!(executions.claim(&tenant, &contact, &flow, &start, TTL).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_release_forces_terminal_status() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let (execution, lease) = executions.claim(&tenant, &contact, &flow, &start, TTL).await?;
    executions.release(&lease, ExecutionStatus::Aborted).await?;

    let record = executions.find_by_id(&execution.id).await?.unwrap();
    assert_eq!(record.status, ExecutionStatus::Aborted);
    assert!(executions.get_active(&tenant, &contact).await?.is_none());

    let claimed = executions.claim_execution(&execution.id, TTL).await;
    assert!(matches!(claimed, Err(CoreError::ExecutionNotActive(_))));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let provider = InMemoryStateStoreProvider::new();
    let executions = provider.execution_store();
    let (tenant, contact, flow, start) = ids();

    let attempts = (0..16).map(|_| {
        let executions = executions.clone();
        let (tenant, contact, flow, start) = (tenant.clone(), contact.clone(), flow.clone(), start.clone());
        tokio::spawn(async move { executions.claim(&tenant, &contact, &flow, &start, TTL).await })
    });
    let results = futures::future::join_all(attempts).await;

    let winners = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(executions.len().await, 1);
}

#[tokio::test]
async fn test_list_for_contact_is_newest_first() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, executions) = provider.create_repositories();
    let (tenant, contact, flow, start) = ids();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let (execution, lease) = executions.claim(&tenant, &contact, &flow, &start, TTL).await?;
        executions.release(&lease, ExecutionStatus::Completed).await?;
        seen.push(execution.id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let listed: Vec<_> = executions
        .list_for_contact(&tenant, &contact)
        .await?
        .into_iter()
        .map(|e| e.id)
        .collect();
    seen.reverse();
    assert_eq!(listed, seen);
    Ok(())
}

#[tokio::test]
async fn test_flow_store_orders_and_filters() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let flows = provider.flow_store();
    let (flow_store, _) = provider.create_repositories();
    let tenant = TenantId::from("acme");

    let mut newer = InteractiveFlow::new("b-newer", "acme", "B", TriggerType::Keyword, "start");
    newer.created_at = Utc::now();
    let mut older = InteractiveFlow::new("z-older", "acme", "Z", TriggerType::Keyword, "start");
    older.created_at = newer.created_at - ChronoDuration::hours(1);
    let mut tied = InteractiveFlow::new("a-tied", "acme", "A", TriggerType::Keyword, "start");
    tied.created_at = newer.created_at;
    let mut inactive = InteractiveFlow::new("off", "acme", "Off", TriggerType::Keyword, "start");
    inactive.is_active = false;
    let foreign = InteractiveFlow::new("x", "other", "X", TriggerType::Keyword, "start");

    for flow in [newer, older, tied, inactive, foreign] {
        flows.save(flow).await;
    }

    let listed: Vec<_> = flow_store
        .list_active_flows(&tenant, TriggerType::Keyword)
        .await?
        .into_iter()
        .map(|f| f.id.to_string())
        .collect();
    assert_eq!(listed, vec!["z-older", "a-tied", "b-newer"]);

    assert!(flow_store.get_active_flow(&tenant, &FlowId::from("off")).await?.is_none());
    assert!(flow_store.get_active_flow(&tenant, &FlowId::from("a-tied")).await?.is_some());
    assert_eq!(flows.find_all(&tenant).await.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_provider_shares_state() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let clone = provider.clone();
    let (tenant, contact, flow, start) = ids();

    let (_, executions) = provider.create_repositories();
    executions.claim(&tenant, &contact, &flow, &start, TTL).await?;

    let seen: Arc<dyn ExecutionStore> = clone.execution_store();
    assert!(seen.get_active(&tenant, &contact).await?.is_some());
    Ok(())
}
