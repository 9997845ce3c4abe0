//! 安全封锁集成测试

use std::sync::Arc;

use mcp_agent::{AgentRegistry, TokenService};
use mcp_core::errors::McpError;
use mcp_core::models::{Agent, AgentStatus};
use mcp_core::traits::{AgentRepository, DurableStore};
use mcp_dispatcher::LockdownManager;
use mcp_infrastructure::MemoryStore;
use mcp_testing_utils::{AgentBuilder, FailingAgentRepository};

fn manager_with(repo: FailingAgentRepository, cooldown_seconds: u64) -> Arc<LockdownManager> {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let repo: Arc<dyn AgentRepository> = Arc::new(repo);
    let tokens = Arc::new(TokenService::new(
        "test-secret",
        24,
        Arc::clone(&store),
        "test",
    ));
    let registry = Arc::new(AgentRegistry::new(Arc::clone(&repo), tokens));
    Arc::new(LockdownManager::new(
        store,
        repo,
        registry,
        "test",
        3600,
        cooldown_seconds,
    ))
}

fn agents() -> Vec<Agent> {
    vec![
        AgentBuilder::new().with_id("agent-a").build(),
        AgentBuilder::new().with_id("agent-b").build(),
    ]
}

#[tokio::test]
async fn test_targeted_lockdown_partial_failure_accounting() {
    let repo = FailingAgentRepository::new(agents());
    repo.fail_update("agent-b");
    let manager = manager_with(repo.clone(), 3600);

    let report = manager
        .targeted_lockdown(
            &["agent-a".to_string(), "agent-b".to_string()],
            "泄露的API密钥",
            "admin-1",
        )
        .await
        .unwrap();

    // A 成功、B 失败，不回滚 A
    assert_eq!(report.requested, 2);
    assert_eq!(report.initiated_by, "admin-1");
    assert_eq!(report.suspended, vec!["agent-a".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "agent-b");

    let a = repo.get_by_id("agent-a").await.unwrap().unwrap();
    assert_eq!(a.status, AgentStatus::Suspended);
    let b = repo.get_by_id("agent-b").await.unwrap().unwrap();
    assert_eq!(b.status, AgentStatus::Available);
}

#[tokio::test]
async fn test_targeted_lockdown_rejects_empty_list() {
    let manager = manager_with(FailingAgentRepository::new(vec![]), 3600);
    assert!(manager
        .targeted_lockdown(&[], "无目标", "admin-1")
        .await
        .is_err());
}

#[tokio::test]
async fn test_emergency_lockdown_sweeps_schedulable_agents() {
    let mut fleet = agents();
    fleet.push(
        AgentBuilder::new()
            .with_id("agent-busy")
            .with_status(AgentStatus::Busy)
            .build(),
    );
    fleet.push(AgentBuilder::new().with_id("agent-offline").offline().build());
    let repo = FailingAgentRepository::new(fleet);
    let manager = manager_with(repo.clone(), 3600);

    assert!(!manager.is_lockdown_active().await.unwrap());
    let report = manager
        .emergency_lockdown("入侵告警", "admin-1")
        .await
        .unwrap();
    assert!(manager.is_lockdown_active().await.unwrap());

    // AVAILABLE 与 BUSY 被封，OFFLINE 不动
    assert_eq!(report.requested, 3);
    assert_eq!(report.failed.len(), 0);
    let offline = repo.get_by_id("agent-offline").await.unwrap().unwrap();
    assert_eq!(offline.status, AgentStatus::Offline);
    let busy = repo.get_by_id("agent-busy").await.unwrap().unwrap();
    assert_eq!(busy.status, AgentStatus::Suspended);
}

#[tokio::test]
async fn test_lift_lockdown_requires_active_flag() {
    let manager = manager_with(FailingAgentRepository::new(agents()), 3600);

    let err = manager.lift_lockdown("admin-1").await.unwrap_err();
    assert!(matches!(err, McpError::Conflict(_)));

    manager.emergency_lockdown("演练", "admin-1").await.unwrap();
    manager.lift_lockdown("admin-2").await.unwrap();
    assert!(!manager.is_lockdown_active().await.unwrap());

    // 解除后再解除同样是冲突
    assert!(manager.lift_lockdown("admin-2").await.is_err());
}

#[tokio::test]
async fn test_reactivate_agent() {
    let repo = FailingAgentRepository::new(agents());
    let manager = manager_with(repo.clone(), 3600);

    manager
        .targeted_lockdown(&["agent-a".to_string()], "调查中", "admin-1")
        .await
        .unwrap();
    manager.reactivate_agent("agent-a").await.unwrap();
    let a = repo.get_by_id("agent-a").await.unwrap().unwrap();
    assert_eq!(a.status, AgentStatus::Available);

    // 未被暂停的Agent不能"恢复"
    assert!(manager.reactivate_agent("agent-b").await.is_err());
}

#[tokio::test]
async fn test_rate_limiting_lockdown_auto_reactivates() {
    let repo = FailingAgentRepository::new(agents());
    let manager = manager_with(repo.clone(), 1);

    manager
        .enforce_rate_limiting_lockdown("agent-a", "请求频率超限")
        .await
        .unwrap();
    let a = repo.get_by_id("agent-a").await.unwrap().unwrap();
    assert_eq!(a.status, AgentStatus::Suspended);

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;
    let a = repo.get_by_id("agent-a").await.unwrap().unwrap();
    assert_eq!(a.status, AgentStatus::Available);
}

#[tokio::test]
async fn test_incident_log_newest_first() {
    let manager = manager_with(FailingAgentRepository::new(agents()), 3600);

    manager.emergency_lockdown("第一起", "admin-1").await.unwrap();
    manager
        .targeted_lockdown(&["agent-a".to_string()], "第二起", "admin-2")
        .await
        .unwrap();

    let incidents = manager.recent_incidents(10).await;
    assert_eq!(incidents.len(), 2);
    assert_eq!(incidents[0].action, "targeted_lockdown");
    assert_eq!(incidents[0].initiated_by, "admin-2");
    assert_eq!(incidents[1].action, "emergency_lockdown");
    assert_eq!(incidents[1].initiated_by, "admin-1");

    let limited = manager.recent_incidents(1).await;
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].action, "targeted_lockdown");
}
