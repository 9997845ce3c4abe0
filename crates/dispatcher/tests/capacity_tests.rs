//! 容量管理集成测试

use std::sync::Arc;

use mcp_core::traits::DurableStore;
use mcp_dispatcher::CapacityManager;
use mcp_infrastructure::MemoryStore;

fn manager() -> Arc<CapacityManager> {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    Arc::new(CapacityManager::new(store, "test", 300))
}

#[tokio::test]
async fn test_update_and_get_capacity() {
    let manager = manager();
    manager.update_capacity("agent-1", 2, 5).await.unwrap();

    let snapshot = manager.get_capacity("agent-1").await.unwrap().unwrap();
    assert_eq!(snapshot.current_tasks, 2);
    assert_eq!(snapshot.max_tasks, 5);
    assert_eq!(snapshot.available_slots(), 3);

    assert!(manager.get_capacity("agent-unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_rejects_overcommitted_report() {
    let manager = manager();
    assert!(manager.update_capacity("agent-1", 6, 5).await.is_err());
    assert!(manager.update_capacity("agent-1", 0, 0).await.is_err());
}

#[tokio::test]
async fn test_no_oversubscription_under_concurrent_reserve() {
    let manager = manager();
    manager.update_capacity("agent-1", 0, 3).await.unwrap();

    // 10个并发预留只能成功3次
    let mut handles = Vec::new();
    for i in 0..10 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            manager.reserve_slot("agent-1", &format!("t-{i}")).await.unwrap()
        }));
    }
    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 3);

    let snapshot = manager.get_capacity("agent-1").await.unwrap().unwrap();
    assert_eq!(snapshot.current_tasks, 3);
    assert_eq!(snapshot.available_slots(), 0);
}

#[tokio::test]
async fn test_release_makes_slot_available_again() {
    let manager = manager();
    manager.update_capacity("agent-1", 0, 1).await.unwrap();

    assert!(manager.reserve_slot("agent-1", "t-1").await.unwrap());
    assert!(!manager.reserve_slot("agent-1", "t-2").await.unwrap());

    assert!(manager.release_slot("agent-1", "t-1").await.unwrap());
    assert!(manager.reserve_slot("agent-1", "t-2").await.unwrap());
}

#[tokio::test]
async fn test_reserve_unknown_agent_is_false_not_error() {
    let manager = manager();
    assert!(!manager.reserve_slot("agent-ghost", "t-1").await.unwrap());
}

#[tokio::test]
async fn test_release_floors_at_zero() {
    let manager = manager();
    manager.update_capacity("agent-1", 0, 2).await.unwrap();

    assert!(!manager.release_slot("agent-1", "t-1").await.unwrap());
    let snapshot = manager.get_capacity("agent-1").await.unwrap().unwrap();
    assert_eq!(snapshot.current_tasks, 0);
}

#[tokio::test]
async fn test_get_available_agents_filters_by_slots() {
    let manager = manager();
    manager.update_capacity("agent-free", 1, 5).await.unwrap();
    manager.update_capacity("agent-full", 5, 5).await.unwrap();

    let available = manager.get_available_agents(1).await.unwrap();
    assert_eq!(available, vec!["agent-free".to_string()]);

    let roomy = manager.get_available_agents(5).await.unwrap();
    assert!(roomy.is_empty());
}

#[tokio::test]
async fn test_is_available() {
    let manager = manager();
    manager.update_capacity("agent-1", 4, 5).await.unwrap();

    assert!(manager.is_available("agent-1", 1).await.unwrap());
    assert!(!manager.is_available("agent-1", 2).await.unwrap());
    assert!(!manager.is_available("agent-unknown", 1).await.unwrap());
}
