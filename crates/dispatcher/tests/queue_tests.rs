//! 任务队列集成测试

use std::collections::HashSet;
use std::sync::Arc;

use mcp_core::models::{TaskPriority, TaskStatus};
use mcp_core::traits::DurableStore;
use mcp_dispatcher::TaskQueue;
use mcp_infrastructure::MemoryStore;
use mcp_testing_utils::TaskBuilder;

fn queue() -> (Arc<dyn DurableStore>, TaskQueue) {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let queue = TaskQueue::new(Arc::clone(&store), "test", 3600);
    (store, queue)
}

#[tokio::test]
async fn test_high_priority_dequeued_before_earlier_normal() {
    let (_, queue) = queue();

    // NORMAL 先入队，HIGH 后入队，出队仍是 HIGH 在前
    let mut normal = TaskBuilder::new()
        .with_id("t-normal")
        .with_priority(TaskPriority::Normal)
        .build();
    queue.enqueue(&mut normal).await.unwrap();

    let mut high = TaskBuilder::new()
        .with_id("t-high")
        .with_priority(TaskPriority::High)
        .build();
    queue.enqueue(&mut high).await.unwrap();

    assert_eq!(
        queue.dequeue("agent-1", None).await.unwrap().as_deref(),
        Some("t-high")
    );
    assert_eq!(
        queue.dequeue("agent-1", None).await.unwrap().as_deref(),
        Some("t-normal")
    );
    assert_eq!(queue.dequeue("agent-1", None).await.unwrap(), None);
}

#[tokio::test]
async fn test_aged_task_outranks_fresh_same_priority() {
    let (store, queue) = queue();

    // 新任务先入队，创建已两小时的老任务后入队，出队仍是老任务在前
    let mut fresh = TaskBuilder::new()
        .with_id("t-fresh")
        .with_priority(TaskPriority::Low)
        .build();
    queue.enqueue(&mut fresh).await.unwrap();

    let mut aged = TaskBuilder::new()
        .with_id("t-aged")
        .with_priority(TaskPriority::Low)
        .build();
    aged.created_at = chrono::Utc::now() - chrono::Duration::hours(2);
    queue.enqueue(&mut aged).await.unwrap();

    let aged_score = store.zscore("test:queue:tasks", "t-aged").await.unwrap().unwrap();
    let fresh_score = store.zscore("test:queue:tasks", "t-fresh").await.unwrap().unwrap();
    assert!(aged_score > fresh_score);

    assert_eq!(queue.position("t-aged").await.unwrap(), Some(0));
    assert_eq!(
        queue.dequeue("agent-1", None).await.unwrap().as_deref(),
        Some("t-aged")
    );
}

#[tokio::test]
async fn test_enqueue_transitions_to_queued() {
    let (_, queue) = queue();
    let mut task = TaskBuilder::new().build();
    queue.enqueue(&mut task).await.unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert!(task.queued_at.is_some());
}

#[tokio::test]
async fn test_enqueue_rejects_non_pending() {
    let (_, queue) = queue();
    let mut task = TaskBuilder::new().with_status(TaskStatus::Running).build();
    assert!(queue.enqueue(&mut task).await.is_err());
}

#[tokio::test]
async fn test_double_enqueue_conflict() {
    let (_, queue) = queue();
    let mut task = TaskBuilder::new().with_id("t-dup").build();
    queue.enqueue(&mut task).await.unwrap();

    let mut again = TaskBuilder::new().with_id("t-dup").build();
    assert!(queue.enqueue(&mut again).await.is_err());
}

#[tokio::test]
async fn test_no_double_dequeue_under_concurrency() {
    let (_, queue) = queue();
    let queue = Arc::new(queue);

    for i in 0..5 {
        let mut task = TaskBuilder::new().with_id(&format!("t-{i}")).build();
        queue.enqueue(&mut task).await.unwrap();
    }

    // 10个并发出队者争抢5个任务，每个任务只能被拿到一次
    let mut handles = Vec::new();
    for worker in 0..10 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            queue.dequeue(&format!("agent-{worker}"), None).await.unwrap()
        }));
    }

    let mut claimed = HashSet::new();
    let mut misses = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Some(task_id) => {
                assert!(claimed.insert(task_id), "同一任务被重复出队");
            }
            None => misses += 1,
        }
    }
    assert_eq!(claimed.len(), 5);
    assert_eq!(misses, 5);
}

#[tokio::test]
async fn test_dequeue_priority_ceiling() {
    let (_, queue) = queue();

    let mut critical = TaskBuilder::new()
        .with_id("t-critical")
        .with_priority(TaskPriority::Critical)
        .build();
    queue.enqueue(&mut critical).await.unwrap();
    let mut low = TaskBuilder::new()
        .with_id("t-low")
        .with_priority(TaskPriority::Low)
        .build();
    queue.enqueue(&mut low).await.unwrap();

    // 上限 NORMAL 时跳过 CRITICAL，拿到 LOW
    assert_eq!(
        queue
            .dequeue("agent-1", Some(TaskPriority::Normal))
            .await
            .unwrap()
            .as_deref(),
        Some("t-low")
    );
    // 不设上限时拿到 CRITICAL
    assert_eq!(
        queue.dequeue("agent-1", None).await.unwrap().as_deref(),
        Some("t-critical")
    );
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let (_, queue) = queue();
    let mut task = TaskBuilder::new().with_id("t-cancel").build();
    queue.enqueue(&mut task).await.unwrap();

    assert!(queue.cancel("t-cancel").await.unwrap());
    assert!(!queue.cancel("t-cancel").await.unwrap());
    assert!(!queue.cancel("t-never-queued").await.unwrap());
}

#[tokio::test]
async fn test_position_reflects_priority_order() {
    let (_, queue) = queue();

    let mut low = TaskBuilder::new()
        .with_id("t-low")
        .with_priority(TaskPriority::Low)
        .build();
    queue.enqueue(&mut low).await.unwrap();
    let mut critical = TaskBuilder::new()
        .with_id("t-critical")
        .with_priority(TaskPriority::Critical)
        .build();
    queue.enqueue(&mut critical).await.unwrap();

    assert_eq!(queue.position("t-critical").await.unwrap(), Some(0));
    assert_eq!(queue.position("t-low").await.unwrap(), Some(1));
    assert_eq!(queue.position("t-missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_stats_skip_missing_metadata() {
    let (store, queue) = queue();

    for (id, priority) in [
        ("t-1", TaskPriority::Normal),
        ("t-2", TaskPriority::Normal),
        ("t-3", TaskPriority::High),
    ] {
        let mut task = TaskBuilder::new().with_id(id).with_priority(priority).build();
        queue.enqueue(&mut task).await.unwrap();
    }

    // 模拟元数据TTL先于分值过期
    store.delete("test:queue:item:t-2").await.unwrap();

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.total_queued, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.by_priority.get("NORMAL"), Some(&1));
    assert_eq!(stats.by_priority.get("HIGH"), Some(&1));
    assert!(stats.avg_wait_seconds.is_some());
}

#[tokio::test]
async fn test_cleanup_removes_orphans() {
    let (store, queue) = queue();

    let mut task = TaskBuilder::new().with_id("t-orphan").build();
    queue.enqueue(&mut task).await.unwrap();
    store.delete("test:queue:item:t-orphan").await.unwrap();

    assert_eq!(queue.cleanup_expired_items().await.unwrap(), 1);
    assert_eq!(queue.position("t-orphan").await.unwrap(), None);
}
