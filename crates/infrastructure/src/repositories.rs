//! 存储之上的文档仓储
//!
//! 任务与Agent以JSON文档形式存入 `DurableStore`，邮箱唯一性通过
//! 独立索引键保证。按状态列举做全键扫描，规模与活跃实体数成正比，
//! 对巡检和指派的调用频率而言足够。

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use mcp_core::errors::{McpError, McpResult};
use mcp_core::models::{Agent, AgentStatus, Task, TaskStatus};
use mcp_core::traits::{AgentRepository, DurableStore, TaskRepository};

pub struct StoreTaskRepository {
    store: Arc<dyn DurableStore>,
    key_prefix: String,
}

impl StoreTaskRepository {
    pub fn new(store: Arc<dyn DurableStore>, key_prefix: &str) -> Self {
        Self {
            store,
            key_prefix: key_prefix.to_string(),
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}:task:{}", self.key_prefix, id)
    }
}

#[async_trait]
impl TaskRepository for StoreTaskRepository {
    async fn create(&self, task: &Task) -> McpResult<()> {
        let key = self.key(&task.id);
        if self.store.get(&key).await?.is_some() {
            return Err(McpError::conflict(format!("任务已存在: {}", task.id)));
        }
        self.store.set(&key, &serde_json::to_string(task)?).await
    }

    async fn get_by_id(&self, id: &str) -> McpResult<Option<Task>> {
        match self.store.get(&self.key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, task: &Task) -> McpResult<()> {
        let key = self.key(&task.id);
        if self.store.get(&key).await?.is_none() {
            return Err(McpError::task_not_found(&task.id));
        }
        self.store.set(&key, &serde_json::to_string(task)?).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> McpResult<Vec<Task>> {
        let keys = self
            .store
            .keys(&format!("{}:task:*", self.key_prefix))
            .await?;
        let mut tasks = Vec::new();
        for key in keys {
            let raw = match self.store.get(&key).await? {
                Some(raw) => raw,
                None => continue,
            };
            match serde_json::from_str::<Task>(&raw) {
                Ok(task) if task.status == status => tasks.push(task),
                Ok(_) => {}
                Err(e) => warn!("任务文档损坏，跳过: {key} ({e})"),
            }
        }
        Ok(tasks)
    }
}

pub struct StoreAgentRepository {
    store: Arc<dyn DurableStore>,
    key_prefix: String,
}

impl StoreAgentRepository {
    pub fn new(store: Arc<dyn DurableStore>, key_prefix: &str) -> Self {
        Self {
            store,
            key_prefix: key_prefix.to_string(),
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}:agent:id:{}", self.key_prefix, id)
    }

    fn email_key(&self, email: &str) -> String {
        format!("{}:agent:email:{}", self.key_prefix, email.to_lowercase())
    }
}

#[async_trait]
impl AgentRepository for StoreAgentRepository {
    async fn create(&self, agent: &Agent) -> McpResult<()> {
        let key = self.key(&agent.id);
        if self.store.get(&key).await?.is_some() {
            return Err(McpError::conflict(format!("Agent已存在: {}", agent.id)));
        }
        // 邮箱索引键先写者得，保证唯一
        if !self
            .store
            .compare_and_swap(&self.email_key(&agent.email), None, &agent.id, 0)
            .await?
        {
            return Err(McpError::conflict(format!("邮箱已注册: {}", agent.email)));
        }
        self.store.set(&key, &serde_json::to_string(agent)?).await
    }

    async fn get_by_id(&self, id: &str) -> McpResult<Option<Agent>> {
        match self.store.get(&self.key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn get_by_email(&self, email: &str) -> McpResult<Option<Agent>> {
        match self.store.get(&self.email_key(email)).await? {
            Some(agent_id) => self.get_by_id(&agent_id).await,
            None => Ok(None),
        }
    }

    async fn update(&self, agent: &Agent) -> McpResult<()> {
        let key = self.key(&agent.id);
        if self.store.get(&key).await?.is_none() {
            return Err(McpError::agent_not_found(&agent.id));
        }
        self.store.set(&key, &serde_json::to_string(agent)?).await
    }

    async fn list(&self) -> McpResult<Vec<Agent>> {
        let keys = self
            .store
            .keys(&format!("{}:agent:id:*", self.key_prefix))
            .await?;
        let mut agents = Vec::new();
        for key in keys {
            let raw = match self.store.get(&key).await? {
                Some(raw) => raw,
                None => continue,
            };
            match serde_json::from_str::<Agent>(&raw) {
                Ok(agent) => agents.push(agent),
                Err(e) => warn!("Agent文档损坏，跳过: {key} ({e})"),
            }
        }
        Ok(agents)
    }

    async fn list_by_status(&self, status: AgentStatus) -> McpResult<Vec<Agent>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|a| a.status == status)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use chrono::Utc;
    use mcp_core::models::{RegisterAgentRequest, TaskPriority, TaskType};
    use mcp_core::models::{CreateTaskRequest, Task};

    fn store() -> Arc<dyn DurableStore> {
        Arc::new(MemoryStore::new())
    }

    fn task() -> Task {
        Task::from_request(
            &CreateTaskRequest {
                task_type: TaskType::Validation,
                priority: TaskPriority::Normal,
                max_retries: 3,
                timeout_seconds: 300,
                input_data: serde_json::json!({}),
                required_capabilities: vec![],
                constraints: None,
                metadata: Default::default(),
            },
            None,
        )
    }

    fn agent(email: &str) -> Agent {
        Agent::from_request(
            &RegisterAgentRequest {
                name: "worker".to_string(),
                email: email.to_string(),
                capabilities: vec![],
                supported_task_types: None,
                requires_gpu: false,
                max_concurrent_tasks: 4,
                memory_limit_mb: None,
                cpu_limit_cores: None,
            },
            "hash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_task_crud_and_status_listing() {
        let repo = StoreTaskRepository::new(store(), "test");
        let mut task = task();
        repo.create(&task).await.unwrap();
        assert!(matches!(
            repo.create(&task).await.unwrap_err(),
            McpError::Conflict(_)
        ));

        task.status = mcp_core::models::TaskStatus::Queued;
        task.queued_at = Some(Utc::now());
        repo.update(&task).await.unwrap();

        let loaded = repo.get_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, mcp_core::models::TaskStatus::Queued);

        let queued = repo
            .list_by_status(mcp_core::models::TaskStatus::Queued)
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);
        let pending = repo
            .list_by_status(mcp_core::models::TaskStatus::Pending)
            .await
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_task_fails() {
        let repo = StoreTaskRepository::new(store(), "test");
        let task = task();
        assert!(matches!(
            repo.update(&task).await.unwrap_err(),
            McpError::TaskNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_agent_email_uniqueness() {
        let repo = StoreAgentRepository::new(store(), "test");
        let first = agent("a@example.com");
        repo.create(&first).await.unwrap();

        let duplicate = agent("A@Example.com");
        assert!(matches!(
            repo.create(&duplicate).await.unwrap_err(),
            McpError::Conflict(_)
        ));

        let found = repo.get_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_agent_status_listing() {
        let repo = StoreAgentRepository::new(store(), "test");
        let mut a = agent("a@example.com");
        repo.create(&a).await.unwrap();
        let b = agent("b@example.com");
        repo.create(&b).await.unwrap();

        a.status = AgentStatus::Suspended;
        repo.update(&a).await.unwrap();

        let suspended = repo.list_by_status(AgentStatus::Suspended).await.unwrap();
        assert_eq!(suspended.len(), 1);
        assert_eq!(suspended[0].id, a.id);
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }
}
