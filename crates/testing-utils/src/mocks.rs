//! 仓储Mock实现
//!
//! 基于内存HashMap的仓储，行为与真实文档存储一致。
//! `FailingAgentRepository` 可按Agent id注入更新失败，
//! 用于验证封锁清单的逐项成败统计。

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use mcp_core::errors::{McpError, McpResult};
use mcp_core::models::{Agent, AgentStatus, Task, TaskStatus};
use mcp_core::traits::{AgentRepository, TaskRepository};

/// 任务仓储Mock
#[derive(Debug, Clone, Default)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let map = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            tasks: Arc::new(Mutex::new(map)),
        }
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.tasks.lock().unwrap().clear();
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: &Task) -> McpResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&task.id) {
            return Err(McpError::conflict(format!("任务已存在: {}", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> McpResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn update(&self, task: &Task) -> McpResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(McpError::task_not_found(&task.id));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_by_status(&self, status: TaskStatus) -> McpResult<Vec<Task>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }
}

/// Agent仓储Mock
#[derive(Debug, Clone, Default)]
pub struct MockAgentRepository {
    agents: Arc<Mutex<HashMap<String, Agent>>>,
}

impl MockAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: Vec<Agent>) -> Self {
        let map = agents.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self {
            agents: Arc::new(Mutex::new(map)),
        }
    }

    pub fn count(&self) -> usize {
        self.agents.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentRepository for MockAgentRepository {
    async fn create(&self, agent: &Agent) -> McpResult<()> {
        let mut agents = self.agents.lock().unwrap();
        if agents.values().any(|a| a.email == agent.email) {
            return Err(McpError::conflict(format!("邮箱已注册: {}", agent.email)));
        }
        agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> McpResult<Option<Agent>> {
        Ok(self.agents.lock().unwrap().get(id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> McpResult<Option<Agent>> {
        Ok(self
            .agents
            .lock()
            .unwrap()
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn update(&self, agent: &Agent) -> McpResult<()> {
        let mut agents = self.agents.lock().unwrap();
        if !agents.contains_key(&agent.id) {
            return Err(McpError::agent_not_found(&agent.id));
        }
        agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn list(&self) -> McpResult<Vec<Agent>> {
        Ok(self.agents.lock().unwrap().values().cloned().collect())
    }

    async fn list_by_status(&self, status: AgentStatus) -> McpResult<Vec<Agent>> {
        Ok(self
            .agents
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect())
    }
}

/// 可注入更新失败的Agent仓储
#[derive(Debug, Clone)]
pub struct FailingAgentRepository {
    inner: MockAgentRepository,
    fail_update_for: Arc<Mutex<HashSet<String>>>,
}

impl FailingAgentRepository {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            inner: MockAgentRepository::with_agents(agents),
            fail_update_for: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 指定对某Agent的更新操作固定失败
    pub fn fail_update(&self, agent_id: &str) {
        self.fail_update_for
            .lock()
            .unwrap()
            .insert(agent_id.to_string());
    }
}

#[async_trait]
impl AgentRepository for FailingAgentRepository {
    async fn create(&self, agent: &Agent) -> McpResult<()> {
        self.inner.create(agent).await
    }

    async fn get_by_id(&self, id: &str) -> McpResult<Option<Agent>> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_email(&self, email: &str) -> McpResult<Option<Agent>> {
        self.inner.get_by_email(email).await
    }

    async fn update(&self, agent: &Agent) -> McpResult<()> {
        if self.fail_update_for.lock().unwrap().contains(&agent.id) {
            return Err(McpError::store_error(format!(
                "注入的更新失败: {}",
                agent.id
            )));
        }
        self.inner.update(agent).await
    }

    async fn list(&self) -> McpResult<Vec<Agent>> {
        self.inner.list().await
    }

    async fn list_by_status(&self, status: AgentStatus) -> McpResult<Vec<Agent>> {
        self.inner.list_by_status(status).await
    }
}
