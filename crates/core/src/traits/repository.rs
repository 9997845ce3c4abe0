use async_trait::async_trait;

use crate::errors::McpResult;
use crate::models::{Agent, AgentStatus, Task, TaskStatus};

/// 任务目录仓储
///
/// 调度器从不物理删除任务，归档由外部负责。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> McpResult<()>;

    async fn get_by_id(&self, id: &str) -> McpResult<Option<Task>>;

    async fn update(&self, task: &Task) -> McpResult<()>;

    async fn list_by_status(&self, status: TaskStatus) -> McpResult<Vec<Task>>;
}

/// Agent身份仓储
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, agent: &Agent) -> McpResult<()>;

    async fn get_by_id(&self, id: &str) -> McpResult<Option<Agent>>;

    async fn get_by_email(&self, email: &str) -> McpResult<Option<Agent>>;

    async fn update(&self, agent: &Agent) -> McpResult<()>;

    async fn list(&self) -> McpResult<Vec<Agent>>;

    async fn list_by_status(&self, status: AgentStatus) -> McpResult<Vec<Agent>>;
}
