//! 测试数据构造器
//!
//! 以合理默认值创建测试实体，支持链式定制。

use chrono::Utc;
use uuid::Uuid;

use mcp_core::models::{
    Agent, AgentCapability, AgentStatus, Task, TaskConstraints, TaskPriority, TaskStatus, TaskType,
};

/// 测试任务构造器
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: Uuid::new_v4().to_string(),
                task_type: TaskType::DataProcessing,
                priority: TaskPriority::Normal,
                status: TaskStatus::Pending,
                max_retries: 3,
                timeout_seconds: 300,
                input_data: serde_json::json!({}),
                result: None,
                required_capabilities: vec![],
                constraints: None,
                retry_count: 0,
                last_error: None,
                created_by: None,
                assigned_agent: None,
                created_at: now,
                updated_at: now,
                queued_at: None,
                assigned_at: None,
                started_at: None,
                completed_at: None,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task.task_type = task_type;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.task.max_retries = max_retries;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.task.retry_count = retry_count;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.task.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_required_capabilities(mut self, capabilities: Vec<&str>) -> Self {
        self.task.required_capabilities =
            capabilities.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_constraints(mut self, constraints: TaskConstraints) -> Self {
        self.task.constraints = Some(constraints);
        self
    }

    pub fn with_input_data(mut self, input_data: serde_json::Value) -> Self {
        self.task.input_data = input_data;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 测试Agent构造器
pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        Self {
            agent: Agent {
                email: format!("{id}@example.com"),
                id,
                name: "test-agent".to_string(),
                status: AgentStatus::Available,
                capabilities: vec![],
                supported_task_types: None,
                requires_gpu: false,
                max_concurrent_tasks: 5,
                memory_limit_mb: None,
                cpu_limit_cores: None,
                api_key_hash: "test-hash".to_string(),
                last_seen: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.agent.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.agent.name = name.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.agent.email = email.to_string();
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.agent.status = status;
        self
    }

    pub fn with_capability(mut self, name: &str, level: u32) -> Self {
        self.agent.capabilities.push(AgentCapability::new(name, level));
        self
    }

    pub fn with_supported_task_types(mut self, types: Vec<TaskType>) -> Self {
        self.agent.supported_task_types = Some(types);
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: u32) -> Self {
        self.agent.max_concurrent_tasks = max;
        self
    }

    pub fn with_memory_limit(mut self, memory_limit_mb: u64) -> Self {
        self.agent.memory_limit_mb = Some(memory_limit_mb);
        self
    }

    pub fn suspended(mut self) -> Self {
        self.agent.status = AgentStatus::Suspended;
        self
    }

    pub fn offline(mut self) -> Self {
        self.agent.status = AgentStatus::Offline;
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
