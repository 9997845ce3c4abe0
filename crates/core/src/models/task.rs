use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::{McpError, McpResult};

/// 任务定义
///
/// 表示一次可委派执行的工作单元，包含调度所需的完整配置。
///
/// # 字段说明
///
/// - `id`: 任务的唯一标识符，创建时生成，不可变
/// - `task_type`: 任务类别
/// - `priority`: 调度优先级，数值越大越先被服务
/// - `status`: 任务状态机当前状态
/// - `max_retries`: 最大重试次数（0-10）
/// - `timeout_seconds`: 执行超时时间（30-3600秒）
/// - `input_data`: 不透明的输入载荷，调度器不解析其内容
/// - `result`: 执行结果记录（可选）
/// - `required_capabilities`: 被指派Agent必须具备的能力名集合
/// - `constraints`: Agent选择约束（如内存上限）
/// - `retry_count`: 已重试次数，恒不超过 `max_retries`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub input_data: serde_json::Value,
    pub result: Option<TaskResult>,
    pub required_capabilities: Vec<String>,
    pub constraints: Option<TaskConstraints>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_by: Option<String>,
    pub assigned_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 任务类别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DataProcessing,
    AiAnalysis,
    BiasDetection,
    PipelineExecution,
    Validation,
    Transformation,
    ReportGeneration,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DataProcessing => "data_processing",
            TaskType::AiAnalysis => "ai_analysis",
            TaskType::BiasDetection => "bias_detection",
            TaskType::PipelineExecution => "pipeline_execution",
            TaskType::Validation => "validation",
            TaskType::Transformation => "transformation",
            TaskType::ReportGeneration => "report_generation",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务优先级
///
/// 数值参与队列评分：分值 = 优先级 * 1000 + 等待时间加成。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// 优先级的数值权重
    pub fn value(&self) -> u32 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Normal => 5,
            TaskPriority::High => 10,
            TaskPriority::Critical => 20,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(TaskPriority::Low),
            5 => Some(TaskPriority::Normal),
            10 => Some(TaskPriority::High),
            20 => Some(TaskPriority::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Normal => "NORMAL",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务状态
///
/// 状态机：PENDING -> QUEUED -> ASSIGNED -> RUNNING -> 终态。
/// FAILED/TIMEOUT 在重试次数允许时可回到 QUEUED，
/// 任何非终态都可以转到 CANCELLED。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Queued,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    /// 状态转换合法性检查
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, target),
            (Pending, Queued)
                | (Pending, Cancelled)
                | (Queued, Assigned)
                | (Queued, Cancelled)
                | (Assigned, Running)
                | (Assigned, Queued)
                | (Assigned, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Timeout)
                | (Failed, Queued)
                | (Timeout, Queued)
        )
    }

    /// 是否为终态（不再发生任何转换）
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Assigned => "ASSIGNED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub logs: Vec<String>,
}

/// Agent选择约束
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConstraints {
    /// 任务需要的内存（MB）
    pub memory_mb: Option<u64>,
    /// 任务需要的CPU核数
    pub cpu_cores: Option<f64>,
    /// 是否要求GPU
    pub requires_gpu: bool,
}

/// 创建任务请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub task_type: TaskType,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub input_data: serde_json::Value,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub constraints: Option<TaskConstraints>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Normal
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    300
}

pub const MIN_TIMEOUT_SECONDS: u64 = 30;
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;
pub const MAX_RETRIES_LIMIT: u32 = 10;

impl CreateTaskRequest {
    /// 校验请求参数
    pub fn validate(&self) -> McpResult<()> {
        if self.timeout_seconds < MIN_TIMEOUT_SECONDS || self.timeout_seconds > MAX_TIMEOUT_SECONDS
        {
            return Err(McpError::validation(format!(
                "timeout_seconds 必须在 {MIN_TIMEOUT_SECONDS}-{MAX_TIMEOUT_SECONDS} 之间: {}",
                self.timeout_seconds
            )));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(McpError::validation(format!(
                "max_retries 不能超过 {MAX_RETRIES_LIMIT}: {}",
                self.max_retries
            )));
        }
        if let Some(constraints) = &self.constraints {
            if let Some(memory_mb) = constraints.memory_mb {
                if memory_mb == 0 {
                    return Err(McpError::validation("memory_mb 必须为正数"));
                }
            }
            if let Some(cpu_cores) = constraints.cpu_cores {
                if cpu_cores <= 0.0 {
                    return Err(McpError::validation("cpu_cores 必须为正数"));
                }
            }
        }
        Ok(())
    }
}

impl Task {
    /// 根据创建请求生成新任务，初始状态为 PENDING
    pub fn from_request(request: &CreateTaskRequest, created_by: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_type: request.task_type,
            priority: request.priority,
            status: TaskStatus::Pending,
            max_retries: request.max_retries,
            timeout_seconds: request.timeout_seconds,
            input_data: request.input_data.clone(),
            result: None,
            required_capabilities: request.required_capabilities.clone(),
            constraints: request.constraints.clone(),
            retry_count: 0,
            last_error: None,
            created_by: created_by.map(|s| s.to_string()),
            assigned_agent: None,
            created_at: now,
            updated_at: now,
            queued_at: None,
            assigned_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// 是否还允许重试
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 执行状态转换，非法转换返回错误且不修改任务
    pub fn transition_to(&mut self, target: TaskStatus) -> McpResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(McpError::invalid_transition(self.status, target));
        }
        let now = Utc::now();
        match target {
            TaskStatus::Queued => {
                self.queued_at = Some(now);
                // 重试回队时清掉上一轮执行留下的时间戳
                self.assigned_at = None;
                self.started_at = None;
                self.completed_at = None;
            }
            TaskStatus::Assigned => self.assigned_at = Some(now),
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
            | TaskStatus::Timeout => self.completed_at = Some(now),
            TaskStatus::Pending => {}
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }
}
