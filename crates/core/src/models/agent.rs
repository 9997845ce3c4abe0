use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskType;

/// Agent（工作节点）信息
///
/// 凭证只保存单向哈希，明文API密钥仅在注册/重置时返回一次。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: AgentStatus,
    pub capabilities: Vec<AgentCapability>,
    /// 支持的任务类型白名单，None 表示不限制
    pub supported_task_types: Option<Vec<TaskType>>,
    pub requires_gpu: bool,
    pub max_concurrent_tasks: u32,
    pub memory_limit_mb: Option<u64>,
    pub cpu_limit_cores: Option<f64>,
    pub api_key_hash: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Agent状态
///
/// 统一后的状态枚举：AVAILABLE/BUSY 可参与任务指派，
/// 其余状态对调度器均视为不可用。AVAILABLE 等价于旧语义中的 ACTIVE。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Available,
    Busy,
    Offline,
    Suspended,
    Pending,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Available => "AVAILABLE",
            AgentStatus::Busy => "BUSY",
            AgentStatus::Offline => "OFFLINE",
            AgentStatus::Suspended => "SUSPENDED",
            AgentStatus::Pending => "PENDING",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 具名分级能力
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCapability {
    pub name: String,
    /// 熟练度等级，指派评分中以 10 为满级
    pub level: u32,
}

impl AgentCapability {
    pub fn new<S: Into<String>>(name: S, level: u32) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}

/// Agent注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub capabilities: Vec<AgentCapability>,
    #[serde(default)]
    pub supported_task_types: Option<Vec<TaskType>>,
    #[serde(default)]
    pub requires_gpu: bool,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u32,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    #[serde(default)]
    pub cpu_limit_cores: Option<f64>,
}

fn default_max_concurrent_tasks() -> u32 {
    5
}

impl Agent {
    /// 根据注册请求生成Agent，初始状态为 AVAILABLE
    pub fn from_request(request: &RegisterAgentRequest, api_key_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: request.name.clone(),
            email: request.email.clone(),
            status: AgentStatus::Available,
            capabilities: request.capabilities.clone(),
            supported_task_types: request.supported_task_types.clone(),
            requires_gpu: request.requires_gpu,
            max_concurrent_tasks: request.max_concurrent_tasks,
            memory_limit_mb: request.memory_limit_mb,
            cpu_limit_cores: request.cpu_limit_cores,
            api_key_hash,
            last_seen: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否可参与任务指派
    pub fn is_schedulable(&self) -> bool {
        matches!(self.status, AgentStatus::Available | AgentStatus::Busy)
    }

    /// 查询某能力的等级
    pub fn capability_level(&self, name: &str) -> Option<u32> {
        self.capabilities
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.level)
    }

    /// 是否具备全部要求的能力
    pub fn has_capabilities(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|name| self.capabilities.iter().any(|c| &c.name == name))
    }

    /// 是否接受指定任务类型
    pub fn accepts_task_type(&self, task_type: TaskType) -> bool {
        match &self.supported_task_types {
            Some(types) => types.contains(&task_type),
            None => true,
        }
    }

    /// 更新最近活动时间
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_seen = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        Agent::from_request(
            &RegisterAgentRequest {
                name: "worker-1".to_string(),
                email: "worker1@example.com".to_string(),
                capabilities: vec![
                    AgentCapability::new("gpu_inference", 8),
                    AgentCapability::new("data_cleaning", 5),
                ],
                supported_task_types: Some(vec![TaskType::AiAnalysis]),
                requires_gpu: true,
                max_concurrent_tasks: 4,
                memory_limit_mb: Some(8192),
                cpu_limit_cores: Some(4.0),
            },
            "hash".to_string(),
        )
    }

    #[test]
    fn test_schedulable_statuses() {
        let mut a = agent();
        a.status = AgentStatus::Available;
        assert!(a.is_schedulable());
        a.status = AgentStatus::Busy;
        assert!(a.is_schedulable());
        for status in [
            AgentStatus::Offline,
            AgentStatus::Suspended,
            AgentStatus::Pending,
        ] {
            a.status = status;
            assert!(!a.is_schedulable(), "{status} 不应可调度");
        }
    }

    #[test]
    fn test_capability_queries() {
        let a = agent();
        assert_eq!(a.capability_level("gpu_inference"), Some(8));
        assert_eq!(a.capability_level("unknown"), None);
        assert!(a.has_capabilities(&["gpu_inference".to_string()]));
        assert!(!a.has_capabilities(&[
            "gpu_inference".to_string(),
            "report_writing".to_string()
        ]));
    }

    #[test]
    fn test_task_type_allowlist() {
        let mut a = agent();
        assert!(a.accepts_task_type(TaskType::AiAnalysis));
        assert!(!a.accepts_task_type(TaskType::DataProcessing));
        a.supported_task_types = None;
        assert!(a.accepts_task_type(TaskType::DataProcessing));
    }
}
