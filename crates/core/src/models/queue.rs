use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::task::TaskPriority;

/// 队列项
///
/// 任务排队期间在有序集合存储中的投影，出队/取消/过期即删除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub task_id: String,
    pub priority: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub agent_constraints: Option<serde_json::Value>,
}

impl QueueItem {
    pub fn new(task_id: &str, priority: TaskPriority) -> Self {
        Self {
            task_id: task_id.to_string(),
            priority: priority.value(),
            created_at: Utc::now(),
            agent_constraints: None,
        }
    }
}

/// 队列统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// 当前排队任务总数
    pub total_queued: u64,
    /// 各优先级的任务数
    pub by_priority: HashMap<String, u64>,
    /// 最老任务的等待秒数
    pub oldest_age_seconds: Option<u64>,
    /// 平均等待秒数
    pub avg_wait_seconds: Option<f64>,
    /// 因元数据缺失而跳过的条目数
    pub skipped: u64,
}
