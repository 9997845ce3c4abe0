use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent容量快照
///
/// TTL受限的临时记录：Agent停止上报后快照自动过期，
/// 对调度器表现为"未知"而非"空闲"。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapacitySnapshot {
    pub agent_id: String,
    pub current_tasks: u32,
    pub max_tasks: u32,
    pub updated_at: DateTime<Utc>,
}

impl CapacitySnapshot {
    pub fn new(agent_id: &str, current_tasks: u32, max_tasks: u32) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            current_tasks,
            max_tasks,
            updated_at: Utc::now(),
        }
    }

    /// 剩余可用槽位数
    pub fn available_slots(&self) -> u32 {
        self.max_tasks.saturating_sub(self.current_tasks)
    }

    /// 负载比例（0.0-1.0），max_tasks 为 0 时视为满载
    pub fn load_ratio(&self) -> f64 {
        if self.max_tasks == 0 {
            return 1.0;
        }
        f64::from(self.current_tasks) / f64::from(self.max_tasks)
    }
}
