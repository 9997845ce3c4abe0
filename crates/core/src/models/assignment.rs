use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 任务指派策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    RoundRobin,
    LeastLoaded,
    PriorityBased,
    CapabilityMatch,
    /// 仅用于压测或显式指定，自动选择不会采用
    Random,
}

impl AssignmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStrategy::RoundRobin => "round_robin",
            AssignmentStrategy::LeastLoaded => "least_loaded",
            AssignmentStrategy::PriorityBased => "priority_based",
            AssignmentStrategy::CapabilityMatch => "capability_match",
            AssignmentStrategy::Random => "random",
        }
    }
}

impl std::fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个Agent的指派评分
///
/// 计算产物，不落盘；`factors` 记录得分的解释性因子。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentScore {
    pub agent_id: String,
    pub score: f64,
    pub factors: HashMap<String, serde_json::Value>,
    pub strategy: AssignmentStrategy,
}

/// 指派推荐结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecommendation {
    pub task_id: String,
    pub agent_id: String,
    pub score: f64,
    pub strategy: AssignmentStrategy,
    pub reasoning: String,
    /// 参与评分的Agent数量
    pub evaluated: usize,
    /// 全部候选评分，按输入顺序
    pub scores: Vec<AssignmentScore>,
}
