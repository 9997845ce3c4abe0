//! 任务指派引擎
//!
//! 先做资格过滤再做策略评分。资格过滤是硬约束（状态、能力、任务类型、
//! 资源限制），评分只在通过过滤的候选集内比较。推荐结果携带全部候选
//! 评分与解释因子，便于排查"为什么选了这个Agent"。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info};

use mcp_core::errors::{McpError, McpResult};
use mcp_core::models::{
    Agent, AssignmentRecommendation, AssignmentScore, AssignmentStrategy, CapacitySnapshot, Task,
    TaskPriority,
};
use mcp_core::traits::AgentRepository;

use crate::capacity::CapacityManager;

/// 自动选择 round_robin 的候选数阈值
const ROUND_ROBIN_THRESHOLD: usize = 10;
/// 能力满级
const CAPABILITY_FULL_LEVEL: f64 = 10.0;

pub struct AssignmentEngine {
    agents: Arc<dyn AgentRepository>,
    capacity: Arc<CapacityManager>,
}

impl AssignmentEngine {
    pub fn new(agents: Arc<dyn AgentRepository>, capacity: Arc<CapacityManager>) -> Self {
        Self { agents, capacity }
    }

    /// 为任务推荐Agent。`strategy` 为 None 时自动选择策略。
    pub async fn recommend(
        &self,
        task: &Task,
        strategy: Option<AssignmentStrategy>,
    ) -> McpResult<AssignmentRecommendation> {
        let eligible = self.eligible_agents(task).await?;
        if eligible.is_empty() {
            return Err(McpError::NoEligibleAgents(format!(
                "任务 {} 没有符合条件的Agent",
                task.id
            )));
        }

        let strategy = strategy.unwrap_or_else(|| Self::auto_strategy(task, eligible.len()));
        let snapshots = self.capacity.snapshots().await?;

        let scores: Vec<AssignmentScore> = eligible
            .iter()
            .map(|agent| self.score(task, agent, &snapshots, strategy))
            .collect();

        // 最高分获胜，同分时按 agent_id 字典序保证结果可复现
        let best = scores
            .iter()
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.agent_id.cmp(&a.agent_id))
            })
            .ok_or_else(|| McpError::internal("评分集为空"))?;

        let recommendation = AssignmentRecommendation {
            task_id: task.id.clone(),
            agent_id: best.agent_id.clone(),
            score: best.score,
            strategy,
            reasoning: format!(
                "策略 {} 在 {} 个候选中选出 {}（得分 {:.3}）",
                strategy,
                scores.len(),
                best.agent_id,
                best.score
            ),
            evaluated: scores.len(),
            scores: scores.clone(),
        };
        info!(
            "指派推荐: 任务 {} -> Agent {} (策略={} 候选={})",
            task.id, recommendation.agent_id, strategy, recommendation.evaluated
        );
        Ok(recommendation)
    }

    /// 资格过滤：硬约束全部满足才进入评分
    async fn eligible_agents(&self, task: &Task) -> McpResult<Vec<Agent>> {
        let all = self.agents.list().await?;
        let mut eligible = Vec::new();
        for agent in all {
            if !agent.is_schedulable() {
                continue;
            }
            if !agent.accepts_task_type(task.task_type) {
                continue;
            }
            if !agent.has_capabilities(&task.required_capabilities) {
                debug!("Agent {} 缺少任务 {} 要求的能力", agent.id, task.id);
                continue;
            }
            if let Some(constraints) = &task.constraints {
                if constraints.requires_gpu && !agent.requires_gpu {
                    continue;
                }
                if let (Some(need), Some(limit)) = (constraints.memory_mb, agent.memory_limit_mb) {
                    if need > limit {
                        continue;
                    }
                }
                if let (Some(need), Some(limit)) = (constraints.cpu_cores, agent.cpu_limit_cores) {
                    if need > limit {
                        continue;
                    }
                }
            }
            eligible.push(agent);
        }
        Ok(eligible)
    }

    /// 自动策略选择：有能力要求优先匹配能力，高优先级任务看
    /// priority_handling，候选多时轮询摊平，其余情况按负载最低
    fn auto_strategy(task: &Task, eligible_count: usize) -> AssignmentStrategy {
        if !task.required_capabilities.is_empty() {
            AssignmentStrategy::CapabilityMatch
        } else if matches!(task.priority, TaskPriority::High | TaskPriority::Critical) {
            AssignmentStrategy::PriorityBased
        } else if eligible_count > ROUND_ROBIN_THRESHOLD {
            AssignmentStrategy::RoundRobin
        } else {
            AssignmentStrategy::LeastLoaded
        }
    }

    fn score(
        &self,
        task: &Task,
        agent: &Agent,
        snapshots: &HashMap<String, CapacitySnapshot>,
        strategy: AssignmentStrategy,
    ) -> AssignmentScore {
        let mut factors = HashMap::new();
        let score = match strategy {
            AssignmentStrategy::RoundRobin => {
                // 无状态轮询：任务id与Agent id联合散列，
                // 同一任务的重复评估结果稳定，不同任务间均匀分布
                let mut hasher = DefaultHasher::new();
                task.id.hash(&mut hasher);
                agent.id.hash(&mut hasher);
                let score = (hasher.finish() % 1000) as f64 / 1000.0;
                factors.insert("hash_bucket".to_string(), serde_json::json!(score));
                score
            }
            AssignmentStrategy::LeastLoaded => match snapshots.get(&agent.id) {
                Some(snapshot) => {
                    let load = snapshot.load_ratio();
                    factors.insert("load_ratio".to_string(), serde_json::json!(load));
                    1.0 - load
                }
                None => {
                    // 容量未知给中性分，不因缺上报被排除也不被偏爱
                    factors.insert("load_ratio".to_string(), serde_json::json!(null));
                    0.5
                }
            },
            AssignmentStrategy::PriorityBased => {
                // priority_handling 等级视为Agent能稳妥处理的优先级上限，
                // 达到任务优先级给满分，不足按比例给部分分
                let required = f64::from(task.priority.value());
                match agent.capability_level("priority_handling") {
                    Some(level) => {
                        let score = if f64::from(level) >= required {
                            1.0
                        } else {
                            f64::from(level) / required
                        };
                        factors
                            .insert("priority_handling_level".to_string(), serde_json::json!(level));
                        factors
                            .insert("task_priority".to_string(), serde_json::json!(task.priority.value()));
                        score
                    }
                    None => {
                        factors.insert("priority_handling_level".to_string(), serde_json::json!(null));
                        0.3
                    }
                }
            }
            AssignmentStrategy::CapabilityMatch => {
                if task.required_capabilities.is_empty() {
                    factors.insert("required".to_string(), serde_json::json!(0));
                    0.7
                } else {
                    // 资格过滤已保证能力齐全，这里按熟练度取均值
                    let sum: f64 = task
                        .required_capabilities
                        .iter()
                        .map(|name| {
                            let level = agent.capability_level(name).unwrap_or(0);
                            (f64::from(level) / CAPABILITY_FULL_LEVEL).min(1.0)
                        })
                        .sum();
                    let score = sum / task.required_capabilities.len() as f64;
                    factors.insert(
                        "required".to_string(),
                        serde_json::json!(task.required_capabilities.len()),
                    );
                    factors.insert("mean_proficiency".to_string(), serde_json::json!(score));
                    score
                }
            }
            AssignmentStrategy::Random => {
                let score: f64 = rand::random();
                factors.insert("random".to_string(), serde_json::json!(score));
                score
            }
        };
        AssignmentScore {
            agent_id: agent.id.clone(),
            score,
            factors,
            strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_core::models::TaskPriority;
    use mcp_testing_utils::TaskBuilder;

    #[test]
    fn test_auto_strategy_selection() {
        let with_caps = TaskBuilder::new()
            .with_required_capabilities(vec!["gpu_inference"])
            .build();
        assert_eq!(
            AssignmentEngine::auto_strategy(&with_caps, 3),
            AssignmentStrategy::CapabilityMatch
        );

        let urgent = TaskBuilder::new()
            .with_priority(TaskPriority::Critical)
            .build();
        assert_eq!(
            AssignmentEngine::auto_strategy(&urgent, 3),
            AssignmentStrategy::PriorityBased
        );

        let plain = TaskBuilder::new()
            .with_priority(TaskPriority::Normal)
            .build();
        assert_eq!(
            AssignmentEngine::auto_strategy(&plain, 11),
            AssignmentStrategy::RoundRobin
        );
        assert_eq!(
            AssignmentEngine::auto_strategy(&plain, 10),
            AssignmentStrategy::LeastLoaded
        );
    }

    #[test]
    fn test_round_robin_is_stable_per_task() {
        let task = TaskBuilder::new().with_id("t-stable").build();
        let mut hasher_a = DefaultHasher::new();
        task.id.hash(&mut hasher_a);
        "agent-a".to_string().hash(&mut hasher_a);
        let mut hasher_b = DefaultHasher::new();
        task.id.hash(&mut hasher_b);
        "agent-a".to_string().hash(&mut hasher_b);
        assert_eq!(hasher_a.finish(), hasher_b.finish());
    }
}
