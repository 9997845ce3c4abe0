//! 任务优先级队列
//!
//! 基于有序集合存储的持久化队列。分值 = 优先级 * 1000 + 等待加成，
//! 粗粒度乘数保证优先级严格支配等待时间，等待加成在约一小时后封顶，
//! 同优先级内老任务优先，跨优先级不会发生倒置。
//!
//! 出队以存储的条件删除作为串行化点：先删除成功再使用，
//! 天然防止两个Agent抢到同一个任务。

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use mcp_core::errors::{McpError, McpResult};
use mcp_core::models::{QueueItem, QueueStats, Task, TaskPriority, TaskStatus};
use mcp_core::traits::DurableStore;

/// 优先级粗粒度乘数
const PRIORITY_MULTIPLIER: f64 = 1000.0;
/// 等待加成除数：每36秒积累1分
const AGE_BONUS_DIVISOR: f64 = 36.0;
/// 等待加成上限：约一小时后饱和
const AGE_BONUS_CAP: f64 = 100.0;

pub struct TaskQueue {
    store: Arc<dyn DurableStore>,
    key_prefix: String,
    item_ttl_seconds: u64,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn DurableStore>, key_prefix: &str, item_ttl_seconds: u64) -> Self {
        Self {
            store,
            key_prefix: key_prefix.to_string(),
            item_ttl_seconds,
        }
    }

    fn queue_key(&self) -> String {
        format!("{}:queue:tasks", self.key_prefix)
    }

    fn item_key(&self, task_id: &str) -> String {
        format!("{}:queue:item:{}", self.key_prefix, task_id)
    }

    /// 队列评分
    pub fn compute_score(priority: TaskPriority, age_seconds: u64) -> f64 {
        let age_bonus = (age_seconds as f64 / AGE_BONUS_DIVISOR).min(AGE_BONUS_CAP);
        f64::from(priority.value()) * PRIORITY_MULTIPLIER + age_bonus
    }

    /// 从评分反推优先级数值
    fn priority_value_of(score: f64) -> u32 {
        (score / PRIORITY_MULTIPLIER) as u32
    }

    /// 首次入队，仅接受 PENDING 任务
    pub async fn enqueue(&self, task: &mut Task) -> McpResult<()> {
        if task.status != TaskStatus::Pending {
            return Err(McpError::validation(format!(
                "只有 PENDING 任务可以入队，当前状态: {}",
                task.status
            )));
        }
        self.push(task).await
    }

    /// 重试入队，供 FAILED/TIMEOUT 任务重回队列使用
    pub async fn requeue(&self, task: &mut Task) -> McpResult<()> {
        if !matches!(task.status, TaskStatus::Failed | TaskStatus::Timeout) {
            return Err(McpError::validation(format!(
                "只有 FAILED/TIMEOUT 任务可以重试入队，当前状态: {}",
                task.status
            )));
        }
        self.push(task).await
    }

    /// 指派回滚：任务仍处于 QUEUED 但已被移出有序集合时恢复原位。
    /// 分值按原入队时间重算，等待加成不因回滚清零。
    pub async fn restore(&self, task: &Task) -> McpResult<()> {
        if task.status != TaskStatus::Queued {
            return Err(McpError::validation(format!(
                "只有 QUEUED 任务可以恢复入队，当前状态: {}",
                task.status
            )));
        }
        let queued_at = task.queued_at.unwrap_or_else(Utc::now);
        let age = (Utc::now() - queued_at).num_seconds().max(0) as u64;
        let item = QueueItem {
            task_id: task.id.clone(),
            priority: task.priority.value(),
            created_at: queued_at,
            agent_constraints: task
                .constraints
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        };
        self.store
            .set_ex(
                &self.item_key(&task.id),
                &serde_json::to_string(&item)?,
                self.item_ttl_seconds,
            )
            .await?;
        self.store
            .zadd(
                &self.queue_key(),
                &task.id,
                Self::compute_score(task.priority, age),
            )
            .await?;
        info!("任务恢复入队: {}", task.id);
        Ok(())
    }

    async fn push(&self, task: &mut Task) -> McpResult<()> {
        let queue_key = self.queue_key();
        if self.store.zscore(&queue_key, &task.id).await?.is_some() {
            return Err(McpError::conflict(format!("任务已在队列中: {}", task.id)));
        }

        let item = QueueItem {
            task_id: task.id.clone(),
            priority: task.priority.value(),
            created_at: Utc::now(),
            agent_constraints: task
                .constraints
                .as_ref()
                .map(|c| serde_json::to_value(c))
                .transpose()?,
        };
        // 等待加成从任务创建时刻起算：晚提交或重试回来的任务
        // 带着已积累的等待进入队列，同优先级内老任务排前
        let age = (Utc::now() - task.created_at).num_seconds().max(0) as u64;
        let score = Self::compute_score(task.priority, age);

        // 先写元数据再写分值；元数据带7天兜底TTL，崩溃残留由清理巡检回收
        self.store
            .set_ex(
                &self.item_key(&task.id),
                &serde_json::to_string(&item)?,
                self.item_ttl_seconds,
            )
            .await?;
        self.store.zadd(&queue_key, &task.id, score).await?;

        task.transition_to(TaskStatus::Queued)?;
        info!(
            "任务入队: {} 优先级={} 分值={}",
            task.id, task.priority, score
        );
        Ok(())
    }

    /// 出队：从最高分开始扫描，原子删除成功者即为赢家。
    /// `max_priority` 为可选的优先级上限（Agent只接低优先级任务时使用）。
    pub async fn dequeue(
        &self,
        agent_id: &str,
        max_priority: Option<TaskPriority>,
    ) -> McpResult<Option<String>> {
        let queue_key = self.queue_key();
        let candidates = self.store.zrange_desc(&queue_key, 0, -1).await?;

        for (task_id, score) in candidates {
            if let Some(ceiling) = max_priority {
                if Self::priority_value_of(score) > ceiling.value() {
                    continue;
                }
            }
            // 条件删除即是锁：删除失败说明别的调用方已拿走
            if !self.store.zrem(&queue_key, &task_id).await? {
                debug!("出队竞争失败，候选已被拿走: {}", task_id);
                continue;
            }
            self.store.delete(&self.item_key(&task_id)).await?;
            info!("任务出队: {} -> Agent {}", task_id, agent_id);
            return Ok(Some(task_id));
        }
        Ok(None)
    }

    /// 队列统计。元数据因TTL缺失的条目跳过不计数。
    pub async fn stats(&self) -> McpResult<QueueStats> {
        let members = self.store.zrange_desc(&self.queue_key(), 0, -1).await?;
        let now = Utc::now();

        let mut by_priority: HashMap<String, u64> = HashMap::new();
        let mut ages: Vec<u64> = Vec::new();
        let mut skipped = 0u64;

        for (task_id, _) in &members {
            let raw = match self.store.get(&self.item_key(task_id)).await? {
                Some(raw) => raw,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            let item: QueueItem = match serde_json::from_str(&raw) {
                Ok(item) => item,
                Err(e) => {
                    warn!("队列项元数据损坏，跳过: {} ({e})", task_id);
                    skipped += 1;
                    continue;
                }
            };
            let label = TaskPriority::from_value(item.priority)
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| item.priority.to_string());
            *by_priority.entry(label).or_insert(0) += 1;
            let age = (now - item.created_at).num_seconds().max(0) as u64;
            ages.push(age);
        }

        Ok(QueueStats {
            total_queued: ages.len() as u64,
            by_priority,
            oldest_age_seconds: ages.iter().max().copied(),
            avg_wait_seconds: if ages.is_empty() {
                None
            } else {
                Some(ages.iter().sum::<u64>() as f64 / ages.len() as f64)
            },
            skipped,
        })
    }

    /// 从队列移除任务。幂等：返回任务先前是否在队列中。
    pub async fn cancel(&self, task_id: &str) -> McpResult<bool> {
        let was_queued = self.store.zrem(&self.queue_key(), task_id).await?;
        self.store.delete(&self.item_key(task_id)).await?;
        if was_queued {
            info!("任务已从队列移除: {}", task_id);
        }
        Ok(was_queued)
    }

    /// 0基队列排名，不在队列中返回 None
    pub async fn position(&self, task_id: &str) -> McpResult<Option<u64>> {
        self.store.zrevrank(&self.queue_key(), task_id).await
    }

    /// 清理元数据已过期的孤儿分值（崩溃写入方残留）
    pub async fn cleanup_expired_items(&self) -> McpResult<u64> {
        let members = self.store.zrange_desc(&self.queue_key(), 0, -1).await?;
        let mut removed = 0u64;
        for (task_id, _) in members {
            if self.store.get(&self.item_key(&task_id)).await?.is_none()
                && self.store.zrem(&self.queue_key(), &task_id).await?
            {
                warn!("清理孤儿队列项: {}", task_id);
                removed += 1;
            }
        }
        if removed > 0 {
            info!("队列清理完成，移除 {} 个孤儿项", removed);
        }
        Ok(removed)
    }
}
