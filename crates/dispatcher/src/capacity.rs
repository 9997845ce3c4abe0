//! Agent容量管理
//!
//! 以TTL受限的快照记录每个Agent的并发槽位占用。Agent停止上报后
//! 快照自动过期，对调度器表现为"未知"而非"空闲"——这是安全的失效方向。
//!
//! 预留/释放必须原子完成：两次指派同时读到 available_slots=1 再各自写回
//! 会静默超卖。这里通过存储的比较交换原语串行化，竞争失败返回 false，
//! 调用方应换一个Agent重试而不是报错。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use mcp_core::errors::{McpError, McpResult};
use mcp_core::models::CapacitySnapshot;
use mcp_core::traits::DurableStore;

/// CAS竞争重试上限
const CAS_MAX_ATTEMPTS: u32 = 3;

pub struct CapacityManager {
    store: Arc<dyn DurableStore>,
    key_prefix: String,
    ttl_seconds: u64,
}

impl CapacityManager {
    pub fn new(store: Arc<dyn DurableStore>, key_prefix: &str, ttl_seconds: u64) -> Self {
        Self {
            store,
            key_prefix: key_prefix.to_string(),
            ttl_seconds,
        }
    }

    fn key(&self, agent_id: &str) -> String {
        format!("{}:capacity:agent:{}", self.key_prefix, agent_id)
    }

    fn key_pattern(&self) -> String {
        format!("{}:capacity:agent:*", self.key_prefix)
    }

    /// 上报/刷新容量快照
    pub async fn update_capacity(
        &self,
        agent_id: &str,
        current_tasks: u32,
        max_tasks: u32,
    ) -> McpResult<CapacitySnapshot> {
        if max_tasks == 0 {
            return Err(McpError::validation("max_tasks 必须为正数"));
        }
        if current_tasks > max_tasks {
            return Err(McpError::validation(format!(
                "current_tasks ({current_tasks}) 不能超过 max_tasks ({max_tasks})"
            )));
        }
        let snapshot = CapacitySnapshot::new(agent_id, current_tasks, max_tasks);
        self.store
            .set_ex(
                &self.key(agent_id),
                &serde_json::to_string(&snapshot)?,
                self.ttl_seconds,
            )
            .await?;
        debug!(
            "容量快照更新: {} {}/{}",
            agent_id, current_tasks, max_tasks
        );
        Ok(snapshot)
    }

    /// 读取快照，过期或从未上报返回 None
    pub async fn get_capacity(&self, agent_id: &str) -> McpResult<Option<CapacitySnapshot>> {
        match self.store.get(&self.key(agent_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 是否有足够空闲槽位；快照缺失视为不可用
    pub async fn is_available(&self, agent_id: &str, required_slots: u32) -> McpResult<bool> {
        Ok(self
            .get_capacity(agent_id)
            .await?
            .map(|s| s.available_slots() >= required_slots)
            .unwrap_or(false))
    }

    /// 扫描全部容量键，返回满足槽位要求的Agent id。
    /// O(n)于被跟踪的Agent数量，只在指派时调用。
    pub async fn get_available_agents(&self, required_slots: u32) -> McpResult<Vec<String>> {
        let keys = self.store.keys(&self.key_pattern()).await?;
        let mut agents = Vec::new();
        for key in keys {
            let raw = match self.store.get(&key).await? {
                Some(raw) => raw,
                None => continue, // 扫描与读取之间过期
            };
            let snapshot: CapacitySnapshot = match serde_json::from_str(&raw) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("容量快照损坏，跳过: {} ({e})", key);
                    continue;
                }
            };
            if snapshot.available_slots() >= required_slots {
                agents.push(snapshot.agent_id);
            }
        }
        Ok(agents)
    }

    /// 收集全部快照，供指派评分使用
    pub async fn snapshots(&self) -> McpResult<HashMap<String, CapacitySnapshot>> {
        let keys = self.store.keys(&self.key_pattern()).await?;
        let mut snapshots = HashMap::new();
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                match serde_json::from_str::<CapacitySnapshot>(&raw) {
                    Ok(snapshot) => {
                        snapshots.insert(snapshot.agent_id.clone(), snapshot);
                    }
                    Err(e) => warn!("容量快照损坏，跳过: {} ({e})", key),
                }
            }
        }
        Ok(snapshots)
    }

    /// 原子预留一个槽位。容量不足或竞争失败返回 false。
    pub async fn reserve_slot(&self, agent_id: &str, task_id: &str) -> McpResult<bool> {
        let key = self.key(agent_id);
        for attempt in 0..CAS_MAX_ATTEMPTS {
            let raw = match self.store.get(&key).await? {
                Some(raw) => raw,
                // 未知容量不是空闲容量
                None => return Ok(false),
            };
            let mut snapshot: CapacitySnapshot = serde_json::from_str(&raw)?;
            if snapshot.available_slots() == 0 {
                debug!("预留失败，容量已满: {} ({})", agent_id, task_id);
                return Ok(false);
            }
            snapshot.current_tasks += 1;
            snapshot.updated_at = chrono::Utc::now();
            let new = serde_json::to_string(&snapshot)?;
            if self
                .store
                .compare_and_swap(&key, Some(&raw), &new, self.ttl_seconds)
                .await?
            {
                debug!(
                    "槽位预留成功: {} {}/{} (任务 {})",
                    agent_id, snapshot.current_tasks, snapshot.max_tasks, task_id
                );
                return Ok(true);
            }
            debug!("预留CAS竞争失败，第{}次重试: {}", attempt + 1, agent_id);
        }
        Ok(false)
    }

    /// 原子释放一个槽位。快照缺失或已为零返回 false。
    pub async fn release_slot(&self, agent_id: &str, task_id: &str) -> McpResult<bool> {
        let key = self.key(agent_id);
        for attempt in 0..CAS_MAX_ATTEMPTS {
            let raw = match self.store.get(&key).await? {
                Some(raw) => raw,
                None => {
                    warn!("释放槽位时快照缺失: {} (任务 {})", agent_id, task_id);
                    return Ok(false);
                }
            };
            let mut snapshot: CapacitySnapshot = serde_json::from_str(&raw)?;
            if snapshot.current_tasks == 0 {
                warn!("释放槽位时占用已为零: {} (任务 {})", agent_id, task_id);
                return Ok(false);
            }
            snapshot.current_tasks -= 1;
            snapshot.updated_at = chrono::Utc::now();
            let new = serde_json::to_string(&snapshot)?;
            if self
                .store
                .compare_and_swap(&key, Some(&raw), &new, self.ttl_seconds)
                .await?
            {
                debug!(
                    "槽位释放成功: {} {}/{} (任务 {})",
                    agent_id, snapshot.current_tasks, snapshot.max_tasks, task_id
                );
                return Ok(true);
            }
            debug!("释放CAS竞争失败，第{}次重试: {}", attempt + 1, agent_id);
        }
        Ok(false)
    }
}
