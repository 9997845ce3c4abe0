//! 安全封锁管理
//!
//! 全局封锁标志带TTL存于持久化存储，进程重启不丢失、到期自动解除。
//! 批量暂停是尽力而为：逐个Agent执行暂停+撤销令牌，单个失败记入
//! 报告继续处理，不做回滚（安全事件下"封一半"优于"封不上"）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use mcp_agent::AgentRegistry;
use mcp_core::errors::{McpError, McpResult};
use mcp_core::models::AgentStatus;
use mcp_core::traits::{AgentRepository, DurableStore};

/// 事件日志容量上限，超出时丢弃最旧条目
const INCIDENT_LOG_CAPACITY: usize = 1000;

/// 安全事件记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIncident {
    pub id: String,
    pub action: String,
    pub reason: String,
    /// 发起人（管理员标识或 "system"）
    pub initiated_by: String,
    pub agent_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// 批量封锁报告：逐Agent的成败记账
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockdownReport {
    pub reason: String,
    pub initiated_by: String,
    pub initiated_at: DateTime<Utc>,
    pub requested: usize,
    pub suspended: Vec<String>,
    /// (agent_id, 失败原因)
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockdownFlag {
    reason: String,
    initiated_by: String,
    initiated_at: DateTime<Utc>,
}

pub struct LockdownManager {
    store: Arc<dyn DurableStore>,
    agents: Arc<dyn AgentRepository>,
    registry: Arc<AgentRegistry>,
    key_prefix: String,
    lockdown_ttl_seconds: u64,
    rate_limit_cooldown_seconds: u64,
    incidents: Mutex<VecDeque<SecurityIncident>>,
}

impl LockdownManager {
    pub fn new(
        store: Arc<dyn DurableStore>,
        agents: Arc<dyn AgentRepository>,
        registry: Arc<AgentRegistry>,
        key_prefix: &str,
        lockdown_ttl_seconds: u64,
        rate_limit_cooldown_seconds: u64,
    ) -> Self {
        Self {
            store,
            agents,
            registry,
            key_prefix: key_prefix.to_string(),
            lockdown_ttl_seconds,
            rate_limit_cooldown_seconds,
            incidents: Mutex::new(VecDeque::with_capacity(INCIDENT_LOG_CAPACITY)),
        }
    }

    fn flag_key(&self) -> String {
        format!("{}:security:lockdown", self.key_prefix)
    }

    /// 全局封锁是否生效（标志到期即自动解除）
    pub async fn is_lockdown_active(&self) -> McpResult<bool> {
        Ok(self.store.get(&self.flag_key()).await?.is_some())
    }

    /// 紧急全域封锁：设置全局标志并暂停所有可调度Agent
    pub async fn emergency_lockdown(
        &self,
        reason: &str,
        initiated_by: &str,
    ) -> McpResult<LockdownReport> {
        let flag = LockdownFlag {
            reason: reason.to_string(),
            initiated_by: initiated_by.to_string(),
            initiated_at: Utc::now(),
        };
        self.store
            .set_ex(
                &self.flag_key(),
                &serde_json::to_string(&flag)?,
                self.lockdown_ttl_seconds,
            )
            .await?;
        warn!("进入紧急封锁: {reason} (发起人 {initiated_by})");

        let mut targets = Vec::new();
        for status in [AgentStatus::Available, AgentStatus::Busy] {
            for agent in self.agents.list_by_status(status).await? {
                targets.push(agent.id);
            }
        }
        let report = self.suspend_batch(&targets, reason, initiated_by).await;
        self.record_incident("emergency_lockdown", reason, initiated_by, &targets)
            .await;
        Ok(report)
    }

    /// 定向封锁指定Agent集合，不设全局标志
    pub async fn targeted_lockdown(
        &self,
        agent_ids: &[String],
        reason: &str,
        initiated_by: &str,
    ) -> McpResult<LockdownReport> {
        if agent_ids.is_empty() {
            return Err(McpError::validation("定向封锁的Agent列表不能为空"));
        }
        warn!(
            "定向封锁 {} 个Agent: {reason} (发起人 {initiated_by})",
            agent_ids.len()
        );
        let report = self.suspend_batch(agent_ids, reason, initiated_by).await;
        self.record_incident("targeted_lockdown", reason, initiated_by, agent_ids)
            .await;
        Ok(report)
    }

    /// 解除全局封锁。无生效封锁时返回冲突错误。
    /// 只清除标志，被暂停的Agent需逐个 `reactivate_agent` 恢复。
    pub async fn lift_lockdown(&self, initiated_by: &str) -> McpResult<()> {
        if !self.store.delete(&self.flag_key()).await? {
            return Err(McpError::conflict("当前没有生效中的封锁"));
        }
        info!("全局封锁已解除 (发起人 {initiated_by})");
        self.record_incident("lift_lockdown", "手动解除", initiated_by, &[])
            .await;
        Ok(())
    }

    /// 恢复被暂停的Agent为可用
    pub async fn reactivate_agent(&self, agent_id: &str) -> McpResult<()> {
        let agent = self.registry.get(agent_id).await?;
        if agent.status != AgentStatus::Suspended {
            return Err(McpError::conflict(format!(
                "Agent {} 未处于暂停状态: {}",
                agent_id, agent.status
            )));
        }
        self.registry
            .update_status(agent_id, AgentStatus::Available)
            .await?;
        info!("Agent已恢复: {agent_id}");
        Ok(())
    }

    /// 限流处置：暂停违规Agent，冷却期满后自动恢复。
    /// 自动恢复在后台执行，失败只记日志（Agent可能已被手动处理）。
    pub async fn enforce_rate_limiting_lockdown(
        self: &Arc<Self>,
        agent_id: &str,
        reason: &str,
    ) -> McpResult<()> {
        self.registry
            .update_status(agent_id, AgentStatus::Suspended)
            .await?;
        warn!(
            "限流封锁: {agent_id}，{}秒后自动恢复 ({reason})",
            self.rate_limit_cooldown_seconds
        );
        self.record_incident("rate_limit_lockdown", reason, "system", &[agent_id.to_string()])
            .await;

        let manager = Arc::clone(self);
        let agent_id = agent_id.to_string();
        let cooldown = self.rate_limit_cooldown_seconds;
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(cooldown)).await;
            match manager.reactivate_agent(&agent_id).await {
                Ok(()) => info!("限流冷却期满，Agent自动恢复: {agent_id}"),
                Err(e) => warn!("限流自动恢复未执行: {agent_id} ({e})"),
            }
        });
        Ok(())
    }

    /// 最近的安全事件，新在前
    pub async fn recent_incidents(&self, limit: usize) -> Vec<SecurityIncident> {
        let log = self.incidents.lock().await;
        log.iter().rev().take(limit).cloned().collect()
    }

    /// 逐个暂停并撤销令牌，失败记账不回滚
    async fn suspend_batch(
        &self,
        agent_ids: &[String],
        reason: &str,
        initiated_by: &str,
    ) -> LockdownReport {
        let mut report = LockdownReport {
            reason: reason.to_string(),
            initiated_by: initiated_by.to_string(),
            initiated_at: Utc::now(),
            requested: agent_ids.len(),
            suspended: Vec::new(),
            failed: Vec::new(),
        };
        for agent_id in agent_ids {
            match self
                .registry
                .update_status(agent_id, AgentStatus::Suspended)
                .await
            {
                Ok(_) => report.suspended.push(agent_id.clone()),
                Err(e) => {
                    error!("封锁Agent失败: {agent_id} ({e})");
                    report.failed.push((agent_id.clone(), e.to_string()));
                }
            }
        }
        info!(
            "封锁批次完成: 成功 {} / 失败 {} / 共 {}",
            report.suspended.len(),
            report.failed.len(),
            report.requested
        );
        report
    }

    async fn record_incident(
        &self,
        action: &str,
        reason: &str,
        initiated_by: &str,
        agent_ids: &[String],
    ) {
        let mut log = self.incidents.lock().await;
        if log.len() >= INCIDENT_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(SecurityIncident {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.to_string(),
            reason: reason.to_string(),
            initiated_by: initiated_by.to_string(),
            agent_ids: agent_ids.to_vec(),
            created_at: Utc::now(),
        });
    }
}
