//! 应用装配
//!
//! 显式依赖注入：所有组件在这里构建并互相连线，不使用全局单例。

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use mcp_agent::{AgentRegistry, TokenService};
use mcp_core::config::AppConfig;
use mcp_core::traits::{AgentRepository, DurableStore, TaskRepository};
use mcp_dispatcher::{
    AssignmentEngine, CapacityManager, LockdownManager, MonitorHandle, TaskQueue, TaskService,
    TimeoutMonitor,
};
use mcp_infrastructure::{MemoryStore, RedisStore, StoreAgentRepository, StoreTaskRepository};

/// 装配完成的调度核心
pub struct Application {
    pub task_service: Arc<TaskService>,
    pub lockdown: Arc<LockdownManager>,
    monitor: Arc<TimeoutMonitor>,
}

impl Application {
    /// 按配置构建全部组件。`embedded` 为真时使用内存存储，
    /// 否则连接Redis（连接失败视为致命错误）。
    pub async fn build(config: &AppConfig, embedded: bool) -> Result<Self> {
        let store: Arc<dyn DurableStore> = if embedded {
            info!("嵌入式模式：使用内存存储");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(
                RedisStore::connect(&config.store.redis_url)
                    .await
                    .context("连接持久化存储失败")?,
            )
        };

        if config.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret 未配置");
        }

        let prefix = config.store.key_prefix.as_str();
        let tasks: Arc<dyn TaskRepository> =
            Arc::new(StoreTaskRepository::new(Arc::clone(&store), prefix));
        let agents: Arc<dyn AgentRepository> =
            Arc::new(StoreAgentRepository::new(Arc::clone(&store), prefix));

        let tokens = Arc::new(TokenService::new(
            &config.auth.jwt_secret,
            config.auth.token_expiry_hours,
            Arc::clone(&store),
            prefix,
        ));
        let registry = Arc::new(AgentRegistry::new(Arc::clone(&agents), tokens));

        let queue = Arc::new(TaskQueue::new(
            Arc::clone(&store),
            prefix,
            config.scheduler.queue_item_ttl_seconds,
        ));
        let capacity = Arc::new(CapacityManager::new(
            Arc::clone(&store),
            prefix,
            config.scheduler.capacity_ttl_seconds,
        ));
        let assignment = Arc::new(AssignmentEngine::new(
            Arc::clone(&agents),
            Arc::clone(&capacity),
        ));
        let task_service = Arc::new(TaskService::new(
            Arc::clone(&tasks),
            Arc::clone(&agents),
            queue,
            Arc::clone(&capacity),
            assignment,
        ));
        let lockdown = Arc::new(LockdownManager::new(
            Arc::clone(&store),
            Arc::clone(&agents),
            Arc::clone(&registry),
            prefix,
            config.scheduler.lockdown_ttl_seconds,
            config.scheduler.rate_limit_cooldown_seconds,
        ));
        let monitor = Arc::new(TimeoutMonitor::new(
            tasks,
            capacity,
            config.scheduler.monitor_interval_seconds,
        ));

        info!("调度核心装配完成 (key_prefix={prefix})");
        Ok(Self {
            task_service,
            lockdown,
            monitor,
        })
    }

    /// 启动后台巡检，返回停止句柄
    pub fn start_monitor(&self) -> MonitorHandle {
        Arc::clone(&self.monitor).start()
    }
}
