//! 超时巡检
//!
//! 后台周期任务：把执行时间超过 `started_at + timeout_seconds` 的
//! RUNNING 任务转为 TIMEOUT 并释放其容量槽位。单个任务处理失败只
//! 记日志，本轮巡检继续，下一轮自然重扫。

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mcp_core::errors::McpResult;
use mcp_core::models::TaskStatus;
use mcp_core::traits::TaskRepository;

use crate::capacity::CapacityManager;

pub struct TimeoutMonitor {
    tasks: Arc<dyn TaskRepository>,
    capacity: Arc<CapacityManager>,
    interval: Duration,
}

/// 运行中的巡检句柄，`shutdown` 协作式停止并等待退出
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!("超时巡检任务退出异常: {e}");
        }
    }
}

impl TimeoutMonitor {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        capacity: Arc<CapacityManager>,
        interval_seconds: u64,
    ) -> Self {
        Self {
            tasks,
            capacity,
            interval: Duration::from_secs(interval_seconds),
        }
    }

    /// 启动后台巡检循环
    pub fn start(self: Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = self;
        let handle = tokio::spawn(async move {
            info!("超时巡检启动，周期 {:?}", monitor.interval);
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match monitor.sweep_once().await {
                            Ok(0) => debug!("超时巡检完成，无超时任务"),
                            Ok(n) => info!("超时巡检完成，处理 {n} 个超时任务"),
                            Err(e) => error!("超时巡检整轮失败: {e}"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("超时巡检收到停止信号");
                        break;
                    }
                }
            }
        });
        MonitorHandle {
            shutdown_tx,
            handle,
        }
    }

    /// 单轮巡检，返回本轮转为 TIMEOUT 的任务数
    pub async fn sweep_once(&self) -> McpResult<u64> {
        let running = self.tasks.list_by_status(TaskStatus::Running).await?;
        let now = Utc::now();
        let mut expired = 0u64;

        for mut task in running {
            let started_at = match task.started_at {
                Some(t) => t,
                None => {
                    warn!("RUNNING 任务缺少 started_at，跳过: {}", task.id);
                    continue;
                }
            };
            let deadline = started_at + ChronoDuration::seconds(task.timeout_seconds as i64);
            if now <= deadline {
                continue;
            }

            if let Err(e) = task.transition_to(TaskStatus::Timeout) {
                // 巡检与正常上报并发时可能刚好转走，不算故障
                debug!("超时转换被跳过: {} ({e})", task.id);
                continue;
            }
            task.last_error = Some(format!(
                "执行超时（限制 {} 秒）",
                task.timeout_seconds
            ));
            if let Err(e) = self.tasks.update(&task).await {
                error!("超时任务写回失败: {} ({e})", task.id);
                continue;
            }
            if let Some(agent_id) = &task.assigned_agent {
                match self.capacity.release_slot(agent_id, &task.id).await {
                    Ok(true) => {}
                    Ok(false) => warn!("超时释放槽位未生效: {} (任务 {})", agent_id, task.id),
                    Err(e) => error!("超时释放槽位出错: {} (任务 {}): {e}", agent_id, task.id),
                }
            }
            warn!(
                "任务执行超时: {} (限制 {} 秒, Agent {:?})",
                task.id, task.timeout_seconds, task.assigned_agent
            );
            expired += 1;
        }
        Ok(expired)
    }
}
