//! 任务服务：状态机编排
//!
//! 把队列、容量、指派引擎和仓储串成完整的任务生命周期。状态转换
//! 一律经由 `TaskStatus::can_transition_to` 检查，写顺序遵循
//! "先占容量、再摘队列、最后落状态"，任一步失败都把已做的动作回滚。

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use mcp_core::errors::{McpError, McpResult};
use mcp_core::models::{
    AssignmentRecommendation, AssignmentStrategy, CreateTaskRequest, QueueStats, Task, TaskResult,
    TaskStatus,
};
use mcp_core::traits::{AgentRepository, TaskRepository};

use crate::assignment::AssignmentEngine;
use crate::capacity::CapacityManager;
use crate::queue::TaskQueue;

/// 队列统计的服务包装：存储故障降级为 error 状态而不是向上抛
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceQueueStats {
    pub service_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueueStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    agents: Arc<dyn AgentRepository>,
    queue: Arc<TaskQueue>,
    capacity: Arc<CapacityManager>,
    assignment: Arc<AssignmentEngine>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        agents: Arc<dyn AgentRepository>,
        queue: Arc<TaskQueue>,
        capacity: Arc<CapacityManager>,
        assignment: Arc<AssignmentEngine>,
    ) -> Self {
        Self {
            tasks,
            agents,
            queue,
            capacity,
            assignment,
        }
    }

    /// 创建任务（PENDING），不入队
    pub async fn create_task(
        &self,
        request: &CreateTaskRequest,
        created_by: Option<&str>,
    ) -> McpResult<Task> {
        request.validate()?;
        let task = Task::from_request(request, created_by);
        self.tasks.create(&task).await?;
        info!(
            "任务创建: {} 类型={} 优先级={}",
            task.id, task.task_type, task.priority
        );
        Ok(task)
    }

    /// 提交入队（PENDING -> QUEUED）
    pub async fn submit(&self, task_id: &str) -> McpResult<Task> {
        let mut task = self.load(task_id).await?;
        self.queue.enqueue(&mut task).await?;
        self.tasks.update(&task).await?;
        Ok(task)
    }

    /// 创建并立即提交
    pub async fn create_and_submit(
        &self,
        request: &CreateTaskRequest,
        created_by: Option<&str>,
    ) -> McpResult<Task> {
        let task = self.create_task(request, created_by).await?;
        self.submit(&task.id).await
    }

    /// 只读指派推荐，不改变任何状态
    pub async fn get_assignment_recommendations(
        &self,
        task_id: &str,
        strategy: Option<AssignmentStrategy>,
    ) -> McpResult<AssignmentRecommendation> {
        let task = self.load(task_id).await?;
        self.assignment.recommend(&task, strategy).await
    }

    /// 自动指派：按推荐得分从高到低尝试占容量，第一个占到的获胜
    pub async fn assign(
        &self,
        task_id: &str,
        strategy: Option<AssignmentStrategy>,
    ) -> McpResult<Task> {
        let task = self.load(task_id).await?;
        if task.status != TaskStatus::Queued {
            return Err(McpError::invalid_transition(task.status, TaskStatus::Assigned));
        }
        let recommendation = self.assignment.recommend(&task, strategy).await?;

        let mut ranked = recommendation.scores.clone();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        for candidate in &ranked {
            match self.mark_assigned(task_id, &candidate.agent_id).await {
                Ok(task) => return Ok(task),
                Err(McpError::Conflict(msg)) => {
                    warn!(
                        "指派候选 {} 占容量失败，尝试下一个: {}",
                        candidate.agent_id, msg
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(McpError::NoEligibleAgents(format!(
            "任务 {} 的全部候选均无空闲容量",
            task_id
        )))
    }

    /// 指派到指定Agent（QUEUED -> ASSIGNED）。
    /// 先占容量、再摘队列：任一步失败回滚前一步。
    pub async fn mark_assigned(&self, task_id: &str, agent_id: &str) -> McpResult<Task> {
        let mut task = self.load(task_id).await?;
        if !task.status.can_transition_to(TaskStatus::Assigned) {
            return Err(McpError::invalid_transition(task.status, TaskStatus::Assigned));
        }
        let agent = self
            .agents
            .get_by_id(agent_id)
            .await?
            .ok_or_else(|| McpError::agent_not_found(agent_id))?;
        if !agent.is_schedulable() {
            return Err(McpError::conflict(format!(
                "Agent {} 当前不可调度: {}",
                agent_id, agent.status
            )));
        }

        if !self.capacity.reserve_slot(agent_id, task_id).await? {
            return Err(McpError::conflict(format!(
                "Agent {} 无空闲容量",
                agent_id
            )));
        }
        // 摘队列即是锁：摘不到说明任务已被别的指派拿走
        if !self.queue.cancel(task_id).await? {
            if !self.capacity.release_slot(agent_id, task_id).await? {
                warn!("指派回滚时释放槽位失败: {} (任务 {})", agent_id, task_id);
            }
            return Err(McpError::conflict(format!(
                "任务 {} 已不在队列中",
                task_id
            )));
        }

        if let Err(e) = task.transition_to(TaskStatus::Assigned) {
            self.rollback_assignment(&task, agent_id).await;
            return Err(e);
        }
        task.assigned_agent = Some(agent_id.to_string());
        if let Err(e) = self.tasks.update(&task).await {
            self.rollback_assignment(&task, agent_id).await;
            return Err(e);
        }
        info!("任务指派: {} -> Agent {}", task_id, agent_id);
        Ok(task)
    }

    async fn rollback_assignment(&self, task: &Task, agent_id: &str) {
        if let Err(e) = self.capacity.release_slot(agent_id, &task.id).await {
            error!("指派回滚释放槽位失败: {} ({e})", agent_id);
        }
        let mut restored = task.clone();
        restored.status = TaskStatus::Queued;
        if let Err(e) = self.queue.restore(&restored).await {
            error!("指派回滚恢复入队失败: {} ({e})", task.id);
        }
    }

    /// 开始执行（ASSIGNED -> RUNNING），只有被指派的Agent可以上报
    pub async fn mark_running(&self, task_id: &str, agent_id: &str) -> McpResult<Task> {
        let mut task = self.load(task_id).await?;
        self.ensure_assignee(&task, agent_id)?;
        task.transition_to(TaskStatus::Running)?;
        self.tasks.update(&task).await?;
        info!("任务开始执行: {} (Agent {})", task_id, agent_id);
        Ok(task)
    }

    /// 完成任务（RUNNING -> COMPLETED）并释放容量。
    /// 对已 COMPLETED 的任务重复上报视为幂等成功。
    pub async fn complete(
        &self,
        task_id: &str,
        agent_id: &str,
        result_data: serde_json::Value,
    ) -> McpResult<Task> {
        let mut task = self.load(task_id).await?;
        if task.status == TaskStatus::Completed {
            return Ok(task);
        }
        self.ensure_assignee(&task, agent_id)?;
        if !result_data.is_object() {
            return Err(McpError::validation("任务结果必须是JSON对象"));
        }
        task.transition_to(TaskStatus::Completed)?;
        let duration_ms = task
            .started_at
            .zip(task.completed_at)
            .map(|(start, end)| (end - start).num_milliseconds().max(0) as u64);
        task.result = Some(TaskResult {
            success: true,
            data: result_data,
            error: None,
            duration_ms,
            logs: Vec::new(),
        });
        self.tasks.update(&task).await?;
        self.release_assignee_slot(&task).await;
        info!("任务完成: {} (Agent {})", task_id, agent_id);
        Ok(task)
    }

    /// 任务失败（RUNNING -> FAILED）并释放容量。
    /// `can_retry=false` 表示失败不可恢复，直接耗尽剩余重试额度；
    /// 否则在额度内自动重回队列。
    pub async fn fail(
        &self,
        task_id: &str,
        agent_id: &str,
        error_message: &str,
        can_retry: bool,
    ) -> McpResult<Task> {
        let mut task = self.load(task_id).await?;
        self.ensure_assignee(&task, agent_id)?;
        task.transition_to(TaskStatus::Failed)?;
        task.last_error = Some(error_message.to_string());
        let duration_ms = task
            .started_at
            .zip(task.completed_at)
            .map(|(start, end)| (end - start).num_milliseconds().max(0) as u64);
        task.result = Some(TaskResult {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error_message.to_string()),
            duration_ms,
            logs: Vec::new(),
        });
        if !can_retry {
            task.retry_count = task.max_retries;
        }
        self.tasks.update(&task).await?;
        self.release_assignee_slot(&task).await;
        warn!("任务失败: {} ({})", task_id, error_message);

        if can_retry && task.can_retry() {
            return self.retry(task_id).await;
        }
        Ok(task)
    }

    /// 重试（FAILED/TIMEOUT -> QUEUED），受 `retry_count < max_retries` 约束
    pub async fn retry(&self, task_id: &str) -> McpResult<Task> {
        let mut task = self.load(task_id).await?;
        if !matches!(task.status, TaskStatus::Failed | TaskStatus::Timeout) {
            return Err(McpError::invalid_transition(task.status, TaskStatus::Queued));
        }
        if !task.can_retry() {
            return Err(McpError::validation(format!(
                "任务 {} 重试次数已用尽 ({}/{})",
                task_id, task.retry_count, task.max_retries
            )));
        }
        task.retry_count += 1;
        task.assigned_agent = None;
        self.queue.requeue(&mut task).await?;
        self.tasks.update(&task).await?;
        info!(
            "任务重试入队: {} ({}/{})",
            task_id, task.retry_count, task.max_retries
        );
        Ok(task)
    }

    /// 取消任务。对已 CANCELLED 的任务幂等；
    /// 排队中的任务同时从队列移除，执行中的任务释放容量。
    pub async fn cancel(&self, task_id: &str) -> McpResult<Task> {
        let mut task = self.load(task_id).await?;
        if task.status == TaskStatus::Cancelled {
            return Ok(task);
        }
        let was_running = matches!(task.status, TaskStatus::Assigned | TaskStatus::Running);
        task.transition_to(TaskStatus::Cancelled)?;
        self.queue.cancel(task_id).await?;
        self.tasks.update(&task).await?;
        if was_running {
            self.release_assignee_slot(&task).await;
        }
        info!("任务取消: {}", task_id);
        Ok(task)
    }

    pub async fn get_status(&self, task_id: &str) -> McpResult<Task> {
        self.load(task_id).await
    }

    /// 任务在队列中的0基排名
    pub async fn get_position(&self, task_id: &str) -> McpResult<Option<u64>> {
        self.queue.position(task_id).await
    }

    /// 队列统计：存储故障不向上抛，降级为 error 状态
    pub async fn get_queue_stats(&self) -> ServiceQueueStats {
        match self.queue.stats().await {
            Ok(stats) => ServiceQueueStats {
                service_status: "active".to_string(),
                stats: Some(stats),
                error: None,
            },
            Err(e) => {
                error!("队列统计获取失败: {e}");
                ServiceQueueStats {
                    service_status: "error".to_string(),
                    stats: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn load(&self, task_id: &str) -> McpResult<Task> {
        self.tasks
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| McpError::task_not_found(task_id))
    }

    fn ensure_assignee(&self, task: &Task, agent_id: &str) -> McpResult<()> {
        match &task.assigned_agent {
            Some(assigned) if assigned == agent_id => Ok(()),
            Some(assigned) => Err(McpError::Authorization(format!(
                "任务 {} 已指派给 {}，拒绝 {} 的上报",
                task.id, assigned, agent_id
            ))),
            None => Err(McpError::conflict(format!("任务 {} 尚未指派", task.id))),
        }
    }

    /// 释放执行方容量，失败只记日志不影响主流程
    async fn release_assignee_slot(&self, task: &Task) {
        if let Some(agent_id) = &task.assigned_agent {
            match self.capacity.release_slot(agent_id, &task.id).await {
                Ok(true) => {}
                Ok(false) => warn!("释放槽位未生效: {} (任务 {})", agent_id, task.id),
                Err(e) => error!("释放槽位出错: {} (任务 {}): {e}", agent_id, task.id),
            }
        }
    }
}
