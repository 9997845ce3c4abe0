//! Agent注册与认证服务
//!
//! 身份、凭证签发与认证。指派引擎消费这里维护的Agent资格数据，
//! 传输层消费这里签发的令牌。

use std::sync::Arc;
use tracing::{info, warn};

use mcp_core::errors::{McpError, McpResult};
use mcp_core::models::{Agent, AgentStatus, RegisterAgentRequest};
use mcp_core::traits::AgentRepository;

use crate::auth::TokenService;
use crate::security;

pub struct AgentRegistry {
    repo: Arc<dyn AgentRepository>,
    tokens: Arc<TokenService>,
}

/// 注册结果，`api_key` 明文仅在此处出现一次
#[derive(Debug)]
pub struct RegistrationOutcome {
    pub agent: Agent,
    pub api_key: String,
}

impl AgentRegistry {
    pub fn new(repo: Arc<dyn AgentRepository>, tokens: Arc<TokenService>) -> Self {
        Self { repo, tokens }
    }

    /// 注册新Agent，邮箱重复返回冲突错误
    pub async fn register(&self, request: &RegisterAgentRequest) -> McpResult<RegistrationOutcome> {
        if request.name.is_empty() {
            return Err(McpError::validation("Agent名称不能为空"));
        }
        if request.email.is_empty() || !request.email.contains('@') {
            return Err(McpError::validation(format!(
                "邮箱格式无效: {}",
                request.email
            )));
        }
        if request.max_concurrent_tasks == 0 {
            return Err(McpError::validation("max_concurrent_tasks 必须为正数"));
        }
        if self.repo.get_by_email(&request.email).await?.is_some() {
            return Err(McpError::conflict(format!("邮箱已注册: {}", request.email)));
        }

        let api_key = security::generate_api_key();
        let agent = Agent::from_request(request, security::hash_api_key(&api_key));
        self.repo.create(&agent).await?;

        info!("Agent注册成功: {} ({})", agent.id, agent.email);
        Ok(RegistrationOutcome { agent, api_key })
    }

    /// 以API密钥认证，成功后更新 last_seen 并签发令牌
    pub async fn authenticate(&self, agent_id: &str, api_key: &str) -> McpResult<(String, Agent)> {
        let mut agent = self
            .repo
            .get_by_id(agent_id)
            .await?
            .ok_or_else(|| McpError::agent_not_found(agent_id))?;

        if !security::verify_api_key(api_key, &agent.api_key_hash) {
            warn!("Agent认证失败（密钥不匹配）: {}", agent_id);
            return Err(McpError::authentication("API密钥无效"));
        }
        if !agent.is_schedulable() {
            warn!(
                "Agent认证失败（状态 {} 不允许）: {}",
                agent.status, agent_id
            );
            return Err(McpError::authentication(format!(
                "Agent状态不允许认证: {}",
                agent.status
            )));
        }

        agent.touch();
        self.repo.update(&agent).await?;
        let token = self.tokens.issue(&agent.id).await?;
        Ok((token, agent))
    }

    /// 校验令牌并返回对应的Agent
    pub async fn validate_token(&self, token: &str) -> McpResult<Agent> {
        let claims = self.tokens.validate(token).await?;
        let agent = self
            .repo
            .get_by_id(&claims.sub)
            .await?
            .ok_or_else(|| McpError::authentication("令牌指向的Agent不存在"))?;
        if !agent.is_schedulable() {
            return Err(McpError::authentication(format!(
                "Agent当前状态不可用: {}",
                agent.status
            )));
        }
        Ok(agent)
    }

    /// 变更Agent状态；转入 SUSPENDED 时撤销其全部令牌
    pub async fn update_status(&self, agent_id: &str, status: AgentStatus) -> McpResult<Agent> {
        let mut agent = self
            .repo
            .get_by_id(agent_id)
            .await?
            .ok_or_else(|| McpError::agent_not_found(agent_id))?;

        agent.status = status;
        agent.updated_at = chrono::Utc::now();
        self.repo.update(&agent).await?;

        if status == AgentStatus::Suspended {
            self.tokens.revoke_all(agent_id).await?;
            info!("Agent已暂停并撤销令牌: {}", agent_id);
        } else {
            info!("Agent状态更新: {} -> {}", agent_id, status);
        }
        Ok(agent)
    }

    /// 重置API密钥，旧密钥立即失效；明文仅返回一次
    pub async fn regenerate_api_key(&self, agent_id: &str) -> McpResult<String> {
        let mut agent = self
            .repo
            .get_by_id(agent_id)
            .await?
            .ok_or_else(|| McpError::agent_not_found(agent_id))?;

        let api_key = security::generate_api_key();
        agent.api_key_hash = security::hash_api_key(&api_key);
        agent.updated_at = chrono::Utc::now();
        self.repo.update(&agent).await?;

        info!("Agent API密钥已重置: {}", agent_id);
        Ok(api_key)
    }

    pub async fn get(&self, agent_id: &str) -> McpResult<Agent> {
        self.repo
            .get_by_id(agent_id)
            .await?
            .ok_or_else(|| McpError::agent_not_found(agent_id))
    }

    /// 撤销某Agent的全部令牌（封锁流程使用）
    pub async fn revoke_all_tokens(&self, agent_id: &str) -> McpResult<()> {
        self.tokens.revoke_all(agent_id).await
    }
}
