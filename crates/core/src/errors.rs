use thiserror::Error;

/// 调度核心统一错误类型
///
/// 按错误种类划分，传输层负责映射到具体的协议状态码。
#[derive(Error, Debug, Clone)]
pub enum McpError {
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("非法状态转换: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("操作冲突: {0}")]
    Conflict(String),
    #[error("任务不存在: id={id}")]
    TaskNotFound { id: String },
    #[error("Agent不存在: id={id}")]
    AgentNotFound { id: String },
    #[error("没有符合条件的Agent: {0}")]
    NoEligibleAgents(String),
    #[error("认证失败: {0}")]
    Authentication(String),
    #[error("权限不足: {0}")]
    Authorization(String),
    #[error("存储操作失败: {0}")]
    Store(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
    #[error("服务不可用: {0}")]
    ServiceUnavailable(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("系统内部错误: {0}")]
    Internal(String),
}

pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition<A: ToString, B: ToString>(from: A, to: B) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    pub fn agent_not_found<S: Into<String>>(id: S) -> Self {
        Self::AgentNotFound { id: id.into() }
    }

    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn store_error<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否为致命错误（启动阶段应中止进程）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable(_) | Self::Configuration(_)
        )
    }

    /// 是否为调用方输入问题（重试同样的输入不会成功）
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidTransition { .. }
                | Self::Conflict(_)
                | Self::TaskNotFound { .. }
                | Self::AgentNotFound { .. }
                | Self::NoEligibleAgents(_)
                | Self::Authentication(_)
                | Self::Authorization(_)
        )
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(McpError::ServiceUnavailable("redis down".into()).is_fatal());
        assert!(McpError::config_error("bad ttl").is_fatal());
        assert!(!McpError::validation("bad input").is_fatal());

        assert!(McpError::validation("bad input").is_caller_error());
        assert!(McpError::invalid_transition("COMPLETED", "RUNNING").is_caller_error());
        assert!(!McpError::store_error("io").is_caller_error());
    }

    #[test]
    fn test_error_display() {
        let err = McpError::task_not_found("t-1");
        assert!(err.to_string().contains("t-1"));

        let err = McpError::invalid_transition("PENDING", "RUNNING");
        assert!(err.to_string().contains("PENDING"));
        assert!(err.to_string().contains("RUNNING"));
    }
}
