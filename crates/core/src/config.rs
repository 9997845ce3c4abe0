use serde::{Deserialize, Serialize};

use crate::errors::{McpError, McpResult};

/// 应用配置
///
/// 加载顺序：默认值 -> TOML配置文件 -> `MCP_` 前缀环境变量
/// （如 `MCP_STORE__REDIS_URL` 覆盖 `store.redis_url`）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub redis_url: String,
    /// 所有存储键的公共前缀
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 超时巡检间隔（秒）
    pub monitor_interval_seconds: u64,
    /// 队列项元数据TTL（秒），默认7天
    pub queue_item_ttl_seconds: u64,
    /// 容量快照TTL（秒），默认5分钟
    pub capacity_ttl_seconds: u64,
    /// 全局封锁标志TTL（秒），默认1小时
    pub lockdown_ttl_seconds: u64,
    /// 限流封锁后自动恢复的冷却时间（秒），默认1小时
    pub rate_limit_cooldown_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "mcp".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry_hours: 24,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            monitor_interval_seconds: 60,
            queue_item_ttl_seconds: 7 * 24 * 3600,
            capacity_ttl_seconds: 300,
            lockdown_ttl_seconds: 3600,
            rate_limit_cooldown_seconds: 3600,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置，`path` 为空时只使用默认值与环境变量
    pub fn load(path: Option<&str>) -> McpResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MCP")
                .separator("__")
                .try_parsing(true),
        );
        let config = builder
            .build()
            .map_err(|e| McpError::config_error(format!("配置加载失败: {e}")))?;
        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| McpError::config_error(format!("配置解析失败: {e}")))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.store.redis_url.is_empty() {
            return Err(McpError::config_error("store.redis_url 不能为空"));
        }
        if self.auth.token_expiry_hours <= 0 {
            return Err(McpError::config_error("auth.token_expiry_hours 必须为正数"));
        }
        if self.scheduler.monitor_interval_seconds == 0 {
            return Err(McpError::config_error(
                "scheduler.monitor_interval_seconds 必须为正数",
            ));
        }
        if self.scheduler.capacity_ttl_seconds == 0 {
            return Err(McpError::config_error(
                "scheduler.capacity_ttl_seconds 必须为正数",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.capacity_ttl_seconds, 300);
        assert_eq!(config.scheduler.queue_item_ttl_seconds, 7 * 24 * 3600);
        assert_eq!(config.scheduler.lockdown_ttl_seconds, 3600);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.scheduler.monitor_interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.token_expiry_hours = 0;
        assert!(config.validate().is_err());
    }
}
