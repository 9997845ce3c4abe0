use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use mcp_core::errors::{McpError, McpResult};
use mcp_core::traits::DurableStore;

/// 比较并交换脚本
///
/// ARGV[1]=是否要求键已存在("0"/"1")，ARGV[2]=期望值，
/// ARGV[3]=新值，ARGV[4]=TTL秒数（0表示不过期）。返回 1 表示交换成功。
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '0' then
    if current then return 0 end
else
    if not current or current ~= ARGV[2] then return 0 end
end
local ttl = tonumber(ARGV[4])
if ttl > 0 then
    redis.call('SET', KEYS[1], ARGV[3], 'EX', ttl)
else
    redis.call('SET', KEYS[1], ARGV[3])
end
return 1
"#;

/// Redis实现的持久化存储
///
/// 有序集合承载任务队列，带TTL的普通键承载队列项元数据与容量快照。
/// 比较交换通过Lua脚本在服务端原子完成，避免 WATCH 重试循环的争用开销。
pub struct RedisStore {
    manager: ConnectionManager,
    cas_script: redis::Script,
}

impl RedisStore {
    /// 建立连接并执行PING探测，失败返回 `ServiceUnavailable`
    pub async fn connect(redis_url: &str) -> McpResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| McpError::ServiceUnavailable(format!("Redis地址无效: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| McpError::ServiceUnavailable(format!("Redis连接失败: {e}")))?;
        let store = Self {
            manager,
            cas_script: redis::Script::new(CAS_SCRIPT),
        };
        store.ping().await?;
        info!("Redis存储连接成功: {}", redis_url);
        Ok(store)
    }

    async fn execute<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> McpResult<T> {
        let mut conn = self.manager.clone();
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| McpError::store_error(e.to_string()))
    }
}

#[async_trait]
impl DurableStore for RedisStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> McpResult<()> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key).arg(score).arg(member);
        let _: i64 = self.execute(&cmd).await?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> McpResult<bool> {
        let mut cmd = redis::cmd("ZREM");
        cmd.arg(key).arg(member);
        let removed: i64 = self.execute(&cmd).await?;
        debug!("ZREM {} {} -> {}", key, member, removed);
        Ok(removed > 0)
    }

    async fn zscore(&self, key: &str, member: &str) -> McpResult<Option<f64>> {
        let mut cmd = redis::cmd("ZSCORE");
        cmd.arg(key).arg(member);
        self.execute(&cmd).await
    }

    async fn zrange_desc(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> McpResult<Vec<(String, f64)>> {
        let mut cmd = redis::cmd("ZREVRANGE");
        cmd.arg(key).arg(start).arg(stop).arg("WITHSCORES");
        self.execute(&cmd).await
    }

    async fn zrevrank(&self, key: &str, member: &str) -> McpResult<Option<u64>> {
        let mut cmd = redis::cmd("ZREVRANK");
        cmd.arg(key).arg(member);
        self.execute(&cmd).await
    }

    async fn get(&self, key: &str) -> McpResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.execute(&cmd).await
    }

    async fn set(&self, key: &str, value: &str) -> McpResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        let _: () = self.execute(&cmd).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> McpResult<()> {
        let mut cmd = redis::cmd("SETEX");
        cmd.arg(key).arg(ttl_seconds).arg(value);
        let _: () = self.execute(&cmd).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> McpResult<bool> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let deleted: i64 = self.execute(&cmd).await?;
        Ok(deleted > 0)
    }

    async fn keys(&self, pattern: &str) -> McpResult<Vec<String>> {
        // O(n)扫描，仅在指派时对容量键使用，键空间受Agent数量约束
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(pattern);
        self.execute(&cmd).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl_seconds: u64,
    ) -> McpResult<bool> {
        let mut conn = self.manager.clone();
        let swapped: i64 = self
            .cas_script
            .key(key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or(""))
            .arg(new)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| McpError::store_error(e.to_string()))?;
        Ok(swapped == 1)
    }

    async fn ping(&self) -> McpResult<()> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| McpError::ServiceUnavailable(format!("Redis探测失败: {e}")))?;
        if pong != "PONG" {
            return Err(McpError::ServiceUnavailable(format!(
                "Redis探测响应异常: {pong}"
            )));
        }
        Ok(())
    }
}
