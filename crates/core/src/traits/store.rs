use async_trait::async_trait;

use crate::errors::McpResult;

/// 持久化存储抽象
///
/// 队列依赖的有序集合操作、容量快照依赖的带TTL键值操作，
/// 以及表达乐观并发所需的比较交换原语。所有互斥都必须经由
/// 存储自身的原子操作表达（条件删除、CAS），进程内锁不跨机器可见。
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// 向有序集合写入成员及分值
    async fn zadd(&self, key: &str, member: &str, score: f64) -> McpResult<()>;

    /// 条件删除：返回成员删除前是否存在。
    /// 并发出队以该返回值作为串行化点。
    async fn zrem(&self, key: &str, member: &str) -> McpResult<bool>;

    /// 查询成员分值
    async fn zscore(&self, key: &str, member: &str) -> McpResult<Option<f64>>;

    /// 按分值从高到低返回 [start, stop] 区间的成员，-1 表示末尾
    async fn zrange_desc(&self, key: &str, start: isize, stop: isize)
        -> McpResult<Vec<(String, f64)>>;

    /// 按分值从高到低的0基排名
    async fn zrevrank(&self, key: &str, member: &str) -> McpResult<Option<u64>>;

    async fn get(&self, key: &str) -> McpResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> McpResult<()>;

    /// 写入并设置过期时间（秒）
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> McpResult<()>;

    /// 删除键，返回键是否存在
    async fn delete(&self, key: &str) -> McpResult<bool>;

    /// 按模式列出键（仅要求支持尾部通配，如 `capacity:agent:*`）
    async fn keys(&self, pattern: &str) -> McpResult<Vec<String>>;

    /// 比较并交换：当前值等于 `expected` 时写入 `new` 并续期TTL
    /// （`ttl_seconds` 为0表示不过期）。`expected` 为 None 表示
    /// 要求键不存在。返回是否交换成功。
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl_seconds: u64,
    ) -> McpResult<bool>;

    /// 连通性探测，启动时失败应视为致命错误
    async fn ping(&self) -> McpResult<()>;
}
