use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use mcp_core::errors::{McpError, McpResult};
use mcp_core::traits::DurableStore;

/// 内存实现的持久化存储
///
/// 面向嵌入式部署与测试的存储后端，与Redis实现语义一致：
/// 键支持TTL过期（惰性清理），条件删除与比较交换在单把锁下原子完成。
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    zsets: HashMap<String, HashMap<String, f64>>,
    kv: HashMap<String, Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

impl Inner {
    /// 惰性清理过期键
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.kv.retain(|_, entry| !entry.is_expired(now));
    }

    fn sorted_desc(&self, key: &str) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = self
            .zsets
            .get(key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        // 分值相同时按成员名排序，保证迭代顺序可复现
        members.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        members
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> McpResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| McpError::internal(format!("存储锁中毒: {e}")))
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> McpResult<()> {
        let mut inner = self.lock()?;
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> McpResult<bool> {
        let mut inner = self.lock()?;
        let removed = inner
            .zsets
            .get_mut(key)
            .map(|set| set.remove(member).is_some())
            .unwrap_or(false);
        debug!("内存ZREM {} {} -> {}", key, member, removed);
        Ok(removed)
    }

    async fn zscore(&self, key: &str, member: &str) -> McpResult<Option<f64>> {
        let inner = self.lock()?;
        Ok(inner.zsets.get(key).and_then(|set| set.get(member)).copied())
    }

    async fn zrange_desc(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> McpResult<Vec<(String, f64)>> {
        let inner = self.lock()?;
        let members = inner.sorted_desc(key);
        let len = members.len() as isize;
        if len == 0 {
            return Ok(vec![]);
        }
        let normalize = |index: isize| -> isize {
            if index < 0 {
                (len + index).max(0)
            } else {
                index.min(len - 1)
            }
        };
        let start = normalize(start);
        let stop = normalize(stop);
        if start > stop {
            return Ok(vec![]);
        }
        Ok(members[start as usize..=stop as usize].to_vec())
    }

    async fn zrevrank(&self, key: &str, member: &str) -> McpResult<Option<u64>> {
        let inner = self.lock()?;
        Ok(inner
            .sorted_desc(key)
            .iter()
            .position(|(m, _)| m == member)
            .map(|pos| pos as u64))
    }

    async fn get(&self, key: &str) -> McpResult<Option<String>> {
        let mut inner = self.lock()?;
        inner.purge_expired();
        Ok(inner.kv.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> McpResult<()> {
        let mut inner = self.lock()?;
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> McpResult<()> {
        let mut inner = self.lock()?;
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> McpResult<bool> {
        let mut inner = self.lock()?;
        inner.purge_expired();
        Ok(inner.kv.remove(key).is_some())
    }

    async fn keys(&self, pattern: &str) -> McpResult<Vec<String>> {
        let mut inner = self.lock()?;
        inner.purge_expired();
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        Ok(inner
            .kv
            .keys()
            .filter(|key| {
                if pattern.ends_with('*') {
                    key.starts_with(prefix)
                } else {
                    key.as_str() == pattern
                }
            })
            .cloned()
            .collect())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl_seconds: u64,
    ) -> McpResult<bool> {
        let mut inner = self.lock()?;
        inner.purge_expired();
        let current = inner.kv.get(key).map(|entry| entry.value.as_str());
        if current != expected {
            return Ok(false);
        }
        // ttl为0表示不过期，与Redis实现一致
        let expires_at = (ttl_seconds > 0).then(|| Instant::now() + Duration::from_secs(ttl_seconds));
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: new.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn ping(&self) -> McpResult<()> {
        Ok(())
    }
}
