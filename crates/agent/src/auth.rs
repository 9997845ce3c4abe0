//! 令牌服务
//!
//! 签发与校验HS256对称签名的时限令牌。撤销通过存储中的按Agent纪元键
//! 实现：撤销时把纪元推进到当前时刻，签发时间不晚于纪元的令牌全部失效。

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use mcp_core::errors::{McpError, McpResult};
use mcp_core::traits::DurableStore;

/// 令牌载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Agent id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// 令牌唯一标识
    pub jti: String,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
    store: Arc<dyn DurableStore>,
    key_prefix: String,
}

impl TokenService {
    pub fn new(
        secret: &str,
        expiry_hours: i64,
        store: Arc<dyn DurableStore>,
        key_prefix: &str,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
            store,
            key_prefix: key_prefix.to_string(),
        }
    }

    fn revocation_key(&self, agent_id: &str) -> String {
        format!("{}:auth:revoked:{}", self.key_prefix, agent_id)
    }

    /// 为Agent签发时限令牌
    pub async fn issue(&self, agent_id: &str) -> McpResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: agent_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expiry_hours)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| McpError::internal(format!("令牌签发失败: {e}")))
    }

    /// 校验令牌：签名、有效期与撤销纪元
    pub async fn validate(&self, token: &str) -> McpResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| McpError::authentication(format!("令牌无效: {e}")))?;
        let claims = data.claims;

        if let Some(epoch) = self.store.get(&self.revocation_key(&claims.sub)).await? {
            let epoch: i64 = epoch
                .parse()
                .map_err(|_| McpError::internal("撤销纪元格式异常"))?;
            if claims.iat <= epoch {
                debug!("令牌已被撤销: agent={} iat={}", claims.sub, claims.iat);
                return Err(McpError::authentication("令牌已被撤销"));
            }
        }
        Ok(claims)
    }

    /// 撤销某Agent当前所有未过期令牌
    pub async fn revoke_all(&self, agent_id: &str) -> McpResult<()> {
        let now = Utc::now().timestamp();
        // 纪元键与令牌有效期同寿命，过期令牌无需继续拦截
        let ttl = (self.expiry_hours * 3600).max(1) as u64;
        self.store
            .set_ex(&self.revocation_key(agent_id), &now.to_string(), ttl)
            .await?;
        debug!("已撤销Agent全部令牌: {}", agent_id);
        Ok(())
    }
}
