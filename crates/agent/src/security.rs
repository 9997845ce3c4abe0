//! 安全原语
//!
//! API密钥生成、单向哈希与常量时间比较。密钥明文只在注册/重置时
//! 返回一次，存储中仅保留SHA-256哈希。

use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// API密钥长度（字母数字字符数）
pub const API_KEY_LENGTH: usize = 64;

/// 生成安全随机API密钥
pub fn generate_api_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// 计算API密钥的SHA-256十六进制哈希
pub fn hash_api_key(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// 常量时间字符串比较，耗时与内容无关
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// 校验密钥明文与存储哈希是否匹配
pub fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    constant_time_eq(&hash_api_key(api_key), stored_hash)
}
