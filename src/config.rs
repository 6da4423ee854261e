//! 存储层配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    /// TTL 清理任务的间隔（毫秒），0 表示不启动清理任务
    pub ttl_sweep_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            ttl_sweep_interval_ms: 60_000,
        }
    }
}

impl StoreConfig {
    /// 从 JSON 解析，缺省字段取默认值
    pub fn from_json(input: &str) -> StoreResult<Self> {
        let config: StoreConfig = serde_json::from_str(input)
            .map_err(|e| StoreError::InvalidArgument(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(StoreError::InvalidArgument(
                "cache.capacity must be positive when the cache is enabled".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(StoreError::InvalidArgument(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(StoreError::InvalidArgument(
                "batch.batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ttl_sweep_interval(&self) -> Option<Duration> {
        (self.ttl_sweep_interval_ms > 0).then(|| Duration::from_millis(self.ttl_sweep_interval_ms))
    }
}

/// 哈希对象读缓存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// 最多缓存的 key 数量
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
        }
    }
}

/// 唯一索引冲突重试（有界，指数退避）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 总尝试次数，包括第一次
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 5,
            max_delay_ms: 200,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待时间（attempt 从 1 开始）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// 批量游标默认参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// 每批之间的休眠（毫秒），0 表示不休眠
    pub interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            interval_ms: 0,
        }
    }
}
