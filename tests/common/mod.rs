#![allow(dead_code)]

pub mod test_backend;

use docstore::{Database, Fields, MemoryBackend, StoreConfig, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 内存后端 + 默认配置，顺便初始化日志
pub fn new_db() -> Database {
    let _ = tracing_subscriber::fmt::try_init();
    Database::memory()
}

/// 重试等待缩短到毫秒级
pub fn fast_config() -> StoreConfig {
    let mut config = StoreConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 4;
    config
}

pub fn shared_backend() -> Arc<MemoryBackend> {
    let _ = tracing_subscriber::fmt::try_init();
    Arc::new(MemoryBackend::new())
}

pub fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// 轮询直到条件成立或超时
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
