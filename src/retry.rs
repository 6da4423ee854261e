//! 唯一索引冲突的有界重试
//!
//! 两个调用方同时对同一个 (key, member) 做首次 upsert 时，后到的一方会
//! 撞上唯一索引。重试时文档已经存在，会走普通的原子自增路径。

use std::future::Future;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::StoreResult;

/// 对 `op` 做最多 `max_attempts` 次尝试，只在 DuplicateKey 时重试
pub async fn retry_on_duplicate<T, F, Fut>(
    config: &RetryConfig,
    context: &str,
    mut op: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_duplicate_key() && attempt < config.max_attempts => {
                let delay = config.backoff(attempt);
                warn!(
                    "Duplicate key on {} ({}), retrying in {:?} (attempt {}/{})",
                    context, e, delay, attempt, config.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
