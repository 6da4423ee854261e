//! 有序集合分批遍历
//!
//! 打开一个按 score 升序的游标，攒满 batch_size 个成员调用一次回调。
//! 每个成员恰好交给回调一次；回调出错时立即停止。

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::Database;
use crate::error::{StoreError, StoreResult, check_key};
use crate::traits::{Filter, Sort};
use crate::types::{Kind, Order, ScoredMember};

/// 未设置的字段取 `StoreConfig::batch`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: Option<usize>,
    /// 每批处理完之后的休眠
    pub interval: Option<Duration>,
}

impl BatchOptions {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

impl Database {
    /// 返回处理的成员数；空集合不会调用回调
    pub async fn process_sorted_set<F, Fut>(
        &self,
        key: &str,
        options: BatchOptions,
        callback: F,
    ) -> StoreResult<u64>
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.process_batches(key, options, |m| m.value, callback).await
    }

    pub async fn process_sorted_set_with_scores<F, Fut>(
        &self,
        key: &str,
        options: BatchOptions,
        callback: F,
    ) -> StoreResult<u64>
    where
        F: FnMut(Vec<ScoredMember>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.process_batches(key, options, |m| m, callback).await
    }

    async fn process_batches<T, M, F, Fut>(
        &self,
        key: &str,
        options: BatchOptions,
        map: M,
        mut callback: F,
    ) -> StoreResult<u64>
    where
        M: Fn(ScoredMember) -> T,
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        check_key(key)?;
        let batch_size = options.batch_size.unwrap_or(self.config().batch.batch_size);
        if batch_size == 0 {
            return Err(StoreError::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        let interval = options
            .interval
            .or_else(|| {
                let ms = self.config().batch.interval_ms;
                (ms > 0).then(|| Duration::from_millis(ms))
            })
            .filter(|d| !d.is_zero());

        let mut cursor = self
            .backend()
            .open_cursor(
                &Filter::key(key).kind(Kind::SortedSet),
                Sort::Score(Order::Asc),
                batch_size,
            )
            .await?;

        let mut batch = Vec::with_capacity(batch_size);
        let mut processed = 0u64;
        let mut batches = 0u64;
        loop {
            let next = cursor.next().await?;
            let done = next.is_none();
            if let Some(member) = next.as_ref().and_then(|r| r.as_scored()) {
                batch.push(map(member));
            }

            if batch.len() >= batch_size || (done && !batch.is_empty()) {
                let items = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                processed += items.len() as u64;
                batches += 1;
                callback(items).await.map_err(StoreError::Callback)?;

                if !done {
                    if let Some(interval) = interval {
                        tokio::time::sleep(interval).await;
                    }
                }
            }

            if done {
                break;
            }
        }

        debug!(
            "Processed sorted set {}: {} members in {} batches",
            key, processed, batches
        );
        Ok(processed)
    }
}
