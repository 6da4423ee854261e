// test_backend.rs
use async_trait::async_trait;
use docstore::traits::{AggregateQuery, DocumentBackend, DocumentCursor};
use docstore::{
    BackendError, BackendResult, DocId, Filter, FindOptions, MatchPattern, MemoryBackend, Record,
    ScoredMember, Sort, Update, UpdateOptions,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// 在 upsert 上注入唯一索引冲突，模拟两个调用方同时首次插入同一个成员
pub struct FlakyBackend {
    inner: MemoryBackend,
    failures_left: AtomicU32,
    injected: AtomicU32,
}

impl FlakyBackend {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MemoryBackend::new(),
            failures_left: AtomicU32::new(failures),
            injected: AtomicU32::new(0),
        }
    }

    /// 已经注入的冲突次数
    pub fn injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentBackend for FlakyBackend {
    async fn find(&self, filter: &Filter, options: &FindOptions) -> BackendResult<Vec<Record>> {
        self.inner.find(filter, options).await
    }

    async fn count(&self, filter: &Filter) -> BackendResult<u64> {
        self.inner.count(filter).await
    }

    async fn update_one(
        &self,
        id: &DocId,
        update: &Update,
        options: UpdateOptions,
    ) -> BackendResult<Option<Record>> {
        if options.upsert && self.take_failure() {
            self.injected.fetch_add(1, Ordering::SeqCst);
            // 让出调度，制造交错
            tokio::task::yield_now().await;
            return Err(BackendError::DuplicateKey(id.to_string()));
        }
        self.inner.update_one(id, update, options).await
    }

    async fn update_many(&self, filter: &Filter, update: &Update) -> BackendResult<u64> {
        self.inner.update_many(filter, update).await
    }

    async fn delete_many(&self, filter: &Filter) -> BackendResult<u64> {
        self.inner.delete_many(filter).await
    }

    async fn rename_key(&self, from: &str, to: &str) -> BackendResult<u64> {
        self.inner.rename_key(from, to).await
    }

    async fn aggregate(&self, query: &AggregateQuery) -> BackendResult<Vec<ScoredMember>> {
        self.inner.aggregate(query).await
    }

    async fn open_cursor(
        &self,
        filter: &Filter,
        sort: Sort,
        batch_size: usize,
    ) -> BackendResult<Box<dyn DocumentCursor>> {
        self.inner.open_cursor(filter, sort, batch_size).await
    }

    async fn distinct_keys(&self, pattern: &MatchPattern) -> BackendResult<Vec<String>> {
        self.inner.distinct_keys(pattern).await
    }

    async fn clear(&self) -> BackendResult<()> {
        self.inner.clear().await
    }
}

/// 读到数据之后再等一段时间才返回，用来让写入插到读和回填缓存之间
pub struct SlowFindBackend {
    inner: MemoryBackend,
    slow_finds: AtomicU32,
    delay: Duration,
}

impl SlowFindBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryBackend::new(),
            slow_finds: AtomicU32::new(0),
            delay,
        }
    }

    /// 接下来的 `count` 次 find 变慢
    pub fn slow_down(&self, count: u32) {
        self.slow_finds.store(count, Ordering::SeqCst);
    }

    fn take_slow(&self) -> bool {
        self.slow_finds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentBackend for SlowFindBackend {
    async fn find(&self, filter: &Filter, options: &FindOptions) -> BackendResult<Vec<Record>> {
        let records = self.inner.find(filter, options).await?;
        if self.take_slow() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(records)
    }

    async fn count(&self, filter: &Filter) -> BackendResult<u64> {
        self.inner.count(filter).await
    }

    async fn update_one(
        &self,
        id: &DocId,
        update: &Update,
        options: UpdateOptions,
    ) -> BackendResult<Option<Record>> {
        self.inner.update_one(id, update, options).await
    }

    async fn update_many(&self, filter: &Filter, update: &Update) -> BackendResult<u64> {
        self.inner.update_many(filter, update).await
    }

    async fn delete_many(&self, filter: &Filter) -> BackendResult<u64> {
        self.inner.delete_many(filter).await
    }

    async fn rename_key(&self, from: &str, to: &str) -> BackendResult<u64> {
        self.inner.rename_key(from, to).await
    }

    async fn aggregate(&self, query: &AggregateQuery) -> BackendResult<Vec<ScoredMember>> {
        self.inner.aggregate(query).await
    }

    async fn open_cursor(
        &self,
        filter: &Filter,
        sort: Sort,
        batch_size: usize,
    ) -> BackendResult<Box<dyn DocumentCursor>> {
        self.inner.open_cursor(filter, sort, batch_size).await
    }

    async fn distinct_keys(&self, pattern: &MatchPattern) -> BackendResult<Vec<String>> {
        self.inner.distinct_keys(pattern).await
    }

    async fn clear(&self) -> BackendResult<()> {
        self.inner.clear().await
    }
}
