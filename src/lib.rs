//! docstore: Redis 风格数据结构的文档数据库适配层
//!
//! 哈希、字符串/计数器、集合、列表、有序集合全部存放在同一个文档集合里，
//! 由 [`DocumentBackend`] 提供单文档原子操作，引擎层把每个命令翻译成
//! 一到多次后端调用。
//!
//! # 支持的数据类型
//! - Hash: get/set object, fields, incr field
//! - String: get, set, increment, expire / pexpire, ttl / pttl
//! - Set: add, remove, members, is member, count, remove random
//! - List: prepend, append, remove last, trim, range, length
//! - Sorted Set: add, remove, incr by, range (rank / score / lex), rank, score,
//!   union, intersect, scan, batch processing
//!
//! # 示例
//! ```rust,no_run
//! use std::sync::Arc;
//! use docstore::{Database, MemoryBackend, Order, StoreConfig};
//!
//! # async fn demo() -> docstore::StoreResult<()> {
//! let db = Database::new(Arc::new(MemoryBackend::new()), StoreConfig::default())?;
//! db.sorted_set_add("cid:1:tids", 5.0, "5").await?;
//! db.sorted_set_add("cid:1:tids", 3.0, "3").await?;
//! assert_eq!(db.get_sorted_set_range("cid:1:tids", 0, -1, Order::Asc).await?, vec!["3", "5"]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod pubsub;
pub mod range;
pub mod retry;
pub mod time;
pub mod traits;
pub mod types;

pub use cache::{CacheStats, ObjectCache};
pub use config::{BatchConfig, CacheConfig, RetryConfig, StoreConfig};
pub use engine::{BatchOptions, SetAggregation};
pub use error::{BackendError, BackendResult, StoreError, StoreResult};
pub use memory::MemoryBackend;
pub use pubsub::{Envelope, Invalidation, InvalidationBus, LocalBus};
pub use range::{LexBound, LexRange, MatchPattern, ScoreBound, ScoreRange};
pub use traits::{DocumentBackend, DocumentCursor, Filter, FindOptions, Sort, Update, UpdateOptions};
pub use types::{Aggregate, DocId, Document, Fields, Kind, Order, Record, ScoredMember, Value};

/// 存储门面，克隆开销很小，所有克隆共享同一个后端和缓存
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn DocumentBackend>,
    cache: Option<Arc<ObjectCache>>,
    bus: Option<Arc<dyn InvalidationBus>>,
    config: StoreConfig,
    instance_id: u64,
    listener: Option<JoinHandle<()>>,
    ttl_monitor: Option<JoinHandle<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(monitor) = self.ttl_monitor.take() {
            monitor.abort();
        }
    }
}

impl Database {
    /// 不带失效广播的实例，缓存只在本实例内一致。
    /// `ttl_sweep_interval_ms` 非 0 时会启动 TTL 清理任务，需要在 tokio 运行时内调用。
    pub fn new(backend: Arc<dyn DocumentBackend>, config: StoreConfig) -> StoreResult<Self> {
        Self::build(backend, config, None)
    }

    /// 共享后端的多实例部署：写入时广播失效消息，并启动监听任务。
    /// 必须在 tokio 运行时内调用。
    pub fn with_bus(
        backend: Arc<dyn DocumentBackend>,
        config: StoreConfig,
        bus: Arc<dyn InvalidationBus>,
    ) -> StoreResult<Self> {
        Self::build(backend, config, Some(bus))
    }

    /// 内存后端 + 默认配置，同样会启动 TTL 清理任务
    pub fn memory() -> Self {
        // 默认配置总是合法的，不需要校验
        Self::assemble(Arc::new(MemoryBackend::new()), StoreConfig::default(), None)
    }

    fn build(
        backend: Arc<dyn DocumentBackend>,
        config: StoreConfig,
        bus: Option<Arc<dyn InvalidationBus>>,
    ) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self::assemble(backend, config, bus))
    }

    fn assemble(
        backend: Arc<dyn DocumentBackend>,
        config: StoreConfig,
        bus: Option<Arc<dyn InvalidationBus>>,
    ) -> Self {
        let instance_id: u64 = rand::random();
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ObjectCache::new(config.cache.capacity)));

        let listener = match (&bus, &cache) {
            (Some(bus), Some(cache)) => Some(Self::spawn_listener(
                bus.as_ref(),
                cache.clone(),
                instance_id,
            )),
            _ => None,
        };

        let ttl_monitor = config
            .ttl_sweep_interval()
            .map(|interval| Self::spawn_ttl_monitor(backend.clone(), interval));

        info!(
            "Database instance {:x} created (cache: {}, bus: {}, ttl sweep: {}ms)",
            instance_id,
            cache.is_some(),
            bus.is_some(),
            config.ttl_sweep_interval_ms
        );

        Self {
            inner: Arc::new(Inner {
                backend,
                cache,
                bus,
                config,
                instance_id,
                listener,
                ttl_monitor,
            }),
        }
    }

    /// 周期性删除过期文档，语义同文档数据库的 TTL monitor
    fn spawn_ttl_monitor(backend: Arc<dyn DocumentBackend>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match backend.remove_expired(time::now_ms()).await {
                    Ok(0) => {}
                    Ok(removed) => debug!("TTL sweep removed {} documents", removed),
                    Err(e) => warn!("TTL sweep failed: {}", e),
                }
            }
        })
    }

    /// 监听其他实例的失效消息
    fn spawn_listener(
        bus: &dyn InvalidationBus,
        cache: Arc<ObjectCache>,
        instance_id: u64,
    ) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.origin == instance_id => continue,
                    Ok(envelope) => match envelope.message {
                        Invalidation::Keys(keys) => {
                            debug!(
                                "Instance {:x} dropping {} cached keys from {:x}",
                                instance_id,
                                keys.len(),
                                envelope.origin
                            );
                            cache.del(&keys[..]);
                        }
                        Invalidation::Reset => cache.reset(),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        // 丢了消息就不知道哪些 key 过期了，只能全部清掉
                        warn!(
                            "Instance {:x} missed {} invalidations, resetting cache",
                            instance_id, skipped
                        );
                        cache.reset();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn backend(&self) -> &dyn DocumentBackend {
        self.inner.backend.as_ref()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn instance_id(&self) -> u64 {
        self.inner.instance_id
    }

    pub(crate) fn cache(&self) -> Option<&ObjectCache> {
        self.inner.cache.as_deref()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache().map(ObjectCache::stats)
    }

    /// 本地失效后广播给其他实例；广播失败只记日志，写入已经成功
    pub(crate) async fn invalidate<S: AsRef<str>>(&self, keys: &[S]) {
        if keys.is_empty() {
            return;
        }
        if let Some(cache) = self.cache() {
            cache.del(keys);
        }
        let keys = keys.iter().map(|k| k.as_ref().to_string()).collect();
        self.publish(Invalidation::Keys(keys)).await;
    }

    pub(crate) async fn reset_cache(&self) {
        if let Some(cache) = self.cache() {
            cache.reset();
        }
        self.publish(Invalidation::Reset).await;
    }

    async fn publish(&self, message: Invalidation) {
        let Some(bus) = &self.inner.bus else {
            return;
        };
        let envelope = Envelope {
            origin: self.inner.instance_id,
            message,
        };
        if let Err(e) = bus.publish(envelope).await {
            warn!(
                "Instance {:x} failed to publish invalidation: {}",
                self.inner.instance_id, e
            );
        }
    }
}
