//! 哈希对象读缓存
//!
//! 固定条目数的 LRU，缓存整个哈希对象，缺失的 key 也会缓存（负缓存）。
//! 写路径负责失效，见 `Database::invalidate`。
//!
//! 回填前要先取 `epoch()`：`del`/`reset` 都会推进 epoch，读后端期间
//! 发生过失效的话，这次回填直接丢弃，避免旧对象盖住已经完成的写。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::types::Fields;

struct Entry {
    tick: u64,
    object: Option<Fields>,
}

#[derive(Default)]
struct Lru {
    entries: HashMap<String, Entry>,
    /// 访问时刻 -> key，最小的就是最久未使用的
    recency: BTreeMap<u64, String>,
    tick: u64,
    /// 失效计数，reset 后也不回退
    epoch: u64,
}

impl Lru {
    fn touch(&mut self, key: &str) -> Option<&Entry> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.to_string());
        Some(entry)
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.tick);
                true
            }
            None => false,
        }
    }
}

pub struct ObjectCache {
    capacity: usize,
    inner: Mutex<Lru>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ObjectCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Lru::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// 外层 None 表示未命中；Some(None) 表示命中了一个不存在的 key
    pub fn get(&self, key: &str) -> Option<Option<Fields>> {
        let mut lru = self.inner.lock();
        match lru.touch(key) {
            Some(entry) => {
                let object = entry.object.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(object)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 当前失效 epoch，读后端之前取
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// 回填一个对象。`epoch` 之后发生过失效则不写入，返回 false
    pub fn set(&self, key: &str, object: Option<Fields>, epoch: u64) -> bool {
        let mut lru = self.inner.lock();
        if lru.epoch != epoch {
            debug!("Skip stale cache fill for {} (epoch {} -> {})", key, epoch, lru.epoch);
            return false;
        }
        lru.remove(key);

        while lru.entries.len() >= self.capacity {
            let Some((_, oldest)) = lru.recency.pop_first() else {
                break;
            };
            lru.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        lru.tick += 1;
        let tick = lru.tick;
        lru.recency.insert(tick, key.to_string());
        lru.entries.insert(key.to_string(), Entry { tick, object });
        true
    }

    pub fn del<S: AsRef<str>>(&self, keys: &[S]) {
        let mut lru = self.inner.lock();
        lru.epoch += 1;
        for key in keys {
            lru.remove(key.as_ref());
        }
    }

    pub fn reset(&self) {
        let mut lru = self.inner.lock();
        let dropped = lru.entries.len();
        let epoch = lru.epoch + 1;
        *lru = Lru {
            epoch,
            ..Lru::default()
        };
        info!("Object cache reset, dropped {} entries", dropped);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits();
        let misses = self.misses();
        CacheStats {
            capacity: self.capacity,
            len: self.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            },
        }
    }
}

/// 缓存统计快照
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub capacity: usize,
    pub len: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}
