//! 缓存失效广播
//!
//! 多个 `Database` 实例共享同一个后端时，各自的对象缓存靠这里同步：
//! 写路径本地失效后再广播，其他实例的监听任务收到后删除对应 key。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::BackendResult;

/// 每个订阅者最多缓冲的消息数，落后更多会收到 Lagged
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Invalidation {
    Keys(Vec<String>),
    /// 清空整个缓存（flushdb）
    Reset,
}

/// 带来源实例 id 的消息，监听方用它跳过自己发出的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: u64,
    pub message: Invalidation,
}

/// 失效消息的传输层
///
/// 外部传输（比如 Redis pub/sub）把收到的消息转发进一个 broadcast 通道即可。
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> BackendResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<Envelope>;
}

/// 进程内实现
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<Envelope>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvalidationBus for LocalBus {
    async fn publish(&self, envelope: Envelope) -> BackendResult<()> {
        match self.tx.send(envelope) {
            Ok(receivers) => {
                debug!("Published invalidation to {} subscribers", receivers);
                Ok(())
            }
            // 没有订阅者不算错误
            Err(_) => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}
