//! 字符串 / 计数器 / 过期时间

use tracing::debug;

use crate::Database;
use crate::error::{BackendError, StoreError, StoreResult, check_key};
use crate::retry::retry_on_duplicate;
use crate::time;
use crate::traits::{Filter, FindOptions, Update, UpdateOptions};
use crate::types::{DocId, Document, Kind, Value};

impl Database {
    pub async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        check_key(key)?;
        let records = self
            .backend()
            .find(
                &Filter::key(key).kind(Kind::String),
                &FindOptions::default().limit(Some(1)),
            )
            .await?;
        Ok(records.into_iter().next().and_then(|r| match r.document {
            Document::String(Value::Null) => None,
            Document::String(value) => Some(value),
            _ => None,
        }))
    }

    pub async fn set(&self, key: &str, value: impl Into<Value>) -> StoreResult<()> {
        check_key(key)?;
        self.backend()
            .update_one(
                &DocId::new(key, Kind::String),
                &Update::SetData(value.into()),
                UpdateOptions::upsert(),
            )
            .await?;
        Ok(())
    }

    /// 原子 +1，key 不存在时从 0 开始
    pub async fn increment(&self, key: &str) -> StoreResult<i64> {
        check_key(key)?;
        let id = DocId::new(key, Kind::String);
        let update = Update::IncData(1);
        let (backend, id, update) = (self.backend(), &id, &update);
        let context = format!("increment {}", key);
        let record = retry_on_duplicate(&self.config().retry, &context, move || async move {
            backend.update_one(id, update, UpdateOptions::upsert()).await.map_err(StoreError::from)
        })
        .await?;

        match record.map(|r| r.document) {
            Some(Document::String(value)) => value.as_i64().ok_or_else(|| {
                StoreError::Backend(BackendError::NotNumeric {
                    key: key.to_string(),
                    field: "data".to_string(),
                })
            }),
            _ => Err(StoreError::InvalidArgument(format!(
                "{} did not return a counter",
                key
            ))),
        }
    }

    // ==================== 过期时间 ====================

    pub async fn expire(&self, key: &str, seconds: i64) -> StoreResult<()> {
        self.pexpire_at(key, time::now_ms().saturating_add(seconds.saturating_mul(1000)))
            .await
    }

    /// `unix_seconds` 是 Unix 时间戳（秒）
    pub async fn expire_at(&self, key: &str, unix_seconds: i64) -> StoreResult<()> {
        self.pexpire_at(key, unix_seconds.saturating_mul(1000)).await
    }

    pub async fn pexpire(&self, key: &str, millis: i64) -> StoreResult<()> {
        self.pexpire_at(key, time::now_ms().saturating_add(millis))
            .await
    }

    /// 作用于 key 下的所有文档；key 不存在时什么也不做
    pub async fn pexpire_at(&self, key: &str, unix_millis: i64) -> StoreResult<()> {
        check_key(key)?;
        let at = unix_millis.min(self.backend().max_expire_at());
        let updated = self
            .backend()
            .update_many(&Filter::key(key), &Update::SetExpireAt(Some(at)))
            .await?;
        debug!("Set expire_at {} on {} ({} documents)", at, key, updated);
        self.invalidate(&[key]).await;
        Ok(())
    }

    /// 剩余毫秒；没有过期时间返回 -1，key 不存在返回 -2
    pub async fn pttl(&self, key: &str) -> StoreResult<i64> {
        check_key(key)?;
        let records = self
            .backend()
            .find(&Filter::key(key), &FindOptions::default().limit(Some(1)))
            .await?;
        Ok(match records.first() {
            None => -2,
            Some(record) => match record.expire_at {
                None => -1,
                Some(at) => time::remaining_ms(at),
            },
        })
    }

    /// 剩余秒数，语义同 `pttl`
    pub async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let pttl = self.pttl(key).await?;
        if pttl < 0 {
            return Ok(pttl);
        }
        Ok(time::round_secs(pttl))
    }
}
