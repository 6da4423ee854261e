//! 与类型无关的 key 操作

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::Database;
use crate::error::{StoreResult, check_key, check_keys};
use crate::range::MatchPattern;
use crate::traits::{Filter, FindOptions};
use crate::types::Kind;

impl Database {
    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.key_type(key).await?.is_some())
    }

    pub async fn exists_many<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<Vec<bool>> {
        check_keys(keys)?;
        try_join_all(keys.iter().map(|k| self.exists(k.as_ref()))).await
    }

    /// 删除 key 下的所有文档
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        check_key(key)?;
        let removed = self.backend().delete_many(&Filter::key(key)).await?;
        debug!("Deleted key {} ({} documents)", key, removed);
        self.invalidate(&[key]).await;
        Ok(())
    }

    pub async fn delete_all<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<()> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(());
        }
        let filter = Filter::keys(keys.iter().map(|k| k.as_ref()));
        let removed = self.backend().delete_many(&filter).await?;
        debug!("Deleted {} keys ({} documents)", keys.len(), removed);
        self.invalidate(keys).await;
        Ok(())
    }

    /// 目标 key 已存在时会被覆盖；源 key 不存在时什么也不做
    pub async fn rename(&self, old_key: &str, new_key: &str) -> StoreResult<()> {
        check_key(old_key)?;
        check_key(new_key)?;
        let moved = self.backend().rename_key(old_key, new_key).await?;
        debug!("Renamed {} -> {} ({} documents)", old_key, new_key, moved);
        self.invalidate(&[old_key, new_key]).await;
        Ok(())
    }

    pub async fn key_type(&self, key: &str) -> StoreResult<Option<Kind>> {
        check_key(key)?;
        let records = self
            .backend()
            .find(&Filter::key(key), &FindOptions::default().limit(Some(1)))
            .await?;
        Ok(records.first().map(|r| r.kind()))
    }

    /// 按模式列出 key，`*` 匹配任意长度的字符串
    pub async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .backend()
            .distinct_keys(&MatchPattern::new(pattern))
            .await?)
    }

    /// 清空整个集合
    pub async fn flushdb(&self) -> StoreResult<()> {
        self.backend().clear().await?;
        info!("Flushed database");
        self.reset_cache().await;
        Ok(())
    }
}
