//! 列表：每个 key 一个 `Document::List`，下标语义同 Redis

use tracing::debug;

use super::to_strings;
use crate::Database;
use crate::error::{StoreResult, check_key};
use crate::range::slice_range;
use crate::traits::{Filter, FindOptions, ReturnDocument, Update, UpdateOptions};
use crate::types::{DocId, Document, Kind};

impl Database {
    async fn load_list(&self, key: &str) -> StoreResult<Option<Vec<String>>> {
        check_key(key)?;
        let records = self
            .backend()
            .find(
                &Filter::key(key).kind(Kind::List),
                &FindOptions::default().limit(Some(1)),
            )
            .await?;
        Ok(records.into_iter().next().and_then(|r| match r.document {
            Document::List(array) => Some(array),
            _ => None,
        }))
    }

    async fn push_list(&self, key: &str, update: Update) -> StoreResult<()> {
        check_key(key)?;
        self.backend()
            .update_one(&DocId::new(key, Kind::List), &update, UpdateOptions::upsert())
            .await?;
        Ok(())
    }

    /// 依次插到表头，同 LPUSH：`[a, b]` 之后表头是 `b`
    pub async fn list_prepend<S: AsRef<str>>(&self, key: &str, values: &[S]) -> StoreResult<()> {
        if values.is_empty() {
            return check_key(key);
        }
        self.push_list(key, Update::PushFront(to_strings(values))).await
    }

    pub async fn list_append<S: AsRef<str>>(&self, key: &str, values: &[S]) -> StoreResult<()> {
        if values.is_empty() {
            return check_key(key);
        }
        self.push_list(key, Update::PushBack(to_strings(values))).await
    }

    /// 原子弹出最后一个元素
    pub async fn list_remove_last(&self, key: &str) -> StoreResult<Option<String>> {
        check_key(key)?;
        let options = UpdateOptions {
            upsert: false,
            return_document: ReturnDocument::Before,
        };
        let before = self
            .backend()
            .update_one(&DocId::new(key, Kind::List), &Update::PopBack, options)
            .await?;
        Ok(before.and_then(|r| match r.document {
            Document::List(mut array) => array.pop(),
            _ => None,
        }))
    }

    /// 删除所有等于给定值的元素
    pub async fn list_remove_all<S: AsRef<str>>(&self, key: &str, values: &[S]) -> StoreResult<()> {
        check_key(key)?;
        if values.is_empty() {
            return Ok(());
        }
        self.backend()
            .update_one(
                &DocId::new(key, Kind::List),
                &Update::Pull(to_strings(values)),
                UpdateOptions::default(),
            )
            .await?;
        Ok(())
    }

    /// 只保留 [start, stop]，先读后写，不是原子的
    pub async fn list_trim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        let Some(array) = self.load_list(key).await? else {
            return Ok(());
        };
        let kept = slice_range(&array, start, stop);
        debug!(
            "Trimming list {} to [{}, {}]: {} -> {} items",
            key,
            start,
            stop,
            array.len(),
            kept.len()
        );
        self.backend()
            .update_one(
                &DocId::new(key, Kind::List),
                &Update::SetArray(kept),
                UpdateOptions::default(),
            )
            .await?;
        Ok(())
    }

    pub async fn get_list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        Ok(self
            .load_list(key)
            .await?
            .map(|array| slice_range(&array, start, stop))
            .unwrap_or_default())
    }

    pub async fn list_length(&self, key: &str) -> StoreResult<usize> {
        Ok(self.load_list(key).await?.map_or(0, |array| array.len()))
    }
}
