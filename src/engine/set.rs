//! 集合：每个 key 一个 `Document::Set`，成员存成去重数组

use std::collections::HashMap;

use rand::seq::IndexedRandom;
use tracing::debug;

use super::to_strings;
use crate::Database;
use crate::error::{StoreResult, check_key, check_keys};
use crate::traits::{Filter, FindOptions, Update, UpdateOptions};
use crate::types::{DocId, Document, Kind};

impl Database {
    /// 读取若干集合的成员数组
    async fn load_sets<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<HashMap<String, Vec<String>>> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let records = self
            .backend()
            .find(
                &Filter::keys(keys.iter().map(|k| k.as_ref())).kind(Kind::Set),
                &FindOptions::default(),
            )
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|r| match r.document {
                Document::Set(members) => Some((r.key, members)),
                _ => None,
            })
            .collect())
    }

    async fn load_set(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self.load_sets(&[key]).await?.remove(key).unwrap_or_default())
    }

    // ==================== 写入 ====================

    pub async fn set_add<S: AsRef<str>>(&self, key: &str, values: &[S]) -> StoreResult<()> {
        check_key(key)?;
        if values.is_empty() {
            return Ok(());
        }
        self.backend()
            .update_one(
                &DocId::new(key, Kind::Set),
                &Update::AddToSet(to_strings(values)),
                UpdateOptions::upsert(),
            )
            .await?;
        Ok(())
    }

    /// 把同一组成员加到多个集合
    pub async fn sets_add<K, V>(&self, keys: &[K], values: &[V]) -> StoreResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        check_keys(keys)?;
        if keys.is_empty() || values.is_empty() {
            return Ok(());
        }
        let values = to_strings(values);
        let ops: Vec<_> = keys
            .iter()
            .map(|k| {
                (
                    DocId::new(k.as_ref(), Kind::Set),
                    Update::AddToSet(values.clone()),
                )
            })
            .collect();
        self.backend().bulk_update(&ops, true).await?;
        Ok(())
    }

    pub async fn set_remove<S: AsRef<str>>(&self, key: &str, values: &[S]) -> StoreResult<()> {
        check_key(key)?;
        if values.is_empty() {
            return Ok(());
        }
        self.backend()
            .update_one(
                &DocId::new(key, Kind::Set),
                &Update::Pull(to_strings(values)),
                UpdateOptions::default(),
            )
            .await?;
        Ok(())
    }

    /// 从多个集合中删除同一个成员
    pub async fn sets_remove<S: AsRef<str>>(&self, keys: &[S], value: &str) -> StoreResult<()> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(());
        }
        let filter = Filter::keys(keys.iter().map(|k| k.as_ref())).kind(Kind::Set);
        self.backend()
            .update_many(&filter, &Update::Pull(vec![value.to_string()]))
            .await?;
        Ok(())
    }

    /// 随机删除并返回一个成员，集合为空时返回 None
    pub async fn set_remove_random(&self, key: &str) -> StoreResult<Option<String>> {
        let members = self.load_set(key).await?;
        let picked = members.choose(&mut rand::rng()).cloned();
        if let Some(value) = &picked {
            self.backend()
                .update_one(
                    &DocId::new(key, Kind::Set),
                    &Update::Pull(vec![value.clone()]),
                    UpdateOptions::default(),
                )
                .await?;
            debug!("Removed random member {} from set {}", value, key);
        }
        Ok(picked)
    }

    // ==================== 读取 ====================

    pub async fn is_set_member(&self, key: &str, value: &str) -> StoreResult<bool> {
        Ok(self.load_set(key).await?.iter().any(|m| m == value))
    }

    pub async fn is_set_members<S: AsRef<str>>(&self, key: &str, values: &[S]) -> StoreResult<Vec<bool>> {
        let members = self.load_set(key).await?;
        Ok(values
            .iter()
            .map(|v| members.iter().any(|m| m == v.as_ref()))
            .collect())
    }

    /// 结果与 sets 对齐
    pub async fn is_member_of_sets<S: AsRef<str>>(&self, sets: &[S], value: &str) -> StoreResult<Vec<bool>> {
        let loaded = self.load_sets(sets).await?;
        Ok(sets
            .iter()
            .map(|k| {
                loaded
                    .get(k.as_ref())
                    .is_some_and(|members| members.iter().any(|m| m == value))
            })
            .collect())
    }

    pub async fn get_set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.load_set(key).await
    }

    pub async fn get_sets_members<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<Vec<Vec<String>>> {
        let loaded = self.load_sets(keys).await?;
        Ok(keys
            .iter()
            .map(|k| loaded.get(k.as_ref()).cloned().unwrap_or_default())
            .collect())
    }

    pub async fn set_count(&self, key: &str) -> StoreResult<usize> {
        Ok(self.load_set(key).await?.len())
    }

    pub async fn sets_count<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<Vec<usize>> {
        let loaded = self.load_sets(keys).await?;
        Ok(keys
            .iter()
            .map(|k| loaded.get(k.as_ref()).map_or(0, Vec::len))
            .collect())
    }
}
