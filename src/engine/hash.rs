//! 哈希对象
//!
//! 每个 key 一个 `Document::Hash` 文档。`get_object*` 走对象缓存，
//! 所有写操作在后端写成功后失效缓存并广播。

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::Database;
use crate::error::{BackendError, StoreError, StoreResult, check_key, check_keys};
use crate::retry::retry_on_duplicate;
use crate::traits::{Filter, FindOptions, Update, UpdateOptions};
use crate::types::{DocId, Document, Fields, Kind, Value};

fn check_field(field: &str) -> StoreResult<()> {
    if field.is_empty() {
        return Err(StoreError::InvalidArgument(
            "field name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn into_fields(document: Document) -> Option<Fields> {
    match document {
        Document::Hash(fields) => Some(fields),
        _ => None,
    }
}

impl Database {
    // ==================== 读取 ====================

    pub async fn get_object(&self, key: &str) -> StoreResult<Option<Fields>> {
        check_key(key)?;
        if let Some(hit) = self.cache().and_then(|c| c.get(key)) {
            return Ok(hit);
        }

        let epoch = self.cache().map(|c| c.epoch());
        let records = self
            .backend()
            .find(
                &Filter::key(key).kind(Kind::Hash),
                &FindOptions::default().limit(Some(1)),
            )
            .await?;
        let object = records.into_iter().next().and_then(|r| into_fields(r.document));

        if let (Some(cache), Some(epoch)) = (self.cache(), epoch) {
            cache.set(key, object.clone(), epoch);
        }
        Ok(object)
    }

    /// 结果与 keys 对齐，缺失的 key 为 None
    pub async fn get_objects<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<Vec<Option<Fields>>> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<String, Option<Fields>> = HashMap::new();
        let mut missing = Vec::new();
        let mut queued = HashSet::new();
        for key in keys {
            let key = key.as_ref();
            // 同一个 key 可能出现多次，只查一次
            if found.contains_key(key) || queued.contains(key) {
                continue;
            }
            match self.cache().and_then(|c| c.get(key)) {
                Some(hit) => {
                    found.insert(key.to_string(), hit);
                }
                None => {
                    queued.insert(key);
                    missing.push(key.to_string());
                }
            }
        }

        if !missing.is_empty() {
            let epoch = self.cache().map(|c| c.epoch());
            let records = self
                .backend()
                .find(
                    &Filter::keys(missing.iter().cloned()).kind(Kind::Hash),
                    &FindOptions::default(),
                )
                .await?;
            let mut loaded: HashMap<String, Fields> = records
                .into_iter()
                .filter_map(|r| {
                    let key = r.key;
                    into_fields(r.document).map(|f| (key, f))
                })
                .collect();

            for key in missing {
                let object = loaded.remove(&key);
                if let (Some(cache), Some(epoch)) = (self.cache(), epoch) {
                    cache.set(&key, object.clone(), epoch);
                }
                found.insert(key, object);
            }
        }

        Ok(keys
            .iter()
            .map(|k| found.get(k.as_ref()).cloned().flatten())
            .collect())
    }

    pub async fn get_object_field(&self, key: &str, field: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .get_object(key)
            .await?
            .and_then(|mut object| object.remove(field)))
    }

    /// 结果与 fields 对齐
    pub async fn get_object_fields<S: AsRef<str>>(
        &self,
        key: &str,
        fields: &[S],
    ) -> StoreResult<Vec<Option<Value>>> {
        let object = self.get_object(key).await?;
        Ok(pick_fields(object.as_ref(), fields))
    }

    pub async fn get_objects_fields<K, F>(
        &self,
        keys: &[K],
        fields: &[F],
    ) -> StoreResult<Vec<Vec<Option<Value>>>>
    where
        K: AsRef<str>,
        F: AsRef<str>,
    {
        let objects = self.get_objects(keys).await?;
        Ok(objects
            .iter()
            .map(|object| pick_fields(object.as_ref(), fields))
            .collect())
    }

    pub async fn get_object_keys(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .get_object(key)
            .await?
            .map(|object| object.into_keys().collect())
            .unwrap_or_default())
    }

    pub async fn get_object_values(&self, key: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .get_object(key)
            .await?
            .map(|object| object.into_values().collect())
            .unwrap_or_default())
    }

    pub async fn is_object_field(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self
            .get_object(key)
            .await?
            .is_some_and(|object| object.contains_key(field)))
    }

    pub async fn is_object_fields<S: AsRef<str>>(
        &self,
        key: &str,
        fields: &[S],
    ) -> StoreResult<Vec<bool>> {
        let object = self.get_object(key).await?;
        Ok(fields
            .iter()
            .map(|f| object.as_ref().is_some_and(|o| o.contains_key(f.as_ref())))
            .collect())
    }

    // ==================== 写入 ====================

    /// 合并写入字段，空字段表不做任何事
    pub async fn set_object(&self, key: &str, fields: &Fields) -> StoreResult<()> {
        check_key(key)?;
        if fields.is_empty() {
            return Ok(());
        }
        for field in fields.keys() {
            check_field(field)?;
        }

        let update = Update::SetFields(fields.iter().map(|(f, v)| (f.clone(), v.clone())).collect());
        self.backend()
            .update_one(&DocId::new(key, Kind::Hash), &update, UpdateOptions::upsert())
            .await?;
        debug!("Set {} fields on object {}", fields.len(), key);
        self.invalidate(&[key]).await;
        Ok(())
    }

    pub async fn set_objects(&self, objects: &[(String, Fields)]) -> StoreResult<()> {
        let mut ops = Vec::with_capacity(objects.len());
        for (key, fields) in objects {
            check_key(key)?;
            if fields.is_empty() {
                continue;
            }
            for field in fields.keys() {
                check_field(field)?;
            }
            let update =
                Update::SetFields(fields.iter().map(|(f, v)| (f.clone(), v.clone())).collect());
            ops.push((DocId::new(key.as_str(), Kind::Hash), update));
        }
        if ops.is_empty() {
            return Ok(());
        }

        self.backend().bulk_update(&ops, true).await?;
        let keys: Vec<&str> = ops.iter().map(|(id, _)| id.key.as_str()).collect();
        self.invalidate(&keys).await;
        Ok(())
    }

    pub async fn set_object_field(
        &self,
        key: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> StoreResult<()> {
        check_field(field)?;
        let mut fields = Fields::new();
        fields.insert(field.to_string(), value.into());
        self.set_object(key, &fields).await
    }

    pub async fn delete_object_field(&self, key: &str, field: &str) -> StoreResult<()> {
        self.delete_object_fields(key, &[field]).await
    }

    pub async fn delete_object_fields<S: AsRef<str>>(
        &self,
        key: &str,
        fields: &[S],
    ) -> StoreResult<()> {
        check_key(key)?;
        if fields.is_empty() {
            return Ok(());
        }

        let update = Update::UnsetFields(super::to_strings(fields));
        self.backend()
            .update_one(&DocId::new(key, Kind::Hash), &update, UpdateOptions::default())
            .await?;
        self.invalidate(&[key]).await;
        Ok(())
    }

    // ==================== 计数 ====================

    pub async fn incr_object_field(&self, key: &str, field: &str) -> StoreResult<i64> {
        self.incr_object_field_by(key, field, 1).await
    }

    pub async fn decr_object_field(&self, key: &str, field: &str) -> StoreResult<i64> {
        self.incr_object_field_by(key, field, -1).await
    }

    /// 原子自增，对象或字段不存在时从 0 开始
    pub async fn incr_object_field_by(&self, key: &str, field: &str, by: i64) -> StoreResult<i64> {
        check_key(key)?;
        check_field(field)?;

        let id = DocId::new(key, Kind::Hash);
        let update = Update::IncField {
            field: field.to_string(),
            by,
        };
        let (backend, id, update) = (self.backend(), &id, &update);
        let context = format!("incr_object_field_by {}.{}", key, field);
        let record = retry_on_duplicate(&self.config().retry, &context, move || async move {
            backend.update_one(id, update, UpdateOptions::upsert()).await.map_err(StoreError::from)
        })
        .await?;
        self.invalidate(&[key]).await;

        record
            .and_then(|r| into_fields(r.document))
            .and_then(|mut object| object.remove(field))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                StoreError::Backend(BackendError::NotNumeric {
                    key: key.to_string(),
                    field: field.to_string(),
                })
            })
    }

    /// 每个 (key, field, by) 一次自增，整体不是原子的
    pub async fn incr_object_field_by_bulk(
        &self,
        items: &[(String, Vec<(String, i64)>)],
    ) -> StoreResult<()> {
        let mut ops = Vec::new();
        let mut keys = Vec::with_capacity(items.len());
        for (key, increments) in items {
            check_key(key)?;
            if increments.is_empty() {
                continue;
            }
            for (field, by) in increments {
                check_field(field)?;
                ops.push((
                    DocId::new(key.as_str(), Kind::Hash),
                    Update::IncField {
                        field: field.clone(),
                        by: *by,
                    },
                ));
            }
            keys.push(key.as_str());
        }
        if ops.is_empty() {
            return Ok(());
        }

        self.backend().bulk_update(&ops, true).await?;
        self.invalidate(&keys).await;
        Ok(())
    }
}

fn pick_fields<S: AsRef<str>>(object: Option<&Fields>, fields: &[S]) -> Vec<Option<Value>> {
    fields
        .iter()
        .map(|f| object.and_then(|o| o.get(f.as_ref()).cloned()))
        .collect()
}
