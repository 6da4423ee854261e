//! 内存后端
//!
//! 用 BTreeMap 模拟文档数据库的单个集合：唯一索引 (key, member)，
//! 单文档原子更新，TTL 后台清理，以及 bincode 快照。

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{BackendError, BackendResult};
use crate::range::MatchPattern;
use crate::traits::{
    AggregateQuery, DocumentBackend, DocumentCursor, Filter, FindOptions, ReturnDocument, Sort,
    Update, UpdateOptions,
};
use crate::types::{DocId, Document, Kind, Order, Record, ScoredMember, Value};

/// 唯一索引键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
struct DocKey {
    key: String,
    member: Option<String>,
}

impl DocKey {
    fn head(key: &str) -> Self {
        Self {
            key: key.to_string(),
            member: None,
        }
    }
}

impl From<&DocId> for DocKey {
    fn from(id: &DocId) -> Self {
        Self {
            key: id.key.clone(),
            member: id.member.clone(),
        }
    }
}

type Collection = BTreeMap<DocKey, Record>;

/// 内存存储实现
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<Collection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 文档总数（包括尚未清理的过期文档）
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// 某个 key 下的全部文档
    fn key_range<'a, 'k>(
        data: &'a Collection,
        key: &'k str,
    ) -> impl Iterator<Item = (&'a DocKey, &'a Record)> + use<'a, 'k> {
        data.range(DocKey::head(key)..)
            .take_while(move |(k, _)| k.key == key)
    }

    fn kind_of(data: &Collection, key: &str) -> Option<Kind> {
        Self::key_range(data, key).next().map(|(_, r)| r.kind())
    }

    fn matching<'a>(data: &'a Collection, filter: &Filter) -> Vec<(&'a DocKey, &'a Record)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for key in &filter.keys {
            if !seen.insert(key.as_str()) {
                continue;
            }
            out.extend(Self::key_range(data, key).filter(|(_, r)| filter.matches(r)));
        }
        out
    }

    fn sorted(data: &Collection, filter: &Filter, options: &FindOptions) -> Vec<Record> {
        let mut records: Vec<Record> = Self::matching(data, filter)
            .into_iter()
            .map(|(_, r)| r.clone())
            .collect();
        if options.sort != Sort::Natural {
            records.sort_by(|a, b| options.sort.compare(a, b));
        }
        let iter = records.into_iter().skip(options.skip);
        match options.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// 删除所有 expire_at <= now 的文档，返回删除数量
    pub fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, r| r.expire_at.is_none_or(|t| t > now_ms));
        let removed = before - data.len();
        if removed > 0 {
            info!("TTL monitor removed {} expired documents", removed);
        }
        removed
    }

    /// 创建快照数据
    pub fn create_snapshot(&self) -> BackendResult<Vec<u8>> {
        let data = self.data.read();
        let records: Vec<&Record> = data.values().collect();
        bincode::serialize(&records)
            .map_err(|e| BackendError::Snapshot(format!("Failed to serialize snapshot: {}", e)))
    }

    /// 从快照数据恢复
    pub fn restore_from_snapshot(&self, snapshot: &[u8]) -> BackendResult<()> {
        let records: Vec<Record> = bincode::deserialize(snapshot)
            .map_err(|e| BackendError::Snapshot(format!("Failed to deserialize snapshot: {}", e)))?;

        let mut data = self.data.write();
        data.clear();
        for record in records {
            let id = record.id();
            data.insert(DocKey::from(&id), record);
        }

        info!("Restored memory backend from snapshot, {} documents", data.len());
        Ok(())
    }
}

fn wrong_type(key: &str, expected: Kind, actual: Kind) -> BackendError {
    BackendError::WrongType {
        key: key.to_string(),
        expected,
        actual,
    }
}

/// 把更新操作符作用到一个文档上
fn apply(update: &Update, record: &mut Record) -> BackendResult<()> {
    let key = record.key.clone();
    let actual = record.kind();
    match (update, &mut record.document) {
        (Update::SetExpireAt(at), _) => {
            record.expire_at = *at;
        }
        (Update::SetFields(fields), Document::Hash(map)) => {
            for (field, value) in fields {
                map.insert(field.clone(), value.clone());
            }
        }
        (Update::UnsetFields(fields), Document::Hash(map)) => {
            for field in fields {
                map.remove(field);
            }
        }
        (Update::IncField { field, by }, Document::Hash(map)) => {
            let next = match map.get(field) {
                None | Some(Value::Null) => Value::Int(*by),
                Some(Value::Int(i)) => Value::Int(i.wrapping_add(*by)),
                // 计数器只保存整数，带小数的值不参与自增
                Some(Value::Float(f)) if f.fract() == 0.0 => Value::Int((*f as i64).wrapping_add(*by)),
                Some(_) => {
                    return Err(BackendError::NotNumeric {
                        key,
                        field: field.clone(),
                    })
                }
            };
            map.insert(field.clone(), next);
        }
        (Update::SetData(value), Document::String(data)) => {
            *data = value.clone();
        }
        (Update::IncData(by), Document::String(data)) => {
            *data = match &*data {
                Value::Null => Value::Int(*by),
                Value::Int(i) => Value::Int(i.wrapping_add(*by)),
                Value::Float(f) if f.fract() == 0.0 => Value::Int((*f as i64).wrapping_add(*by)),
                _ => {
                    return Err(BackendError::NotNumeric {
                        key,
                        field: "data".to_string(),
                    })
                }
            };
        }
        (Update::AddToSet(values), Document::Set(members)) => {
            for v in values {
                if !members.contains(v) {
                    members.push(v.clone());
                }
            }
        }
        (Update::Pull(values), Document::Set(items) | Document::List(items)) => {
            items.retain(|m| !values.contains(m));
        }
        (Update::PushFront(values), Document::List(array)) => {
            for v in values {
                array.insert(0, v.clone());
            }
        }
        (Update::PushBack(values), Document::List(array)) => {
            array.extend(values.iter().cloned());
        }
        (Update::PopBack, Document::List(array)) => {
            array.pop();
        }
        (Update::SetArray(values), Document::Set(items) | Document::List(items)) => {
            *items = values.clone();
        }
        (Update::SetScore(s), Document::SortedSetMember { score, .. }) => {
            *score = *s;
        }
        (Update::IncScore(by), Document::SortedSetMember { score, .. }) => {
            *score += *by;
        }
        (update, _) => {
            let expected = match update {
                Update::SetFields(_) | Update::UnsetFields(_) | Update::IncField { .. } => Kind::Hash,
                Update::SetData(_) | Update::IncData(_) => Kind::String,
                Update::AddToSet(_) => Kind::Set,
                Update::SetScore(_) | Update::IncScore(_) => Kind::SortedSet,
                _ => Kind::List,
            };
            return Err(wrong_type(&key, expected, actual));
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn find(&self, filter: &Filter, options: &FindOptions) -> BackendResult<Vec<Record>> {
        let data = self.data.read();
        Ok(Self::sorted(&data, filter, options))
    }

    async fn count(&self, filter: &Filter) -> BackendResult<u64> {
        let data = self.data.read();
        Ok(Self::matching(&data, filter).len() as u64)
    }

    async fn update_one(
        &self,
        id: &DocId,
        update: &Update,
        options: UpdateOptions,
    ) -> BackendResult<Option<Record>> {
        let mut data = self.data.write();

        if let Some(actual) = Self::kind_of(&data, &id.key) {
            if actual != id.kind {
                return Err(wrong_type(&id.key, id.kind, actual));
            }
        }

        let doc_key = DocKey::from(id);
        match data.get_mut(&doc_key) {
            Some(record) => {
                // 先在副本上修改，失败时原文档不变
                let mut next = record.clone();
                apply(update, &mut next)?;
                let previous = std::mem::replace(record, next);
                Ok(Some(match options.return_document {
                    ReturnDocument::Before => previous,
                    ReturnDocument::After => record.clone(),
                }))
            }
            None if !options.upsert => Ok(None),
            None => {
                let mut record = Record::new(
                    id.key.clone(),
                    Document::empty(id.kind, id.member.as_deref()),
                );
                apply(update, &mut record)?;
                debug!("Upserted {} document {}", id.kind, id);
                data.insert(doc_key, record.clone());
                Ok(match options.return_document {
                    ReturnDocument::Before => None,
                    ReturnDocument::After => Some(record),
                })
            }
        }
    }

    async fn update_many(&self, filter: &Filter, update: &Update) -> BackendResult<u64> {
        let mut data = self.data.write();
        let targets: Vec<DocKey> = Self::matching(&data, filter)
            .into_iter()
            .map(|(k, _)| k.clone())
            .collect();

        let mut updated = Vec::with_capacity(targets.len());
        for doc_key in &targets {
            if let Some(record) = data.get(doc_key) {
                let mut next = record.clone();
                apply(update, &mut next)?;
                updated.push((doc_key.clone(), next));
            }
        }
        let count = updated.len() as u64;
        for (doc_key, record) in updated {
            data.insert(doc_key, record);
        }
        Ok(count)
    }

    async fn delete_many(&self, filter: &Filter) -> BackendResult<u64> {
        let mut data = self.data.write();
        let targets: Vec<DocKey> = Self::matching(&data, filter)
            .into_iter()
            .map(|(k, _)| k.clone())
            .collect();
        for doc_key in &targets {
            data.remove(doc_key);
        }
        Ok(targets.len() as u64)
    }

    async fn rename_key(&self, from: &str, to: &str) -> BackendResult<u64> {
        if from == to {
            let data = self.data.read();
            return Ok(Self::key_range(&data, from).count() as u64);
        }

        let mut data = self.data.write();
        let stale: Vec<DocKey> = Self::key_range(&data, to).map(|(k, _)| k.clone()).collect();
        for doc_key in stale {
            data.remove(&doc_key);
        }

        let moving: Vec<DocKey> = Self::key_range(&data, from).map(|(k, _)| k.clone()).collect();
        for doc_key in &moving {
            if let Some(mut record) = data.remove(doc_key) {
                record.key = to.to_string();
                let id = record.id();
                data.insert(DocKey::from(&id), record);
            }
        }
        Ok(moving.len() as u64)
    }

    async fn aggregate(&self, query: &AggregateQuery) -> BackendResult<Vec<ScoredMember>> {
        let data = self.data.read();
        let mut groups: HashMap<&str, (f64, usize)> = HashMap::new();
        let mut seen = HashSet::new();

        for key in &query.keys {
            if !seen.insert(key.as_str()) {
                continue;
            }
            let weight = query.weight_of(key);
            for (_, record) in Self::key_range(&data, key) {
                if let Document::SortedSetMember { value, score } = &record.document {
                    let weighted = score * weight;
                    groups
                        .entry(value.as_str())
                        .and_modify(|(acc, count)| {
                            *acc = query.aggregate.combine(*acc, weighted);
                            *count += 1;
                        })
                        .or_insert((weighted, 1));
                }
            }
        }

        let mut out: Vec<ScoredMember> = groups
            .into_iter()
            .filter(|(_, (_, count))| *count >= query.min_count)
            .map(|(value, (score, _))| ScoredMember::new(value, score))
            .collect();
        out.sort_by(|a, b| {
            let ord = OrderedFloat(a.score)
                .cmp(&OrderedFloat(b.score))
                .then_with(|| a.value.cmp(&b.value));
            match query.order {
                Order::Asc => ord,
                Order::Desc => ord.reverse(),
            }
        });

        let iter = out.into_iter().skip(query.skip);
        Ok(match query.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    async fn open_cursor(
        &self,
        filter: &Filter,
        sort: Sort,
        batch_size: usize,
    ) -> BackendResult<Box<dyn DocumentCursor>> {
        let data = self.data.read();
        let records = Self::sorted(&data, filter, &FindOptions::sorted(sort));
        debug!(
            "Opened cursor over {} documents (batch size {})",
            records.len(),
            batch_size
        );
        Ok(Box::new(MemoryCursor {
            records: records.into(),
        }))
    }

    async fn remove_expired(&self, now_ms: i64) -> BackendResult<u64> {
        Ok(self.sweep_expired(now_ms) as u64)
    }

    async fn distinct_keys(&self, pattern: &MatchPattern) -> BackendResult<Vec<String>> {
        let data = self.data.read();
        let prefix = pattern.literal_prefix().unwrap_or("");
        let mut keys: Vec<String> = Vec::new();
        // 有字面前缀时只扫描以它开头的那一段
        let candidates = data
            .range(DocKey::head(prefix)..)
            .map(|(doc_key, _)| doc_key)
            .take_while(|doc_key| doc_key.key.starts_with(prefix));
        for doc_key in candidates {
            if keys.last() == Some(&doc_key.key) {
                continue;
            }
            if pattern.matches(&doc_key.key) {
                keys.push(doc_key.key.clone());
            }
        }
        keys.dedup();
        Ok(keys)
    }

    async fn clear(&self) -> BackendResult<()> {
        self.data.write().clear();
        Ok(())
    }
}

/// 打开时刻的结果快照，每个文档恰好返回一次
struct MemoryCursor {
    records: VecDeque<Record>,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn next(&mut self) -> BackendResult<Option<Record>> {
        Ok(self.records.pop_front())
    }
}
