use std::cmp::Ordering;

use async_trait::async_trait;
use ordered_float::OrderedFloat;

use crate::error::BackendResult;
use crate::range::{LexRange, MatchPattern, ScoreRange};
use crate::types::{Aggregate, DocId, Document, Kind, Order, Record, ScoredMember, Value};

/// 后端能表示的最大时间戳（毫秒）
pub const MAX_EXPIRE_AT_MS: i64 = 8_640_000_000_000_000;

/// 文档存储后端
///
/// 本 crate 对物理存储的全部要求：一个扁平的 [`Record`] 集合，
/// 在 `(key, member)` 上有唯一索引。
///
/// 所有方法都可能被并发调用。唯一的原子性保证来自 `update_one`：
/// 对单个文档读-改-写一次完成，`upsert` 时先插入。跨文档没有任何原子性。
///
/// # 方法
///
/// - `find` / `count`：带过滤、排序、skip、limit 的查询
/// - `update_one`：单文档 find-and-modify，可以返回更新前或更新后的文档
/// - `bulk_update`：无序批量 `update_one`
/// - `update_many`：更新所有匹配的文档，从不 upsert
/// - `delete_many`：删除所有匹配的文档
/// - `rename_key`：把一个 key 的全部文档迁到另一个 key
/// - `aggregate`：跨 key 按成员值聚合有序集合
/// - `open_cursor`：按过滤和排序流式遍历
/// - `distinct_keys`：扫描 key
/// - `remove_expired`：删除已过期的文档，自带 TTL 清理的后端保持默认实现即可
/// - `clear`：清空整个集合
///
/// # 错误
///
/// 同一个 `(key, member)` 并发首次插入时可能返回
/// [`crate::BackendError::DuplicateKey`]，是否重试由调用方决定。
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn find(&self, filter: &Filter, options: &FindOptions) -> BackendResult<Vec<Record>>;

    async fn count(&self, filter: &Filter) -> BackendResult<u64>;

    async fn update_one(
        &self,
        id: &DocId,
        update: &Update,
        options: UpdateOptions,
    ) -> BackendResult<Option<Record>>;

    async fn bulk_update(&self, ops: &[(DocId, Update)], upsert: bool) -> BackendResult<()> {
        let options = UpdateOptions {
            upsert,
            ..UpdateOptions::default()
        };
        for (id, update) in ops {
            self.update_one(id, update, options).await?;
        }
        Ok(())
    }

    async fn update_many(&self, filter: &Filter, update: &Update) -> BackendResult<u64>;

    async fn delete_many(&self, filter: &Filter) -> BackendResult<u64>;

    async fn rename_key(&self, from: &str, to: &str) -> BackendResult<u64>;

    async fn aggregate(&self, query: &AggregateQuery) -> BackendResult<Vec<ScoredMember>>;

    async fn open_cursor(
        &self,
        filter: &Filter,
        sort: Sort,
        batch_size: usize,
    ) -> BackendResult<Box<dyn DocumentCursor>>;

    async fn distinct_keys(&self, pattern: &MatchPattern) -> BackendResult<Vec<String>>;

    async fn clear(&self) -> BackendResult<()>;

    /// 删除所有 `expire_at <= now_ms` 的文档，返回删除数量
    async fn remove_expired(&self, _now_ms: i64) -> BackendResult<u64> {
        Ok(0)
    }

    fn max_expire_at(&self) -> i64 {
        MAX_EXPIRE_AT_MS
    }
}

/// 游标：逐条返回文档，耗尽后返回 None
#[async_trait]
pub trait DocumentCursor: Send {
    async fn next(&mut self) -> BackendResult<Option<Record>>;
}

/// 查询条件
///
/// `keys` 为空时不匹配任何文档。values / score / lex / pattern / preceding
/// 只作用于有序集合成员文档。
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub keys: Vec<String>,
    pub kind: Option<Kind>,
    pub values: Option<Vec<String>>,
    pub score: ScoreRange,
    pub lex: LexRange,
    pub pattern: Option<MatchPattern>,
    pub preceding: Option<Preceding>,
}

/// 排在 (score, value) 之前的成员，用于 rank 计数
#[derive(Debug, Clone, PartialEq)]
pub struct Preceding {
    pub score: f64,
    pub value: String,
    pub order: Order,
}

impl Filter {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            keys: vec![key.into()],
            ..Self::default()
        }
    }

    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kind = Some(Kind::SortedSet);
        self.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn score(mut self, score: ScoreRange) -> Self {
        self.kind = Some(Kind::SortedSet);
        self.score = score;
        self
    }

    pub fn lex(mut self, lex: LexRange) -> Self {
        self.kind = Some(Kind::SortedSet);
        self.lex = lex;
        self
    }

    pub fn pattern(mut self, pattern: MatchPattern) -> Self {
        self.kind = Some(Kind::SortedSet);
        self.pattern = Some(pattern);
        self
    }

    pub fn preceding(mut self, score: f64, value: impl Into<String>, order: Order) -> Self {
        self.kind = Some(Kind::SortedSet);
        self.preceding = Some(Preceding {
            score,
            value: value.into(),
            order,
        });
        self
    }

    fn member_constrained(&self) -> bool {
        self.values.is_some()
            || !self.score.is_unbounded()
            || !self.lex.is_unbounded()
            || self.pattern.is_some()
            || self.preceding.is_some()
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !self.keys.iter().any(|k| *k == record.key) {
            return false;
        }
        if let Some(kind) = self.kind {
            if record.kind() != kind {
                return false;
            }
        }
        match &record.document {
            Document::SortedSetMember { value, score } => {
                if let Some(values) = &self.values {
                    if !values.iter().any(|v| v == value) {
                        return false;
                    }
                }
                if !self.score.contains(*score) || !self.lex.contains(value) {
                    return false;
                }
                if let Some(pattern) = &self.pattern {
                    if !pattern.matches(value) {
                        return false;
                    }
                }
                if let Some(p) = &self.preceding {
                    let ord = compare_scored(*score, value, p.score, &p.value);
                    let before = match p.order {
                        Order::Asc => ord == Ordering::Less,
                        Order::Desc => ord == Ordering::Greater,
                    };
                    if !before {
                        return false;
                    }
                }
                true
            }
            _ => !self.member_constrained(),
        }
    }
}

/// (score, value) 全序；score 相同时按 value 字典序
pub fn compare_scored(a_score: f64, a_value: &str, b_score: f64, b_value: &str) -> Ordering {
    OrderedFloat(a_score)
        .cmp(&OrderedFloat(b_score))
        .then_with(|| a_value.cmp(b_value))
}

fn scored_ref(record: &Record) -> Option<(f64, &str)> {
    match &record.document {
        Document::SortedSetMember { value, score } => Some((*score, value.as_str())),
        _ => None,
    }
}

/// 排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sort {
    /// 后端自然顺序
    #[default]
    Natural,
    /// 按 score 排序，相同 score 按 value
    Score(Order),
    /// 按 value 字典序
    Value(Order),
}

impl Sort {
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ord = match (self, scored_ref(a), scored_ref(b)) {
            (Sort::Natural, _, _) => return Ordering::Equal,
            (Sort::Score(_), Some((xs, xv)), Some((ys, yv))) => compare_scored(xs, xv, ys, yv),
            (Sort::Value(_), Some((_, xv)), Some((_, yv))) => xv.cmp(yv),
            _ => a.key.cmp(&b.key),
        };
        match self {
            Sort::Score(Order::Desc) | Sort::Value(Order::Desc) => ord.reverse(),
            _ => ord,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Sort,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted(sort: Sort) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// 单文档原子更新操作符
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// 哈希：设置字段
    SetFields(Vec<(String, Value)>),
    /// 哈希：删除字段
    UnsetFields(Vec<String>),
    /// 哈希：字段整数自增（缺失视为 0）
    IncField { field: String, by: i64 },
    /// 字符串：设置 data
    SetData(Value),
    /// 字符串：data 整数自增
    IncData(i64),
    /// 集合：去重追加
    AddToSet(Vec<String>),
    /// 集合 / 列表：删除所有等于给定值的元素
    Pull(Vec<String>),
    /// 列表：头部插入，每个值依次插到最前
    PushFront(Vec<String>),
    /// 列表：尾部追加
    PushBack(Vec<String>),
    /// 列表：弹出最后一个元素
    PopBack,
    /// 列表 / 集合：整体替换数组
    SetArray(Vec<String>),
    /// 有序集合成员：设置 score
    SetScore(f64),
    /// 有序集合成员：score 自增
    IncScore(f64),
    /// 设置或清除过期时间
    SetExpireAt(Option<i64>),
}

/// find-and-modify 返回哪个版本的文档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    Before,
    #[default]
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOptions {
    pub upsert: bool,
    pub return_document: ReturnDocument,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self {
            upsert: true,
            return_document: ReturnDocument::After,
        }
    }
}

/// 跨 key 聚合有序集合成员：按 value 分组，加权后按 aggregate 合并 score，
/// 只保留出现次数 >= min_count 的分组
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub keys: Vec<String>,
    /// 与 keys 对齐；为空表示全部为 1
    pub weights: Vec<f64>,
    pub aggregate: Aggregate,
    pub min_count: usize,
    pub order: Order,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl AggregateQuery {
    pub fn weight_of(&self, key: &str) -> f64 {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.weights.get(i).copied())
            .unwrap_or(1.0)
    }
}
