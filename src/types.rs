//! 文档模型
//!
//! 一个集合里混存五种逻辑类型，每个文档在写入时显式标注类型，
//! 不再依赖字段形状推断。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// 哈希对象的字段表
pub type Fields = BTreeMap<String, Value>;

/// 标量值（哈希字段值 / 字符串数据）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// 数值视图，非数值返回 None
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// 逻辑类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Hash,
    String,
    Set,
    List,
    SortedSet,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Hash => "hash",
            Kind::String => "string",
            Kind::Set => "set",
            Kind::List => "list",
            Kind::SortedSet => "zset",
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文档正文
///
/// Set/List 是单文档数组（整键 O(1) 读取，无索引范围查询）；
/// SortedSet 每个成员一个文档（可按 score / value 索引范围查询，写放大）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Document {
    Hash(Fields),
    String(Value),
    Set(Vec<String>),
    List(Vec<String>),
    SortedSetMember { value: String, score: f64 },
}

impl Document {
    pub fn kind(&self) -> Kind {
        match self {
            Document::Hash(_) => Kind::Hash,
            Document::String(_) => Kind::String,
            Document::Set(_) => Kind::Set,
            Document::List(_) => Kind::List,
            Document::SortedSetMember { .. } => Kind::SortedSet,
        }
    }

    /// upsert 时创建的空文档
    pub fn empty(kind: Kind, member: Option<&str>) -> Self {
        match kind {
            Kind::Hash => Document::Hash(Fields::new()),
            Kind::String => Document::String(Value::Null),
            Kind::Set => Document::Set(Vec::new()),
            Kind::List => Document::List(Vec::new()),
            Kind::SortedSet => Document::SortedSetMember {
                value: member.unwrap_or_default().to_string(),
                score: 0.0,
            },
        }
    }
}

/// 集合中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub document: Document,
    /// 过期时间（毫秒时间戳），仅供后台清理参考
    pub expire_at: Option<i64>,
}

impl Record {
    pub fn new(key: impl Into<String>, document: Document) -> Self {
        Self {
            key: key.into(),
            document,
            expire_at: None,
        }
    }

    pub fn kind(&self) -> Kind {
        self.document.kind()
    }

    /// 唯一索引 (key, member) 中的 member 部分
    pub fn member(&self) -> Option<&str> {
        match &self.document {
            Document::SortedSetMember { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn id(&self) -> DocId {
        DocId {
            key: self.key.clone(),
            kind: self.kind(),
            member: self.member().map(str::to_string),
        }
    }

    pub fn as_scored(&self) -> Option<ScoredMember> {
        match &self.document {
            Document::SortedSetMember { value, score } => Some(ScoredMember {
                value: value.clone(),
                score: *score,
            }),
            _ => None,
        }
    }
}

/// 单文档寻址：唯一索引 (key, member) 加上期望的类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocId {
    pub key: String,
    pub kind: Kind,
    pub member: Option<String>,
}

impl DocId {
    pub fn new(key: impl Into<String>, kind: Kind) -> Self {
        Self {
            key: key.into(),
            kind,
            member: None,
        }
    }

    pub fn member(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: Kind::SortedSet,
            member: Some(value.into()),
        }
    }
}

impl Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(m) => write!(f, "{}[{}]", self.key, m),
            None => write!(f, "{}", self.key),
        }
    }
}

/// 带分数的有序集合成员
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub value: String,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(value: impl Into<String>, score: f64) -> Self {
        Self {
            value: value.into(),
            score,
        }
    }
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn reverse(self) -> Self {
        match self {
            Order::Asc => Order::Desc,
            Order::Desc => Order::Asc,
        }
    }
}

/// 多集合聚合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    pub fn combine(self, acc: f64, score: f64) -> f64 {
        match self {
            Aggregate::Sum => acc + score,
            Aggregate::Min => acc.min(score),
            Aggregate::Max => acc.max(score),
        }
    }
}
