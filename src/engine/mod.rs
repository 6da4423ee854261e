//! 命令引擎
//!
//! 每个文件是 `Database` 的一个 impl 块，按数据类型划分：
//! - hash: 哈希对象（带读缓存）
//! - keys: 通用 key 操作
//! - string: 字符串 / 计数器 / 过期时间
//! - set, list: 单文档数组
//! - zset: 有序集合，每个成员一个文档
//! - union, intersect: 多个有序集合的并集 / 交集
//! - batch: 有序集合的分批遍历

mod batch;
mod hash;
mod intersect;
mod keys;
mod list;
mod set;
mod string;
mod union;
mod zset;

pub use batch::BatchOptions;
pub use union::SetAggregation;

use crate::types::{Record, ScoredMember};

pub(crate) fn to_strings<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items.iter().map(|s| s.as_ref().to_string()).collect()
}

/// 只保留有序集合成员文档
pub(crate) fn scored(records: Vec<Record>) -> Vec<ScoredMember> {
    records.iter().filter_map(Record::as_scored).collect()
}

pub(crate) fn member_values(records: Vec<Record>) -> Vec<String> {
    scored(records).into_iter().map(|m| m.value).collect()
}
