use thiserror::Error;

use crate::types::Kind;

/// 顶层错误类型
#[derive(Debug, Error)]
pub enum StoreError {
    /// 参数错误，在访问后端之前同步检测
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// 批处理回调返回错误，游标已停止
    #[error("batch callback failed: {0}")]
    Callback(anyhow::Error),
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::Backend(BackendError::DuplicateKey(_)))
    }
}

/// 后端存储错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// 唯一索引 (key, member) 冲突，通常是并发 upsert 竞争
    #[error("duplicate key error: {0}")]
    DuplicateKey(String),

    #[error("WRONGTYPE key {key} holds a {actual}, not a {expected}")]
    WrongType {
        key: String,
        expected: Kind,
        actual: Kind,
    },

    #[error("cannot increment non-numeric field {field} of {key}")]
    NotNumeric { key: String, field: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("write conflict: {0}")]
    WriteConflict(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// 结果类型别名
pub type StoreResult<T> = Result<T, StoreError>;
pub type BackendResult<T> = Result<T, BackendError>;

/// 空 key 在任何 I/O 之前拒绝
pub(crate) fn check_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidArgument("key must not be empty".to_string()));
    }
    Ok(())
}

pub(crate) fn check_keys<S: AsRef<str>>(keys: &[S]) -> StoreResult<()> {
    for key in keys {
        check_key(key.as_ref())?;
    }
    Ok(())
}

pub(crate) fn check_score(score: f64) -> StoreResult<()> {
    if !score.is_finite() {
        return Err(StoreError::InvalidArgument(format!(
            "invalid score: {}",
            score
        )));
    }
    Ok(())
}
