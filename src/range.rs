//! 范围参数语法
//!
//! - rank 窗口：`start`/`stop` 从 0 开始、闭区间，`-1` 表示最后一个元素
//! - score 边界：数值或 `-inf` / `+inf`
//! - lex 边界：`-` / `+` 无界，`(` 开区间，`[` 闭区间（缺省为闭区间）
//! - 匹配模式：`*` 匹配任意长度的字符串，可以出现在任何位置

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

/// 把 rank 参数翻译成一次 skip/limit 查询
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankWindow {
    Empty,
    /// 按请求方向排序，跳过 skip 个，取 limit 个（None 为不限）
    Forward { skip: usize, limit: Option<usize> },
    /// 按相反方向排序查询，结果再翻转回来
    Backward { skip: usize, limit: Option<usize> },
    /// 正负混用，需要集合大小才能定位
    Resolve { start: i64, stop: i64 },
}

impl RankWindow {
    pub fn new(start: i64, stop: i64) -> Self {
        if start < 0 && start > stop {
            return RankWindow::Empty;
        }

        if start >= 0 && stop >= 0 {
            if stop < start {
                return RankWindow::Empty;
            }
            return RankWindow::Forward {
                skip: start as usize,
                limit: inclusive_len(start, stop),
            };
        }

        if start >= 0 && stop == -1 {
            return RankWindow::Forward {
                skip: start as usize,
                limit: None,
            };
        }

        if start == 0 && stop < -1 {
            // 前 N-|stop+1| 个 == 反向跳过末尾 |stop+1| 个
            return RankWindow::Backward {
                skip: (stop + 1).unsigned_abs() as usize,
                limit: None,
            };
        }

        if start < 0 && stop < 0 {
            // stop >= start 已保证
            return RankWindow::Backward {
                skip: (stop + 1).unsigned_abs() as usize,
                limit: inclusive_len(start, stop),
            };
        }

        RankWindow::Resolve { start, stop }
    }

    /// 已知集合大小时落地为正向窗口
    pub fn resolve(self, len: usize) -> Self {
        match self {
            RankWindow::Resolve { start, stop } => {
                match normalize_range(start, stop, len as i64) {
                    Some((s, e)) => RankWindow::Forward {
                        skip: s,
                        limit: Some(e - s + 1),
                    },
                    None => RankWindow::Empty,
                }
            }
            other => other,
        }
    }
}

/// 闭区间 [start, stop] 的元素个数，超出 i64 表示范围时返回 None（不限）
pub(crate) fn inclusive_len(start: i64, stop: i64) -> Option<usize> {
    stop.checked_sub(start)
        .and_then(|d| d.checked_add(1))
        .and_then(|n| usize::try_from(n).ok())
}

/// Redis 风格的下标归一化，返回闭区间 [s, e]；空区间返回 None
pub fn normalize_range(start: i64, stop: i64, len: i64) -> Option<(usize, usize)> {
    if len <= 0 {
        return None;
    }
    let s = if start < 0 { len + start } else { start }.max(0);
    let e = if stop < 0 { len + stop } else { stop }.min(len - 1);
    if s > e {
        None
    } else {
        Some((s as usize, e as usize))
    }
}

/// 对数组做 rank 切片（List 引擎用）
pub fn slice_range<T: Clone>(items: &[T], start: i64, stop: i64) -> Vec<T> {
    match normalize_range(start, stop, items.len() as i64) {
        Some((s, e)) => items[s..=e].to_vec(),
        None => Vec::new(),
    }
}

/// score 边界（闭区间）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    NegInf,
    PosInf,
    Value(f64),
}

impl ScoreBound {
    fn as_f64(&self) -> f64 {
        match self {
            ScoreBound::NegInf => f64::NEG_INFINITY,
            ScoreBound::PosInf => f64::INFINITY,
            ScoreBound::Value(v) => *v,
        }
    }
}

impl FromStr for ScoreBound {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "-inf" => Ok(ScoreBound::NegInf),
            "+inf" | "inf" => Ok(ScoreBound::PosInf),
            other => match other.parse::<f64>() {
                Ok(v) if !v.is_nan() => Ok(ScoreBound::Value(v)),
                _ => Err(StoreError::InvalidArgument(format!(
                    "invalid score bound: {}",
                    s
                ))),
            },
        }
    }
}

impl From<f64> for ScoreBound {
    fn from(value: f64) -> Self {
        if value == f64::NEG_INFINITY {
            ScoreBound::NegInf
        } else if value == f64::INFINITY {
            ScoreBound::PosInf
        } else {
            ScoreBound::Value(value)
        }
    }
}

impl From<i64> for ScoreBound {
    fn from(value: i64) -> Self {
        ScoreBound::Value(value as f64)
    }
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::NegInf => write!(f, "-inf"),
            ScoreBound::PosInf => write!(f, "+inf"),
            ScoreBound::Value(v) => write!(f, "{}", v),
        }
    }
}

/// score 区间，min/max 都包含
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: ScoreBound,
    pub max: ScoreBound,
}

impl ScoreRange {
    pub const ALL: ScoreRange = ScoreRange {
        min: ScoreBound::NegInf,
        max: ScoreBound::PosInf,
    };

    pub fn new(min: impl Into<ScoreBound>, max: impl Into<ScoreBound>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// 从字符串参数解析，如 ("-inf", "100")
    pub fn parse(min: &str, max: &str) -> StoreResult<Self> {
        Ok(Self {
            min: min.parse()?,
            max: max.parse()?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.min == ScoreBound::NegInf && self.max == ScoreBound::PosInf
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min.as_f64() && score <= self.max.as_f64()
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::ALL
    }
}

/// 字典序边界
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexBound {
    /// `-`
    NegInf,
    /// `+`
    PosInf,
    Inclusive(String),
    Exclusive(String),
}

impl FromStr for LexBound {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "-" => LexBound::NegInf,
            "+" => LexBound::PosInf,
            _ => match s.strip_prefix('(') {
                Some(rest) => LexBound::Exclusive(rest.to_string()),
                None => LexBound::Inclusive(s.strip_prefix('[').unwrap_or(s).to_string()),
            },
        })
    }
}

/// 字典序区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexRange {
    pub min: LexBound,
    pub max: LexBound,
}

impl LexRange {
    pub fn all() -> Self {
        Self {
            min: LexBound::NegInf,
            max: LexBound::PosInf,
        }
    }

    pub fn parse(min: &str, max: &str) -> StoreResult<Self> {
        Ok(Self {
            min: min.parse()?,
            max: max.parse()?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.min == LexBound::NegInf && self.max == LexBound::PosInf
    }

    pub fn contains(&self, value: &str) -> bool {
        let above_min = match &self.min {
            LexBound::NegInf => true,
            LexBound::PosInf => false,
            LexBound::Inclusive(m) => value.cmp(m.as_str()) != Ordering::Less,
            LexBound::Exclusive(m) => value.cmp(m.as_str()) == Ordering::Greater,
        };
        let below_max = match &self.max {
            LexBound::NegInf => false,
            LexBound::PosInf => true,
            LexBound::Inclusive(m) => value.cmp(m.as_str()) != Ordering::Greater,
            LexBound::Exclusive(m) => value.cmp(m.as_str()) == Ordering::Less,
        };
        above_min && below_max
    }
}

impl Default for LexRange {
    fn default() -> Self {
        Self::all()
    }
}

/// 简化的 glob：只识别 `*`，其余字符按字面匹配
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPattern {
    Any,
    Exact(String),
    /// 按 `*` 切开的片段，首段锚定开头，末段锚定结尾
    Glob(Vec<String>),
}

impl MatchPattern {
    pub fn new(pattern: &str) -> Self {
        if !pattern.is_empty() && pattern.chars().all(|c| c == '*') {
            return MatchPattern::Any;
        }
        if !pattern.contains('*') {
            return MatchPattern::Exact(pattern.to_string());
        }
        MatchPattern::Glob(pattern.split('*').map(str::to_string).collect())
    }

    /// 第一个 `*` 之前的字面前缀，后端可以用来缩小扫描范围
    pub fn literal_prefix(&self) -> Option<&str> {
        match self {
            MatchPattern::Any => None,
            MatchPattern::Exact(p) => Some(p.as_str()),
            MatchPattern::Glob(parts) => parts.first().map(String::as_str).filter(|p| !p.is_empty()),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            MatchPattern::Any => true,
            MatchPattern::Exact(p) => candidate == p,
            MatchPattern::Glob(parts) => glob_matches(parts, candidate),
        }
    }
}

fn glob_matches(parts: &[String], candidate: &str) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return candidate.is_empty();
    };
    let Some((last, middle)) = rest.split_last() else {
        return candidate == first.as_str();
    };
    if candidate.len() < first.len() + last.len()
        || !candidate.starts_with(first.as_str())
        || !candidate.ends_with(last.as_str())
    {
        return false;
    }

    // 首尾已经锚定，中间片段从左到右贪心找最早出现的位置
    let mut remaining = &candidate[first.len()..candidate.len() - last.len()];
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(at) => remaining = &remaining[at + part.len()..],
            None => return false,
        }
    }
    true
}
