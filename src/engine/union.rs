//! 多个有序集合的并集

use std::collections::HashSet;

use super::zset::values_of;
use crate::Database;
use crate::error::{StoreError, StoreResult, check_keys};
use crate::range::inclusive_len;
use crate::traits::AggregateQuery;
use crate::types::{Aggregate, Order, ScoredMember};

/// 并集 / 交集的参数
#[derive(Debug, Clone, PartialEq)]
pub struct SetAggregation {
    pub sets: Vec<String>,
    /// 与 sets 对齐；为空表示全部为 1
    pub weights: Vec<f64>,
    pub aggregate: Aggregate,
    pub start: i64,
    /// 小于 0 表示不限
    pub stop: i64,
    pub order: Order,
}

impl SetAggregation {
    pub fn new<I, S>(sets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sets: sets.into_iter().map(Into::into).collect(),
            weights: Vec::new(),
            aggregate: Aggregate::Sum,
            start: 0,
            stop: -1,
            order: Order::Asc,
        }
    }

    pub fn weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn range(mut self, start: i64, stop: i64) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        check_keys(&self.sets)?;
        if !self.weights.is_empty() && self.weights.len() != self.sets.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} weights for {} sets",
                self.weights.len(),
                self.sets.len()
            )));
        }
        if self.weights.iter().any(|w| !w.is_finite()) {
            return Err(StoreError::InvalidArgument(
                "weights must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// (skip, limit)：stop < 0 或 stop - start + 1 <= 0 时不限
    pub(crate) fn window(&self) -> (usize, Option<usize>) {
        let skip = self.start.max(0) as usize;
        if self.stop < 0 {
            return (skip, None);
        }
        let start = self.start.max(0);
        if self.stop < start {
            return (skip, None);
        }
        (skip, inclusive_len(start, self.stop))
    }

    /// 去重后的集合数，交集要求成员在每个集合里都出现
    pub(crate) fn distinct_sets(&self) -> usize {
        self.sets.iter().collect::<HashSet<_>>().len()
    }

    pub(crate) fn query(&self, min_count: usize) -> AggregateQuery {
        let (skip, limit) = self.window();
        AggregateQuery {
            keys: self.sets.clone(),
            weights: self.weights.clone(),
            aggregate: self.aggregate,
            min_count,
            order: self.order,
            skip,
            limit,
        }
    }
}

impl Database {
    /// 并集中不同 value 的数量
    pub async fn sorted_set_union_card<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<u64> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(0);
        }
        let params = SetAggregation::new(keys.iter().map(|k| k.as_ref()));
        let members = self.backend().aggregate(&params.query(1)).await?;
        Ok(members.len() as u64)
    }

    pub async fn get_sorted_set_union(&self, params: &SetAggregation) -> StoreResult<Vec<String>> {
        Ok(values_of(self.get_sorted_set_union_with_scores(params).await?))
    }

    /// 按 value 分组，加权后按 aggregate 合并 score，再按 (score, value) 排序
    pub async fn get_sorted_set_union_with_scores(
        &self,
        params: &SetAggregation,
    ) -> StoreResult<Vec<ScoredMember>> {
        params.validate()?;
        if params.sets.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.backend().aggregate(&params.query(1)).await?)
    }
}
