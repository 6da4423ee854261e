//! 多个有序集合的交集
//!
//! 常见用法是「按一个集合排序，其他集合只做成员过滤」（权重一个为 1，
//! 其余为 0）。这种情况下不需要聚合：从最小的集合取出候选成员，依次
//! 在其他集合里过滤，最后在排序集合上做一次带 sort/skip/limit 的查询。

use futures::future::try_join_all;
use tracing::debug;

use super::union::SetAggregation;
use super::zset::values_of;
use super::{member_values, scored};
use crate::Database;
use crate::error::{StoreResult, check_keys};
use crate::traits::{Filter, FindOptions, Sort};
use crate::types::{Aggregate, Kind, ScoredMember};

impl SetAggregation {
    /// 排序集合的下标：恰好一个权重为 1、其余为 0，且按 SUM 聚合
    fn primary_set(&self) -> Option<usize> {
        if self.aggregate != Aggregate::Sum || self.weights.len() != self.sets.len() {
            return None;
        }
        let mut primary = None;
        for (i, w) in self.weights.iter().enumerate() {
            if *w == 1.0 {
                if primary.is_some() {
                    return None;
                }
                primary = Some(i);
            } else if *w != 0.0 {
                return None;
            }
        }
        primary
    }
}

impl Database {
    /// 从最小的集合开始逐个过滤，返回同时属于 keys 中所有集合的 value
    async fn intersect_values<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<Vec<String>> {
        let cards = try_join_all(keys.iter().map(|k| self.sorted_set_card(k.as_ref()))).await?;
        if cards.contains(&0) {
            return Ok(Vec::new());
        }

        let mut by_size: Vec<(&str, u64)> = keys.iter().map(|k| k.as_ref()).zip(cards).collect();
        by_size.sort_by_key(|(_, card)| *card);

        let Some(((seed, _), rest)) = by_size.split_first() else {
            return Ok(Vec::new());
        };
        let records = self
            .backend()
            .find(&Filter::key(*seed).kind(Kind::SortedSet), &FindOptions::default())
            .await?;
        let mut candidates = member_values(records);

        for (key, _) in rest {
            if candidates.is_empty() {
                break;
            }
            if key == seed {
                continue;
            }
            let records = self
                .backend()
                .find(&Filter::key(*key).values(candidates), &FindOptions::default())
                .await?;
            candidates = member_values(records);
        }
        Ok(candidates)
    }

    pub async fn sorted_set_intersect_card<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<u64> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.intersect_values(keys).await?.len() as u64)
    }

    pub async fn get_sorted_set_intersect(&self, params: &SetAggregation) -> StoreResult<Vec<String>> {
        Ok(values_of(self.get_sorted_set_intersect_with_scores(params).await?))
    }

    pub async fn get_sorted_set_intersect_with_scores(
        &self,
        params: &SetAggregation,
    ) -> StoreResult<Vec<ScoredMember>> {
        params.validate()?;
        if params.sets.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(primary) = params.primary_set() {
            return self.intersect_filtered(params, primary).await;
        }

        let query = params.query(params.distinct_sets());
        Ok(self.backend().aggregate(&query).await?)
    }

    /// 排序集合 + 成员过滤
    async fn intersect_filtered(
        &self,
        params: &SetAggregation,
        primary: usize,
    ) -> StoreResult<Vec<ScoredMember>> {
        let primary_key = params.sets[primary].as_str();
        let filters: Vec<&str> = params
            .sets
            .iter()
            .map(String::as_str)
            .filter(|k| *k != primary_key)
            .collect();
        debug!(
            "Intersect ordered by {} filtered through {} sets",
            primary_key,
            filters.len()
        );

        let candidates = if filters.is_empty() {
            None
        } else {
            let values = self.intersect_values(&filters).await?;
            if values.is_empty() {
                return Ok(Vec::new());
            }
            Some(values)
        };

        let mut filter = Filter::key(primary_key).kind(Kind::SortedSet);
        if let Some(values) = candidates {
            filter = filter.values(values);
        }
        let (skip, limit) = params.window();
        let records = self
            .backend()
            .find(
                &filter,
                &FindOptions::sorted(Sort::Score(params.order)).skip(skip).limit(limit),
            )
            .await?;
        Ok(scored(records))
    }
}
