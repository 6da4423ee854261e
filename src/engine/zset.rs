//! 有序集合
//!
//! 每个成员一个 `Document::SortedSetMember` 文档，唯一索引 (key, value)。
//! 成员顺序是 (score, value)，倒序时两者一起倒过来。

use std::collections::HashMap;

use futures::future::try_join_all;
use tracing::debug;

use super::{member_values, scored, to_strings};
use crate::Database;
use crate::error::{BackendError, StoreError, StoreResult, check_key, check_keys, check_score};
use crate::range::{LexRange, MatchPattern, RankWindow, ScoreBound, ScoreRange};
use crate::retry::retry_on_duplicate;
use crate::traits::{Filter, FindOptions, Sort, Update, UpdateOptions};
use crate::types::{DocId, Kind, Order, ScoredMember};

fn zset(key: &str) -> Filter {
    Filter::key(key).kind(Kind::SortedSet)
}

fn zsets<S: AsRef<str>>(keys: &[S]) -> Filter {
    Filter::keys(keys.iter().map(|k| k.as_ref())).kind(Kind::SortedSet)
}

/// count < 0 不限，0 返回空
fn score_limit(count: i64) -> Option<Option<usize>> {
    match count {
        0 => None,
        c if c < 0 => Some(None),
        c => Some(Some(c as usize)),
    }
}

impl Database {
    // ==================== 写入 ====================

    pub async fn sorted_set_add(&self, key: &str, score: f64, value: &str) -> StoreResult<()> {
        check_key(key)?;
        check_score(score)?;
        let id = DocId::member(key, value);
        let update = Update::SetScore(score);
        let (backend, id, update) = (self.backend(), &id, &update);
        let context = format!("sorted_set_add {}", key);
        retry_on_duplicate(&self.config().retry, &context, move || async move {
            backend.update_one(id, update, UpdateOptions::upsert()).await.map_err(StoreError::from)
        })
        .await?;
        Ok(())
    }

    /// 一个 key 写入多个 (score, value)
    pub async fn sorted_set_add_many<S: AsRef<str>>(
        &self,
        key: &str,
        members: &[(f64, S)],
    ) -> StoreResult<()> {
        check_key(key)?;
        if members.is_empty() {
            return Ok(());
        }
        let mut ops = Vec::with_capacity(members.len());
        for (score, value) in members {
            check_score(*score)?;
            ops.push((DocId::member(key, value.as_ref()), Update::SetScore(*score)));
        }
        self.backend().bulk_update(&ops, true).await?;
        debug!("Added {} members to sorted set {}", ops.len(), key);
        Ok(())
    }

    /// 同一个成员写入多个 key
    pub async fn sorted_sets_add<S: AsRef<str>>(
        &self,
        keys: &[S],
        score: f64,
        value: &str,
    ) -> StoreResult<()> {
        check_keys(keys)?;
        check_score(score)?;
        if keys.is_empty() {
            return Ok(());
        }
        let ops: Vec<_> = keys
            .iter()
            .map(|k| (DocId::member(k.as_ref(), value), Update::SetScore(score)))
            .collect();
        self.backend().bulk_update(&ops, true).await?;
        Ok(())
    }

    /// 任意 (key, score, value) 组合
    pub async fn sorted_set_add_bulk<K, V>(&self, items: &[(K, f64, V)]) -> StoreResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut ops = Vec::with_capacity(items.len());
        for (key, score, value) in items {
            check_key(key.as_ref())?;
            check_score(*score)?;
            ops.push((
                DocId::member(key.as_ref(), value.as_ref()),
                Update::SetScore(*score),
            ));
        }
        if ops.is_empty() {
            return Ok(());
        }
        self.backend().bulk_update(&ops, true).await?;
        Ok(())
    }

    /// 返回删除的成员数
    pub async fn sorted_set_remove<S: AsRef<str>>(&self, key: &str, values: &[S]) -> StoreResult<u64> {
        check_key(key)?;
        if values.is_empty() {
            return Ok(0);
        }
        Ok(self
            .backend()
            .delete_many(&zset(key).values(to_strings(values)))
            .await?)
    }

    pub async fn sorted_sets_remove<S: AsRef<str>>(&self, keys: &[S], value: &str) -> StoreResult<u64> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self
            .backend()
            .delete_many(&zsets(keys).values([value]))
            .await?)
    }

    pub async fn sorted_sets_remove_range_by_score<S: AsRef<str>>(
        &self,
        keys: &[S],
        min: impl Into<ScoreBound>,
        max: impl Into<ScoreBound>,
    ) -> StoreResult<u64> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(0);
        }
        let range = ScoreRange::new(min, max);
        let removed = self.backend().delete_many(&zsets(keys).score(range)).await?;
        debug!("Removed {} members with score in {:?}", removed, range);
        Ok(removed)
    }

    pub async fn sorted_set_remove_range_by_lex(&self, key: &str, min: &str, max: &str) -> StoreResult<u64> {
        check_key(key)?;
        let range = LexRange::parse(min, max)?;
        Ok(self.backend().delete_many(&zset(key).lex(range)).await?)
    }

    /// 原子自增 score，成员不存在时从 0 开始，返回新 score
    pub async fn sorted_set_incr_by(&self, key: &str, by: f64, value: &str) -> StoreResult<f64> {
        check_key(key)?;
        check_score(by)?;
        let id = DocId::member(key, value);
        let update = Update::IncScore(by);
        let (backend, id, update) = (self.backend(), &id, &update);
        let context = format!("sorted_set_incr_by {}", key);
        let record = retry_on_duplicate(&self.config().retry, &context, move || async move {
            backend.update_one(id, update, UpdateOptions::upsert()).await.map_err(StoreError::from)
        })
        .await?;

        record
            .and_then(|r| r.as_scored())
            .map(|m| m.score)
            .ok_or_else(|| {
                StoreError::Backend(BackendError::Internal(format!(
                    "upsert on {} returned no document",
                    id
                )))
            })
    }

    /// 逐个自增，结果与 items 对齐
    pub async fn sorted_set_incr_by_bulk<K, V>(&self, items: &[(K, f64, V)]) -> StoreResult<Vec<f64>>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        try_join_all(
            items
                .iter()
                .map(|(key, by, value)| self.sorted_set_incr_by(key.as_ref(), *by, value.as_ref())),
        )
        .await
    }

    // ==================== 计数 ====================

    pub async fn sorted_set_card(&self, key: &str) -> StoreResult<u64> {
        check_key(key)?;
        Ok(self.backend().count(&zset(key)).await?)
    }

    pub async fn sorted_sets_card<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<Vec<u64>> {
        check_keys(keys)?;
        try_join_all(keys.iter().map(|k| self.sorted_set_card(k.as_ref()))).await
    }

    /// 重复的 key 只算一次
    pub async fn sorted_sets_card_sum<S: AsRef<str>>(&self, keys: &[S]) -> StoreResult<u64> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.backend().count(&zsets(keys)).await?)
    }

    /// score 在 [min, max] 内的成员数
    pub async fn sorted_set_count(
        &self,
        key: &str,
        min: impl Into<ScoreBound>,
        max: impl Into<ScoreBound>,
    ) -> StoreResult<u64> {
        check_key(key)?;
        let range = ScoreRange::new(min, max);
        Ok(self.backend().count(&zset(key).score(range)).await?)
    }

    // ==================== rank 范围 ====================

    /// 多个 key 合并后按 rank 取 [start, stop]
    async fn range_by_rank<S: AsRef<str>>(
        &self,
        keys: &[S],
        start: i64,
        stop: i64,
        order: Order,
    ) -> StoreResult<Vec<ScoredMember>> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let filter = zsets(keys);

        let mut window = RankWindow::new(start, stop);
        if let RankWindow::Resolve { .. } = window {
            let len = self.backend().count(&filter).await? as usize;
            window = window.resolve(len);
        }

        let (sort, skip, limit, reverse) = match window {
            RankWindow::Forward { skip, limit } => (Sort::Score(order), skip, limit, false),
            RankWindow::Backward { skip, limit } => (Sort::Score(order.reverse()), skip, limit, true),
            RankWindow::Empty | RankWindow::Resolve { .. } => return Ok(Vec::new()),
        };

        let records = self
            .backend()
            .find(&filter, &FindOptions::sorted(sort).skip(skip).limit(limit))
            .await?;
        let mut members = scored(records);
        if reverse {
            members.reverse();
        }
        Ok(members)
    }

    /// start/stop 从 0 开始的闭区间，负数从末尾数
    pub async fn get_sorted_set_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: Order,
    ) -> StoreResult<Vec<String>> {
        Ok(values_of(self.range_by_rank(&[key], start, stop, order).await?))
    }

    pub async fn get_sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: Order,
    ) -> StoreResult<Vec<ScoredMember>> {
        self.range_by_rank(&[key], start, stop, order).await
    }

    /// 多个 key 的成员合并排序，同一个 value 在不同 key 中会出现多次
    pub async fn get_sorted_sets_range<S: AsRef<str>>(
        &self,
        keys: &[S],
        start: i64,
        stop: i64,
        order: Order,
    ) -> StoreResult<Vec<String>> {
        Ok(values_of(self.range_by_rank(keys, start, stop, order).await?))
    }

    pub async fn get_sorted_sets_range_with_scores<S: AsRef<str>>(
        &self,
        keys: &[S],
        start: i64,
        stop: i64,
        order: Order,
    ) -> StoreResult<Vec<ScoredMember>> {
        self.range_by_rank(keys, start, stop, order).await
    }

    // ==================== score 范围 ====================

    async fn range_by_score(
        &self,
        key: &str,
        offset: usize,
        count: i64,
        range: ScoreRange,
        order: Order,
    ) -> StoreResult<Vec<ScoredMember>> {
        check_key(key)?;
        let Some(limit) = score_limit(count) else {
            return Ok(Vec::new());
        };
        let records = self
            .backend()
            .find(
                &zset(key).score(range),
                &FindOptions::sorted(Sort::Score(order)).skip(offset).limit(limit),
            )
            .await?;
        Ok(scored(records))
    }

    /// 倒序时边界仍然按 (min, max) 给出；count 为 -1 不限，0 返回空
    pub async fn get_sorted_set_range_by_score(
        &self,
        key: &str,
        offset: usize,
        count: i64,
        min: impl Into<ScoreBound>,
        max: impl Into<ScoreBound>,
        order: Order,
    ) -> StoreResult<Vec<String>> {
        let range = ScoreRange::new(min, max);
        Ok(values_of(self.range_by_score(key, offset, count, range, order).await?))
    }

    pub async fn get_sorted_set_range_by_score_with_scores(
        &self,
        key: &str,
        offset: usize,
        count: i64,
        min: impl Into<ScoreBound>,
        max: impl Into<ScoreBound>,
        order: Order,
    ) -> StoreResult<Vec<ScoredMember>> {
        let range = ScoreRange::new(min, max);
        self.range_by_score(key, offset, count, range, order).await
    }

    // ==================== lex 范围 ====================

    /// 按 value 字典序取范围，count <= 0 不限
    pub async fn get_sorted_set_range_by_lex(
        &self,
        key: &str,
        min: &str,
        max: &str,
        offset: usize,
        count: i64,
        order: Order,
    ) -> StoreResult<Vec<String>> {
        check_key(key)?;
        let range = LexRange::parse(min, max)?;
        let limit = (count > 0).then_some(count as usize);
        let records = self
            .backend()
            .find(
                &zset(key).lex(range),
                &FindOptions::sorted(Sort::Value(order)).skip(offset).limit(limit),
            )
            .await?;
        Ok(member_values(records))
    }

    pub async fn sorted_set_lex_count(&self, key: &str, min: &str, max: &str) -> StoreResult<u64> {
        check_key(key)?;
        let range = LexRange::parse(min, max)?;
        Ok(self.backend().count(&zset(key).lex(range)).await?)
    }

    // ==================== rank ====================

    /// 排在 value 前面的成员数
    async fn rank_of(&self, key: &str, value: &str, order: Order) -> StoreResult<Option<u64>> {
        let Some(score) = self.sorted_set_score(key, value).await? else {
            return Ok(None);
        };
        let before = self
            .backend()
            .count(&zset(key).preceding(score, value, order))
            .await?;
        Ok(Some(before))
    }

    pub async fn sorted_set_rank(&self, key: &str, value: &str) -> StoreResult<Option<u64>> {
        self.rank_of(key, value, Order::Asc).await
    }

    pub async fn sorted_set_rev_rank(&self, key: &str, value: &str) -> StoreResult<Option<u64>> {
        self.rank_of(key, value, Order::Desc).await
    }

    /// 一次读出整个有序集合再查下标，O(N)
    pub async fn sorted_set_ranks<S: AsRef<str>>(
        &self,
        key: &str,
        values: &[S],
        order: Order,
    ) -> StoreResult<Vec<Option<u64>>> {
        let members = self.range_by_rank(&[key], 0, -1, order).await?;
        let index: HashMap<&str, u64> = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.value.as_str(), i as u64))
            .collect();
        Ok(values
            .iter()
            .map(|v| index.get(v.as_ref()).copied())
            .collect())
    }

    /// keys 与 values 一一对应
    pub async fn sorted_sets_ranks<K, V>(
        &self,
        keys: &[K],
        values: &[V],
        order: Order,
    ) -> StoreResult<Vec<Option<u64>>>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if keys.len() != values.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        check_keys(keys)?;
        try_join_all(
            keys.iter()
                .zip(values)
                .map(|(k, v)| self.rank_of(k.as_ref(), v.as_ref(), order)),
        )
        .await
    }

    // ==================== score / 成员 ====================

    pub async fn sorted_set_score(&self, key: &str, value: &str) -> StoreResult<Option<f64>> {
        check_key(key)?;
        let records = self
            .backend()
            .find(&zset(key).values([value]), &FindOptions::default().limit(Some(1)))
            .await?;
        Ok(records.first().and_then(|r| r.as_scored()).map(|m| m.score))
    }

    /// 结果与 values 对齐
    pub async fn sorted_set_scores<S: AsRef<str>>(
        &self,
        key: &str,
        values: &[S],
    ) -> StoreResult<Vec<Option<f64>>> {
        check_key(key)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let records = self
            .backend()
            .find(&zset(key).values(to_strings(values)), &FindOptions::default())
            .await?;
        let scores: HashMap<String, f64> = scored(records)
            .into_iter()
            .map(|m| (m.value, m.score))
            .collect();
        Ok(values
            .iter()
            .map(|v| scores.get(v.as_ref()).copied())
            .collect())
    }

    /// 同一个成员在多个 key 中的 score，结果与 keys 对齐
    pub async fn sorted_sets_score<S: AsRef<str>>(
        &self,
        keys: &[S],
        value: &str,
    ) -> StoreResult<Vec<Option<f64>>> {
        check_keys(keys)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let records = self
            .backend()
            .find(&zsets(keys).values([value]), &FindOptions::default())
            .await?;
        let scores: HashMap<String, f64> = records
            .into_iter()
            .filter_map(|r| r.as_scored().map(|m| (r.key, m.score)))
            .collect();
        Ok(keys
            .iter()
            .map(|k| scores.get(k.as_ref()).copied())
            .collect())
    }

    pub async fn is_sorted_set_member(&self, key: &str, value: &str) -> StoreResult<bool> {
        Ok(self.sorted_set_score(key, value).await?.is_some())
    }

    pub async fn is_sorted_set_members<S: AsRef<str>>(
        &self,
        key: &str,
        values: &[S],
    ) -> StoreResult<Vec<bool>> {
        let scores = self.sorted_set_scores(key, values).await?;
        Ok(scores.iter().map(Option::is_some).collect())
    }

    pub async fn is_member_of_sorted_sets<S: AsRef<str>>(
        &self,
        keys: &[S],
        value: &str,
    ) -> StoreResult<Vec<bool>> {
        let scores = self.sorted_sets_score(keys, value).await?;
        Ok(scores.iter().map(Option::is_some).collect())
    }

    /// 按 (score, value) 升序返回所有成员
    pub async fn get_sorted_set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.get_sorted_set_range(key, 0, -1, Order::Asc).await
    }

    // ==================== scan ====================

    async fn scan_members(
        &self,
        key: &str,
        pattern: &str,
        limit: usize,
    ) -> StoreResult<Vec<ScoredMember>> {
        check_key(key)?;
        let records = self
            .backend()
            .find(
                &zset(key).pattern(MatchPattern::new(pattern)),
                &FindOptions::sorted(Sort::Score(Order::Asc)).limit((limit > 0).then_some(limit)),
            )
            .await?;
        Ok(scored(records))
    }

    /// value 匹配模式的成员，limit 为 0 不限
    pub async fn get_sorted_set_scan(
        &self,
        key: &str,
        pattern: &str,
        limit: usize,
    ) -> StoreResult<Vec<String>> {
        Ok(values_of(self.scan_members(key, pattern, limit).await?))
    }

    pub async fn get_sorted_set_scan_with_scores(
        &self,
        key: &str,
        pattern: &str,
        limit: usize,
    ) -> StoreResult<Vec<ScoredMember>> {
        self.scan_members(key, pattern, limit).await
    }
}

pub(crate) fn values_of(members: Vec<ScoredMember>) -> Vec<String> {
    members.into_iter().map(|m| m.value).collect()
}
