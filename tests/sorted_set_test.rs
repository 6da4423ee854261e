mod common;

use docstore::{Aggregate, Order, ScoreBound, ScoredMember, SetAggregation, StoreError};

use crate::common::new_db;

#[tokio::test]
async fn test_category_topics_scenario() {
    let db = new_db();
    db.sorted_set_add("cid:1:tids", 100.0, "t1").await.unwrap();
    db.sorted_set_add("cid:1:tids", 50.0, "t2").await.unwrap();

    assert_eq!(
        db.get_sorted_set_range("cid:1:tids", 0, -1, Order::Asc).await.unwrap(),
        vec!["t2", "t1"]
    );
    assert_eq!(db.sorted_set_card("cid:1:tids").await.unwrap(), 2);
    assert_eq!(db.sorted_set_rank("cid:1:tids", "t1").await.unwrap(), Some(1));
    assert_eq!(db.sorted_set_rev_rank("cid:1:tids", "t1").await.unwrap(), Some(0));
    assert_eq!(db.sorted_set_rank("cid:1:tids", "t3").await.unwrap(), None);
}

async fn seed(db: &docstore::Database, key: &str, n: usize) -> Vec<String> {
    // score 乱序写入，且有重复 score
    let mut expected = Vec::new();
    for i in 0..n {
        let score = ((i * 7) % n / 2) as f64;
        let value = format!("m{:02}", i);
        db.sorted_set_add(key, score, &value).await.unwrap();
        expected.push((score, value));
    }
    expected.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    expected.into_iter().map(|(_, v)| v).collect()
}

#[tokio::test]
async fn test_full_range_and_reverse() {
    let db = new_db();
    let expected = seed(&db, "z", 11).await;

    let asc = db.get_sorted_set_range("z", 0, -1, Order::Asc).await.unwrap();
    assert_eq!(asc, expected);

    let mut desc = db.get_sorted_set_range("z", 0, -1, Order::Desc).await.unwrap();
    desc.reverse();
    assert_eq!(desc, asc);
    assert_eq!(db.get_sorted_set_members("z").await.unwrap(), expected);
}

#[tokio::test]
async fn test_rank_matches_range_index() {
    let db = new_db();
    let expected = seed(&db, "z", 9).await;
    for (i, value) in expected.iter().enumerate() {
        assert_eq!(
            db.sorted_set_rank("z", value).await.unwrap(),
            Some(i as u64),
            "rank of {}",
            value
        );
        assert_eq!(
            db.sorted_set_rev_rank("z", value).await.unwrap(),
            Some((expected.len() - 1 - i) as u64)
        );
    }

    let values: Vec<&str> = expected.iter().map(String::as_str).chain(["nope"]).collect();
    let ranks = db.sorted_set_ranks("z", &values, Order::Asc).await.unwrap();
    let mut want: Vec<Option<u64>> = (0..expected.len() as u64).map(Some).collect();
    want.push(None);
    assert_eq!(ranks, want);

    let pairwise = db
        .sorted_sets_ranks(&["z", "z", "empty"], &[expected[2].as_str(), "nope", "x"], Order::Asc)
        .await
        .unwrap();
    assert_eq!(pairwise, vec![Some(2), None, None]);
    assert!(matches!(
        db.sorted_sets_ranks(&["z"], &["a", "b"], Order::Asc).await,
        Err(StoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_negative_index_equivalence() {
    let db = new_db();
    let expected = seed(&db, "z", 8).await;
    let n = expected.len();

    let last3 = db.get_sorted_set_range("z", -3, -1, Order::Asc).await.unwrap();
    assert_eq!(last3, expected[n - 3..].to_vec());

    let all_but_last2 = db.get_sorted_set_range("z", 0, -3, Order::Asc).await.unwrap();
    assert_eq!(all_but_last2, expected[..n - 2].to_vec());

    // 正负混用
    let middle = db.get_sorted_set_range("z", 2, -2, Order::Asc).await.unwrap();
    assert_eq!(middle, expected[2..n - 1].to_vec());
    let tail = db.get_sorted_set_range("z", -4, 6, Order::Asc).await.unwrap();
    assert_eq!(tail, expected[n - 4..=6].to_vec());

    assert!(db.get_sorted_set_range("z", -1, -3, Order::Asc).await.unwrap().is_empty());
    assert!(db.get_sorted_set_range("z", 5, 2, Order::Asc).await.unwrap().is_empty());
    assert!(db.get_sorted_set_range("missing", -3, -1, Order::Asc).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_round_trip_scores() {
    let db = new_db();
    for (i, score) in [0.0, -1.5, 3.25, 1e12, -7.0].iter().enumerate() {
        let value = format!("v{}", i);
        db.sorted_set_add("scores", *score, &value).await.unwrap();
        assert_eq!(db.sorted_set_score("scores", &value).await.unwrap(), Some(*score));
    }
    // 重复写入覆盖 score
    db.sorted_set_add("scores", 42.0, "v0").await.unwrap();
    assert_eq!(db.sorted_set_score("scores", "v0").await.unwrap(), Some(42.0));
    assert_eq!(db.sorted_set_card("scores").await.unwrap(), 5);

    assert_eq!(
        db.sorted_set_scores("scores", &["v1", "zz", "v2"]).await.unwrap(),
        vec![Some(-1.5), None, Some(3.25)]
    );
    assert!(matches!(
        db.sorted_set_add("scores", f64::NAN, "bad").await,
        Err(StoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_multi_key_membership() {
    let db = new_db();
    db.sorted_sets_add(&["uid:1:followed", "uid:2:followed"], 10.0, "tid:5")
        .await
        .unwrap();
    db.sorted_set_add_bulk(&[("uid:2:followed", 11.0, "tid:6"), ("uid:3:followed", 12.0, "tid:7")])
        .await
        .unwrap();

    let keys = ["uid:1:followed", "uid:2:followed", "uid:3:followed"];
    assert_eq!(
        db.sorted_sets_score(&keys, "tid:5").await.unwrap(),
        vec![Some(10.0), Some(10.0), None]
    );
    assert_eq!(
        db.is_member_of_sorted_sets(&keys, "tid:6").await.unwrap(),
        vec![false, true, false]
    );
    assert_eq!(
        db.is_sorted_set_members("uid:2:followed", &["tid:5", "tid:7"]).await.unwrap(),
        vec![true, false]
    );
    assert_eq!(db.sorted_sets_card(&keys).await.unwrap(), vec![1, 2, 1]);
    assert_eq!(db.sorted_sets_card_sum(&keys).await.unwrap(), 4);

    assert_eq!(
        db.get_sorted_sets_range(&keys, 0, -1, Order::Desc).await.unwrap(),
        vec!["tid:7", "tid:6", "tid:5", "tid:5"]
    );

    assert_eq!(db.sorted_sets_remove(&keys, "tid:5").await.unwrap(), 2);
    assert_eq!(db.sorted_sets_card_sum(&keys).await.unwrap(), 2);
}

#[tokio::test]
async fn test_range_by_score() {
    let db = new_db();
    db.sorted_set_add_many("z", &[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d"), (5.0, "e")])
        .await
        .unwrap();

    assert_eq!(
        db.get_sorted_set_range_by_score("z", 0, -1, 2.0, 4.0, Order::Asc).await.unwrap(),
        vec!["b", "c", "d"]
    );
    assert_eq!(
        db.get_sorted_set_range_by_score("z", 1, 2, ScoreBound::NegInf, ScoreBound::PosInf, Order::Asc)
            .await
            .unwrap(),
        vec!["b", "c"]
    );
    // 倒序时边界仍然是 (min, max)
    assert_eq!(
        db.get_sorted_set_range_by_score("z", 0, 2, 2.0, ScoreBound::PosInf, Order::Desc)
            .await
            .unwrap(),
        vec!["e", "d"]
    );
    assert!(
        db.get_sorted_set_range_by_score("z", 0, 0, 1.0, 5.0, Order::Asc)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        db.get_sorted_set_range_by_score_with_scores("z", 0, -1, 4.5, 10.0, Order::Asc)
            .await
            .unwrap(),
        vec![ScoredMember::new("e", 5.0)]
    );
    assert_eq!(db.sorted_set_count("z", 2.0, 3.0).await.unwrap(), 2);
    assert_eq!(db.sorted_set_count("z", ScoreBound::NegInf, 0.5).await.unwrap(), 0);

    assert_eq!(
        db.sorted_sets_remove_range_by_score(&["z"], ScoreBound::NegInf, 2.0).await.unwrap(),
        2
    );
    assert_eq!(
        db.get_sorted_set_range("z", 0, -1, Order::Asc).await.unwrap(),
        vec!["c", "d", "e"]
    );
}

#[tokio::test]
async fn test_lex_boundaries() {
    let db = new_db();
    for value in ["a", "b", "c", "d", "e"] {
        db.sorted_set_add("lex", 0.0, value).await.unwrap();
    }

    assert_eq!(
        db.get_sorted_set_range_by_lex("lex", "[b", "(d", 0, -1, Order::Asc).await.unwrap(),
        vec!["b", "c"]
    );
    assert_eq!(
        db.get_sorted_set_range_by_lex("lex", "(b", "[d", 0, 0, Order::Asc).await.unwrap(),
        vec!["c", "d"]
    );
    assert_eq!(
        db.get_sorted_set_range_by_lex("lex", "-", "+", 1, 2, Order::Desc).await.unwrap(),
        vec!["d", "c"]
    );
    assert_eq!(
        db.get_sorted_set_range_by_lex("lex", "c", "+", 0, -1, Order::Asc).await.unwrap(),
        vec!["c", "d", "e"]
    );
    assert_eq!(db.sorted_set_lex_count("lex", "[b", "(d").await.unwrap(), 2);
    assert_eq!(db.sorted_set_lex_count("lex", "-", "+").await.unwrap(), 5);

    assert_eq!(db.sorted_set_remove_range_by_lex("lex", "[a", "[b").await.unwrap(), 2);
    assert_eq!(db.get_sorted_set_members("lex").await.unwrap(), vec!["c", "d", "e"]);
}

#[tokio::test]
async fn test_incr_by_creates_member() {
    let db = new_db();
    assert_eq!(db.sorted_set_incr_by("views", 1.0, "tid:1").await.unwrap(), 1.0);
    assert_eq!(db.sorted_set_incr_by("views", 2.5, "tid:1").await.unwrap(), 3.5);
    assert_eq!(db.sorted_set_incr_by("views", -4.0, "tid:1").await.unwrap(), -0.5);

    let scores = db
        .sorted_set_incr_by_bulk(&[("views", 1.0, "tid:1"), ("views", 5.0, "tid:2")])
        .await
        .unwrap();
    assert_eq!(scores, vec![0.5, 5.0]);
}

#[tokio::test]
async fn test_remove_members() {
    let db = new_db();
    db.sorted_set_add_many("z", &[(1.0, "a"), (2.0, "b"), (3.0, "c")])
        .await
        .unwrap();
    assert_eq!(db.sorted_set_remove("z", &["a", "nope"]).await.unwrap(), 1);
    assert!(!db.is_sorted_set_member("z", "a").await.unwrap());
    assert_eq!(db.sorted_set_card("z").await.unwrap(), 2);
    assert_eq!(db.sorted_set_remove("missing", &["a"]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_scan_members() {
    let db = new_db();
    db.sorted_set_add_many(
        "users:sorted",
        &[(3.0, "bob:2"), (1.0, "alice:1"), (2.0, "bobby:3"), (4.0, "carol:4")],
    )
    .await
    .unwrap();

    assert_eq!(
        db.get_sorted_set_scan("users:sorted", "bob*", 0).await.unwrap(),
        vec!["bobby:3", "bob:2"]
    );
    assert_eq!(
        db.get_sorted_set_scan("users:sorted", "*:4", 0).await.unwrap(),
        vec!["carol:4"]
    );
    assert_eq!(
        db.get_sorted_set_scan_with_scores("users:sorted", "*", 2).await.unwrap(),
        vec![ScoredMember::new("alice:1", 1.0), ScoredMember::new("bobby:3", 2.0)]
    );
}

#[tokio::test]
async fn test_union() {
    let db = new_db();
    db.sorted_set_add_many("a", &[(1.0, "x"), (2.0, "y")]).await.unwrap();
    db.sorted_set_add_many("b", &[(10.0, "y"), (3.0, "z")]).await.unwrap();

    assert_eq!(db.sorted_set_union_card(&["a", "b"]).await.unwrap(), 3);

    let union = db
        .get_sorted_set_union_with_scores(&SetAggregation::new(["a", "b"]))
        .await
        .unwrap();
    assert_eq!(
        union,
        vec![
            ScoredMember::new("x", 1.0),
            ScoredMember::new("z", 3.0),
            ScoredMember::new("y", 12.0),
        ]
    );

    let max = db
        .get_sorted_set_union(
            &SetAggregation::new(["a", "b"])
                .aggregate(Aggregate::Max)
                .order(Order::Desc)
                .range(0, 1),
        )
        .await
        .unwrap();
    assert_eq!(max, vec!["y", "z"]);

    let weighted = db
        .get_sorted_set_union_with_scores(&SetAggregation::new(["a", "b"]).weights(vec![2.0, 0.5]))
        .await
        .unwrap();
    assert_eq!(
        weighted,
        vec![
            ScoredMember::new("z", 1.5),
            ScoredMember::new("x", 2.0),
            ScoredMember::new("y", 9.0),
        ]
    );
}

#[tokio::test]
async fn test_intersect() {
    let db = new_db();
    db.sorted_set_add_many("tids:recent", &[(5.0, "t1"), (4.0, "t2"), (3.0, "t3"), (2.0, "t4")])
        .await
        .unwrap();
    db.sorted_set_add_many("tag:rust", &[(100.0, "t1"), (100.0, "t3"), (100.0, "t4")])
        .await
        .unwrap();
    db.sorted_set_add_many("cid:1", &[(0.0, "t1"), (0.0, "t4"), (0.0, "t9")])
        .await
        .unwrap();

    let keys = ["tids:recent", "tag:rust", "cid:1"];
    assert_eq!(db.sorted_set_intersect_card(&keys).await.unwrap(), 2);
    assert_eq!(db.sorted_set_intersect_card(&["tids:recent", "empty"]).await.unwrap(), 0);

    // 按 tids:recent 排序，其他集合只做过滤
    let ordered = SetAggregation::new(keys)
        .weights(vec![1.0, 0.0, 0.0])
        .order(Order::Desc);
    assert_eq!(
        db.get_sorted_set_intersect_with_scores(&ordered).await.unwrap(),
        vec![ScoredMember::new("t1", 5.0), ScoredMember::new("t4", 2.0)]
    );
    assert_eq!(
        db.get_sorted_set_intersect(&ordered.clone().range(1, 1)).await.unwrap(),
        vec!["t4"]
    );

    // 一般路径：加权求和
    let summed = db
        .get_sorted_set_intersect_with_scores(&SetAggregation::new(["tids:recent", "tag:rust"]))
        .await
        .unwrap();
    assert_eq!(
        summed,
        vec![
            ScoredMember::new("t4", 102.0),
            ScoredMember::new("t3", 103.0),
            ScoredMember::new("t1", 105.0),
        ]
    );

    // 两条路径结果一致
    let filtered = db
        .get_sorted_set_intersect_with_scores(
            &SetAggregation::new(keys)
                .weights(vec![1.0, 0.0, 0.0])
                .aggregate(Aggregate::Sum)
                .order(Order::Desc),
        )
        .await
        .unwrap();
    let via_aggregate = db
        .get_sorted_set_intersect_with_scores(
            &SetAggregation::new(keys)
                .weights(vec![1.0, 0.0, 1e-300])
                .order(Order::Desc),
        )
        .await
        .unwrap();
    assert_eq!(
        filtered.iter().map(|m| &m.value).collect::<Vec<_>>(),
        via_aggregate.iter().map(|m| &m.value).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_range_with_extreme_bounds() {
    let db = new_db();
    db.sorted_set_add_many("z", &[(1.0, "a"), (2.0, "b"), (3.0, "c")])
        .await
        .unwrap();

    let all = vec!["a", "b", "c"];
    assert_eq!(
        db.get_sorted_set_range("z", 0, i64::MAX, Order::Asc).await.unwrap(),
        all
    );
    assert_eq!(
        db.get_sorted_set_range("z", i64::MIN, -1, Order::Asc).await.unwrap(),
        all
    );
    assert_eq!(
        db.get_sorted_set_range("z", i64::MIN, i64::MAX, Order::Desc)
            .await
            .unwrap(),
        vec!["c", "b", "a"]
    );
    assert!(
        db.get_sorted_set_range("z", i64::MAX, i64::MAX, Order::Asc)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        db.get_sorted_set_union(&SetAggregation::new(["z"]).range(1, i64::MAX))
            .await
            .unwrap(),
        vec!["b", "c"]
    );
}
