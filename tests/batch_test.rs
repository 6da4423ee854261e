mod common;

use docstore::{BatchOptions, Order, StoreError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::common::new_db;

#[tokio::test]
async fn test_batches_partition_full_range() {
    let db = new_db();
    for i in 0..23 {
        // 写入顺序与 score 顺序不同
        let score = ((i * 11) % 23) as f64;
        db.sorted_set_add("uid:1:posts", score, &format!("pid:{}", i))
            .await
            .unwrap();
    }
    let full = db
        .get_sorted_set_range("uid:1:posts", 0, -1, Order::Asc)
        .await
        .unwrap();

    for batch_size in [1, 5, 7, 23, 100] {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        let processed = db
            .process_sorted_set(
                "uid:1:posts",
                BatchOptions::default().batch_size(batch_size),
                move |batch| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().await.push(batch);
                        anyhow::Ok(())
                    }
                },
            )
            .await
            .unwrap();
        assert_eq!(processed, 23);

        let batches = batches.lock().await;
        assert_eq!(batches.len(), 23usize.div_ceil(batch_size));
        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
        let concatenated: Vec<String> = batches.iter().flatten().cloned().collect();
        assert_eq!(concatenated, full, "batch_size={}", batch_size);
    }
}

#[tokio::test]
async fn test_with_scores_and_final_partial_batch() {
    let db = new_db();
    db.sorted_set_add_many("z", &[(3.0, "c"), (1.0, "a"), (2.0, "b")])
        .await
        .unwrap();

    let sizes = Arc::new(Mutex::new(Vec::new()));
    let scores = Arc::new(Mutex::new(Vec::new()));
    let (sizes_sink, scores_sink) = (sizes.clone(), scores.clone());
    db.process_sorted_set_with_scores("z", BatchOptions::default().batch_size(2), move |batch| {
        let (sizes, scores) = (sizes_sink.clone(), scores_sink.clone());
        async move {
            sizes.lock().await.push(batch.len());
            scores
                .lock()
                .await
                .extend(batch.into_iter().map(|m| m.score));
            anyhow::Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(*sizes.lock().await, vec![2, 1]);
    assert_eq!(*scores.lock().await, vec![1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn test_empty_set_never_calls_callback() {
    let db = new_db();
    let calls = Arc::new(Mutex::new(0));
    let sink = calls.clone();
    let processed = db
        .process_sorted_set("missing", BatchOptions::default(), move |_| {
            let sink = sink.clone();
            async move {
                *sink.lock().await += 1;
                anyhow::Ok(())
            }
        })
        .await
        .unwrap();
    assert_eq!(processed, 0);
    assert_eq!(*calls.lock().await, 0);
}

#[tokio::test]
async fn test_callback_error_stops_iteration() {
    let db = new_db();
    for i in 0..10 {
        db.sorted_set_add("z", i as f64, &format!("m{}", i)).await.unwrap();
    }

    let calls = Arc::new(Mutex::new(0));
    let sink = calls.clone();
    let err = db
        .process_sorted_set("z", BatchOptions::default().batch_size(3), move |_| {
            let sink = sink.clone();
            async move {
                let mut calls = sink.lock().await;
                *calls += 1;
                if *calls == 2 {
                    anyhow::bail!("downstream rejected batch");
                }
                anyhow::Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Callback(_)));
    assert!(err.to_string().contains("downstream rejected batch"));
    assert_eq!(*calls.lock().await, 2);
}

#[tokio::test]
async fn test_interval_between_batches() {
    let db = new_db();
    for i in 0..6 {
        db.sorted_set_add("z", i as f64, &format!("m{}", i)).await.unwrap();
    }

    let start = Instant::now();
    let processed = db
        .process_sorted_set(
            "z",
            BatchOptions::default()
                .batch_size(2)
                .interval(Duration::from_millis(30)),
            |_| async { anyhow::Ok(()) },
        )
        .await
        .unwrap();
    assert_eq!(processed, 6);
    // 三批之间至少两次休眠
    assert!(start.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_zero_batch_size_rejected() {
    let db = new_db();
    let result = db
        .process_sorted_set("z", BatchOptions::default().batch_size(0), |_| async { anyhow::Ok(()) })
        .await;
    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
}
