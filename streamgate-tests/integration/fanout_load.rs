//! Integration tests for the fan-out pool under concurrent request load.
//!
//! Many requests share one bounded pool. These tests verify the
//! anti-starvation contract: every fan-out round resolves every one of its
//! tasks, saturation degrades requests individually instead of wedging the
//! pool, and throughput recovers once load passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use streamgate_core::config::FanOutConfig;
use streamgate_core::fanout::{FanOutExecutor, TaskError, TaskOutcome, UpstreamTask};
use streamgate_core::upstream::Entitlement;

fn quick_task(name: &str, counter: Arc<AtomicUsize>) -> UpstreamTask {
    UpstreamTask::new(name, Duration::from_secs(1), move || {
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(TaskOutcome::Entitlement(Entitlement {
                allowed: true,
                reason: None,
            }))
        }
        .boxed()
    })
}

#[tokio::test]
async fn test_concurrent_rounds_each_resolve_all_tasks() {
    let executor = FanOutExecutor::new(&FanOutConfig {
        workers: 4,
        queue_capacity: 64,
        task_timeout: Duration::from_secs(1),
        request_deadline: Duration::from_secs(5),
    });
    let handle = executor.handle();
    let completed = Arc::new(AtomicUsize::new(0));

    let rounds: Vec<_> = (0..20)
        .map(|_| {
            let handle = handle.clone();
            let completed = Arc::clone(&completed);
            tokio::spawn(async move {
                let tasks = vec![
                    quick_task("content", Arc::clone(&completed)),
                    quick_task("entitlement", completed),
                ];
                handle.run_all(tasks, Duration::from_secs(5)).await
            })
        })
        .collect();

    for round in rounds {
        let results = round.await.unwrap();
        assert_eq!(results.len(), 2, "every round resolves both tasks");
        assert!(results.contains_key("content"));
        assert!(results.contains_key("entitlement"));
    }

    // 20 rounds x 2 tasks, none silently dropped.
    assert_eq!(completed.load(Ordering::SeqCst), 40);

    executor.shutdown().await;
}

#[tokio::test]
async fn test_overload_rejects_some_rounds_but_wedges_none() {
    // Tiny pool, long tasks: most submissions must be rejected fast, and
    // every round still gets a complete result map.
    let executor = FanOutExecutor::new(&FanOutConfig {
        workers: 1,
        queue_capacity: 2,
        task_timeout: Duration::from_millis(500),
        request_deadline: Duration::from_secs(5),
    });
    let handle = executor.handle();

    let slow_task = || {
        UpstreamTask::new("content", Duration::from_millis(500), || {
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(TaskOutcome::Entitlement(Entitlement {
                    allowed: true,
                    reason: None,
                }))
            }
            .boxed()
        })
    };

    let started = std::time::Instant::now();
    let rounds: Vec<_> = (0..30)
        .map(|_| {
            let handle = handle.clone();
            let task = slow_task();
            tokio::spawn(async move { handle.run_all(vec![task], Duration::from_secs(3)).await })
        })
        .collect();

    let mut rejected = 0;
    let mut served = 0;
    for round in rounds {
        let results = round.await.unwrap();
        assert_eq!(results.len(), 1);
        match &results["content"] {
            Ok(_) => served += 1,
            Err(TaskError::Rejected) => rejected += 1,
            Err(other) => panic!("unexpected error under overload: {other:?}"),
        }
    }

    assert!(served >= 1, "the pool must keep serving under overload");
    assert!(rejected >= 1, "overload must shed load by rejecting");
    assert_eq!(served + rejected, 30);
    // Rejections are immediate; the whole burst resolves in bounded time.
    assert!(started.elapsed() < Duration::from_secs(10));

    // The pool recovers: a fresh round after the burst completes cleanly.
    let results = handle
        .run_all(vec![slow_task()], Duration::from_secs(3))
        .await;
    assert!(results["content"].is_ok());

    executor.shutdown().await;
}

#[tokio::test]
async fn test_mixed_outcome_round_keeps_failures_local() {
    let executor = FanOutExecutor::new(&FanOutConfig {
        workers: 4,
        queue_capacity: 16,
        task_timeout: Duration::from_millis(100),
        request_deadline: Duration::from_secs(5),
    });
    let handle = executor.handle();

    let ok = UpstreamTask::new("ok", Duration::from_secs(1), || {
        async {
            Ok(TaskOutcome::Entitlement(Entitlement {
                allowed: true,
                reason: None,
            }))
        }
        .boxed()
    });
    let timing_out = UpstreamTask::new("timing_out", Duration::from_millis(50), || {
        async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(TaskOutcome::Entitlement(Entitlement {
                allowed: true,
                reason: None,
            }))
        }
        .boxed()
    });
    let panicking = UpstreamTask::new("panicking", Duration::from_secs(1), || {
        async { panic!("upstream adapter bug") }.boxed()
    });
    let failing = UpstreamTask::new("failing", Duration::from_secs(1), || {
        async {
            Err(TaskError::Transport {
                reason: "connection reset".to_string(),
            })
        }
        .boxed()
    });

    let results = handle
        .run_all(
            vec![ok, timing_out, panicking, failing],
            Duration::from_secs(3),
        )
        .await;

    assert_eq!(results.len(), 4);
    assert!(results["ok"].is_ok());
    assert_eq!(results["timing_out"], Err(TaskError::Timeout));
    assert!(matches!(
        results["panicking"],
        Err(TaskError::Transport { .. })
    ));
    assert!(matches!(results["failing"], Err(TaskError::Transport { .. })));

    executor.shutdown().await;
}
