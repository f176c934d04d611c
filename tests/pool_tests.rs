//! Pool behaviour under real workflow load: sharing across runs,
//! bound enforcement, shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use runa::{Engine, EngineConfig, RunaError, TaskRegistry, Workflow};

fn workflow(value: serde_json::Value) -> Workflow {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn pool_is_shared_across_sequential_runs() {
    let engine = Engine::with_builtins().await.unwrap();
    let wf = workflow(json!({
        "tasks": [ { "id": "a", "type": "emit", "config": { "bytes": [1] } } ]
    }));

    for _ in 0..3 {
        let results = engine.execute(&wf).unwrap().collect_results().await.unwrap();
        assert_eq!(results.len(), 1);
    }

    // Runners outlive individual workflows; the pool holds its floor.
    let stats = engine.pool().stats();
    assert_eq!(stats.size, stats.min);
    assert_eq!(stats.idle, stats.size);

    engine.shutdown();
}

#[tokio::test]
async fn concurrent_runs_share_the_bound() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let registry = TaskRegistry::new();
    {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        registry.register_fn("tracked", move |_| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![0])
        });
    }
    let config = EngineConfig {
        pool_min: 1,
        pool_max: 2,
        ..Default::default()
    };
    let engine = Arc::new(Engine::new(config, registry).await.unwrap());

    let wf = || {
        workflow(json!({
            "tasks": [
                { "id": "x1", "type": "tracked" },
                { "id": "x2", "type": "tracked" },
                { "id": "x3", "type": "tracked" }
            ]
        }))
    };

    let first = {
        let engine = Arc::clone(&engine);
        let wf = wf();
        tokio::spawn(async move { engine.execute(&wf).unwrap().collect_results().await })
    };
    let second = {
        let engine = Arc::clone(&engine);
        let wf = wf();
        tokio::spawn(async move { engine.execute(&wf).unwrap().collect_results().await })
    };

    assert_eq!(first.await.unwrap().unwrap().len(), 3);
    assert_eq!(second.await.unwrap().unwrap().len(), 3);
    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "two workflows still respect the shared ceiling"
    );

    engine.shutdown();
}

#[tokio::test]
async fn shutdown_mid_run_surfaces_pool_terminated() {
    let registry = TaskRegistry::new();
    registry.register_fn("slow", |ctx| {
        for _ in 0..100 {
            if ctx.is_cancelled() {
                return Err("aborted".to_string());
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(vec![0])
    });
    let config = EngineConfig {
        pool_min: 1,
        pool_max: 1,
        ..Default::default()
    };
    let engine = Engine::new(config, registry).await.unwrap();

    // Two independent slow tasks on a one-runner pool: the second queues
    // behind the first, then the pool dies under it.
    let wf = workflow(json!({
        "tasks": [
            { "id": "s1", "type": "slow" },
            { "id": "s2", "type": "slow" }
        ]
    }));

    let stream = engine.execute(&wf).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.shutdown();

    let err = stream.collect_results().await.unwrap_err();
    assert!(
        matches!(err, RunaError::PoolTerminated)
            || matches!(err, RunaError::TaskExecution { .. })
            || matches!(err, RunaError::RunnerUnresponsive { .. }),
        "run fails once the pool is gone, got {err:?}"
    );
}
