/// Connection Pool Concurrency Tests
///
/// The pool must stay within max_pool_size under concurrent acquire/release.
mod common;

use common::{counting_provider, test_config, FakeConnector};
use rdspool::db::ConnectionPool;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_never_exceeds_max_size_under_contention() {
    let mut config = test_config(4, 1);
    config.pool.acquire_timeout_ms = 5_000;
    let (provider, calls) = counting_provider();
    let connector = FakeConnector::default();
    connector.db.connect_delay_ms.store(2, Ordering::SeqCst);

    let pool = ConnectionPool::connect(
        config.db.clone(),
        config.pool.clone(),
        connector.clone(),
        provider,
    )
    .await
    .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let peak_active = Arc::new(AtomicUsize::new(0));

    // Sample metrics while the workers run
    let monitor = {
        let pool = Arc::clone(&pool);
        let stop = Arc::clone(&stop);
        let peak_active = Arc::clone(&peak_active);
        tokio::spawn(async move {
            while !stop.load(Ordering::SeqCst) {
                let metrics = pool.metrics();
                assert!(metrics.active <= 4, "active {} > max", metrics.active);
                assert!(metrics.total <= 4, "total {} > max", metrics.total);
                assert!(metrics.active + metrics.idle <= 4);
                peak_active.fetch_max(metrics.active, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        })
    };

    let mut tasks = Vec::new();
    for i in 0..64 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let conn = pool.acquire().await?;
                tokio::time::sleep(Duration::from_millis(1 + (i % 3) as u64)).await;
                pool.release(conn);
            }
            Ok::<_, rdspool::RdsPoolError>(())
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    stop.store(true, Ordering::SeqCst);
    monitor.await.unwrap();

    assert_eq!(successes, 64);
    assert!(connector.opened() <= 4, "opened {}", connector.opened());
    assert_eq!(calls.load(Ordering::SeqCst), connector.opened());
    assert!(peak_active.load(Ordering::SeqCst) <= 4);

    let metrics = pool.metrics();
    assert_eq!(metrics.active, 0);
    assert_eq!(metrics.idle, connector.opened());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_waiters_all_time_out_when_pool_is_held() {
    let mut config = test_config(2, 0);
    config.pool.acquire_timeout_ms = 100;
    let (provider, _calls) = counting_provider();

    let pool = ConnectionPool::connect(
        config.db.clone(),
        config.pool.clone(),
        FakeConnector::default(),
        provider,
    )
    .await
    .unwrap();

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();

    let mut waiters = Vec::new();
    for _ in 0..8 {
        let pool = Arc::clone(&pool);
        waiters.push(tokio::spawn(async move { pool.acquire().await.map(|c| c.id) }));
    }

    for waiter in waiters {
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(rdspool::RdsPoolError::PoolExhausted(_))));
    }

    assert_eq!(pool.metrics().total, 2);
    pool.release(a);
    pool.release(b);
}
