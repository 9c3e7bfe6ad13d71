//! End-to-end load scenarios against the in-memory backend.
//!
//! Time-driven tests run on a paused tokio clock, so a five second run takes
//! no wall-clock time and tick counts are exact.

use std::sync::Arc;
use std::time::Duration;

use upsert_loadgen::backend::MemoryBackend;
use upsert_loadgen::config::LoadConfig;
use upsert_loadgen::controller::{LoadController, Phase};
use upsert_loadgen::domain::DEFAULT_UID_BASE;

fn two_client_config() -> LoadConfig {
    LoadConfig {
        client_count: 2,
        uid_count: 200,
        write_interval_seconds: 10,
        value_length: 16,
        report_interval_seconds: 5,
        ..LoadConfig::default()
    }
}

#[tokio::test]
async fn test_five_manual_ticks_report_expected_throughput() {
    let backend = Arc::new(MemoryBackend::new());
    let controller = LoadController::new(&two_client_config(), backend.clone()).unwrap();

    assert_eq!(controller.rates().per_client_qps, 10);
    for _ in 0..5 {
        for client in controller.clients() {
            assert_eq!(client.tick(), 10);
        }
    }
    controller.context().wait_idle().await;

    let report = controller.report();
    assert_eq!(report.write_count, 100);
    assert_eq!(report.qps, 20.0);
    assert_eq!(report.interval_seconds, 5);

    let empty = controller.report();
    assert_eq!(empty.write_count, 0);
    assert_eq!(empty.avg_latency_ms, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_run_writes_into_disjoint_partitions() {
    let backend = Arc::new(MemoryBackend::new());
    let controller = LoadController::new(&two_client_config(), backend.clone()).unwrap();

    controller.start().unwrap();
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    controller.stop();
    controller.join().await;
    controller.context().wait_idle().await;

    // Client ticks at 0s through 5s: six per client.
    let totals = controller.context().stats.totals();
    assert_eq!(totals.write_count, 120);
    assert_eq!(backend.attempts(), 120);

    let keys = backend.keys();
    assert_eq!(keys.len(), 120);
    let client0: Vec<i64> = keys.iter().copied().filter(|k| *k < DEFAULT_UID_BASE + 100).collect();
    let client1: Vec<i64> = keys.iter().copied().filter(|k| *k >= DEFAULT_UID_BASE + 100).collect();
    assert_eq!(client0, (DEFAULT_UID_BASE..DEFAULT_UID_BASE + 60).collect::<Vec<_>>());
    assert_eq!(
        client1,
        (DEFAULT_UID_BASE + 100..DEFAULT_UID_BASE + 160).collect::<Vec<_>>()
    );

    // The 5s report covers the ticks at 0s through 4s. Upserts dispatched by
    // the 5s ticks land after it.
    let last = controller.last_report().expect("report tick fired");
    assert_eq!(last.write_count, 100);
    assert_eq!(last.qps, 20.0);
    assert_eq!(controller.report_history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_dispatch_but_not_in_flight_writes() {
    let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(1_500)));
    let controller = LoadController::new(&two_client_config(), backend.clone()).unwrap();

    controller.start().unwrap();
    tokio::time::sleep(Duration::from_millis(2_700)).await;
    // Ticks at 0s, 1s and 2s dispatched 60 writes; two batches have landed.
    assert_eq!(backend.attempts(), 60);
    assert_eq!(backend.len(), 40);

    controller.stop();
    assert_eq!(controller.phase(), Phase::Stopped);
    controller.context().wait_idle().await;

    assert_eq!(backend.attempts(), 60);
    assert_eq!(backend.len(), 60);
    assert_eq!(controller.context().stats.totals().write_count, 60);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.attempts(), 60);
}

#[tokio::test(start_paused = true)]
async fn test_report_tick_drains_every_interval() {
    let backend = Arc::new(MemoryBackend::new());
    let cfg = LoadConfig {
        report_interval_seconds: 2,
        ..two_client_config()
    };
    let controller = LoadController::new(&cfg, backend).unwrap();

    controller.start().unwrap();
    tokio::time::sleep(Duration::from_millis(6_500)).await;
    controller.stop();
    controller.join().await;
    controller.context().wait_idle().await;

    let statuses = controller.task_statuses();
    let report = statuses.iter().find(|s| s.name == "report").unwrap();
    assert_eq!(report.run_count, 3);
    assert_eq!(statuses.iter().filter(|s| s.name.starts_with("client-")).count(), 2);

    // Reports at 2s, 4s and 6s each cover two client ticks; the 6s tick's
    // writes are still in the counters.
    let history = controller.report_history();
    let reported: Vec<u64> = history.iter().map(|s| s.write_count).collect();
    assert_eq!(reported, vec![40, 40, 40]);
    assert!(history.iter().all(|s| s.qps == 20.0));

    let leftover = controller.context().stats.drain().write_count;
    assert_eq!(leftover, 20);
    let total = controller.context().stats.totals().write_count;
    assert_eq!(total, 140);
    assert_eq!(reported.iter().sum::<u64>() + leftover, total);
}
