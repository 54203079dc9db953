//! End-to-end sampler tests against fake cgroup trees.
//!
//! Run with `cargo test -p readiness-infra --test cpu_stats_test`.

use readiness_core::CpuCapacity;
use readiness_infra::capacity::{CgroupProbe, CpuStats, ProbeKind, SampleListener};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const TICK: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(5);

fn cgroup_v2(cpu_max: &str) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("cgroup.controllers"), "cpu memory pids\n").unwrap();
    std::fs::write(dir.path().join("cpu.max"), cpu_max).unwrap();
    write_usage(dir.path(), 0);
    dir
}

fn write_usage(root: &Path, usage_usec: u64) {
    std::fs::write(
        root.join("cpu.stat"),
        format!("usage_usec {usage_usec}\nuser_usec 0\nsystem_usec 0\n"),
    )
    .unwrap();
}

async fn next_sample(rx: &mut mpsc::UnboundedReceiver<f64>) -> f64 {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a sample")
        .expect("listener channel closed")
}

#[tokio::test]
async fn test_cgroup_sampler_starts_fully_idle() {
    let root = cgroup_v2("250000 100000\n");
    let stats = CpuStats::new(root.path(), Duration::from_secs(60));

    assert_eq!(stats.probe_kind(), ProbeKind::CgroupAware);
    assert!(!stats.is_degraded());
    // Bounded by the host's logical CPU count, so at most 2.5.
    assert!(stats.num_cpus() > 0.0 && stats.num_cpus() <= 2.5);
    assert_eq!(stats.idle_cpus(), stats.num_cpus());
    stats.stop();
}

#[tokio::test]
async fn test_readings_stay_within_bounds_under_load() {
    let root = cgroup_v2("200000 100000\n");
    let probe = CgroupProbe::open(root.path(), 8.0).unwrap();

    // Every tick the listener bumps usage by far more than the quota allows.
    let usage = Arc::new(AtomicU64::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener: SampleListener = {
        let usage = usage.clone();
        let root = root.path().to_path_buf();
        Box::new(move |idle| {
            let next = usage.fetch_add(10_000_000, Ordering::SeqCst) + 10_000_000;
            write_usage(&root, next);
            let _ = tx.send(idle);
        })
    };
    let stats = CpuStats::start(Box::new(probe), TICK, Some(listener));

    // First tick primes the counter.
    assert_eq!(next_sample(&mut rx).await, 2.0);
    for _ in 0..3 {
        let idle = next_sample(&mut rx).await;
        assert!((0.0..=stats.num_cpus()).contains(&idle));
        assert_eq!(idle, 0.0);
    }
    stats.stop();
}

#[tokio::test]
async fn test_value_pinned_after_accounting_disappears() {
    let root = cgroup_v2("400000 100000\n");
    let probe = CgroupProbe::open(root.path(), 8.0).unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener: SampleListener = {
        let ticks = ticks.clone();
        let root = root.path().to_path_buf();
        Box::new(move |idle| {
            let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if tick == 3 {
                std::fs::remove_file(root.join("cpu.stat")).unwrap();
            } else {
                write_usage(&root, tick as u64 * 1_000);
            }
            let _ = tx.send(idle);
        })
    };
    let stats = CpuStats::start(Box::new(probe), TICK, Some(listener));

    next_sample(&mut rx).await;
    next_sample(&mut rx).await;
    let third = next_sample(&mut rx).await;

    // Several failing ticks later the third reading is still published.
    tokio::time::sleep(TICK * 6).await;
    assert_eq!(stats.idle_cpus(), third);
    assert!(rx.try_recv().is_err());
    assert_eq!(ticks.load(Ordering::SeqCst), 3);

    stats.stop();
    assert_eq!(stats.idle_cpus(), third);
}

#[tokio::test]
async fn test_missing_accounting_degrades_to_logical_cpus() {
    let root = TempDir::new().unwrap();
    let stats = CpuStats::new(root.path(), TICK);
    let logical = readiness_infra::capacity::logical_cpu_count();

    assert!(stats.is_degraded());
    assert_eq!(stats.num_cpus(), logical);

    for _ in 0..4 {
        tokio::time::sleep(TICK).await;
        assert_eq!(stats.idle_cpus(), logical);
        assert_eq!(stats.cpu_load(), 0.0);
    }
    stats.stop();
}
