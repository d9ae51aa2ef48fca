//! Metrics Collector (C12): per-stage counters and latency histograms,
//! plus system-level request totals, with a periodic structured-log
//! summary. Overhead target: < 0.1ms per scoped timer call (P11); see
//! `voxcore-latency-harness` for the measured benchmark.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Rolling window size for p95 calculations, per stage and for end-to-end.
const ROLLING_WINDOW: usize = 100;

#[derive(Debug, Clone, Default)]
struct PerStageStats {
    calls: u64,
    successes: u64,
    errors: u64,
    total_ms: u64,
    min_ms: u64,
    max_ms: u64,
    recent: VecDeque<u64>,
}

impl PerStageStats {
    fn record(&mut self, ms: u64, success: bool) {
        self.calls += 1;
        if success {
            self.successes += 1;
        } else {
            self.errors += 1;
        }
        self.total_ms += ms;
        self.min_ms = if self.calls == 1 { ms } else { self.min_ms.min(ms) };
        self.max_ms = self.max_ms.max(ms);
        self.recent.push_back(ms);
        if self.recent.len() > ROLLING_WINDOW {
            self.recent.pop_front();
        }
    }

    fn p95(&self) -> u64 {
        rolling_p95(&self.recent)
    }
}

fn rolling_p95(samples: &VecDeque<u64>) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
    sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
}

/// Point-in-time snapshot of one stage's stats, for `get_metrics()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSnapshot {
    pub stage: String,
    pub calls: u64,
    pub successes: u64,
    pub errors: u64,
    pub total_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p95_ms: u64,
}

/// Point-in-time snapshot of the whole collector, for `get_metrics()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_s: u64,
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub e2e_p95_ms: u64,
    pub stages: Vec<StageSnapshot>,
}

/// Per-stage counters and latency histograms, plus system-level request
/// totals. Shared via `Arc` so scoped timers can outlive the call that
/// created them. Internals use a plain [`std::sync::Mutex`], never held
/// across an `.await`, to keep `timer()` overhead to an uncontended lock
/// plus a hashmap entry update (P11).
pub struct MetricsCollector {
    started_at: Instant,
    stages: Mutex<HashMap<String, PerStageStats>>,
    total_requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    e2e_recent: Mutex<VecDeque<u64>>,
}

impl MetricsCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started_at: Instant::now(),
            stages: Mutex::new(HashMap::new()),
            total_requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            e2e_recent: Mutex::new(VecDeque::new()),
        })
    }

    /// A scoped timer for one stage invocation. Records on drop unless
    /// `mark_failure()` was called, in which case it records as an error.
    pub fn timer(self: &Arc<Self>, stage: impl Into<String>) -> ScopedTimer {
        ScopedTimer {
            collector: Arc::clone(self),
            stage: stage.into(),
            start: Instant::now(),
            failed: AtomicBool::new(false),
        }
    }

    fn record_stage(&self, stage: &str, elapsed: Duration, success: bool) {
        let mut stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        stages
            .entry(stage.to_string())
            .or_default()
            .record(elapsed.as_millis() as u64, success);
    }

    /// Record one end-to-end pipeline request (§4.9 "record an overall
    /// request timer").
    pub fn record_request(&self, success: bool, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let mut recent = self.e2e_recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.push_back(elapsed.as_millis() as u64);
        if recent.len() > ROLLING_WINDOW {
            recent.pop_front();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        let mut stage_snapshots: Vec<StageSnapshot> = stages
            .iter()
            .map(|(name, stats)| StageSnapshot {
                stage: name.clone(),
                calls: stats.calls,
                successes: stats.successes,
                errors: stats.errors,
                total_ms: stats.total_ms,
                min_ms: stats.min_ms,
                max_ms: stats.max_ms,
                p95_ms: stats.p95(),
            })
            .collect();
        stage_snapshots.sort_by(|a, b| a.stage.cmp(&b.stage));
        drop(stages);

        let e2e_recent = self.e2e_recent.lock().unwrap_or_else(|e| e.into_inner());
        MetricsSnapshot {
            uptime_s: self.started_at.elapsed().as_secs(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            e2e_p95_ms: rolling_p95(&e2e_recent),
            stages: stage_snapshots,
        }
    }

    /// Periodic structured-log summary, run as a background task until
    /// `cancel` fires.
    pub async fn run_periodic_summary(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.snapshot();
                    info!(
                        uptime_s = snapshot.uptime_s,
                        total_requests = snapshot.total_requests,
                        successes = snapshot.successes,
                        failures = snapshot.failures,
                        e2e_p95_ms = snapshot.e2e_p95_ms,
                        "metrics summary"
                    );
                }
            }
        }
    }
}

/// RAII scoped timer returned by [`MetricsCollector::timer`].
pub struct ScopedTimer {
    collector: Arc<MetricsCollector>,
    stage: String,
    start: Instant,
    failed: AtomicBool,
}

impl ScopedTimer {
    /// Mark this invocation as failed; recorded as an error on drop.
    pub fn mark_failure(&self) {
        self.failed.store(true, Ordering::Relaxed);
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let success = !self.failed.load(Ordering::Relaxed);
        self.collector.record_stage(&self.stage, elapsed, success);
    }
}
