//! Standalone benchmark for the metrics scoped-timer overhead requirement
//! (P11: mean added time per scope must be < 0.1ms over 1000 calls).
//!
//! Run directly (`cargo run --bin voxcore-latency-harness`) to get a
//! pass/fail report without going through the full `cargo test` harness.

use std::time::{Duration, Instant};

use serde::Serialize;
use voxcore::metrics::MetricsCollector;

const SAMPLES: usize = 1_000;
const OVERHEAD_BUDGET: Duration = Duration::from_micros(100);

#[derive(Serialize)]
struct LatencyReport {
    samples: usize,
    total_elapsed_us: u128,
    mean_overhead_us: f64,
    budget_us: u128,
    within_budget: bool,
}

fn main() {
    let report = run();

    let json = serde_json::to_string_pretty(&report).expect("report serializes");
    println!("{json}");

    if !report.within_budget {
        eprintln!(
            "voxcore-latency-harness: mean overhead {:.3}us exceeds the {}us budget (P11)",
            report.mean_overhead_us, report.budget_us
        );
        std::process::exit(1);
    }
}

fn run() -> LatencyReport {
    let metrics = MetricsCollector::new();

    // Warm up: first calls allocate the stage's hashmap entry.
    for _ in 0..10 {
        let _timer = metrics.timer("bench");
    }

    let start = Instant::now();
    for _ in 0..SAMPLES {
        let _timer = metrics.timer("bench");
    }
    let elapsed = start.elapsed();

    let mean_overhead_us = elapsed.as_micros() as f64 / SAMPLES as f64;

    LatencyReport {
        samples: SAMPLES,
        total_elapsed_us: elapsed.as_micros(),
        mean_overhead_us,
        budget_us: OVERHEAD_BUDGET.as_micros(),
        within_budget: mean_overhead_us < OVERHEAD_BUDGET.as_micros() as f64,
    }
}
