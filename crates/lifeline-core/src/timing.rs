//! Opt-in latency sampling for the build and aggregation hot paths.
//!
//! Samples are kept per thread and keyed by a static operation name
//! (`tree.build`, `tier.month`, `nodes.compute`, ...). Collection is off until
//! [`set_timing_enabled`] turns it on; the CLI does so for `--timing` or when
//! `LIFELINE_TIMING` is truthy.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

const TIMING_ENV: &str = "LIFELINE_TIMING";

thread_local! {
    static SAMPLES: RefCell<BTreeMap<&'static str, Vec<Duration>>> =
        const { RefCell::new(BTreeMap::new()) };
}

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Latency summary for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpTiming {
    pub name: String,
    pub count: usize,
    #[serde(rename = "total_us", serialize_with = "as_micros")]
    pub total: Duration,
    #[serde(rename = "p50_us", serialize_with = "as_micros")]
    pub p50: Duration,
    #[serde(rename = "p95_us", serialize_with = "as_micros")]
    pub p95: Duration,
    #[serde(rename = "p99_us", serialize_with = "as_micros")]
    pub p99: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimingReport {
    pub operations: Vec<OpTiming>,
}

/// True when `LIFELINE_TIMING` is `1`, `true`, `yes` or `on`.
#[must_use]
pub fn timing_enabled_from_env() -> bool {
    std::env::var(TIMING_ENV).is_ok_and(|value| is_truthy(&value))
}

/// Turn collection on or off. Turning it off drops this thread's samples.
pub fn set_timing_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        clear_timings();
    }
}

#[must_use]
pub fn is_timing_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn clear_timings() {
    SAMPLES.with(|samples| samples.borrow_mut().clear());
}

/// Run `f`, recording its wall time under `name` when collection is on.
pub fn timed<R>(name: &'static str, f: impl FnOnce() -> R) -> R {
    if !is_timing_enabled() {
        return f();
    }
    let started = Instant::now();
    let result = f();
    record(name, started.elapsed());
    result
}

fn record(name: &'static str, elapsed: Duration) {
    SAMPLES.with(|samples| samples.borrow_mut().entry(name).or_default().push(elapsed));
}

/// Drain this thread's samples into a report ordered by operation name.
#[must_use]
pub fn collect_report() -> TimingReport {
    let drained = SAMPLES.with(|samples| std::mem::take(&mut *samples.borrow_mut()));
    let operations = drained
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            OpTiming {
                name: name.to_string(),
                count: values.len(),
                total: values.iter().sum(),
                p50: percentile(&values, 50),
                p95: percentile(&values, 95),
                p99: percentile(&values, 99),
            }
        })
        .collect();
    TimingReport { operations }
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Fixed-width table for terminal output.
    #[must_use]
    pub fn display_table(&self) -> String {
        if self.is_empty() {
            return "no timing samples recorded".to_string();
        }
        let mut out = format!(
            "{:<24} {:>6} {:>10} {:>9} {:>9} {:>9}\n",
            "operation", "count", "total", "p50", "p95", "p99"
        );
        out.push_str(&"-".repeat(72));
        out.push('\n');
        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<24} {:>6} {:>10} {:>9} {:>9} {:>9}",
                op.name,
                op.count,
                human(op.total),
                human(op.p50),
                human(op.p95),
                human(op.p99)
            );
        }
        out
    }
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct.min(100) * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn human(duration: Duration) -> String {
    let micros = duration.as_micros();
    match micros {
        0..1_000 => format!("{micros}µs"),
        1_000..1_000_000 => format!("{:.2}ms", duration.as_secs_f64() * 1e3),
        _ => format!("{:.3}s", duration.as_secs_f64()),
    }
}

fn as_micros<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(duration.as_micros())
}

fn is_truthy(value: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|t| value.trim().eq_ignore_ascii_case(t))
}
