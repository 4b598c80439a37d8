//! Metrics for the reconciliation loop
//!
//! OpenTelemetry instruments, exported only when telemetry is configured
//! with an OTLP endpoint:
//! - Cycle duration and outcome
//! - Job submissions by result
//! - Admission gate closures
//! - Files per state in the last cycle

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for controller metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("kube-promec"));

/// Histogram of reconciliation cycle duration
///
/// Labels:
/// - `result`: success, error
pub static CYCLE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("promec_cycle_duration_seconds")
        .with_description("Duration of reconciliation cycles in seconds")
        .with_unit("s")
        .build()
});

/// Counter of reconciliation cycles
///
/// Labels:
/// - `result`: success, error
pub static CYCLES_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("promec_cycles_total")
        .with_description("Total number of reconciliation cycles")
        .with_unit("{cycles}")
        .build()
});

/// Counter of job create calls
///
/// Labels:
/// - `result`: created, already_exists, error
pub static JOB_SUBMISSIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("promec_job_submissions_total")
        .with_description("Total number of job create calls")
        .with_unit("{jobs}")
        .build()
});

/// Counter of cycles skipped because a managed pod was pending
pub static GATE_CLOSED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("promec_admission_gate_closed_total")
        .with_description("Cycles in which submissions were suppressed by a pending pod")
        .with_unit("{cycles}")
        .build()
});

/// Gauge of files seen in the last cycle
///
/// Labels:
/// - `state`: source, processed, unprocessed, claimed
pub static FILES: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("promec_files")
        .with_description("Files observed in the last cycle by state")
        .with_unit("{files}")
        .build()
});

/// Outcome label for a cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleResult {
    /// Cycle completed
    Success,
    /// Cycle aborted by an error
    Error,
}

impl CycleResult {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleResult::Success => "success",
            CycleResult::Error => "error",
        }
    }
}

/// Times one reconciliation cycle
pub struct CycleTimer {
    start: std::time::Instant,
}

impl CycleTimer {
    /// Start timing a cycle
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record the cycle's duration and result
    pub fn finish(self, result: CycleResult) {
        let duration = self.start.elapsed().as_secs_f64();
        let labels = [KeyValue::new("result", result.as_str())];
        CYCLE_DURATION.record(duration, &labels);
        CYCLES_TOTAL.add(1, &labels);
    }
}

/// Record one job create call
pub fn record_submission(result: &'static str) {
    JOB_SUBMISSIONS.add(1, &[KeyValue::new("result", result)]);
}

/// Record a cycle in which the admission gate was closed
pub fn record_gate_closed() {
    GATE_CLOSED.add(1, &[]);
}

/// Update the file gauge for one state
pub fn set_file_count(state: &'static str, count: usize) {
    FILES.record(
        i64::try_from(count).unwrap_or(i64::MAX),
        &[KeyValue::new("state", state)],
    );
}
