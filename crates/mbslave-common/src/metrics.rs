//! Dispatch metrics collected by the serialization engine.
//!
//! A ring buffer of dispatch latencies plus plain counters. Only the engine
//! thread records into it; readers take a [`DispatchStats`] snapshot.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Number of latency samples retained by default.
pub const DEFAULT_HISTOGRAM_SIZE: usize = 1024;

/// Per-request dispatch metrics with a ring buffer for latency tracking.
#[derive(Debug)]
pub struct DispatchMetrics {
    /// Ring buffer of dispatch durations in nanoseconds.
    samples: Box<[u64]>,
    /// Current write position in the ring buffer.
    write_pos: usize,
    /// Number of samples collected (saturates at buffer size).
    sample_count: usize,
    /// Total requests dispatched.
    total_requests: u64,
    /// Minimum observed dispatch time in nanoseconds.
    min_ns: u64,
    /// Maximum observed dispatch time in nanoseconds.
    max_ns: u64,
    /// Sum of all dispatch times for mean calculation.
    sum_ns: u64,
    /// Exception responses keyed by exception code.
    exceptions: BTreeMap<u8, u64>,
    /// Responses that could not be written back to their connection.
    write_failures: u64,
    /// Trace lines dropped because the trace sink was full.
    dropped_traces: u64,
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_HISTOGRAM_SIZE)
    }
}

impl DispatchMetrics {
    /// Create a new metrics collector retaining `histogram_size` latency samples.
    #[must_use]
    pub fn new(histogram_size: usize) -> Self {
        let size = histogram_size.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total_requests: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
            exceptions: BTreeMap::new(),
            write_failures: 0,
            dropped_traces: 0,
        }
    }

    /// Record one dispatched request.
    ///
    /// `exception` is the exception code carried by the response, if any.
    pub fn record(&mut self, duration: Duration, exception: Option<u8>) {
        let ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);

        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = self.sample_count.saturating_add(1).min(self.samples.len());

        self.total_requests += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns = self.sum_ns.wrapping_add(ns);

        if let Some(code) = exception {
            *self.exceptions.entry(code).or_insert(0) += 1;
        }
    }

    /// Record a response that could not be written.
    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    /// Record a trace line dropped on a full sink.
    pub fn record_dropped_trace(&mut self) {
        self.dropped_traces += 1;
    }

    /// Get total number of dispatched requests.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    /// Get minimum observed dispatch time.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.total_requests > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Get maximum observed dispatch time.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.total_requests > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Get mean dispatch time.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        (self.total_requests > 0).then(|| Duration::from_nanos(self.sum_ns / self.total_requests))
    }

    /// Compute a percentile from the ring buffer.
    ///
    /// Returns `None` if no samples have been collected or if `percentile`
    /// is outside 0.0..=100.0.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 || !(0.0..=100.0).contains(&percentile) {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        let idx = idx.min(sorted.len() - 1);

        Some(Duration::from_nanos(sorted[idx]))
    }

    /// Get a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            total_requests: self.total_requests,
            exception_responses: self.exceptions.values().sum(),
            exceptions_by_code: self.exceptions.clone(),
            write_failures: self.write_failures,
            dropped_traces: self.dropped_traces,
            min_ns: self.min().map(as_nanos),
            max_ns: self.max().map(as_nanos),
            mean_ns: self.mean().map(as_nanos),
            p99_ns: self.percentile(99.0).map(as_nanos),
            sample_count: self.sample_count,
        }
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Immutable snapshot of dispatch metrics for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Requests dispatched since start.
    pub total_requests: u64,
    /// Responses that carried an exception.
    pub exception_responses: u64,
    /// Exception responses keyed by exception code.
    pub exceptions_by_code: BTreeMap<u8, u64>,
    /// Responses that could not be written back.
    pub write_failures: u64,
    /// Trace lines dropped on a full sink.
    pub dropped_traces: u64,
    /// Fastest dispatch in nanoseconds.
    pub min_ns: Option<u64>,
    /// Slowest dispatch in nanoseconds.
    pub max_ns: Option<u64>,
    /// Mean dispatch time in nanoseconds.
    pub mean_ns: Option<u64>,
    /// 99th percentile over the retained samples, in nanoseconds.
    pub p99_ns: Option<u64>,
    /// Number of samples in the histogram.
    pub sample_count: usize,
}
