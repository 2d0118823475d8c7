use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};

use crate::percentile::{REPORTED_PERCENTILES, interpolate_percentile};
use crate::resources::{ResourceSample, ResourceSummary, summarize_resources};

/// Failure classification for a single transaction.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    ProtocolError,
    Other,
}

/// Statistics for one load run.
///
/// Created fresh by [`crate::MetricsAggregator::new`] and only mutated through the aggregator.
/// The value returned by [`crate::MetricsAggregator::finalize`] carries `ended_at`.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub connection_errors: u64,

    /// Launches skipped because the in-flight cap was saturated. Not part of `total`.
    pub dropped: u64,

    /// Sessions cancelled after the drain grace period. Part of `total`.
    pub abandoned: u64,

    /// Body bytes of successful transactions.
    pub bytes_sent: u64,

    pub started_at: SystemTime,
    pub ended_at: Option<SystemTime>,

    /// One entry per successful transaction, in completion order.
    pub latencies: Vec<Duration>,
    pub error_counts: BTreeMap<ErrorCategory, u64>,
    pub resource_samples: Vec<ResourceSample>,

    started: Instant,
    elapsed: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub stdev: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub p99_9: Duration,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            connection_errors: 0,
            dropped: 0,
            abandoned: 0,
            bytes_sent: 0,
            started_at: SystemTime::now(),
            ended_at: None,
            latencies: Vec::new(),
            error_counts: BTreeMap::new(),
            resource_samples: Vec::new(),
            started: Instant::now(),
            elapsed: None,
        }
    }

    pub(crate) fn finish(&mut self) {
        if self.ended_at.is_some() {
            return;
        }
        self.elapsed = Some(self.started.elapsed());
        self.ended_at = Some(SystemTime::now());
    }

    /// Attach the resource samples collected alongside the run.
    #[must_use]
    pub fn with_resource_samples(mut self, samples: Vec<ResourceSample>) -> Self {
        self.resource_samples = samples;
        self
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }

    /// True when every started attempt has an outcome (success, failure, or abandonment).
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.total
            == self
                .succeeded
                .saturating_add(self.failed)
                .saturating_add(self.abandoned)
    }

    /// Wall-clock run duration; zero until finalized.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.elapsed.unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.duration().as_secs_f64()
    }

    /// Successful transactions per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = self.duration_secs();
        if secs <= 0.0 {
            return 0.0;
        }
        self.succeeded as f64 / secs
    }

    /// Share of started attempts that succeeded, in percent.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }

    #[must_use]
    pub fn percentile(&self, p: f64) -> Duration {
        secs_to_duration(interpolate_percentile(&self.sorted_latency_secs(), p))
    }

    #[must_use]
    pub fn latency_summary(&self) -> Option<LatencySummary> {
        let sorted = self.sorted_latency_secs();
        let n = sorted.len();
        let (&min, &max) = (sorted.first()?, sorted.last()?);

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let stdev = if n < 2 {
            0.0
        } else {
            let m2: f64 = sorted.iter().map(|x| (x - mean) * (x - mean)).sum();
            (m2 / (n as f64 - 1.0)).sqrt()
        };

        let [p50, p90, p95, p99, p99_9] =
            REPORTED_PERCENTILES.map(|p| secs_to_duration(interpolate_percentile(&sorted, p)));

        Some(LatencySummary {
            count: n as u64,
            min: secs_to_duration(min),
            max: secs_to_duration(max),
            mean: secs_to_duration(mean),
            stdev: secs_to_duration(stdev),
            p50,
            p90,
            p95,
            p99,
            p99_9,
        })
    }

    #[must_use]
    pub fn resource_summary(&self) -> BTreeMap<String, ResourceSummary> {
        summarize_resources(&self.resource_samples)
    }

    #[must_use]
    pub fn error_count(&self, category: ErrorCategory) -> u64 {
        self.error_counts.get(&category).copied().unwrap_or(0)
    }

    fn sorted_latency_secs(&self) -> Vec<f64> {
        let mut secs: Vec<f64> = self.latencies.iter().map(Duration::as_secs_f64).collect();
        secs.sort_by(f64::total_cmp);
        secs
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfinalized_run_has_zero_duration_and_throughput() {
        let mut m = RunMetrics::new();
        m.succeeded = 5;
        assert!(!m.is_finalized());
        assert_eq!(m.duration(), Duration::ZERO);
        assert_eq!(m.throughput(), 0.0);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut m = RunMetrics::new();
        m.finish();
        let first = m.ended_at;
        m.finish();
        assert_eq!(m.ended_at, first);
        assert!(m.is_finalized());
    }

    #[test]
    fn percentile_sorts_a_copy() {
        let mut m = RunMetrics::new();
        m.latencies = vec![
            Duration::from_millis(40),
            Duration::from_millis(10),
            Duration::from_millis(30),
            Duration::from_millis(20),
        ];

        let p50 = m.percentile(50.0).as_secs_f64();
        assert!((p50 - 0.025).abs() < 1e-9, "p50={p50}");
        assert_eq!(m.latencies[0], Duration::from_millis(40));
    }

    #[test]
    fn latency_summary_covers_reported_percentiles() {
        let mut m = RunMetrics::new();
        assert!(m.latency_summary().is_none());

        m.latencies = (1..=100).map(Duration::from_millis).collect();
        let Some(s) = m.latency_summary() else {
            panic!("expected a summary");
        };
        assert_eq!(s.count, 100);
        assert_eq!(s.min, Duration::from_millis(1));
        assert_eq!(s.max, Duration::from_millis(100));
        assert!((s.mean.as_secs_f64() - 0.0505).abs() < 1e-6);
        assert!(s.p50 <= s.p90 && s.p90 <= s.p95 && s.p95 <= s.p99 && s.p99 <= s.p99_9);
        assert!(s.p99_9 <= s.max);
    }

    #[test]
    fn success_rate_and_drain_invariant() {
        let mut m = RunMetrics::new();
        assert_eq!(m.success_rate(), 0.0);

        m.total = 4;
        m.succeeded = 3;
        m.failed = 1;
        assert!(m.is_drained());
        assert!((m.success_rate() - 75.0).abs() < 1e-9);

        m.total = 5;
        assert!(!m.is_drained());
        m.abandoned = 1;
        assert!(m.is_drained());
    }

    #[test]
    fn error_category_names_are_snake_case() {
        assert_eq!(ErrorCategory::ConnectionRefused.to_string(), "connection_refused");
        assert_eq!(
            "protocol_error".parse::<ErrorCategory>(),
            Ok(ErrorCategory::ProtocolError)
        );
    }
}
