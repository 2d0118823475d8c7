use std::time::Duration;

use tokio::sync::Mutex;

use crate::run_metrics::{ErrorCategory, RunMetrics};

#[derive(Debug)]
struct State {
    metrics: RunMetrics,
    finalized: bool,
}

impl State {
    fn live(&mut self) -> Option<&mut RunMetrics> {
        if self.finalized {
            tracing::debug!("ignoring metrics update after finalize");
            return None;
        }
        Some(&mut self.metrics)
    }
}

/// Shared accumulator for one run.
///
/// Every recording operation takes a tokio mutex, so callers on the runtime suspend on
/// contention instead of blocking a worker thread. Once [`MetricsAggregator::finalize`]
/// has been called, further recordings are ignored.
#[derive(Debug)]
pub struct MetricsAggregator {
    state: Mutex<State>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                metrics: RunMetrics::new(),
                finalized: false,
            }),
        }
    }

    pub async fn record_attempt_started(&self) {
        if let Some(m) = self.state.lock().await.live() {
            m.total = m.total.saturating_add(1);
        }
    }

    pub async fn record_success(&self, latency: Duration, bytes_sent: u64) {
        if let Some(m) = self.state.lock().await.live() {
            m.succeeded = m.succeeded.saturating_add(1);
            m.bytes_sent = m.bytes_sent.saturating_add(bytes_sent);
            m.latencies.push(latency);
        }
    }

    pub async fn record_failure(&self, category: ErrorCategory) {
        if let Some(m) = self.state.lock().await.live() {
            m.failed = m.failed.saturating_add(1);
            m.connection_errors = m.connection_errors.saturating_add(1);
            *m.error_counts.entry(category).or_insert(0) += 1;
        }
    }

    pub async fn record_dropped(&self) {
        if let Some(m) = self.state.lock().await.live() {
            m.dropped = m.dropped.saturating_add(1);
        }
    }

    pub async fn record_abandoned(&self, sessions: u64) {
        if let Some(m) = self.state.lock().await.live() {
            m.abandoned = m.abandoned.saturating_add(sessions);
        }
    }

    /// Point-in-time copy of the counters, without finalizing.
    pub async fn snapshot(&self) -> RunMetrics {
        self.state.lock().await.metrics.clone()
    }

    /// Stamp the end time and return the immutable result. Idempotent.
    pub async fn finalize(&self) -> RunMetrics {
        let mut state = self.state.lock().await;
        state.metrics.finish();
        state.finalized = true;
        state.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn records_are_reflected_in_the_result() {
        let agg = MetricsAggregator::new();

        agg.record_attempt_started().await;
        agg.record_success(Duration::from_millis(12), 1000).await;
        agg.record_attempt_started().await;
        agg.record_failure(ErrorCategory::ProtocolError).await;

        let m = agg.finalize().await;
        assert_eq!(m.total, 2);
        assert_eq!(m.succeeded, 1);
        assert_eq!(m.failed, 1);
        assert_eq!(m.connection_errors, 1);
        assert_eq!(m.bytes_sent, 1000);
        assert_eq!(m.latencies, vec![Duration::from_millis(12)]);
        assert_eq!(m.error_count(ErrorCategory::ProtocolError), 1);
        assert_eq!(m.error_count(ErrorCategory::Timeout), 0);
        assert!(m.is_finalized());
        assert!(m.is_drained());
    }

    #[tokio::test]
    async fn snapshot_does_not_finalize() {
        let agg = MetricsAggregator::new();
        agg.record_attempt_started().await;
        agg.record_success(Duration::from_millis(5), 100).await;

        let mid = agg.snapshot().await;
        assert_eq!(mid.succeeded, 1);
        assert!(!mid.is_finalized());
        assert!(mid.ended_at.is_none());

        agg.record_attempt_started().await;
        agg.record_failure(ErrorCategory::Timeout).await;
        let done = agg.finalize().await;
        assert_eq!(done.total, 2);
        assert_eq!(done.failed, 1);
    }

    #[tokio::test]
    async fn updates_after_finalize_are_ignored() {
        let agg = MetricsAggregator::new();
        agg.record_attempt_started().await;
        let first = agg.finalize().await;

        agg.record_attempt_started().await;
        agg.record_success(Duration::from_millis(1), 10).await;
        agg.record_failure(ErrorCategory::Other).await;

        let second = agg.finalize().await;
        assert_eq!(second.total, first.total);
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.failed, 0);
        assert_eq!(second.ended_at, first.ended_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_recording_keeps_counts_consistent() {
        let agg = Arc::new(MetricsAggregator::new());

        let mut handles = Vec::new();
        for task in 0..16u64 {
            let agg = agg.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100u64 {
                    agg.record_attempt_started().await;
                    if (task + i) % 4 == 0 {
                        agg.record_failure(ErrorCategory::Timeout).await;
                    } else {
                        agg.record_success(Duration::from_micros(i), 7).await;
                    }
                }
            }));
        }
        for h in handles {
            if let Err(err) = h.await {
                panic!("task failed: {err}");
            }
        }

        let m = agg.finalize().await;
        assert_eq!(m.total, 1600);
        assert_eq!(m.succeeded + m.failed, 1600);
        assert_eq!(m.failed, 400);
        assert_eq!(m.bytes_sent, m.succeeded * 7);
        assert_eq!(m.latencies.len() as u64, m.succeeded);
        assert_eq!(m.error_count(ErrorCategory::Timeout), 400);
    }
}
