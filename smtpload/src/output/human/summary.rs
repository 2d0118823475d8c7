use std::fmt::Write as _;

use smtpload_metrics::RunMetrics;

use super::format::*;

const RULE: &str = "============================================================";

pub(crate) fn render(metrics: &RunMetrics) -> String {
    let mut out = String::new();

    writeln!(out, "{RULE}").ok();
    out.push_str("LOAD TEST RESULTS\n");
    writeln!(out, "{RULE}").ok();

    writeln!(out, "duration:          {:.2}s", metrics.duration_secs()).ok();
    writeln!(out, "total messages:    {}", metrics.total).ok();
    writeln!(out, "successful:        {}", metrics.succeeded).ok();
    writeln!(out, "failed:            {}", metrics.failed).ok();
    writeln!(out, "connection errors: {}", metrics.connection_errors).ok();
    if metrics.dropped > 0 {
        writeln!(out, "dropped:           {}", metrics.dropped).ok();
    }
    if metrics.abandoned > 0 {
        writeln!(out, "abandoned:         {}", metrics.abandoned).ok();
    }
    writeln!(out, "success rate:      {}%", format_rate(metrics.success_rate())).ok();
    writeln!(out, "messages/second:   {}", format_rate(metrics.throughput())).ok();
    writeln!(out, "data sent:         {}", format_bytes(metrics.bytes_sent)).ok();

    match metrics.latency_summary() {
        Some(l) => {
            writeln!(
                out,
                "latency:           min={} mean={} max={} stdev={} (n={})",
                format_ms(l.min),
                format_ms(l.mean),
                format_ms(l.max),
                format_ms(l.stdev),
                l.count
            )
            .ok();
            writeln!(
                out,
                "percentiles:       p50={} p90={} p95={} p99={} p99.9={}",
                format_ms(l.p50),
                format_ms(l.p90),
                format_ms(l.p95),
                format_ms(l.p99),
                format_ms(l.p99_9)
            )
            .ok();
        }
        None => out.push_str("latency:           n/a\n"),
    }

    if !metrics.error_counts.is_empty() {
        out.push_str("errors:\n");
        let mut errors: Vec<_> = metrics.error_counts.iter().collect();
        errors.sort_by(|(a_cat, a_n), (b_cat, b_n)| b_n.cmp(a_n).then_with(|| a_cat.cmp(b_cat)));
        for (category, n) in errors {
            writeln!(out, "  {category}: {n}").ok();
        }
    }

    let resources = metrics.resource_summary();
    if !resources.is_empty() {
        out.push_str("resources:\n");
        for (key, r) in &resources {
            writeln!(
                out,
                "  {key}: cpu min/avg/max={:.1}/{:.1}/{:.1}% mem min/avg/max={:.1}/{:.1}/{:.1}MB (samples={})",
                r.cpu_percent.min,
                r.cpu_percent.avg,
                r.cpu_percent.max,
                r.memory_mb.min,
                r.memory_mb.avg,
                r.memory_mb.max,
                r.samples
            )
            .ok();
        }
    }

    writeln!(out, "{RULE}").ok();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use smtpload_metrics::{ErrorCategory, MetricsAggregator};
    use std::time::Duration;

    #[tokio::test]
    async fn renders_counters_percentiles_and_errors() {
        let agg = MetricsAggregator::new();
        for ms in [10u64, 20, 30, 40] {
            agg.record_attempt_started().await;
            agg.record_success(Duration::from_millis(ms), 2048).await;
        }
        for cat in [ErrorCategory::Timeout, ErrorCategory::ProtocolError, ErrorCategory::ProtocolError] {
            agg.record_attempt_started().await;
            agg.record_failure(cat).await;
        }
        let out = render(&agg.finalize().await);

        assert!(out.contains("total messages:    7"), "{out}");
        assert!(out.contains("failed:            3"), "{out}");
        assert!(out.contains("p50=25.00ms"), "{out}");
        assert!(out.contains("data sent:         8.00KiB"), "{out}");

        let protocol = out.find("protocol_error: 2");
        let timeout = out.find("timeout: 1");
        assert!(matches!((protocol, timeout), (Some(p), Some(t)) if p < t), "{out}");
        assert!(!out.contains("resources:"));
    }

    #[tokio::test]
    async fn empty_run_has_no_latency() {
        let out = render(&MetricsAggregator::new().finalize().await);
        assert!(out.contains("latency:           n/a"), "{out}");
        assert!(out.contains("success rate:      0.00%"), "{out}");
    }
}
