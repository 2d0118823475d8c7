use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Context as _;
use serde::Serialize;
use smtpload_core::{LoadShape, RunConfig};
use smtpload_metrics::{MinAvgMax, ResourceSummary, RunMetrics};

/// The `--out` document: run configuration plus every counter and derived statistic.
#[derive(Debug, Serialize)]
pub(crate) struct ResultDocument {
    pub test_type: &'static str,
    pub servers: Vec<String>,
    pub port: u16,
    pub message_size: usize,
    #[serde(flatten)]
    pub shape: ShapeParams,
    pub metrics: MetricsSection,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceSection>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum ShapeParams {
    Burst {
        messages: u64,
        workers: u64,
    },
    Sustained {
        duration_seconds: f64,
        rate: f64,
        max_in_flight: usize,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct MetricsSection {
    pub total_messages: u64,
    pub successful_messages: u64,
    pub failed_messages: u64,
    pub connection_errors: u64,
    pub dropped: u64,
    pub abandoned: u64,
    pub total_bytes_sent: u64,
    pub duration_seconds: f64,
    pub messages_per_second: f64,
    pub success_rate: f64,
    pub start_time: String,
    pub end_time: Option<String>,
    pub latency_ms: Option<LatencySection>,
    pub errors: BTreeMap<&'static str, u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LatencySection {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    #[serde(rename = "p99.9")]
    pub p99_9: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResourceSection {
    pub samples: u64,
    pub cpu_percent: Stat,
    pub memory_mb: Stat,
}

#[derive(Debug, Serialize)]
pub(crate) struct Stat {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl From<&MinAvgMax> for Stat {
    fn from(v: &MinAvgMax) -> Self {
        Self {
            min: v.min,
            avg: v.avg,
            max: v.max,
        }
    }
}

impl From<&ResourceSummary> for ResourceSection {
    fn from(s: &ResourceSummary) -> Self {
        Self {
            samples: s.samples,
            cpu_percent: (&s.cpu_percent).into(),
            memory_mb: (&s.memory_mb).into(),
        }
    }
}

pub(crate) fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

pub(crate) fn rfc3339(t: SystemTime) -> String {
    humantime::format_rfc3339_millis(t).to_string()
}

pub(crate) fn build(config: &RunConfig, metrics: &RunMetrics) -> ResultDocument {
    let shape = match &config.shape {
        LoadShape::Burst(b) => ShapeParams::Burst {
            messages: b.messages,
            workers: b.workers,
        },
        LoadShape::Sustained(s) => ShapeParams::Sustained {
            duration_seconds: s.duration.as_secs_f64(),
            rate: s.rate,
            max_in_flight: s.max_in_flight,
        },
    };

    let latency_ms = metrics.latency_summary().map(|l| LatencySection {
        count: l.count,
        min: ms(l.min),
        max: ms(l.max),
        mean: ms(l.mean),
        stdev: ms(l.stdev),
        p50: ms(l.p50),
        p90: ms(l.p90),
        p95: ms(l.p95),
        p99: ms(l.p99),
        p99_9: ms(l.p99_9),
    });

    let errors = metrics
        .error_counts
        .iter()
        .map(|(cat, n)| (<&'static str>::from(*cat), *n))
        .collect();

    let resources = metrics
        .resource_summary()
        .iter()
        .map(|(k, v)| (k.clone(), v.into()))
        .collect();

    ResultDocument {
        test_type: config.shape.name(),
        servers: config.servers.clone(),
        port: config.port,
        message_size: config.body_size,
        shape,
        metrics: MetricsSection {
            total_messages: metrics.total,
            successful_messages: metrics.succeeded,
            failed_messages: metrics.failed,
            connection_errors: metrics.connection_errors,
            dropped: metrics.dropped,
            abandoned: metrics.abandoned,
            total_bytes_sent: metrics.bytes_sent,
            duration_seconds: metrics.duration_secs(),
            messages_per_second: metrics.throughput(),
            success_rate: metrics.success_rate(),
            start_time: rfc3339(metrics.started_at),
            end_time: metrics.ended_at.map(rfc3339),
            latency_ms,
            errors,
        },
        resources,
    }
}

/// Write the pretty-printed document, creating parent directories as needed.
pub(crate) async fn write(path: &Path, doc: &ResultDocument) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut json = serde_json::to_vec_pretty(doc).context("failed to serialize results")?;
    json.push(b'\n');

    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
