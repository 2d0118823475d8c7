use std::sync::Arc;

use smtpload_metrics::{MetricsAggregator, RunMetrics};

use crate::config::{LoadShape, RunConfig};
use crate::error::Result;
use crate::sampler::{ResourceSampler, SAMPLE_INTERVAL};
use crate::smtp::SmtpClient;

mod burst;
mod sustained;

pub use burst::partition_batches;

/// Everything a session task needs, shared across all tasks of one run.
#[derive(Clone)]
pub(crate) struct RunContext {
    client: SmtpClient,
    targets: Arc<[String]>,
    port: u16,
    body_size: usize,
    pub(crate) metrics: Arc<MetricsAggregator>,
}

impl RunContext {
    fn new(config: &RunConfig, metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            client: SmtpClient::new(config.session.clone()),
            targets: config.servers.iter().cloned().collect(),
            port: config.port,
            body_size: config.body_size,
            metrics,
        }
    }

    /// Round-robin pick over the configured servers.
    pub(crate) fn target(&self, index: u64) -> &str {
        let len = self.targets.len().max(1) as u64;
        self.targets
            .get((index % len) as usize)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Run one transaction and record its outcome. The caller records the attempt.
    pub(crate) async fn execute(&self, target: &str) {
        match self.client.execute(target, self.port, self.body_size).await {
            Ok(tx) => {
                tracing::debug!(
                    server = target,
                    latency_ms = tx.latency.as_secs_f64() * 1000.0,
                    bytes = tx.bytes_sent,
                    "message delivered"
                );
                self.metrics.record_success(tx.latency, tx.bytes_sent).await;
            }
            Err(err) => {
                let category = err.category();
                tracing::warn!(server = target, %category, "transaction failed: {err}");
                self.metrics.record_failure(category).await;
            }
        }
    }
}

/// Drive one load run to completion and return its finalized metrics.
///
/// Every run gets a fresh aggregator. Resource samples, if configured, are attached after
/// the metrics are finalized so stopping the sampler does not stretch the measured window.
pub async fn run_load(config: &RunConfig) -> Result<RunMetrics> {
    config.validate()?;

    let metrics = Arc::new(MetricsAggregator::new());
    let ctx = RunContext::new(config, metrics.clone());

    let sampler = match &config.sampling {
        Some(target) => Some(ResourceSampler::start(target.clone().into_source(), SAMPLE_INTERVAL)?),
        None => None,
    };

    tracing::info!(
        mode = config.shape.name(),
        servers = config.servers.len(),
        port = config.port,
        body_size = config.body_size,
        "load run starting"
    );

    let outcome = match &config.shape {
        LoadShape::Burst(shape) => burst::run(&ctx, shape).await,
        LoadShape::Sustained(shape) => sustained::run(&ctx, shape).await,
    };

    let finished = metrics.finalize().await;

    let samples = match sampler {
        Some(sampler) => tokio::task::spawn_blocking(move || sampler.stop()).await?,
        None => Vec::new(),
    };

    outcome?;

    tracing::info!(
        total = finished.total,
        succeeded = finished.succeeded,
        failed = finished.failed,
        dropped = finished.dropped,
        abandoned = finished.abandoned,
        "load run finished"
    );

    Ok(finished.with_resource_samples(samples))
}
