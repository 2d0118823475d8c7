mod aggregator;
mod percentile;
mod resources;
mod run_metrics;

pub use aggregator::MetricsAggregator;
pub use percentile::{REPORTED_PERCENTILES, interpolate_percentile};
pub use resources::{
    MinAvgMax, ResourceSample, ResourceSummary, ResourceUsage, summarize_resources,
};
pub use run_metrics::{ErrorCategory, LatencySummary, RunMetrics};
