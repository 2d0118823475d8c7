mod config;
mod error;

pub mod runner;
pub mod sampler;
pub mod smtp;

pub use config::{
    BodySize, BurstShape, DEFAULT_CONNECT_TIMEOUT, DEFAULT_GRACE, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_PORT, DEFAULT_READ_TIMEOUT, DEFAULT_WORKER_PAUSE, DEFAULT_WRITE_TIMEOUT, LoadShape,
    RunConfig, SessionConfig, SustainedShape,
};
pub use error::{Error, Result};
pub use runner::{partition_batches, run_load};
pub use sampler::{
    DockerStats, HostUsage, ProcessUsage, ResourceSampler, SAMPLE_INTERVAL, SampleSource,
    SampleTarget, parse_docker_stats,
};
pub use smtp::{SessionError, SmtpClient, Stage, Transaction, classify, generate_body};
pub use smtpload_metrics::{ErrorCategory, RunMetrics};
