use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use smtpload_core::{
    BodySize, BurstShape, DEFAULT_MAX_IN_FLIGHT, DEFAULT_PORT, LoadShape, RunConfig,
    SampleTarget, SessionConfig, SustainedShape,
};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 60, 10s, 250ms, 1m)".to_string());
    }

    // Bare numbers are seconds.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 60, 10s, 250ms, 1m)"))
}

fn parse_body_size(input: &str) -> Result<BodySize, String> {
    input
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{input}' (expected small, medium, large or xlarge)"))
}

fn parse_sample_target(input: &str) -> Result<SampleTarget, String> {
    input.parse().map_err(|err| format!("{err}"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit a single JSON summary line to stdout.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Fixed number of messages split across sequential workers.
    Burst,
    /// Fixed message rate for a fixed duration.
    Sustained,
}

#[derive(Debug, Parser)]
#[command(
    name = "smtpload",
    author,
    version,
    about = "SMTP load generator",
    long_about = "smtpload drives SMTP servers with plaintext transactions (EHLO, MAIL FROM, RCPT TO, DATA, QUIT) and reports throughput, latency percentiles and failure categories.\n\nBurst mode sends a fixed number of messages through a fixed set of workers; sustained mode launches transactions at a fixed rate for a fixed duration.",
    after_help = "Examples:\n  smtpload run --servers mx1,mx2 --mode burst --messages 1000 --workers 10\n  smtpload run --servers mx1 --mode sustained --duration 60s --rate 50 --size large\n  smtpload run --servers mx1 --mode burst --out results/run.json --sample-resources"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against one or more SMTP servers
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Comma-separated list of target servers
    #[arg(
        short = 's',
        long,
        env = "SMTPLOAD_SERVERS",
        value_delimiter = ',',
        required = true
    )]
    pub servers: Vec<String>,

    /// SMTP port
    #[arg(short = 'p', long, env = "SMTPLOAD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Load shape
    #[arg(short = 'm', long, value_enum)]
    pub mode: Mode,

    /// Total messages to send (burst mode)
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub messages: u64,

    /// Concurrent workers (burst mode)
    #[arg(short = 'w', long, default_value_t = 10)]
    pub workers: u64,

    /// Test duration (sustained mode; e.g. 60, 30s, 5m)
    #[arg(short = 'd', long, value_parser = parse_duration, default_value = "60s")]
    pub duration: Duration,

    /// Messages per second (sustained mode)
    #[arg(short = 'r', long, default_value_t = 10.0)]
    pub rate: f64,

    /// Message size: small (1KB), medium (10KB), large (100KB), xlarge (1MB)
    #[arg(long, value_parser = parse_body_size, default_value = "medium")]
    pub size: BodySize,

    /// Exact body size in bytes (overrides --size)
    #[arg(long, value_name = "BYTES")]
    pub body_bytes: Option<usize>,

    /// Write the JSON result document to this file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Sample resource usage once per second during the run
    #[arg(long)]
    pub sample_resources: bool,

    /// Resource probe: docker, host, or process:<name>
    #[arg(long, value_name = "SOURCE", value_parser = parse_sample_target, default_value = "docker")]
    pub sampler: SampleTarget,

    /// Connect timeout
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub connect_timeout: Duration,

    /// Timeout for each server reply line
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub read_timeout: Duration,

    /// Timeout for each command or body write
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub write_timeout: Duration,

    /// Pause between messages within a burst worker
    #[arg(long, value_parser = parse_duration, default_value = "10ms")]
    pub worker_pause: Duration,

    /// How long to wait for in-flight sessions after a sustained window closes
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub grace: Duration,

    /// Cap on concurrently running sessions in sustained mode; launches beyond it are dropped
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    /// Name sent with EHLO
    #[arg(long, default_value = "loadgen.test")]
    pub helo_name: String,

    /// Envelope sender
    #[arg(long, default_value = "loadgen@test.local")]
    pub mail_from: String,

    /// Envelope recipient
    #[arg(long, default_value = "test@example.com")]
    pub rcpt_to: String,

    /// Log filter used when RUST_LOG is unset (e.g. info, debug, smtpload_core=debug)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl RunArgs {
    pub fn body_size(&self) -> usize {
        self.body_bytes.unwrap_or_else(|| self.size.bytes())
    }

    pub fn servers(&self) -> Vec<String> {
        self.servers
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn to_run_config(&self) -> RunConfig {
        let shape = match self.mode {
            Mode::Burst => LoadShape::Burst(BurstShape {
                messages: self.messages,
                workers: self.workers,
                pause: self.worker_pause,
            }),
            Mode::Sustained => LoadShape::Sustained(SustainedShape {
                duration: self.duration,
                rate: self.rate,
                max_in_flight: self.max_in_flight,
                grace: self.grace,
            }),
        };

        let mut cfg = RunConfig::new(self.servers(), shape);
        cfg.port = self.port;
        cfg.body_size = self.body_size();
        cfg.session = SessionConfig {
            client_name: self.helo_name.clone(),
            mail_from: self.mail_from.clone(),
            rcpt_to: self.rcpt_to.clone(),
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        };
        cfg.sampling = self.sample_resources.then(|| self.sampler.clone());
        cfg
    }
}
