use std::time::Duration;

use crate::error::{Error, Result};
use crate::sampler::SampleTarget;

pub const DEFAULT_PORT: u16 = 2525;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WORKER_PAUSE: Duration = Duration::from_millis(10);
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1000;

/// Named message size buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
#[strum(ascii_case_insensitive)]
pub enum BodySize {
    #[strum(to_string = "small", serialize = "1KB")]
    Small,

    #[strum(to_string = "medium", serialize = "10KB")]
    Medium,

    #[strum(to_string = "large", serialize = "100KB")]
    Large,

    #[strum(to_string = "xlarge", serialize = "1MB")]
    XLarge,
}

impl BodySize {
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            Self::Small => 1024,
            Self::Medium => 10 * 1024,
            Self::Large => 100 * 1024,
            Self::XLarge => 1024 * 1024,
        }
    }
}

/// Envelope values and per-step timeouts for one SMTP transaction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub client_name: String,
    pub mail_from: String,
    pub rcpt_to: String,
    pub connect_timeout: Duration,
    /// Applied to every reply line read.
    pub read_timeout: Duration,
    /// Applied to every command and body write.
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: "loadgen.test".to_string(),
            mail_from: "loadgen@test.local".to_string(),
            rcpt_to: "test@example.com".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Fixed message count split across sequential workers.
#[derive(Debug, Clone)]
pub struct BurstShape {
    pub messages: u64,
    pub workers: u64,
    /// Pause after each message within a worker.
    pub pause: Duration,
}

impl BurstShape {
    #[must_use]
    pub fn new(messages: u64, workers: u64) -> Self {
        Self {
            messages,
            workers,
            pause: DEFAULT_WORKER_PAUSE,
        }
    }
}

/// Open-model arrival rate for a fixed wall-clock window.
#[derive(Debug, Clone)]
pub struct SustainedShape {
    pub duration: Duration,
    /// Launches per second.
    pub rate: f64,
    /// Upper bound on concurrently running sessions; launches beyond it are dropped.
    pub max_in_flight: usize,
    /// How long in-flight sessions may run after the window closes before being cancelled.
    pub grace: Duration,
}

impl SustainedShape {
    #[must_use]
    pub fn new(duration: Duration, rate: f64) -> Self {
        Self {
            duration,
            rate,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            grace: DEFAULT_GRACE,
        }
    }

    /// End of the send window if it started now; `None` when the duration is unrepresentable.
    #[must_use]
    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        tokio::time::Instant::now().checked_add(self.duration)
    }

    /// Time between launches.
    pub fn interval(&self) -> Result<Duration> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(Error::InvalidRate);
        }
        match Duration::try_from_secs_f64(1.0 / self.rate) {
            Ok(d) if !d.is_zero() => Ok(d),
            _ => Err(Error::InvalidRate),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LoadShape {
    Burst(BurstShape),
    Sustained(SustainedShape),
}

impl LoadShape {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Burst(_) => "burst",
            Self::Sustained(_) => "sustained",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub servers: Vec<String>,
    pub port: u16,
    pub body_size: usize,
    pub shape: LoadShape,
    pub session: SessionConfig,
    pub sampling: Option<SampleTarget>,
}

impl RunConfig {
    #[must_use]
    pub fn new(servers: Vec<String>, shape: LoadShape) -> Self {
        Self {
            servers,
            port: DEFAULT_PORT,
            body_size: BodySize::Medium.bytes(),
            shape,
            session: SessionConfig::default(),
            sampling: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::NoServers);
        }
        if self.servers.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::EmptyServer);
        }

        let timeouts = [
            ("connect", self.session.connect_timeout),
            ("read", self.session.read_timeout),
            ("write", self.session.write_timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(Error::InvalidTimeout(*name));
        }

        match &self.shape {
            LoadShape::Burst(b) => {
                if b.messages == 0 {
                    return Err(Error::InvalidMessages);
                }
                if b.workers == 0 {
                    return Err(Error::InvalidWorkers);
                }
            }
            LoadShape::Sustained(s) => {
                if s.duration.is_zero() || s.deadline().is_none() {
                    return Err(Error::InvalidDuration);
                }
                if s.max_in_flight == 0 {
                    return Err(Error::InvalidMaxInFlight);
                }
                s.interval()?;
            }
        }

        Ok(())
    }
}
