use std::collections::BTreeMap;
use std::io;
use std::process::Command;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use smtpload_metrics::{ResourceSample, ResourceUsage};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::{Error, Result};

/// Time between probes.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Longest `stop` waits for an in-progress probe before returning what it has.
const STOP_WAIT: Duration = Duration::from_secs(3);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One blocking resource probe, keyed by container or process identifier.
pub trait SampleSource: Send + 'static {
    fn name(&self) -> &'static str;

    fn sample(&mut self) -> io::Result<BTreeMap<String, ResourceUsage>>;
}

/// Which probe `--sample-resources` uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleTarget {
    /// `docker stats` over every running container.
    Docker,
    /// Whole-host CPU and memory.
    Host,
    /// Processes whose name contains the given string.
    Process { name: String },
}

impl FromStr for SampleTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            None if s.eq_ignore_ascii_case("docker") => Ok(Self::Docker),
            None if s.eq_ignore_ascii_case("host") => Ok(Self::Host),
            Some((kind, name)) if kind.eq_ignore_ascii_case("process") && !name.is_empty() => {
                Ok(Self::Process {
                    name: name.to_string(),
                })
            }
            _ => Err(Error::InvalidSampler(s.to_string())),
        }
    }
}

impl SampleTarget {
    #[must_use]
    pub fn into_source(self) -> Box<dyn SampleSource> {
        match self {
            Self::Docker => Box::new(DockerStats),
            Self::Host => Box::new(HostUsage::new()),
            Self::Process { name } => Box::new(ProcessUsage::new(name)),
        }
    }
}

/// Runs `docker stats --no-stream` once per probe.
#[derive(Debug, Default)]
pub struct DockerStats;

impl SampleSource for DockerStats {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn sample(&mut self) -> io::Result<BTreeMap<String, ResourceUsage>> {
        let out = Command::new("docker")
            .args([
                "stats",
                "--no-stream",
                "--format",
                "{{.Name}}\t{{.CPUPerc}}\t{{.MemUsage}}",
            ])
            .output()?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(io::Error::other(format!(
                "docker stats exited with {}: {}",
                out.status,
                stderr.trim()
            )));
        }

        Ok(parse_docker_stats(&String::from_utf8_lossy(&out.stdout)))
    }
}

/// Parse `name<TAB>cpu%<TAB>used / limit` lines. Malformed lines are skipped.
#[must_use]
pub fn parse_docker_stats(output: &str) -> BTreeMap<String, ResourceUsage> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split('\t');
            let name = cols.next()?.trim();
            let cpu = cols.next()?.trim().trim_end_matches('%');
            let mem = cols.next()?.split('/').next()?.trim();
            if name.is_empty() {
                return None;
            }

            let usage = ResourceUsage {
                cpu_percent: cpu.parse().unwrap_or(0.0),
                memory_mb: parse_mem_mb(mem)?,
            };
            Some((name.to_string(), usage))
        })
        .collect()
}

fn parse_mem_mb(s: &str) -> Option<f64> {
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.parse().ok()?;

    let bytes = match unit.trim() {
        "" | "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => BYTES_PER_MB,
        "GiB" => BYTES_PER_MB * 1024.0,
        "TiB" => BYTES_PER_MB * 1024.0 * 1024.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };

    Some(value * bytes / BYTES_PER_MB)
}

/// Global CPU and used memory of the machine running the generator.
pub struct HostUsage {
    sys: System,
}

impl HostUsage {
    #[must_use]
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for HostUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for HostUsage {
    fn name(&self) -> &'static str {
        "host"
    }

    fn sample(&mut self) -> io::Result<BTreeMap<String, ResourceUsage>> {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let usage = ResourceUsage {
            cpu_percent: f64::from(self.sys.global_cpu_usage()),
            memory_mb: self.sys.used_memory() as f64 / BYTES_PER_MB,
        };
        Ok(BTreeMap::from([("host".to_string(), usage)]))
    }
}

/// Local processes matched by name, keyed `name:pid`.
pub struct ProcessUsage {
    name: String,
    sys: System,
}

impl ProcessUsage {
    #[must_use]
    pub fn new(name: String) -> Self {
        Self {
            name,
            sys: System::new(),
        }
    }
}

impl SampleSource for ProcessUsage {
    fn name(&self) -> &'static str {
        "process"
    }

    fn sample(&mut self) -> io::Result<BTreeMap<String, ResourceUsage>> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );

        let out = self
            .sys
            .processes()
            .iter()
            .filter_map(|(pid, p)| {
                let name = p.name().to_string_lossy();
                name.contains(self.name.as_str()).then(|| {
                    let usage = ResourceUsage {
                        cpu_percent: f64::from(p.cpu_usage()),
                        memory_mb: p.memory() as f64 / BYTES_PER_MB,
                    };
                    (format!("{name}:{pid}"), usage)
                })
            })
            .collect();

        Ok(out)
    }
}

/// Background probe loop on a dedicated OS thread.
///
/// Probes block (an external process per tick for docker), so they stay off the async
/// runtime. `stop` returns whatever was collected; a probe still running at that point is
/// not waited on past a short bound.
pub struct ResourceSampler {
    samples: Arc<Mutex<Vec<ResourceSample>>>,
    stop_tx: Option<mpsc::Sender<()>>,
    done_rx: mpsc::Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ResourceSampler {
    pub fn start(mut source: Box<dyn SampleSource>, interval: Duration) -> Result<Self> {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let out = samples.clone();
        let handle = thread::Builder::new()
            .name(format!("smtpload-sampler-{}", source.name()))
            .spawn(move || {
                tracing::debug!(source = source.name(), "resource sampler started");
                loop {
                    let started = Instant::now();
                    match source.sample() {
                        Ok(usage) => out.lock().push(ResourceSample {
                            at: SystemTime::now(),
                            usage,
                        }),
                        Err(err) => {
                            tracing::warn!(source = source.name(), "resource probe failed: {err}");
                        }
                    }

                    let wait = interval.saturating_sub(started.elapsed());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            samples,
            stop_tx: Some(stop_tx),
            done_rx,
            handle: Some(handle),
        })
    }

    /// Signal the loop and return the collected samples.
    pub fn stop(mut self) -> Vec<ResourceSample> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }

        match self.done_rx.recv_timeout(STOP_WAIT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("resource sampler did not stop in time; returning partial samples");
            }
        }

        std::mem::take(&mut *self.samples.lock())
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}
