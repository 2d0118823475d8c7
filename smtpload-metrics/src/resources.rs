use std::collections::BTreeMap;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// One probe of the sampled host/containers, keyed by container or process identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSample {
    pub at: SystemTime,
    pub usage: BTreeMap<String, ResourceUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinAvgMax {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSummary {
    /// Number of samples in which the key appeared.
    pub samples: u64,
    pub cpu_percent: MinAvgMax,
    pub memory_mb: MinAvgMax,
}

#[derive(Debug, Clone, Copy)]
struct Running {
    n: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Running {
    fn new(x: f64) -> Self {
        Self {
            n: 1,
            sum: x,
            min: x,
            max: x,
        }
    }

    fn push(&mut self, x: f64) {
        self.n = self.n.saturating_add(1);
        self.sum += x;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    fn finish(self) -> MinAvgMax {
        MinAvgMax {
            min: self.min,
            avg: self.sum / self.n as f64,
            max: self.max,
        }
    }
}

/// Min/avg/max per key, over only the samples in which that key appears.
#[must_use]
pub fn summarize_resources(samples: &[ResourceSample]) -> BTreeMap<String, ResourceSummary> {
    let mut acc: BTreeMap<&str, (Running, Running)> = BTreeMap::new();

    for sample in samples {
        for (key, usage) in &sample.usage {
            acc.entry(key.as_str())
                .and_modify(|(cpu, mem)| {
                    cpu.push(usage.cpu_percent);
                    mem.push(usage.memory_mb);
                })
                .or_insert_with(|| (Running::new(usage.cpu_percent), Running::new(usage.memory_mb)));
        }
    }

    acc.into_iter()
        .map(|(key, (cpu, mem))| {
            (
                key.to_string(),
                ResourceSummary {
                    samples: cpu.n,
                    cpu_percent: cpu.finish(),
                    memory_mb: mem.finish(),
                },
            )
        })
        .collect()
}
