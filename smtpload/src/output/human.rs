mod format;
mod summary;

use smtpload_core::{LoadShape, RunConfig};
use smtpload_metrics::RunMetrics;

use format::format_bytes;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config: &RunConfig) {
        println!("servers: {} (port {})", config.servers.join(", "), config.port);
        match &config.shape {
            LoadShape::Burst(b) => println!(
                "mode: burst messages={} workers={} size={}",
                b.messages,
                b.workers,
                format_bytes(config.body_size as u64)
            ),
            LoadShape::Sustained(s) => println!(
                "mode: sustained duration={} rate={}/s max_in_flight={} size={}",
                humantime::format_duration(s.duration),
                s.rate,
                s.max_in_flight,
                format_bytes(config.body_size as u64)
            ),
        }
        println!();
    }

    fn print_summary(&self, _config: &RunConfig, metrics: &RunMetrics) -> anyhow::Result<()> {
        print!("{}", render(metrics));
        Ok(())
    }
}
