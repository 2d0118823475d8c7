use std::io::Write as _;

use serde::Serialize;
use smtpload_core::RunConfig;
use smtpload_metrics::RunMetrics;

use super::OutputFormatter;
use crate::report::{self, ResultDocument};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config: &RunConfig) {}

    fn print_summary(&self, config: &RunConfig, metrics: &RunMetrics) -> anyhow::Result<()> {
        let line = build_summary_line(config, metrics);
        emit_json_line(&line)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    #[serde(flatten)]
    pub result: ResultDocument,
}

fn build_summary_line(config: &RunConfig, metrics: &RunMetrics) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        result: report::build(config, metrics),
    }
}

fn emit_json_line<T: Serialize>(line: &T) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, line)?;
    writeln!(out)?;
    Ok(())
}
