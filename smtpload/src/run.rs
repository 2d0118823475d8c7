use anyhow::Context as _;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::logging;
use crate::output;
use crate::report;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    logging::init(&args.log_level);

    let out = output::formatter(args.output);
    let cfg = args.to_run_config();
    cfg.validate()?;

    out.print_header(&cfg);

    let metrics = tokio::select! {
        res = smtpload_core::run_load(&cfg) => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted by user; in-flight sessions dropped, no results written");
            return Ok(ExitCode::Interrupted);
        }
    };

    out.print_summary(&cfg, &metrics)
        .map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.out {
        report::write(path, &report::build(&cfg, &metrics))
            .await
            .context("write results")
            .map_err(RunError::RuntimeError)?;
        tracing::info!(path = %path.display(), "results saved");
    }

    Ok(ExitCode::from_failures(metrics.failed))
}
