mod cli;
mod exit_codes;
mod logging;
mod output;
mod report;
mod run;
mod run_error;

use clap::Parser;
use clap::error::ErrorKind;
use mimalloc::MiMalloc;

use exit_codes::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn usage_exit_code(err: &clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
        _ => ExitCode::InvalidInput,
    }
}

#[tokio::main]
async fn main() {
    let code = match cli::Cli::try_parse() {
        Err(err) => {
            let _ = err.print();
            usage_exit_code(&err)
        }
        Ok(cli::Cli {
            command: cli::Command::Run(args),
        }) => run::run(args).await.unwrap_or_else(|err| {
            eprintln!("{err}");
            err.exit_code()
        }),
    };

    std::process::exit(code.as_i32());
}
