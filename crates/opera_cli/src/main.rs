//! operaio CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: A stage failed or teardown left containers behind
//! - 2: Invalid arguments, configuration, or no usable Docker client

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

mod cli;
mod logging;
mod run;

use cli::Cli;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const RUN_FAILED: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing(cli.log_format) {
        eprintln!("Error: {:#}", e);
    }

    let base_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!(error = %e, "Cannot resolve working directory");
            return ExitCode::from(ExitCodes::INVALID_ARGS);
        }
    };

    let options = match cli.to_options(&base_dir) {
        Ok(options) => options,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(ExitCodes::INVALID_ARGS);
        }
    };

    let (pipeline, runtime) = match run::prepare(&options, cli.reporting_enabled()) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(ExitCodes::INVALID_ARGS);
        }
    };

    let report = run::execute(&pipeline, runtime, options).await;

    if let Some(path) = &cli.report_file {
        run::write_report(&report, path);
    }

    if report.succeeded() {
        ExitCode::from(ExitCodes::SUCCESS)
    } else {
        ExitCode::from(ExitCodes::RUN_FAILED)
    }
}
