mod cli;
mod logging;

use anyhow::Context;
use clap::Parser;
use parameta_core::Error;
use parameta_jobs::{ConversionInputs, ConversionJob, RunSummary, StdevJob, TracingReporter};
use std::process::ExitCode;
use std::sync::Arc;

use crate::cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "run failed");
            eprintln!("error: {error:#}");
            ExitCode::from(exit_code(&error))
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    logging::init(cli.log_format)?;
    let config = cli.resolve_config().context("invalid configuration")?;
    let reporter = Arc::new(TracingReporter::new());

    let summary: RunSummary = match &cli.command {
        Command::Convert(args) => {
            let inputs = ConversionInputs {
                prices: args.prices.clone(),
                metadata: args.metadata.clone(),
                spot_rates: args.spot_rates.clone(),
            };
            ConversionJob::new(config)
                .with_reporter(reporter)
                .run(&inputs, &args.output)
                .context("price conversion failed")?
        }
        Command::Stdev(args) => StdevJob::new(config)
            .with_reporter(reporter)
            .run(&args.input, &args.output)
            .with_context(|| format!("rolling stdev failed for {}", args.input.display()))?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Schema problems exit 2, configuration problems 3, anything else 1.
fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<Error>() {
        Some(Error::Schema(_)) => 2,
        Some(Error::Config(_)) | Some(Error::Json(_)) => 3,
        _ => 1,
    }
}
