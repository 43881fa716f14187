use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use office_pilot::cli::Cli;
use office_pilot::error::Result;
use office_pilot::orchestrator::CommandProcessor;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(response) => {
            println!("{}", response);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err.payload());
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("office_pilot=debug")
    } else {
        EnvFilter::new("office_pilot=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<serde_json::Value> {
    let processor = CommandProcessor::bootstrap(cli.root).await?;
    processor.process(cli.command.into_request()).await
}
