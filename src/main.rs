use std::process::ExitCode;

use anyhow::Result;
use batchcheck::cli::{Cli, Command};
use batchcheck::config::BatchConfig;
use batchcheck::{commands, logging};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = BatchConfig::load(cli.config.as_deref())?;
    cli.command.config_args().apply(&mut config);
    config.validate()?;

    match &cli.command {
        Command::Run { inputs, .. } => commands::run(&config, inputs, cli.verbose).await,
        Command::Resolve { inputs, .. } => {
            commands::resolve(&config, inputs)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Script { item, .. } => {
            commands::script(&config, item)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
