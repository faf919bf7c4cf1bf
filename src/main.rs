use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::Instrument;

use rider_state::cli::commands::batch::BatchCommand;
use rider_state::cli::commands::config::ConfigCommand;
use rider_state::cli::commands::inspect::{DeadLettersCommand, SeedCommand, ShowCommand};
use rider_state::cli::commands::table::{ClassifyCommand, TableCommand};
use rider_state::cli::commands::transition::TransitionCommand;
use rider_state::cli::commands::Command;
use rider_state::cli::{Cli, Commands};
use rider_state::config::{config, RiderStateConfig};
use rider_state::shutdown::ShutdownSignal;
use rider_state::telemetry::{create_command_span, generate_correlation_id, init_telemetry};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            RiderStateConfig::load_env_file()?;
            RiderStateConfig::load(Some(path))?
        }
        None => config()?.clone(),
    };

    init_telemetry(&config.observability)?;

    let span = create_command_span(cli.command.name(), &generate_correlation_id());
    tokio::runtime::Runtime::new()?.block_on(run(cli.command, config).instrument(span))
}

async fn run(command: Commands, config: RiderStateConfig) -> Result<ExitCode> {
    match command {
        Commands::Transition { rider, next_state } => {
            TransitionCommand::new(rider, next_state, config)
                .execute()
                .await
        }
        Commands::Batch { input } => {
            BatchCommand::new(input, config)
                .with_shutdown(ShutdownSignal::install_ctrl_c())
                .execute()
                .await
        }
        Commands::Seed {
            rider,
            state,
            lat,
            long,
        } => {
            SeedCommand::new(rider, state, config)
                .with_location(lat.zip(long))
                .execute()
                .await
        }
        Commands::Show { rider } => ShowCommand::new(rider, config).execute().await,
        Commands::Table { json } => TableCommand { json }.execute().await,
        Commands::Classify { from, to } => ClassifyCommand { from, to }.execute().await,
        Commands::DeadLetters { stage } => {
            DeadLettersCommand::new(stage, config).execute().await
        }
        Commands::Config { write } => ConfigCommand { write, config }.execute().await,
    }
}
