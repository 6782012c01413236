use anyhow::Result;
use clap::Parser;

use fab_tracker::cli::commands::init::InitCommand;
use fab_tracker::cli::commands::set_field::SetFieldCommand;
use fab_tracker::cli::commands::show::ShowCommand;
use fab_tracker::cli::commands::status::StatusCommand;
use fab_tracker::cli::commands::sync::SyncCommand;
use fab_tracker::cli::commands::{show_how_to_start, Command};
use fab_tracker::cli::{Cli, Commands};
use fab_tracker::config::TrackerConfig;
use fab_tracker::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env before config so the token fallbacks can see it
    TrackerConfig::load_env_file()?;
    let config = TrackerConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability.log_level, config.observability.json)?;

    let dry_run = cli.dry_run;
    match cli.command {
        // Default behavior: no subcommand - explain how to get started
        None => show_how_to_start(),
        Some(Commands::Init { run, device, creator }) => tokio::runtime::Runtime::new()?.block_on(async {
            InitCommand::new(run.key(), device, creator, config)
                .with_dry_run(dry_run)
                .execute()
                .await
        }),
        Some(Commands::Show { run }) => {
            tokio::runtime::Runtime::new()?.block_on(async { ShowCommand::new(run.key(), config).execute().await })
        }
        Some(Commands::Status {
            run,
            layer,
            substep,
            step,
            to,
        }) => tokio::runtime::Runtime::new()?.block_on(async {
            StatusCommand {
                key: run.key(),
                layer,
                substep,
                step,
                to,
                config,
                dry_run,
            }
            .execute()
            .await
        }),
        Some(Commands::SetField {
            run,
            stage,
            entity,
            key,
            value,
        }) => tokio::runtime::Runtime::new()?.block_on(async {
            SetFieldCommand {
                key: run.key(),
                stage,
                entity,
                field: key,
                value,
                config,
                dry_run,
            }
            .execute()
            .await
        }),
        Some(Commands::Sync { run }) => tokio::runtime::Runtime::new()?.block_on(async {
            SyncCommand {
                key: run.key(),
                config,
                dry_run,
            }
            .execute()
            .await
        }),
    }
}
