use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::model::{RunClass, RunKey};

pub mod commands;

#[derive(Parser)]
#[command(name = "fab-tracker")]
#[command(about = "Track fab and measurement runs, mirrored to Notion")]
#[command(long_about = "fab-tracker records the step statuses and metadata of fabrication and \
                       measurement runs, saves them to the document store and keeps one mirror \
                       page per fab record and fridge cooldown. Start with 'fab-tracker init'.")]
pub struct Cli {
    /// Extra configuration file, applied after fab-tracker.toml and .fab-tracker-rc
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Record mirror calls instead of sending them and keep writes in memory
    #[arg(long, global = true, help = "Print mirror calls instead of sending them; nothing is saved")]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Identifies one run document
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Run classification (main, test, ...)
    #[arg(long, default_value = "main", help = "Run class: main (fab) or test")]
    pub class: String,
    /// Run number
    #[arg(long, help = "Run number, e.g. 007")]
    pub run: String,
}

impl RunArgs {
    pub fn key(&self) -> RunKey {
        RunKey::new(RunClass::from(self.class.clone()), self.run.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Design,
    Fab,
    Package,
    Measure,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a run with the standard flow
    Init {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, help = "Device name, used as the fab page title")]
        device: String,
        #[arg(long, help = "Who created the run")]
        creator: String,
    },
    /// Print layers, step statuses and metadata of a run
    Show {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Change the status of one step and save
    Status {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, help = "Layer name: Design, Fabrication, Package or Measurement")]
        layer: String,
        #[arg(long, help = "Substep id, chip/fridge uid, label or name")]
        substep: String,
        #[arg(long, help = "Step name, e.g. Cooldown")]
        step: String,
        #[arg(long, help = "New status: pending, in_progress, done, terminate, delivery#N, store#N")]
        to: String,
    },
    /// Override one metadata field and save
    SetField {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, value_enum, help = "Metadata stage")]
        stage: StageArg,
        #[arg(long, help = "Chip or fridge uid (or label) for package and measure fields")]
        entity: Option<String>,
        #[arg(long, help = "Field key, e.g. cooldown_start")]
        key: String,
        #[arg(long, help = "New value; empty clears the field")]
        value: String,
    },
    /// Save without changes: repairs linkage and retries pending mirror work
    Sync {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_status_command_with_global_flags() {
        let cli = Cli::try_parse_from([
            "fab-tracker",
            "status",
            "--run",
            "007",
            "--layer",
            "Measurement",
            "--substep",
            "Bluefors",
            "--step",
            "Cooldown",
            "--to",
            "in_progress",
            "--dry-run",
        ])
        .unwrap();

        assert!(cli.dry_run);
        match cli.command {
            Some(Commands::Status { run, step, to, .. }) => {
                assert_eq!(run.key().doc_id(), "main-007");
                assert_eq!(step, "Cooldown");
                assert_eq!(to, "in_progress");
            }
            _ => panic!("expected the status command"),
        }
    }

    #[test]
    fn test_set_field_stage_values() {
        let cli = Cli::try_parse_from([
            "fab-tracker",
            "set-field",
            "--class",
            "test",
            "--run",
            "3",
            "--stage",
            "measure",
            "--entity",
            "fridge_default_bluefors",
            "--key",
            "warmup_start",
            "--value",
            "2026-02-09 10:00:00",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::SetField { run, stage, entity, .. }) => {
                assert_eq!(run.key().doc_id(), "test-3");
                assert_eq!(stage, StageArg::Measure);
                assert_eq!(entity.as_deref(), Some("fridge_default_bluefors"));
            }
            _ => panic!("expected the set-field command"),
        }
    }
}
