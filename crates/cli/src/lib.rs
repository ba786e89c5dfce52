pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stageflow",
    about = "Stageflow operator CLI",
    long_about = "Operate the Stageflow approval service: migrations, config inspection, readiness checks, and on-demand SLA sweeps.",
    after_help = "Examples:\n  stageflow migrate\n  stageflow doctor --json\n  stageflow sweep"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one escalation sweep against the configured database")]
    Sweep,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Sweep => commands::sweep::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
