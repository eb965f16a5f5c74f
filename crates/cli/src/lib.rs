pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "chokepoint",
    about = "Chokepoint operator CLI",
    long_about = "Inspect configuration, check runtime readiness, and move saved analyses between sessions.",
    after_help = "Examples:\n  chokepoint doctor --json\n  chokepoint config\n  chokepoint export --state session.json --out analysis.json\n  chokepoint import --state session.json analysis.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, prompt templates, model client and state file readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
        #[arg(long, help = "Session state file to check for readability")]
        state: Option<PathBuf>,
    },
    #[command(about = "Write one improvement point, or the whole analysis, to an export file")]
    Export {
        #[arg(long, help = "Session state file to read")]
        state: PathBuf,
        #[arg(long, help = "Export only this bottleneck id")]
        bottleneck: Option<String>,
        #[arg(long, help = "Destination file (defaults to a dated name in the working directory)")]
        out: Option<PathBuf>,
    },
    #[command(about = "Validate an export file and merge it into a session state file")]
    Import {
        #[arg(long, help = "Session state file to update")]
        state: PathBuf,
        #[arg(help = "Export file to import")]
        file: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json, state } => commands::doctor::run(json, state.as_deref()),
        Command::Export { state, bottleneck, out } => {
            commands::export::run(&state, bottleneck.as_deref(), out.as_deref())
        }
        Command::Import { state, file } => commands::import::run(&state, &file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
