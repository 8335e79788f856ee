pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "dealdesk",
    about = "Dealdesk operator CLI",
    long_about = "Prepare the sales database, inspect configuration, check readiness, and ask the sales agent from the terminal.",
    after_help = "Examples:\n  dealdesk migrate\n  dealdesk seed\n  dealdesk doctor --json\n  dealdesk ask --user-id 1 \"今月の商談状況は？\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo sales dataset (idempotent) and verify it")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model readiness, and database schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one agent query and print the answer with its progress events")]
    Ask {
        #[arg(long, help = "Sales user the question is asked as")]
        user_id: String,
        #[arg(long, help = "Load the demo dataset before asking")]
        seed: bool,
        query: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Ask { user_id, seed, query } => commands::ask::run(&user_id, &query, seed),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
