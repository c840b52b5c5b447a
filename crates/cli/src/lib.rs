pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "priceye",
    about = "PricEye operator CLI",
    long_about = "Operate PricEye migrations, readiness checks, demo fixtures, and pricing runs.",
    after_help = "Examples:\n  priceye doctor --json\n  priceye migrate\n  priceye apply --tenant T-DEMO --entity property:P-DEMO-1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo fixtures for local development")]
    Seed,
    #[command(about = "Validate config, LLM credential readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one scheduler tick for every tenant, or a single tenant")]
    Tick {
        #[arg(long, help = "Restrict the tick to one tenant")]
        tenant: Option<String>,
        #[arg(long, help = "Re-run entities that already generated today")]
        force: bool,
    },
    #[command(about = "Run the pricing pipeline for one entity and push the result to the PMS")]
    Apply {
        #[arg(long, help = "Tenant that owns the entity")]
        tenant: String,
        #[arg(long, help = "Entity reference, `property:<id>` or `group:<id>`")]
        entity: String,
        #[arg(long, help = "Regenerate even if the horizon was already generated today")]
        force: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Tick { tenant, force } => commands::tick::run(tenant.as_deref(), force),
        Command::Apply { tenant, entity, force } => commands::apply::run(&tenant, &entity, force),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
