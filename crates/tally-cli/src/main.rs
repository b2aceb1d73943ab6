//! Tally CLI - keep an expense ledger in sync with a GitHub repository.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::CommandContext;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::merge::run_merge;
use crate::commands::pull::run_pull;
use crate::commands::push::run_push;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::verify::run_verify;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn env_filter() -> EnvFilter {
    ["tally=info", "tally_core=info"]
        .into_iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let context = CommandContext::resolve(cli.profile.as_deref(), cli.ledger, cli.state_dir)?;

    match cli.command {
        Commands::Config { command } => run_config(command, &context)?,
        Commands::Verify { json } => run_verify(&context, json).await?,
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::Push { per_file, json } => run_push(&context, per_file, json).await?,
        Commands::Pull {
            days,
            replace,
            yes,
            json,
        } => run_pull(&context, days, replace, yes, json).await?,
        Commands::Merge { yes, json } => run_merge(&context, yes, json).await?,
        Commands::Sync {
            merge_on_conflict,
            json,
        } => run_sync(&context, merge_on_conflict, json).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
