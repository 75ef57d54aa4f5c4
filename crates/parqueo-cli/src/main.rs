//! Parqueo CLI - Visitor parking log from the command line
//!
//! Registers entries online or offline and replays offline work once the
//! remote store is reachable again.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_config_path, resolve_db_path, Context};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::list::run_list;
use crate::commands::queue::run_queue;
use crate::commands::register::{run_register, RegisterArgs};
use crate::commands::sync::run_sync;
use crate::commands::units::run_units;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "parqueo=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = Context {
        offline: cli.offline,
        db_path: resolve_db_path(cli.db_path)?,
        config_path: resolve_config_path(cli.config_path)?,
    };

    match cli.command {
        Commands::Register {
            plate,
            property,
            unit,
            vehicle,
            free,
            note,
            entered_at,
            photo,
            audio,
        } => {
            let args = RegisterArgs {
                plate,
                property,
                unit,
                vehicle,
                free,
                note,
                entered_at,
                photo,
                audio,
            };
            run_register(args, &context).await?;
        }
        Commands::List {
            property,
            unit,
            limit,
            json,
        } => run_list(property, unit, limit, json, &context).await?,
        Commands::Edit {
            id,
            plate,
            vehicle,
            entered_at,
            note,
            property,
            unit,
            free,
            collected,
            collected_on,
            audio,
            remove_audio,
        } => {
            let args = EditArgs {
                plate,
                vehicle,
                entered_at,
                note,
                property,
                unit,
                free,
                collected,
                collected_on,
                audio,
                remove_audio,
            };
            run_edit(&id, args, &context).await?;
        }
        Commands::Delete { id } => run_delete(&id, &context).await?,
        Commands::Units => run_units(&context).await?,
        Commands::Queue { json } => run_queue(json, &context)?,
        Commands::Sync { watch } => run_sync(watch, &context).await?,
        Commands::Config { command } => run_config(command, &context.config_path)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
