// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0

//! # aliasd
//!
//! Offline management of the alias set kept in the alias cache file.
//!
//! Every edit runs through an embedded alias server bound to an in-process
//! broker, so it is validated, cycle checked and persisted exactly as a
//! request sent to a live server would be.
//!
//! ## Commands
//!
//! - `aliasd add <target> <alias>` - Add or replace an alias
//! - `aliasd remove <alias>` - Remove an alias
//! - `aliasd list` - Show the alias set
//! - `aliasd check` - Validate the cache file
//! - `aliasd config show|validate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use aliasd_cli::commands::{self, AddArgs, ConfigCommand, ConfigOverrides};

/// Manage path aliases
#[derive(Parser)]
#[command(name = "aliasd")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "ALIASD_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Prefix of the alias server's entry points
    #[arg(long, global = true, value_name = "PREFIX")]
    prefix: Option<String>,

    /// Alias cache file
    #[arg(long, global = true, value_name = "FILE")]
    cache_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ALIASD_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add or replace an alias
    #[command(name = "add")]
    Add {
        #[command(flatten)]
        args: AddArgs,
    },

    /// Remove an alias
    #[command(name = "remove")]
    Remove {
        /// Alias path to remove
        alias: String,
    },

    /// List all aliases
    #[command(name = "list")]
    List {
        /// Print the alias set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the cache file for errors and cycles
    #[command(name = "check")]
    Check,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let overrides = ConfigOverrides {
        prefix: cli.prefix,
        cache_file: cli.cache_file,
    };

    match cli.command {
        Commands::Config { command } => {
            commands::config::handle_command(command, cli.config, &overrides).await
        }
        Commands::Add { args } => {
            let config = commands::config::load(cli.config, &overrides)?;
            commands::alias::add(args, config).await
        }
        Commands::Remove { alias } => {
            let config = commands::config::load(cli.config, &overrides)?;
            commands::alias::remove(alias, config).await
        }
        Commands::List { json } => {
            let config = commands::config::load(cli.config, &overrides)?;
            commands::alias::list(config, json).await
        }
        Commands::Check => {
            let config = commands::config::load(cli.config, &overrides)?;
            commands::alias::check(config).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
