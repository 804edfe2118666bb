// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aliasd_core::domain::config::ServerConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

/// Settings given on the command line. They win over the file and the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub prefix: Option<String>,
    pub cache_file: Option<PathBuf>,
}

/// Load the configuration and apply command line overrides.
pub fn load(config_path: Option<PathBuf>, overrides: &ConfigOverrides) -> Result<ServerConfig> {
    let mut config = ServerConfig::load_or_default(config_path).context("Failed to load configuration")?;
    if let Some(prefix) = &overrides.prefix {
        config.prefix = prefix.clone();
    }
    if let Some(cache_file) = &overrides.cache_file {
        config.cache_file = Some(cache_file.clone());
    }
    Ok(config)
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
    overrides: &ConfigOverrides,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, overrides, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override), overrides).await,
    }
}

async fn show(config_override: Option<PathBuf>, overrides: &ConfigOverrides, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. ALIASD_CONFIG_PATH: {}",
            std::env::var("ALIASD_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aliasd.yaml");
        println!();
    }

    let config = load(config_override, overrides)?;

    println!("{}", "Current configuration:".bold());
    println!();
    println!("  Prefix: {}", config.prefix);
    match &config.cache_file {
        Some(path) => println!("  Cache file: {}", path.display()),
        None => println!("  Cache file: {}", "(none)".dimmed()),
    }
    println!();

    println!("{}", "Entry points:".bold());
    println!("  {}  {}", config.add_path(), "EVENT-N:1".dimmed());
    println!("  {}  {}", config.remove_path(), "EVENT-N:1".dimmed());
    println!("  {}  {}", config.aliases_path(), "PROPERTY-1:N".dimmed());
    println!("  {}  {}", config.error_path(), "EVENT-1:N".dimmed());
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>, overrides: &ConfigOverrides) -> Result<()> {
    println!("Validating configuration...");

    let config = load(config_path, overrides)?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}
