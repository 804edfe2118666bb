// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0

//! Alias management commands
//!
//! Commands: add, remove, list, check

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use aliasd_core::domain::{alias_set::AliasDefinition, config::ServerConfig};
use aliasd_core::infrastructure::cache::AliasCache;

use crate::embedded::EmbeddedServer;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Path being mirrored
    pub target: String,

    /// Path that mirrors the target
    pub alias: String,

    /// Expression turning a target value into an alias value
    #[arg(long)]
    pub transform: Option<String>,

    /// Expression turning an alias value into a target value
    #[arg(long)]
    pub inverse: Option<String>,

    /// Description of the alias (default: "Alias of <target>.")
    #[arg(short, long)]
    pub description: Option<String>,
}

impl AddArgs {
    pub fn to_definition(&self) -> AliasDefinition {
        let mut definition = AliasDefinition::new(&self.target, &self.alias);
        definition.transform = self.transform.clone();
        definition.inverse = self.inverse.clone();
        if let Some(description) = &self.description {
            definition.description = description.clone();
        }
        definition
    }
}

pub async fn add(args: AddArgs, config: ServerConfig) -> Result<()> {
    let definition = args.to_definition();
    let mut embedded = EmbeddedServer::start(config).await?;
    embedded
        .add(&definition)
        .await
        .with_context(|| format!("Failed to add alias {}", definition.alias))?;

    println!(
        "{}",
        format!("✓ {} → {}", definition.alias, definition.target).green()
    );
    Ok(())
}

pub async fn remove(alias: String, config: ServerConfig) -> Result<()> {
    let mut embedded = EmbeddedServer::start(config).await?;
    if !embedded.aliases().await.contains(&alias) {
        println!("{}", format!("No alias {}", alias).yellow());
        return Ok(());
    }
    embedded
        .remove(&alias)
        .await
        .with_context(|| format!("Failed to remove alias {}", alias))?;

    println!("{}", format!("✓ Removed {}", alias).green());
    Ok(())
}

pub async fn list(config: ServerConfig, json: bool) -> Result<()> {
    let aliases = EmbeddedServer::start(config).await?.aliases().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&aliases)?);
        return Ok(());
    }

    if aliases.is_empty() {
        println!("{}", "No aliases defined".dimmed());
        return Ok(());
    }
    for (alias, definition) in aliases.iter() {
        println!("{} → {}", alias.bold(), definition.target);
        if let Some(transform) = &definition.transform {
            println!("    transform: {}", transform);
        }
        if let Some(inverse) = &definition.inverse {
            println!("    inverse: {}", inverse);
        }
        println!("    {}", definition.description.dimmed());
    }
    Ok(())
}

/// Validate the cache file without starting a server.
pub async fn check(config: ServerConfig) -> Result<()> {
    let path = config
        .cache_file
        .context("No cache file configured (use --cache-file or ALIASD_CACHE_FILE)")?;
    let cache = AliasCache::new(path);
    let aliases = cache.load()?;

    if let Some(cycle) = aliases.find_cycle() {
        anyhow::bail!("Alias cycle detected: {}", cycle.join(" -> "));
    }

    println!(
        "{}",
        format!("✓ {}: {} aliases, no cycles", cache.path().display(), aliases.len()).green()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_args_defaults() {
        let args = AddArgs {
            target: "foo/target".to_string(),
            alias: "foo/alias".to_string(),
            transform: None,
            inverse: None,
            description: None,
        };
        assert_eq!(args.to_definition(), AliasDefinition::new("foo/target", "foo/alias"));
        assert_eq!(args.to_definition().description, "Alias of foo/target.");
    }

    #[tokio::test]
    async fn test_check_rejects_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aliases.json");
        let cyclic: aliasd_core::AliasSet =
            [AliasDefinition::new("a", "b"), AliasDefinition::new("b", "a")].into_iter().collect();
        AliasCache::new(&path).save(&cyclic).unwrap();

        let config = ServerConfig {
            cache_file: Some(path),
            ..ServerConfig::default()
        };
        let error = check(config).await.unwrap_err();
        assert!(error.to_string().contains("cycle"), "{error}");
    }
}
