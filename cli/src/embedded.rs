// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0

//! Embedded alias server
//!
//! Runs an `AliasServer` against an in-process broker so that offline edits
//! of the cache file go through the same validation, cycle checking and
//! persistence as requests sent to a running server.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use aliasd_core::{
    application::alias_server::AliasServer,
    domain::{
        alias_set::{AliasDefinition, AliasSet},
        broker::{Broker, Handler},
        config::ServerConfig,
        payload::Payload,
    },
    infrastructure::in_memory_broker::InMemoryBroker,
};

pub struct EmbeddedServer {
    hub: InMemoryBroker,
    server: Arc<AliasServer>,
    errors: mpsc::UnboundedReceiver<String>,
}

impl EmbeddedServer {
    pub async fn start(config: ServerConfig) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        if config.cache_file.is_none() {
            warn!("No cache file configured, changes will not be kept");
        }

        let hub = InMemoryBroker::new();

        // Collect everything the server reports
        let (sender, errors) = mpsc::unbounded_channel();
        hub.watch_event(
            &config.error_path(),
            Handler::new(move |_path, payload: Payload| {
                let sender = sender.clone();
                async move {
                    let message = match payload {
                        Payload::Value(Value::String(message)) => message,
                        Payload::Value(other) => other.to_string(),
                        Payload::NoValue => "unknown error".to_string(),
                    };
                    let _ = sender.send(message);
                    Ok(())
                }
            }),
        )
        .await?;

        let server = AliasServer::new(Arc::new(hub.client()), config);
        server
            .initialize()
            .await
            .context("Failed to start alias server")?;
        hub.settle().await;
        debug!("Embedded alias server started");

        Ok(Self { hub, server, errors })
    }

    pub async fn add(&mut self, definition: &AliasDefinition) -> Result<()> {
        let path = self.server.config().add_path();
        self.request(&path, serde_json::to_value(definition)?).await
    }

    pub async fn remove(&mut self, alias: &str) -> Result<()> {
        let path = self.server.config().remove_path();
        self.request(&path, Value::String(alias.to_string())).await
    }

    pub async fn aliases(&self) -> AliasSet {
        self.server.committed().await
    }

    /// Send a request event and fail with whatever errors it produced.
    async fn request(&mut self, path: &str, value: Value) -> Result<()> {
        self.hub.send_event(path, Payload::Value(value)).await?;
        self.hub.settle().await;

        let mut errors = Vec::new();
        while let Ok(message) = self.errors.try_recv() {
            errors.push(message);
        }
        if !errors.is_empty() {
            anyhow::bail!(errors.join("; "));
        }
        Ok(())
    }
}
