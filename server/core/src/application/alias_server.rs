// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Alias Server
//!
//! Owns every live [`Alias`] and the committed [`AliasSet`] they were built
//! from. Clients edit the set through three entry points under the
//! configured prefix:
//!
//! | Path | Behaviour | Payload |
//! |------|-----------|---------|
//! | `add` | `EVENT-N:1` | `[target, alias]` or `{target, alias, transform?, inverse?, description?}` |
//! | `remove` | `EVENT-N:1` | alias path |
//! | `aliases` | `PROPERTY-1:N` | the complete set, replaced wholesale |
//! | `error` | `EVENT-1:N` | human readable error messages |
//!
//! Every edit goes through [`AliasServer::update`], which holds the server
//! lock for the whole check, diff, apply and publish sequence, so concurrent
//! edits are applied one after another.
//!
//! The server watches its own `aliases` property, so each publication comes
//! back through [`AliasServer::on_change`]. Those echoes are matched against
//! the publications still in flight and dropped; applying one that arrives
//! after a newer commit would revert that commit.

use crate::application::alias::Alias;
use crate::application::error_reporter::ErrorReporter;
use crate::domain::alias_set::{alias_path_from_remove_request, AliasDefinition, AliasSet};
use crate::domain::broker::{Broker, BrokerError, Handler, ValueHandler};
use crate::domain::config::ServerConfig;
use crate::domain::payload::Payload;
use crate::domain::registration::{Behaviour, Cardinality, Registration};
use crate::infrastructure::cache::{AliasCache, CacheError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum AliasServerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone)]
struct ServerHandlers {
    add: ValueHandler,
    remove: ValueHandler,
    change: ValueHandler,
}

#[derive(Debug, Default)]
struct ServerState {
    aliases: HashMap<String, Arc<Alias>>,
    /// Definitions of the live aliases.
    committed: AliasSet,
    /// Last value written to the `aliases` property.
    published: Option<AliasSet>,
    /// Values written to the `aliases` property whose echo has not arrived.
    unechoed: VecDeque<AliasSet>,
}

/// Bound on [`ServerState::unechoed`] for brokers that never echo writes.
const MAX_UNECHOED: usize = 16;

impl ServerState {
    fn record_publish(&mut self, set: AliasSet) {
        if self.unechoed.len() == MAX_UNECHOED {
            self.unechoed.pop_front();
        }
        self.unechoed.push_back(set.clone());
        self.published = Some(set);
    }

    /// Consume the echo of an earlier publication. Echoes arrive in publish
    /// order, so anything published before the match is dropped too.
    fn consume_echo(&mut self, set: &AliasSet) -> bool {
        match self.unechoed.iter().position(|published| published == set) {
            Some(index) => {
                self.unechoed.drain(..=index);
                true
            }
            None => false,
        }
    }
}

pub struct AliasServer {
    broker: Arc<dyn Broker>,
    config: ServerConfig,
    cache: Option<AliasCache>,
    errors: ErrorReporter,
    error_queue: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    forwarder: parking_lot::Mutex<Option<JoinHandle<()>>>,
    handlers: ServerHandlers,
    state: Mutex<ServerState>,
}

impl AliasServer {
    pub fn new(broker: Arc<dyn Broker>, config: ServerConfig) -> Arc<Self> {
        let (errors, error_queue) = ErrorReporter::channel();
        let cache = config.cache_file.clone().map(AliasCache::new);
        Arc::new_cyclic(|weak: &Weak<AliasServer>| Self {
            handlers: ServerHandlers {
                add: request_handler(weak.clone(), Request::Add),
                remove: request_handler(weak.clone(), Request::Remove),
                change: request_handler(weak.clone(), Request::Change),
            },
            broker,
            config,
            cache,
            errors,
            error_queue: parking_lot::Mutex::new(Some(error_queue)),
            forwarder: parking_lot::Mutex::new(None),
            state: Mutex::new(ServerState::default()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register the entry points, start listening and install the cached set.
    pub async fn initialize(&self) -> Result<(), AliasServerError> {
        let initial = self.load_cache().await;

        let entries = [
            (
                self.config.add_path(),
                Behaviour::Event(Cardinality::ManyToOne),
                "Add an alias: [target, alias] or {target, alias, transform, inverse, description}.",
            ),
            (
                self.config.remove_path(),
                Behaviour::Event(Cardinality::ManyToOne),
                "Remove the alias with the given path.",
            ),
            (
                self.config.aliases_path(),
                Behaviour::Property(Cardinality::OneToMany),
                "All aliases, keyed by alias path. May be replaced wholesale.",
            ),
            (
                self.config.error_path(),
                Behaviour::Event(Cardinality::OneToMany),
                "Errors raised while handling alias requests.",
            ),
        ];
        for (path, behaviour, description) in entries {
            self.broker
                .register(&path, &Registration::new(behaviour, description))
                .await?;
        }

        self.broker
            .watch_event(&self.config.add_path(), self.handlers.add.clone())
            .await?;
        self.broker
            .watch_event(&self.config.remove_path(), self.handlers.remove.clone())
            .await?;
        self.broker
            .watch_property(&self.config.aliases_path(), self.handlers.change.clone())
            .await?;

        let queue = self.error_queue.lock().take();
        if let Some(queue) = queue {
            let forwarder = ErrorReporter::forward(queue, self.broker.clone(), self.config.error_path());
            *self.forwarder.lock() = Some(forwarder);
        }

        info!(prefix = %self.config.prefix, aliases = initial.len(), "Alias server started");
        self.update(initial).await
    }

    async fn load_cache(&self) -> AliasSet {
        let Some(cache) = &self.cache else {
            return AliasSet::new();
        };
        match cache.load_async().await {
            Ok(set) => {
                debug!(path = ?cache.path(), aliases = set.len(), "Loaded alias cache");
                set
            }
            Err(e) if e.is_corrupt() => {
                match cache.set_aside_async().await {
                    Ok(moved) => warn!(error = %e, moved_to = ?moved, "Corrupt alias cache moved aside"),
                    Err(rename) => warn!(error = %e, rename_error = %rename, "Ignoring corrupt alias cache"),
                }
                AliasSet::new()
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable alias cache");
                AliasSet::new()
            }
        }
    }

    /// Handle an `add` request.
    pub async fn on_add(&self, payload: Payload) -> Result<(), AliasServerError> {
        match AliasDefinition::from_add_request(&payload) {
            Ok(definition) => self.apply(move |set| set.upsert(definition)).await,
            Err(e) => self.reject(e.to_string()).await,
        }
    }

    /// Handle a `remove` request.
    pub async fn on_remove(&self, payload: Payload) -> Result<(), AliasServerError> {
        match alias_path_from_remove_request(&payload) {
            Ok(alias) => {
                self.apply(move |set| {
                    set.remove(&alias);
                })
                .await
            }
            Err(e) => self.reject(e.to_string()).await,
        }
    }

    /// Handle a new value of the `aliases` property.
    pub async fn on_change(&self, payload: Payload) -> Result<(), AliasServerError> {
        let Payload::Value(value) = payload else {
            debug!("Aliases property deleted, ignoring");
            return Ok(());
        };
        let proposed = match AliasSet::from_value(&value) {
            Ok(set) => set,
            Err(e) => return self.reject(e.to_string()).await,
        };

        let mut state = self.state.lock().await;
        if state.consume_echo(&proposed) {
            debug!(aliases = proposed.len(), "Ignoring echo of published alias set");
            return Ok(());
        }
        self.commit(&mut state, proposed).await
    }

    /// Edit a copy of the committed set and commit the result.
    async fn apply(&self, edit: impl FnOnce(&mut AliasSet)) -> Result<(), AliasServerError> {
        let mut state = self.state.lock().await;
        let mut proposed = state.committed.clone();
        edit(&mut proposed);
        self.commit(&mut state, proposed).await
    }

    /// Replace the alias set with `proposed`.
    ///
    /// A set containing a cycle is rejected as a whole: an error event is
    /// sent and the committed set is published again.
    pub async fn update(&self, proposed: AliasSet) -> Result<(), AliasServerError> {
        let mut state = self.state.lock().await;
        self.commit(&mut state, proposed).await
    }

    async fn commit(&self, state: &mut ServerState, proposed: AliasSet) -> Result<(), AliasServerError> {
        if let Some(cycle) = proposed.find_cycle() {
            self.reject(format!("Alias cycle detected: {}", cycle.join(" -> "))).await?;
            // Restore the property in case the cycle was written to it directly.
            let committed = state.committed.clone();
            state.record_publish(committed.clone());
            self.broker
                .set_property(&self.config.aliases_path(), committed.to_value())
                .await?;
            return Ok(());
        }

        let removed: Vec<String> = state
            .committed
            .keys()
            .filter(|alias| !proposed.contains(alias))
            .cloned()
            .collect();
        for key in removed {
            state.committed.remove(&key);
            if let Some(alias) = state.aliases.remove(&key) {
                alias.delete().await?;
                info!(alias = %key, "Alias removed");
            }
        }

        for (key, definition) in proposed.iter() {
            if state.committed.get(key) == Some(definition) {
                continue;
            }
            // Definitions are never edited in place.
            if let Some(previous) = state.aliases.remove(key) {
                state.committed.remove(key);
                previous.delete().await?;
            }
            let alias = Alias::new(definition.clone(), self.broker.clone(), self.errors.clone());
            alias.initialize().await?;
            state.aliases.insert(key.clone(), alias);
            state.committed.upsert(definition.clone());
            info!(alias = %key, target_path = %definition.target, "Alias installed");
        }

        if state.published.as_ref() != Some(&state.committed) {
            let committed = state.committed.clone();
            state.record_publish(committed.clone());
            self.broker
                .set_property(&self.config.aliases_path(), committed.to_value())
                .await?;
            self.save_cache(committed).await?;
        }
        Ok(())
    }

    async fn save_cache(&self, set: AliasSet) -> Result<(), AliasServerError> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        if let Err(e) = cache.save_async(set).await {
            error!(error = %e, "Failed to write alias cache");
            self.send_error(e.to_string()).await?;
        }
        Ok(())
    }

    /// Report a rejected request on the error event.
    async fn reject(&self, message: String) -> Result<(), AliasServerError> {
        warn!(error = %message, "Rejected alias request");
        self.send_error(message).await
    }

    async fn send_error(&self, message: String) -> Result<(), AliasServerError> {
        self.broker
            .send_event(&self.config.error_path(), Payload::Value(Value::String(message)))
            .await?;
        Ok(())
    }

    /// The live alias for `alias_path`, if any.
    pub async fn alias(&self, alias_path: &str) -> Option<Arc<Alias>> {
        self.state.lock().await.aliases.get(alias_path).cloned()
    }

    /// Snapshot of the committed alias set.
    pub async fn committed(&self) -> AliasSet {
        self.state.lock().await.committed.clone()
    }

    /// Withdraw the entry points and delete every alias.
    pub async fn close(&self) -> Result<(), AliasServerError> {
        let mut state = self.state.lock().await;

        self.broker
            .unwatch_event(&self.config.add_path(), &self.handlers.add)
            .await?;
        self.broker
            .unwatch_event(&self.config.remove_path(), &self.handlers.remove)
            .await?;
        self.broker
            .unwatch_property(&self.config.aliases_path(), &self.handlers.change)
            .await?;

        for path in [
            self.config.add_path(),
            self.config.remove_path(),
            self.config.aliases_path(),
            self.config.error_path(),
        ] {
            self.broker.unregister(&path).await?;
        }
        self.broker.delete_property(&self.config.aliases_path()).await?;

        for (_, alias) in state.aliases.drain() {
            alias.delete().await?;
        }
        state.committed = AliasSet::new();
        state.published = None;
        state.unechoed.clear();

        let forwarder = self.forwarder.lock().take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        info!(prefix = %self.config.prefix, "Alias server closed");
        Ok(())
    }
}

impl std::fmt::Debug for AliasServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasServer")
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
enum Request {
    Add,
    Remove,
    Change,
}

fn request_handler(server: Weak<AliasServer>, request: Request) -> ValueHandler {
    Handler::new(move |_path, payload| {
        let server = server.clone();
        async move {
            let Some(server) = server.upgrade() else {
                return Ok(());
            };
            match request {
                Request::Add => server.on_add(payload).await?,
                Request::Remove => server.on_remove(payload).await?,
                Request::Change => server.on_change(payload).await?,
            }
            Ok(())
        }
    })
}
