// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! In-Memory Broker
//!
//! A complete in-process implementation of the [`Broker`] port. It keeps
//! registrations, retained property values and watchers in one shared hub;
//! each [`InMemoryBroker`] handle is a separate client of that hub, so
//! registrations made through one handle are removed only through that handle.
//!
//! Notifications are never delivered from inside a broker call. They are
//! queued and run one at a time, in order, by a dispatcher task. A handler
//! may therefore call back into the broker, or wait on a lock held by a task
//! that is itself inside a broker call, without deadlocking.
//!
//! Used by the `aliasd` CLI for offline edits and by integration tests.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements the `Broker` port in process

use crate::domain::broker::{Broker, BrokerError, Handler, RegistrationHandler, ValueHandler};
use crate::domain::payload::Payload;
use crate::domain::registration::{Registration, WatchKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error};

type ClientId = u64;

enum Notification {
    Value {
        handler: ValueHandler,
        path: String,
        payload: Payload,
    },
    Registration {
        handler: RegistrationHandler,
        path: String,
        registrations: Option<Vec<Registration>>,
    },
}

#[derive(Default)]
struct HubState {
    registrations: HashMap<String, Vec<(ClientId, Registration)>>,
    properties: HashMap<String, Value>,
    property_watchers: HashMap<String, Vec<ValueHandler>>,
    event_watchers: HashMap<String, Vec<ValueHandler>>,
    path_watchers: HashMap<String, Vec<RegistrationHandler>>,
}

impl HubState {
    fn registrations_at(&self, path: &str) -> Option<Vec<Registration>> {
        self.registrations
            .get(path)
            .filter(|entries| !entries.is_empty())
            .map(|entries| entries.iter().map(|(_, r)| r.clone()).collect())
    }
}

/// Outstanding notification count, shared with the dispatcher.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

struct Hub {
    state: Mutex<HubState>,
    queue: mpsc::UnboundedSender<Notification>,
    pending: Arc<Pending>,
    next_client: AtomicU64,
}

impl Hub {
    fn enqueue(&self, notification: Notification) {
        self.pending.count.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(notification).is_err() {
            self.pending.finish_one();
        }
    }

    fn notify_values(&self, handlers: Vec<ValueHandler>, path: &str, payload: Payload) {
        for handler in handlers {
            self.enqueue(Notification::Value {
                handler,
                path: path.to_string(),
                payload: payload.clone(),
            });
        }
    }

    fn notify_registrations(&self, handlers: Vec<RegistrationHandler>, path: &str, registrations: Option<Vec<Registration>>) {
        for handler in handlers {
            self.enqueue(Notification::Registration {
                handler,
                path: path.to_string(),
                registrations: registrations.clone(),
            });
        }
    }
}

impl Pending {
    fn finish_one(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// One client connection to an in-process broker hub.
pub struct InMemoryBroker {
    hub: Arc<Hub>,
    client: ClientId,
}

impl InMemoryBroker {
    /// Create a new hub and return its first client.
    ///
    /// Must be called within a Tokio runtime: the dispatcher task is spawned
    /// here and runs until every client of the hub has been dropped.
    pub fn new() -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(Pending::default());
        tokio::spawn(dispatch(receiver, pending.clone()));
        Self {
            hub: Arc::new(Hub {
                state: Mutex::new(HubState::default()),
                queue,
                pending,
                next_client: AtomicU64::new(2),
            }),
            client: 1,
        }
    }

    /// Another client of the same hub.
    pub fn client(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            client: self.hub.next_client.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Wait until every queued notification, including those queued by
    /// handlers while this call waits, has been delivered.
    pub async fn settle(&self) {
        loop {
            let idle = self.hub.pending.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.hub.pending.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Current retained value of a property.
    pub fn property(&self, path: &str) -> Option<Value> {
        self.hub.state.lock().properties.get(path).cloned()
    }

    /// Registrations currently claimed at `path`, by any client.
    pub fn registrations(&self, path: &str) -> Option<Vec<Registration>> {
        self.hub.state.lock().registrations_at(path)
    }

    fn rejected(operation: &'static str, path: &str, reason: impl ToString) -> BrokerError {
        BrokerError::Rejected {
            operation,
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryBroker {
    fn drop(&mut self) {
        // Registrations die with the client connection, without
        // unregister-time semantics.
        let mut state = self.hub.state.lock();
        let client = self.client;
        let mut changed = Vec::new();
        for (path, entries) in state.registrations.iter_mut() {
            let before = entries.len();
            entries.retain(|(owner, _)| *owner != client);
            if entries.len() != before {
                changed.push(path.clone());
            }
        }
        for path in changed {
            let registrations = state.registrations_at(&path);
            let watchers = state.path_watchers.get(&path).cloned().unwrap_or_default();
            self.hub.notify_registrations(watchers, &path, registrations);
        }
    }
}

async fn dispatch(mut receiver: mpsc::UnboundedReceiver<Notification>, pending: Arc<Pending>) {
    while let Some(notification) = receiver.recv().await {
        let (path, result) = match notification {
            Notification::Value { handler, path, payload } => {
                let result = handler.call(path.clone(), payload).await;
                (path, result)
            }
            Notification::Registration {
                handler,
                path,
                registrations,
            } => {
                let result = handler.call(path.clone(), registrations).await;
                (path, result)
            }
        };
        if let Err(e) = result {
            error!(path = %path, error = %e, "Notification handler failed");
        }
        pending.finish_one();
    }
    debug!("In-memory broker dispatcher stopped");
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn register(&self, path: &str, registration: &Registration) -> Result<(), BrokerError> {
        registration
            .validate()
            .map_err(|e| Self::rejected("register", path, e))?;

        let mut state = self.hub.state.lock();
        let entries = state.registrations.entry(path.to_string()).or_default();
        match entries.iter_mut().find(|(owner, _)| *owner == self.client) {
            Some((_, existing)) if existing == registration => return Ok(()),
            Some((_, existing)) => *existing = registration.clone(),
            None => entries.push((self.client, registration.clone())),
        }
        debug!(path = %path, client = self.client, behaviour = %registration.behaviour, "Registered");

        let registrations = state.registrations_at(path);
        let watchers = state.path_watchers.get(path).cloned().unwrap_or_default();
        self.hub.notify_registrations(watchers, path, registrations);
        Ok(())
    }

    async fn unregister(&self, path: &str) -> Result<(), BrokerError> {
        let mut state = self.hub.state.lock();
        let Some(entries) = state.registrations.get_mut(path) else {
            return Ok(());
        };
        let Some(index) = entries.iter().position(|(owner, _)| *owner == self.client) else {
            return Ok(());
        };
        let (_, removed) = entries.remove(index);
        if entries.is_empty() {
            state.registrations.remove(path);
        }
        debug!(path = %path, client = self.client, "Unregistered");

        let registrations = state.registrations_at(path);
        let watchers = state.path_watchers.get(path).cloned().unwrap_or_default();
        self.hub.notify_registrations(watchers, path, registrations);

        if let Some(value) = removed.on_unregister.clone() {
            match removed.behaviour.watch_kind() {
                Some(WatchKind::Property) => {
                    state.properties.insert(path.to_string(), value.clone());
                    let watchers = state.property_watchers.get(path).cloned().unwrap_or_default();
                    self.hub.notify_values(watchers, path, Payload::Value(value));
                }
                Some(WatchKind::Event) => {
                    let watchers = state.event_watchers.get(path).cloned().unwrap_or_default();
                    self.hub.notify_values(watchers, path, Payload::Value(value));
                }
                None => {}
            }
        }
        if removed.deletes_on_unregister() && state.properties.remove(path).is_some() {
            let watchers = state.property_watchers.get(path).cloned().unwrap_or_default();
            self.hub.notify_values(watchers, path, Payload::NoValue);
        }
        Ok(())
    }

    async fn watch_property(&self, path: &str, handler: ValueHandler) -> Result<(), BrokerError> {
        let mut state = self.hub.state.lock();
        if let Some(value) = state.properties.get(path).cloned() {
            self.hub.notify_values(vec![handler.clone()], path, Payload::Value(value));
        }
        state.property_watchers.entry(path.to_string()).or_default().push(handler);
        Ok(())
    }

    async fn unwatch_property(&self, path: &str, handler: &ValueHandler) -> Result<(), BrokerError> {
        remove_handler(&mut self.hub.state.lock().property_watchers, path, handler);
        Ok(())
    }

    async fn set_property(&self, path: &str, value: Value) -> Result<(), BrokerError> {
        let mut state = self.hub.state.lock();
        state.properties.insert(path.to_string(), value.clone());
        let watchers = state.property_watchers.get(path).cloned().unwrap_or_default();
        self.hub.notify_values(watchers, path, Payload::Value(value));
        Ok(())
    }

    async fn delete_property(&self, path: &str) -> Result<(), BrokerError> {
        let mut state = self.hub.state.lock();
        state.properties.remove(path);
        let watchers = state.property_watchers.get(path).cloned().unwrap_or_default();
        self.hub.notify_values(watchers, path, Payload::NoValue);
        Ok(())
    }

    async fn watch_event(&self, path: &str, handler: ValueHandler) -> Result<(), BrokerError> {
        self.hub
            .state
            .lock()
            .event_watchers
            .entry(path.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn unwatch_event(&self, path: &str, handler: &ValueHandler) -> Result<(), BrokerError> {
        remove_handler(&mut self.hub.state.lock().event_watchers, path, handler);
        Ok(())
    }

    async fn send_event(&self, path: &str, value: Payload) -> Result<(), BrokerError> {
        let state = self.hub.state.lock();
        let watchers = state.event_watchers.get(path).cloned().unwrap_or_default();
        self.hub.notify_values(watchers, path, value);
        Ok(())
    }

    async fn watch_path(&self, path: &str, handler: RegistrationHandler) -> Result<(), BrokerError> {
        let mut state = self.hub.state.lock();
        let registrations = state.registrations_at(path);
        self.hub.notify_registrations(vec![handler.clone()], path, registrations);
        state.path_watchers.entry(path.to_string()).or_default().push(handler);
        Ok(())
    }

    async fn unwatch_path(&self, path: &str, handler: &RegistrationHandler) -> Result<(), BrokerError> {
        remove_handler(&mut self.hub.state.lock().path_watchers, path, handler);
        Ok(())
    }
}

/// Remove one subscription of `handler` at `path`.
fn remove_handler<T>(watchers: &mut HashMap<String, Vec<Handler<T>>>, path: &str, handler: &Handler<T>) {
    if let Some(handlers) = watchers.get_mut(path) {
        if let Some(index) = handlers.iter().position(|h| h == handler) {
            handlers.remove(index);
        }
        if handlers.is_empty() {
            watchers.remove(path);
        }
    }
}
