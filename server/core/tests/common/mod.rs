// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use aliasd_core::domain::broker::{Broker, BrokerError, HandlerId, RegistrationHandler, ValueHandler};
use aliasd_core::domain::payload::Payload;
use aliasd_core::domain::registration::Registration;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// One broker call as seen by [`RecordingBroker`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Register { path: String, registration: Registration },
    Unregister { path: String },
    WatchProperty { path: String, handler: HandlerId },
    UnwatchProperty { path: String, handler: HandlerId },
    SetProperty { path: String, value: Value },
    DeleteProperty { path: String },
    WatchEvent { path: String, handler: HandlerId },
    UnwatchEvent { path: String, handler: HandlerId },
    SendEvent { path: String, value: Payload },
    WatchPath { path: String, handler: HandlerId },
    UnwatchPath { path: String, handler: HandlerId },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::Register { .. } => "register",
            Call::Unregister { .. } => "unregister",
            Call::WatchProperty { .. } => "watch_property",
            Call::UnwatchProperty { .. } => "unwatch_property",
            Call::SetProperty { .. } => "set_property",
            Call::DeleteProperty { .. } => "delete_property",
            Call::WatchEvent { .. } => "watch_event",
            Call::UnwatchEvent { .. } => "unwatch_event",
            Call::SendEvent { .. } => "send_event",
            Call::WatchPath { .. } => "watch_path",
            Call::UnwatchPath { .. } => "unwatch_path",
        }
    }
}

/// Broker that records every call and otherwise does nothing. Each call
/// yields once so that concurrent callers interleave.
pub struct RecordingBroker {
    calls: Mutex<Vec<Call>>,
    watch_property_gate: Option<watch::Receiver<bool>>,
}

impl RecordingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            watch_property_gate: None,
        })
    }

    /// A broker whose `watch_property` calls block until `true` is sent on
    /// the returned sender.
    pub fn gated() -> (Arc<Self>, watch::Sender<bool>) {
        let (open, gate) = watch::channel(false);
        let broker = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            watch_property_gate: Some(gate),
        });
        (broker, open)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.name() == name).count()
    }

    pub fn calls_named(&self, name: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.name() == name)
            .cloned()
            .collect()
    }

    pub fn called_with(&self, call: &Call) -> bool {
        self.calls.lock().contains(call)
    }

    pub fn last_named(&self, name: &str) -> Option<Call> {
        self.calls_named(name).pop()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    async fn record(&self, call: Call) -> Result<(), BrokerError> {
        self.calls.lock().push(call);
        tokio::task::yield_now().await;
        Ok(())
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn register(&self, path: &str, registration: &Registration) -> Result<(), BrokerError> {
        self.record(Call::Register {
            path: path.to_string(),
            registration: registration.clone(),
        })
        .await
    }

    async fn unregister(&self, path: &str) -> Result<(), BrokerError> {
        self.record(Call::Unregister { path: path.to_string() }).await
    }

    async fn watch_property(&self, path: &str, handler: ValueHandler) -> Result<(), BrokerError> {
        self.calls.lock().push(Call::WatchProperty {
            path: path.to_string(),
            handler: handler.id(),
        });
        if let Some(gate) = &self.watch_property_gate {
            let mut gate = gate.clone();
            gate.wait_for(|open| *open)
                .await
                .map_err(|_| BrokerError::Disconnected)?;
        }
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn unwatch_property(&self, path: &str, handler: &ValueHandler) -> Result<(), BrokerError> {
        self.record(Call::UnwatchProperty {
            path: path.to_string(),
            handler: handler.id(),
        })
        .await
    }

    async fn set_property(&self, path: &str, value: Value) -> Result<(), BrokerError> {
        self.record(Call::SetProperty {
            path: path.to_string(),
            value,
        })
        .await
    }

    async fn delete_property(&self, path: &str) -> Result<(), BrokerError> {
        self.record(Call::DeleteProperty { path: path.to_string() }).await
    }

    async fn watch_event(&self, path: &str, handler: ValueHandler) -> Result<(), BrokerError> {
        self.record(Call::WatchEvent {
            path: path.to_string(),
            handler: handler.id(),
        })
        .await
    }

    async fn unwatch_event(&self, path: &str, handler: &ValueHandler) -> Result<(), BrokerError> {
        self.record(Call::UnwatchEvent {
            path: path.to_string(),
            handler: handler.id(),
        })
        .await
    }

    async fn send_event(&self, path: &str, value: Payload) -> Result<(), BrokerError> {
        self.record(Call::SendEvent {
            path: path.to_string(),
            value,
        })
        .await
    }

    async fn watch_path(&self, path: &str, handler: RegistrationHandler) -> Result<(), BrokerError> {
        self.record(Call::WatchPath {
            path: path.to_string(),
            handler: handler.id(),
        })
        .await
    }

    async fn unwatch_path(&self, path: &str, handler: &RegistrationHandler) -> Result<(), BrokerError> {
        self.record(Call::UnwatchPath {
            path: path.to_string(),
            handler: handler.id(),
        })
        .await
    }
}

/// Decode a registration as the broker would deliver it.
pub fn registration(value: Value) -> Registration {
    serde_json::from_value(value).expect("valid registration")
}
