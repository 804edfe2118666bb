// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Error Reporter
//!
//! Synchronous, fire-and-forget side channel for errors raised where nobody
//! can await a broker call, such as a transform failing while a value is
//! being forwarded. Messages are queued and a background task publishes them
//! on the server's `error` event.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Decouple error reporting from broker round-trips

use crate::domain::broker::Broker;
use crate::domain::payload::Payload;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct ErrorReporter {
    sender: mpsc::UnboundedSender<String>,
}

impl ErrorReporter {
    /// Create a reporter and the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue an error message. Never blocks and never fails; a message sent
    /// after the forwarder stopped is only logged.
    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "Alias error");
        if self.sender.send(message).is_err() {
            debug!("Error forwarder stopped, message dropped");
        }
    }

    /// Spawn the task publishing queued messages as events on `path`.
    ///
    /// The task ends once every reporter clone has been dropped.
    pub fn forward(
        mut receiver: mpsc::UnboundedReceiver<String>,
        broker: Arc<dyn Broker>,
        path: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if let Err(e) = broker.send_event(&path, Payload::Value(Value::String(message))).await {
                    error!(path = %path, error = %e, "Failed to publish error event");
                }
            }
            debug!(path = %path, "Error forwarder shut down");
        })
    }
}
