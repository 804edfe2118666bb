// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Broker Port
//!
//! The publish/subscribe broker as seen by the alias core. Every call is a
//! suspension point and may fail; implementations live in
//! `crate::infrastructure` (the in-process broker) or outside this crate.
//!
//! Watches take a [`Handler`], a callback carrying a stable [`HandlerId`] so
//! that exactly the same subscription can later be removed again.

use crate::domain::payload::Payload;
use crate::domain::registration::Registration;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Broker call failures. Never masked by the alias core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker connection lost")]
    Disconnected,

    #[error("Broker rejected {operation} on {path}: {reason}")]
    Rejected {
        operation: &'static str,
        path: String,
        reason: String,
    },
}

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`Handler`], shared by all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Callback invoked with the path a notification arrived on and its argument.
pub struct Handler<T> {
    id: HandlerId,
    callback: Arc<dyn Fn(String, T) -> HandlerFuture + Send + Sync>,
}

/// Receives property values and event bodies.
pub type ValueHandler = Handler<Payload>;

/// Receives the registrations claimed at a path, or `None` when nothing is
/// registered there.
pub type RegistrationHandler = Handler<Option<Vec<Registration>>>;

impl<T> Handler<T> {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(String, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed)),
            callback: Arc::new(move |path, arg| Box::pin(callback(path, arg))),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn call(&self, path: impl Into<String>, arg: T) -> HandlerFuture {
        (self.callback)(path.into(), arg)
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: self.callback.clone(),
        }
    }
}

impl<T> PartialEq for Handler<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handler<T> {}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.id.0).finish()
    }
}

/// Publish/subscribe broker client.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Claim `path` with the given registration. Re-registering replaces the
    /// previous claim made by this client.
    async fn register(&self, path: &str, registration: &Registration) -> Result<(), BrokerError>;

    async fn unregister(&self, path: &str) -> Result<(), BrokerError>;

    async fn watch_property(&self, path: &str, handler: ValueHandler) -> Result<(), BrokerError>;

    async fn unwatch_property(&self, path: &str, handler: &ValueHandler) -> Result<(), BrokerError>;

    async fn set_property(&self, path: &str, value: Value) -> Result<(), BrokerError>;

    async fn delete_property(&self, path: &str) -> Result<(), BrokerError>;

    async fn watch_event(&self, path: &str, handler: ValueHandler) -> Result<(), BrokerError>;

    async fn unwatch_event(&self, path: &str, handler: &ValueHandler) -> Result<(), BrokerError>;

    async fn send_event(&self, path: &str, value: Payload) -> Result<(), BrokerError>;

    /// Watch registration changes at `path`.
    async fn watch_path(&self, path: &str, handler: RegistrationHandler) -> Result<(), BrokerError>;

    async fn unwatch_path(&self, path: &str, handler: &RegistrationHandler) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_handler_identity_survives_clone() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler: ValueHandler = Handler::new(move |_path, _payload| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let other: ValueHandler = Handler::new(|_path, _payload| async { Ok(()) });

        let clone = handler.clone();
        assert_eq!(clone, handler);
        assert_ne!(other, handler);

        clone.call("foo/target", Payload::NoValue).await.unwrap();
        handler.call("foo/target", Payload::NoValue).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
