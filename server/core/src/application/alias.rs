// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Alias Registration State Machine
//!
//! One [`Alias`] mirrors one target path onto one alias path. It watches the
//! registrations claimed at the target and, for every change, re-derives the
//! alias registration and (re)installs it together with the matching value
//! watches on both paths.
//!
//! ## Concurrency
//!
//! Registration notifications are not serialized: a handler invocation may
//! still be awaiting the broker when the next one arrives. Every accepted
//! change bumps `revision`. Before each broker step an invocation checks the
//! revision it captured, and a superseded invocation stops without side
//! effects. The final broker state therefore always matches the latest
//! observed registration and superseded intermediate states never cause an
//! unregister.
//!
//! Watch flags are updated in the same step that issues the paired
//! target/alias (un)watch calls, so they always describe the calls issued.
//!
//! ## Value Forwarding
//!
//! | Notification | Forwarded as |
//! |--------------|--------------|
//! | target property set | alias property set, through `transform` |
//! | target event sent | alias event sent, through `transform` |
//! | alias property set | target property set, through `inverse` |
//! | alias event sent | target event sent, through `inverse` |
//!
//! A notification carrying exactly the value this alias last wrote to that
//! path is its own echo: it is consumed once and not forwarded back.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Per-alias registration tracking and value forwarding

use crate::application::error_reporter::ErrorReporter;
use crate::domain::alias_set::AliasDefinition;
use crate::domain::broker::{Broker, BrokerError, Handler, RegistrationHandler, ValueHandler};
use crate::domain::expression;
use crate::domain::payload::Payload;
use crate::domain::registration::{select_effective, Registration, WatchKind};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// The callbacks an alias hands to the broker.
#[derive(Debug, Clone)]
pub struct AliasHandlers {
    pub registration: RegistrationHandler,
    pub target_set: ValueHandler,
    pub target_sent: ValueHandler,
    pub alias_set: ValueHandler,
    pub alias_sent: ValueHandler,
}

#[derive(Debug, Default)]
struct AliasState {
    /// Bumped on every accepted registration change and on delete.
    revision: u64,
    target_registration: Option<Registration>,
    alias_registration: Option<Registration>,
    /// Value watch installed on both paths.
    watching: Option<WatchKind>,
    /// A register call has been issued and not yet undone.
    registered: bool,
    deleted: bool,
    /// Last value written to the alias path by this alias.
    echo_on_alias: Option<Payload>,
    /// Last value written to the target path by this alias.
    echo_on_target: Option<Payload>,
}

/// Which end of the mapping a value is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Target,
    Alias,
}

pub struct Alias {
    definition: AliasDefinition,
    broker: Arc<dyn Broker>,
    errors: ErrorReporter,
    handlers: AliasHandlers,
    state: Mutex<AliasState>,
}

impl Alias {
    pub fn new(definition: AliasDefinition, broker: Arc<dyn Broker>, errors: ErrorReporter) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Alias>| Self {
            handlers: AliasHandlers {
                registration: registration_handler(weak.clone()),
                target_set: value_handler(weak.clone(), WatchKind::Property, Side::Alias),
                target_sent: value_handler(weak.clone(), WatchKind::Event, Side::Alias),
                alias_set: value_handler(weak.clone(), WatchKind::Property, Side::Target),
                alias_sent: value_handler(weak.clone(), WatchKind::Event, Side::Target),
            },
            definition,
            broker,
            errors,
            state: Mutex::new(AliasState::default()),
        })
    }

    pub fn definition(&self) -> &AliasDefinition {
        &self.definition
    }

    pub fn handlers(&self) -> &AliasHandlers {
        &self.handlers
    }

    pub fn target_registration(&self) -> Option<Registration> {
        self.state.lock().target_registration.clone()
    }

    pub fn alias_registration(&self) -> Option<Registration> {
        self.state.lock().alias_registration.clone()
    }

    pub fn watching_property(&self) -> bool {
        self.state.lock().watching == Some(WatchKind::Property)
    }

    pub fn watching_event(&self) -> bool {
        self.state.lock().watching == Some(WatchKind::Event)
    }

    /// Start following the target's registrations. Nothing is registered
    /// until the first notification arrives.
    pub async fn initialize(&self) -> Result<(), BrokerError> {
        debug!(target_path = %self.definition.target, alias = %self.definition.alias, "Watching alias target");
        self.broker
            .watch_path(&self.definition.target, self.handlers.registration.clone())
            .await
    }

    /// React to the current set of registrations claimed at the target.
    pub async fn on_target_registration_changed(
        &self,
        registrations: Option<Vec<Registration>>,
    ) -> Result<(), BrokerError> {
        let effective = select_effective(registrations.as_deref());

        let (revision, alias_registration) = {
            let mut state = self.state.lock();
            if state.deleted || state.target_registration == effective {
                return Ok(());
            }
            state.revision += 1;
            state.alias_registration = effective.as_ref().map(|r| self.derive_registration(r));
            state.target_registration = effective;
            (state.revision, state.alias_registration.clone())
        };

        debug!(
            alias = %self.definition.alias,
            revision,
            behaviour = ?alias_registration.as_ref().map(|r| r.behaviour),
            "Target registration changed"
        );

        // A vanished registration keeps its watch in place.
        if let Some(kind) = alias_registration.as_ref().and_then(|r| r.behaviour.watch_kind()) {
            let installed = self.state.lock().watching;
            if installed != Some(kind) {
                let Some(previous) = self.if_current(revision, |state| state.watching.take()) else {
                    return Ok(());
                };
                if let Some(previous) = previous {
                    self.unwatch_pair(previous).await?;
                }

                if self.if_current(revision, |state| state.watching = Some(kind)).is_none() {
                    return Ok(());
                }
                self.watch_pair(kind).await?;
            }
        }

        match alias_registration {
            Some(registration) => {
                if self.if_current(revision, |state| state.registered = true).is_none() {
                    return Ok(());
                }
                self.broker.register(&self.definition.alias, &registration).await?;
                info!(alias = %self.definition.alias, behaviour = %registration.behaviour, "Alias registered");
            }
            None => {
                let Some(was_registered) =
                    self.if_current(revision, |state| std::mem::replace(&mut state.registered, false))
                else {
                    return Ok(());
                };
                if was_registered {
                    self.broker.unregister(&self.definition.alias).await?;
                    info!(alias = %self.definition.alias, "Alias unregistered");
                }
            }
        }

        Ok(())
    }

    /// Tear the alias down: unregister, unwatch everything and apply the
    /// target's unregister-time semantics to the alias path.
    pub async fn delete(&self) -> Result<(), BrokerError> {
        let (registered, watching, target_registration) = {
            let mut state = self.state.lock();
            if state.deleted {
                return Ok(());
            }
            state.deleted = true;
            // Supersede any in-flight registration change.
            state.revision += 1;
            (
                std::mem::take(&mut state.registered),
                state.watching.take(),
                state.target_registration.clone(),
            )
        };

        let alias = self.definition.alias.as_str();
        self.broker
            .unwatch_path(&self.definition.target, &self.handlers.registration)
            .await?;

        if registered {
            self.broker.unregister(alias).await?;
        }
        if let Some(kind) = watching {
            self.unwatch_pair(kind).await?;
        }

        if let Some(registration) = target_registration {
            if let Some(value) = registration.on_unregister.clone() {
                let value = self.transform(Payload::Value(value));
                match registration.behaviour.watch_kind() {
                    Some(WatchKind::Property) => self.write_property(alias, value).await?,
                    Some(WatchKind::Event) => self.broker.send_event(alias, value).await?,
                    None => {}
                }
            }
            if registration.deletes_on_unregister() {
                self.broker.delete_property(alias).await?;
            }
        }

        info!(alias = %alias, target_path = %self.definition.target, "Alias deleted");
        Ok(())
    }

    /// Forward a value observed on one side to the other side.
    async fn forward(&self, kind: WatchKind, to: Side, payload: Payload) -> Result<(), BrokerError> {
        {
            let mut state = self.state.lock();
            if state.deleted {
                return Ok(());
            }
            // A write we made to the source side is arriving back.
            let echo = match to {
                Side::Alias => &mut state.echo_on_target,
                Side::Target => &mut state.echo_on_alias,
            };
            if echo.as_ref() == Some(&payload) {
                *echo = None;
                return Ok(());
            }
        }

        let (path, value) = match to {
            Side::Alias => (self.definition.alias.as_str(), self.transform(payload)),
            Side::Target => (self.definition.target.as_str(), self.inverse(payload)),
        };
        {
            let mut state = self.state.lock();
            let echo = match to {
                Side::Alias => &mut state.echo_on_alias,
                Side::Target => &mut state.echo_on_target,
            };
            *echo = Some(value.clone());
        }

        debug!(path = %path, kind = ?kind, "Forwarding value");
        match kind {
            WatchKind::Property => self.write_property(path, value).await,
            WatchKind::Event => self.broker.send_event(path, value).await,
        }
    }

    async fn write_property(&self, path: &str, value: Payload) -> Result<(), BrokerError> {
        match value {
            Payload::Value(value) => self.broker.set_property(path, value).await,
            Payload::NoValue => self.broker.delete_property(path).await,
        }
    }

    /// Target-domain to alias-domain.
    pub fn transform(&self, payload: Payload) -> Payload {
        expression::apply(self.definition.transform.as_deref(), payload, |e| {
            self.errors
                .report(format!("Transform for alias {} failed: {}", self.definition.alias, e))
        })
    }

    /// Alias-domain to target-domain.
    pub fn inverse(&self, payload: Payload) -> Payload {
        expression::apply(self.definition.inverse.as_deref(), payload, |e| {
            self.errors
                .report(format!("Inverse for alias {} failed: {}", self.definition.alias, e))
        })
    }

    fn derive_registration(&self, target: &Registration) -> Registration {
        Registration {
            behaviour: target.behaviour,
            description: self.definition.description.clone(),
            on_unregister: target
                .on_unregister
                .clone()
                .and_then(|value| self.transform(Payload::Value(value)).into_value()),
            delete_on_unregister: target.delete_on_unregister,
        }
    }

    /// Run `f` on the state only if no newer change arrived since `revision`.
    fn if_current<R>(&self, revision: u64, f: impl FnOnce(&mut AliasState) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if state.revision != revision {
            debug!(alias = %self.definition.alias, revision, latest = state.revision, "Superseded registration change");
            return None;
        }
        Some(f(&mut state))
    }

    async fn watch_pair(&self, kind: WatchKind) -> Result<(), BrokerError> {
        let (target, alias) = (&self.definition.target, &self.definition.alias);
        match kind {
            WatchKind::Property => {
                self.broker.watch_property(target, self.handlers.target_set.clone()).await?;
                self.broker.watch_property(alias, self.handlers.alias_set.clone()).await
            }
            WatchKind::Event => {
                self.broker.watch_event(target, self.handlers.target_sent.clone()).await?;
                self.broker.watch_event(alias, self.handlers.alias_sent.clone()).await
            }
        }
    }

    async fn unwatch_pair(&self, kind: WatchKind) -> Result<(), BrokerError> {
        let (target, alias) = (&self.definition.target, &self.definition.alias);
        match kind {
            WatchKind::Property => {
                self.broker.unwatch_property(target, &self.handlers.target_set).await?;
                self.broker.unwatch_property(alias, &self.handlers.alias_set).await
            }
            WatchKind::Event => {
                self.broker.unwatch_event(target, &self.handlers.target_sent).await?;
                self.broker.unwatch_event(alias, &self.handlers.alias_sent).await
            }
        }
    }
}

impl std::fmt::Debug for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alias")
            .field("definition", &self.definition)
            .field("state", &*self.state.lock())
            .finish()
    }
}

fn registration_handler(alias: Weak<Alias>) -> RegistrationHandler {
    Handler::new(move |_path, registrations| {
        let alias = alias.clone();
        async move {
            if let Some(alias) = alias.upgrade() {
                alias.on_target_registration_changed(registrations).await?;
            }
            Ok(())
        }
    })
}

fn value_handler(alias: Weak<Alias>, kind: WatchKind, to: Side) -> ValueHandler {
    Handler::new(move |_path, payload| {
        let alias = alias.clone();
        async move {
            if let Some(alias) = alias.upgrade() {
                alias.forward(kind, to, payload).await?;
            }
            Ok(())
        }
    })
}
