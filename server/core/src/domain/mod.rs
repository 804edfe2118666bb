// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types and services. The only I/O-facing item is the [`broker::Broker`]
//! port, which is a trait implemented in the infrastructure layer.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`payload`] | `Payload` |
//! | [`registration`] | `Registration`, `Behaviour`, `Cardinality`, `WatchKind` |
//! | [`alias_set`] | `AliasDefinition`, `AliasSet`, `AliasRequestError` |
//! | [`cycle`] | `has_cycle` |
//! | [`expression`] | `evaluate`, `EvalError` |
//! | [`broker`] | `Broker`, `Handler`, `BrokerError` |
//! | [`config`] | `ServerConfig` |

pub mod payload;
pub mod registration;
pub mod alias_set;
pub mod cycle;
pub mod expression;
pub mod broker;
pub mod config;

pub use payload::Payload;
pub use registration::{Behaviour, Cardinality, Registration, WatchKind};
pub use alias_set::{AliasDefinition, AliasSet};
pub use cycle::has_cycle;
pub use broker::{Broker, BrokerError, Handler, HandlerId, RegistrationHandler, ValueHandler};
pub use config::ServerConfig;
