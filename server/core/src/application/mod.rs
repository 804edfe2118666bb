// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! The per-alias state machine and the alias server that owns all aliases.

pub mod alias;
pub mod alias_server;
pub mod error_reporter;

pub use alias::{Alias, AliasHandlers};
pub use alias_server::{AliasServer, AliasServerError};
pub use error_reporter::ErrorReporter;
