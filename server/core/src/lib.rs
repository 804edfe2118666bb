// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! # `aliasd-core` - Path Alias Manager
//!
//! Lets a client declare that an *alias* path in a publish/subscribe
//! namespace mirrors a *target* path: same behaviour, same values, optionally
//! transformed on the way through.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Registration`, `Behaviour`, `Payload`, `AliasSet`, `has_cycle`, expression evaluator, `Broker` port |
//! | [`application`] | Application | `Alias` state machine, `AliasServer`, error reporting |
//! | [`infrastructure`] | Infrastructure | `AliasCache` file, `InMemoryBroker` |
//!
//! ## Key Concepts
//!
//! - **Alias**: follows the target's registration as it appears, changes kind
//!   and disappears, and re-registers the alias path to match.
//! - **Revision**: each accepted registration change bumps a counter; an
//!   in-flight handler whose revision is stale stops before its next broker
//!   call.
//! - **Alias set**: the published and persisted mapping of alias path to
//!   definition. Never contains a cycle.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
