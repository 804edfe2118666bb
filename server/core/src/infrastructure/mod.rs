// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! Concrete adapters: the alias set cache file and the in-process broker.

pub mod cache;
pub mod in_memory_broker;

pub use cache::{AliasCache, CacheError};
pub use in_memory_broker::InMemoryBroker;
