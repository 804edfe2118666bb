// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the aliasd CLI

pub mod alias;
pub mod config;

pub use self::alias::AddArgs;
pub use self::config::{ConfigCommand, ConfigOverrides};
