// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! aliasd CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers and the embedded alias server

pub mod commands;
pub mod embedded;
