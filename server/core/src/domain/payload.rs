// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Property and event payloads.
//!
//! The broker distinguishes "a value" from "no value at all" (a deleted
//! property, or an event sent without a body). JSON `null` is a real value,
//! so the absence is carried as its own variant.

use serde_json::Value;

/// A value delivered to or published through the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No value present. Transforms never apply to it.
    NoValue,
    /// A JSON value.
    Value(Value),
}

impl Payload {
    pub fn is_no_value(&self) -> bool {
        matches!(self, Payload::NoValue)
    }

    /// Borrow the contained value, if any.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::NoValue => None,
            Payload::Value(value) => Some(value),
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Payload::NoValue => None,
            Payload::Value(value) => Some(value),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

impl From<Option<Value>> for Payload {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Payload::NoValue, Payload::Value)
    }
}
