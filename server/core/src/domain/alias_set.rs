// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Alias Definitions and the Alias Set
//!
//! The alias set is the published and persisted state of the server: an
//! ordered mapping from alias path to [`AliasDefinition`]. This module also
//! decodes the payloads of the `add`, `remove` and `aliases` entry points.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Alias value objects and request decoding

use crate::domain::cycle::has_cycle;
use crate::domain::payload::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Malformed `add`, `remove` or `aliases` payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AliasRequestError {
    #[error("No value supplied")]
    NoValue,

    #[error("Invalid alias definition {value}: expected [target, alias] or {{target, alias, transform?, inverse?, description?}}")]
    InvalidAdd { value: String },

    #[error("Invalid alias path to remove {value}: expected a string")]
    InvalidRemove { value: String },

    #[error("Invalid alias set: {0}")]
    InvalidAliasSet(String),

    #[error("Alias set entry {key} defines alias {alias}")]
    MismatchedKey { key: String, alias: String },
}

/// One alias: `alias` mirrors `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasDefinition {
    pub target: String,
    pub alias: String,
    /// Target-domain to alias-domain expression; identity when absent.
    #[serde(default)]
    pub transform: Option<String>,
    /// Alias-domain to target-domain expression; identity when absent.
    #[serde(default)]
    pub inverse: Option<String>,
    pub description: String,
}

impl AliasDefinition {
    /// An identity alias with the default description.
    pub fn new(target: impl Into<String>, alias: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            description: default_description(&target),
            target,
            alias: alias.into(),
            transform: None,
            inverse: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<String>, inverse: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self.inverse = Some(inverse.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Decode the payload of an `add` event.
    ///
    /// Accepts `[target, alias]` or an object with required `target` and
    /// `alias` and optional `transform`, `inverse` and `description`.
    pub fn from_add_request(payload: &Payload) -> Result<Self, AliasRequestError> {
        let value = payload.as_value().ok_or(AliasRequestError::NoValue)?;
        let invalid = || AliasRequestError::InvalidAdd {
            value: value.to_string(),
        };
        // Structs also deserialize from sequences, so dispatch on the shape.
        match value {
            Value::Array(_) => {
                let (target, alias): (String, String) =
                    serde_json::from_value(value.clone()).map_err(|_| invalid())?;
                Ok(AliasDefinition::new(target, alias))
            }
            Value::Object(_) => {
                let request: AddRequest = serde_json::from_value(value.clone()).map_err(|_| invalid())?;
                Ok(request.into_definition())
            }
            _ => Err(invalid()),
        }
    }
}

fn default_description(target: &str) -> String {
    format!("Alias of {}.", target)
}

/// Long form of an `add` payload.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddRequest {
    target: String,
    alias: String,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default)]
    inverse: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl AddRequest {
    fn into_definition(self) -> AliasDefinition {
        AliasDefinition {
            description: self
                .description
                .unwrap_or_else(|| default_description(&self.target)),
            target: self.target,
            alias: self.alias,
            transform: self.transform,
            inverse: self.inverse,
        }
    }
}

/// Decode the payload of a `remove` event: the alias path.
pub fn alias_path_from_remove_request(payload: &Payload) -> Result<String, AliasRequestError> {
    match payload {
        Payload::NoValue => Err(AliasRequestError::NoValue),
        Payload::Value(Value::String(path)) => Ok(path.clone()),
        Payload::Value(other) => Err(AliasRequestError::InvalidRemove {
            value: other.to_string(),
        }),
    }
}

/// Mapping from alias path to definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasSet(BTreeMap<String, AliasDefinition>);

impl AliasSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a complete set, as written to the `aliases` property or read
    /// from the cache file. Every key must match its definition's `alias`.
    pub fn from_value(value: &Value) -> Result<Self, AliasRequestError> {
        let Value::Object(entries) = value else {
            return Err(AliasRequestError::InvalidAliasSet(format!("expected an object, got {}", value)));
        };
        if let Some((key, _)) = entries.iter().find(|(_, entry)| !entry.is_object()) {
            return Err(AliasRequestError::InvalidAliasSet(format!("entry {} is not an object", key)));
        }
        let set: AliasSet = serde_json::from_value(value.clone())
            .map_err(|e| AliasRequestError::InvalidAliasSet(e.to_string()))?;
        for (key, definition) in set.iter() {
            if key != &definition.alias {
                return Err(AliasRequestError::MismatchedKey {
                    key: key.clone(),
                    alias: definition.alias.clone(),
                });
            }
        }
        Ok(set)
    }

    pub fn to_value(&self) -> Value {
        // A map of strings and string options always serializes.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Insert or replace the definition keyed by its alias path.
    pub fn upsert(&mut self, definition: AliasDefinition) {
        self.0.insert(definition.alias.clone(), definition);
    }

    pub fn remove(&mut self, alias: &str) -> Option<AliasDefinition> {
        self.0.remove(alias)
    }

    pub fn get(&self, alias: &str) -> Option<&AliasDefinition> {
        self.0.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.0.contains_key(alias)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AliasDefinition)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The alias → target graph of this set.
    pub fn links(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(alias, definition)| (alias.clone(), definition.target.clone()))
            .collect()
    }

    /// First cycle in the alias → target graph, if any.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        has_cycle(&self.links())
    }
}

impl FromIterator<AliasDefinition> for AliasSet {
    fn from_iter<I: IntoIterator<Item = AliasDefinition>>(iter: I) -> Self {
        let mut set = AliasSet::new();
        for definition in iter {
            set.upsert(definition);
        }
        set
    }
}
