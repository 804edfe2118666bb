// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Registration Descriptors
//!
//! A registration declares what lives at a path: a directory, a property or
//! an event, plus optional unregister-time semantics. Behaviour strings such
//! as `PROPERTY-1:N` are decoded once into [`Behaviour`] when a descriptor is
//! deserialized; nothing past this module inspects the string form.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Registration value objects and effective-registration selection

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Unknown behaviour: {0}")]
    UnknownBehaviour(String),

    #[error("Registration may carry on_unregister or delete_on_unregister, not both")]
    ConflictingUnregisterSemantics,

    #[error("DIRECTORY registrations cannot carry unregister semantics")]
    DirectoryWithUnregisterSemantics,
}

/// Number of writers and readers a property or event expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// One writer, many readers (`1:N`).
    OneToMany,
    /// Many writers, one reader (`N:1`).
    ManyToOne,
}

impl Cardinality {
    fn as_str(self) -> &'static str {
        match self {
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToOne => "N:1",
        }
    }
}

/// Which value watch an alias installs for a behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    Property,
    Event,
}

/// Decoded form of the broker's `behaviour` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Behaviour {
    Directory,
    Property(Cardinality),
    Event(Cardinality),
}

impl Behaviour {
    /// The value watch needed to mirror this behaviour. Directories cannot be
    /// mirrored and have none.
    pub fn watch_kind(self) -> Option<WatchKind> {
        match self {
            Behaviour::Directory => None,
            Behaviour::Property(_) => Some(WatchKind::Property),
            Behaviour::Event(_) => Some(WatchKind::Event),
        }
    }

    pub fn is_directory(self) -> bool {
        matches!(self, Behaviour::Directory)
    }
}

impl fmt::Display for Behaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behaviour::Directory => f.write_str("DIRECTORY"),
            Behaviour::Property(c) => write!(f, "PROPERTY-{}", c.as_str()),
            Behaviour::Event(c) => write!(f, "EVENT-{}", c.as_str()),
        }
    }
}

impl FromStr for Behaviour {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DIRECTORY" => Ok(Behaviour::Directory),
            "PROPERTY-1:N" => Ok(Behaviour::Property(Cardinality::OneToMany)),
            "PROPERTY-N:1" => Ok(Behaviour::Property(Cardinality::ManyToOne)),
            "EVENT-1:N" => Ok(Behaviour::Event(Cardinality::OneToMany)),
            "EVENT-N:1" => Ok(Behaviour::Event(Cardinality::ManyToOne)),
            other => Err(RegistrationError::UnknownBehaviour(other.to_string())),
        }
    }
}

impl TryFrom<String> for Behaviour {
    type Error = RegistrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Behaviour> for String {
    fn from(value: Behaviour) -> Self {
        value.to_string()
    }
}

/// A registration claimed at a path.
///
/// At most one of `on_unregister` and `delete_on_unregister` is set, and
/// directories carry neither (see [`Registration::validate`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub behaviour: Behaviour,

    #[serde(default)]
    pub description: String,

    /// Value published at the path when the registration disappears.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_unregister: Option<Value>,

    /// Delete the property when the registration disappears.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_on_unregister: Option<bool>,
}

impl Registration {
    pub fn new(behaviour: Behaviour, description: impl Into<String>) -> Self {
        Self {
            behaviour,
            description: description.into(),
            on_unregister: None,
            delete_on_unregister: None,
        }
    }

    pub fn with_on_unregister(mut self, value: Value) -> Self {
        self.on_unregister = Some(value);
        self
    }

    pub fn with_delete_on_unregister(mut self, delete: bool) -> Self {
        self.delete_on_unregister = Some(delete);
        self
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        let has_semantics = self.on_unregister.is_some() || self.delete_on_unregister.is_some();
        if self.behaviour.is_directory() && has_semantics {
            return Err(RegistrationError::DirectoryWithUnregisterSemantics);
        }
        if self.on_unregister.is_some() && self.delete_on_unregister.is_some() {
            return Err(RegistrationError::ConflictingUnregisterSemantics);
        }
        Ok(())
    }

    /// `true` only when `delete_on_unregister` is explicitly set.
    pub fn deletes_on_unregister(&self) -> bool {
        self.delete_on_unregister == Some(true)
    }
}

/// Pick the registration an alias should mirror from everything claimed at a
/// path: the first entry that is not a directory.
pub fn select_effective(registrations: Option<&[Registration]>) -> Option<Registration> {
    registrations?
        .iter()
        .find(|registration| !registration.behaviour.is_directory())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_behaviour_string_forms() {
        for s in ["DIRECTORY", "PROPERTY-1:N", "PROPERTY-N:1", "EVENT-1:N", "EVENT-N:1"] {
            let behaviour: Behaviour = s.parse().unwrap();
            assert_eq!(behaviour.to_string(), s);
        }
        assert_eq!(
            "PROPERTY-N:N".parse::<Behaviour>(),
            Err(RegistrationError::UnknownBehaviour("PROPERTY-N:N".to_string()))
        );
    }

    #[test]
    fn test_watch_kind() {
        assert_eq!(Behaviour::Directory.watch_kind(), None);
        assert_eq!(
            Behaviour::Property(Cardinality::ManyToOne).watch_kind(),
            Some(WatchKind::Property)
        );
        assert_eq!(
            Behaviour::Event(Cardinality::OneToMany).watch_kind(),
            Some(WatchKind::Event)
        );
    }

    #[test]
    fn test_deserialize_registration() {
        let registration: Registration = serde_json::from_value(json!({
            "behaviour": "PROPERTY-1:N",
            "delete_on_unregister": true,
        }))
        .unwrap();

        assert_eq!(registration.behaviour, Behaviour::Property(Cardinality::OneToMany));
        assert_eq!(registration.description, "");
        assert!(registration.deletes_on_unregister());

        let bad = serde_json::from_value::<Registration>(json!({"behaviour": "SOMETHING"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_serialize_skips_absent_fields() {
        let registration = Registration::new(Behaviour::Event(Cardinality::ManyToOne), "An event.")
            .with_on_unregister(json!(1.0));

        assert_eq!(
            serde_json::to_value(&registration).unwrap(),
            json!({
                "behaviour": "EVENT-N:1",
                "description": "An event.",
                "on_unregister": 1.0,
            })
        );
    }

    #[test]
    fn test_validate() {
        let property = Behaviour::Property(Cardinality::OneToMany);
        assert!(Registration::new(property, "").validate().is_ok());
        assert_eq!(
            Registration::new(property, "")
                .with_on_unregister(json!(1))
                .with_delete_on_unregister(true)
                .validate(),
            Err(RegistrationError::ConflictingUnregisterSemantics)
        );
        assert_eq!(
            Registration::new(Behaviour::Directory, "")
                .with_delete_on_unregister(false)
                .validate(),
            Err(RegistrationError::DirectoryWithUnregisterSemantics)
        );
    }

    #[test]
    fn test_select_effective_skips_directories() {
        let listing = vec![
            Registration::new(Behaviour::Directory, ""),
            Registration::new(Behaviour::Property(Cardinality::ManyToOne), "A property, really."),
            Registration::new(Behaviour::Event(Cardinality::ManyToOne), "An event."),
        ];

        let effective = select_effective(Some(&listing)).unwrap();
        assert_eq!(effective.behaviour, Behaviour::Property(Cardinality::ManyToOne));
        assert_eq!(effective.description, "A property, really.");

        assert_eq!(select_effective(None), None);
        assert_eq!(select_effective(Some(&[])), None);
        assert_eq!(
            select_effective(Some(&[Registration::new(Behaviour::Directory, "")])),
            None
        );
    }
}
