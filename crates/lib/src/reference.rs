//! Canonical block references.
//!
//! Every block in a configuration is identified by a `(kind, type, name)`
//! triple. The same triple is used as the graph node identity, as the key of
//! resolved datasource values, and as the target of `depends_on` entries and
//! `${data...}` traversals.
//!
//! # Text form
//!
//! References render as `kind.type.name`, e.g. `data.amazon-ami.base`. The
//! same form is accepted by [`Reference::from_str`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The keyword of a referencable block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
  /// A `data` block (external lookup).
  Data,
  /// A `source` block (image source).
  Source,
  /// A `build` block.
  Build,
}

impl Kind {
  pub fn as_str(self) -> &'static str {
    match self {
      Kind::Data => "data",
      Kind::Source => "source",
      Kind::Build => "build",
    }
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Kind {
  type Err = ReferenceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "data" => Ok(Kind::Data),
      "source" => Ok(Kind::Source),
      "build" => Ok(Kind::Build),
      other => Err(ReferenceError::UnknownKind(other.to_string())),
    }
  }
}

/// Errors produced while resolving a raw reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
  #[error("unknown block kind '{0}' (expected data, source or build)")]
  UnknownKind(String),

  #[error("reference '{0}' has an empty type")]
  EmptyType(String),

  #[error("reference '{0}' has an empty name")]
  EmptyName(String),

  #[error("reference '{0}' must have the form kind.type.name")]
  WrongArity(String),
}

/// A raw, unvalidated reference triple as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
  pub kind: String,
  pub type_name: String,
  pub name: String,
}

impl RawReference {
  pub fn new(kind: impl Into<String>, type_name: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      type_name: type_name.into(),
      name: name.into(),
    }
  }

  /// Split a dotted `kind.type.name` string into a raw triple.
  pub fn parse_dotted(text: &str) -> Result<Self, ReferenceError> {
    let parts: Vec<&str> = text.split('.').collect();
    match parts.as_slice() {
      [kind, type_name, name] => Ok(Self::new(*kind, *type_name, *name)),
      _ => Err(ReferenceError::WrongArity(text.to_string())),
    }
  }
}

impl fmt::Display for RawReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.kind, self.type_name, self.name)
  }
}

/// A canonical reference to a declared block.
///
/// Equality, ordering and hashing are by value over all three fields and are
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference {
  kind: Kind,
  type_name: String,
  name: String,
}

impl Reference {
  /// Resolve a raw triple into a canonical reference.
  ///
  /// # Errors
  ///
  /// Fails when the kind is not one of `data`, `source`, `build`, or when the
  /// type or name is empty.
  pub fn resolve(raw: &RawReference) -> Result<Self, ReferenceError> {
    let kind = raw.kind.parse::<Kind>()?;
    if raw.type_name.is_empty() {
      return Err(ReferenceError::EmptyType(raw.to_string()));
    }
    if raw.name.is_empty() {
      return Err(ReferenceError::EmptyName(raw.to_string()));
    }
    Ok(Self {
      kind,
      type_name: raw.type_name.clone(),
      name: raw.name.clone(),
    })
  }

  /// Shorthand for a `data` reference. Callers must pass non-empty parts.
  pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      kind: Kind::Data,
      type_name: type_name.into(),
      name: name.into(),
    }
  }

  /// Shorthand for a `source` reference. Callers must pass non-empty parts.
  pub fn source(type_name: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      kind: Kind::Source,
      type_name: type_name.into(),
      name: name.into(),
    }
  }

  pub fn kind(&self) -> Kind {
    self.kind
  }

  pub fn type_name(&self) -> &str {
    &self.type_name
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.kind, self.type_name, self.name)
  }
}

impl FromStr for Reference {
  type Err = ReferenceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Reference::resolve(&RawReference::parse_dotted(s)?)
  }
}

impl TryFrom<String> for Reference {
  type Error = ReferenceError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Reference> for String {
  fn from(value: Reference) -> Self {
    value.to_string()
  }
}
