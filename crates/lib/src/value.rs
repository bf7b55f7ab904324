//! Structured configuration values.
//!
//! Plugin payloads and raw block bodies share one closed value model: strings,
//! numbers, booleans, lists and maps. Numbers keep their JSON form, so 64-bit
//! integers survive unchanged. Strings in raw configuration may carry
//! `${...}` placeholders (see [`crate::placeholder`]); after interpolation they
//! are plain text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An ordered string-keyed map of values.
pub type ValueMap = BTreeMap<String, Value>;

/// A configuration or result value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Number(serde_json::Number),
  String(String),
  List(Vec<Value>),
  Map(ValueMap),
}

/// A JSON value that has no counterpart in [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported value at '{path}': {reason}")]
pub struct ValueError {
  pub path: String,
  pub reason: String,
}

impl Value {
  /// Name of the value kind, used in error messages.
  pub fn kind_name(&self) -> &'static str {
    match self {
      Value::Bool(_) => "bool",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&ValueMap> {
    match self {
      Value::Map(map) => Some(map),
      _ => None,
    }
  }

  /// Render a scalar as text for string interpolation.
  ///
  /// Lists and maps have no text form and return `None`.
  pub fn render(&self) -> Option<String> {
    match self {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      Value::Bool(b) => Some(b.to_string()),
      Value::List(_) | Value::Map(_) => None,
    }
  }

  /// Convert a decoded JSON value, rejecting `null` anywhere in the tree.
  ///
  /// `path` names the location of `json` and is extended for nested values so
  /// errors point at the offending key.
  pub fn from_json(json: serde_json::Value, path: &str) -> Result<Self, ValueError> {
    match json {
      serde_json::Value::Null => Err(ValueError {
        path: path.to_string(),
        reason: "null is not a supported value".to_string(),
      }),
      serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
      serde_json::Value::Number(n) => Ok(Value::Number(n)),
      serde_json::Value::String(s) => Ok(Value::String(s)),
      serde_json::Value::Array(items) => items
        .into_iter()
        .enumerate()
        .map(|(i, item)| Value::from_json(item, &format!("{}[{}]", path, i)))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List),
      serde_json::Value::Object(fields) => map_from_json(fields, path).map(Value::Map),
    }
  }

  /// Convert into a JSON value.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Value::Bool(b) => serde_json::Value::Bool(*b),
      Value::Number(n) => serde_json::Value::Number(n.clone()),
      Value::String(s) => serde_json::Value::String(s.clone()),
      Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
      Value::Map(map) => map_to_json(map),
    }
  }
}

/// Convert a JSON object into a [`ValueMap`]. See [`Value::from_json`].
pub fn map_from_json(fields: serde_json::Map<String, serde_json::Value>, path: &str) -> Result<ValueMap, ValueError> {
  fields
    .into_iter()
    .map(|(key, value)| {
      let child = if path.is_empty() {
        key.clone()
      } else {
        format!("{}.{}", path, key)
      };
      Value::from_json(value, &child).map(|v| (key, v))
    })
    .collect()
}

/// Convert a [`ValueMap`] into a JSON object.
pub fn map_to_json(map: &ValueMap) -> serde_json::Value {
  serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.render() {
      Some(text) => f.write_str(&text),
      None => write!(f, "{}", self.to_json()),
    }
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Number(value.into())
  }
}

impl From<u64> for Value {
  fn from(value: u64) -> Self {
    Value::Number(value.into())
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<ValueMap> for Value {
  fn from(value: ValueMap) -> Self {
    Value::Map(value)
  }
}
