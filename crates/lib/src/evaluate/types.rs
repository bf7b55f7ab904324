//! Types for datasource evaluation.
//!
//! This module defines node states, the per-node error type, the write-once
//! value store, the evaluation result, and evaluation settings.

use std::env;
use std::time::Duration;

use indexmap::IndexMap;
use thiserror::Error;

use crate::consts::{DEFAULT_PARALLELISM, ENV_DATASOURCE_TIMEOUT, ENV_PARALLELISM};
use crate::error::AggregateError;
use crate::placeholder::PlaceholderError;
use crate::plugin::PluginError;
use crate::reference::Reference;
use crate::value::{ValueMap, map_to_json};

/// Why a node ended in [`NodeState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
  /// The node's own interpolation or plugin call failed.
  Error,
  /// A direct dependency failed or was skipped.
  Propagated(Reference),
  /// Evaluation was cancelled before the node finished.
  Cancelled,
}

/// Lifecycle of a datasource node.
///
/// `Declared -> Validated -> Ready -> Evaluating -> Resolved | Failed`.
/// A node may also go straight from `Validated` to `Failed` when a
/// dependency fails or evaluation is cancelled. Terminal states never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
  Declared,
  Validated,
  Ready,
  Evaluating,
  Resolved,
  Failed(FailureReason),
}

impl NodeState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, NodeState::Resolved | NodeState::Failed(_))
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      NodeState::Declared => "declared",
      NodeState::Validated => "validated",
      NodeState::Ready => "ready",
      NodeState::Evaluating => "evaluating",
      NodeState::Resolved => "resolved",
      NodeState::Failed(FailureReason::Error) => "failed",
      NodeState::Failed(FailureReason::Propagated(_)) => "skipped",
      NodeState::Failed(FailureReason::Cancelled) => "cancelled",
    }
  }
}

/// Why a single datasource failed.
#[derive(Debug, Error)]
pub enum NodeError {
  #[error("interpolation failed: {0}")]
  Interpolate(#[from] PlaceholderError),

  #[error(transparent)]
  Plugin(#[from] PluginError),

  #[error("no datasource plugin registered for type '{0}'")]
  UnregisteredType(String),

  #[error("datasource task failed: {0}")]
  Task(String),
}

/// Resolved datasource values, written once per reference.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
  values: IndexMap<Reference, ValueMap>,
}

impl ValueStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Publish the value of a datasource. Returns `false`, leaving the store
  /// unchanged, if a value was already published for `reference`.
  pub fn publish(&mut self, reference: Reference, value: ValueMap) -> bool {
    if self.values.contains_key(&reference) {
      return false;
    }
    self.values.insert(reference, value);
    true
  }

  pub fn get(&self, reference: &Reference) -> Option<&ValueMap> {
    self.values.get(reference)
  }

  pub fn contains(&self, reference: &Reference) -> bool {
    self.values.contains_key(reference)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Values in the order they were published.
  pub fn iter(&self) -> impl Iterator<Item = (&Reference, &ValueMap)> {
    self.values.iter()
  }

  /// A JSON object keyed by the dotted reference.
  pub fn to_json(&self) -> serde_json::Value {
    serde_json::Value::Object(
      self
        .values
        .iter()
        .map(|(reference, value)| (reference.to_string(), map_to_json(value)))
        .collect(),
    )
  }
}

/// Result of evaluating a datasource graph.
#[derive(Debug, Default)]
pub struct Evaluation {
  /// Published values.
  pub store: ValueStore,
  /// Final state of every node, in declaration order.
  pub states: IndexMap<Reference, NodeState>,
  /// The topological order used for dispatch priority.
  pub order: Vec<Reference>,
  /// Root causes and skipped nodes. `None` when every node resolved.
  pub error: Option<AggregateError>,
}

impl Evaluation {
  /// Returns true if every datasource resolved.
  pub fn is_success(&self) -> bool {
    self.error.is_none()
  }

  pub fn state(&self, reference: &Reference) -> Option<&NodeState> {
    self.states.get(reference)
  }

  /// Number of nodes whose state matches `predicate`.
  pub fn count(&self, predicate: impl Fn(&NodeState) -> bool) -> usize {
    self.states.values().filter(|s| predicate(*s)).count()
  }

  pub fn resolved(&self) -> usize {
    self.count(|s| *s == NodeState::Resolved)
  }

  pub fn failed(&self) -> usize {
    self.count(|s| *s == NodeState::Failed(FailureReason::Error))
  }

  pub fn skipped(&self) -> usize {
    self.count(|s| matches!(s, NodeState::Failed(FailureReason::Propagated(_))))
  }

  pub fn cancelled(&self) -> usize {
    self.count(|s| *s == NodeState::Failed(FailureReason::Cancelled))
  }
}

/// Invalid evaluation settings.
#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("invalid {var}='{value}': {reason}")]
  Invalid {
    var: &'static str,
    value: String,
    reason: String,
  },
}

/// Settings for datasource evaluation.
#[derive(Debug, Clone)]
pub struct EvaluateConfig {
  /// Maximum number of datasources evaluated at once.
  pub parallelism: usize,

  /// Per-datasource timeout. `None` means no limit.
  pub timeout: Option<Duration>,
}

impl Default for EvaluateConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      timeout: None,
    }
  }
}

impl EvaluateConfig {
  /// Defaults overridden by `KILN_PARALLELISM` and `KILN_DATASOURCE_TIMEOUT`.
  ///
  /// # Errors
  ///
  /// Fails if either variable is set to an unparsable or zero value.
  pub fn from_env() -> Result<Self, SettingsError> {
    let mut config = Self::default();

    if let Ok(value) = env::var(ENV_PARALLELISM) {
      config.parallelism = parse_parallelism(&value).map_err(|reason| SettingsError::Invalid {
        var: ENV_PARALLELISM,
        value: value.clone(),
        reason,
      })?;
    }

    if let Ok(value) = env::var(ENV_DATASOURCE_TIMEOUT) {
      config.timeout = Some(parse_timeout(&value).map_err(|reason| SettingsError::Invalid {
        var: ENV_DATASOURCE_TIMEOUT,
        value: value.clone(),
        reason,
      })?);
    }

    Ok(config)
  }
}

/// Parse a worker count; must be at least 1.
pub fn parse_parallelism(value: &str) -> Result<usize, String> {
  match value.trim().parse::<usize>() {
    Ok(0) => Err("must be at least 1".to_string()),
    Ok(n) => Ok(n),
    Err(e) => Err(e.to_string()),
  }
}

/// Parse a human-readable duration such as `30s` or `2m`; must be non-zero.
pub fn parse_timeout(value: &str) -> Result<Duration, String> {
  let duration = humantime::parse_duration(value.trim()).map_err(|e| e.to_string())?;
  if duration.is_zero() {
    return Err("must be greater than zero".to_string());
  }
  Ok(duration)
}

fn num_cpus() -> usize {
  std::thread::available_parallelism()
    .map(|p| p.get())
    .unwrap_or(DEFAULT_PARALLELISM)
}
