//! Datasource plugins.
//!
//! A datasource plugin turns an interpolated configuration map into a result
//! map. Plugins are created per evaluation from factories held by an
//! explicitly constructed [`PluginRegistry`]; there is no global registry.
//!
//! Every invocation goes through [`invoke`], which bounds the call by the
//! evaluation's cancellation token and the per-datasource deadline.

pub mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::value::ValueMap;

/// Errors reported by plugins or by the invocation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("{0}")]
  Execute(String),

  #[error("request to {url} failed: {message}")]
  Http { url: String, message: String },

  #[error("timed out after {0:?}")]
  Timeout(Duration),

  #[error("cancelled")]
  Cancelled,
}

/// A datasource implementation.
///
/// `configure` receives the fully interpolated configuration and is always
/// called exactly once before `execute`.
#[async_trait]
pub trait Datasource: Send + Sync {
  async fn configure(&mut self, config: ValueMap) -> Result<(), PluginError>;

  async fn execute(&self, ctx: &PluginContext) -> Result<ValueMap, PluginError>;
}

type Factory = Arc<dyn Fn() -> Box<dyn Datasource> + Send + Sync>;

/// Maps datasource type names to plugin factories.
#[derive(Clone, Default)]
pub struct PluginRegistry {
  datasources: BTreeMap<String, Factory>,
}

impl fmt::Debug for PluginRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PluginRegistry")
      .field("datasources", &self.datasources.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl PluginRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with the built-in `null`, `env` and `http` datasources.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    builtin::register_all(&mut registry);
    registry
  }

  /// Register (or replace) the factory for `type_name`.
  pub fn register<F, D>(&mut self, type_name: impl Into<String>, factory: F)
  where
    F: Fn() -> D + Send + Sync + 'static,
    D: Datasource + 'static,
  {
    let factory: Factory = Arc::new(move || Box::new(factory()) as Box<dyn Datasource>);
    self.datasources.insert(type_name.into(), factory);
  }

  pub fn contains(&self, type_name: &str) -> bool {
    self.datasources.contains_key(type_name)
  }

  /// Registered type names, sorted.
  pub fn types(&self) -> impl Iterator<Item = &str> {
    self.datasources.keys().map(String::as_str)
  }

  /// A fresh, unconfigured plugin instance.
  pub fn instantiate(&self, type_name: &str) -> Option<Box<dyn Datasource>> {
    self.datasources.get(type_name).map(|factory| factory())
  }
}

/// Per-invocation context handed to [`Datasource::execute`].
#[derive(Debug, Clone)]
pub struct PluginContext {
  cancel: CancellationToken,
  timeout: Option<Duration>,
  deadline: Option<Instant>,
}

impl PluginContext {
  /// A context whose deadline starts now.
  ///
  /// A timeout too large to represent as an instant leaves the call without
  /// a deadline.
  pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
    Self {
      cancel,
      timeout,
      deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Resolves once the evaluation is cancelled.
  pub async fn cancelled(&self) {
    self.cancel.cancelled().await
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }
}

/// Configure and execute a plugin, bounded by cancellation and the deadline.
///
/// Cancellation wins over completion when both are ready. A cancelled or
/// timed-out plugin future is dropped.
pub async fn invoke(
  mut plugin: Box<dyn Datasource>,
  config: ValueMap,
  ctx: PluginContext,
) -> Result<ValueMap, PluginError> {
  let cancel = ctx.cancel.clone();
  let deadline = ctx.deadline;
  let timeout = ctx.timeout.unwrap_or_default();

  let work = async move {
    plugin.configure(config).await?;
    plugin.execute(&ctx).await
  };
  let bounded = async move {
    match deadline {
      Some(deadline) => tokio::time::timeout_at(deadline, work)
        .await
        .unwrap_or(Err(PluginError::Timeout(timeout))),
      None => work.await,
    }
  };

  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(PluginError::Cancelled),
    result = bounded => result,
  }
}
