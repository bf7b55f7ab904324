//! Configuration evaluation pipeline.
//!
//! Ties the stages together: load files, validate every block and build the
//! datasource graph, evaluate datasources, assemble the resolved
//! configuration.
//!
//! # Example
//! ```ignore
//! use kiln_lib::eval::{EvalOptions, evaluate_config};
//! use kiln_lib::plugin::PluginRegistry;
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = PluginRegistry::with_builtins();
//! let outcome = evaluate_config(&["images/"], &registry, &EvalOptions::default(), CancellationToken::new()).await?;
//! println!("resolved {} datasources", outcome.evaluation.resolved());
//! ```

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assemble::ResolvedConfig;
use crate::block::{BuildBlock, SourceBlock, datasource_reference, validate_sources_and_builds};
use crate::error::AggregateError;
use crate::evaluate::{EvaluateConfig, Evaluation, Evaluator};
use crate::graph::DatasourceGraph;
use crate::load::{Declarations, LoadError, load_paths};
use crate::plugin::PluginRegistry;
use crate::reference::Reference;
use crate::value::ValueMap;

/// Errors that can occur before evaluation starts.
#[derive(Debug, Error)]
pub enum EvalError {
  #[error(transparent)]
  Load(#[from] LoadError),

  #[error("invalid configuration: {0}")]
  Invalid(AggregateError),
}

/// A configuration that passed validation and is ready to evaluate.
#[derive(Debug)]
pub struct CheckedConfig {
  pub graph: DatasourceGraph,
  pub sources: Vec<SourceBlock>,
  pub builds: Vec<BuildBlock>,
  pub variables: ValueMap,
}

impl CheckedConfig {
  /// Datasources in the order they would be dispatched with one worker.
  pub fn plan(&self) -> Vec<Reference> {
    // Checked graphs are acyclic
    self.graph.ordered_references().unwrap_or_default()
  }
}

/// Options for [`evaluate_config`].
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
  pub settings: EvaluateConfig,
  /// Variable values overriding file defaults.
  pub variables: ValueMap,
}

/// Result of [`evaluate_config`].
#[derive(Debug)]
pub struct ConfigEvaluation {
  pub config: ResolvedConfig,
  pub evaluation: Evaluation,
}

impl ConfigEvaluation {
  pub fn is_success(&self) -> bool {
    self.evaluation.is_success()
  }

  pub fn error(&self) -> Option<&AggregateError> {
    self.evaluation.error.as_ref()
  }
}

/// Validate decoded declarations and build the datasource graph.
///
/// # Errors
///
/// Every decode, graph, source and build problem, collected together.
pub fn check(declarations: Declarations, registry: &PluginRegistry) -> Result<CheckedConfig, AggregateError> {
  let Declarations {
    datasources,
    sources,
    builds,
    variables,
    errors,
    ..
  } = declarations;
  let mut aggregate = AggregateError::from(errors);

  let declared: HashSet<Reference> = datasources
    .iter()
    .filter_map(|block| datasource_reference(block).ok())
    .collect();

  let graph = match DatasourceGraph::build(datasources, registry) {
    Ok(graph) => Some(graph),
    Err(e) => {
      aggregate.extend(e);
      None
    }
  };
  aggregate
    .errors
    .extend(validate_sources_and_builds(&sources, &builds, &declared));

  match graph {
    Some(graph) if aggregate.is_empty() => Ok(CheckedConfig {
      graph,
      sources,
      builds,
      variables,
    }),
    _ => Err(aggregate),
  }
}

/// Load and validate the configuration under `paths` without evaluating it.
pub fn check_config<P: AsRef<Path>>(
  paths: &[P],
  registry: &PluginRegistry,
  variables: &ValueMap,
) -> Result<CheckedConfig, EvalError> {
  let mut declarations = load_paths(paths)?;
  declarations.apply_overrides(variables);
  let checked = check(declarations, registry).map_err(EvalError::Invalid)?;
  debug!(datasources = checked.graph.len(), "configuration is valid");
  Ok(checked)
}

/// Evaluate an already checked configuration.
pub async fn evaluate_checked(
  checked: CheckedConfig,
  registry: &PluginRegistry,
  settings: &EvaluateConfig,
  cancel: CancellationToken,
) -> ConfigEvaluation {
  let CheckedConfig {
    graph,
    sources,
    builds,
    variables,
  } = checked;

  let mut evaluator = Evaluator::new(registry)
    .with_config(settings.clone())
    .with_variables(variables.clone());
  let evaluation = evaluator.evaluate(&graph, cancel).await;
  let config = ResolvedConfig::assemble(sources, builds, variables, evaluation.store.clone());
  ConfigEvaluation { config, evaluation }
}

/// Load, validate and evaluate the configuration under `paths`.
///
/// # Errors
///
/// Fails only when the configuration cannot be loaded or is invalid.
/// Datasource failures are reported in the returned [`ConfigEvaluation`].
pub async fn evaluate_config<P: AsRef<Path>>(
  paths: &[P],
  registry: &PluginRegistry,
  options: &EvalOptions,
  cancel: CancellationToken,
) -> Result<ConfigEvaluation, EvalError> {
  let checked = check_config(paths, registry, &options.variables)?;
  let outcome = evaluate_checked(checked, registry, &options.settings, cancel).await;
  info!(
    success = outcome.is_success(),
    datasources = outcome.evaluation.states.len(),
    "configuration evaluated"
  );
  Ok(outcome)
}
