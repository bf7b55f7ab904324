//! Datasource evaluation.
//!
//! This module evaluates a [`DatasourceGraph`]:
//! - Nodes are dispatched as soon as all of their dependencies resolved
//! - Among ready nodes, the one earliest in topological order goes first
//! - At most `parallelism` plugin calls run at once
//! - A failed node marks every transitive dependent as skipped
//! - Cancellation stops dispatch and marks everything unfinished as cancelled
//! - Dropping the evaluation future cancels every plugin call still in flight
//!
//! Placeholders in a block's configuration are substituted by the coordinator
//! right before dispatch, against the values published so far. Because a node
//! is only dispatched once every dependency resolved, every `${data...}` it
//! references is already in the store.

pub mod cache;
pub mod resolver;
pub mod types;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{AggregateError, ConfigError, NotEvaluated, SkipReason};
use crate::graph::DatasourceGraph;
use crate::placeholder::substitute_map;
use crate::plugin::{PluginContext, PluginError, PluginRegistry, invoke};
use crate::value::ValueMap;

pub use cache::{ResultCache, config_hash};
pub use resolver::StoreResolver;
pub use types::{
  EvaluateConfig, Evaluation, FailureReason, NodeError, NodeState, SettingsError, ValueStore, parse_parallelism,
  parse_timeout,
};

/// Evaluates datasource graphs with a fixed plugin registry and settings.
///
/// With [`Evaluator::with_cache`], results are memoized across calls to
/// [`Evaluator::evaluate`], keyed by reference and effective configuration.
pub struct Evaluator<'a> {
  registry: &'a PluginRegistry,
  config: EvaluateConfig,
  variables: ValueMap,
  cache: Option<ResultCache>,
}

impl<'a> Evaluator<'a> {
  pub fn new(registry: &'a PluginRegistry) -> Self {
    Self {
      registry,
      config: EvaluateConfig::default(),
      variables: ValueMap::new(),
      cache: None,
    }
  }

  pub fn with_config(mut self, config: EvaluateConfig) -> Self {
    self.config = config;
    self
  }

  /// Values for `${var...}` placeholders.
  pub fn with_variables(mut self, variables: ValueMap) -> Self {
    self.variables = variables;
    self
  }

  pub fn with_cache(mut self) -> Self {
    self.cache = Some(ResultCache::new());
    self
  }

  pub fn cache(&self) -> Option<&ResultCache> {
    self.cache.as_ref()
  }

  /// Evaluate every datasource in `graph`.
  ///
  /// Never fails as a whole: per-node failures, skips and cancellation are
  /// reported in [`Evaluation::states`] and [`Evaluation::error`].
  pub async fn evaluate(&mut self, graph: &DatasourceGraph, cancel: CancellationToken) -> Evaluation {
    info!(datasources = graph.len(), parallelism = self.config.parallelism, "evaluating datasources");

    let order = match graph.topological_order() {
      Ok(order) => order,
      Err(e) => {
        error!(error = %e, "datasource graph is cyclic");
        return Evaluation {
          states: graph.references().map(|r| (r.clone(), NodeState::Declared)).collect(),
          error: Some(vec![e].into()),
          ..Evaluation::default()
        };
      }
    };

    let mut run = Run::new(graph, &order);
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut join_set: JoinSet<(NodeIndex, Result<ValueMap, NodeError>)> = JoinSet::new();
    let mut tasks: HashMap<task::Id, NodeIndex> = HashMap::new();
    let mut pending_hashes: HashMap<NodeIndex, String> = HashMap::new();

    // Plugin calls run in detached tasks; they observe this token when the
    // evaluation future is dropped before they finish.
    let run_token = cancel.child_token();
    let _in_flight = run_token.clone().drop_guard();
    let mut cancelled = false;

    loop {
      if !cancelled && cancel.is_cancelled() {
        cancelled = true;
        warn!("evaluation cancelled");
        run.cancel_pending();
      }

      while !cancelled {
        // Dispatch only into a free worker slot so priority decides who runs next
        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
          break;
        };
        let Some(idx) = run.next_ready() else {
          break;
        };
        let reference = graph.reference(idx);
        let block = graph.block(idx);

        let resolver = StoreResolver::new(&run.store, &self.variables);
        let config = match substitute_map(&block.config, &resolver) {
          Ok(config) => config,
          Err(e) => {
            run.fail(idx, e.into());
            continue;
          }
        };

        let hash = self.cache.as_ref().map(|_| config_hash(&block.type_name, &config));
        if let (Some(cache), Some(hash)) = (&self.cache, &hash)
          && let Some(value) = cache.get(reference, hash)
        {
          debug!(datasource = %reference, "using cached result");
          let value = value.clone();
          run.resolve(idx, value);
          continue;
        }

        let Some(plugin) = self.registry.instantiate(&block.type_name) else {
          run.fail(idx, NodeError::UnregisteredType(block.type_name.clone()));
          continue;
        };
        if let Some(hash) = hash {
          pending_hashes.insert(idx, hash);
        }

        run.start(idx);
        debug!(datasource = %reference, "dispatching datasource");

        let token = run_token.child_token();
        let timeout = self.config.timeout;
        let handle = join_set.spawn(async move {
          let _permit = permit;
          let ctx = PluginContext::new(token, timeout);
          // A nested task turns a plugin panic into an error for this node
          let result = match tokio::spawn(invoke(plugin, config, ctx)).await {
            Ok(result) => result.map_err(NodeError::from),
            Err(e) => Err(NodeError::Task(e.to_string())),
          };
          (idx, result)
        });
        tasks.insert(handle.id(), idx);
      }

      if join_set.is_empty() {
        break;
      }

      tokio::select! {
        biased;
        _ = cancel.cancelled(), if !cancelled => {
          cancelled = true;
          warn!(in_flight = join_set.len(), "evaluation cancelled");
          run.cancel_pending();
        }
        Some(joined) = join_set.join_next_with_id() => match joined {
          Ok((id, (idx, Ok(value)))) => {
            tasks.remove(&id);
            if let (Some(cache), Some(hash)) = (self.cache.as_mut(), pending_hashes.remove(&idx)) {
              cache.insert(graph.reference(idx).clone(), hash, value.clone());
            }
            run.resolve(idx, value);
          }
          Ok((id, (idx, Err(NodeError::Plugin(PluginError::Cancelled))))) => {
            tasks.remove(&id);
            run.cancel_node(idx);
          }
          Ok((id, (idx, Err(e)))) => {
            tasks.remove(&id);
            run.fail(idx, e);
          }
          // The wrapper task itself died; plugin panics are caught one level down
          Err(e) => match tasks.remove(&e.id()) {
            Some(idx) => run.fail(idx, NodeError::Task(e.to_string())),
            None => error!(error = %e, "unknown datasource task failed"),
          },
        },
        else => break,
      }
    }

    run.abandon_unfinished();
    run.finish(&order)
  }
}

/// Mutable state of one evaluation, indexed by node.
struct Run<'g> {
  graph: &'g DatasourceGraph,
  states: Vec<NodeState>,
  /// Dependencies not yet resolved.
  remaining: Vec<usize>,
  /// Position in the topological order.
  priority: Vec<usize>,
  ready: BinaryHeap<Reverse<(usize, NodeIndex)>>,
  store: ValueStore,
  errors: AggregateError,
}

impl<'g> Run<'g> {
  fn new(graph: &'g DatasourceGraph, order: &[NodeIndex]) -> Self {
    let mut priority = vec![0; graph.len()];
    for (position, idx) in order.iter().enumerate() {
      priority[idx.index()] = position;
    }
    let mut run = Self {
      graph,
      states: vec![NodeState::Declared; graph.len()],
      remaining: graph.node_indices().map(|idx| graph.in_degree(idx)).collect(),
      priority,
      ready: BinaryHeap::new(),
      store: ValueStore::new(),
      errors: AggregateError::new(),
    };
    // The order exists, so every node is part of an acyclic graph
    for idx in graph.node_indices() {
      run.states[idx.index()] = NodeState::Validated;
      run.mark_ready_if_free(idx);
    }
    run
  }

  fn mark_ready_if_free(&mut self, idx: NodeIndex) {
    if self.remaining[idx.index()] == 0 && self.states[idx.index()] == NodeState::Validated {
      self.states[idx.index()] = NodeState::Ready;
      self.ready.push(Reverse((self.priority[idx.index()], idx)));
    }
  }

  fn next_ready(&mut self) -> Option<NodeIndex> {
    self.ready.pop().map(|Reverse((_, idx))| idx)
  }

  fn start(&mut self, idx: NodeIndex) {
    self.states[idx.index()] = NodeState::Evaluating;
  }

  fn resolve(&mut self, idx: NodeIndex, value: ValueMap) {
    let reference = self.graph.reference(idx);
    if !self.store.publish(reference.clone(), value) {
      error!(datasource = %reference, "value already published, keeping the first");
    }
    self.states[idx.index()] = NodeState::Resolved;
    info!(datasource = %reference, "datasource resolved");

    for dependent in self.graph.dependents(idx) {
      self.remaining[dependent.index()] -= 1;
      self.mark_ready_if_free(dependent);
    }
  }

  fn fail(&mut self, idx: NodeIndex, error: NodeError) {
    let reference = self.graph.reference(idx).clone();
    error!(datasource = %reference, error = %error, "datasource failed");
    self.states[idx.index()] = NodeState::Failed(FailureReason::Error);
    self.errors.push(ConfigError::Evaluation {
      reference,
      source: error,
    });
    self.propagate(idx);
  }

  /// Mark every transitive dependent of `failed` as skipped.
  fn propagate(&mut self, failed: NodeIndex) {
    let mut queue = VecDeque::from([failed]);
    while let Some(current) = queue.pop_front() {
      let cause = self.graph.reference(current);
      for dependent in self.graph.dependents(current) {
        if self.states[dependent.index()].is_terminal() {
          continue;
        }
        let reference = self.graph.reference(dependent);
        warn!(datasource = %reference, dependency = %cause, "skipping datasource, dependency failed");
        self.states[dependent.index()] = NodeState::Failed(FailureReason::Propagated(cause.clone()));
        self.errors.not_evaluated.push(NotEvaluated {
          reference: reference.clone(),
          reason: SkipReason::DependencyFailed(cause.clone()),
        });
        queue.push_back(dependent);
      }
    }
  }

  fn cancel_node(&mut self, idx: NodeIndex) {
    let reference = self.graph.reference(idx);
    debug!(datasource = %reference, "datasource cancelled");
    self.states[idx.index()] = NodeState::Failed(FailureReason::Cancelled);
    self.errors.not_evaluated.push(NotEvaluated {
      reference: reference.clone(),
      reason: SkipReason::Cancelled,
    });
  }

  /// Cancel every node that has not been dispatched yet.
  fn cancel_pending(&mut self) {
    self.ready.clear();
    let mut pending: Vec<NodeIndex> = self
      .graph
      .node_indices()
      .filter(|idx| {
        matches!(
          self.states[idx.index()],
          NodeState::Declared | NodeState::Validated | NodeState::Ready
        )
      })
      .collect();
    pending.sort_by_key(|idx| self.priority[idx.index()]);
    for idx in pending {
      self.cancel_node(idx);
    }
  }

  /// Fail nodes whose task was lost, so every node ends in a terminal state.
  fn abandon_unfinished(&mut self) {
    let unfinished: Vec<NodeIndex> = self
      .graph
      .node_indices()
      .filter(|idx| !self.states[idx.index()].is_terminal())
      .collect();
    for idx in unfinished {
      if self.states[idx.index()].is_terminal() {
        continue;
      }
      self.fail(idx, NodeError::Task("datasource task did not complete".to_string()));
    }
  }

  fn finish(self, order: &[NodeIndex]) -> Evaluation {
    let states: IndexMap<_, _> = self
      .graph
      .references()
      .cloned()
      .zip(self.states)
      .collect();
    let evaluation = Evaluation {
      store: self.store,
      states,
      order: order.iter().map(|idx| self.graph.reference(*idx).clone()).collect(),
      error: if self.errors.is_empty() { None } else { Some(self.errors) },
    };
    info!(
      resolved = evaluation.resolved(),
      failed = evaluation.failed(),
      skipped = evaluation.skipped(),
      cancelled = evaluation.cancelled(),
      "datasource evaluation complete"
    );
    evaluation
  }
}
