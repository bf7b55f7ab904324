//! Datasource dependency graph.
//!
//! Nodes are datasource blocks, added in declaration order so a node's index
//! is its declaration position. Edges point from a dependency to its
//! dependent. The graph is only handed out once it is known to be complete
//! (every edge target declared, every type registered) and acyclic.

pub mod cycle;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::block::{BlockId, DatasourceBlock, datasource_reference};
use crate::error::{AggregateError, ConfigError};
use crate::plugin::PluginRegistry;
use crate::reference::Reference;

/// A validated, acyclic graph of datasource blocks.
#[derive(Debug)]
pub struct DatasourceGraph {
  graph: DiGraph<Reference, ()>,
  nodes: HashMap<Reference, NodeIndex>,
  /// Indexed by `NodeIndex::index()`.
  blocks: Vec<DatasourceBlock>,
}

impl DatasourceGraph {
  /// Build the graph from decoded datasource blocks.
  ///
  /// # Errors
  ///
  /// Collects every problem instead of stopping at the first: unlabelled
  /// blocks, duplicate declarations, dependencies on undeclared blocks,
  /// types without a registered plugin, and every dependency cycle.
  pub fn build(blocks: Vec<DatasourceBlock>, registry: &PluginRegistry) -> Result<Self, AggregateError> {
    let (graph, mut errors) = Self::assemble(blocks, registry);
    errors.extend(
      cycle::find_cycles(&graph)
        .into_iter()
        .map(|members| ConfigError::Cycle { members }),
    );
    if !errors.is_empty() {
      return Err(errors.into());
    }
    debug!(nodes = graph.len(), edges = graph.graph.edge_count(), "datasource graph built");
    Ok(graph)
  }

  /// Build nodes and edges without checking for cycles.
  pub(crate) fn assemble(blocks: Vec<DatasourceBlock>, registry: &PluginRegistry) -> (Self, Vec<ConfigError>) {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<Reference, NodeIndex> = HashMap::new();
    let mut kept: Vec<DatasourceBlock> = Vec::new();
    let mut errors = Vec::new();

    // First pass: one node per valid, first-declared block
    for block in blocks {
      let reference = match datasource_reference(&block) {
        Ok(reference) => reference,
        Err(e) => {
          errors.push(e);
          continue;
        }
      };
      if let Some(&existing) = nodes.get(&reference) {
        errors.push(ConfigError::DuplicateBlock {
          id: BlockId::Block(reference),
          first: kept[existing.index()].site.clone(),
          second: block.site,
        });
        continue;
      }
      if !registry.contains(&block.type_name) {
        errors.push(ConfigError::UnregisteredType {
          reference: reference.clone(),
          type_name: block.type_name.clone(),
        });
      }
      let idx = graph.add_node(reference.clone());
      nodes.insert(reference, idx);
      kept.push(block);
    }

    // Second pass: edges from dependency to dependent
    for (i, block) in kept.iter().enumerate() {
      let idx = NodeIndex::new(i);
      for dep in &block.dependencies {
        match nodes.get(dep) {
          Some(&dep_idx) => {
            graph.add_edge(dep_idx, idx, ());
          }
          None => errors.push(ConfigError::UnknownReference {
            referrer: BlockId::Block(graph[idx].clone()),
            missing: dep.clone(),
          }),
        }
      }
    }

    (
      Self {
        graph,
        nodes,
        blocks: kept,
      },
      errors,
    )
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Node indices in declaration order.
  pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
    self.graph.node_indices()
  }

  /// References in declaration order.
  pub fn references(&self) -> impl Iterator<Item = &Reference> {
    self.graph.node_weights()
  }

  pub fn index_of(&self, reference: &Reference) -> Option<NodeIndex> {
    self.nodes.get(reference).copied()
  }

  pub fn contains(&self, reference: &Reference) -> bool {
    self.nodes.contains_key(reference)
  }

  /// The reference of a node. Panics on an index from another graph.
  pub fn reference(&self, idx: NodeIndex) -> &Reference {
    &self.graph[idx]
  }

  /// The block of a node. Panics on an index from another graph.
  pub fn block(&self, idx: NodeIndex) -> &DatasourceBlock {
    &self.blocks[idx.index()]
  }

  pub fn block_for(&self, reference: &Reference) -> Option<&DatasourceBlock> {
    self.index_of(reference).map(|idx| self.block(idx))
  }

  /// Direct dependencies of a node, in the order they were declared.
  pub fn dependencies(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    self.blocks[idx.index()]
      .dependencies
      .iter()
      .filter_map(|dep| self.nodes.get(dep).copied())
      .collect()
  }

  /// Direct dependents of a node, in declaration order.
  pub fn dependents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut dependents: Vec<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Outgoing).collect();
    dependents.sort();
    dependents.dedup();
    dependents
  }

  /// Number of distinct direct dependencies of a node.
  pub fn in_degree(&self, idx: NodeIndex) -> usize {
    let mut deps: Vec<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Incoming).collect();
    deps.sort();
    deps.dedup();
    deps.len()
  }

  /// Dependencies-first order, ties broken by declaration order.
  ///
  /// The result is a pure function of the graph: the same configuration
  /// always yields the same order.
  ///
  /// # Errors
  ///
  /// [`ConfigError::Cycle`] if the graph is cyclic.
  pub fn topological_order(&self) -> Result<Vec<NodeIndex>, ConfigError> {
    let mut in_degree: Vec<usize> = self.node_indices().map(|idx| self.in_degree(idx)).collect();
    let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
      .node_indices()
      .filter(|idx| in_degree[idx.index()] == 0)
      .map(Reverse)
      .collect();
    let mut order = Vec::with_capacity(self.len());

    while let Some(Reverse(idx)) = ready.pop() {
      order.push(idx);
      for dependent in self.dependents(idx) {
        in_degree[dependent.index()] -= 1;
        if in_degree[dependent.index()] == 0 {
          ready.push(Reverse(dependent));
        }
      }
    }

    if order.len() != self.len() {
      cycle::validate(self)?;
    }
    Ok(order)
  }

  /// [`Self::topological_order`] as references.
  pub fn ordered_references(&self) -> Result<Vec<Reference>, ConfigError> {
    Ok(
      self
        .topological_order()?
        .into_iter()
        .map(|idx| self.reference(idx).clone())
        .collect(),
    )
  }
}
