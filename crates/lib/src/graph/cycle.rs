//! Cycle detection over the datasource graph.
//!
//! Depth-first search in declaration order, following each node's
//! dependencies in the order they were declared. A dependency that is still
//! on the DFS stack closes a cycle; the members are the stack slice from that
//! dependency onwards, with the dependency repeated at the end
//! (`gummy -> bear -> gummy`).

use petgraph::graph::NodeIndex;

use crate::error::ConfigError;
use crate::reference::Reference;

use super::DatasourceGraph;

/// Every cycle reachable by the search, in discovery order.
pub fn find_cycles(graph: &DatasourceGraph) -> Vec<Vec<Reference>> {
  let mut visited = vec![false; graph.len()];
  let mut on_stack = vec![false; graph.len()];
  let mut stack = Vec::new();
  let mut cycles = Vec::new();

  for start in graph.node_indices() {
    if !visited[start.index()] {
      find_cycles_dfs(graph, start, &mut visited, &mut stack, &mut on_stack, &mut cycles);
    }
  }

  cycles
}

fn find_cycles_dfs(
  graph: &DatasourceGraph,
  node: NodeIndex,
  visited: &mut [bool],
  stack: &mut Vec<NodeIndex>,
  on_stack: &mut [bool],
  cycles: &mut Vec<Vec<Reference>>,
) {
  visited[node.index()] = true;
  stack.push(node);
  on_stack[node.index()] = true;

  for dep in graph.dependencies(node) {
    if !visited[dep.index()] {
      find_cycles_dfs(graph, dep, visited, stack, on_stack, cycles);
    } else if on_stack[dep.index()]
      && let Some(cycle_start) = stack.iter().position(|n| *n == dep)
    {
      let mut members: Vec<Reference> = stack[cycle_start..].iter().map(|n| graph.reference(*n).clone()).collect();
      members.push(graph.reference(dep).clone());
      cycles.push(members);
    }
  }

  stack.pop();
  on_stack[node.index()] = false;
}

/// Fail with the first cycle found, if any.
pub fn validate(graph: &DatasourceGraph) -> Result<(), ConfigError> {
  match find_cycles(graph).into_iter().next() {
    Some(members) => Err(ConfigError::Cycle { members }),
    None => Ok(()),
  }
}
