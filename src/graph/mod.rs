//! Dependency graph over named nodes.
//!
//! Used to order plugins by their base/dependency relationships and module
//! types by their base types, and to report cycles with the full offending path.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;

/// A cycle in a [`DependencyGraph`].
///
/// `path` starts and ends with the same node, e.g. `["a", "b", "a"]`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circular dependency detected: {}", self.render())]
pub struct CycleError {
    pub path: Vec<String>,
}

impl CycleError {
    /// Render the cycle as `a → b → a`.
    #[must_use]
    pub fn render(&self) -> String {
        self.path.join(" → ")
    }
}

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (in the DFS stack).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Directed graph where an edge `a -> b` means `a` depends on `b`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it doesn't already exist, returning its index.
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            index
        } else {
            let index = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), index);
            index
        }
    }

    /// Record that `dependant` depends on `dependency`. Missing nodes are added.
    pub fn add_dependency(&mut self, dependant: &str, dependency: &str) {
        let from = self.add_node(dependant);
        let to = self.add_node(dependency);

        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Detect cycles using DFS with colors.
    pub fn detect_cycles(&self) -> Result<(), CycleError> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|node| (node, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if colors.get(&node) == Some(&Color::White)
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                return Err(CycleError {
                    path: cycle.into_iter().map(|idx| self.graph[idx].clone()).collect(),
                });
            }
        }

        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.sorted_neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Neighbors in insertion order; petgraph yields them newest first.
    fn sorted_neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        neighbors.sort_unstable();
        neighbors
    }

    /// All nodes ordered so that dependencies come before their dependants.
    pub fn overall_order(&self) -> Result<Vec<String>, CycleError> {
        self.detect_cycles()?;

        let indices = toposort(&self.graph, None).map_err(|cycle| CycleError {
            path: vec![self.graph[cycle.node_id()].clone(); 2],
        })?;

        Ok(indices.into_iter().rev().map(|idx| self.graph[idx].clone()).collect())
    }

    /// Everything `name` depends on, directly or indirectly.
    #[must_use]
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        let mut queue = VecDeque::new();

        if let Some(&idx) = self.node_map.get(name) {
            queue.push_back(idx);

            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors(current) {
                    if deps.insert(self.graph[neighbor].clone()) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_dependency_chain() {
        let mut graph = DependencyGraph::new();

        // a -> b -> c
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");

        assert!(graph.detect_cycles().is_ok());

        let order = graph.overall_order().unwrap();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph.add_dependency("c", "a");

        let err = graph.detect_cycles().unwrap_err();
        assert_eq!(err.path, vec!["a", "b", "c", "a"]);
        assert_eq!(err.to_string(), "Circular dependency detected: a → b → c → a");
        assert!(graph.overall_order().is_err());
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "a");
        assert_eq!(graph.detect_cycles().unwrap_err().render(), "a → a");
    }

    #[test]
    fn test_diamond_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "c");
        graph.add_dependency("b", "d");
        graph.add_dependency("c", "d");

        let order = graph.overall_order().unwrap();
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("d") < position("b"));
        assert!(position("d") < position("c"));
        assert!(position("b") < position("a"));
        assert_eq!(
            graph.transitive_dependencies("a").into_iter().collect::<Vec<_>>(),
            vec!["b", "c", "d"]
        );
    }

    #[test]
    fn test_standalone_nodes_and_repeated_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_node("standalone");
        graph.add_dependency("a", "z");
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "z");

        let order = graph.overall_order().unwrap();
        assert_eq!(order.len(), 4);
        assert!(order.contains(&"standalone".to_string()));
        assert!(graph.transitive_dependencies("standalone").is_empty());
        assert!(graph.transitive_dependencies("missing").is_empty());
        assert_eq!(graph.transitive_dependencies("a").into_iter().collect::<Vec<_>>(), vec!["b", "z"]);
    }
}
