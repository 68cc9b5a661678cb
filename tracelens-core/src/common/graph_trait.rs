//! Shared graph traversal abstraction.
//!
//! The dependency graph, the risk calculator and the tests all walk
//! id-keyed adjacency lists the same way; this trait holds the BFS code once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Trait for graph traversal operations.
///
/// # Type Parameters
/// - `Node`: The node identifier type (e.g., `&str`, `String`)
///
/// # Example
/// ```ignore
/// impl GraphTraversal for DependencyGraph {
///     type Node = String;
///
///     fn neighbors(&self, node: &String) -> Vec<String> {
///         self.nodes.get(node).map(|n| n.children.clone()).unwrap_or_default()
///     }
///
///     fn contains_node(&self, node: &String) -> bool {
///         self.nodes.contains_key(node)
///     }
/// }
///
/// let reachable = graph.reachable_from(graph.root_nodes.clone());
/// ```
pub trait GraphTraversal {
    /// The type used to identify nodes in the graph.
    type Node: Clone + Eq + Hash;

    /// Returns all neighbors (outgoing edges) of a node.
    fn neighbors(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Checks if the graph contains a node.
    fn contains_node(&self, node: &Self::Node) -> bool;

    /// Performs multi-source BFS to find all nodes reachable from the given roots.
    ///
    /// - Complexity: O(|V| + |E|) regardless of number of roots
    /// - Roots missing from the graph are ignored
    fn reachable_from<I>(&self, roots: I) -> HashSet<Self::Node>
    where
        I: IntoIterator<Item = Self::Node>,
    {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if self.contains_node(&root) && !visited.contains(&root) {
                visited.insert(root.clone());
                queue.push_back(root);
            }
        }

        while let Some(node) = queue.pop_front() {
            for neighbor in self.neighbors(&node) {
                if !visited.contains(&neighbor) {
                    visited.insert(neighbor.clone());
                    queue.push_back(neighbor);
                }
            }
        }

        visited
    }

    /// Performs BFS to find all nodes reachable from a single root.
    fn reachable_from_single(&self, root: Self::Node) -> HashSet<Self::Node> {
        self.reachable_from(std::iter::once(root))
    }

    /// Shortest path (fewest hops) from any of `roots` to `target`.
    ///
    /// Roots are tried in the order given; the returned path starts at the
    /// root it was reached from and ends at `target`. Returns `None` when
    /// the target is not reachable.
    fn path_from<I>(&self, roots: I, target: &Self::Node) -> Option<Vec<Self::Node>>
    where
        I: IntoIterator<Item = Self::Node>,
    {
        let mut predecessor: HashMap<Self::Node, Option<Self::Node>> = HashMap::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if self.contains_node(&root) && !predecessor.contains_key(&root) {
                predecessor.insert(root.clone(), None);
                queue.push_back(root);
            }
        }

        while let Some(node) = queue.pop_front() {
            if &node == target {
                let mut path = vec![node.clone()];
                let mut current = node;
                while let Some(Some(prev)) = predecessor.get(&current) {
                    path.push(prev.clone());
                    current = prev.clone();
                }
                path.reverse();
                return Some(path);
            }
            for neighbor in self.neighbors(&node) {
                if !predecessor.contains_key(&neighbor) {
                    predecessor.insert(neighbor.clone(), Some(node.clone()));
                    queue.push_back(neighbor);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal adjacency-list graph for exercising the default methods.
    struct TestGraph {
        nodes: HashSet<String>,
        edges: HashMap<String, Vec<String>>,
    }

    impl TestGraph {
        fn new() -> Self {
            Self {
                nodes: HashSet::new(),
                edges: HashMap::new(),
            }
        }

        fn add_node(&mut self, node: &str) {
            self.nodes.insert(node.to_string());
        }

        fn add_edge(&mut self, from: &str, to: &str) {
            self.add_node(from);
            self.add_node(to);
            self.edges
                .entry(from.to_string())
                .or_default()
                .push(to.to_string());
        }
    }

    impl GraphTraversal for TestGraph {
        type Node = String;

        fn neighbors(&self, node: &String) -> Vec<String> {
            self.edges.get(node).cloned().unwrap_or_default()
        }

        fn contains_node(&self, node: &String) -> bool {
            self.nodes.contains(node)
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = TestGraph::new();
        let reachable = graph.reachable_from(Vec::<String>::new());
        assert!(reachable.is_empty());
    }

    #[test]
    fn test_multi_source() {
        let mut graph = TestGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("c", "d");
        graph.add_node("unreachable");

        let reachable = graph.reachable_from(["a".to_string(), "c".to_string()]);
        assert_eq!(reachable.len(), 4);
        assert!(!reachable.contains("unreachable"));
    }

    #[test]
    fn test_cycle() {
        let mut graph = TestGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("c", "a");

        let reachable = graph.reachable_from_single("a".to_string());
        assert_eq!(reachable.len(), 3);
    }

    #[test]
    fn test_path_from_picks_fewest_hops() {
        let mut graph = TestGraph::new();
        graph.add_edge("root", "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", "target");
        graph.add_edge("root", "target");

        let path = graph
            .path_from(["root".to_string()], &"target".to_string())
            .unwrap();
        assert_eq!(path, vec!["root".to_string(), "target".to_string()]);
    }

    #[test]
    fn test_path_from_root_itself() {
        let mut graph = TestGraph::new();
        graph.add_node("root");
        let path = graph.path_from(["root".to_string()], &"root".to_string());
        assert_eq!(path, Some(vec!["root".to_string()]));
    }

    #[test]
    fn test_path_from_unreachable() {
        let mut graph = TestGraph::new();
        graph.add_edge("a", "b");
        graph.add_node("island");
        assert!(graph
            .path_from(["a".to_string()], &"island".to_string())
            .is_none());
    }
}
