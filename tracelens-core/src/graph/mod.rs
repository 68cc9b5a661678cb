//! Dependency graph model, construction and critical path.

mod builder;
mod critical_path;
mod model;

pub use builder::{build_graph, GraphBuilder};
pub use critical_path::{contains_cycle, critical_path};
pub use model::{edge_key, DependencyGraph, EdgeType, GraphEdge, GraphNode, Metadata, NodeType};
