//! In-memory prerequisite graph.
//!
//! Uses `petgraph` for the graph structure and a `HashMap` for id lookups.
//! Edges point from a dependent node to its prerequisite.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::GraphError;

use super::traverse::{self, TraversalConfig, TraversalDirection};
use super::{KnowledgeNode, NodeAttrs, NodeId, PrerequisiteEdge, PrerequisiteLookup, analytics};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Prerequisite graph backed by petgraph.
///
/// Provides O(1) node lookups by id. The topological order is computed on
/// first request and cached until the next `add_node`/`add_edge`. The graph is
/// `Send + Sync`, so a built graph can be shared across threads.
#[derive(Clone, Default)]
pub struct KnowledgeGraph {
    /// Nodes carry their attributes; edges run dependent → prerequisite.
    graph: DiGraph<KnowledgeNode, ()>,
    /// NodeId → NodeIndex mapping.
    node_index: HashMap<NodeId, NodeIndex>,
    topo_order: OnceLock<Vec<NodeId>>,
}

impl KnowledgeGraph {
    /// Create a new empty knowledge graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a node exists for the given id, returning its NodeIndex.
    fn ensure_node(&mut self, node_id: &str) -> NodeIndex {
        if let Some(idx) = self.node_index.get(node_id) {
            return *idx;
        }
        let idx = self
            .graph
            .add_node(KnowledgeNode::new(node_id, NodeAttrs::default()));
        self.node_index.insert(node_id.to_string(), idx);
        idx
    }

    fn invalidate_order(&mut self) {
        self.topo_order = OnceLock::new();
    }

    /// Add a knowledge node, replacing the attributes if the id already exists.
    pub fn add_node(&mut self, node_id: impl Into<NodeId>, attrs: NodeAttrs) {
        let node_id = node_id.into();
        let idx = self.ensure_node(&node_id);
        self.graph[idx].attrs = attrs;
        self.invalidate_order();
    }

    /// Add a prerequisite edge: `dependent` requires `prerequisite`.
    ///
    /// Missing endpoints are created with empty attributes. Adding the same
    /// edge twice stores it once. No acyclicity check happens here.
    pub fn add_edge(&mut self, dependent: &str, prerequisite: &str) {
        let from = self.ensure_node(dependent);
        let to = self.ensure_node(prerequisite);
        self.graph.update_edge(from, to, ());
        self.invalidate_order();
    }

    /// All node ids in insertion order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].id.clone())
            .collect()
    }

    /// All prerequisite edges in insertion order.
    pub fn edges(&self) -> Vec<PrerequisiteEdge> {
        self.graph
            .edge_references()
            .map(|e| {
                PrerequisiteEdge::new(
                    self.graph[e.source()].id.clone(),
                    self.graph[e.target()].id.clone(),
                )
            })
            .collect()
    }

    /// Check if a node exists.
    pub fn has_node(&self, node_id: &str) -> bool {
        self.node_index.contains_key(node_id)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of prerequisite edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Get a node with its attributes.
    pub fn get_node(&self, node_id: &str) -> Option<&KnowledgeNode> {
        self.node_index.get(node_id).map(|idx| &self.graph[*idx])
    }

    /// Attributes of a node.
    pub fn get_node_attrs(&self, node_id: &str) -> GraphResult<&NodeAttrs> {
        let idx = self.index_of(node_id)?;
        Ok(&self.graph[idx].attrs)
    }

    fn index_of(&self, node_id: &str) -> GraphResult<NodeIndex> {
        self.node_index
            .get(node_id)
            .copied()
            .ok_or_else(|| GraphError::MissingNode {
                node_id: node_id.to_string(),
            })
    }

    fn neighbors(&self, node_id: &str, direction: Direction) -> GraphResult<BTreeSet<NodeId>> {
        let idx = self.index_of(node_id)?;
        Ok(self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].id.clone())
            .collect())
    }

    /// Immediate prerequisites of a node.
    pub fn get_prerequisites(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        self.neighbors(node_id, Direction::Outgoing)
    }

    /// Immediate dependents of a node (nodes that declare it as a prerequisite).
    pub fn get_dependents(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        self.neighbors(node_id, Direction::Incoming)
    }

    /// Transitive closure of prerequisites, excluding the node itself.
    pub fn get_all_prerequisites(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        let result = traverse::traverse_bfs(
            self,
            &[node_id],
            &TraversalConfig::unbounded(TraversalDirection::Prerequisites),
        )?;
        Ok(result.reached)
    }

    /// Transitive closure of dependents, excluding the node itself.
    pub fn get_all_dependents(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        let result = traverse::traverse_bfs(
            self,
            &[node_id],
            &TraversalConfig::unbounded(TraversalDirection::Dependents),
        )?;
        Ok(result.reached)
    }

    /// Whether the graph has no prerequisite cycles (self-loops included).
    pub fn is_acyclic(&self) -> bool {
        toposort(&self.graph, None).is_ok()
    }

    /// Every elementary cycle, self-loops included.
    pub fn find_cycles(&self) -> Vec<Vec<NodeId>> {
        analytics::find_cycles(self)
    }

    /// Nodes ordered so that every dependent precedes its prerequisites.
    ///
    /// Cached until the next mutation. Fails with `CycleDetected`, reporting
    /// the first discovered cycle, if the graph is not acyclic.
    pub fn topological_order(&self) -> GraphResult<&[NodeId]> {
        if let Some(order) = self.topo_order.get() {
            return Ok(order.as_slice());
        }
        let order = self.compute_topological_order()?;
        Ok(self.topo_order.get_or_init(|| order).as_slice())
    }

    fn compute_topological_order(&self) -> GraphResult<Vec<NodeId>> {
        match toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .into_iter()
                .map(|idx| self.graph[idx].id.clone())
                .collect()),
            Err(_) => {
                let cycles = self.find_cycles();
                tracing::debug!(cycles = cycles.len(), "topological order requested on cyclic graph");
                Err(GraphError::CycleDetected {
                    cycle: cycles.first().cloned().unwrap_or_default(),
                    count: cycles.len(),
                })
            }
        }
    }

    /// The target plus all its transitive prerequisites, in topological order.
    ///
    /// Because the order lists dependents first, the target comes first and
    /// the most foundational prerequisites come last.
    pub fn get_learning_path(&self, target: &str) -> GraphResult<Vec<NodeId>> {
        let mut members = self.get_all_prerequisites(target)?;
        members.insert(target.to_string());
        let order = self.topological_order()?;
        Ok(order
            .iter()
            .filter(|id| members.contains(id.as_str()))
            .cloned()
            .collect())
    }

    /// The learning path reversed: foundations first, the target last.
    pub fn get_study_sequence(&self, target: &str) -> GraphResult<Vec<NodeId>> {
        let mut path = self.get_learning_path(target)?;
        path.reverse();
        Ok(path)
    }

    /// Read-only access to the underlying petgraph.
    pub(crate) fn graph(&self) -> &DiGraph<KnowledgeNode, ()> {
        &self.graph
    }
}

impl PrerequisiteLookup for KnowledgeGraph {
    fn prerequisites(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        self.get_prerequisites(node_id)
    }

    fn dependents(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        self.get_dependents(node_id)
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<NodeId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    /// C depends on B, B depends on A.
    fn chain() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::new();
        kg.add_node("A", NodeAttrs::new("Variables"));
        kg.add_node("B", NodeAttrs::new("Loops"));
        kg.add_node("C", NodeAttrs::new("Recursion"));
        kg.add_edge("B", "A");
        kg.add_edge("C", "B");
        kg
    }

    #[test]
    fn chain_prerequisites() {
        let kg = chain();
        assert_eq!(kg.get_prerequisites("B").unwrap(), set(&["A"]));
        assert_eq!(kg.get_all_prerequisites("C").unwrap(), set(&["A", "B"]));
        assert_eq!(kg.get_dependents("A").unwrap(), set(&["B"]));
        assert_eq!(kg.get_all_dependents("A").unwrap(), set(&["B", "C"]));
        assert!(kg.get_prerequisites("A").unwrap().is_empty());
        assert!(kg.is_acyclic());
    }

    #[test]
    fn closing_the_chain_creates_a_cycle() {
        let mut kg = chain();
        kg.add_edge("A", "C");
        assert!(!kg.is_acyclic());
        assert!(!kg.find_cycles().is_empty());
        match kg.topological_order() {
            Err(GraphError::CycleDetected { cycle, count }) => {
                assert_eq!(count, 1);
                assert_eq!(cycle.len(), 3);
                assert!(cycle.contains(&"A".to_string()));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
        assert!(matches!(
            kg.get_learning_path("C"),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn cycle_error_counts_every_cycle() {
        let mut kg = KnowledgeGraph::new();
        kg.add_edge("A", "B");
        kg.add_edge("B", "A");
        kg.add_edge("B", "C");
        kg.add_edge("C", "B");
        match kg.topological_order() {
            Err(GraphError::CycleDetected { cycle, count }) => {
                assert_eq!(count, 2);
                assert_eq!(cycle, vec!["A", "B"]);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn order_is_shared_across_threads() {
        let kg = chain();
        let orders: Vec<Vec<NodeId>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| kg.topological_order().map(<[NodeId]>::to_vec)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });
        assert!(orders.iter().all(|o| o == &vec!["C", "B", "A"]));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut kg = KnowledgeGraph::new();
        kg.add_edge("x", "x");
        assert!(!kg.is_acyclic());
        assert_eq!(kg.find_cycles(), vec![vec!["x".to_string()]]);
    }

    #[test]
    fn missing_node_errors() {
        let kg = chain();
        for result in [
            kg.get_prerequisites("nope"),
            kg.get_dependents("nope"),
            kg.get_all_prerequisites("nope"),
        ] {
            assert!(matches!(result, Err(GraphError::MissingNode { .. })));
        }
        assert!(matches!(
            kg.get_node_attrs("nope"),
            Err(GraphError::MissingNode { .. })
        ));
        assert!(matches!(
            kg.get_learning_path("nope"),
            Err(GraphError::MissingNode { .. })
        ));
    }

    #[test]
    fn topological_order_is_a_permutation() {
        let mut kg = chain();
        kg.add_node("D", NodeAttrs::new("Closures"));
        kg.add_edge("D", "A");
        let order = kg.topological_order().unwrap().to_vec();
        let mut sorted = order.clone();
        sorted.sort();
        let mut nodes = kg.nodes();
        nodes.sort();
        assert_eq!(sorted, nodes);

        // Every dependent precedes its prerequisites.
        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        for edge in kg.edges() {
            assert!(pos(&edge.dependent) < pos(&edge.prerequisite));
        }
    }

    #[test]
    fn learning_path_lists_target_first() {
        let kg = chain();
        assert_eq!(kg.get_learning_path("C").unwrap(), vec!["C", "B", "A"]);
        assert_eq!(kg.get_learning_path("B").unwrap(), vec!["B", "A"]);
        assert_eq!(kg.get_study_sequence("C").unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn order_cache_invalidated_on_mutation() {
        let mut kg = chain();
        assert_eq!(kg.topological_order().unwrap().len(), 3);
        kg.add_node("E", NodeAttrs::new("Iterators"));
        assert_eq!(kg.topological_order().unwrap().len(), 4);
        kg.add_edge("E", "C");
        let order = kg.topological_order().unwrap().to_vec();
        assert_eq!(order.first().map(String::as_str), Some("E"));
    }

    #[test]
    fn add_edge_creates_missing_nodes_once() {
        let mut kg = KnowledgeGraph::new();
        kg.add_edge("b", "a");
        kg.add_edge("b", "a");
        assert_eq!(kg.node_count(), 2);
        assert_eq!(kg.edge_count(), 1);
        assert_eq!(kg.edges(), vec![PrerequisiteEdge::new("b", "a")]);
        assert_eq!(kg.get_node_attrs("a").unwrap(), &NodeAttrs::default());
    }

    #[test]
    fn add_node_replaces_attrs() {
        let mut kg = KnowledgeGraph::new();
        kg.add_node("n", NodeAttrs::new("Old"));
        kg.add_node("n", NodeAttrs::new("New").with_example("e.g."));
        assert_eq!(kg.node_count(), 1);
        let attrs = kg.get_node_attrs("n").unwrap();
        assert_eq!(attrs.name, "New");
        assert_eq!(attrs.example.as_deref(), Some("e.g."));
    }

    #[test]
    fn nodes_keep_insertion_order() {
        let kg = chain();
        assert_eq!(kg.nodes(), vec!["A", "B", "C"]);
    }
}
