//! Multi-hop prerequisite traversal.
//!
//! BFS from seed nodes toward prerequisites or dependents, with a depth limit
//! and a cap on the number of collected nodes. Works over any
//! [`PrerequisiteLookup`], so a cached graph walks the same way as a bare one.

use std::collections::{BTreeSet, HashSet, VecDeque};

use super::index::GraphResult;
use super::{NodeId, PrerequisiteLookup};

/// Which way to follow prerequisite edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// From a node to what it requires.
    Prerequisites,
    /// From a node to what requires it.
    Dependents,
}

/// Configuration for a traversal.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    pub direction: TraversalDirection,
    /// Maximum hop depth from seed nodes.
    pub max_depth: usize,
    /// Maximum number of reached nodes to collect.
    pub max_results: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            direction: TraversalDirection::Prerequisites,
            max_depth: 3,
            max_results: 10_000,
        }
    }
}

impl TraversalConfig {
    /// Follow `direction` to exhaustion.
    pub fn unbounded(direction: TraversalDirection) -> Self {
        Self {
            direction,
            max_depth: usize::MAX,
            max_results: usize::MAX,
        }
    }
}

/// Result of a traversal.
#[derive(Debug, Clone, Default)]
pub struct TraversalResult {
    /// Nodes reached from the seeds. Seeds are never included.
    pub reached: BTreeSet<NodeId>,
    /// `reached` in discovery order.
    pub order: Vec<NodeId>,
    /// Maximum depth actually reached.
    pub depth_reached: usize,
}

/// Perform a BFS traversal from seed nodes.
///
/// Fails with `MissingNode` if a seed (or a node reached through the lookup)
/// is not in the graph.
pub fn traverse_bfs<L: PrerequisiteLookup + ?Sized>(
    lookup: &L,
    seeds: &[&str],
    config: &TraversalConfig,
) -> GraphResult<TraversalResult> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut result = TraversalResult::default();

    // BFS queue: (node, current_depth)
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();

    for seed in seeds {
        if seen.insert(seed.to_string()) {
            queue.push_back((seed.to_string(), 0));
        }
    }

    while let Some((node, depth)) = queue.pop_front() {
        // Seeds are always resolved so that unknown ids surface as errors.
        if depth > 0 && depth >= config.max_depth {
            continue;
        }
        let next = match config.direction {
            TraversalDirection::Prerequisites => lookup.prerequisites(&node)?,
            TraversalDirection::Dependents => lookup.dependents(&node)?,
        };
        if depth >= config.max_depth {
            continue;
        }

        for neighbor in next {
            if result.reached.len() >= config.max_results {
                return Ok(result);
            }
            if seen.insert(neighbor.clone()) {
                result.depth_reached = result.depth_reached.max(depth + 1);
                result.reached.insert(neighbor.clone());
                result.order.push(neighbor.clone());
                queue.push_back((neighbor, depth + 1));
            }
        }
    }

    Ok(result)
}

/// Everything `node_id` transitively requires, up to `max_depth` hops.
pub fn prerequisites_within<L: PrerequisiteLookup + ?Sized>(
    lookup: &L,
    node_id: &str,
    max_depth: usize,
) -> GraphResult<BTreeSet<NodeId>> {
    let result = traverse_bfs(
        lookup,
        &[node_id],
        &TraversalConfig {
            direction: TraversalDirection::Prerequisites,
            max_depth,
            max_results: usize::MAX,
        },
    )?;
    Ok(result.reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::graph::{KnowledgeGraph, NodeAttrs};

    // D -> C -> B -> A, each requiring the next.
    fn build_chain_graph() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::new();
        for id in ["A", "B", "C", "D"] {
            kg.add_node(id, NodeAttrs::new(id));
        }
        kg.add_edge("B", "A");
        kg.add_edge("C", "B");
        kg.add_edge("D", "C");
        kg
    }

    #[test]
    fn bfs_depth_1() {
        let kg = build_chain_graph();
        let result = traverse_bfs(
            &kg,
            &["D"],
            &TraversalConfig {
                max_depth: 1,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(result.order, vec!["C"]);
        assert_eq!(result.depth_reached, 1);
    }

    #[test]
    fn bfs_full_chain() {
        let kg = build_chain_graph();
        let result =
            traverse_bfs(&kg, &["D"], &TraversalConfig::unbounded(TraversalDirection::Prerequisites))
                .unwrap();

        assert_eq!(result.order, vec!["C", "B", "A"]);
        assert_eq!(result.depth_reached, 3);
        assert!(!result.reached.contains("D"));
    }

    #[test]
    fn bfs_toward_dependents() {
        let kg = build_chain_graph();
        let result =
            traverse_bfs(&kg, &["B"], &TraversalConfig::unbounded(TraversalDirection::Dependents))
                .unwrap();
        assert_eq!(result.order, vec!["C", "D"]);
    }

    #[test]
    fn max_results_caps_collection() {
        let kg = build_chain_graph();
        let result = traverse_bfs(
            &kg,
            &["D"],
            &TraversalConfig {
                max_depth: 10,
                max_results: 2,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.reached.len(), 2);
    }

    #[test]
    fn cycle_terminates_and_excludes_seed() {
        let mut kg = KnowledgeGraph::new();
        kg.add_edge("A", "B");
        kg.add_edge("B", "A");
        let reached = prerequisites_within(&kg, "A", usize::MAX).unwrap();
        assert_eq!(reached.len(), 1);
        assert!(reached.contains("B"));
    }

    #[test]
    fn unknown_seed_errors_even_at_depth_zero() {
        let kg = build_chain_graph();
        let err = traverse_bfs(
            &kg,
            &["nope"],
            &TraversalConfig {
                max_depth: 0,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::MissingNode { .. }));
    }
}
