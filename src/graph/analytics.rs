//! Graph analytics: cycle discovery, foundations and chain depth.
//!
//! All functions operate on a [`KnowledgeGraph`] reference.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::NodeIndex;

use super::NodeId;
use super::index::KnowledgeGraph;

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

/// Enumerate every elementary cycle.
///
/// Each cycle is reported once, starting at its earliest-inserted node and
/// listing nodes in edge order (`[a, b]` for `a -> b -> a`). A self-loop is a
/// single-node cycle. Cycles are ordered by their start node, then by
/// discovery. The search only follows edges inside a strongly connected
/// component, and only through nodes inserted after the start node.
pub fn find_cycles(kg: &KnowledgeGraph) -> Vec<Vec<NodeId>> {
    let graph = kg.graph();
    let mut component: HashMap<NodeIndex, usize> = HashMap::new();
    for (i, members) in tarjan_scc(graph).into_iter().enumerate() {
        for idx in members {
            component.insert(idx, i);
        }
    }

    let mut search = CycleSearch {
        kg,
        component: &component,
        start: NodeIndex::new(0),
        path: Vec::new(),
        on_path: HashSet::new(),
        cycles: Vec::new(),
    };
    for start in graph.node_indices() {
        search.start = start;
        search.path = vec![start];
        search.on_path = HashSet::from([start]);
        search.extend(start);
    }
    search.cycles
}

/// Backtracking state for [`find_cycles`].
struct CycleSearch<'a> {
    kg: &'a KnowledgeGraph,
    component: &'a HashMap<NodeIndex, usize>,
    start: NodeIndex,
    path: Vec<NodeIndex>,
    on_path: HashSet<NodeIndex>,
    cycles: Vec<Vec<NodeId>>,
}

impl CycleSearch<'_> {
    fn extend(&mut self, node: NodeIndex) {
        let kg = self.kg;
        let graph = kg.graph();
        let start_component = self.component.get(&self.start).copied();
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            if next == self.start {
                self.cycles
                    .push(self.path.iter().map(|idx| graph[*idx].id.clone()).collect());
                continue;
            }
            if next < self.start
                || self.on_path.contains(&next)
                || self.component.get(&next).copied() != start_component
            {
                continue;
            }
            self.path.push(next);
            self.on_path.insert(next);
            self.extend(next);
            self.on_path.remove(&next);
            self.path.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// Nodes with no prerequisites, in insertion order.
pub fn foundation_nodes(kg: &KnowledgeGraph) -> Vec<NodeId> {
    nodes_without(kg, Direction::Outgoing)
}

/// Nodes nothing depends on, in insertion order.
pub fn capstone_nodes(kg: &KnowledgeGraph) -> Vec<NodeId> {
    nodes_without(kg, Direction::Incoming)
}

fn nodes_without(kg: &KnowledgeGraph, direction: Direction) -> Vec<NodeId> {
    let graph = kg.graph();
    graph
        .node_indices()
        .filter(|idx| graph.neighbors_directed(*idx, direction).next().is_none())
        .map(|idx| graph[idx].id.clone())
        .collect()
}

/// Edge count of the longest prerequisite chain, or `None` if the graph is cyclic.
pub fn longest_chain(kg: &KnowledgeGraph) -> Option<usize> {
    let graph = kg.graph();
    let order = toposort(graph, None).ok()?;
    let mut depth = vec![0usize; graph.node_count()];

    // Reverse topological order visits prerequisites before their dependents.
    for idx in order.into_iter().rev() {
        let d = graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|p| depth[p.index()] + 1)
            .max()
            .unwrap_or(0);
        depth[idx.index()] = d;
    }
    Some(depth.into_iter().max().unwrap_or(0))
}

/// Summary statistics for a knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    /// Nodes with no prerequisites.
    pub foundations: usize,
    /// Nodes nothing depends on.
    pub capstones: usize,
    pub longest_chain: Option<usize>,
    pub cycles: usize,
}

impl GraphStats {
    pub fn is_acyclic(&self) -> bool {
        self.cycles == 0
    }
}

/// Compute summary statistics.
pub fn graph_stats(kg: &KnowledgeGraph) -> GraphStats {
    GraphStats {
        nodes: kg.node_count(),
        edges: kg.edge_count(),
        foundations: foundation_nodes(kg).len(),
        capstones: capstone_nodes(kg).len(),
        longest_chain: longest_chain(kg),
        cycles: find_cycles(kg).len(),
    }
}

impl fmt::Display for GraphStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes:         {}", self.nodes)?;
        writeln!(f, "edges:         {}", self.edges)?;
        writeln!(f, "foundations:   {}", self.foundations)?;
        writeln!(f, "capstones:     {}", self.capstones)?;
        match self.longest_chain {
            Some(len) => write!(f, "longest chain: {len}"),
            None => write!(f, "longest chain: n/a ({} cycle(s))", self.cycles),
        }
    }
}
