//! Knowledge graph: learnable concepts linked by prerequisite edges.
//!
//! An edge `dependent -> prerequisite` means the dependent concept requires
//! mastery of the prerequisite first.
//!
//! - **Index** ([`KnowledgeGraph`]): `petgraph` DAG with a cached topological order
//! - **Traversal** ([`traverse`]): depth-limited walks toward prerequisites or dependents
//! - **Analytics** ([`analytics`]): cycle discovery and summary statistics
//! - **Cache** ([`cache::CachedLookup`]): memoizing decorator over prerequisite lookups

pub mod analytics;
pub mod cache;
pub mod index;
pub mod traverse;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use index::{GraphResult, KnowledgeGraph};

/// Opaque knowledge-node identifier. Nodes compare by id.
pub type NodeId = String;

/// Descriptive attributes carried by a knowledge node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAttrs {
    /// Human-readable concept name.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl NodeAttrs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }
}

/// A knowledge node: an atomic learnable concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub attrs: NodeAttrs,
}

impl KnowledgeNode {
    pub fn new(id: impl Into<NodeId>, attrs: NodeAttrs) -> Self {
        Self {
            id: id.into(),
            attrs,
        }
    }
}

impl PartialEq for KnowledgeNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for KnowledgeNode {}

impl std::hash::Hash for KnowledgeNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A directed prerequisite relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrerequisiteEdge {
    /// The node that has the requirement.
    pub dependent: NodeId,
    /// The node that must be learned first.
    pub prerequisite: NodeId,
}

impl PrerequisiteEdge {
    pub fn new(dependent: impl Into<NodeId>, prerequisite: impl Into<NodeId>) -> Self {
        Self {
            dependent: dependent.into(),
            prerequisite: prerequisite.into(),
        }
    }
}

/// Immediate prerequisite/dependent queries.
///
/// Implemented by [`KnowledgeGraph`] and by [`cache::CachedLookup`], so
/// scoring and suggestion run the same way over a bare or a cached graph.
pub trait PrerequisiteLookup {
    /// Nodes `node_id` directly depends on.
    fn prerequisites(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>>;

    /// Nodes that directly declare `node_id` as a prerequisite.
    fn dependents(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>>;
}

impl<T: PrerequisiteLookup + ?Sized> PrerequisiteLookup for &T {
    fn prerequisites(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        (**self).prerequisites(node_id)
    }

    fn dependents(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        (**self).dependents(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_compare_by_id() {
        let a = KnowledgeNode::new("loops", NodeAttrs::new("Loops"));
        let b = KnowledgeNode::new("loops", NodeAttrs::new("For loops").with_example("for x in xs"));
        assert_eq!(a, b);
    }

    #[test]
    fn node_json_is_flat() {
        let node = KnowledgeNode::new("vars", NodeAttrs::new("Variables").with_description("Named values"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["id"], "vars");
        assert_eq!(json["name"], "Variables");
        assert_eq!(json["description"], "Named values");
        assert!(json.get("example").is_none());

        let back: KnowledgeNode = serde_json::from_str(r#"{"id": "bare"}"#).unwrap();
        assert_eq!(back.id, "bare");
        assert_eq!(back.attrs, NodeAttrs::default());
    }
}
