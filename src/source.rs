//! Content loaders and profile stores.
//!
//! The core never talks to storage directly. A [`KnowledgeSource`] and a
//! [`QuizSource`] are read once per request to build the graph and the quiz
//! bank; a [`ProfileStore`] loads and saves learner profiles around it.
//!
//! [`ContentBundle`] is a JSON document implementing both content sources.
//! [`MemoryProfileStore`] keeps profiles in a `DashMap`, [`JsonProfileStore`]
//! keeps one `<user_id>.json` per learner in a directory.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, SourceError};
use crate::graph::{KnowledgeGraph, KnowledgeNode, PrerequisiteEdge};
use crate::policy::ScoringPolicy;
use crate::profile::{LearnerProfile, ProfileResult};
use crate::quiz::{Quiz, QuizRecord};

/// Result type for content loading.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Supplies knowledge nodes and prerequisite edges.
pub trait KnowledgeSource {
    fn nodes(&self) -> SourceResult<Vec<KnowledgeNode>>;
    fn edges(&self) -> SourceResult<Vec<PrerequisiteEdge>>;
}

/// Supplies unvalidated quiz records.
pub trait QuizSource {
    fn quiz_records(&self) -> SourceResult<Vec<QuizRecord>>;
}

/// Durable storage for learner profiles.
pub trait ProfileStore {
    /// The stored profile, or `None` if the learner is unknown.
    fn load(&self, user_id: &str) -> ProfileResult<Option<LearnerProfile>>;

    fn save(&self, profile: &LearnerProfile) -> ProfileResult<()>;

    /// Forget a learner. Returns whether anything was stored.
    fn remove(&self, user_id: &str) -> ProfileResult<bool>;

    /// The stored profile, or a fresh one for an unknown learner.
    fn load_or_create(&self, user_id: &str) -> ProfileResult<LearnerProfile> {
        match self.load(user_id)? {
            Some(profile) => Ok(profile),
            None => {
                tracing::debug!(user_id, "creating new profile");
                Ok(LearnerProfile::new(user_id))
            }
        }
    }
}

/// Build a graph from a knowledge source.
///
/// Nodes are added first. Edges naming an unknown node are skipped with a
/// warning. A cyclic result is returned as-is (with a warning) so the cycles
/// can be inspected.
pub fn build_graph<S: KnowledgeSource + ?Sized>(source: &S) -> SourceResult<KnowledgeGraph> {
    let mut kg = KnowledgeGraph::new();
    for node in source.nodes()? {
        kg.add_node(node.id, node.attrs);
    }

    let mut skipped = 0usize;
    for edge in source.edges()? {
        if !kg.has_node(&edge.dependent) || !kg.has_node(&edge.prerequisite) {
            tracing::warn!(
                dependent = %edge.dependent,
                prerequisite = %edge.prerequisite,
                "skipping edge with unknown endpoint"
            );
            skipped += 1;
            continue;
        }
        kg.add_edge(&edge.dependent, &edge.prerequisite);
    }

    if !kg.is_acyclic() {
        let cycles = kg.find_cycles();
        tracing::warn!(
            cycles = cycles.len(),
            first = ?cycles.first(),
            "knowledge graph contains prerequisite cycles"
        );
    }
    tracing::info!(
        nodes = kg.node_count(),
        edges = kg.edge_count(),
        skipped,
        "built knowledge graph"
    );
    Ok(kg)
}

/// Validate every quiz record, skipping invalid ones with a warning.
pub fn load_quizzes<S: QuizSource + ?Sized>(source: &S) -> SourceResult<Vec<Quiz>> {
    let records = source.quiz_records()?;
    let total = records.len();
    let quizzes: Vec<Quiz> = records
        .into_iter()
        .filter_map(|record| {
            let id = record.id.clone();
            match Quiz::try_from(record) {
                Ok(quiz) => Some(quiz),
                Err(e) => {
                    tracing::warn!(quiz_id = %id, error = %e, "skipping invalid quiz");
                    None
                }
            }
        })
        .collect();
    tracing::info!(loaded = quizzes.len(), total, "loaded quiz bank");
    Ok(quizzes)
}

// ---------------------------------------------------------------------------
// JSON content bundle
// ---------------------------------------------------------------------------

/// A self-contained content snapshot: nodes, edges and quiz records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentBundle {
    pub nodes: Vec<KnowledgeNode>,
    pub edges: Vec<PrerequisiteEdge>,
    pub quizzes: Vec<QuizRecord>,
}

impl ContentBundle {
    pub fn from_json_str(json: &str) -> SourceResult<Self> {
        serde_json::from_str(json).map_err(|e| SourceError::Parse {
            origin: "<inline>".into(),
            message: e.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> SourceResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| SourceError::Parse {
            origin: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> SourceResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| SourceError::Parse {
            origin: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }
}

impl KnowledgeSource for ContentBundle {
    fn nodes(&self) -> SourceResult<Vec<KnowledgeNode>> {
        Ok(self.nodes.clone())
    }

    fn edges(&self) -> SourceResult<Vec<PrerequisiteEdge>> {
        Ok(self.edges.clone())
    }
}

impl QuizSource for ContentBundle {
    fn quiz_records(&self) -> SourceResult<Vec<QuizRecord>> {
        Ok(self.quizzes.clone())
    }
}

// ---------------------------------------------------------------------------
// Profile stores
// ---------------------------------------------------------------------------

/// In-process profile store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<String, LearnerProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, user_id: &str) -> ProfileResult<Option<LearnerProfile>> {
        Ok(self.profiles.get(user_id).map(|p| p.value().clone()))
    }

    fn save(&self, profile: &LearnerProfile) -> ProfileResult<()> {
        self.profiles
            .insert(profile.user_id().to_string(), profile.clone());
        Ok(())
    }

    fn remove(&self, user_id: &str) -> ProfileResult<bool> {
        Ok(self.profiles.remove(user_id).is_some())
    }
}

/// One JSON file per learner under a directory.
///
/// Stored profiles are validated against the store's scoring policy, so a
/// store must be opened with the policy its profiles were written under.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    dir: PathBuf,
    scoring: ScoringPolicy,
}

impl JsonProfileStore {
    /// A store validating profiles against the default scoring policy.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_policy(dir, ScoringPolicy::default())
    }

    pub fn with_policy(dir: impl Into<PathBuf>, scoring: ScoringPolicy) -> Self {
        Self {
            dir: dir.into(),
            scoring,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `user_id`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        let file: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self, user_id: &str) -> ProfileResult<Option<LearnerProfile>> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(None);
        }
        LearnerProfile::load_with(&path, &self.scoring).map(Some)
    }

    fn save(&self, profile: &LearnerProfile) -> ProfileResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ProfileError::Io {
            path: self.dir.display().to_string(),
            source: e,
        })?;
        let path = self.path_for(profile.user_id());
        profile.save(&path)?;
        tracing::debug!(user_id = profile.user_id(), path = %path.display(), "saved profile");
        Ok(())
    }

    fn remove(&self, user_id: &str) -> ProfileResult<bool> {
        let path = self.path_for(user_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProfileError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"{
        "nodes": [
            {"id": "vars", "name": "Variables"},
            {"id": "loops", "name": "Loops", "description": "Repeating work"}
        ],
        "edges": [
            {"dependent": "loops", "prerequisite": "vars"},
            {"dependent": "loops", "prerequisite": "ghost"}
        ],
        "quizzes": [
            {"id": "q1", "linked_nodes": ["vars"], "quiz_type": "fill_in_blank",
             "content": {"stem": "x = ?", "answer": "1"}, "difficulty_level": 1},
            {"id": "bad-level", "linked_nodes": ["vars"], "quiz_type": "fill_in_blank",
             "difficulty_level": 8},
            {"id": "bad-type", "linked_nodes": ["vars"], "quiz_type": "essay",
             "difficulty_level": 2}
        ]
    }"#;

    #[test]
    fn build_graph_skips_unknown_endpoints() {
        let bundle = ContentBundle::from_json_str(BUNDLE).unwrap();
        let kg = build_graph(&bundle).unwrap();
        assert_eq!(kg.node_count(), 2);
        assert_eq!(kg.edge_count(), 1);
        assert!(!kg.has_node("ghost"));
        assert_eq!(kg.get_node_attrs("loops").unwrap().description.as_deref(), Some("Repeating work"));
    }

    #[test]
    fn build_graph_keeps_cycles_for_inspection() {
        let bundle = ContentBundle {
            nodes: vec![
                KnowledgeNode::new("a", Default::default()),
                KnowledgeNode::new("b", Default::default()),
            ],
            edges: vec![PrerequisiteEdge::new("a", "b"), PrerequisiteEdge::new("b", "a")],
            quizzes: vec![],
        };
        let kg = build_graph(&bundle).unwrap();
        assert!(!kg.is_acyclic());
        assert_eq!(kg.find_cycles().len(), 1);
    }

    #[test]
    fn load_quizzes_skips_invalid_records() {
        let bundle = ContentBundle::from_json_str(BUNDLE).unwrap();
        let quizzes = load_quizzes(&bundle).unwrap();
        assert_eq!(quizzes.len(), 1);
        assert_eq!(quizzes[0].id(), "q1");
    }

    #[test]
    fn malformed_bundle_is_a_parse_error() {
        let err = ContentBundle::from_json_str("[1, 2").unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryProfileStore::new();
        assert!(store.load("u").unwrap().is_none());
        let mut profile = store.load_or_create("u").unwrap();
        assert!(store.is_empty());
        profile.set_score("vars", 2.0);
        store.save(&profile).unwrap();
        assert_eq!(store.load("u").unwrap().unwrap().get_score("vars"), 2.0);
        assert!(store.remove("u").unwrap());
        assert!(!store.remove("u").unwrap());
    }

    #[test]
    fn json_store_sanitizes_file_names() {
        let store = JsonProfileStore::new("/tmp/profiles");
        assert_eq!(store.path_for("alice-01"), PathBuf::from("/tmp/profiles/alice-01.json"));
        assert_eq!(store.path_for("../etc/x"), PathBuf::from("/tmp/profiles/___etc_x.json"));
    }
}
