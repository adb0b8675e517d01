//! Public operations and the request-scoped tutor facade.
//!
//! The free functions are the stateless entry points: suggest a quiz, apply
//! an outcome, summarize progress, reset a learner. [`Tutor`] bundles a
//! policy, a cached graph and a quiz bank for callers that serve many
//! requests against one content snapshot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{QuizError, TutorResult};
use crate::graph::cache::{CacheStats, CachedLookup};
use crate::graph::{KnowledgeGraph, NodeId};
use crate::policy::Policy;
use crate::profile::LearnerProfile;
use crate::quiz::Quiz;
use crate::scoring::{ScoreUpdate, ScoringSystem};
use crate::source::{self, ContentBundle, JsonProfileStore, KnowledgeSource, QuizSource};
use crate::suggest::{Suggestion, SuggestionEngine};

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Suggest the next quiz with the default policy.
pub fn suggest_next_quiz<'q>(
    profile: &LearnerProfile,
    graph: &KnowledgeGraph,
    quizzes: &'q [Quiz],
) -> TutorResult<&'q Quiz> {
    Ok(SuggestionEngine::new(graph).suggest(profile, quizzes)?)
}

/// Apply a quiz outcome with the default policy and hand the profile back.
pub fn update_scores(
    mut profile: LearnerProfile,
    quiz: &Quiz,
    is_correct: bool,
    graph: &KnowledgeGraph,
) -> LearnerProfile {
    ScoringSystem::new(graph).apply_quiz(&mut profile, quiz, is_correct, Utc::now());
    profile
}

/// Summarize a learner's progress with the default policy.
pub fn get_learning_progress(profile: &LearnerProfile, graph: &KnowledgeGraph) -> LearningProgress {
    LearningProgress::compute(profile, graph.node_count(), &Policy::default(), Utc::now())
}

/// A fresh, empty profile for `user_id`.
pub fn reset_user_progress(user_id: &str) -> LearnerProfile {
    tracing::info!(user_id, "resetting learner progress");
    LearnerProfile::new(user_id)
}

// ---------------------------------------------------------------------------
// Progress summary
// ---------------------------------------------------------------------------

/// Progress metrics for one learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningProgress {
    pub mastered_nodes: Vec<NodeId>,
    /// Scored nodes with `0 <= score < mastery_threshold`.
    pub in_progress_nodes: Vec<NodeId>,
    /// Negative-score nodes, weakest first.
    pub weak_nodes: Vec<NodeId>,
    /// Scored nodes as a percentage of graph nodes.
    pub coverage_pct: f64,
    pub total_attempts: u64,
    pub total_correct: u64,
    /// Accuracy over the most recent attempts.
    pub accuracy: f64,
    /// Schedule entries currently due.
    pub next_due_reviews: usize,
}

impl LearningProgress {
    pub fn compute(
        profile: &LearnerProfile,
        graph_nodes: usize,
        policy: &Policy,
        now: DateTime<Utc>,
    ) -> Self {
        let mastery = policy.scoring.mastery_threshold;
        let mut mastered_nodes = Vec::new();
        let mut in_progress_nodes = Vec::new();
        let mut weak: Vec<(&NodeId, f64)> = Vec::new();
        for (id, &score) in profile.scores() {
            if score >= mastery {
                mastered_nodes.push(id.clone());
            } else if score >= 0.0 {
                in_progress_nodes.push(id.clone());
            } else {
                weak.push((id, score));
            }
        }
        weak.sort_by(|a, b| a.1.total_cmp(&b.1));

        let coverage_pct = if graph_nodes == 0 {
            0.0
        } else {
            profile.scores().len() as f64 / graph_nodes as f64 * 100.0
        };

        Self {
            mastered_nodes,
            in_progress_nodes,
            weak_nodes: weak.into_iter().map(|(id, _)| id.clone()).collect(),
            coverage_pct,
            total_attempts: profile.total_attempts(),
            total_correct: profile.total_correct(),
            accuracy: profile.get_accuracy(None, policy.scoring.accuracy_window),
            next_due_reviews: profile.due_nodes(now).len(),
        }
    }
}

impl std::fmt::Display for LearningProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "mastered:     {}", self.mastered_nodes.len())?;
        writeln!(f, "in progress:  {}", self.in_progress_nodes.len())?;
        writeln!(f, "weak:         {}", self.weak_nodes.len())?;
        writeln!(f, "coverage:     {:.1}%", self.coverage_pct)?;
        writeln!(f, "attempts:     {} ({} correct)", self.total_attempts, self.total_correct)?;
        writeln!(f, "accuracy:     {:.1}%", self.accuracy * 100.0)?;
        writeln!(f, "due reviews:  {}", self.next_due_reviews)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tutor facade
// ---------------------------------------------------------------------------

/// Policy, cached graph and quiz bank for one content snapshot.
pub struct Tutor {
    policy: Policy,
    graph: CachedLookup<KnowledgeGraph>,
    quizzes: Vec<Quiz>,
}

impl Tutor {
    /// Create a tutor. Fails if the policy is invalid.
    pub fn new(policy: Policy, graph: KnowledgeGraph, quizzes: Vec<Quiz>) -> TutorResult<Self> {
        policy.validate()?;
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            quizzes = quizzes.len(),
            fallback = %policy.suggestion.fallback_strategy,
            "initializing tutor"
        );
        let graph = CachedLookup::with_policy(graph, &policy.cache);
        Ok(Self {
            policy,
            graph,
            quizzes,
        })
    }

    /// Build the graph and quiz bank from content sources.
    pub fn from_sources<K, Q>(policy: Policy, knowledge: &K, quizzes: &Q) -> TutorResult<Self>
    where
        K: KnowledgeSource + ?Sized,
        Q: QuizSource + ?Sized,
    {
        let graph = source::build_graph(knowledge)?;
        let quizzes = source::load_quizzes(quizzes)?;
        Self::new(policy, graph, quizzes)
    }

    /// Load a JSON content bundle from disk.
    pub fn load(policy: Policy, bundle_path: &Path) -> TutorResult<Self> {
        let bundle = ContentBundle::from_path(bundle_path)?;
        Self::from_sources(policy, &bundle, &bundle)
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        self.graph.inner()
    }

    /// Mutable graph access. Drops cached lookups.
    pub fn graph_mut(&mut self) -> &mut KnowledgeGraph {
        self.graph.inner_mut()
    }

    pub fn quizzes(&self) -> &[Quiz] {
        &self.quizzes
    }

    pub fn find_quiz(&self, quiz_id: &str) -> Option<&Quiz> {
        self.quizzes.iter().find(|q| q.id() == quiz_id)
    }

    fn engine(&self) -> SuggestionEngine<'_, CachedLookup<KnowledgeGraph>> {
        SuggestionEngine::with_policy(&self.graph, self.policy.clone())
    }

    fn scorer(&self) -> ScoringSystem<'_, CachedLookup<KnowledgeGraph>> {
        ScoringSystem::with_policy(&self.graph, self.policy.clone())
    }

    /// Suggest the next quiz for a learner.
    pub fn suggest(&self, profile: &LearnerProfile) -> TutorResult<&Quiz> {
        Ok(self.engine().suggest(profile, &self.quizzes)?)
    }

    pub fn suggest_explained(&self, profile: &LearnerProfile) -> TutorResult<Suggestion<'_>> {
        Ok(self.engine().suggest_explained(profile, &self.quizzes)?)
    }

    /// Apply an already-graded outcome for `quiz_id`.
    pub fn record_attempt(
        &self,
        profile: &mut LearnerProfile,
        quiz_id: &str,
        is_correct: bool,
    ) -> TutorResult<ScoreUpdate> {
        let quiz = self.find_quiz(quiz_id).ok_or_else(|| QuizError::UnknownQuiz {
            quiz_id: quiz_id.to_string(),
        })?;
        Ok(self.scorer().apply_quiz(profile, quiz, is_correct, Utc::now()))
    }

    /// Grade `response` against `quiz_id` and apply the outcome.
    pub fn answer(
        &self,
        profile: &mut LearnerProfile,
        quiz_id: &str,
        response: &str,
    ) -> TutorResult<ScoreUpdate> {
        let is_correct = self
            .find_quiz(quiz_id)
            .map(|q| q.check_answer(response))
            .ok_or_else(|| QuizError::UnknownQuiz {
                quiz_id: quiz_id.to_string(),
            })?;
        self.record_attempt(profile, quiz_id, is_correct)
    }

    /// Parse a stored profile, validating it against this tutor's policy.
    pub fn restore_profile(&self, json: &str) -> TutorResult<LearnerProfile> {
        Ok(LearnerProfile::from_json_with(json, &self.policy.scoring)?)
    }

    /// A JSON profile store under `dir` that validates with this tutor's policy.
    pub fn profile_store(&self, dir: impl Into<PathBuf>) -> JsonProfileStore {
        JsonProfileStore::with_policy(dir, self.policy.scoring.clone())
    }

    pub fn progress(&self, profile: &LearnerProfile) -> LearningProgress {
        LearningProgress::compute(profile, self.graph().node_count(), &self.policy, Utc::now())
    }

    pub fn info(&self) -> TutorInfo {
        TutorInfo {
            node_count: self.graph().node_count(),
            edge_count: self.graph().edge_count(),
            quiz_count: self.quizzes.len(),
            acyclic: self.graph().is_acyclic(),
            fallback_strategy: self.policy.suggestion.fallback_strategy.to_string(),
            cache: self.graph.stats(),
        }
    }
}

impl std::fmt::Debug for Tutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tutor")
            .field("graph", self.graph())
            .field("quizzes", &self.quizzes.len())
            .finish()
    }
}

/// Snapshot of a tutor's content and cache.
#[derive(Debug, Clone)]
pub struct TutorInfo {
    pub node_count: usize,
    pub edge_count: usize,
    pub quiz_count: usize,
    pub acyclic: bool,
    pub fallback_strategy: String,
    pub cache: CacheStats,
}

impl std::fmt::Display for TutorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "quiz tutor info")?;
        writeln!(f, "  nodes:        {}", self.node_count)?;
        writeln!(f, "  edges:        {}", self.edge_count)?;
        writeln!(f, "  quizzes:      {}", self.quiz_count)?;
        writeln!(f, "  acyclic:      {}", self.acyclic)?;
        writeln!(f, "  fallback:     {}", self.fallback_strategy)?;
        writeln!(
            f,
            "  cache:        {} entries, {} hits, {} misses",
            self.cache.entries, self.cache.hits, self.cache.misses
        )?;
        Ok(())
    }
}
