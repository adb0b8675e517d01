//! Adaptive quiz selection.
//!
//! The [`SuggestionEngine`] narrows the quiz bank through a fixed pipeline:
//!
//! 1. **Prerequisite gate**: drop quizzes touching a node with an unmet prerequisite
//! 2. **Recency filter**: drop quizzes attempted in the last few attempts
//! 3. **Priority ranking**: weak, due and unmastered nodes rank first (stable)
//! 4. **Difficulty match**: keep quizzes near the learner's level on their nodes
//! 5. **Selection**: take the first survivor
//!
//! A stage that would empty the list is skipped. If nothing passes the gate,
//! the configured [`FallbackStrategy`] picks from the full bank instead.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::SuggestError;
use crate::graph::{KnowledgeGraph, NodeId, PrerequisiteLookup};
use crate::policy::{FallbackStrategy, Policy};
use crate::profile::LearnerProfile;
use crate::quiz::Quiz;

/// Result type for suggestion.
pub type SuggestResult<T> = std::result::Result<T, SuggestError>;

/// Candidate counts and decisions from one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionTrace {
    pub bank_size: usize,
    pub after_prerequisites: usize,
    pub after_recency: usize,
    /// Every gated quiz was recently attempted, so the filter was ignored.
    pub recency_skipped: bool,
    pub after_difficulty: usize,
    /// No ranked quiz matched its target difficulty, so the filter was ignored.
    pub difficulty_skipped: bool,
    /// Priority of the selected quiz; `None` when the fallback chose.
    pub priority: Option<f64>,
    /// Target difficulty computed for the selected quiz.
    pub target_difficulty: Option<u8>,
    /// The strategy used when nothing passed the prerequisite gate.
    pub fallback: Option<FallbackStrategy>,
}

impl SelectionTrace {
    pub fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// A selected quiz with the trace that led to it.
#[derive(Debug, Clone)]
pub struct Suggestion<'q> {
    pub quiz: &'q Quiz,
    pub trace: SelectionTrace,
}

/// Stateless quiz selector over a prerequisite lookup.
pub struct SuggestionEngine<'g, G: ?Sized = KnowledgeGraph> {
    graph: &'g G,
    policy: Policy,
}

impl<'g, G: PrerequisiteLookup + ?Sized> SuggestionEngine<'g, G> {
    /// Create an engine with the default policy.
    pub fn new(graph: &'g G) -> Self {
        Self::with_policy(graph, Policy::default())
    }

    pub fn with_policy(graph: &'g G, policy: Policy) -> Self {
        Self { graph, policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Pick the next quiz for `profile`.
    ///
    /// Fails with `NoQuizAvailable` if `quizzes` is empty, or if nothing
    /// passes the prerequisite gate and the fallback is `raise_error`.
    pub fn suggest<'q>(&self, profile: &LearnerProfile, quizzes: &'q [Quiz]) -> SuggestResult<&'q Quiz> {
        self.suggest_explained(profile, quizzes).map(|s| s.quiz)
    }

    /// Like [`suggest`](Self::suggest), returning the selection trace too.
    pub fn suggest_explained<'q>(
        &self,
        profile: &LearnerProfile,
        quizzes: &'q [Quiz],
    ) -> SuggestResult<Suggestion<'q>> {
        self.suggest_with(profile, quizzes, &mut rand::thread_rng(), Utc::now())
    }

    /// Run the pipeline with an explicit RNG and clock.
    pub fn suggest_with<'q, R: Rng + ?Sized>(
        &self,
        profile: &LearnerProfile,
        quizzes: &'q [Quiz],
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> SuggestResult<Suggestion<'q>> {
        if quizzes.is_empty() {
            return Err(SuggestError::NoQuizAvailable {
                reason: "quiz bank is empty".into(),
            });
        }
        let mut trace = SelectionTrace {
            bank_size: quizzes.len(),
            ..Default::default()
        };

        // 1. Prerequisite gate.
        let gated: Vec<&'q Quiz> = quizzes
            .iter()
            .filter(|quiz| self.prerequisites_met(profile, quiz))
            .collect();
        trace.after_prerequisites = gated.len();
        tracing::debug!(passed = gated.len(), total = quizzes.len(), "prerequisite gate");
        if gated.is_empty() {
            tracing::warn!(user_id = profile.user_id(), "no quiz passes the prerequisite gate");
            let quiz = self.fallback(quizzes, rng)?;
            trace.fallback = Some(self.policy.suggestion.fallback_strategy);
            tracing::info!(quiz_id = quiz.id(), difficulty = quiz.difficulty_level(), "selected fallback quiz");
            return Ok(Suggestion { quiz, trace });
        }

        // 2. Recency filter.
        let recent = self.recent_quiz_ids(profile);
        let fresh: Vec<&'q Quiz> = gated
            .iter()
            .copied()
            .filter(|quiz| !recent.contains(quiz.id()))
            .collect();
        trace.after_recency = fresh.len();
        tracing::debug!(passed = fresh.len(), total = gated.len(), "recency filter");
        let fresh = if fresh.is_empty() {
            tracing::warn!("every eligible quiz was attempted recently, ignoring recency");
            trace.recency_skipped = true;
            gated
        } else {
            fresh
        };

        // 3. Priority ranking; sort_by is stable so ties keep bank order.
        let mut ranked: Vec<(&'q Quiz, f64)> = fresh
            .into_iter()
            .map(|quiz| (quiz, self.priority(profile, quiz, now)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        // 4. Difficulty match.
        let tolerance = i16::from(self.policy.suggestion.difficulty_tolerance);
        let matched: Vec<(&'q Quiz, f64)> = ranked
            .iter()
            .copied()
            .filter(|(quiz, _)| {
                let target = self.target_difficulty(profile, quiz);
                (i16::from(quiz.difficulty_level()) - i16::from(target)).abs() <= tolerance
            })
            .collect();
        trace.after_difficulty = matched.len();
        tracing::debug!(passed = matched.len(), total = ranked.len(), "difficulty match");
        let survivors = if matched.is_empty() {
            tracing::warn!("no quiz matches the target difficulty, using ranked order");
            trace.difficulty_skipped = true;
            ranked
        } else {
            matched
        };

        // 5. Selection.
        let Some(&(quiz, priority)) = survivors.first() else {
            let quiz = self.fallback(quizzes, rng)?;
            trace.fallback = Some(self.policy.suggestion.fallback_strategy);
            return Ok(Suggestion { quiz, trace });
        };
        trace.priority = Some(priority);
        trace.target_difficulty = Some(self.target_difficulty(profile, quiz));
        tracing::info!(
            user_id = profile.user_id(),
            quiz_id = quiz.id(),
            difficulty = quiz.difficulty_level(),
            priority,
            "selected quiz"
        );
        Ok(Suggestion { quiz, trace })
    }

    /// Immediate prerequisites of `node_id` scoring below the threshold.
    ///
    /// A node missing from the graph has no blockers.
    pub fn prerequisite_blockers(&self, profile: &LearnerProfile, node_id: &str) -> BTreeSet<NodeId> {
        let prerequisites = match self.graph.prerequisites(node_id) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(node = node_id, error = %e, "prerequisite lookup failed, treating as unblocked");
                return BTreeSet::new();
            }
        };
        let threshold = self.policy.suggestion.prerequisite_threshold;
        prerequisites
            .into_iter()
            .filter(|p| profile.get_score(p) < threshold)
            .collect()
    }

    fn prerequisites_met(&self, profile: &LearnerProfile, quiz: &Quiz) -> bool {
        for node_id in quiz.linked_nodes() {
            let blockers = self.prerequisite_blockers(profile, node_id);
            if !blockers.is_empty() {
                tracing::debug!(quiz_id = quiz.id(), node = %node_id, ?blockers, "quiz blocked");
                return false;
            }
        }
        true
    }

    fn recent_quiz_ids<'a>(&self, profile: &'a LearnerProfile) -> HashSet<&'a str> {
        profile
            .attempt_history()
            .iter()
            .rev()
            .take(self.policy.suggestion.recency_window)
            .map(|a| a.quiz_id.as_str())
            .collect()
    }

    /// Weakness, due-review and unmastered contributions summed over linked nodes.
    pub fn priority(&self, profile: &LearnerProfile, quiz: &Quiz, now: DateTime<Utc>) -> f64 {
        let suggestion = &self.policy.suggestion;
        let mastery = self.policy.scoring.mastery_threshold;
        quiz.linked_nodes()
            .iter()
            .map(|node_id| {
                let score = profile.get_score(node_id);
                let mut priority = 0.0;
                if score < 0.0 {
                    priority += suggestion.weakness_weight * score.abs();
                }
                if profile.schedule_entry(node_id).is_some_and(|e| e.is_due(now)) {
                    priority += suggestion.due_review_bonus;
                }
                if score < mastery {
                    priority += mastery - score;
                }
                priority
            })
            .sum()
    }

    /// Target difficulty from the average score of the quiz's linked nodes.
    pub fn target_difficulty(&self, profile: &LearnerProfile, quiz: &Quiz) -> u8 {
        let nodes = quiz.linked_nodes();
        let average = if nodes.is_empty() {
            0.0
        } else {
            nodes.iter().map(|n| profile.get_score(n)).sum::<f64>() / nodes.len() as f64
        };
        self.policy.suggestion.target_difficulty(average)
    }

    fn fallback<'q, R: Rng + ?Sized>(&self, quizzes: &'q [Quiz], rng: &mut R) -> SuggestResult<&'q Quiz> {
        let strategy = self.policy.suggestion.fallback_strategy;
        tracing::warn!(%strategy, "using fallback selection");
        let picked = match strategy {
            FallbackStrategy::Easiest => quizzes.iter().min_by_key(|q| q.difficulty_level()),
            FallbackStrategy::Random => quizzes.choose(rng),
            FallbackStrategy::RaiseError => {
                return Err(SuggestError::NoQuizAvailable {
                    reason: "no quiz passes the prerequisite gate and the fallback is raise_error"
                        .into(),
                });
            }
        };
        picked.ok_or_else(|| SuggestError::NoQuizAvailable {
            reason: "quiz bank is empty".into(),
        })
    }
}
