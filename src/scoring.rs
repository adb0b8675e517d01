//! Applies attempt outcomes to a learner profile.
//!
//! A correct answer raises every linked node, reschedules it and gives each
//! immediate prerequisite a small bonus. An incorrect answer lowers every
//! linked node and resets its schedule; prerequisites are never penalized.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::graph::{KnowledgeGraph, NodeId, PrerequisiteLookup};
use crate::policy::Policy;
use crate::profile::{AttemptRecord, LearnerProfile};
use crate::quiz::Quiz;
use crate::schedule;

/// A single node's score before and after an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreChange {
    pub before: f64,
    pub after: f64,
}

impl ScoreChange {
    pub fn delta(&self) -> f64 {
        self.after - self.before
    }
}

/// What one `apply_correct`/`apply_incorrect` call changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub quiz_id: String,
    pub is_correct: bool,
    /// Every node whose score was written, linked nodes and prerequisites alike.
    pub adjustments: BTreeMap<NodeId, ScoreChange>,
}

impl ScoreUpdate {
    fn record(&mut self, node_id: &str, before: f64, after: f64) {
        self.adjustments
            .entry(node_id.to_string())
            .and_modify(|change| change.after = after)
            .or_insert(ScoreChange { before, after });
    }
}

/// Score and schedule updates driven by quiz outcomes.
pub struct ScoringSystem<'g, G: ?Sized = KnowledgeGraph> {
    graph: &'g G,
    policy: Policy,
}

impl<'g, G: PrerequisiteLookup + ?Sized> ScoringSystem<'g, G> {
    /// Create a scoring system with the default policy.
    pub fn new(graph: &'g G) -> Self {
        Self::with_policy(graph, Policy::default())
    }

    pub fn with_policy(graph: &'g G, policy: Policy) -> Self {
        Self { graph, policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Apply a correct answer to `node_ids`.
    pub fn apply_correct(
        &self,
        profile: &mut LearnerProfile,
        node_ids: &[NodeId],
        quiz_id: &str,
        difficulty: u8,
    ) -> ScoreUpdate {
        self.apply_correct_at(profile, node_ids, quiz_id, difficulty, Utc::now())
    }

    /// Apply an incorrect answer to `node_ids`.
    pub fn apply_incorrect(
        &self,
        profile: &mut LearnerProfile,
        node_ids: &[NodeId],
        quiz_id: &str,
        difficulty: u8,
    ) -> ScoreUpdate {
        self.apply_incorrect_at(profile, node_ids, quiz_id, difficulty, Utc::now())
    }

    pub fn apply_correct_at(
        &self,
        profile: &mut LearnerProfile,
        node_ids: &[NodeId],
        quiz_id: &str,
        difficulty: u8,
        now: DateTime<Utc>,
    ) -> ScoreUpdate {
        self.apply(profile, node_ids, quiz_id, difficulty, true, now)
    }

    pub fn apply_incorrect_at(
        &self,
        profile: &mut LearnerProfile,
        node_ids: &[NodeId],
        quiz_id: &str,
        difficulty: u8,
        now: DateTime<Utc>,
    ) -> ScoreUpdate {
        self.apply(profile, node_ids, quiz_id, difficulty, false, now)
    }

    /// Dispatch on `is_correct` for a quiz's linked nodes.
    pub fn apply_quiz(
        &self,
        profile: &mut LearnerProfile,
        quiz: &Quiz,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> ScoreUpdate {
        self.apply(
            profile,
            quiz.linked_nodes(),
            quiz.id(),
            quiz.difficulty_level(),
            is_correct,
            now,
        )
    }

    fn apply(
        &self,
        profile: &mut LearnerProfile,
        node_ids: &[NodeId],
        quiz_id: &str,
        difficulty: u8,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> ScoreUpdate {
        let scoring = &self.policy.scoring;
        let mut update = ScoreUpdate {
            quiz_id: quiz_id.to_string(),
            is_correct,
            adjustments: BTreeMap::new(),
        };

        let delta = if is_correct {
            scoring.correct_delta
        } else {
            -scoring.incorrect_delta
        };
        for node_id in node_ids {
            let before = profile.get_score(node_id);
            let after = profile.set_score_within(node_id, before + delta, scoring.score_bounds);
            tracing::debug!(node = %node_id, before, after, "score updated");
            update.record(node_id, before, after);
            self.update_schedule(profile, node_id, is_correct, now);
        }

        if is_correct {
            self.bump_prerequisites(profile, node_ids, &mut update);
        }

        profile.add_attempt_capped(
            AttemptRecord::new(quiz_id, node_ids.to_vec(), is_correct, difficulty).at(now),
            scoring.attempt_history_len,
        );

        tracing::info!(
            quiz_id,
            is_correct,
            nodes = node_ids.len(),
            adjusted = update.adjustments.len(),
            "attempt applied"
        );
        update
    }

    fn bump_prerequisites(
        &self,
        profile: &mut LearnerProfile,
        node_ids: &[NodeId],
        update: &mut ScoreUpdate,
    ) {
        let scoring = &self.policy.scoring;
        let mut prerequisites = BTreeSet::new();
        for node_id in node_ids {
            match self.graph.prerequisites(node_id) {
                Ok(found) => prerequisites.extend(found),
                Err(e) => {
                    tracing::warn!(node = %node_id, error = %e, "prerequisite lookup failed, skipping");
                }
            }
        }

        for prereq in prerequisites {
            let before = profile.get_score(&prereq);
            let after =
                profile.set_score_within(&prereq, before + scoring.prereq_bonus, scoring.score_bounds);
            tracing::debug!(node = %prereq, before, after, "prerequisite bonus");
            update.record(&prereq, before, after);
        }
    }

    /// Advance or reset a node's schedule. Accuracy is measured before the
    /// current attempt is recorded.
    fn update_schedule(
        &self,
        profile: &mut LearnerProfile,
        node_id: &str,
        is_correct: bool,
        now: DateTime<Utc>,
    ) {
        let mut entry = profile.schedule_entry(node_id).cloned().unwrap_or_default();
        let accuracy = profile.get_accuracy(Some(node_id), self.policy.scoring.accuracy_window);
        let (interval_index, next_review) =
            self.policy
                .schedule
                .calculate_next_review(entry.interval_index, is_correct, accuracy, now);

        entry.interval_index = interval_index;
        entry.next_review = Some(next_review);
        entry.last_reviewed = Some(now);
        entry.streak = schedule::update_streak(entry.streak, is_correct);
        tracing::debug!(
            node = %node_id,
            interval_index,
            next_review = %next_review,
            streak = entry.streak,
            "schedule updated"
        );
        profile.set_schedule(node_id, entry);
    }

    /// Whether a node's score meets the mastery threshold.
    pub fn is_mastered(&self, profile: &LearnerProfile, node_id: &str) -> bool {
        profile.get_score(node_id) >= self.policy.scoring.mastery_threshold
    }

    pub fn get_mastered_nodes(&self, profile: &LearnerProfile) -> Vec<NodeId> {
        profile
            .scores()
            .iter()
            .filter(|(_, score)| **score >= self.policy.scoring.mastery_threshold)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Nodes with a negative score, weakest first.
    pub fn get_weak_nodes(&self, profile: &LearnerProfile) -> Vec<NodeId> {
        let mut weak: Vec<(&NodeId, f64)> = profile
            .scores()
            .iter()
            .filter(|(_, score)| **score < 0.0)
            .map(|(id, score)| (id, *score))
            .collect();
        weak.sort_by(|a, b| a.1.total_cmp(&b.1));
        weak.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeAttrs;
    use chrono::{Duration, TimeZone};

    fn ids(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    /// n1 requires p1.
    fn graph() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::new();
        kg.add_node("n1", NodeAttrs::new("Loops"));
        kg.add_node("p1", NodeAttrs::new("Variables"));
        kg.add_edge("n1", "p1");
        kg
    }

    #[test]
    fn correct_answer_raises_node_and_bumps_prerequisite() {
        let kg = graph();
        let scorer = ScoringSystem::new(&kg);
        let mut profile = LearnerProfile::with_scores("u", [("n1", 0.0), ("p1", 0.0)]).unwrap();

        let update = scorer.apply_correct(&mut profile, &ids(&["n1"]), "q1", 3);

        assert_eq!(profile.get_score("n1"), 1.0);
        assert_eq!(profile.get_score("p1"), 0.1);
        assert_eq!(profile.total_attempts(), 1);
        assert_eq!(profile.total_correct(), 1);
        assert_eq!(update.adjustments.len(), 2);
        assert_eq!(update.adjustments["p1"].delta(), 0.1);
    }

    #[test]
    fn incorrect_answer_lowers_node_and_resets_schedule() {
        let kg = graph();
        let scorer = ScoringSystem::new(&kg);
        let mut profile = LearnerProfile::with_scores("u", [("n1", 0.0), ("p1", 0.0)]).unwrap();

        scorer.apply_incorrect_at(&mut profile, &ids(&["n1"]), "q1", 3, now());

        assert_eq!(profile.get_score("n1"), -1.0);
        assert_eq!(profile.get_score("p1"), 0.0);
        let entry = profile.schedule_entry("n1").unwrap();
        assert_eq!(entry.interval_index, 0);
        assert_eq!(entry.next_review, Some(now() + Duration::days(1)));
        assert_eq!(entry.streak, 0);
        assert_eq!(profile.total_correct(), 0);
        assert!(!profile.attempt_history()[0].is_correct);
    }

    #[test]
    fn first_correct_answer_uses_prior_accuracy() {
        let kg = graph();
        let scorer = ScoringSystem::new(&kg);
        let mut profile = LearnerProfile::new("u");

        // No attempts yet, so accuracy is 0 and the index cannot advance.
        scorer.apply_correct_at(&mut profile, &ids(&["n1"]), "q1", 3, now());
        let entry = profile.schedule_entry("n1").unwrap().clone();
        assert_eq!(entry.interval_index, 0);
        assert_eq!(entry.next_review, Some(now() + Duration::days(1)));
        assert_eq!(entry.streak, 1);

        scorer.apply_correct_at(&mut profile, &ids(&["n1"]), "q2", 3, now());
        let entry = profile.schedule_entry("n1").unwrap();
        assert_eq!(entry.interval_index, 1);
        assert_eq!(entry.next_review, Some(now() + Duration::days(3)));
        assert_eq!(entry.streak, 2);
    }

    #[test]
    fn scores_respect_bounds() {
        let kg = graph();
        let scorer = ScoringSystem::new(&kg);
        let mut profile = LearnerProfile::with_scores("u", [("n1", 10.0), ("p1", 9.95)]).unwrap();
        scorer.apply_correct(&mut profile, &ids(&["n1"]), "q", 5);
        assert_eq!(profile.get_score("n1"), 10.0);
        assert_eq!(profile.get_score("p1"), 10.0);

        let mut profile = LearnerProfile::with_scores("u", [("n1", -4.5)]).unwrap();
        scorer.apply_incorrect(&mut profile, &ids(&["n1"]), "q", 1);
        assert_eq!(profile.get_score("n1"), -5.0);
    }

    #[test]
    fn monotonic_updates() {
        let kg = graph();
        let scorer = ScoringSystem::new(&kg);
        for start in [-5.0, -1.5, 0.0, 2.0, 9.5, 10.0] {
            let mut profile = LearnerProfile::with_scores("u", [("n1", start)]).unwrap();
            let up = scorer.apply_correct(&mut profile, &ids(&["n1"]), "q", 2);
            assert!(up.adjustments.values().all(|c| c.after >= c.before));

            let mut profile = LearnerProfile::with_scores("u", [("n1", start)]).unwrap();
            let down = scorer.apply_incorrect(&mut profile, &ids(&["n1"]), "q", 2);
            assert!(down.adjustments.values().all(|c| c.after <= c.before));
            assert!(!down.adjustments.contains_key("p1"));
        }
    }

    #[test]
    fn unknown_nodes_are_scored_but_not_bumped() {
        let kg = graph();
        let scorer = ScoringSystem::new(&kg);
        let mut profile = LearnerProfile::new("u");
        let update = scorer.apply_correct(&mut profile, &ids(&["ghost", "n1"]), "q", 2);
        assert_eq!(profile.get_score("ghost"), 1.0);
        assert_eq!(profile.get_score("p1"), 0.1);
        assert_eq!(update.adjustments.len(), 3);
    }

    #[test]
    fn history_cap_follows_policy() {
        let kg = graph();
        let mut policy = Policy::default();
        policy.scoring.attempt_history_len = 2;
        let scorer = ScoringSystem::with_policy(&kg, policy);
        let mut profile = LearnerProfile::new("u");
        for i in 0..4 {
            scorer.apply_incorrect(&mut profile, &ids(&["n1"]), &format!("q{i}"), 1);
        }
        assert_eq!(profile.attempt_history().len(), 2);
        assert_eq!(profile.total_attempts(), 4);
    }

    #[test]
    fn mastery_and_weakness_queries() {
        let kg = graph();
        let scorer = ScoringSystem::new(&kg);
        let profile = LearnerProfile::with_scores(
            "u",
            [("a", 3.0), ("b", 2.9), ("c", -1.0), ("d", -4.0), ("e", 7.0)],
        )
        .unwrap();
        assert!(scorer.is_mastered(&profile, "a"));
        assert!(!scorer.is_mastered(&profile, "b"));
        assert!(!scorer.is_mastered(&profile, "unseen"));
        assert_eq!(scorer.get_mastered_nodes(&profile), vec!["a", "e"]);
        assert_eq!(scorer.get_weak_nodes(&profile), vec!["d", "c"]);
    }
}
