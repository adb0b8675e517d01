//! Per-learner state: node scores, review schedule and attempt history.
//!
//! A [`LearnerProfile`] is plain data owned by the caller for one request.
//! Scores are clamped when written, so every stored score stays inside the
//! configured [`ScoreBounds`]. Profiles built from explicit scores or read
//! from JSON are validated instead of clamped.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::graph::NodeId;
use crate::policy::{ScoreBounds, ScoringPolicy};
use crate::schedule;

/// Result type for profile operations.
pub type ProfileResult<T> = std::result::Result<T, ProfileError>;

/// Attempt history kept by [`LearnerProfile::add_attempt`].
pub const DEFAULT_HISTORY_CAP: usize = 200;

/// Spaced-repetition state for one knowledge node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleEntry {
    /// Position on the review-interval ladder.
    pub interval_index: usize,
    /// Absent means the node is due now.
    pub next_review: Option<DateTime<Utc>>,
    pub last_reviewed: Option<DateTime<Utc>>,
    /// Consecutive correct reviews.
    pub streak: u32,
}

impl ScheduleEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        schedule::is_due_for_review(self.next_review, now)
    }
}

/// One answered quiz. Immutable once appended to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub quiz_id: String,
    /// Knowledge nodes the quiz was linked to.
    pub node_ids: Vec<NodeId>,
    pub is_correct: bool,
    pub timestamp: DateTime<Utc>,
    pub difficulty_level: u8,
}

impl AttemptRecord {
    /// Record an attempt made now.
    pub fn new(
        quiz_id: impl Into<String>,
        node_ids: Vec<NodeId>,
        is_correct: bool,
        difficulty_level: u8,
    ) -> Self {
        Self {
            quiz_id: quiz_id.into(),
            node_ids,
            is_correct,
            timestamp: Utc::now(),
            difficulty_level,
        }
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.node_ids.iter().any(|n| n == node_id)
    }
}

/// Mutable learning state for a single learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProfileRecord")]
pub struct LearnerProfile {
    user_id: String,
    scores: BTreeMap<NodeId, f64>,
    schedule: BTreeMap<NodeId, ScheduleEntry>,
    attempt_history: VecDeque<AttemptRecord>,
    total_attempts: u64,
    total_correct: u64,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

/// Wire shape of a profile before validation.
#[derive(Deserialize)]
struct ProfileRecord {
    user_id: String,
    #[serde(default)]
    scores: BTreeMap<NodeId, f64>,
    #[serde(default)]
    schedule: BTreeMap<NodeId, ScheduleEntry>,
    #[serde(default)]
    attempt_history: VecDeque<AttemptRecord>,
    #[serde(default)]
    total_attempts: u64,
    #[serde(default)]
    total_correct: u64,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    last_updated: DateTime<Utc>,
}

impl TryFrom<ProfileRecord> for LearnerProfile {
    type Error = ProfileError;

    fn try_from(record: ProfileRecord) -> ProfileResult<Self> {
        Self::from_record(record, ScoreBounds::DEFAULT, DEFAULT_HISTORY_CAP)
    }
}

impl LearnerProfile {
    fn from_record(record: ProfileRecord, bounds: ScoreBounds, history_cap: usize) -> ProfileResult<Self> {
        check_scores(&record.scores, bounds)?;
        let mut attempt_history = record.attempt_history;
        if attempt_history.len() > history_cap {
            tracing::warn!(
                user_id = %record.user_id,
                len = attempt_history.len(),
                cap = history_cap,
                "attempt history over cap, dropping oldest"
            );
            let excess = attempt_history.len() - history_cap;
            attempt_history.drain(..excess);
        }
        Ok(Self {
            user_id: record.user_id,
            scores: record.scores,
            schedule: record.schedule,
            attempt_history,
            total_attempts: record.total_attempts,
            total_correct: record.total_correct,
            created_at: record.created_at,
            last_updated: record.last_updated,
        })
    }
}

fn check_scores(scores: &BTreeMap<NodeId, f64>, bounds: ScoreBounds) -> ProfileResult<()> {
    match scores.iter().find(|(_, score)| !bounds.contains(**score)) {
        Some((node_id, score)) => Err(ProfileError::InvalidScoreBounds {
            node_id: node_id.clone(),
            score: *score,
            min: bounds.min,
            max: bounds.max,
        }),
        None => Ok(()),
    }
}

impl LearnerProfile {
    /// A fresh profile with no scores, schedule or history.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            scores: BTreeMap::new(),
            schedule: BTreeMap::new(),
            attempt_history: VecDeque::new(),
            total_attempts: 0,
            total_correct: 0,
            created_at: now,
            last_updated: now,
        }
    }

    /// A profile seeded with explicit scores.
    ///
    /// Fails with `InvalidScoreBounds` if any score is non-finite or outside
    /// the default bounds.
    pub fn with_scores<I, K>(user_id: impl Into<String>, scores: I) -> ProfileResult<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<NodeId>,
    {
        Self::with_scores_within(user_id, scores, ScoreBounds::DEFAULT)
    }

    /// Like [`with_scores`](Self::with_scores), checking against `bounds`.
    pub fn with_scores_within<I, K>(
        user_id: impl Into<String>,
        scores: I,
        bounds: ScoreBounds,
    ) -> ProfileResult<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<NodeId>,
    {
        let scores: BTreeMap<NodeId, f64> =
            scores.into_iter().map(|(k, v)| (k.into(), v)).collect();
        check_scores(&scores, bounds)?;
        let mut profile = Self::new(user_id);
        profile.scores = scores;
        Ok(profile)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Every node with a recorded score.
    pub fn scores(&self) -> &BTreeMap<NodeId, f64> {
        &self.scores
    }

    pub fn schedule(&self) -> &BTreeMap<NodeId, ScheduleEntry> {
        &self.schedule
    }

    /// Attempts, oldest first.
    pub fn attempt_history(&self) -> &VecDeque<AttemptRecord> {
        &self.attempt_history
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    pub fn total_correct(&self) -> u64 {
        self.total_correct
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Score for a node; 0.0 if never seen.
    pub fn get_score(&self, node_id: &str) -> f64 {
        self.scores.get(node_id).copied().unwrap_or(0.0)
    }

    /// Store a score clamped to the default bounds. Returns the stored value.
    pub fn set_score(&mut self, node_id: &str, value: f64) -> f64 {
        self.set_score_within(node_id, value, ScoreBounds::DEFAULT)
    }

    /// Store a score clamped to `bounds`. Returns the stored value.
    pub fn set_score_within(&mut self, node_id: &str, value: f64, bounds: ScoreBounds) -> f64 {
        let clamped = bounds.clamp(value);
        self.scores.insert(node_id.to_string(), clamped);
        self.last_updated = Utc::now();
        clamped
    }

    pub fn schedule_entry(&self, node_id: &str) -> Option<&ScheduleEntry> {
        self.schedule.get(node_id)
    }

    pub fn set_schedule(&mut self, node_id: &str, entry: ScheduleEntry) {
        self.schedule.insert(node_id.to_string(), entry);
    }

    /// Nodes whose schedule entry is due at `now`.
    pub fn due_nodes(&self, now: DateTime<Utc>) -> Vec<NodeId> {
        self.schedule
            .iter()
            .filter(|(_, entry)| entry.is_due(now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Append an attempt, keeping at most [`DEFAULT_HISTORY_CAP`] records.
    pub fn add_attempt(&mut self, record: AttemptRecord) {
        self.add_attempt_capped(record, DEFAULT_HISTORY_CAP);
    }

    /// Append an attempt, dropping the oldest records beyond `cap`.
    pub fn add_attempt_capped(&mut self, record: AttemptRecord, cap: usize) {
        self.total_attempts += 1;
        if record.is_correct {
            self.total_correct += 1;
        }
        self.attempt_history.push_back(record);
        while self.attempt_history.len() > cap {
            self.attempt_history.pop_front();
        }
        self.last_updated = Utc::now();
    }

    /// The most recent `n` attempts touching `node_id`, oldest first.
    pub fn get_recent_attempts(&self, node_id: &str, n: usize) -> Vec<&AttemptRecord> {
        let mut recent: Vec<&AttemptRecord> = self
            .attempt_history
            .iter()
            .rev()
            .filter(|a| a.touches(node_id))
            .take(n)
            .collect();
        recent.reverse();
        recent
    }

    /// Fraction correct among the last `n` attempts, globally or for one node.
    ///
    /// 0.0 when there are no attempts to measure.
    pub fn get_accuracy(&self, node_id: Option<&str>, n: usize) -> f64 {
        let (correct, total) = match node_id {
            Some(id) => tally(self.get_recent_attempts(id, n)),
            None => tally(self.attempt_history.iter().rev().take(n)),
        };
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn to_json(&self) -> ProfileResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ProfileError::Serialization {
            message: e.to_string(),
        })
    }

    /// Parse and validate a profile document against the default policy.
    pub fn from_json(json: &str) -> ProfileResult<Self> {
        Self::from_json_with(json, &ScoringPolicy::default())
    }

    /// Parse a profile document, validating scores against the policy's
    /// bounds and trimming history to its `attempt_history_len`.
    pub fn from_json_with(json: &str, policy: &ScoringPolicy) -> ProfileResult<Self> {
        let record: ProfileRecord =
            serde_json::from_str(json).map_err(|e| ProfileError::Serialization {
                message: e.to_string(),
            })?;
        Self::from_record(record, policy.score_bounds, policy.attempt_history_len)
    }

    /// Write the profile as JSON to `path`.
    pub fn save(&self, path: &Path) -> ProfileResult<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| ProfileError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> ProfileResult<Self> {
        Self::load_with(path, &ScoringPolicy::default())
    }

    /// Read a profile written under `policy`.
    pub fn load_with(path: &Path, policy: &ScoringPolicy) -> ProfileResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| ProfileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_with(&json, policy)
    }
}

fn tally<'a>(attempts: impl IntoIterator<Item = &'a AttemptRecord>) -> (usize, usize) {
    attempts
        .into_iter()
        .fold((0, 0), |(correct, total), a| (correct + usize::from(a.is_correct), total + 1))
}

impl std::fmt::Display for LearnerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} scored node(s), {}/{} correct",
            self.user_id,
            self.scores.len(),
            self.total_correct,
            self.total_attempts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn attempt(quiz: &str, nodes: &[&str], correct: bool) -> AttemptRecord {
        AttemptRecord::new(quiz, nodes.iter().map(|s| s.to_string()).collect(), correct, 2)
    }

    #[test]
    fn unseen_score_is_zero() {
        let profile = LearnerProfile::new("u");
        assert_eq!(profile.get_score("anything"), 0.0);
        assert!(profile.scores().is_empty());
    }

    #[test]
    fn set_score_clamps() {
        let mut p = LearnerProfile::new("u");
        for (value, expected) in [(12.0, 10.0), (-9.0, -5.0), (2.25, 2.25), (f64::NAN, -5.0)] {
            assert_eq!(p.set_score("n", value), expected);
            assert_eq!(p.get_score("n"), expected);
        }
    }

    #[test]
    fn set_score_within_custom_bounds() {
        let mut p = LearnerProfile::new("u");
        let bounds = ScoreBounds { min: 0.0, max: 1.0 };
        assert_eq!(p.set_score_within("n", 3.0, bounds), 1.0);
    }

    #[test]
    fn with_scores_rejects_out_of_bounds() {
        let err = LearnerProfile::with_scores("u", [("a", 1.0), ("b", 11.0)]).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidScoreBounds { ref node_id, .. } if node_id == "b"));
        assert!(LearnerProfile::with_scores("u", [("a", f64::INFINITY)]).is_err());
        assert!(LearnerProfile::with_scores("u", [("a", -5.0), ("b", 10.0)]).is_ok());
    }

    #[test]
    fn attempts_update_counters_and_cap() {
        let mut p = LearnerProfile::new("u");
        for i in 0..5 {
            p.add_attempt_capped(attempt(&format!("q{i}"), &["n"], i % 2 == 0), 3);
        }
        assert_eq!(p.total_attempts(), 5);
        assert_eq!(p.total_correct(), 3);
        assert_eq!(p.attempt_history().len(), 3);
        assert_eq!(p.attempt_history().front().map(|a| a.quiz_id.as_str()), Some("q2"));
    }

    #[test]
    fn default_cap_is_enforced() {
        let mut p = LearnerProfile::new("u");
        for i in 0..(DEFAULT_HISTORY_CAP + 10) {
            p.add_attempt(attempt(&format!("q{i}"), &["n"], true));
        }
        assert_eq!(p.attempt_history().len(), DEFAULT_HISTORY_CAP);
        assert_eq!(p.total_attempts(), (DEFAULT_HISTORY_CAP + 10) as u64);
    }

    #[test]
    fn recent_attempts_are_chronological() {
        let mut p = LearnerProfile::new("u");
        p.add_attempt(attempt("q1", &["a"], true));
        p.add_attempt(attempt("q2", &["b"], false));
        p.add_attempt(attempt("q3", &["a", "b"], false));
        p.add_attempt(attempt("q4", &["a"], true));

        let ids: Vec<&str> = p
            .get_recent_attempts("a", 2)
            .iter()
            .map(|a| a.quiz_id.as_str())
            .collect();
        assert_eq!(ids, vec!["q3", "q4"]);
        assert_eq!(p.get_recent_attempts("a", 10).len(), 3);
        assert!(p.get_recent_attempts("z", 10).is_empty());
    }

    #[test]
    fn accuracy_windows() {
        let mut p = LearnerProfile::new("u");
        assert_eq!(p.get_accuracy(None, 10), 0.0);
        p.add_attempt(attempt("q1", &["a"], true));
        p.add_attempt(attempt("q2", &["b"], false));
        p.add_attempt(attempt("q3", &["a"], false));
        p.add_attempt(attempt("q4", &["a"], true));

        assert_eq!(p.get_accuracy(None, 10), 0.5);
        assert_eq!(p.get_accuracy(None, 1), 1.0);
        assert!((p.get_accuracy(Some("a"), 10) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(p.get_accuracy(Some("b"), 10), 0.0);
        assert_eq!(p.get_accuracy(Some("z"), 10), 0.0);
    }

    #[test]
    fn due_nodes_follow_schedule() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let mut p = LearnerProfile::new("u");
        p.set_schedule("never", ScheduleEntry::default());
        p.set_schedule(
            "past",
            ScheduleEntry {
                next_review: Some(now - Duration::days(1)),
                ..Default::default()
            },
        );
        p.set_schedule(
            "future",
            ScheduleEntry {
                next_review: Some(now + Duration::days(1)),
                ..Default::default()
            },
        );
        assert_eq!(p.due_nodes(now), vec!["never", "past"]);
    }

    #[test]
    fn json_round_trip_is_exact() {
        let mut p = LearnerProfile::new("learner-7");
        p.set_score("a", 0.1 + 0.2);
        p.set_score("b", -4.999999999);
        p.set_schedule(
            "a",
            ScheduleEntry {
                interval_index: 3,
                next_review: Some(Utc::now() + Duration::days(14)),
                last_reviewed: Some(Utc::now()),
                streak: 4,
            },
        );
        p.add_attempt(attempt("q1", &["a", "b"], true));
        p.add_attempt(attempt("q2", &["b"], false));

        let back = LearnerProfile::from_json(&p.to_json().unwrap()).unwrap();
        assert_eq!(back, p);
        assert_eq!(back.get_score("a"), 0.1 + 0.2);
    }

    #[test]
    fn from_json_validates_scores() {
        let err = LearnerProfile::from_json(r#"{"user_id": "u", "scores": {"a": 42.0}}"#).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidScoreBounds { .. }));

        let err = LearnerProfile::from_json("{not json").unwrap_err();
        assert!(matches!(err, ProfileError::Serialization { .. }));
    }

    #[test]
    fn custom_policy_profile_reloads_exactly() {
        let policy = ScoringPolicy {
            score_bounds: ScoreBounds { min: -5.0, max: 20.0 },
            attempt_history_len: 500,
            ..Default::default()
        };
        let mut p = LearnerProfile::new("u");
        for i in 0..300 {
            let score = p.get_score("n") + 1.0;
            p.set_score_within("n", score, policy.score_bounds);
            p.add_attempt_capped(attempt(&format!("q{i}"), &["n"], true), policy.attempt_history_len);
        }
        assert_eq!(p.get_score("n"), 20.0);
        assert_eq!(p.attempt_history().len(), 300);

        let json = p.to_json().unwrap();
        let back = LearnerProfile::from_json_with(&json, &policy).unwrap();
        assert_eq!(back, p);

        // The default policy cannot hold these values.
        assert!(matches!(
            LearnerProfile::from_json(&json),
            Err(ProfileError::InvalidScoreBounds { .. })
        ));
    }

    #[test]
    fn with_scores_within_uses_given_bounds() {
        let bounds = ScoreBounds { min: 0.0, max: 50.0 };
        let p = LearnerProfile::with_scores_within("u", [("a", 42.0)], bounds).unwrap();
        assert_eq!(p.get_score("a"), 42.0);
        assert!(LearnerProfile::with_scores_within("u", [("a", -1.0)], bounds).is_err());
    }

    #[test]
    fn from_json_trims_long_history() {
        let mut p = LearnerProfile::new("u");
        for i in 0..10 {
            p.add_attempt(attempt(&format!("q{i}"), &["n"], true));
        }
        let mut value = serde_json::to_value(&p).unwrap();
        let history = value["attempt_history"].as_array().unwrap().clone();
        let long: Vec<_> = history.iter().cycle().take(DEFAULT_HISTORY_CAP + 5).cloned().collect();
        value["attempt_history"] = serde_json::Value::Array(long);

        let back = LearnerProfile::from_json(&value.to_string()).unwrap();
        assert_eq!(back.attempt_history().len(), DEFAULT_HISTORY_CAP);
    }
}
