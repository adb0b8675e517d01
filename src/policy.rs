//! Tunable policy for scoring, scheduling and quiz selection.
//!
//! Every threshold the engine consults lives in [`Policy`], so the algorithm can
//! be exercised under different tunings. Policies are persisted as TOML; every
//! section and field has a serde default, so a file only needs the values it
//! overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

pub type PolicyResult<T> = std::result::Result<T, PolicyError>;

/// Easiest quiz difficulty.
pub const MIN_DIFFICULTY: u8 = 1;
/// Hardest quiz difficulty.
pub const MAX_DIFFICULTY: u8 = 5;

/// Closed interval every stored score is clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBounds {
    pub min: f64,
    pub max: f64,
}

impl ScoreBounds {
    pub const DEFAULT: Self = Self {
        min: -5.0,
        max: 10.0,
    };

    /// Clamp `value` into the bounds. NaN clamps to `min`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Whether `value` is finite and inside the bounds.
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

impl Default for ScoreBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Score deltas, mastery and history limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Score at or above which a node counts as mastered.
    pub mastery_threshold: f64,
    /// Added to every linked node on a correct answer.
    pub correct_delta: f64,
    /// Subtracted from every linked node on an incorrect answer.
    pub incorrect_delta: f64,
    /// Added to each immediate prerequisite on a correct answer.
    pub prereq_bonus: f64,
    /// Number of recent attempts used for rolling accuracy.
    pub accuracy_window: usize,
    /// Maximum attempts retained per learner.
    pub attempt_history_len: usize,
    pub score_bounds: ScoreBounds,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            mastery_threshold: 3.0,
            correct_delta: 1.0,
            incorrect_delta: 1.0,
            prereq_bonus: 0.1,
            accuracy_window: 10,
            attempt_history_len: 200,
            score_bounds: ScoreBounds::DEFAULT,
        }
    }
}

/// Spaced-repetition parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    /// Review gaps in days, indexed by a node's interval index.
    #[serde(default = "default_review_intervals")]
    pub review_intervals_days: Vec<u32>,
    /// Accuracy below which a correct answer steps the interval back.
    #[serde(default = "default_lapse_threshold")]
    pub lapse_threshold: f64,
}

fn default_review_intervals() -> Vec<u32> {
    vec![1, 3, 7, 14, 30, 60, 120]
}
fn default_lapse_threshold() -> f64 {
    0.5
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            review_intervals_days: default_review_intervals(),
            lapse_threshold: default_lapse_threshold(),
        }
    }
}

impl SchedulePolicy {
    /// Highest valid interval index.
    pub fn max_interval_index(&self) -> usize {
        self.review_intervals_days.len().saturating_sub(1)
    }

    /// Days for an interval index, clamped to the configured list.
    pub fn interval_days(&self, index: usize) -> u32 {
        let idx = index.min(self.max_interval_index());
        self.review_intervals_days.get(idx).copied().unwrap_or(1)
    }
}

/// Maps an average score range `[min, max)` to a target difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBand {
    pub level: u8,
    pub min: f64,
    pub max: f64,
}

impl DifficultyBand {
    pub const fn new(level: u8, min: f64, max: f64) -> Self {
        Self { level, min, max }
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score < self.max
    }
}

/// What to return when no candidate survives the prerequisite gate.
///
/// Unknown configured values deserialize to [`FallbackStrategy::Random`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FallbackStrategy {
    /// The quiz with the lowest difficulty level.
    Easiest,
    /// A uniformly random quiz.
    Random,
    /// Fail with `NoQuizAvailable`.
    RaiseError,
}

impl FallbackStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackStrategy::Easiest => "easiest",
            FallbackStrategy::Random => "random",
            FallbackStrategy::RaiseError => "raise_error",
        }
    }

    /// Parse a configured strategy name, falling back to `Random`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "easiest" => FallbackStrategy::Easiest,
            "random" => FallbackStrategy::Random,
            "raise_error" => FallbackStrategy::RaiseError,
            other => {
                tracing::warn!(strategy = other, "unknown fallback strategy, using random");
                FallbackStrategy::Random
            }
        }
    }
}

impl From<String> for FallbackStrategy {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<FallbackStrategy> for String {
    fn from(strategy: FallbackStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl std::fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection pipeline knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionPolicy {
    /// Minimum prerequisite score for a prerequisite to count as met.
    pub prerequisite_threshold: f64,
    /// Number of most recent attempts whose quizzes are avoided.
    pub recency_window: usize,
    /// Priority per point of negative score on a linked node.
    pub weakness_weight: f64,
    /// Priority for each linked node due for review.
    pub due_review_bonus: f64,
    /// Allowed distance between a quiz's difficulty and its target.
    pub difficulty_tolerance: u8,
    /// Target difficulty when no band matches.
    pub default_difficulty: u8,
    pub fallback_strategy: FallbackStrategy,
    pub difficulty_bands: Vec<DifficultyBand>,
}

impl Default for SuggestionPolicy {
    fn default() -> Self {
        Self {
            prerequisite_threshold: 0.0,
            recency_window: 5,
            weakness_weight: 10.0,
            due_review_bonus: 5.0,
            difficulty_tolerance: 1,
            default_difficulty: 3,
            fallback_strategy: FallbackStrategy::Easiest,
            difficulty_bands: vec![
                DifficultyBand::new(1, -5.0, -2.0),
                DifficultyBand::new(2, -2.0, 0.0),
                DifficultyBand::new(3, 0.0, 2.0),
                DifficultyBand::new(4, 2.0, 4.0),
                DifficultyBand::new(5, 4.0, 10.0),
            ],
        }
    }
}

impl SuggestionPolicy {
    /// Map an average node score to a target difficulty level.
    pub fn target_difficulty(&self, average_score: f64) -> u8 {
        self.difficulty_bands
            .iter()
            .find(|band| band.contains(average_score))
            .map(|band| band.level)
            .unwrap_or(self.default_difficulty)
    }
}

/// Settings for [`crate::graph::cache::CachedLookup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    pub enabled: bool,
    /// Maximum cached entries per lookup kind.
    pub capacity: usize,
    /// Entry lifetime in seconds; 0 disables expiry.
    pub ttl_secs: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1000,
            ttl_secs: 300,
        }
    }
}

/// The complete, externally overridable policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub scoring: ScoringPolicy,
    pub schedule: SchedulePolicy,
    pub suggestion: SuggestionPolicy,
    pub cache: CachePolicy,
}

impl Policy {
    /// Parse a policy from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> PolicyResult<Self> {
        let policy: Policy = toml::from_str(content).map_err(|e| PolicyError::ConfigParse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> PolicyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PolicyError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let policy: Policy = toml::from_str(&content).map_err(|e| PolicyError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        policy.validate()?;
        tracing::debug!(path = %path.display(), "loaded policy");
        Ok(policy)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> PolicyResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| PolicyError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PolicyError::ConfigWrite {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| PolicyError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Check internal consistency.
    pub fn validate(&self) -> PolicyResult<()> {
        let bounds = self.scoring.score_bounds;
        if !bounds.min.is_finite() || !bounds.max.is_finite() || bounds.min >= bounds.max {
            return Err(invalid(format!(
                "score bounds must be finite with min < max, got [{}, {}]",
                bounds.min, bounds.max
            )));
        }
        for (name, value) in [
            ("correct_delta", self.scoring.correct_delta),
            ("incorrect_delta", self.scoring.incorrect_delta),
            ("prereq_bonus", self.scoring.prereq_bonus),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must be a finite, non-negative number")));
            }
        }
        if self.scoring.attempt_history_len == 0 {
            return Err(invalid("attempt_history_len must be > 0".into()));
        }
        if self.schedule.review_intervals_days.is_empty() {
            return Err(invalid("review_intervals_days must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.schedule.lapse_threshold) {
            return Err(invalid(format!(
                "lapse_threshold must be in [0, 1], got {}",
                self.schedule.lapse_threshold
            )));
        }
        let difficulty_range = MIN_DIFFICULTY..=MAX_DIFFICULTY;
        if !difficulty_range.contains(&self.suggestion.default_difficulty) {
            return Err(invalid(format!(
                "default_difficulty must be in [{MIN_DIFFICULTY}, {MAX_DIFFICULTY}], got {}",
                self.suggestion.default_difficulty
            )));
        }
        for band in &self.suggestion.difficulty_bands {
            if !difficulty_range.contains(&band.level) {
                return Err(invalid(format!(
                    "difficulty band level {} is outside [{MIN_DIFFICULTY}, {MAX_DIFFICULTY}]",
                    band.level
                )));
            }
            if band.min.is_nan() || band.max.is_nan() || band.min >= band.max {
                return Err(invalid(format!(
                    "difficulty band {} has an empty range [{}, {})",
                    band.level, band.min, band.max
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> PolicyError {
    PolicyError::Invalid { message }
}
