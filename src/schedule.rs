//! Spaced-repetition scheduling.
//!
//! Pure functions over interval indices and timestamps. A correct answer with
//! healthy recent accuracy advances a node one step along the interval ladder,
//! a correct answer with poor accuracy steps back, and a wrong answer resets
//! to the first interval.

use chrono::{DateTime, Duration, Utc};

use crate::policy::SchedulePolicy;

const SECONDS_PER_DAY: i64 = 86_400;

impl SchedulePolicy {
    /// Compute the next interval index and review time after an attempt.
    pub fn calculate_next_review(
        &self,
        interval_index: usize,
        is_correct: bool,
        accuracy: f64,
        last_reviewed: DateTime<Utc>,
    ) -> (usize, DateTime<Utc>) {
        let new_index = if !is_correct {
            0
        } else if accuracy < self.lapse_threshold {
            interval_index.saturating_sub(1)
        } else {
            interval_index.saturating_add(1).min(self.max_interval_index())
        };
        let next_review = last_reviewed + Duration::days(i64::from(self.interval_days(new_index)));
        (new_index, next_review)
    }

    /// Total days spent walking the ladder from `current` up to `target` inclusive.
    ///
    /// `target` defaults to the last interval and is clamped to it.
    pub fn estimate_mastery_days(&self, current: usize, target: Option<usize>) -> u64 {
        let target = target
            .unwrap_or(self.max_interval_index())
            .min(self.max_interval_index());
        if current >= target {
            return 0;
        }
        (current..=target)
            .map(|idx| u64::from(self.interval_days(idx)))
            .sum()
    }
}

/// [`SchedulePolicy::calculate_next_review`] with the default intervals.
pub fn calculate_next_review(
    interval_index: usize,
    is_correct: bool,
    accuracy: f64,
    last_reviewed: DateTime<Utc>,
) -> (usize, DateTime<Utc>) {
    SchedulePolicy::default().calculate_next_review(interval_index, is_correct, accuracy, last_reviewed)
}

/// A node with no scheduled review is always due.
pub fn is_due_for_review(next_review: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    next_review.is_none_or(|t| now >= t)
}

pub fn update_streak(streak: u32, is_correct: bool) -> u32 {
    if is_correct { streak.saturating_add(1) } else { 0 }
}

/// Whole days until `next_review`, rounded down.
///
/// Zero when nothing is scheduled, negative once the review is overdue.
pub fn days_until_review(next_review: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    match next_review {
        Some(t) => (t - now).num_seconds().div_euclid(SECONDS_PER_DAY),
        None => 0,
    }
}
