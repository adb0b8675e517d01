// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # quiz-tutor
//!
//! An adaptive quiz suggestion engine: given a prerequisite graph of
//! concepts, a learner's per-concept scores and history, and a bank of
//! quizzes, pick the next quiz to present and update the learner's state
//! from the outcome.
//!
//! ## Architecture
//!
//! - **Policy** (`policy`): every tunable threshold, overridable from TOML
//! - **Knowledge graph** (`graph`): petgraph DAG with cached topological order and a lookup cache
//! - **Quiz model** (`quiz`): validated quiz records
//! - **Learner profile** (`profile`): scores, review schedule and attempt history
//! - **Scheduling** (`schedule`): spaced-repetition interval ladder
//! - **Scoring** (`scoring`): applies quiz outcomes to a profile
//! - **Suggestion** (`suggest`): prerequisite gate, recency, priority, difficulty, fallback
//! - **Sources** (`source`): content loaders and profile stores
//! - **Tutor** (`tutor`): public operations and a request-scoped facade
//!
//! ## Library usage
//!
//! ```no_run
//! use quiz_tutor::graph::{KnowledgeGraph, NodeAttrs};
//! use quiz_tutor::profile::LearnerProfile;
//! use quiz_tutor::quiz::{Quiz, QuizContent, QuizType};
//! use quiz_tutor::tutor::{suggest_next_quiz, update_scores};
//!
//! let mut kg = KnowledgeGraph::new();
//! kg.add_node("vars", NodeAttrs::new("Variables"));
//! kg.add_node("loops", NodeAttrs::new("Loops"));
//! kg.add_edge("loops", "vars");
//!
//! let quizzes = vec![
//!     Quiz::new("q1", ["vars"], QuizType::FillInBlank, QuizContent::new("let x = ?", "1"), 1).unwrap(),
//! ];
//! let profile = LearnerProfile::new("learner");
//! let quiz = suggest_next_quiz(&profile, &kg, &quizzes).unwrap();
//! let profile = update_scores(profile, quiz, true, &kg);
//! assert_eq!(profile.get_score("vars"), 1.0);
//! ```

pub mod error;
pub mod graph;
pub mod policy;
pub mod profile;
pub mod quiz;
pub mod schedule;
pub mod scoring;
pub mod source;
pub mod suggest;
pub mod tutor;

pub use error::{TutorError, TutorResult};
pub use graph::{KnowledgeGraph, NodeAttrs, NodeId};
pub use policy::{FallbackStrategy, Policy};
pub use profile::{AttemptRecord, LearnerProfile, ScheduleEntry};
pub use quiz::{Quiz, QuizContent, QuizType};
pub use tutor::{
    LearningProgress, Tutor, get_learning_progress, reset_user_progress, suggest_next_quiz,
    update_scores,
};
