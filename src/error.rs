//! Rich diagnostic error types for the quiz tutor.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers can tell a learner "nothing
//! to study" apart from "content misconfigured".

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the quiz tutor.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum TutorError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Quiz(#[from] QuizError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Suggest(#[from] SuggestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] SourceError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("knowledge node not found: {node_id:?}")]
    #[diagnostic(
        code(tutor::graph::missing_node),
        help(
            "The node id is not part of the knowledge graph. \
             Check that the quiz bank and the knowledge source were loaded \
             from the same snapshot, or add the node first."
        )
    )]
    MissingNode { node_id: String },

    #[error("prerequisite cycle detected ({count} cycle(s)); first cycle: {}", .cycle.join(" -> "))]
    #[diagnostic(
        code(tutor::graph::cycle),
        help(
            "Prerequisite edges must form a DAG. Remove one of the edges on the \
             reported cycle. `find_cycles()` lists every offending cycle."
        )
    )]
    CycleDetected { cycle: Vec<String>, count: usize },
}

// ---------------------------------------------------------------------------
// Quiz errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QuizError {
    #[error("invalid difficulty {level}: must be in [{min}, {max}]")]
    #[diagnostic(
        code(tutor::quiz::invalid_difficulty),
        help("Difficulty levels run from 1 (easiest) to 5 (hardest).")
    )]
    InvalidDifficulty { level: i64, min: u8, max: u8 },

    #[error("invalid quiz type {value:?}")]
    #[diagnostic(
        code(tutor::quiz::invalid_type),
        help("Valid quiz types are: multiple_choice, fill_in_blank.")
    )]
    InvalidQuizType { value: String },

    #[error("unknown quiz: {quiz_id:?}")]
    #[diagnostic(
        code(tutor::quiz::unknown),
        help("The quiz id is not in the loaded quiz bank. It may have been skipped as invalid at load time.")
    )]
    UnknownQuiz { quiz_id: String },
}

// ---------------------------------------------------------------------------
// Profile errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProfileError {
    #[error("score {score} for node {node_id:?} is outside bounds [{min}, {max}]")]
    #[diagnostic(
        code(tutor::profile::score_bounds),
        help(
            "Stored scores must already be clamped. Use `set_score`, which clamps \
             at write time, instead of writing raw values into a profile record."
        )
    )]
    InvalidScoreBounds {
        node_id: String,
        score: f64,
        min: f64,
        max: f64,
    },

    #[error("I/O error on profile file {path}")]
    #[diagnostic(
        code(tutor::profile::io),
        help("Check that the profile directory exists and is readable and writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("profile serialization error: {message}")]
    #[diagnostic(
        code(tutor::profile::serde),
        help(
            "The profile document is not valid JSON for this version. \
             Reset the learner with `reset_user_progress` if it cannot be repaired."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Suggestion errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SuggestError {
    #[error("no quiz available: {reason}")]
    #[diagnostic(
        code(tutor::suggest::no_quiz),
        help(
            "Either the quiz bank is empty or the fallback strategy is \
             `raise_error`. Load quizzes for this graph or switch the fallback \
             to `easiest` or `random`."
        )
    )]
    NoQuizAvailable { reason: String },
}

// ---------------------------------------------------------------------------
// Policy errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("invalid policy: {message}")]
    #[diagnostic(code(tutor::policy::invalid), help("Check the policy fields. {message}"))]
    Invalid { message: String },

    #[error("failed to read policy file: {path}")]
    #[diagnostic(
        code(tutor::policy::config_read),
        help("Ensure the policy file exists and is valid TOML.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {path}")]
    #[diagnostic(
        code(tutor::policy::config_parse),
        help("Check the TOML syntax in the policy file: {message}")
    )]
    ConfigParse { path: String, message: String },

    #[error("failed to write policy file: {path}")]
    #[diagnostic(
        code(tutor::policy::config_write),
        help("Ensure you have write permissions to the target directory.")
    )]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error("failed to read content source: {path}")]
    #[diagnostic(
        code(tutor::source::io),
        help("Ensure the content bundle exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse content source {origin}: {message}")]
    #[diagnostic(
        code(tutor::source::parse),
        help(
            "A content bundle is a JSON object with `nodes`, `edges` and `quizzes` \
             arrays. Check the document against that shape."
        )
    )]
    Parse { origin: String, message: String },
}

/// Convenience alias for functions returning tutor results.
pub type TutorResult<T> = std::result::Result<T, TutorError>;
