//! Quizzes: assessable items linked to knowledge nodes.
//!
//! A [`Quiz`] is validated at construction: its difficulty lies in
//! `[MIN_DIFFICULTY, MAX_DIFFICULTY]` and its type is one of [`QuizType`].
//! Raw JSON documents are read through [`QuizRecord`], so an invalid record
//! fails deserialization instead of producing an invalid quiz.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QuizError;
use crate::graph::NodeId;
use crate::policy::{MAX_DIFFICULTY, MIN_DIFFICULTY};

/// Result type for quiz construction.
pub type QuizResult<T> = std::result::Result<T, QuizError>;

/// Presentation format of a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    MultipleChoice,
    FillInBlank,
}

impl QuizType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizType::MultipleChoice => "multiple_choice",
            QuizType::FillInBlank => "fill_in_blank",
        }
    }
}

impl FromStr for QuizType {
    type Err = QuizError;

    fn from_str(s: &str) -> QuizResult<Self> {
        match s {
            "multiple_choice" => Ok(QuizType::MultipleChoice),
            "fill_in_blank" => Ok(QuizType::FillInBlank),
            other => Err(QuizError::InvalidQuizType {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for QuizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Question payload. Opaque to the selection logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizContent {
    /// The question text.
    pub stem: String,
    /// Answer options for multiple-choice quizzes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuizContent {
    pub fn new(stem: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            stem: stem.into(),
            answer: answer.into(),
            ..Default::default()
        }
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

/// Unvalidated quiz document as it appears in a quiz bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub id: String,
    #[serde(default)]
    pub linked_nodes: Vec<NodeId>,
    pub quiz_type: String,
    #[serde(default)]
    pub content: QuizContent,
    pub difficulty_level: i64,
}

/// A validated quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuizRecord", into = "QuizRecord")]
pub struct Quiz {
    id: String,
    linked_nodes: Vec<NodeId>,
    quiz_type: QuizType,
    content: QuizContent,
    difficulty_level: u8,
}

impl Quiz {
    /// Build a quiz, validating the difficulty level.
    ///
    /// Duplicate linked nodes are dropped; the first occurrence keeps its position.
    pub fn new(
        id: impl Into<String>,
        linked_nodes: impl IntoIterator<Item = impl Into<NodeId>>,
        quiz_type: QuizType,
        content: QuizContent,
        difficulty_level: i64,
    ) -> QuizResult<Self> {
        let difficulty_level = u8::try_from(difficulty_level)
            .ok()
            .filter(|d| (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(d))
            .ok_or(QuizError::InvalidDifficulty {
                level: difficulty_level,
                min: MIN_DIFFICULTY,
                max: MAX_DIFFICULTY,
            })?;

        let mut seen = HashSet::new();
        let linked_nodes = linked_nodes
            .into_iter()
            .map(Into::into)
            .filter(|id: &NodeId| seen.insert(id.clone()))
            .collect();

        Ok(Self {
            id: id.into(),
            linked_nodes,
            quiz_type,
            content,
            difficulty_level,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Knowledge nodes this quiz assesses, without duplicates.
    pub fn linked_nodes(&self) -> &[NodeId] {
        &self.linked_nodes
    }

    pub fn quiz_type(&self) -> QuizType {
        self.quiz_type
    }

    pub fn content(&self) -> &QuizContent {
        &self.content
    }

    /// Difficulty in `[MIN_DIFFICULTY, MAX_DIFFICULTY]`.
    pub fn difficulty_level(&self) -> u8 {
        self.difficulty_level
    }

    /// Whether this quiz assesses `node_id`.
    pub fn assesses(&self, node_id: &str) -> bool {
        self.linked_nodes.iter().any(|n| n == node_id)
    }

    /// Check a learner response.
    ///
    /// Multiple choice accepts the exact choice text or its 1-based position.
    /// Fill-in-blank compares trimmed, case-insensitive text.
    pub fn check_answer(&self, response: &str) -> bool {
        let response = response.trim();
        let answer = self.content.answer.trim();
        match self.quiz_type {
            QuizType::MultipleChoice => {
                let by_position = response
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| self.content.choices.get(i));
                match by_position {
                    Some(choice) => choice.trim() == answer,
                    None => response == answer,
                }
            }
            QuizType::FillInBlank => response.to_lowercase() == answer.to_lowercase(),
        }
    }
}

impl TryFrom<QuizRecord> for Quiz {
    type Error = QuizError;

    fn try_from(record: QuizRecord) -> QuizResult<Self> {
        let quiz_type = record.quiz_type.parse()?;
        Quiz::new(
            record.id,
            record.linked_nodes,
            quiz_type,
            record.content,
            record.difficulty_level,
        )
    }
}

impl From<Quiz> for QuizRecord {
    fn from(quiz: Quiz) -> Self {
        QuizRecord {
            id: quiz.id,
            linked_nodes: quiz.linked_nodes,
            quiz_type: quiz.quiz_type.as_str().to_string(),
            content: quiz.content,
            difficulty_level: i64::from(quiz.difficulty_level),
        }
    }
}

impl fmt::Display for Quiz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, difficulty {}] -> {}",
            self.id,
            self.quiz_type,
            self.difficulty_level,
            self.linked_nodes.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mc() -> Quiz {
        Quiz::new(
            "q1",
            ["loops", "vars", "loops"],
            QuizType::MultipleChoice,
            QuizContent::new("Which keyword starts a loop?", "for").with_choices(["if", "for", "let"]),
            2,
        )
        .unwrap()
    }

    #[test]
    fn difficulty_out_of_range_rejected() {
        for level in [0, 6, -1, 300] {
            let err = Quiz::new(
                "bad",
                ["n"],
                QuizType::FillInBlank,
                QuizContent::default(),
                level,
            )
            .unwrap_err();
            assert!(matches!(err, QuizError::InvalidDifficulty { level: l, .. } if l == level));
        }
    }

    #[test]
    fn linked_nodes_deduplicated_in_order() {
        assert_eq!(mc().linked_nodes().to_vec(), vec!["loops", "vars"]);
        assert!(mc().assesses("vars"));
        assert!(!mc().assesses("closures"));
    }

    #[test]
    fn multiple_choice_answers() {
        let quiz = mc();
        assert!(quiz.check_answer("for"));
        assert!(quiz.check_answer(" 2 "));
        assert!(!quiz.check_answer("1"));
        assert!(!quiz.check_answer("For"));
    }

    #[test]
    fn fill_in_blank_ignores_case_and_whitespace() {
        let quiz = Quiz::new(
            "q2",
            ["vars"],
            QuizType::FillInBlank,
            QuizContent::new("A named value is a ___", "Variable"),
            1,
        )
        .unwrap();
        assert!(quiz.check_answer("  variable "));
        assert!(!quiz.check_answer("constant"));
    }

    #[test]
    fn record_deserialization_validates() {
        let ok: Quiz = serde_json::from_str(
            r#"{"id": "q", "linked_nodes": ["a"], "quiz_type": "fill_in_blank",
                "content": {"stem": "?", "answer": "x"}, "difficulty_level": 5}"#,
        )
        .unwrap();
        assert_eq!(ok.difficulty_level(), 5);

        let bad_type = serde_json::from_str::<Quiz>(
            r#"{"id": "q", "quiz_type": "essay", "difficulty_level": 3}"#,
        );
        assert!(bad_type.is_err());

        let bad_level = serde_json::from_str::<Quiz>(
            r#"{"id": "q", "quiz_type": "multiple_choice", "difficulty_level": 9}"#,
        );
        assert!(bad_level.is_err());
    }

    #[test]
    fn serializes_as_record() {
        let json = serde_json::to_value(mc()).unwrap();
        assert_eq!(json["quiz_type"], "multiple_choice");
        assert_eq!(json["difficulty_level"], 2);
        let back: Quiz = serde_json::from_value(json).unwrap();
        assert_eq!(back, mc());
    }

    #[test]
    fn quiz_type_parse() {
        assert_eq!("fill_in_blank".parse::<QuizType>().unwrap(), QuizType::FillInBlank);
        assert!(matches!(
            "essay".parse::<QuizType>(),
            Err(QuizError::InvalidQuizType { .. })
        ));
    }
}
