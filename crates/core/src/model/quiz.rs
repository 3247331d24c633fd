use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, QuestionId, QuizId};
use crate::xp;

/// Scores at or above this percentage are presented as a pass.
pub const PASS_THRESHOLD: u8 = 70;

/// Submitted answers keyed by question. Unanswered questions are absent.
pub type AnswerMap = BTreeMap<QuestionId, String>;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz has no questions")]
    NoQuestions,

    #[error("quiz time limit must be > 0 minutes")]
    ZeroTimeLimit,

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("multiple-choice question {0} has no options")]
    MissingOptions(QuestionId),
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice,
    DragDrop,
    FillBlank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Expected answer: one value, or a set of values for multi-answer kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Single(String),
    Multiple(Vec<String>),
}

impl CorrectAnswer {
    /// Strict equality between a submitted value and the expected answer.
    ///
    /// A single submitted string never equals a multi-value answer.
    #[must_use]
    pub fn matches(&self, submitted: &str) -> bool {
        match self {
            CorrectAnswer::Single(expected) => expected == submitted,
            CorrectAnswer::Multiple(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub correct_answer: CorrectAnswer,
    #[serde(default)]
    pub explanation: String,
    pub difficulty: Difficulty,
}

impl Question {
    #[must_use]
    pub fn is_correct(&self, submitted: Option<&str>) -> bool {
        submitted.is_some_and(|value| self.correct_answer.matches(value))
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// A timed, ordered set of questions attached to a lesson.
///
/// Past attempts are not embedded; they live in the attempts collection and
/// reference the quiz by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub lesson_id: LessonId,
    pub title: String,
    pub questions: Vec<Question>,
    pub time_limit_minutes: u32,
}

impl Quiz {
    /// Checks the invariants a session relies on.
    ///
    /// # Errors
    ///
    /// Returns the first `QuizError` found.
    pub fn validate(&self) -> Result<(), QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        if self.time_limit_minutes == 0 {
            return Err(QuizError::ZeroTimeLimit);
        }
        let mut seen = HashSet::with_capacity(self.questions.len());
        for question in &self.questions {
            if !seen.insert(&question.id) {
                return Err(QuizError::DuplicateQuestion(question.id.clone()));
            }
            if question.kind == QuestionKind::MultipleChoice
                && question.options.as_ref().is_none_or(Vec::is_empty)
            {
                return Err(QuizError::MissingOptions(question.id.clone()));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_minutes.saturating_mul(60)
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// Number of questions whose recorded answer equals the expected one.
    #[must_use]
    pub fn correct_count(&self, answers: &AnswerMap) -> usize {
        self.questions
            .iter()
            .filter(|q| q.is_correct(answers.get(&q.id).map(String::as_str)))
            .count()
    }

    #[must_use]
    pub fn score(&self, answers: &AnswerMap) -> QuizScore {
        QuizScore::from_counts(self.correct_count(answers), self.questions.len())
    }
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizOutcome {
    Pass,
    Retry,
}

/// Percentage score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuizScore(u8);

impl QuizScore {
    pub const PERFECT: QuizScore = QuizScore(100);

    /// `round(100 * correct / total)`, rounding halves up. An empty quiz
    /// scores 0.
    #[must_use]
    pub fn from_counts(correct: usize, total: usize) -> Self {
        if total == 0 {
            return Self(0);
        }
        let correct = correct.min(total) as u64;
        let total = total as u64;
        let pct = (200 * correct + total) / (2 * total);
        Self(u8::try_from(pct).unwrap_or(100))
    }

    /// Wraps a stored percentage, clamping anything above 100.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn outcome(self) -> QuizOutcome {
        if self.0 >= PASS_THRESHOLD {
            QuizOutcome::Pass
        } else {
            QuizOutcome::Retry
        }
    }

    #[must_use]
    pub fn xp_gain(self) -> u32 {
        xp::xp_for_score(self.0)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn mc(id: &str, answer: &str) -> Question {
        Question {
            id: QuestionId::new(id),
            kind: QuestionKind::MultipleChoice,
            prompt: format!("Prompt {id}"),
            options: Some(vec![answer.to_owned(), "other".to_owned()]),
            correct_answer: CorrectAnswer::Single(answer.to_owned()),
            explanation: String::new(),
            difficulty: Difficulty::Easy,
        }
    }

    fn quiz(questions: Vec<Question>) -> Quiz {
        Quiz {
            id: QuizId::new("quiz1"),
            lesson_id: LessonId::new("lesson1"),
            title: "Algebra Basics Quiz".into(),
            questions,
            time_limit_minutes: 10,
        }
    }

    fn answers(pairs: &[(&str, &str)]) -> AnswerMap {
        pairs
            .iter()
            .map(|(q, a)| (QuestionId::new(*q), (*a).to_owned()))
            .collect()
    }

    #[test]
    fn score_rounds_half_up() {
        assert_eq!(QuizScore::from_counts(1, 2).value(), 50);
        assert_eq!(QuizScore::from_counts(2, 3).value(), 67);
        assert_eq!(QuizScore::from_counts(1, 3).value(), 33);
        assert_eq!(QuizScore::from_counts(1, 8).value(), 13);
        assert_eq!(QuizScore::from_counts(3, 3).value(), 100);
        assert_eq!(QuizScore::from_counts(0, 0).value(), 0);
    }

    #[test]
    fn unanswered_and_wrong_count_as_incorrect() {
        let q = quiz(vec![mc("q1", "3"), mc("q2", "5x"), mc("q3", "7")]);
        let score = q.score(&answers(&[("q1", "3"), ("q2", "6x")]));
        assert_eq!(q.correct_count(&answers(&[("q1", "3"), ("q2", "6x")])), 1);
        assert_eq!(score.value(), 33);
    }

    #[test]
    fn match_is_strict() {
        let q = quiz(vec![mc("q1", "Solid")]);
        assert_eq!(q.score(&answers(&[("q1", "solid")])).value(), 0);
        assert_eq!(q.score(&answers(&[("q1", "Solid ")])).value(), 0);
        assert_eq!(q.score(&answers(&[("q1", "Solid")])).value(), 100);
    }

    #[test]
    fn multi_answer_never_equals_single_value() {
        let answer = CorrectAnswer::Multiple(vec!["a".into()]);
        assert!(!answer.matches("a"));
    }

    #[test]
    fn outcome_threshold_is_seventy() {
        assert_eq!(QuizScore::new(70).outcome(), QuizOutcome::Pass);
        assert_eq!(QuizScore::new(69).outcome(), QuizOutcome::Retry);
        assert_eq!(QuizScore::new(250).value(), 100);
    }

    #[test]
    fn validate_rejects_broken_quizzes() {
        assert_eq!(quiz(vec![]).validate(), Err(QuizError::NoQuestions));

        let mut zero = quiz(vec![mc("q1", "3")]);
        zero.time_limit_minutes = 0;
        assert_eq!(zero.validate(), Err(QuizError::ZeroTimeLimit));

        let dup = quiz(vec![mc("q1", "3"), mc("q1", "4")]);
        assert_eq!(
            dup.validate(),
            Err(QuizError::DuplicateQuestion(QuestionId::new("q1")))
        );

        let mut bare = mc("q9", "x");
        bare.options = None;
        assert_eq!(
            quiz(vec![bare]).validate(),
            Err(QuizError::MissingOptions(QuestionId::new("q9")))
        );

        assert!(quiz(vec![mc("q1", "3")]).validate().is_ok());
    }

    #[test]
    fn question_wire_shape() {
        let json = r#"{
            "id": "q1", "type": "multiple-choice", "prompt": "2x + 5 = 11?",
            "options": ["2", "3"], "correct_answer": "3",
            "explanation": "2x = 6", "difficulty": "easy"
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.kind, QuestionKind::MultipleChoice);
        assert_eq!(q.correct_answer, CorrectAnswer::Single("3".into()));

        let multi: CorrectAnswer = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(multi, CorrectAnswer::Multiple(vec!["a".into(), "b".into()]));
    }
}
