use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{AttemptId, QuizId, UserId};
use crate::model::quiz::{AnswerMap, QuizScore};

/// One finished pass through a quiz. Written once and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: AttemptId,
    pub user_id: UserId,
    pub quiz_id: QuizId,
    pub score: QuizScore,
    pub answers: AnswerMap,
    pub completed_at: DateTime<Utc>,
    pub time_spent_secs: u32,
}

impl QuizAttempt {
    #[must_use]
    pub fn is_perfect(&self) -> bool {
        self.score == QuizScore::PERFECT
    }
}

/// Best score among `attempts`, if any.
#[must_use]
pub fn best_score<'a>(attempts: impl IntoIterator<Item = &'a QuizAttempt>) -> Option<QuizScore> {
    attempts.into_iter().map(|a| a.score).max()
}
