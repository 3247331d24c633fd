use edu_core::model::{AnswerMap, QuizId, QuizScore};

/// Read-only copy of a session's state for whatever renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub quiz_id: QuizId,
    pub question_index: usize,
    pub total_questions: usize,
    pub answers: AnswerMap,
    pub time_remaining_secs: u32,
    /// Set once the session is submitted.
    pub score: Option<QuizScore>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.score.is_some()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }
}
