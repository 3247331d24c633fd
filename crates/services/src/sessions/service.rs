use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use edu_core::model::{
    AnswerMap, AttemptId, Question, QuestionId, Quiz, QuizAttempt, QuizId, QuizScore, UserId,
};

use super::snapshot::SessionSnapshot;
use crate::error::SessionError;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Fixed at submission so the attempt can only ever be stored once.
    pub attempt_id: AttemptId,
    pub score: QuizScore,
    pub submitted_at: DateTime<Utc>,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    InProgress,
    Submitted(Submission),
}

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running { remaining_secs: u32 },
    /// The countdown hit zero and the session was submitted.
    TimedOut(QuizScore),
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One attempt at a quiz, from the first question to a scored submission.
///
/// The session knows nothing about storage or timers; it only applies
/// transitions. It does not require answers before moving on or submitting:
/// gating on the current answer belongs to the presentation layer
/// (see `QuizView`).
pub struct QuizSession {
    quiz: Arc<Quiz>,
    user_id: UserId,
    current: usize,
    answers: AnswerMap,
    time_remaining: u32,
    started_at: DateTime<Utc>,
    state: SessionState,
}

impl QuizSession {
    /// Start at the first question with the full time limit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidQuiz` if the quiz has no questions or no
    /// time limit.
    pub fn new(
        quiz: Arc<Quiz>,
        user_id: UserId,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        quiz.validate()?;
        Ok(Self {
            time_remaining: quiz.time_limit_secs(),
            quiz,
            user_id,
            current: 0,
            answers: AnswerMap::new(),
            started_at,
            state: SessionState::InProgress,
        })
    }

    #[must_use]
    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    #[must_use]
    pub fn quiz_id(&self) -> &QuizId {
        &self.quiz.id
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn last_index(&self) -> usize {
        self.quiz.questions.len() - 1
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.quiz.questions[self.current]
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn answer_for(&self, question_id: &QuestionId) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    #[must_use]
    pub fn time_remaining_secs(&self) -> u32 {
        self.time_remaining
    }

    /// Countdown seconds consumed so far.
    #[must_use]
    pub fn time_spent_secs(&self) -> u32 {
        self.quiz.time_limit_secs() - self.time_remaining
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        matches!(self.state, SessionState::Submitted(_))
    }

    #[must_use]
    pub fn submission(&self) -> Option<&Submission> {
        match &self.state {
            SessionState::InProgress => None,
            SessionState::Submitted(submission) => Some(submission),
        }
    }

    #[must_use]
    pub fn score(&self) -> Option<QuizScore> {
        self.submission().map(|s| s.score)
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        if self.is_submitted() {
            return Err(SessionError::Completed);
        }
        Ok(())
    }

    /// Record or overwrite the answer to one question. The current index does
    /// not move.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` after submission and
    /// `SessionError::UnknownQuestion` for a question outside this quiz.
    pub fn answer(
        &mut self,
        question_id: &QuestionId,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        if self.quiz.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion(question_id.clone()));
        }
        self.answers.insert(question_id.clone(), value.into());
        Ok(())
    }

    /// Move to the next question. Returns `false` (and stays put) on the last
    /// question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` after submission.
    pub fn next(&mut self) -> Result<bool, SessionError> {
        self.ensure_in_progress()?;
        if self.current >= self.last_index() {
            return Ok(false);
        }
        self.current += 1;
        Ok(true)
    }

    /// Move to the previous question. Returns `false` on the first question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` after submission.
    pub fn previous(&mut self) -> Result<bool, SessionError> {
        self.ensure_in_progress()?;
        if self.current == 0 {
            return Ok(false);
        }
        self.current -= 1;
        Ok(true)
    }

    /// Consume one second of the countdown. Reaching zero submits the session
    /// whatever is still unanswered.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` after submission.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Tick, SessionError> {
        self.ensure_in_progress()?;
        self.time_remaining = self.time_remaining.saturating_sub(1);
        if self.time_remaining == 0 {
            return Ok(Tick::TimedOut(self.finish(now, true)));
        }
        Ok(Tick::Running {
            remaining_secs: self.time_remaining,
        })
    }

    /// Score the answers and end the session. Allowed at any question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` if the session was already submitted.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<QuizScore, SessionError> {
        self.ensure_in_progress()?;
        Ok(self.finish(now, false))
    }

    fn finish(&mut self, now: DateTime<Utc>, timed_out: bool) -> QuizScore {
        let score = self.quiz.score(&self.answers);
        self.state = SessionState::Submitted(Submission {
            attempt_id: AttemptId::generate(),
            score,
            submitted_at: now,
            timed_out,
        });
        score
    }

    /// The attempt record for a submitted session.
    #[must_use]
    pub fn to_attempt(&self) -> Option<QuizAttempt> {
        let submission = self.submission()?;
        Some(QuizAttempt {
            id: submission.attempt_id.clone(),
            user_id: self.user_id.clone(),
            quiz_id: self.quiz.id.clone(),
            score: submission.score,
            answers: self.answers.clone(),
            completed_at: submission.submitted_at,
            time_spent_secs: self.time_spent_secs(),
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            quiz_id: self.quiz.id.clone(),
            question_index: self.current,
            total_questions: self.quiz.questions.len(),
            answers: self.answers.clone(),
            time_remaining_secs: self.time_remaining,
            score: self.score(),
        }
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("quiz_id", &self.quiz.id)
            .field("user_id", &self.user_id)
            .field("current", &self.current)
            .field("answers_len", &self.answers.len())
            .field("time_remaining", &self.time_remaining)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use edu_core::model::QuizError;
    use edu_core::time::fixed_now;
    use storage::demo;

    fn algebra() -> Arc<Quiz> {
        Arc::new(demo::quizzes().remove(0))
    }

    fn session() -> QuizSession {
        QuizSession::new(algebra(), UserId::new("user1"), fixed_now()).unwrap()
    }

    fn q(id: &str) -> QuestionId {
        QuestionId::new(id)
    }

    #[test]
    fn starts_at_first_question_with_full_clock() {
        let session = session();
        assert_eq!(session.current_index(), 0);
        assert!(session.answers().is_empty());
        assert_eq!(session.time_remaining_secs(), 600);
        assert_eq!(session.state(), &SessionState::InProgress);
    }

    #[test]
    fn empty_quiz_is_rejected() {
        let mut quiz = demo::quizzes().remove(0);
        quiz.questions.clear();
        let err = QuizSession::new(Arc::new(quiz), UserId::new("user1"), fixed_now()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidQuiz(QuizError::NoQuestions)));
    }

    #[test]
    fn answers_overwrite_without_moving() {
        let mut session = session();
        session.answer(&q("q1"), "2").unwrap();
        session.answer(&q("q2"), "5x").unwrap();
        session.answer(&q("q1"), "3").unwrap();

        assert_eq!(session.current_index(), 0);
        assert_eq!(session.answer_for(&q("q1")), Some("3"));
        assert_eq!(session.answer_for(&q("q2")), Some("5x"));

        let err = session.answer(&q("q99"), "x").unwrap_err();
        assert!(matches!(err, SessionError::UnknownQuestion(_)));
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut session = session();
        assert!(!session.previous().unwrap());
        assert_eq!(session.current_index(), 0);

        assert!(session.next().unwrap());
        assert_eq!(session.current_index(), 1);
        assert!(!session.next().unwrap());
        assert!(!session.next().unwrap());
        assert_eq!(session.current_index(), 1);

        assert!(session.previous().unwrap());
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn navigation_does_not_need_answers() {
        let mut session = session();
        assert!(session.next().unwrap());
        assert_eq!(session.current_question().id, q("q2"));
    }

    #[test]
    fn submit_scores_half_correct() {
        let mut session = session();
        session.answer(&q("q1"), "3").unwrap();
        session.answer(&q("q2"), "6x").unwrap();
        let score = session.submit(fixed_now()).unwrap();
        assert_eq!(score.value(), 50);
        assert_eq!(session.score(), Some(score));
        assert!(!session.submission().unwrap().timed_out);
    }

    #[test]
    fn submit_from_first_question_with_nothing_answered() {
        let mut session = session();
        assert_eq!(session.submit(fixed_now()).unwrap().value(), 0);
    }

    #[test]
    fn transitions_after_submit_are_rejected_and_harmless() {
        let mut session = session();
        session.answer(&q("q1"), "3").unwrap();
        session.submit(fixed_now()).unwrap();
        let before = session.snapshot();

        assert!(matches!(session.answer(&q("q2"), "5x"), Err(SessionError::Completed)));
        assert!(matches!(session.next(), Err(SessionError::Completed)));
        assert!(matches!(session.previous(), Err(SessionError::Completed)));
        assert!(matches!(session.tick(fixed_now()), Err(SessionError::Completed)));
        assert!(matches!(session.submit(fixed_now()), Err(SessionError::Completed)));

        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn last_second_forces_submission() {
        let mut session = session();
        session.answer(&q("q1"), "3").unwrap();
        session.time_remaining = 1;

        let tick = session.tick(fixed_now()).unwrap();
        assert_eq!(tick, Tick::TimedOut(QuizScore::new(50)));
        assert!(session.submission().unwrap().timed_out);
        assert_eq!(session.time_remaining_secs(), 0);
    }

    #[test]
    fn ticks_count_down_and_measure_time_spent() {
        let mut session = session();
        for _ in 0..5 {
            session.tick(fixed_now()).unwrap();
        }
        assert_eq!(
            session.tick(fixed_now()).unwrap(),
            Tick::Running { remaining_secs: 594 }
        );
        assert_eq!(session.time_spent_secs(), 6);
    }

    #[test]
    fn attempt_uses_submission_identity() {
        let mut session = session();
        assert!(session.to_attempt().is_none());
        session.answer(&q("q2"), "5x").unwrap();
        session.tick(fixed_now()).unwrap();
        session.submit(fixed_now()).unwrap();

        let first = session.to_attempt().unwrap();
        let second = session.to_attempt().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.answers.len(), 1);
        assert_eq!(first.time_spent_secs, 1);
        assert_eq!(first.score.value(), 50);
    }
}
