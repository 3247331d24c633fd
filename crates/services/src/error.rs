//! Shared error types for the services crate.

use thiserror::Error;

use edu_core::model::{AttemptId, LessonId, QuestionId, QuizError, QuizId, UserId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the quiz session and its orchestration.
///
/// A rejected transition leaves the session exactly as it was.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    InvalidQuiz(#[from] QuizError),
    #[error("session already submitted")]
    Completed,
    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(QuestionId),
    #[error("quiz {0} not found")]
    QuizNotFound(QuizId),
    #[error("user {user_id} already has quiz {quiz_id} open")]
    AlreadyActive { user_id: UserId, quiz_id: QuizId },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AttemptRecorder`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptError {
    /// Nothing was written: the attempt write failed, so no experience was
    /// awarded either.
    #[error("attempt not saved: {0}")]
    NotSaved(#[source] StorageError),
    /// An attempt with this id already exists; recording is not repeated.
    #[error("attempt {0} was already recorded")]
    AlreadyRecorded(AttemptId),
    /// The attempt is saved but the experience award did not reach the user
    /// record. Retry with `AttemptRecorder::retry_xp_award`.
    #[error("attempt {attempt_id} saved but {xp_gain} xp not applied: {source}")]
    XpOutOfSync {
        attempt_id: AttemptId,
        xp_gain: u32,
        #[source]
        source: StorageError,
    },
}

impl AttemptError {
    /// True when the attempt itself is persisted.
    #[must_use]
    pub fn attempt_saved(&self) -> bool {
        matches!(
            self,
            AttemptError::AlreadyRecorded(_) | AttemptError::XpOutOfSync { .. }
        )
    }
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("lesson {0} not found")]
    LessonNotFound(LessonId),
    /// The completion was stored but the experience did not reach the user
    /// record. Completing the lesson again applies it.
    #[error("lesson {lesson_id} completed but {xp_gain} xp not applied: {source}")]
    XpOutOfSync {
        lesson_id: LessonId,
        xp_gain: u32,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
