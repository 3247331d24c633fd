use std::sync::Arc;

use edu_core::Clock;
use edu_core::model::{AttemptId, QuizAttempt, User, UserPatch};
use edu_core::xp::calculate_level;
use storage::repository::{RecordStore, StorageError};

use crate::error::AttemptError;

/// An attempt that is stored together with its experience award.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAttempt {
    pub attempt: QuizAttempt,
    pub xp_gain: u32,
    /// The user's experience after the award.
    pub total_xp: u32,
    pub level: u32,
}

impl RecordedAttempt {
    #[must_use]
    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt.id
    }
}

/// Persists finished attempts and awards their experience.
///
/// The attempt is written first. Experience is only touched once that write
/// succeeded, so a failed attempt never leaves a stray award behind.
#[derive(Clone)]
pub struct AttemptRecorder {
    clock: Clock,
    users: Arc<dyn RecordStore<User>>,
    attempts: Arc<dyn RecordStore<QuizAttempt>>,
}

impl AttemptRecorder {
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn RecordStore<User>>,
        attempts: Arc<dyn RecordStore<QuizAttempt>>,
    ) -> Self {
        Self {
            clock,
            users,
            attempts,
        }
    }

    /// Store `attempt` and add its experience to the owning user.
    ///
    /// # Errors
    ///
    /// - `AttemptError::AlreadyRecorded` if an attempt with the same id exists.
    /// - `AttemptError::NotSaved` if the attempt write failed; nothing changed.
    /// - `AttemptError::XpOutOfSync` if the attempt is stored but the user
    ///   update failed.
    pub async fn record(&self, attempt: &QuizAttempt) -> Result<RecordedAttempt, AttemptError> {
        match self.attempts.add(attempt).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                tracing::debug!(attempt_id = %attempt.id, "attempt already recorded");
                return Err(AttemptError::AlreadyRecorded(attempt.id.clone()));
            }
            Err(err) => {
                tracing::error!(attempt_id = %attempt.id, error = %err, "failed to save attempt");
                return Err(AttemptError::NotSaved(err));
            }
        }
        tracing::info!(
            attempt_id = %attempt.id,
            user_id = %attempt.user_id,
            quiz_id = %attempt.quiz_id,
            score = attempt.score.value(),
            "attempt saved"
        );
        self.award(attempt).await
    }

    /// Re-apply the experience award for an attempt that is already stored.
    ///
    /// Only meant for recovering from `AttemptError::XpOutOfSync`; calling it
    /// after a successful `record` awards the experience twice.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotSaved` if the attempt is not in the store and
    /// `AttemptError::XpOutOfSync` if the user update fails again.
    pub async fn retry_xp_award(
        &self,
        attempt: &QuizAttempt,
    ) -> Result<RecordedAttempt, AttemptError> {
        match self.attempts.get(&attempt.id).await {
            Ok(Some(_)) => self.award(attempt).await,
            Ok(None) => Err(AttemptError::NotSaved(StorageError::NotFound)),
            Err(err) => Err(AttemptError::NotSaved(err)),
        }
    }

    async fn award(&self, attempt: &QuizAttempt) -> Result<RecordedAttempt, AttemptError> {
        let xp_gain = attempt.score.xp_gain();
        match self.apply_xp(attempt, xp_gain).await {
            Ok(user) => Ok(RecordedAttempt {
                attempt: attempt.clone(),
                xp_gain,
                total_xp: user.xp,
                level: calculate_level(user.xp),
            }),
            Err(source) => {
                tracing::warn!(
                    attempt_id = %attempt.id,
                    user_id = %attempt.user_id,
                    xp_gain,
                    error = %source,
                    "attempt saved but xp award failed"
                );
                Err(AttemptError::XpOutOfSync {
                    attempt_id: attempt.id.clone(),
                    xp_gain,
                    source,
                })
            }
        }
    }

    // Read-then-update; concurrent awards for one user are last-write-wins.
    async fn apply_xp(&self, attempt: &QuizAttempt, xp_gain: u32) -> Result<User, StorageError> {
        let user = self
            .users
            .get(&attempt.user_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        let total = user.xp.saturating_add(xp_gain);
        let patch = UserPatch::xp(total).with_last_active(self.clock.now());
        self.users.update(&attempt.user_id, patch).await
    }
}
