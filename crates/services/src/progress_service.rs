use std::cmp::Reverse;

use edu_core::Clock;
use edu_core::achievements::{self, BadgeProgress, BadgeStats};
use edu_core::model::{
    Badge, Lesson, LessonId, LessonProgress, ProgressId, ProgressPatch, QuizAttempt, QuizId, QuizOutcome,
    QuizScore, User, UserId, UserPatch, best_score,
};
use edu_core::xp;
use storage::repository::{RecordStore, Storage};

use crate::error::ProgressError;

/// Numbers shown on a student's dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardStats {
    pub xp: u32,
    pub level: u32,
    pub xp_to_next_level: u32,
    pub level_progress_percent: u8,
    pub streak: u32,
    pub badge_count: usize,
    pub lessons_completed: u32,
    pub quizzes_taken: u32,
    /// Rounded mean over all attempts; `None` before the first attempt.
    pub average_score: Option<QuizScore>,
    pub quizzes_passed: u32,
}

/// One user's attempts on one quiz, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizHistory {
    pub quiz_id: QuizId,
    pub attempts: Vec<QuizAttempt>,
    pub best: Option<QuizScore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// 1-based.
    pub rank: u32,
    pub user_id: UserId,
    pub name: String,
    pub xp: u32,
    pub level: u32,
}

/// Result of `ProgressService::complete_lesson`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonCompletion {
    pub progress: LessonProgress,
    /// Zero when the lesson had already been completed.
    pub xp_awarded: u32,
    pub total_xp: u32,
}

/// Per-user lesson progress, badges, and the derived dashboard views.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    storage: Storage,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage) -> Self {
        Self { clock, storage }
    }

    async fn user(&self, user_id: &UserId) -> Result<User, ProgressError> {
        self.storage
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| ProgressError::UserNotFound(user_id.clone()))
    }

    async fn attempts_of(&self, user_id: &UserId) -> Result<Vec<QuizAttempt>, ProgressError> {
        let mut attempts: Vec<_> = self
            .storage
            .attempts
            .get_all()
            .await?
            .into_iter()
            .filter(|a| &a.user_id == user_id)
            .collect();
        attempts.sort_by_key(|a| Reverse(a.completed_at));
        Ok(attempts)
    }

    async fn progress_of(&self, user_id: &UserId) -> Result<Vec<LessonProgress>, ProgressError> {
        Ok(self
            .storage
            .progress
            .get_all()
            .await?
            .into_iter()
            .filter(|p| &p.user_id == user_id)
            .collect())
    }

    async fn badge_stats(&self, user: &User) -> Result<BadgeStats, ProgressError> {
        let lessons_completed = self
            .progress_of(&user.id)
            .await?
            .iter()
            .filter(|p| p.is_completed())
            .count();
        let perfect_quizzes = self
            .attempts_of(&user.id)
            .await?
            .iter()
            .filter(|a| a.is_perfect())
            .count();
        Ok(BadgeStats {
            lessons_completed: saturating_u32(lessons_completed),
            streak: user.streak,
            perfect_quizzes: saturating_u32(perfect_quizzes),
        })
    }

    /// # Errors
    ///
    /// Returns `ProgressError::UserNotFound` for an unknown user and
    /// `ProgressError::Storage` on repository failures.
    pub async fn dashboard(&self, user_id: &UserId) -> Result<DashboardStats, ProgressError> {
        let user = self.user(user_id).await?;
        let attempts = self.attempts_of(user_id).await?;
        let lessons_completed = self
            .progress_of(user_id)
            .await?
            .iter()
            .filter(|p| p.is_completed())
            .count();

        let quizzes_passed = attempts
            .iter()
            .filter(|a| a.score.outcome() == QuizOutcome::Pass)
            .count();

        Ok(DashboardStats {
            xp: user.xp,
            level: user.level(),
            xp_to_next_level: user.xp_for_next_level(),
            level_progress_percent: xp::level_progress_percent(user.xp),
            streak: user.streak,
            badge_count: user.badges().len(),
            lessons_completed: saturating_u32(lessons_completed),
            quizzes_taken: saturating_u32(attempts.len()),
            average_score: average_score(&attempts),
            quizzes_passed: saturating_u32(quizzes_passed),
        })
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on repository failures.
    pub async fn quiz_history(
        &self,
        user_id: &UserId,
        quiz_id: &QuizId,
    ) -> Result<QuizHistory, ProgressError> {
        let attempts: Vec<_> = self
            .attempts_of(user_id)
            .await?
            .into_iter()
            .filter(|a| &a.quiz_id == quiz_id)
            .collect();
        Ok(QuizHistory {
            quiz_id: quiz_id.clone(),
            best: best_score(&attempts),
            attempts,
        })
    }

    /// Students by experience, highest first; equal experience is ordered by
    /// name.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on repository failures.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ProgressError> {
        let mut students: Vec<_> = self
            .storage
            .users
            .get_all()
            .await?
            .into_iter()
            .filter(User::is_student)
            .collect();
        students.sort_by(|a, b| b.xp.cmp(&a.xp).then_with(|| a.name.cmp(&b.name)));

        Ok(students
            .into_iter()
            .take(limit)
            .zip(1u32..)
            .map(|(user, rank)| LeaderboardEntry {
                rank,
                level: user.level(),
                xp: user.xp,
                name: user.name,
                user_id: user.id,
            })
            .collect())
    }

    /// Store how far `user_id` got through a lesson, creating the record on
    /// first access. Reaching 100 % here does not complete the lesson; use
    /// [`ProgressService::complete_lesson`].
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UserNotFound`/`LessonNotFound` for unknown ids and
    /// `ProgressError::Storage` on repository failures.
    pub async fn record_lesson_progress(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        percent: u8,
    ) -> Result<LessonProgress, ProgressError> {
        self.user(user_id).await?;
        self.ensure_lesson(lesson_id).await?;
        let patch = ProgressPatch {
            percent: Some(percent),
            last_accessed: Some(self.clock.now()),
            ..ProgressPatch::default()
        };
        self.upsert_progress(user_id, lesson_id, patch).await
    }

    /// Mark a lesson completed for one user and award its experience. The
    /// award happens once per user; completing again changes nothing but
    /// the access time.
    ///
    /// The completion is stored before the award and the award is marked on
    /// the progress record afterwards, so calling this again after a failed
    /// award applies the missing experience.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UserNotFound`/`LessonNotFound` for unknown ids,
    /// `ProgressError::XpOutOfSync` when the completion was stored but the
    /// user record was not updated, and `ProgressError::Storage` on other
    /// repository failures.
    pub async fn complete_lesson(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
    ) -> Result<LessonCompletion, ProgressError> {
        let user = self.user(user_id).await?;
        let lesson = self.ensure_lesson(lesson_id).await?;
        let now = self.clock.now();

        let patch = ProgressPatch {
            percent: Some(100),
            last_accessed: Some(now),
            completed_at: Some(now),
            ..ProgressPatch::default()
        };
        let progress = self.upsert_progress(user_id, lesson_id, patch).await?;
        if progress.is_rewarded() {
            return Ok(LessonCompletion {
                progress,
                xp_awarded: 0,
                total_xp: user.xp,
            });
        }

        let total = user.xp.saturating_add(lesson.xp_reward);
        let user = match self
            .storage
            .users
            .update(user_id, UserPatch::xp(total).with_last_active(now))
            .await
        {
            Ok(user) => user,
            Err(source) => {
                tracing::warn!(
                    %user_id,
                    %lesson_id,
                    xp_gain = lesson.xp_reward,
                    error = %source,
                    "lesson completed but xp not applied"
                );
                return Err(ProgressError::XpOutOfSync {
                    lesson_id: lesson_id.clone(),
                    xp_gain: lesson.xp_reward,
                    source,
                });
            }
        };

        let rewarded = ProgressPatch {
            xp_awarded_at: Some(now),
            ..ProgressPatch::default()
        };
        let progress = self.upsert_progress(user_id, lesson_id, rewarded).await?;
        tracing::info!(
            %user_id,
            %lesson_id,
            xp_awarded = lesson.xp_reward,
            total_xp = user.xp,
            "lesson completed"
        );
        Ok(LessonCompletion {
            progress,
            xp_awarded: lesson.xp_reward,
            total_xp: user.xp,
        })
    }

    async fn ensure_lesson(&self, lesson_id: &LessonId) -> Result<Lesson, ProgressError> {
        self.storage
            .lessons
            .get(lesson_id)
            .await?
            .ok_or_else(|| ProgressError::LessonNotFound(lesson_id.clone()))
    }

    async fn upsert_progress(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        patch: ProgressPatch,
    ) -> Result<LessonProgress, ProgressError> {
        let id = ProgressId::for_pair(user_id, lesson_id);
        if self.storage.progress.get(&id).await?.is_some() {
            return Ok(self.storage.progress.update(&id, patch).await?);
        }
        let mut progress = LessonProgress::new(user_id.clone(), lesson_id.clone(), 0, self.clock.now());
        progress.apply_patch(patch);
        self.storage.progress.add(&progress).await?;
        Ok(progress)
    }

    /// Unlock every badge whose rule the user now satisfies. Returns the
    /// newly unlocked badges; held badges are never replaced.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UserNotFound` for an unknown user and
    /// `ProgressError::Storage` on repository failures.
    pub async fn evaluate_badges(&self, user_id: &UserId) -> Result<Vec<Badge>, ProgressError> {
        let user = self.user(user_id).await?;
        let stats = self.badge_stats(&user).await?;
        let unlocked = achievements::newly_unlocked(&user, &stats, self.clock.now());
        if unlocked.is_empty() {
            return Ok(unlocked);
        }
        self.storage
            .users
            .update(user_id, UserPatch::unlock(unlocked.clone()))
            .await?;
        tracing::info!(
            %user_id,
            badges = ?unlocked.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            "badges unlocked"
        );
        Ok(unlocked)
    }

    /// # Errors
    ///
    /// Returns `ProgressError::UserNotFound` for an unknown user and
    /// `ProgressError::Storage` on repository failures.
    pub async fn badge_progress(&self, user_id: &UserId) -> Result<Vec<BadgeProgress>, ProgressError> {
        let user = self.user(user_id).await?;
        let stats = self.badge_stats(&user).await?;
        Ok(achievements::badge_progress(&user, &stats))
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn average_score(attempts: &[QuizAttempt]) -> Option<QuizScore> {
    if attempts.is_empty() {
        return None;
    }
    let n = attempts.len() as u64;
    let sum: u64 = attempts.iter().map(|a| u64::from(a.score.value())).sum();
    let mean = (sum * 2 + n) / (n * 2);
    Some(QuizScore::new(u8::try_from(mean).unwrap_or(100)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use edu_core::model::AttemptId;
    use edu_core::time::{fixed_clock, fixed_now};

    async fn seeded() -> ProgressService {
        let storage = Storage::in_memory();
        storage::demo::DemoData::new(fixed_now())
            .seed_into(&storage)
            .await
            .unwrap();
        ProgressService::new(fixed_clock(), storage)
    }

    fn attempt(id: &str, quiz: &str, score: u8, minutes_ago: i64) -> QuizAttempt {
        QuizAttempt {
            id: AttemptId::new(id),
            user_id: UserId::new("user2"),
            quiz_id: QuizId::new(quiz),
            score: QuizScore::new(score),
            answers: Default::default(),
            completed_at: fixed_now() - Duration::minutes(minutes_ago),
            time_spent_secs: 60,
        }
    }

    #[tokio::test]
    async fn leaderboard_ranks_students_by_xp() {
        let svc = seeded().await;
        let board = svc.leaderboard(10).await.unwrap();
        let rows: Vec<_> = board.iter().map(|e| (e.rank, e.user_id.as_str(), e.xp)).collect();
        assert_eq!(rows, [(1, "user1", 1250), (2, "user2", 890)]);
        assert_eq!(svc.leaderboard(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lesson_xp_is_awarded_once() {
        let svc = seeded().await;
        let user = UserId::new("user2");
        let lesson = LessonId::new("lesson2");

        let partial = svc.record_lesson_progress(&user, &lesson, 40).await.unwrap();
        assert_eq!(partial.percent, 40);
        assert!(!partial.is_completed());

        let first = svc.complete_lesson(&user, &lesson).await.unwrap();
        assert!(first.xp_awarded > 0);
        assert_eq!(first.total_xp, 890 + first.xp_awarded);
        assert_eq!(first.progress.percent, 100);

        let again = svc.complete_lesson(&user, &lesson).await.unwrap();
        assert_eq!(again.xp_awarded, 0);
        assert_eq!(again.total_xp, first.total_xp);

        let stats = svc.dashboard(&user).await.unwrap();
        assert_eq!(stats.lessons_completed, 1);
    }

    #[tokio::test]
    async fn progress_after_completion_keeps_full_percent() {
        let svc = seeded().await;
        let user = UserId::new("user2");
        let lesson = LessonId::new("lesson2");
        let done = svc.complete_lesson(&user, &lesson).await.unwrap();
        assert!(done.progress.is_rewarded());

        let revisit = svc.record_lesson_progress(&user, &lesson, 30).await.unwrap();
        assert_eq!(revisit.percent, 100);
        assert!(revisit.is_completed());
        assert_eq!(revisit.completed_at, done.progress.completed_at);
    }

    #[tokio::test]
    async fn progress_is_per_user() {
        let svc = seeded().await;
        let lesson = LessonId::new("lesson1");
        svc.complete_lesson(&UserId::new("user1"), &lesson).await.unwrap();

        let other = svc.dashboard(&UserId::new("user2")).await.unwrap();
        assert_eq!(other.lessons_completed, 0);

        let err = svc
            .record_lesson_progress(&UserId::new("user2"), &LessonId::new("nope"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::LessonNotFound(_)));
    }

    #[tokio::test]
    async fn history_is_newest_first_with_best_score() {
        let svc = seeded().await;
        for a in [
            attempt("a1", "quiz1", 50, 30),
            attempt("a2", "quiz1", 100, 20),
            attempt("a3", "quiz1", 0, 10),
            attempt("a4", "quiz2", 100, 5),
        ] {
            svc.storage.attempts.add(&a).await.unwrap();
        }

        let history = svc
            .quiz_history(&UserId::new("user2"), &QuizId::new("quiz1"))
            .await
            .unwrap();
        let ids: Vec<_> = history.attempts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a3", "a2", "a1"]);
        assert_eq!(history.best, Some(QuizScore::PERFECT));

        let stats = svc.dashboard(&UserId::new("user2")).await.unwrap();
        assert_eq!(stats.quizzes_taken, 4);
        assert_eq!(stats.quizzes_passed, 2);
        assert_eq!(stats.average_score, Some(QuizScore::new(63)));
    }

    #[tokio::test]
    async fn badges_unlock_once_when_rules_are_met() {
        let svc = seeded().await;
        let user = UserId::new("user2");

        assert!(svc.evaluate_badges(&user).await.unwrap().is_empty());

        svc.complete_lesson(&user, &LessonId::new("lesson1")).await.unwrap();
        let unlocked = svc.evaluate_badges(&user).await.unwrap();
        let ids: Vec<_> = unlocked.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["first-lesson"]);
        assert!(svc.evaluate_badges(&user).await.unwrap().is_empty());

        let progress = svc.badge_progress(&user).await.unwrap();
        assert!(progress.iter().all(|p| p.unlocked || p.percent < 100));
        let streak = progress.iter().find(|p| p.id.as_str() == "week-streak").unwrap();
        assert_eq!(streak.percent, 42);
    }
}
