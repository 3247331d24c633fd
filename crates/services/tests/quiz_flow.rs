use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use edu_core::model::{
    Lesson, LessonId, LessonProgress, QuestionId, Quiz, QuizAttempt, QuizId, User, UserId,
};
use edu_core::time::{fixed_clock, fixed_now};
use services::{
    AttemptError, AttemptRecorder, CatalogService, DataSource, ProgressError, ProgressService,
    QuizCompletion, QuizSessionLoop, SessionError,
};
use storage::demo;
use storage::repository::{InMemoryStore, Record, RecordStore, Storage, StorageError};

/// In-memory store whose operations can be made to fail on demand.
struct FlakyStore<R: Record> {
    inner: InMemoryStore<R>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<R: Record> FlakyStore<R> {
    fn new(inner: InMemoryStore<R>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn broken() -> Self {
        let store = Self::new(InMemoryStore::new());
        store.fail_reads.store(true, Ordering::SeqCst);
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for FlakyStore<R> {
    async fn get_all(&self) -> Result<Vec<R>, StorageError> {
        self.check(&self.fail_reads)?;
        self.inner.get_all().await
    }

    async fn bulk_insert(&self, records: &[R]) -> Result<(), StorageError> {
        self.check(&self.fail_writes)?;
        self.inner.bulk_insert(records).await
    }

    async fn get(&self, id: &R::Id) -> Result<Option<R>, StorageError> {
        self.check(&self.fail_reads)?;
        self.inner.get(id).await
    }

    async fn update(&self, id: &R::Id, patch: R::Patch) -> Result<R, StorageError> {
        self.check(&self.fail_writes)?;
        self.inner.update(id, patch).await
    }

    async fn add(&self, record: &R) -> Result<(), StorageError> {
        self.check(&self.fail_writes)?;
        self.inner.add(record).await
    }
}

struct Fixture {
    users: Arc<FlakyStore<User>>,
    attempts: Arc<FlakyStore<QuizAttempt>>,
    session_loop: QuizSessionLoop,
}

impl Fixture {
    fn new() -> Self {
        let users = Arc::new(FlakyStore::new(InMemoryStore::with_records(demo::users(
            fixed_now(),
        ))));
        let attempts = Arc::new(FlakyStore::new(InMemoryStore::new()));
        let quizzes: Arc<dyn RecordStore<Quiz>> =
            Arc::new(InMemoryStore::with_records(demo::quizzes()));
        let recorder = AttemptRecorder::new(
            fixed_clock(),
            Arc::clone(&users) as Arc<dyn RecordStore<User>>,
            Arc::clone(&attempts) as Arc<dyn RecordStore<QuizAttempt>>,
        );
        Self {
            session_loop: QuizSessionLoop::new(fixed_clock(), quizzes, recorder),
            users,
            attempts,
        }
    }

    async fn xp(&self, id: &str) -> u32 {
        self.users.inner.get(&UserId::new(id)).await.unwrap().unwrap().xp
    }

    async fn stored_attempts(&self) -> Vec<QuizAttempt> {
        self.attempts.inner.get_all().await.unwrap()
    }
}

fn q(id: &str) -> QuestionId {
    QuestionId::new(id)
}

#[tokio::test(start_paused = true)]
async fn perfect_submission_records_attempt_and_awards_xp() {
    let fx = Fixture::new();
    let user = UserId::new("user1");
    let active = fx.session_loop.start(&user, &QuizId::new("quiz1")).await.unwrap();

    active.answer(&q("q1"), "3").unwrap();
    assert!(active.view().can_go_next());
    active.next().unwrap();
    active.answer(&q("q2"), "5x").unwrap();
    assert!(active.view().can_submit());

    let completion = active.submit().await.unwrap();
    let recorded = completion.recorded().unwrap();
    assert_eq!(recorded.attempt.score.value(), 100);
    assert_eq!(recorded.xp_gain, 200);
    assert_eq!(recorded.total_xp, 1450);
    assert_eq!(recorded.level, 15);
    assert_eq!(completion.result_view().headline(), "Great Job!");

    let stored = fx.stored_attempts().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].user_id, user);
    assert_eq!(stored[0].answers.len(), 2);
    assert_eq!(stored[0].answers[&q("q2")], "5x");
    assert_eq!(fx.xp("user1").await, 1450);
}

#[tokio::test(start_paused = true)]
async fn timeout_submits_whatever_was_answered() {
    let fx = Fixture::new();
    let active = fx
        .session_loop
        .start(&UserId::new("user1"), &QuizId::new("quiz1"))
        .await
        .unwrap();
    active.answer(&q("q1"), "2").unwrap();

    let completion = active.wait_for_completion().await.unwrap();
    assert_eq!(completion.score().value(), 0);
    assert_eq!(completion.result_view().headline(), "Keep Trying!");
    assert!(active.is_submitted());
    assert!(matches!(active.submit().await, Err(SessionError::Completed)));

    let stored = fx.stored_attempts().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].answers.len(), 1);
    assert_eq!(stored[0].answers[&q("q1")], "2");
    assert_eq!(stored[0].time_spent_secs, 600);
    assert_eq!(fx.xp("user1").await, 1250);
}

#[tokio::test(start_paused = true)]
async fn closing_before_submit_persists_nothing() {
    let fx = Fixture::new();
    let user = UserId::new("user1");
    let quiz = QuizId::new("quiz2");
    let active = fx.session_loop.start(&user, &quiz).await.unwrap();
    active.answer(&q("q3"), "Solid").unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    drop(active);
    assert!(!fx.session_loop.is_active(&user, &quiz));

    // Well past the 8 minute limit: a leaked timer would have submitted.
    tokio::time::sleep(Duration::from_secs(900)).await;
    assert!(fx.stored_attempts().await.is_empty());
    assert_eq!(fx.xp("user1").await, 1250);
}

#[tokio::test(start_paused = true)]
async fn second_session_for_same_quiz_is_rejected() {
    let fx = Fixture::new();
    let user = UserId::new("user1");
    let quiz = QuizId::new("quiz1");

    let active = fx.session_loop.start(&user, &quiz).await.unwrap();
    let err = fx.session_loop.start(&user, &quiz).await.err().unwrap();
    assert!(matches!(err, SessionError::AlreadyActive { .. }));

    active.close();
    let reopened = fx.session_loop.start(&user, &quiz).await.unwrap();
    assert_eq!(reopened.snapshot().time_remaining_secs, 600);
}

#[tokio::test(start_paused = true)]
async fn failed_attempt_write_awards_no_xp() {
    let fx = Fixture::new();
    fx.attempts.fail_writes.store(true, Ordering::SeqCst);

    let active = fx
        .session_loop
        .start(&UserId::new("user1"), &QuizId::new("quiz2"))
        .await
        .unwrap();
    active.answer(&q("q3"), "Solid").unwrap();

    let completion = active.submit().await.unwrap();
    let QuizCompletion::Failed { score, error } = completion else {
        panic!("expected failed completion");
    };
    assert_eq!(score.value(), 100);
    assert!(matches!(*error, AttemptError::NotSaved(StorageError::Unavailable(_))));
    assert!(!error.attempt_saved());

    assert!(fx.stored_attempts().await.is_empty());
    assert_eq!(fx.xp("user1").await, 1250);
}

#[tokio::test(start_paused = true)]
async fn failed_xp_update_can_be_retried() {
    let fx = Fixture::new();
    fx.users.fail_writes.store(true, Ordering::SeqCst);

    let active = fx
        .session_loop
        .start(&UserId::new("user1"), &QuizId::new("quiz2"))
        .await
        .unwrap();
    active.answer(&q("q3"), "Solid").unwrap();

    let completion = active.submit().await.unwrap();
    let QuizCompletion::Failed { error, .. } = completion else {
        panic!("expected failed completion");
    };
    assert!(matches!(*error, AttemptError::XpOutOfSync { xp_gain: 200, .. }));
    assert!(error.attempt_saved());
    assert_eq!(fx.xp("user1").await, 1250);

    let stored = fx.stored_attempts().await;
    assert_eq!(stored.len(), 1);

    fx.users.fail_writes.store(false, Ordering::SeqCst);
    let recorder = fx.session_loop.recorder();
    let recorded = recorder.retry_xp_award(&stored[0]).await.unwrap();
    assert_eq!(recorded.total_xp, 1450);
    assert_eq!(fx.xp("user1").await, 1450);

    let err = recorder.record(&stored[0]).await.unwrap_err();
    assert!(matches!(err, AttemptError::AlreadyRecorded(_)));
}

#[tokio::test]
async fn failed_lesson_xp_award_is_repaired_on_retry() {
    let users = Arc::new(FlakyStore::<User>::new(InMemoryStore::new()));
    let storage = Storage {
        users: Arc::clone(&users) as Arc<dyn RecordStore<User>>,
        ..Storage::in_memory()
    };
    demo::DemoData::new(fixed_now()).seed_into(&storage).await.unwrap();
    let progress = ProgressService::new(fixed_clock(), storage);
    let user = UserId::new("user2");
    let lesson = LessonId::new("lesson2");

    users.fail_writes.store(true, Ordering::SeqCst);
    let err = progress.complete_lesson(&user, &lesson).await.unwrap_err();
    assert!(matches!(err, ProgressError::XpOutOfSync { xp_gain: 80, .. }));
    assert_eq!(users.inner.get(&user).await.unwrap().unwrap().xp, 890);

    users.fail_writes.store(false, Ordering::SeqCst);
    let repaired = progress.complete_lesson(&user, &lesson).await.unwrap();
    assert_eq!(repaired.xp_awarded, 80);
    assert_eq!(repaired.total_xp, 970);
    assert!(repaired.progress.is_rewarded());

    let again = progress.complete_lesson(&user, &lesson).await.unwrap();
    assert_eq!(again.xp_awarded, 0);
    assert_eq!(users.inner.get(&user).await.unwrap().unwrap().xp, 970);
}

#[tokio::test]
async fn unavailable_store_serves_demo_records() {
    let storage = Storage {
        users: Arc::new(FlakyStore::<User>::broken()),
        lessons: Arc::new(FlakyStore::<Lesson>::broken()),
        quizzes: Arc::new(FlakyStore::<Quiz>::broken()),
        attempts: Arc::new(FlakyStore::<QuizAttempt>::broken()),
        progress: Arc::new(FlakyStore::<LessonProgress>::broken()),
    };
    let catalog = CatalogService::new(fixed_clock(), storage);

    assert!(catalog.ensure_seeded().await.is_err());

    let users = catalog.load_users().await;
    assert_eq!(users.source, DataSource::Demo);
    assert_eq!(users.value.len(), 3);

    let quiz = catalog.quiz(&QuizId::new("quiz1")).await;
    assert!(quiz.is_demo());
    assert_eq!(quiz.value.unwrap().questions.len(), 2);

    let lessons = catalog.load_lessons().await;
    assert_eq!(lessons.value.len(), 3);
}
