use edu_core::Clock;
use edu_core::model::{Lesson, LessonFilter, LessonId, Quiz, QuizId, User, UserId};
use storage::demo::{self, DemoData, SeedCounts};
use storage::repository::{Record, RecordStore, Storage, StorageError};

/// Where a set of records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Store,
    /// The store failed; these are the built-in demo records and nothing
    /// written against them will persist.
    Demo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<T> {
    pub value: T,
    pub source: DataSource,
}

impl<T> Loaded<T> {
    fn store(value: T) -> Self {
        Self {
            value,
            source: DataSource::Store,
        }
    }

    #[must_use]
    pub fn is_demo(&self) -> bool {
        self.source == DataSource::Demo
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loaded<U> {
        Loaded {
            value: f(self.value),
            source: self.source,
        }
    }
}

/// Read access to users, lessons and quizzes.
///
/// Reads never fail: when the store is unusable the demo records are served
/// instead and the failure is logged.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    storage: Storage,
}

impl CatalogService {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage) -> Self {
        Self { clock, storage }
    }

    /// Fill empty collections with the demo records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read or written.
    pub async fn ensure_seeded(&self) -> Result<SeedCounts, StorageError> {
        DemoData::new(self.clock.now()).seed_into(&self.storage).await
    }

    pub async fn load_users(&self) -> Loaded<Vec<User>> {
        let now = self.clock.now();
        load_all(self.storage.users.as_ref(), || demo::users(now)).await
    }

    pub async fn load_lessons(&self) -> Loaded<Vec<Lesson>> {
        load_all(self.storage.lessons.as_ref(), demo::lessons).await
    }

    pub async fn load_quizzes(&self) -> Loaded<Vec<Quiz>> {
        load_all(self.storage.quizzes.as_ref(), demo::quizzes).await
    }

    /// Lessons matching `filter`, in id order.
    pub async fn filter_lessons(&self, filter: &LessonFilter) -> Loaded<Vec<Lesson>> {
        self.load_lessons().await.map(|lessons| {
            lessons
                .into_iter()
                .filter(|lesson| filter.matches(lesson))
                .collect()
        })
    }

    pub async fn quizzes_for_lesson(&self, lesson_id: &LessonId) -> Loaded<Vec<Quiz>> {
        self.load_quizzes()
            .await
            .map(|quizzes| quizzes.into_iter().filter(|q| &q.lesson_id == lesson_id).collect())
    }

    pub async fn user(&self, id: &UserId) -> Loaded<Option<User>> {
        let now = self.clock.now();
        load_one(self.storage.users.as_ref(), id, || demo::users(now)).await
    }

    pub async fn lesson(&self, id: &LessonId) -> Loaded<Option<Lesson>> {
        load_one(self.storage.lessons.as_ref(), id, demo::lessons).await
    }

    pub async fn quiz(&self, id: &QuizId) -> Loaded<Option<Quiz>> {
        load_one(self.storage.quizzes.as_ref(), id, demo::quizzes).await
    }
}

fn demo_records<R: Record>(fallback: impl FnOnce() -> Vec<R>, error: &StorageError) -> Loaded<Vec<R>> {
    tracing::warn!(
        collection = %R::COLLECTION,
        error = %error,
        "storage unavailable, serving demo records"
    );
    let mut records = fallback();
    records.sort_by(|a, b| a.key().cmp(b.key()));
    Loaded {
        value: records,
        source: DataSource::Demo,
    }
}

async fn load_all<R: Record>(
    store: &dyn RecordStore<R>,
    fallback: impl FnOnce() -> Vec<R>,
) -> Loaded<Vec<R>> {
    match store.get_all().await {
        Ok(records) => Loaded::store(records),
        Err(err) => demo_records(fallback, &err),
    }
}

async fn load_one<R: Record>(
    store: &dyn RecordStore<R>,
    id: &R::Id,
    fallback: impl FnOnce() -> Vec<R>,
) -> Loaded<Option<R>> {
    match store.get(id).await {
        Ok(record) => Loaded::store(record),
        Err(err) => demo_records(fallback, &err)
            .map(|records| records.into_iter().find(|r| r.key() == id.as_ref())),
    }
}
