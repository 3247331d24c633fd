use async_trait::async_trait;
use edu_core::model::{
    Lesson, LessonId, LessonPatch, LessonProgress, ProgressId, ProgressPatch, Quiz, QuizAttempt,
    QuizId, AttemptId, User, UserId, UserPatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The record collections kept by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Lessons,
    Quizzes,
    Attempts,
    Progress,
}

impl Collection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Lessons => "lessons",
            Collection::Quizzes => "quizzes",
            Collection::Attempts => "attempts",
            Collection::Progress => "progress",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that can live in a [`RecordStore`].
///
/// Records whose patch type is [`Infallible`] are immutable once written.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: AsRef<str> + Clone + fmt::Debug + Send + Sync;
    type Patch: Send + 'static;

    const COLLECTION: Collection;

    fn id(&self) -> &Self::Id;

    fn apply_patch(&mut self, patch: Self::Patch);

    /// Storage key of this record.
    fn key(&self) -> &str {
        self.id().as_ref()
    }
}

impl Record for User {
    type Id = UserId;
    type Patch = UserPatch;
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &UserId {
        &self.id
    }

    fn apply_patch(&mut self, patch: UserPatch) {
        User::apply_patch(self, patch);
    }
}

impl Record for Lesson {
    type Id = LessonId;
    type Patch = LessonPatch;
    const COLLECTION: Collection = Collection::Lessons;

    fn id(&self) -> &LessonId {
        &self.id
    }

    fn apply_patch(&mut self, patch: LessonPatch) {
        Lesson::apply_patch(self, patch);
    }
}

impl Record for LessonProgress {
    type Id = ProgressId;
    type Patch = ProgressPatch;
    const COLLECTION: Collection = Collection::Progress;

    fn id(&self) -> &ProgressId {
        &self.id
    }

    fn apply_patch(&mut self, patch: ProgressPatch) {
        LessonProgress::apply_patch(self, patch);
    }
}

impl Record for Quiz {
    type Id = QuizId;
    type Patch = Infallible;
    const COLLECTION: Collection = Collection::Quizzes;

    fn id(&self) -> &QuizId {
        &self.id
    }

    fn apply_patch(&mut self, patch: Infallible) {
        match patch {}
    }
}

impl Record for QuizAttempt {
    type Id = AttemptId;
    type Patch = Infallible;
    const COLLECTION: Collection = Collection::Attempts;

    fn id(&self) -> &AttemptId {
        &self.id
    }

    fn apply_patch(&mut self, patch: Infallible) {
        match patch {}
    }
}

/// Keyed access to one record collection.
///
/// Every call is persisted before it returns; there are no transactions
/// spanning calls.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// All records ordered by id. Empty when nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_all(&self) -> Result<Vec<R>, StorageError>;

    /// Inserts a batch, all or nothing.
    ///
    /// Duplicates are not skipped: callers seed only after checking that the
    /// collection is empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if any id already exists or repeats
    /// within the batch; nothing is written in that case.
    async fn bulk_insert(&self, records: &[R]) -> Result<(), StorageError>;

    /// Fetch a record by id, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, id: &R::Id) -> Result<Option<R>, StorageError>;

    /// Merge `patch` into an existing record and return the merged record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the id does not exist.
    async fn update(&self, id: &R::Id, patch: R::Patch) -> Result<R, StorageError>;

    /// Insert a single new record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id already exists.
    async fn add(&self, record: &R) -> Result<(), StorageError>;
}

/// In-memory collection for tests, demos and the read-only fallback.
pub struct InMemoryStore<R: Record> {
    rows: Arc<Mutex<BTreeMap<String, R>>>,
}

impl<R: Record> InMemoryStore<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// A store pre-filled with `records`; later duplicates replace earlier ones.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let rows = records
            .into_iter()
            .map(|r| (r.key().to_owned(), r))
            .collect();
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, R>>, StorageError> {
        self.rows
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

impl<R: Record> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Clone for InMemoryStore<R> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for InMemoryStore<R> {
    async fn get_all(&self) -> Result<Vec<R>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.values().cloned().collect())
    }

    async fn bulk_insert(&self, records: &[R]) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let mut batch = BTreeMap::new();
        for record in records {
            let key = record.key();
            if guard.contains_key(key) || batch.insert(key, record).is_some() {
                return Err(StorageError::Conflict);
            }
        }
        for (key, record) in batch {
            guard.insert(key.to_owned(), record.clone());
        }
        Ok(())
    }

    async fn get(&self, id: &R::Id) -> Result<Option<R>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.get(id.as_ref()).cloned())
    }

    async fn update(&self, id: &R::Id, patch: R::Patch) -> Result<R, StorageError> {
        let mut guard = self.lock()?;
        let record = guard.get_mut(id.as_ref()).ok_or(StorageError::NotFound)?;
        record.apply_patch(patch);
        Ok(record.clone())
    }

    async fn add(&self, record: &R) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.contains_key(record.key()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(record.key().to_owned(), record.clone());
        Ok(())
    }
}

/// One handle per collection, behind trait objects so backends can be swapped.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn RecordStore<User>>,
    pub lessons: Arc<dyn RecordStore<Lesson>>,
    pub quizzes: Arc<dyn RecordStore<Quiz>>,
    pub attempts: Arc<dyn RecordStore<QuizAttempt>>,
    pub progress: Arc<dyn RecordStore<LessonProgress>>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryStore::<User>::new()),
            lessons: Arc::new(InMemoryStore::<Lesson>::new()),
            quizzes: Arc::new(InMemoryStore::<Quiz>::new()),
            attempts: Arc::new(InMemoryStore::<QuizAttempt>::new()),
            progress: Arc::new(InMemoryStore::<LessonProgress>::new()),
        }
    }
}
