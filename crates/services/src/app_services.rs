use std::env;
use std::sync::Arc;

use edu_core::model::UserId;
use storage::repository::Storage;

use crate::Clock;
use crate::attempt_service::AttemptRecorder;
use crate::catalog_service::{CatalogService, DataSource};
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::sessions::QuizSessionLoop;

pub const DEFAULT_DB_URL: &str = "sqlite://eduspark.sqlite3";
/// `EDU_DB_URL` value that selects the in-memory store.
pub const MEMORY_DB: &str = "memory";
pub const DEFAULT_USER_ID: &str = "user1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Sqlite(String),
}

impl StoreConfig {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(MEMORY_DB) {
            Self::Memory
        } else {
            Self::Sqlite(raw.to_owned())
        }
    }
}

/// Where to store records and which user is signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub user_id: UserId,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::Sqlite(DEFAULT_DB_URL.into()),
            user_id: UserId::new(DEFAULT_USER_ID),
        }
    }
}

impl AppConfig {
    /// Read `EDU_DB_URL` and `EDU_USER_ID`, falling back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("EDU_DB_URL").filter(|v| !v.trim().is_empty()) {
            config.store = StoreConfig::parse(&url);
        }
        if let Some(user) = lookup("EDU_USER_ID").and_then(|v| v.parse().ok()) {
            config.user_id = user;
        }
        config
    }

    #[must_use]
    pub fn with_db_url(mut self, raw: &str) -> Self {
        self.store = StoreConfig::parse(raw);
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Assembles the app-facing services over one `Storage`.
#[derive(Clone)]
pub struct AppServices {
    user_id: UserId,
    source: DataSource,
    catalog: Arc<CatalogService>,
    progress: Arc<ProgressService>,
    session_loop: Arc<QuizSessionLoop>,
}

impl AppServices {
    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock, user_id: UserId, source: DataSource) -> Self {
        let recorder = AttemptRecorder::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.attempts),
        );
        let session_loop = Arc::new(QuizSessionLoop::new(
            clock,
            Arc::clone(&storage.quizzes),
            recorder,
        ));
        Self {
            user_id,
            source,
            catalog: Arc::new(CatalogService::new(clock, storage.clone())),
            progress: Arc::new(ProgressService::new(clock, storage)),
            session_loop,
        }
    }

    /// Services over a seeded in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Storage` if seeding fails.
    pub async fn in_memory(clock: Clock, user_id: UserId) -> Result<Self, AppServicesError> {
        let services = Self::from_storage(Storage::in_memory(), clock, user_id, DataSource::Store);
        services.catalog.ensure_seeded().await?;
        Ok(services)
    }

    /// Services backed by `SQLite`, seeded when empty.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or seeded.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        user_id: UserId,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let services = Self::from_storage(storage, clock, user_id, DataSource::Store);
        services.catalog.ensure_seeded().await?;
        Ok(services)
    }

    /// Open the configured store. A store that cannot be opened or seeded is
    /// replaced by the demo records in memory, so the app stays usable but
    /// nothing persists.
    pub async fn open(config: &AppConfig, clock: Clock) -> Self {
        let opened = match &config.store {
            StoreConfig::Memory => Self::in_memory(clock, config.user_id.clone()).await,
            StoreConfig::Sqlite(url) => Self::new_sqlite(url, clock, config.user_id.clone()).await,
        };
        match opened {
            Ok(services) => services,
            Err(err) => {
                tracing::warn!(error = %err, "store unavailable, running on demo data");
                Self::demo(clock, config.user_id.clone()).await
            }
        }
    }

    async fn demo(clock: Clock, user_id: UserId) -> Self {
        let services = Self::from_storage(Storage::in_memory(), clock, user_id, DataSource::Demo);
        if let Err(err) = services.catalog.ensure_seeded().await {
            // Reads still fall back to the fixtures.
            tracing::warn!(error = %err, "could not load demo records into memory");
        }
        services
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// `DataSource::Demo` when the configured store could not be used.
    #[must_use]
    pub fn source(&self) -> DataSource {
        self.source
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn session_loop(&self) -> Arc<QuizSessionLoop> {
        Arc::clone(&self.session_loop)
    }
}
