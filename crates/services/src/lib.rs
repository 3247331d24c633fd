#![forbid(unsafe_code)]

pub mod app_services;
pub mod attempt_service;
pub mod catalog_service;
pub mod error;
pub mod progress_service;
pub mod sessions;

pub use edu_core::Clock;

pub use app_services::{AppConfig, AppServices, StoreConfig};
pub use attempt_service::{AttemptRecorder, RecordedAttempt};
pub use catalog_service::{CatalogService, DataSource, Loaded};
pub use error::{AppServicesError, AttemptError, ProgressError, SessionError};
pub use progress_service::{
    DashboardStats, LeaderboardEntry, LessonCompletion, ProgressService, QuizHistory,
};
pub use sessions::{
    ActiveQuiz, QuizCompletion, QuizSession, QuizSessionLoop, QuizView, ResultView,
    SessionSnapshot,
};
