mod service;
mod snapshot;
mod timer;
mod view;
mod workflow;

// Public API of the quiz session subsystem.
pub use crate::error::SessionError;
pub use service::{QuizSession, SessionState, Submission, Tick};
pub use snapshot::SessionSnapshot;
pub use view::{QuestionMarker, QuizView, ResultView, format_countdown};
pub use workflow::{ActiveQuiz, DEFAULT_TICK_PERIOD, QuizCompletion, QuizSessionLoop};
