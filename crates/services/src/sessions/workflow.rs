use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use edu_core::Clock;
use edu_core::model::{QuestionId, Quiz, QuizAttempt, QuizId, QuizScore, UserId};
use storage::repository::RecordStore;

use super::service::{QuizSession, Tick};
use super::snapshot::SessionSnapshot;
use super::timer::SessionTimer;
use super::view::{QuizView, ResultView};
use crate::attempt_service::{AttemptRecorder, RecordedAttempt};
use crate::error::{AttemptError, SessionError};

/// Countdown resolution: one tick is one second of quiz time.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

type ActiveKey = (UserId, QuizId);
type Registry = Arc<Mutex<HashSet<ActiveKey>>>;
type CompletionTx = Arc<watch::Sender<Option<QuizCompletion>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//
// ─── COMPLETION ────────────────────────────────────────────────────────────────
//

/// How a submitted session ended up in storage.
#[derive(Debug, Clone)]
pub enum QuizCompletion {
    Recorded(RecordedAttempt),
    /// The quiz was scored but recording failed. The error says whether the
    /// attempt itself made it into the store.
    Failed {
        score: QuizScore,
        error: Arc<AttemptError>,
    },
}

impl QuizCompletion {
    #[must_use]
    pub fn score(&self) -> QuizScore {
        match self {
            QuizCompletion::Recorded(recorded) => recorded.attempt.score,
            QuizCompletion::Failed { score, .. } => *score,
        }
    }

    #[must_use]
    pub fn recorded(&self) -> Option<&RecordedAttempt> {
        match self {
            QuizCompletion::Recorded(recorded) => Some(recorded),
            QuizCompletion::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn result_view(&self) -> ResultView {
        ResultView::new(self.score())
    }
}

fn spawn_recording(recorder: AttemptRecorder, attempt: QuizAttempt, completion: CompletionTx) {
    tokio::spawn(async move {
        let outcome = match recorder.record(&attempt).await {
            Ok(recorded) => QuizCompletion::Recorded(recorded),
            Err(error) => QuizCompletion::Failed {
                score: attempt.score,
                error: Arc::new(error),
            },
        };
        completion.send_replace(Some(outcome));
    });
}

//
// ─── LOOP ──────────────────────────────────────────────────────────────────────
//

/// Starts quiz sessions and wires them to the countdown and the recorder.
#[derive(Clone)]
pub struct QuizSessionLoop {
    clock: Clock,
    quizzes: Arc<dyn RecordStore<Quiz>>,
    recorder: AttemptRecorder,
    active: Registry,
    tick_period: Duration,
}

impl QuizSessionLoop {
    #[must_use]
    pub fn new(clock: Clock, quizzes: Arc<dyn RecordStore<Quiz>>, recorder: AttemptRecorder) -> Self {
        Self {
            clock,
            quizzes,
            recorder,
            active: Arc::default(),
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }

    #[must_use]
    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self
    }

    #[must_use]
    pub fn recorder(&self) -> &AttemptRecorder {
        &self.recorder
    }

    #[must_use]
    pub fn is_active(&self, user_id: &UserId, quiz_id: &QuizId) -> bool {
        lock(&self.active).contains(&(user_id.clone(), quiz_id.clone()))
    }

    /// Load a quiz from storage and start a session on it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::QuizNotFound` for an unknown quiz,
    /// `SessionError::Storage` when the lookup fails, and the errors of
    /// [`QuizSessionLoop::start_with_quiz`].
    pub async fn start(&self, user_id: &UserId, quiz_id: &QuizId) -> Result<ActiveQuiz, SessionError> {
        let quiz = self
            .quizzes
            .get(quiz_id)
            .await?
            .ok_or_else(|| SessionError::QuizNotFound(quiz_id.clone()))?;
        self.start_with_quiz(user_id.clone(), Arc::new(quiz))
    }

    /// Start a session on an already loaded quiz, e.g. one served from the
    /// demo fallback. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidQuiz` for a quiz that cannot be taken and
    /// `SessionError::AlreadyActive` if this user already has it open.
    pub fn start_with_quiz(&self, user_id: UserId, quiz: Arc<Quiz>) -> Result<ActiveQuiz, SessionError> {
        let quiz_id = quiz.id.clone();
        let session = QuizSession::new(quiz, user_id.clone(), self.clock.now())?;
        let slot = ActiveSlot::claim(&self.active, user_id.clone(), quiz_id.clone())?;

        let session = Arc::new(Mutex::new(session));
        let (completion, _) = watch::channel(None);
        let completion: CompletionTx = Arc::new(completion);

        let timer = {
            let session = Arc::clone(&session);
            let completion = Arc::clone(&completion);
            let recorder = self.recorder.clone();
            let clock = self.clock;
            SessionTimer::spawn(self.tick_period, move || {
                let mut session = lock(&session);
                match session.tick(clock.now()) {
                    Ok(Tick::Running { .. }) => ControlFlow::Continue(()),
                    Ok(Tick::TimedOut(score)) => {
                        tracing::info!(
                            user_id = %session.user_id(),
                            quiz_id = %session.quiz_id(),
                            score = score.value(),
                            "quiz timed out"
                        );
                        if let Some(attempt) = session.to_attempt() {
                            spawn_recording(recorder.clone(), attempt, Arc::clone(&completion));
                        }
                        ControlFlow::Break(())
                    }
                    Err(_) => ControlFlow::Break(()),
                }
            })
        };

        tracing::info!(%user_id, %quiz_id, "quiz session started");
        Ok(ActiveQuiz {
            session,
            clock: self.clock,
            recorder: self.recorder.clone(),
            completion,
            timer,
            _slot: slot,
        })
    }
}

struct ActiveSlot {
    registry: Registry,
    key: ActiveKey,
}

impl ActiveSlot {
    fn claim(registry: &Registry, user_id: UserId, quiz_id: QuizId) -> Result<Self, SessionError> {
        let key = (user_id, quiz_id);
        if !lock(registry).insert(key.clone()) {
            let (user_id, quiz_id) = key;
            return Err(SessionError::AlreadyActive { user_id, quiz_id });
        }
        Ok(Self {
            registry: Arc::clone(registry),
            key,
        })
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.key);
    }
}

//
// ─── HANDLE ────────────────────────────────────────────────────────────────────
//

/// A running quiz. Dropping it stops the countdown and frees the user's slot
/// for this quiz; an unsubmitted session is discarded without a trace.
pub struct ActiveQuiz {
    session: Arc<Mutex<QuizSession>>,
    clock: Clock,
    recorder: AttemptRecorder,
    completion: CompletionTx,
    timer: SessionTimer,
    _slot: ActiveSlot,
}

impl ActiveQuiz {
    /// # Errors
    ///
    /// See [`QuizSession::answer`].
    pub fn answer(&self, question_id: &QuestionId, value: impl Into<String>) -> Result<(), SessionError> {
        lock(&self.session).answer(question_id, value)
    }

    /// # Errors
    ///
    /// See [`QuizSession::next`].
    pub fn next(&self) -> Result<bool, SessionError> {
        lock(&self.session).next()
    }

    /// # Errors
    ///
    /// See [`QuizSession::previous`].
    pub fn previous(&self) -> Result<bool, SessionError> {
        lock(&self.session).previous()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.session).snapshot()
    }

    #[must_use]
    pub fn view(&self) -> QuizView {
        QuizView::from_session(&lock(&self.session))
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        lock(&self.session).is_submitted()
    }

    /// Submit now, stop the countdown, and wait for the attempt to be
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` if the session was already submitted,
    /// including by timeout; use [`ActiveQuiz::wait_for_completion`] then.
    pub async fn submit(&self) -> Result<QuizCompletion, SessionError> {
        let attempt = {
            let mut session = lock(&self.session);
            session.submit(self.clock.now())?;
            session.to_attempt().ok_or(SessionError::Completed)?
        };
        self.timer.cancel();
        spawn_recording(self.recorder.clone(), attempt, Arc::clone(&self.completion));
        self.wait_for_completion().await.ok_or(SessionError::Completed)
    }

    /// The completion, if recording has finished.
    #[must_use]
    pub fn completion(&self) -> Option<QuizCompletion> {
        self.completion.borrow().clone()
    }

    /// Wait until the session is submitted (by the user or the countdown) and
    /// recorded. Never resolves for a session nobody submits before its
    /// countdown is cancelled.
    pub async fn wait_for_completion(&self) -> Option<QuizCompletion> {
        let mut rx = self.completion.subscribe();
        rx.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|completion| (*completion).clone())
    }

    /// Discard the session.
    pub fn close(self) {
        tracing::debug!(submitted = self.is_submitted(), "quiz session closed");
    }
}
