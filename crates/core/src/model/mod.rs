mod attempt;
mod ids;
mod lesson;
mod quiz;
mod user;

pub use ids::{
    AttemptId, BadgeId, GENERATED_ID_LEN, LessonId, ParseIdError, ProgressId, QuestionId, QuizId,
    UserId, generate_id,
};

pub use attempt::{QuizAttempt, best_score};
pub use lesson::{Lesson, LessonFilter, LessonPatch, LessonProgress, ProgressPatch, Subject};
pub use quiz::{
    AnswerMap, CorrectAnswer, Difficulty, PASS_THRESHOLD, Question, QuestionKind, Quiz, QuizError,
    QuizOutcome, QuizScore,
};
pub use user::{Badge, Role, User, UserError, UserPatch};
