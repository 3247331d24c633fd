//! Fixed demo records used to seed an empty store and as the read-only
//! fallback when the store cannot be used.

use chrono::{DateTime, TimeZone, Utc};
use crate::repository::{Record, RecordStore, Storage, StorageError};
use edu_core::model::{
    Badge, BadgeId, CorrectAnswer, Difficulty, Lesson, LessonId, Question, QuestionId,
    QuestionKind, Quiz, QuizId, Role, Subject, User, UserId,
};

const DEMO_AVATAR: &str = "https://images.pexels.com/photos/1674752/pexels-photo-1674752.jpeg?auto=compress&cs=tinysrgb&w=100&h=100&fit=crop";

/// The full seed set. `now` stamps the users' last-active time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoData {
    pub users: Vec<User>,
    pub lessons: Vec<Lesson>,
    pub quizzes: Vec<Quiz>,
}

impl DemoData {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            users: users(now),
            lessons: lessons(),
            quizzes: quizzes(),
        }
    }

    /// Seed every empty collection of `storage`; non-empty collections are
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a collection cannot be read or written.
    pub async fn seed_into(&self, storage: &Storage) -> Result<SeedCounts, StorageError> {
        Ok(SeedCounts {
            users: seed_if_empty(storage.users.as_ref(), &self.users).await?,
            lessons: seed_if_empty(storage.lessons.as_ref(), &self.lessons).await?,
            quizzes: seed_if_empty(storage.quizzes.as_ref(), &self.quizzes).await?,
        })
    }
}

/// Records written per collection by [`DemoData::seed_into`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub users: usize,
    pub lessons: usize,
    pub quizzes: usize,
}

impl SeedCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.users + self.lessons + self.quizzes
    }
}

/// Inserts `records` only when the collection is empty. Returns how many
/// records were written.
///
/// # Errors
///
/// Returns `StorageError` if the collection cannot be read or the insert fails.
pub async fn seed_if_empty<R: Record>(
    store: &dyn RecordStore<R>,
    records: &[R],
) -> Result<usize, StorageError> {
    if !store.get_all().await?.is_empty() {
        tracing::debug!(collection = %R::COLLECTION, "already seeded, skipping");
        return Ok(0);
    }
    store.bulk_insert(records).await?;
    tracing::info!(collection = %R::COLLECTION, count = records.len(), "seeded demo records");
    Ok(records.len())
}

fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn badge(id: &str, name: &str, description: &str, icon: &str, at: DateTime<Utc>) -> Badge {
    Badge {
        id: BadgeId::new(id),
        name: name.to_owned(),
        description: description.to_owned(),
        icon: icon.to_owned(),
        unlocked_at: at,
    }
}

#[must_use]
pub fn users(now: DateTime<Utc>) -> Vec<User> {
    let mut rahul = User::new(UserId::new("user1"), "Rahul Kumar", "rahul@demo.com", Role::Student, now)
        .with_grade(8)
        .with_xp(1250)
        .with_streak(7)
        .with_avatar(DEMO_AVATAR);
    let mut priya = User::new(UserId::new("user2"), "Priya Sharma", "priya@demo.com", Role::Student, now)
        .with_grade(10)
        .with_xp(890)
        .with_streak(3)
        .with_avatar(DEMO_AVATAR);
    let teacher = User::new(UserId::new("teacher1"), "Dr. Anil Verma", "anil@demo.com", Role::Teacher, now)
        .with_avatar(DEMO_AVATAR);

    // Fresh users never hold a badge yet, so these cannot collide.
    let _ = rahul.unlock_badge(badge(
        "first-lesson",
        "First Steps",
        "Complete your first lesson",
        "🌟",
        day(2024, 1, 15),
    ));
    let _ = rahul.unlock_badge(badge(
        "week-streak",
        "Week Warrior",
        "Maintain a 7-day streak",
        "🔥",
        day(2024, 1, 20),
    ));
    let _ = priya.unlock_badge(badge(
        "quiz-master",
        "Quiz Master",
        "Score 100% on 5 quizzes",
        "🎯",
        day(2024, 1, 18),
    ));

    vec![rahul, priya, teacher]
}

#[must_use]
pub fn lessons() -> Vec<Lesson> {
    vec![
        Lesson {
            id: LessonId::new("lesson1"),
            title: "Introduction to Algebra".into(),
            description: "Learn the basics of algebraic expressions and equations".into(),
            subject: Subject::Math,
            grade: 8,
            content: "In this lesson, we will explore the fundamentals of algebra...".into(),
            duration_minutes: 30,
            xp_reward: 100,
            completed: true,
        },
        Lesson {
            id: LessonId::new("lesson2"),
            title: "States of Matter".into(),
            description: "Understand the different states of matter and their properties".into(),
            subject: Subject::Science,
            grade: 8,
            content: "Matter exists in different states: solid, liquid, gas...".into(),
            duration_minutes: 25,
            xp_reward: 80,
            completed: false,
        },
        Lesson {
            id: LessonId::new("lesson3"),
            title: "Newton's Laws of Motion".into(),
            description: "Discover the fundamental laws that govern motion".into(),
            subject: Subject::Physics,
            grade: 10,
            content: "Newton's three laws of motion explain how objects move...".into(),
            duration_minutes: 40,
            xp_reward: 120,
            completed: false,
        },
    ]
}

fn multiple_choice(id: &str, prompt: &str, options: &[&str], answer: &str, explanation: &str) -> Question {
    Question {
        id: QuestionId::new(id),
        kind: QuestionKind::MultipleChoice,
        prompt: prompt.to_owned(),
        options: Some(options.iter().map(|o| (*o).to_owned()).collect()),
        correct_answer: CorrectAnswer::Single(answer.to_owned()),
        explanation: explanation.to_owned(),
        difficulty: Difficulty::Easy,
    }
}

#[must_use]
pub fn quizzes() -> Vec<Quiz> {
    vec![
        Quiz {
            id: QuizId::new("quiz1"),
            lesson_id: LessonId::new("lesson1"),
            title: "Algebra Basics Quiz".into(),
            time_limit_minutes: 10,
            questions: vec![
                multiple_choice(
                    "q1",
                    "What is the value of x in the equation: 2x + 5 = 11?",
                    &["2", "3", "4", "5"],
                    "3",
                    "2x + 5 = 11, so 2x = 6, therefore x = 3",
                ),
                multiple_choice(
                    "q2",
                    "Simplify: 3x + 2x",
                    &["5x", "6x", "5x²", "6"],
                    "5x",
                    "Like terms can be added: 3x + 2x = 5x",
                ),
            ],
        },
        Quiz {
            id: QuizId::new("quiz2"),
            lesson_id: LessonId::new("lesson2"),
            title: "States of Matter Quiz".into(),
            time_limit_minutes: 8,
            questions: vec![multiple_choice(
                "q3",
                "Which state of matter has a definite shape and volume?",
                &["Solid", "Liquid", "Gas", "Plasma"],
                "Solid",
                "Solids have both definite shape and volume due to strong intermolecular forces",
            )],
        },
    ]
}
