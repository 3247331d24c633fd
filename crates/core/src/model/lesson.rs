use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{LessonId, ProgressId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Math,
    Science,
    Physics,
    Chemistry,
}

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Math,
        Subject::Science,
        Subject::Physics,
        Subject::Chemistry,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Science => "science",
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
        }
    }

    /// Parses the lowercase name used in records and on the command line.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

/// A unit of study content.
///
/// `completed` is a single flag shared by every user and only reflects seed
/// data; per-user completion lives in [`LessonProgress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    pub description: String,
    pub subject: Subject,
    pub grade: u8,
    pub content: String,
    pub duration_minutes: u32,
    pub xp_reward: u32,
    #[serde(default)]
    pub completed: bool,
}

impl Lesson {
    pub fn apply_patch(&mut self, patch: LessonPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub completed: Option<bool>,
}

/// Subject and free-text filter over the lesson catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonFilter {
    pub subject: Option<Subject>,
    pub query: String,
}

impl LessonFilter {
    #[must_use]
    pub fn matches(&self, lesson: &Lesson) -> bool {
        if self.subject.is_some_and(|s| s != lesson.subject) {
            return false;
        }
        let query = self.query.trim().to_lowercase();
        query.is_empty()
            || lesson.title.to_lowercase().contains(&query)
            || lesson.description.to_lowercase().contains(&query)
    }

    #[must_use]
    pub fn apply<'a>(&self, lessons: &'a [Lesson]) -> Vec<&'a Lesson> {
        lessons.iter().filter(|l| self.matches(l)).collect()
    }
}

//
// ─── PER-USER PROGRESS ─────────────────────────────────────────────────────────
//

/// How far one user has come through one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub id: ProgressId,
    pub user_id: UserId,
    pub lesson_id: LessonId,
    /// 0..=100.
    pub percent: u8,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once the lesson's experience reward reached the user record.
    #[serde(default)]
    pub xp_awarded_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    #[must_use]
    pub fn new(user_id: UserId, lesson_id: LessonId, percent: u8, at: DateTime<Utc>) -> Self {
        Self {
            id: ProgressId::for_pair(&user_id, &lesson_id),
            user_id,
            lesson_id,
            percent: percent.min(100),
            last_accessed: at,
            completed_at: None,
            xp_awarded_at: None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    #[must_use]
    pub fn is_rewarded(&self) -> bool {
        self.xp_awarded_at.is_some()
    }

    pub fn apply_patch(&mut self, patch: ProgressPatch) {
        if let Some(percent) = patch.percent {
            self.percent = percent.min(100);
        }
        if let Some(at) = patch.last_accessed {
            self.last_accessed = at;
        }
        // Completion and reward are sticky: the first timestamp wins.
        if self.completed_at.is_none() {
            self.completed_at = patch.completed_at;
        }
        if self.xp_awarded_at.is_none() {
            self.xp_awarded_at = patch.xp_awarded_at;
        }
        if self.is_completed() {
            self.percent = 100;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressPatch {
    pub percent: Option<u8>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub xp_awarded_at: Option<DateTime<Utc>>,
}
