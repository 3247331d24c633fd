//! Badge rules: what each badge requires and how close a user is to it.

use chrono::{DateTime, Utc};

use crate::model::{Badge, BadgeId, User};

/// Counters the badge rules are evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BadgeStats {
    pub lessons_completed: u32,
    pub streak: u32,
    pub perfect_quizzes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    LessonsCompleted(u32),
    StreakDays(u32),
    PerfectQuizzes(u32),
}

impl Requirement {
    fn current(self, stats: &BadgeStats) -> (u32, u32) {
        match self {
            Requirement::LessonsCompleted(n) => (stats.lessons_completed, n),
            Requirement::StreakDays(n) => (stats.streak, n),
            Requirement::PerfectQuizzes(n) => (stats.perfect_quizzes, n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeRule {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub requirement: Requirement,
}

pub const BADGE_RULES: [BadgeRule; 3] = [
    BadgeRule {
        id: "first-lesson",
        name: "First Steps",
        description: "Complete your first lesson",
        icon: "🌟",
        requirement: Requirement::LessonsCompleted(1),
    },
    BadgeRule {
        id: "week-streak",
        name: "Week Warrior",
        description: "Maintain a 7-day streak",
        icon: "🔥",
        requirement: Requirement::StreakDays(7),
    },
    BadgeRule {
        id: "quiz-master",
        name: "Quiz Master",
        description: "Score 100% on 5 quizzes",
        icon: "🎯",
        requirement: Requirement::PerfectQuizzes(5),
    },
];

impl BadgeRule {
    #[must_use]
    pub fn badge_id(&self) -> BadgeId {
        BadgeId::new(self.id)
    }

    /// Progress towards the requirement, capped at 100.
    #[must_use]
    pub fn progress_percent(&self, stats: &BadgeStats) -> u8 {
        let (have, need) = self.requirement.current(stats);
        if need == 0 || have >= need {
            return 100;
        }
        let pct = u64::from(have) * 100 / u64::from(need);
        u8::try_from(pct).unwrap_or(100)
    }

    #[must_use]
    pub fn is_satisfied(&self, stats: &BadgeStats) -> bool {
        let (have, need) = self.requirement.current(stats);
        have >= need
    }

    #[must_use]
    pub fn unlock(&self, at: DateTime<Utc>) -> Badge {
        Badge {
            id: self.badge_id(),
            name: self.name.to_owned(),
            description: self.description.to_owned(),
            icon: self.icon.to_owned(),
            unlocked_at: at,
        }
    }
}

/// Per-rule status for a rewards screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeProgress {
    pub id: BadgeId,
    pub name: &'static str,
    pub unlocked: bool,
    pub percent: u8,
}

#[must_use]
pub fn badge_progress(user: &User, stats: &BadgeStats) -> Vec<BadgeProgress> {
    BADGE_RULES
        .iter()
        .map(|rule| {
            let id = rule.badge_id();
            let unlocked = user.has_badge(&id);
            BadgeProgress {
                percent: if unlocked { 100 } else { rule.progress_percent(stats) },
                unlocked,
                name: rule.name,
                id,
            }
        })
        .collect()
}

/// Badges whose rule is now satisfied but which the user does not hold yet.
#[must_use]
pub fn newly_unlocked(user: &User, stats: &BadgeStats, at: DateTime<Utc>) -> Vec<Badge> {
    BADGE_RULES
        .iter()
        .filter(|rule| rule.is_satisfied(stats) && !user.has_badge(&rule.badge_id()))
        .map(|rule| rule.unlock(at))
        .collect()
}
