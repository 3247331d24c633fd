use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{BadgeId, UserId};
use crate::xp;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserError {
    #[error("badge {0} is already unlocked")]
    BadgeAlreadyUnlocked(BadgeId),
}

//
// ─── ROLE ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

//
// ─── BADGE ─────────────────────────────────────────────────────────────────────
//

/// An achievement marker. Owned by one user and never changed once unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: BadgeId,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub unlocked_at: DateTime<Utc>,
}

//
// ─── USER ──────────────────────────────────────────────────────────────────────
//

/// A student or teacher account.
///
/// The level is not a field: it is derived from `xp` on every read so a
/// persisted record can never disagree with its experience total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<u8>,
    pub xp: u32,
    pub streak: u32,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    badges: Vec<Badge>,
    pub avatar: String,
}

impl User {
    #[must_use]
    pub fn new(
        id: UserId,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        last_active: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role,
            grade: None,
            xp: 0,
            streak: 0,
            last_active,
            badges: Vec::new(),
            avatar: String::new(),
        }
    }

    #[must_use]
    pub fn with_grade(mut self, grade: u8) -> Self {
        self.grade = Some(grade);
        self
    }

    #[must_use]
    pub fn with_xp(mut self, xp: u32) -> Self {
        self.xp = xp;
        self
    }

    #[must_use]
    pub fn with_streak(mut self, streak: u32) -> Self {
        self.streak = streak;
        self
    }

    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        xp::calculate_level(self.xp)
    }

    #[must_use]
    pub fn xp_for_next_level(&self) -> u32 {
        xp::xp_for_next_level(self.xp)
    }

    #[must_use]
    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    #[must_use]
    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    #[must_use]
    pub fn has_badge(&self, id: &BadgeId) -> bool {
        self.badges.iter().any(|b| &b.id == id)
    }

    /// Adds a badge to the user's collection.
    ///
    /// # Errors
    ///
    /// Returns `UserError::BadgeAlreadyUnlocked` if a badge with the same id
    /// is already present; the existing badge keeps its unlock timestamp.
    pub fn unlock_badge(&mut self, badge: Badge) -> Result<(), UserError> {
        if self.has_badge(&badge.id) {
            return Err(UserError::BadgeAlreadyUnlocked(badge.id));
        }
        self.badges.push(badge);
        Ok(())
    }

    /// Merges the set fields of `patch` into this record.
    pub fn apply_patch(&mut self, patch: UserPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(grade) = patch.grade {
            self.grade = grade;
        }
        if let Some(xp) = patch.xp {
            self.xp = xp;
        }
        if let Some(streak) = patch.streak {
            self.streak = streak;
        }
        if let Some(last_active) = patch.last_active {
            self.last_active = last_active;
        }
        if let Some(avatar) = patch.avatar {
            self.avatar = avatar;
        }
        for badge in patch.unlocked_badges {
            // Already-unlocked badges are immutable; a repeat is a no-op.
            let _ = self.unlock_badge(badge);
        }
    }
}

/// Partial update for a [`User`]. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub grade: Option<Option<u8>>,
    pub xp: Option<u32>,
    pub streak: Option<u32>,
    pub last_active: Option<DateTime<Utc>>,
    pub avatar: Option<String>,
    pub unlocked_badges: Vec<Badge>,
}

impl UserPatch {
    /// Patch that sets the experience total.
    #[must_use]
    pub fn xp(xp: u32) -> Self {
        Self {
            xp: Some(xp),
            ..Self::default()
        }
    }

    /// Patch that appends newly unlocked badges.
    #[must_use]
    pub fn unlock(badges: Vec<Badge>) -> Self {
        Self {
            unlocked_badges: badges,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_last_active(mut self, at: DateTime<Utc>) -> Self {
        self.last_active = Some(at);
        self
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn badge(id: &str) -> Badge {
        Badge {
            id: BadgeId::new(id),
            name: id.to_owned(),
            description: String::new(),
            icon: String::new(),
            unlocked_at: fixed_now(),
        }
    }

    fn student() -> User {
        User::new(UserId::new("user1"), "Rahul", "rahul@demo.com", Role::Student, fixed_now())
            .with_xp(1250)
    }

    #[test]
    fn level_tracks_xp() {
        let mut user = student();
        assert_eq!(user.level(), 13);
        user.apply_patch(UserPatch::xp(1450));
        assert_eq!(user.level(), 15);
        assert_eq!(user.xp_for_next_level(), 50);
    }

    #[test]
    fn badge_unlocks_once() {
        let mut user = student();
        user.unlock_badge(badge("week-streak")).unwrap();
        let err = user.unlock_badge(badge("week-streak")).unwrap_err();
        assert_eq!(err, UserError::BadgeAlreadyUnlocked(BadgeId::new("week-streak")));
        assert_eq!(user.badges().len(), 1);
    }

    #[test]
    fn patch_keeps_existing_badge_timestamp() {
        let mut user = student();
        user.unlock_badge(badge("first-lesson")).unwrap();
        let mut later = badge("first-lesson");
        later.unlocked_at = fixed_now() + chrono::Duration::days(3);
        user.apply_patch(UserPatch::unlock(vec![later, badge("quiz-master")]));

        assert_eq!(user.badges().len(), 2);
        assert_eq!(user.badges()[0].unlocked_at, fixed_now());
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut user = student().with_streak(4);
        user.apply_patch(UserPatch {
            name: Some("Rahul K.".into()),
            ..UserPatch::default()
        });
        assert_eq!(user.name, "Rahul K.");
        assert_eq!(user.xp, 1250);
        assert_eq!(user.streak, 4);
    }

    #[test]
    fn persisted_level_field_is_ignored() {
        let json = r#"{
            "id": "teacher1", "name": "Dr. Anil Verma", "email": "anil@demo.com",
            "role": "teacher", "xp": 250, "level": 99, "streak": 0,
            "last_active": "2024-01-20T00:00:00Z", "badges": [], "avatar": ""
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.role, Role::Teacher);
        assert_eq!(user.level(), 3);
        assert_eq!(user.grade, None);
    }
}
