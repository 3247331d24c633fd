use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of identifiers minted by [`generate_id`].
pub const GENERATED_ID_LEN: usize = 11;

const ID_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Produces a short lowercase base-36 identifier.
///
/// Unique enough for demo-scale record keys; not suitable as a secret.
#[must_use]
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_ID_LEN)
        .map(|_| char::from(ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())]))
        .collect()
}

/// Error type for parsing an identifier from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cannot be empty", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mints a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(generate_id())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        kind: stringify!($name),
                    });
                }
                Ok(Self::new(trimmed))
            }
        }
    };
}

string_id!(
    /// Identifier of a user record (e.g. `user1`).
    UserId
);
string_id!(
    /// Identifier of a badge, shared across users (e.g. `week-streak`).
    BadgeId
);
string_id!(LessonId);
string_id!(QuizId);
string_id!(QuestionId);
string_id!(AttemptId);
string_id!(
    /// Identifier of a per-user lesson progress record.
    ProgressId
);

impl ProgressId {
    /// Progress records are keyed by the user/lesson pair they describe.
    #[must_use]
    pub fn for_pair(user_id: &UserId, lesson_id: &LessonId) -> Self {
        Self(format!("{user_id}:{lesson_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_short_base36() {
        let id = generate_id();
        assert_eq!(id.len(), GENERATED_ID_LEN);
        assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn generated_ids_do_not_collide_at_demo_scale() {
        let ids: HashSet<_> = (0..1_000).map(|_| AttemptId::generate()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn parse_rejects_blank() {
        assert!("   ".parse::<QuizId>().is_err());
        assert_eq!(" quiz1 ".parse::<QuizId>().unwrap(), QuizId::new("quiz1"));
    }

    #[test]
    fn debug_and_display() {
        let id = UserId::new("user1");
        assert_eq!(id.to_string(), "user1");
        assert_eq!(format!("{id:?}"), "UserId(user1)");
    }

    #[test]
    fn progress_id_joins_pair() {
        let id = ProgressId::for_pair(&UserId::new("user1"), &LessonId::new("lesson2"));
        assert_eq!(id.as_str(), "user1:lesson2");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&QuestionId::new("q1")).unwrap();
        assert_eq!(json, "\"q1\"");
    }
}
