//! Experience and level arithmetic.
//!
//! Level is never stored; it is always derived from experience points with
//! [`calculate_level`].

/// Experience points needed to climb one level.
pub const XP_PER_LEVEL: u32 = 100;

/// Experience awarded per percentage point of a quiz score.
pub const XP_PER_SCORE_POINT: u32 = 2;

/// `floor(xp / 100) + 1`. Total for every `xp`.
#[must_use]
pub fn calculate_level(xp: u32) -> u32 {
    xp / XP_PER_LEVEL + 1
}

/// Points missing until the next level: `calculate_level(xp) * 100 - xp`.
///
/// Always in `1..=100`. At an exact multiple of 100 the user has just reached
/// a new level, so the full 100 points are still ahead.
#[must_use]
pub fn xp_for_next_level(xp: u32) -> u32 {
    // Same value as `level * 100 - xp` without the overflowing product.
    XP_PER_LEVEL - xp % XP_PER_LEVEL
}

/// How far into the current level the user is, as a percentage.
#[must_use]
pub fn level_progress_percent(xp: u32) -> u8 {
    // xp % 100 < 100 always fits.
    u8::try_from(xp % XP_PER_LEVEL).unwrap_or(u8::MAX)
}

/// Experience earned for a quiz score: `floor(score * 2)`.
#[must_use]
pub fn xp_for_score(score: u8) -> u32 {
    u32::from(score) * XP_PER_SCORE_POINT
}
