#![forbid(unsafe_code)]

pub mod achievements;
pub mod model;
pub mod time;
pub mod xp;

pub use time::Clock;
