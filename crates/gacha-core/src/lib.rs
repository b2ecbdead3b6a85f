//! Foundational low-level utilities shared across gacha crates.
//!
//! Provides the atomic file-write helper used by every persisted collection and
//! the clock/time helpers behind daily rollover and cooldown expiry. [`MatchMode`]
//! lives here so configuration can name it without depending on the router.

pub mod atomic_io;
pub mod match_mode;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use match_mode::MatchMode;
pub use time_utils::{
    datetime_from_unix_seconds, day_key, iso_local_timestamp, midnight_after_days, unix_seconds,
    Clock, ManualClock, SystemClock, SECONDS_PER_DAY,
};
