//! State retention for the gacha game.
//!
//! [`RetentionStore`] owns the four persisted collections (daily draw records,
//! active users, force-marry cooldowns, reverse-ranking stats) and enforces their
//! lifecycle: daily rollover, capacity trimming on write, and time-decay eviction.
//! [`ActivityTracker`] layers the "last seen" bookkeeping on top of it.

pub mod activity_tracker;
pub mod retention_policy;
pub mod retention_store;
pub mod store_model;

pub use activity_tracker::*;
pub use retention_policy::*;
pub use retention_store::*;
pub use store_model::*;
