use std::sync::Arc;

use anyhow::Result;
use gacha_config::GachaConfig;
use tracing::debug;

use crate::retention_policy::SENTINEL_USER_ID;
use crate::retention_store::RetentionStore;
use crate::store_model::UnixTimestamp;

#[derive(Debug, Clone)]
/// Keeps the per-group "last seen" map that feeds the draw pool.
pub struct ActivityTracker {
    config: Arc<GachaConfig>,
}

impl ActivityTracker {
    pub fn new(config: Arc<GachaConfig>) -> Self {
        Self { config }
    }

    /// Stamps `user_id` as active in `group_id` and persists the active-user map.
    ///
    /// Ignores blank or disallowed groups, the bot itself, and the sentinel id.
    /// Returns true when the map was updated.
    pub fn record_active(
        &self,
        store: &mut RetentionStore,
        group_id: &str,
        user_id: &str,
        bot_id: &str,
        now: UnixTimestamp,
    ) -> Result<bool> {
        let group_id = group_id.trim();
        if group_id.is_empty() || !self.config.is_allowed_group(group_id) {
            return Ok(false);
        }
        let user_id = user_id.trim();
        if user_id.is_empty() || user_id == bot_id.trim() || user_id == SENTINEL_USER_ID {
            debug!(group_id, user_id, reason_code = "activity_sender_ignored", "activity not recorded");
            return Ok(false);
        }
        store
            .active_users_mut()
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string(), now);
        store.save_active_users()?;
        Ok(true)
    }

    /// Evicts entries of `group_id` last seen 30 or more days ago; persists on change only.
    pub fn cleanup_inactive(
        &self,
        store: &mut RetentionStore,
        group_id: &str,
        now: UnixTimestamp,
    ) -> Result<bool> {
        store.cleanup_inactive_group(group_id.trim(), now)
    }
}
