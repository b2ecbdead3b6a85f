use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use gacha_config::{GachaConfig, RankingDecayPolicy};
use gacha_core::{day_key, write_text_atomic};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::retention_policy::{decay_ranking_stats, prune_inactive_users, trim_daily_records};
use crate::store_model::{
    ActiveUserMap, DailyRecordSet, DrawRecord, ForcedMarriageCooldown, ReverseRankingStats,
    UnixTimestamp,
};

pub const DAILY_RECORDS_FILE_NAME: &str = "wife_records.json";
pub const ACTIVE_USERS_FILE_NAME: &str = "active_users.json";
pub const COOLDOWNS_FILE_NAME: &str = "forced_marriage.json";
pub const RANKING_STATS_FILE_NAME: &str = "rbq_stats.json";

#[derive(Debug, Clone, PartialEq, Eq)]
/// File locations of the four persisted collections.
pub struct RetentionPaths {
    pub daily_records: PathBuf,
    pub active_users: PathBuf,
    pub cooldowns: PathBuf,
    pub ranking_stats: PathBuf,
}

impl RetentionPaths {
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            daily_records: data_dir.join(DAILY_RECORDS_FILE_NAME),
            active_users: data_dir.join(ACTIVE_USERS_FILE_NAME),
            cooldowns: data_dir.join(COOLDOWNS_FILE_NAME),
            ranking_stats: data_dir.join(RANKING_STATS_FILE_NAME),
        }
    }
}

/// Returns the parsed document at `path`, or `default` when it is missing or unreadable.
pub fn load_or_default<T: DeserializeOwned>(path: &Path, default: T) -> T {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            debug!(path = %path.display(), error = %error, "state document unavailable; using default");
            return default;
        }
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => value,
        Err(error) => {
            debug!(
                path = %path.display(),
                error = %error,
                reason_code = "state_document_malformed",
                "state document malformed; using default"
            );
            default
        }
    }
}

/// Writes `value` as pretty JSON with a trailing newline, atomically.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    payload.push('\n');
    write_text_atomic(path, &payload)
        .with_context(|| format!("failed to write state file {}", path.display()))
}

#[derive(Debug)]
/// Sole owner of the persisted game state.
///
/// Mutations go through the `_mut` accessors or the lifecycle helpers; nothing is
/// written until a `save_*` call (or a helper documented as persisting) runs.
pub struct RetentionStore {
    paths: RetentionPaths,
    max_records: usize,
    decay_policy: RankingDecayPolicy,
    daily_records: DailyRecordSet,
    active_users: ActiveUserMap,
    cooldowns: ForcedMarriageCooldown,
    ranking_stats: ReverseRankingStats,
}

impl RetentionStore {
    /// Creates `data_dir` if needed and loads every collection, defaulting what is missing.
    pub fn open(data_dir: &Path, config: &GachaConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let paths = RetentionPaths::for_data_dir(data_dir);
        let store = Self {
            daily_records: load_or_default(&paths.daily_records, DailyRecordSet::default()),
            active_users: load_or_default(&paths.active_users, ActiveUserMap::new()),
            cooldowns: load_or_default(&paths.cooldowns, ForcedMarriageCooldown::new()),
            ranking_stats: load_or_default(&paths.ranking_stats, ReverseRankingStats::new()),
            paths,
            max_records: config.max_records.max(1),
            decay_policy: config.rbq_decay_policy,
        };
        info!(
            data_dir = %data_dir.display(),
            record_date = %store.daily_records.date,
            daily_records = store.daily_records.total_records(),
            active_groups = store.active_users.len(),
            cooldown_groups = store.cooldowns.len(),
            ranking_groups = store.ranking_stats.len(),
            "retention store loaded"
        );
        Ok(store)
    }

    pub fn paths(&self) -> &RetentionPaths {
        &self.paths
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn decay_policy(&self) -> RankingDecayPolicy {
        self.decay_policy
    }

    pub fn daily_records(&self) -> &DailyRecordSet {
        &self.daily_records
    }

    pub fn daily_records_mut(&mut self) -> &mut DailyRecordSet {
        &mut self.daily_records
    }

    pub fn active_users(&self) -> &ActiveUserMap {
        &self.active_users
    }

    pub fn active_users_mut(&mut self) -> &mut ActiveUserMap {
        &mut self.active_users
    }

    pub fn cooldowns(&self) -> &ForcedMarriageCooldown {
        &self.cooldowns
    }

    pub fn cooldowns_mut(&mut self) -> &mut ForcedMarriageCooldown {
        &mut self.cooldowns
    }

    pub fn ranking_stats(&self) -> &ReverseRankingStats {
        &self.ranking_stats
    }

    pub fn ranking_stats_mut(&mut self) -> &mut ReverseRankingStats {
        &mut self.ranking_stats
    }

    /// Replaces the daily set with an empty one stamped `today` on a date change.
    /// Returns true when a rollover happened.
    pub fn ensure_today(&mut self, today: NaiveDate) -> bool {
        let key = day_key(today);
        if self.daily_records.date == key {
            return false;
        }
        debug!(previous = %self.daily_records.date, today = %key, "daily records rolled over");
        self.daily_records = DailyRecordSet::for_day(key);
        true
    }

    /// Today's records for `group_id`, created on first access.
    pub fn group_records_mut(&mut self, group_id: &str, today: NaiveDate) -> &mut Vec<DrawRecord> {
        self.ensure_today(today);
        &mut self
            .daily_records
            .groups
            .entry(group_id.to_string())
            .or_default()
            .records
    }

    /// Read-only view of today's records; a stale day reads as empty without rolling over.
    pub fn group_records_for_day(&self, group_id: &str, today: NaiveDate) -> &[DrawRecord] {
        if self.daily_records.date != day_key(today) {
            return &[];
        }
        self.daily_records
            .groups
            .get(group_id)
            .map(|group| group.records.as_slice())
            .unwrap_or_default()
    }

    /// Trims the daily set to `max_records`, then persists it.
    pub fn save_daily_records(&mut self) -> Result<()> {
        let dropped = trim_daily_records(&mut self.daily_records, self.max_records);
        if dropped > 0 {
            debug!(dropped, max_records = self.max_records, "daily records trimmed");
        }
        save_json(&self.paths.daily_records, &self.daily_records)
    }

    pub fn save_active_users(&self) -> Result<()> {
        save_json(&self.paths.active_users, &self.active_users)
    }

    pub fn save_cooldowns(&self) -> Result<()> {
        save_json(&self.paths.cooldowns, &self.cooldowns)
    }

    pub fn save_ranking_stats(&self) -> Result<()> {
        save_json(&self.paths.ranking_stats, &self.ranking_stats)
    }

    pub fn save_all(&mut self) -> Result<()> {
        self.save_daily_records()?;
        self.save_active_users()?;
        self.save_cooldowns()?;
        self.save_ranking_stats()
    }

    /// Evicts stale and sentinel entries from one group's active users.
    /// Persists and returns true only when something was removed.
    pub fn cleanup_inactive_group(&mut self, group_id: &str, now: UnixTimestamp) -> Result<bool> {
        let Some(group) = self.active_users.get_mut(group_id) else {
            return Ok(false);
        };
        let removed = prune_inactive_users(group, now);
        if removed == 0 {
            return Ok(false);
        }
        debug!(group_id, removed, "inactive users evicted");
        self.save_active_users()?;
        Ok(true)
    }

    /// Rebuilds the reverse-ranking stats under the configured decay policy and persists them.
    pub fn clean_ranking_stats(&mut self, now: UnixTimestamp) -> Result<()> {
        self.ranking_stats =
            decay_ranking_stats(&self.ranking_stats, &self.active_users, now, self.decay_policy);
        self.save_ranking_stats()
    }

    /// Discards every record of the day and persists the empty set.
    pub fn reset_today(&mut self, today: NaiveDate) -> Result<()> {
        self.daily_records = DailyRecordSet::for_day(day_key(today));
        info!(today = %self.daily_records.date, "daily records reset");
        self.save_daily_records()
    }

    /// Clears one group's cooldowns. Returns false when the group had no cooldown state.
    pub fn reset_cooldown_for_group(&mut self, group_id: &str) -> Result<bool> {
        let Some(group) = self.cooldowns.get_mut(group_id) else {
            return Ok(false);
        };
        group.clear();
        info!(group_id, "force-marry cooldowns reset");
        self.save_cooldowns()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gacha_core::SECONDS_PER_DAY;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::store_model::GroupRecords;

    const NOW: f64 = 1_770_000_000.0;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    fn config_with_max_records(max_records: usize) -> GachaConfig {
        GachaConfig {
            max_records,
            ..GachaConfig::default()
        }
    }

    fn read_json(path: &Path) -> serde_json::Value {
        let raw = std::fs::read_to_string(path).expect("read");
        serde_json::from_str(&raw).expect("parse")
    }

    #[test]
    fn unit_load_or_default_handles_missing_and_malformed_files() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("missing.json");
        let value: ActiveUserMap = load_or_default(&missing, ActiveUserMap::new());
        assert!(value.is_empty());

        let malformed = temp.path().join("malformed.json");
        std::fs::write(&malformed, "{not json").expect("write");
        let value: ActiveUserMap = load_or_default(&malformed, ActiveUserMap::new());
        assert!(value.is_empty());

        let wrong_shape = temp.path().join("wrong_shape.json");
        std::fs::write(&wrong_shape, "[1, 2, 3]").expect("write");
        let value: DailyRecordSet = load_or_default(&wrong_shape, DailyRecordSet::for_day("x"));
        assert_eq!(value.date, "x");
    }

    #[test]
    fn functional_open_creates_data_dir_and_defaults() {
        let temp = tempdir().expect("tempdir");
        let data_dir = temp.path().join("nested").join("data");
        let store = RetentionStore::open(&data_dir, &GachaConfig::default()).expect("open");
        assert!(data_dir.is_dir());
        assert_eq!(store.daily_records(), &DailyRecordSet::default());
        assert!(store.active_users().is_empty());
        assert_eq!(store.max_records(), 500);
    }

    #[test]
    fn functional_save_daily_records_trims_to_max_records() {
        let temp = tempdir().expect("tempdir");
        let mut store = RetentionStore::open(temp.path(), &config_with_max_records(2)).expect("open");
        let records = store.daily_records_mut();
        records.date = "2026-02-08".to_string();
        for (group, timestamp, value) in [
            ("1", "2026-02-08T08:00:00", "a"),
            ("1", "2026-02-08T09:00:00", "b"),
            ("2", "2026-02-08T10:00:00", "c"),
        ] {
            let mut record = DrawRecord::drawn("u", "p", "n", timestamp);
            record.extra.insert("value".to_string(), json!(value));
            records
                .groups
                .entry(group.to_string())
                .or_default()
                .records
                .push(record);
        }
        store.save_daily_records().expect("save");

        let reloaded: DailyRecordSet =
            load_or_default(&store.paths().daily_records, DailyRecordSet::default());
        assert_eq!(reloaded.groups.len(), 2);
        let mut values = reloaded
            .groups
            .values()
            .flat_map(|group| group.records.iter())
            .filter_map(|record| record.extra.get("value").and_then(|value| value.as_str()))
            .collect::<Vec<_>>();
        values.sort();
        assert_eq!(values, vec!["b", "c"]);
    }

    #[test]
    fn functional_records_keep_historical_field_names_on_disk() {
        let temp = tempdir().expect("tempdir");
        let mut store = RetentionStore::open(temp.path(), &GachaConfig::default()).expect("open");
        let today = day("2026-02-08");
        store
            .group_records_mut("42", today)
            .push(DrawRecord::drawn("1001", "2002", "小红", "2026-02-08T08:00:00.000000").forced());
        store.save_daily_records().expect("save");

        let document = read_json(&store.paths().daily_records);
        assert_eq!(document["date"], "2026-02-08");
        let record = &document["groups"]["42"]["records"][0];
        assert_eq!(record["user_id"], "1001");
        assert_eq!(record["wife_id"], "2002");
        assert_eq!(record["wife_name"], "小红");
        assert_eq!(record["forced"], true);
        assert!(record.get("auto_set").is_none());
    }

    #[test]
    fn unit_ensure_today_rolls_over_stale_records() {
        let temp = tempdir().expect("tempdir");
        let mut store = RetentionStore::open(temp.path(), &GachaConfig::default()).expect("open");
        store.daily_records_mut().date = "2000-01-01".to_string();
        store.daily_records_mut().groups.insert(
            "7788".to_string(),
            GroupRecords {
                records: vec![DrawRecord::drawn("1", "2", "n", "2000-01-01T00:00:00")],
            },
        );

        let today = day("2026-02-08");
        assert!(store.group_records_for_day("7788", today).is_empty());
        let records = store.group_records_mut("7788", today);
        assert!(records.is_empty());
        assert_eq!(store.daily_records().date, "2026-02-08");
        assert!(!store.ensure_today(today));
    }

    #[test]
    fn functional_cleanup_inactive_group_persists_only_on_change() {
        let temp = tempdir().expect("tempdir");
        let mut store = RetentionStore::open(temp.path(), &GachaConfig::default()).expect("open");
        store.active_users_mut().insert(
            "g1".to_string(),
            BTreeMap::from([("u1".to_string(), NOW - 10.0)]),
        );
        assert!(!store.cleanup_inactive_group("g1", NOW).expect("cleanup"));
        assert!(!store.paths().active_users.exists());
        assert!(!store.cleanup_inactive_group("missing", NOW).expect("cleanup"));

        store
            .active_users_mut()
            .entry("g1".to_string())
            .or_default()
            .insert("u_old".to_string(), NOW - 31.0 * SECONDS_PER_DAY);
        assert!(store.cleanup_inactive_group("g1", NOW).expect("cleanup"));
        let document = read_json(&store.paths().active_users);
        assert_eq!(document, json!({"g1": {"u1": NOW - 10.0}}));
    }

    #[test]
    fn functional_clean_ranking_stats_always_persists() {
        let temp = tempdir().expect("tempdir");
        let mut store = RetentionStore::open(temp.path(), &GachaConfig::default()).expect("open");
        store.active_users_mut().insert(
            "100".to_string(),
            BTreeMap::from([("u_keep".to_string(), NOW)]),
        );
        store.ranking_stats_mut().insert(
            "100".to_string(),
            BTreeMap::from([
                ("u_keep".to_string(), vec![NOW - 100.0]),
                ("u_expired".to_string(), vec![NOW - 31.0 * SECONDS_PER_DAY]),
                ("u_inactive_low".to_string(), vec![NOW - 50.0]),
            ]),
        );
        store.clean_ranking_stats(NOW).expect("clean");

        let group = &store.ranking_stats()["100"];
        assert_eq!(group.keys().collect::<Vec<_>>(), vec!["u_keep"]);
        let document = read_json(&store.paths().ranking_stats);
        assert_eq!(document, json!({"100": {"u_keep": [NOW - 100.0]}}));
    }

    #[test]
    fn functional_reset_today_persists_empty_set() {
        let temp = tempdir().expect("tempdir");
        let mut store = RetentionStore::open(temp.path(), &GachaConfig::default()).expect("open");
        let today = day("2026-02-08");
        store
            .group_records_mut("1", today)
            .push(DrawRecord::drawn("1", "2", "n", "2026-02-08T08:00:00"));
        store.reset_today(today).expect("reset");
        assert_eq!(store.daily_records().total_records(), 0);
        let document = read_json(&store.paths().daily_records);
        assert_eq!(document, json!({"date": "2026-02-08", "groups": {}}));
    }

    #[test]
    fn functional_reset_cooldown_reports_whether_group_had_state() {
        let temp = tempdir().expect("tempdir");
        let mut store = RetentionStore::open(temp.path(), &GachaConfig::default()).expect("open");
        assert!(!store.reset_cooldown_for_group("g1").expect("reset"));

        store
            .cooldowns_mut()
            .insert("g1".to_string(), BTreeMap::from([("u1".to_string(), NOW)]));
        assert!(store.reset_cooldown_for_group("g1").expect("reset"));
        assert!(store.cooldowns()["g1"].is_empty());
        assert_eq!(read_json(&store.paths().cooldowns), json!({"g1": {}}));
    }

    #[test]
    fn integration_save_all_round_trips_through_open() {
        let temp = tempdir().expect("tempdir");
        let config = GachaConfig::default();
        let today = day("2026-02-08");
        {
            let mut store = RetentionStore::open(temp.path(), &config).expect("open");
            store
                .group_records_mut("g", today)
                .push(DrawRecord::drawn("1", "2", "n", "2026-02-08T08:00:00"));
            store
                .active_users_mut()
                .insert("g".to_string(), BTreeMap::from([("1".to_string(), NOW)]));
            store
                .cooldowns_mut()
                .insert("g".to_string(), BTreeMap::from([("1".to_string(), NOW)]));
            store
                .ranking_stats_mut()
                .insert("g".to_string(), BTreeMap::from([("2".to_string(), vec![NOW])]));
            store.save_all().expect("save all");
        }

        let reopened = RetentionStore::open(temp.path(), &config).expect("reopen");
        assert_eq!(reopened.group_records_for_day("g", today).len(), 1);
        assert_eq!(reopened.active_users()["g"]["1"], NOW);
        assert_eq!(reopened.cooldowns()["g"]["1"], NOW);
        assert_eq!(reopened.ranking_stats()["g"]["2"], vec![NOW]);
    }

    #[test]
    fn regression_save_fails_when_data_path_is_a_directory() {
        let temp = tempdir().expect("tempdir");
        let mut store = RetentionStore::open(temp.path(), &GachaConfig::default()).expect("open");
        std::fs::create_dir_all(&store.paths().daily_records).expect("mkdir");
        let error = store.save_daily_records().expect_err("directory target");
        assert!(error.to_string().contains("failed to write state file"));
    }
}
