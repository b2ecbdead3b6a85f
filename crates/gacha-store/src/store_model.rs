use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type GroupId = String;
pub type UserId = String;
/// Fractional Unix seconds.
pub type UnixTimestamp = f64;

/// `group -> user -> last seen`.
pub type ActiveUserMap = BTreeMap<GroupId, BTreeMap<UserId, UnixTimestamp>>;
/// `group -> user -> last successful force-marry`.
pub type ForcedMarriageCooldown = BTreeMap<GroupId, BTreeMap<UserId, UnixTimestamp>>;
/// `group -> user -> every time the user was a force-marry target`.
pub type ReverseRankingStats = BTreeMap<GroupId, BTreeMap<UserId, Vec<UnixTimestamp>>>;

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
/// One draw (or forced/auto-set assignment) for the current day.
pub struct DrawRecord {
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default, rename = "wife_id")]
    pub partner_id: UserId,
    #[serde(default, rename = "wife_name")]
    pub partner_name: String,
    /// Naive local ISO-8601; lexicographic order is chronological order.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub forced: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_set: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_set_target_name: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DrawRecord {
    pub fn drawn(
        user_id: impl Into<UserId>,
        partner_id: impl Into<UserId>,
        partner_name: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            partner_id: partner_id.into(),
            partner_name: partner_name.into(),
            timestamp: timestamp.into(),
            ..Self::default()
        }
    }

    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GroupRecords {
    #[serde(default)]
    pub records: Vec<DrawRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
/// Every draw record of one logical day, keyed by group.
pub struct DailyRecordSet {
    /// `YYYY-MM-DD`; empty until the first rollover.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub groups: BTreeMap<GroupId, GroupRecords>,
}

impl DailyRecordSet {
    pub fn for_day(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            groups: BTreeMap::new(),
        }
    }

    pub fn total_records(&self) -> usize {
        self.groups.values().map(|group| group.records.len()).sum()
    }
}
