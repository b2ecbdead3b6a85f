use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use gacha_core::MatchMode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

pub const GACHA_CONFIG_FILE_NAME: &str = "config.json";

const DEFAULT_DAILY_LIMIT: i64 = 1;
const DEFAULT_FORCE_MARRY_CD_DAYS: i64 = 3;
const DEFAULT_MAX_RECORDS: i64 = 500;
const DEFAULT_GRAPH_ITERATIONS: i64 = 150;
const DEFAULT_AUTO_WITHDRAW_DELAY_SECONDS: i64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// Eviction rule applied to reverse-ranking entries of users missing from the active map.
pub enum RankingDecayPolicy {
    /// Drop inactive users with at most four hits once they have been silent for 7 days.
    #[default]
    InactiveSevenDay,
    /// Users never seen active are dropped 5 days after their last hit; others follow the 7-day rule.
    ForcedFallbackFiveDay,
}

impl RankingDecayPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InactiveSevenDay => "inactive_seven_day",
            Self::ForcedFallbackFiveDay => "forced_fallback_five_day",
        }
    }
}

impl FromStr for RankingDecayPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "inactive_seven_day" => Ok(Self::InactiveSevenDay),
            "forced_fallback_five_day" => Ok(Self::ForcedFallbackFiveDay),
            other => anyhow::bail!("unknown ranking decay policy '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Read-only typed view over the plugin settings.
pub struct GachaConfig {
    pub daily_limit: usize,
    pub force_marry_cd_days: u32,
    pub max_records: usize,
    pub iterations: u32,
    pub auto_set_other_half: bool,
    pub auto_withdraw_enabled: bool,
    pub auto_withdraw_delay_seconds: u64,
    pub keyword_trigger_enabled: bool,
    pub keyword_trigger_mode: MatchMode,
    pub excluded_users: BTreeSet<String>,
    pub force_marry_excluded_users: BTreeSet<String>,
    pub whitelist_groups: BTreeSet<String>,
    pub blacklist_groups: BTreeSet<String>,
    pub rbq_decay_policy: RankingDecayPolicy,
}

impl Default for GachaConfig {
    fn default() -> Self {
        Self::from_map(&Map::new())
    }
}

impl GachaConfig {
    /// Builds the config from any JSON value; non-objects behave like an empty mapping.
    pub fn from_value(raw: &Value) -> Self {
        match raw.as_object() {
            Some(map) => Self::from_map(map),
            None => {
                if !raw.is_null() {
                    warn!(
                        reason_code = "config_not_object",
                        "gacha config is not a JSON object; using defaults"
                    );
                }
                Self::from_map(&Map::new())
            }
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            daily_limit: coerce_int(map, "daily_limit", DEFAULT_DAILY_LIMIT, 1) as usize,
            force_marry_cd_days: coerce_int(
                map,
                "force_marry_cd",
                DEFAULT_FORCE_MARRY_CD_DAYS,
                1,
            )
            .min(i64::from(u32::MAX)) as u32,
            max_records: coerce_int(map, "max_records", DEFAULT_MAX_RECORDS, 1) as usize,
            iterations: coerce_int(map, "iterations", DEFAULT_GRAPH_ITERATIONS, 1)
                .min(i64::from(u32::MAX)) as u32,
            auto_set_other_half: coerce_bool(map, "auto_set_other_half", false),
            auto_withdraw_enabled: coerce_bool(map, "auto_withdraw_enabled", false),
            auto_withdraw_delay_seconds: coerce_int(
                map,
                "auto_withdraw_delay_seconds",
                DEFAULT_AUTO_WITHDRAW_DELAY_SECONDS,
                1,
            ) as u64,
            keyword_trigger_enabled: coerce_bool(map, "keyword_trigger_enabled", false),
            keyword_trigger_mode: coerce_enum(map, "keyword_trigger_mode", MatchMode::Exact),
            excluded_users: normalize_id_set(map.get("excluded_users")),
            force_marry_excluded_users: normalize_id_set(map.get("force_marry_excluded_users")),
            whitelist_groups: normalize_id_set(map.get("whitelist_groups")),
            blacklist_groups: normalize_id_set(map.get("blacklist_groups")),
            rbq_decay_policy: coerce_enum(
                map,
                "rbq_decay_policy",
                RankingDecayPolicy::InactiveSevenDay,
            ),
        }
    }

    /// Deny-list wins; an empty allow-list admits every group that is not denied.
    pub fn is_allowed_group(&self, group_id: &str) -> bool {
        let group_id = group_id.trim();
        if self.blacklist_groups.contains(group_id) {
            return false;
        }
        if !self.whitelist_groups.is_empty() && !self.whitelist_groups.contains(group_id) {
            return false;
        }
        true
    }
}

/// Loads `config.json`-style settings. A missing file yields defaults and malformed
/// JSON is logged and treated as an empty mapping; only unreadable files error.
pub fn load_gacha_config(path: &Path) -> Result<GachaConfig> {
    if !path.exists() {
        return Ok(GachaConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gacha config {}", path.display()))?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => Ok(GachaConfig::from_value(&value)),
        Err(error) => {
            warn!(
                reason_code = "config_parse_failed",
                path = %path.display(),
                error = %error,
                "gacha config is not valid JSON; using defaults"
            );
            Ok(GachaConfig::default())
        }
    }
}

/// Turns a loosely typed id list into a set of trimmed, non-empty ids.
pub fn normalize_id_set(raw: Option<&Value>) -> BTreeSet<String> {
    let Some(Value::Array(items)) = raw else {
        return BTreeSet::new();
    };
    items
        .iter()
        .filter_map(value_as_id)
        .filter(|id| !id.is_empty())
        .collect()
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn coerce_int(map: &Map<String, Value>, key: &str, default: i64, minimum: i64) -> i64 {
    let parsed = match map.get(key) {
        None | Some(Value::Null) => Some(default),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        Some(Value::Bool(flag)) => Some(i64::from(*flag)),
        Some(_) => None,
    };
    let value = parsed.unwrap_or_else(|| {
        warn!(
            reason_code = "config_int_fallback",
            key,
            default,
            "gacha config value is not an integer; using default"
        );
        default
    });
    value.max(minimum)
}

fn coerce_bool(map: &Map<String, Value>, key: &str, default: bool) -> bool {
    let parsed = match map.get(key) {
        None | Some(Value::Null) => Some(default),
        Some(Value::Bool(flag)) => Some(*flag),
        Some(Value::Number(number)) => Some(number.as_f64().is_some_and(|v| v != 0.0)),
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" | "" => Some(false),
            _ => None,
        },
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        warn!(
            reason_code = "config_bool_fallback",
            key,
            default,
            "gacha config value is not a boolean; using default"
        );
        default
    })
}

fn coerce_enum<T>(map: &Map<String, Value>, key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    let Some(raw) = map.get(key).and_then(Value::as_str) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(
                reason_code = "config_enum_fallback",
                key,
                value = raw,
                "unknown gacha config value; using default"
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unit_numeric_defaults_and_bounds() {
        let config = GachaConfig::from_value(&json!({
            "daily_limit": "0",
            "force_marry_cd": -3,
            "max_records": "bad",
            "iterations": 0,
            "auto_withdraw_delay_seconds": "-2"
        }));

        assert_eq!(config.daily_limit, 1);
        assert_eq!(config.force_marry_cd_days, 1);
        assert_eq!(config.max_records, 500);
        assert_eq!(config.iterations, 1);
        assert_eq!(config.auto_withdraw_delay_seconds, 1);
    }

    #[test]
    fn unit_defaults_match_documented_values() {
        let config = GachaConfig::default();
        assert_eq!(config.daily_limit, 1);
        assert_eq!(config.force_marry_cd_days, 3);
        assert_eq!(config.max_records, 500);
        assert_eq!(config.iterations, 150);
        assert_eq!(config.auto_withdraw_delay_seconds, 5);
        assert!(!config.keyword_trigger_enabled);
        assert_eq!(config.keyword_trigger_mode, MatchMode::Exact);
        assert_eq!(config.rbq_decay_policy, RankingDecayPolicy::InactiveSevenDay);
    }

    #[test]
    fn functional_group_allow_rules() {
        let config = GachaConfig::from_value(&json!({
            "whitelist_groups": ["100", 200],
            "blacklist_groups": ["300", 200]
        }));

        assert!(config.is_allowed_group("100"));
        assert!(!config.is_allowed_group("200"));
        assert!(!config.is_allowed_group("300"));
        assert!(!config.is_allowed_group("999"));
    }

    #[test]
    fn functional_empty_whitelist_allows_everything_not_denied() {
        let config = GachaConfig::from_value(&json!({ "blacklist_groups": ["13"] }));
        assert!(config.is_allowed_group("12"));
        assert!(!config.is_allowed_group("13"));
    }

    #[test]
    fn unit_normalize_id_set_drops_blank_and_non_scalar_ids() {
        let config = GachaConfig::from_value(&json!({
            "excluded_users": [123, "", "456", "  ", {"id": 7}, null]
        }));
        assert_eq!(
            config.excluded_users,
            BTreeSet::from(["123".to_string(), "456".to_string()])
        );
        assert!(normalize_id_set(Some(&json!("123"))).is_empty());
    }

    #[test]
    fn regression_unknown_match_mode_falls_back_to_exact() {
        let config = GachaConfig::from_value(&json!({
            "keyword_trigger_mode": "fuzzy",
            "rbq_decay_policy": "never"
        }));
        assert_eq!(config.keyword_trigger_mode, MatchMode::Exact);
        assert_eq!(config.rbq_decay_policy, RankingDecayPolicy::InactiveSevenDay);

        let config = GachaConfig::from_value(&json!({
            "keyword_trigger_mode": " Contains ",
            "rbq_decay_policy": "forced_fallback_five_day"
        }));
        assert_eq!(config.keyword_trigger_mode, MatchMode::Contains);
        assert_eq!(
            config.rbq_decay_policy,
            RankingDecayPolicy::ForcedFallbackFiveDay
        );
    }

    #[test]
    fn unit_bool_coercion_accepts_common_spellings() {
        let config = GachaConfig::from_value(&json!({
            "keyword_trigger_enabled": "yes",
            "auto_set_other_half": 1,
            "auto_withdraw_enabled": "maybe"
        }));
        assert!(config.keyword_trigger_enabled);
        assert!(config.auto_set_other_half);
        assert!(!config.auto_withdraw_enabled);
    }

    #[test]
    fn integration_load_gacha_config_tolerates_missing_and_malformed_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(GACHA_CONFIG_FILE_NAME);
        assert_eq!(
            load_gacha_config(&path).expect("missing"),
            GachaConfig::default()
        );

        std::fs::write(&path, "{ not json").expect("write malformed");
        assert_eq!(
            load_gacha_config(&path).expect("malformed"),
            GachaConfig::default()
        );

        std::fs::write(&path, r#"{"daily_limit": 3, "keyword_trigger_enabled": true}"#)
            .expect("write config");
        let config = load_gacha_config(&path).expect("valid");
        assert_eq!(config.daily_limit, 3);
        assert!(config.keyword_trigger_enabled);
    }
}
