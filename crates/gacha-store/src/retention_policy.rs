//! Pure trim and decay rules applied by the retention store.

use std::collections::BTreeMap;

use gacha_config::RankingDecayPolicy;
use gacha_core::SECONDS_PER_DAY;

use crate::store_model::{
    ActiveUserMap, DailyRecordSet, DrawRecord, GroupId, GroupRecords, ReverseRankingStats,
    UnixTimestamp, UserId,
};

/// Sentinel id some platforms report for anonymous or system senders.
pub const SENTINEL_USER_ID: &str = "0";

pub const ACTIVE_USER_RETENTION_SECS: f64 = 30.0 * SECONDS_PER_DAY;
pub const RANKING_WINDOW_SECS: f64 = 30.0 * SECONDS_PER_DAY;
pub const RANKING_INACTIVE_GRACE_SECS: f64 = 7.0 * SECONDS_PER_DAY;
pub const RANKING_FORCED_FALLBACK_SECS: f64 = 5.0 * SECONDS_PER_DAY;
pub const RANKING_LOW_HIT_THRESHOLD: usize = 4;

/// Keeps only the `max_records` most recent records across all groups.
///
/// Returns how many records were dropped. Below the cap the set is left untouched.
pub fn trim_daily_records(records: &mut DailyRecordSet, max_records: usize) -> usize {
    let max_records = max_records.max(1);
    let total = records.total_records();
    if total <= max_records {
        return 0;
    }

    let mut flattened: Vec<(GroupId, DrawRecord)> = Vec::with_capacity(total);
    for (group_id, group) in std::mem::take(&mut records.groups) {
        for record in group.records {
            flattened.push((group_id.clone(), record));
        }
    }
    flattened.sort_by(|(_, left), (_, right)| left.timestamp.cmp(&right.timestamp));
    let keep_from = flattened.len() - max_records;

    let mut groups: BTreeMap<GroupId, GroupRecords> = BTreeMap::new();
    for (group_id, record) in flattened.into_iter().skip(keep_from) {
        groups.entry(group_id).or_default().records.push(record);
    }
    records.groups = groups;
    total - max_records
}

/// Drops entries last seen `ACTIVE_USER_RETENTION_SECS` or more ago, plus the sentinel id.
/// Returns how many entries were removed.
pub fn prune_inactive_users(
    group: &mut BTreeMap<UserId, UnixTimestamp>,
    now: UnixTimestamp,
) -> usize {
    let before = group.len();
    group.retain(|user_id, last_seen| {
        user_id != SENTINEL_USER_ID && now - *last_seen < ACTIVE_USER_RETENTION_SECS
    });
    before - group.len()
}

/// Rebuilds the reverse-ranking stats, dropping expired hits, decayed users, and empty groups.
pub fn decay_ranking_stats(
    stats: &ReverseRankingStats,
    active_users: &ActiveUserMap,
    now: UnixTimestamp,
    policy: RankingDecayPolicy,
) -> ReverseRankingStats {
    let empty = BTreeMap::new();
    let mut rebuilt = ReverseRankingStats::new();
    for (group_id, users) in stats {
        let active_group = active_users.get(group_id).unwrap_or(&empty);
        let survivors = users
            .iter()
            .filter_map(|(user_id, hits)| {
                let recent = hits
                    .iter()
                    .copied()
                    .filter(|hit| hit.is_finite() && now - hit < RANKING_WINDOW_SECS)
                    .collect::<Vec<_>>();
                if recent.is_empty() {
                    return None;
                }
                let last_active = active_group.get(user_id).copied();
                if should_evict_ranked_user(&recent, last_active, now, policy) {
                    return None;
                }
                Some((user_id.clone(), recent))
            })
            .collect::<BTreeMap<_, _>>();
        if !survivors.is_empty() {
            rebuilt.insert(group_id.clone(), survivors);
        }
    }
    rebuilt
}

/// Users still in the active map are never evicted.
fn should_evict_ranked_user(
    recent_hits: &[UnixTimestamp],
    last_active: Option<UnixTimestamp>,
    now: UnixTimestamp,
    policy: RankingDecayPolicy,
) -> bool {
    if last_active.is_some() {
        return false;
    }
    match policy {
        // Absent users count as last seen at the epoch, so only the hit count decides.
        RankingDecayPolicy::InactiveSevenDay => {
            recent_hits.len() <= RANKING_LOW_HIT_THRESHOLD && now > RANKING_INACTIVE_GRACE_SECS
        }
        RankingDecayPolicy::ForcedFallbackFiveDay => {
            let last_hit = recent_hits.iter().copied().fold(f64::MIN, f64::max);
            now - last_hit > RANKING_FORCED_FALLBACK_SECS
        }
    }
}
