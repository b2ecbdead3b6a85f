//! Pure game rules: draw pool selection, force-marry cooldown, ranking, and layout math.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone};
use gacha_core::{datetime_from_unix_seconds, midnight_after_days, unix_seconds};
use gacha_gateway::fallback_user_name;
use gacha_store::{DrawRecord, UnixTimestamp, UserId};
use serde::Serialize;

pub const GRAPH_CLIP_WIDTH: u32 = 1920;
pub const GRAPH_BASE_HEIGHT: u32 = 1080;
pub const GRAPH_NODES_BEFORE_GROWTH: usize = 10;
pub const GRAPH_HEIGHT_PER_EXTRA_NODE: u32 = 60;

pub const RANKING_CLIP_WIDTH: u32 = 400;
pub const RANKING_HEADER_HEIGHT: u32 = 100;
pub const RANKING_ROW_HEIGHT: u32 = 60;
pub const RANKING_FOOTER_HEIGHT: u32 = 50;
pub const RANKING_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Candidates for a draw plus active users who have left the group.
pub struct DrawPool {
    pub pool: Vec<UserId>,
    pub removed: Vec<UserId>,
}

/// Builds the draw pool from active users in iteration order.
///
/// With a known roster the pool is `active ∩ roster − excluded` and users missing from
/// the roster are reported in `removed`. Without one, only exclusions apply.
pub fn select_draw_pool<'a>(
    active_user_ids: impl IntoIterator<Item = &'a str>,
    current_member_ids: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> DrawPool {
    let mut selection = DrawPool::default();
    for user_id in active_user_ids {
        let in_roster = current_member_ids.is_empty() || current_member_ids.contains(user_id);
        if !in_roster {
            selection.removed.push(user_id.to_string());
            continue;
        }
        if !excluded.contains(user_id) {
            selection.pool.push(user_id.to_string());
        }
    }
    selection
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForceMarryReset<Tz: TimeZone> {
    pub reset_at: DateTime<Tz>,
    /// Seconds until `reset_at`; zero or negative once the cooldown is over.
    pub remaining_secs: f64,
}

impl<Tz: TimeZone> ForceMarryReset<Tz> {
    pub fn is_cooling_down(&self) -> bool {
        self.remaining_secs > 0.0
    }
}

/// Cooldown ends at local midnight of the last-use day plus `max(1, cd_days)` days.
///
/// Returns `None` when `last_time` cannot be placed on the calendar.
pub fn compute_force_marry_reset<Tz: TimeZone>(
    last_time: UnixTimestamp,
    now: &DateTime<Tz>,
    cd_days: u32,
) -> Option<ForceMarryReset<Tz>> {
    let last = datetime_from_unix_seconds(last_time, &now.timezone())?;
    let reset_at = midnight_after_days(&last, i64::from(cd_days.max(1)))?;
    let remaining_secs = unix_seconds(&reset_at) - unix_seconds(now);
    Some(ForceMarryReset {
        reset_at,
        remaining_secs,
    })
}

/// Splits a positive remaining duration into whole days, hours, and minutes.
pub fn split_remaining(remaining_secs: f64) -> (u64, u64, u64) {
    let total = remaining_secs.max(0.0) as u64;
    (total / 86_400, (total % 86_400) / 3_600, (total % 3_600) / 60)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// One row of the reverse-ranking board.
pub struct RankingEntry {
    pub uid: UserId,
    pub name: String,
    pub count: usize,
    pub rank: usize,
}

/// Top `top_n` users by hit count with competition ranks (`[3,3,1]` ranks as `[1,1,3]`).
///
/// Ties keep the iteration order of `group_stats`.
pub fn build_rbq_top_ranking(
    group_stats: &BTreeMap<UserId, Vec<UnixTimestamp>>,
    names: &BTreeMap<UserId, String>,
    top_n: usize,
) -> Vec<RankingEntry> {
    let mut entries = group_stats
        .iter()
        .map(|(uid, hits)| RankingEntry {
            uid: uid.clone(),
            name: names
                .get(uid)
                .cloned()
                .unwrap_or_else(|| fallback_user_name(uid)),
            count: hits.len(),
            rank: 0,
        })
        .collect::<Vec<_>>();
    entries.sort_by(|left, right| right.count.cmp(&left.count));
    entries.truncate(top_n);

    let mut current_rank = 1;
    for index in 0..entries.len() {
        if index > 0 && entries[index].count < entries[index - 1].count {
            current_rank = index + 1;
        }
        entries[index].rank = current_rank;
    }
    entries
}

/// Appends the reverse record (partner drew the user) when enabled and the partner has none today.
pub fn maybe_add_other_half_record(
    records: &mut Vec<DrawRecord>,
    user_id: &str,
    user_name: &str,
    partner_id: &str,
    partner_name: &str,
    enabled: bool,
    timestamp: &str,
) -> bool {
    if !enabled {
        return false;
    }
    if records.iter().any(|record| record.user_id == partner_id) {
        return false;
    }
    let mut record = DrawRecord::drawn(partner_id, user_id, user_name, timestamp);
    record.auto_set = true;
    record.auto_set_target_name = Some(partner_name.to_string());
    records.push(record);
    true
}

/// Distinct users appearing on either side of `records`.
pub fn graph_node_count(records: &[DrawRecord]) -> usize {
    records
        .iter()
        .flat_map(|record| [record.user_id.as_str(), record.partner_id.as_str()])
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn graph_clip_height(node_count: usize) -> u32 {
    let extra = node_count.saturating_sub(GRAPH_NODES_BEFORE_GROWTH);
    let extra = u32::try_from(extra).unwrap_or(u32::MAX);
    GRAPH_BASE_HEIGHT.saturating_add(extra.saturating_mul(GRAPH_HEIGHT_PER_EXTRA_NODE))
}

pub fn ranking_clip_height(rows: usize) -> u32 {
    let rows = u32::try_from(rows).unwrap_or(u32::MAX);
    RANKING_HEADER_HEIGHT
        .saturating_add(rows.saturating_mul(RANKING_ROW_HEIGHT))
        .saturating_add(RANKING_FOOTER_HEIGHT)
}

pub fn help_text(daily_limit: usize) -> String {
    format!(
        "===== 🌸 抽老婆帮助 =====\n\
         1. 【抽老婆】：随机抽取今日老婆\n\
         2. 【强娶@某人】或【强娶 @某人】：强行更换今日老婆（有冷却期）\n\
         3. 【我的老婆】：查看今日历史与次数\n\
         4. 【重置记录】：(管理员) 清空数据（强娶记录不会清除）\n\
         5. 【关系图】：查看群友老婆的关系\n\
         6. 【rbq排行】：展示近30天被强娶的次数排行\n\
         当前每日上限：{daily_limit}次\n\
         提示：可在配置开启“关键词触发”，直接发送关键词无需 / 前缀。\n\
         提示：可在配置开启“自动设置对方老婆 / 定时自动撤回”。\n\
         注：仅限30天内发言且当前在群的活跃群友。"
    )
}
