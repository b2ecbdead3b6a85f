use anyhow::Result;
use gacha_core::Clock;
use gacha_store::RetentionStore;
use serde_json::{json, Value};

pub fn reset_records(store: &mut RetentionStore, clock: &dyn Clock) -> Result<Value> {
    let dropped = store.daily_records().total_records();
    store.reset_today(clock.today())?;
    Ok(json!({
        "command": "reset-records",
        "date": store.daily_records().date,
        "dropped_records": dropped,
    }))
}

pub fn reset_cooldown(store: &mut RetentionStore, group_id: &str) -> Result<Value> {
    let reset = store.reset_cooldown_for_group(group_id.trim())?;
    Ok(json!({
        "command": "reset-cooldown",
        "group_id": group_id.trim(),
        "reset": reset,
    }))
}

fn ranking_hit_count(store: &RetentionStore) -> usize {
    store
        .ranking_stats()
        .values()
        .flat_map(|group| group.values())
        .map(Vec::len)
        .sum()
}

pub fn clean_ranking(store: &mut RetentionStore, clock: &dyn Clock) -> Result<Value> {
    let before = ranking_hit_count(store);
    store.clean_ranking_stats(clock.now_unix())?;
    Ok(json!({
        "command": "clean-ranking",
        "policy": store.decay_policy().as_str(),
        "hits_before": before,
        "hits_after": ranking_hit_count(store),
    }))
}

/// Per-collection counts, keyed by group.
pub fn inspect(store: &RetentionStore) -> Value {
    let daily = store.daily_records();
    json!({
        "daily_records": {
            "date": daily.date,
            "total": daily.total_records(),
            "groups": daily
                .groups
                .iter()
                .map(|(group_id, group)| (group_id.clone(), group.records.len()))
                .collect::<std::collections::BTreeMap<_, _>>(),
        },
        "active_users": store
            .active_users()
            .iter()
            .map(|(group_id, users)| (group_id.clone(), users.len()))
            .collect::<std::collections::BTreeMap<_, _>>(),
        "cooldowns": store
            .cooldowns()
            .iter()
            .map(|(group_id, users)| (group_id.clone(), users.len()))
            .collect::<std::collections::BTreeMap<_, _>>(),
        "ranking_hits": ranking_hit_count(store),
    })
}
