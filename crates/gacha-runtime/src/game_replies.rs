//! User-facing reply texts.

use chrono::{DateTime, NaiveDateTime, TimeZone};
use gacha_gateway::{avatar_url, MessageSegment};
use gacha_store::DrawRecord;

use crate::game_rules::split_remaining;
use crate::inbound_message::GameReply;

pub const GROUP_ONLY_TEXT: &str = "此功能仅在群聊中可用哦~";
pub const EMPTY_POOL_TEXT: &str = "老婆池为空（需有人在30天内发言）。";
pub const NO_DRAW_TODAY_TEXT: &str = "你今天还没有抽过老婆哦~";
pub const MENTION_REQUIRED_TEXT: &str = "请 @ 一个你想强娶的人。";
pub const SELF_MARRY_TEXT: &str = "不能娶自己！";
pub const FORCE_EXCLUDED_TEXT: &str = "该用户在强娶排除列表中，无法被强娶。";
pub const RECORDS_RESET_TEXT: &str = "今日抽取记录已重置！";
pub const COOLDOWN_RESET_TEXT: &str = "✅ 本群强娶冷却时间已重置！现在大家可以再次强娶了。";
pub const NO_COOLDOWN_TEXT: &str = "💡 本群目前没有人在冷却期内。";
pub const EMPTY_RANKING_TEXT: &str = "本群近30天还没有人被强娶过，大家都很有礼貌呢。";
pub const PRIVATE_RANKING_TEXT: &str = "私聊看不了榜单哦~";
pub const RANKING_TITLE: &str = "❤️ 群rbq月榜 ❤️";
pub const DEFAULT_GROUP_NAME: &str = "未命名群聊";

/// Reply for a user who already reached the daily limit; `None` while draws remain.
pub fn daily_limit_reply(
    user_records: &[&DrawRecord],
    user_id: &str,
    daily_limit: usize,
) -> Option<GameReply> {
    if user_records.len() < daily_limit {
        return None;
    }
    if daily_limit == 1 {
        let current = user_records.first()?;
        return Some(GameReply::segments(vec![
            MessageSegment::at(user_id),
            MessageSegment::text(format!(
                " 你今天已经有老婆了哦❤️~\n她是：【{}】\n",
                current.partner_name
            )),
            MessageSegment::image(avatar_url(&current.partner_id)),
        ]));
    }
    Some(GameReply::text(format!(
        "你今天已经抽了{}次老婆了，明天再来吧！",
        user_records.len()
    )))
}

pub fn draw_reply(user_id: &str, partner_id: &str, partner_name: &str, remaining: usize) -> GameReply {
    GameReply::segments(vec![
        MessageSegment::at(user_id),
        MessageSegment::text(format!(" 你的今日老婆是：\n\n【{partner_name}】\n")),
        MessageSegment::image(avatar_url(partner_id)),
        MessageSegment::text(format!("\n请好好对待她哦❤️~ \n剩余抽取次数：{remaining}次")),
    ])
}

pub fn force_marry_reply(user_id: &str, target_id: &str, target_name: &str) -> GameReply {
    GameReply::segments(vec![
        MessageSegment::at(user_id),
        MessageSegment::text(format!(
            " 你今天强娶了【{target_name}】哦❤️~\n请对她好一点哦~。\n"
        )),
        MessageSegment::image(avatar_url(target_id)),
    ])
}

pub fn cooldown_reply<Tz: TimeZone>(reset_at: &DateTime<Tz>, remaining_secs: f64) -> GameReply
where
    Tz::Offset: std::fmt::Display,
{
    let (days, hours, minutes) = split_remaining(remaining_secs);
    GameReply::text(format!(
        "你已经强娶过啦！\n请等待：{days}天{hours}小时{minutes}分后再试。\n(重置时间：{})",
        reset_at.format("%m-%d %H:%M")
    ))
}

fn record_clock_time(timestamp: &str) -> String {
    timestamp
        .parse::<NaiveDateTime>()
        .map(|value| value.format("%H:%M").to_string())
        .unwrap_or_else(|_| "--:--".to_string())
}

pub fn history_reply(user_records: &[&DrawRecord], daily_limit: usize) -> GameReply {
    let mut lines = vec![format!(
        "🌸 你今日的老婆记录 ({}/{daily_limit})：",
        user_records.len()
    )];
    for (index, record) in user_records.iter().enumerate() {
        lines.push(format!(
            "{}. 【{}】 ({})",
            index + 1,
            record.partner_name,
            record_clock_time(&record.timestamp)
        ));
    }
    lines.push(format!(
        "\n剩余次数：{}次",
        daily_limit.saturating_sub(user_records.len())
    ));
    GameReply::text(lines.join("\n"))
}

pub fn missing_template_reply(path: &std::path::Path) -> GameReply {
    GameReply::text(format!("错误：找不到模板文件 {}", path.display()))
}

pub const MISSING_RANKING_TEMPLATE_TEXT: &str = "错误：找不到排行模板 rbq_ranking.html";
