use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::gateway_contract::GroupMember;

/// Mention target meaning "everyone"; never a valid force-marry target.
pub const MENTION_ALL: &str = "all";

static CQ_AT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[CQ:at,qq=(\d+)\]").ok());
static PLAIN_AT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"@(\d{5,12})").ok());

fn first_capture(pattern: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    let regex = pattern.as_ref()?;
    regex
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|matched| matched.as_str().to_string())
}

/// Picks the mentioned user: structured mentions first, then `[CQ:at,qq=N]`, then `@N` (5-12 digits).
pub fn extract_target_id(mentions: &[String], text: &str) -> Option<String> {
    if let Some(mention) = mentions
        .iter()
        .map(|mention| mention.trim())
        .find(|mention| !mention.is_empty())
    {
        return Some(mention.to_string());
    }
    first_capture(&CQ_AT_PATTERN, text).or_else(|| first_capture(&PLAIN_AT_PATTERN, text))
}

/// Display name of `user_id` in `members` (card, then nickname), or `fallback`.
pub fn resolve_member_name(members: &[GroupMember], user_id: &str, fallback: &str) -> String {
    members
        .iter()
        .find(|member| member.user_id == user_id)
        .and_then(GroupMember::display_name)
        .unwrap_or(fallback)
        .to_string()
}

/// `user_id -> display name` for every member; members without a name map to their id.
pub fn member_name_map(members: &[GroupMember]) -> BTreeMap<String, String> {
    members
        .iter()
        .map(|member| {
            let name = member.display_name().unwrap_or(&member.user_id);
            (member.user_id.clone(), name.to_string())
        })
        .collect()
}

/// Placeholder name used when the roster does not know a user.
pub fn fallback_user_name(user_id: &str) -> String {
    format!("用户({user_id})")
}

pub fn avatar_url(user_id: &str) -> String {
    format!("https://q4.qlogo.cn/headimg_dl?dst_uin={user_id}&spec=640")
}
