use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::keyword_router::{KeywordRoute, KeywordRouter, PermissionLevel};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
/// Enumerates the game actions a keyword route can dispatch to.
pub enum GameAction {
    DrawWife,
    ShowHistory,
    ForceMarry,
    ShowGraph,
    RbqRanking,
    ShowHelp,
    ResetRecords,
    ResetForceCd,
}

impl GameAction {
    pub const ALL: [GameAction; 8] = [
        Self::DrawWife,
        Self::ShowHistory,
        Self::ForceMarry,
        Self::ShowGraph,
        Self::RbqRanking,
        Self::ShowHelp,
        Self::ResetRecords,
        Self::ResetForceCd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DrawWife => "draw_wife",
            Self::ShowHistory => "show_history",
            Self::ForceMarry => "force_marry",
            Self::ShowGraph => "show_graph",
            Self::RbqRanking => "rbq_ranking",
            Self::ShowHelp => "show_help",
            Self::ResetRecords => "reset_records",
            Self::ResetForceCd => "reset_force_cd",
        }
    }
}

impl std::fmt::Display for GameAction {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for GameAction {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        let normalized = raw.trim();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("unknown game action '{normalized}'"))
    }
}

const DEFAULT_KEYWORD_ROUTE_TABLE: [(&str, GameAction, PermissionLevel); 12] = [
    ("今日老婆", GameAction::DrawWife, PermissionLevel::Member),
    ("抽老婆", GameAction::DrawWife, PermissionLevel::Member),
    ("我的老婆", GameAction::ShowHistory, PermissionLevel::Member),
    ("抽取历史", GameAction::ShowHistory, PermissionLevel::Member),
    ("强娶", GameAction::ForceMarry, PermissionLevel::Member),
    ("关系图", GameAction::ShowGraph, PermissionLevel::Member),
    ("羁绊图谱", GameAction::ShowGraph, PermissionLevel::Member),
    ("rbq排行", GameAction::RbqRanking, PermissionLevel::Member),
    ("抽老婆帮助", GameAction::ShowHelp, PermissionLevel::Member),
    ("老婆插件帮助", GameAction::ShowHelp, PermissionLevel::Member),
    ("重置记录", GameAction::ResetRecords, PermissionLevel::Admin),
    ("重置强娶时间", GameAction::ResetForceCd, PermissionLevel::Admin),
];

/// The game's built-in route table, in declaration order.
pub fn default_keyword_routes() -> Vec<KeywordRoute> {
    DEFAULT_KEYWORD_ROUTE_TABLE
        .iter()
        .map(|(keyword, action, permission)| KeywordRoute::new(*keyword, *action, *permission))
        .collect()
}

pub fn default_keyword_router() -> KeywordRouter {
    KeywordRouter::new(default_keyword_routes())
}
