//! Keyword route matching with length-priority and command-boundary rules.

use std::cmp::Reverse;
pub use gacha_core::MatchMode;
use serde::{Deserialize, Serialize};

use crate::keyword_routes::GameAction;

/// Characters that mark a message as an explicit command invocation.
pub const COMMAND_PREFIXES: [char; 3] = ['/', '!', '！'];

const MENTION_MARKERS: [char; 3] = ['@', '＠', '['];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// Permission a sender needs before a route may fire.
pub enum PermissionLevel {
    #[default]
    Member,
    Admin,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Maps a keyword to a game action and the permission it requires.
pub struct KeywordRoute {
    pub keyword: String,
    pub action: GameAction,
    #[serde(default)]
    pub permission: PermissionLevel,
}

impl KeywordRoute {
    pub fn new(keyword: impl Into<String>, action: GameAction, permission: PermissionLevel) -> Self {
        Self {
            keyword: keyword.into(),
            action,
            permission,
        }
    }

    pub fn member(keyword: impl Into<String>, action: GameAction) -> Self {
        Self::new(keyword, action, PermissionLevel::Member)
    }

    fn keyword_len(&self) -> usize {
        self.keyword.chars().count()
    }
}

#[derive(Debug, Clone)]
/// Immutable route table plus its cached length-priority order.
pub struct KeywordRouter {
    routes: Vec<KeywordRoute>,
    by_keyword_len_desc: Vec<usize>,
}

impl KeywordRouter {
    /// Builds a router; routes whose keyword is blank are dropped since they would match everything.
    pub fn new(routes: Vec<KeywordRoute>) -> Self {
        let routes = routes
            .into_iter()
            .filter(|route| !route.keyword.trim().is_empty())
            .collect::<Vec<_>>();
        let mut by_keyword_len_desc = (0..routes.len()).collect::<Vec<_>>();
        // Stable sort: table order breaks ties between equally long keywords.
        by_keyword_len_desc.sort_by_key(|index| Reverse(routes[*index].keyword_len()));
        Self {
            routes,
            by_keyword_len_desc,
        }
    }

    pub fn routes(&self) -> &[KeywordRoute] {
        &self.routes
    }

    pub fn routes_by_priority(&self) -> impl Iterator<Item = &KeywordRoute> {
        self.by_keyword_len_desc
            .iter()
            .map(move |index| &self.routes[*index])
    }

    /// Matches trimmed message text against the table using `mode`.
    pub fn match_route(&self, message: &str, mode: MatchMode) -> Option<&KeywordRoute> {
        let text = message.trim();
        if text.is_empty() {
            return None;
        }
        if mode.uses_length_priority() {
            self.routes_by_priority()
                .find(|route| mode.matches(text, &route.keyword))
        } else {
            self.routes
                .iter()
                .find(|route| mode.matches(text, &route.keyword))
        }
    }

    /// Matches command syntax (`/强娶 @123`, `强娶@123`) regardless of the keyword match mode.
    ///
    /// The keyword must end the text or be followed by whitespace or a mention marker,
    /// so `强娶别人` does not fire the `强娶` route.
    pub fn match_command(&self, message: &str) -> Option<&KeywordRoute> {
        let text = strip_command_prefix(message);
        if text.is_empty() {
            return None;
        }
        self.routes_by_priority().find(|route| {
            text.strip_prefix(route.keyword.as_str())
                .is_some_and(has_command_boundary)
        })
    }
}

/// Trims the message, then removes leading command prefixes and the whitespace after them.
pub fn strip_command_prefix(message: &str) -> &str {
    message
        .trim()
        .trim_start_matches(COMMAND_PREFIXES)
        .trim_start()
}

/// True when the left-trimmed message starts with one of [`COMMAND_PREFIXES`].
pub fn starts_with_command_prefix(message: &str) -> bool {
    message.trim_start().starts_with(COMMAND_PREFIXES)
}

fn has_command_boundary(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(next) => next.is_whitespace() || MENTION_MARKERS.contains(&next),
    }
}
