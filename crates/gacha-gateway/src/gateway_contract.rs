use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Platform message id as returned by a send; opaque to the game.
pub type MessageId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Enumerates supported `MessageTarget` values.
pub enum MessageTarget {
    Group { group_id: String },
    Private { user_id: String },
}

impl MessageTarget {
    pub fn group(group_id: impl Into<String>) -> Self {
        Self::Group {
            group_id: group_id.into(),
        }
    }

    pub fn private(user_id: impl Into<String>) -> Self {
        Self::Private {
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group { group_id } => write!(f, "group:{group_id}"),
            Self::Private { user_id } => write!(f, "private:{user_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One piece of an outbound message.
pub enum MessageSegment {
    At { user_id: String },
    Text { text: String },
    Image { url: String },
}

impl MessageSegment {
    pub fn at(user_id: impl Into<String>) -> Self {
        Self::At {
            user_id: user_id.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }
}

/// Accepts ids encoded either as JSON strings or JSON numbers.
pub fn deserialize_lenient_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(raw) => Ok(raw.trim().to_string()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
/// Roster entry of a group.
pub struct GroupMember {
    #[serde(deserialize_with = "deserialize_lenient_id")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl GroupMember {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_card(mut self, card: impl Into<String>) -> Self {
        self.card = Some(card.into());
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Group card, then nickname; blank values do not count.
    pub fn display_name(&self) -> Option<&str> {
        [self.card.as_deref(), self.nickname.as_deref()]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupInfo {
    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Screenshot region, in CSS pixels from the page origin.
pub struct ClipRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ClipRect {
    pub fn from_origin(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `RenderOptions` used by render services.
pub struct RenderOptions {
    pub format: ImageFormat,
    pub full_page: bool,
    pub clip: ClipRect,
}

impl RenderOptions {
    pub fn png_clip(width: u32, height: u32) -> Self {
        Self {
            format: ImageFormat::Png,
            full_page: false,
            clip: ClipRect::from_origin(width, height),
        }
    }
}

#[async_trait]
/// Trait contract for the chat platform the game talks through.
pub trait MessagingGateway: Send + Sync {
    /// Sends `segments`; returns the platform message id when the platform reports one.
    async fn send_message(
        &self,
        target: &MessageTarget,
        segments: &[MessageSegment],
    ) -> Result<Option<MessageId>>;

    async fn fetch_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>>;

    async fn fetch_group_info(&self, group_id: &str) -> Result<GroupInfo>;

    async fn delete_message(&self, message_id: &str) -> Result<()>;
}

#[async_trait]
/// Trait contract for HTML-to-image rendering.
pub trait RenderService: Send + Sync {
    /// Renders `template` (HTML source) with `context`; returns the image URL.
    async fn render(&self, template: &str, context: &Value, options: &RenderOptions)
        -> Result<String>;
}
