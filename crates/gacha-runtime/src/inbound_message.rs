use gacha_gateway::{deserialize_lenient_id, MessageSegment, MessageTarget};
use serde::{Deserialize, Deserializer, Serialize};

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "deserialize_lenient_id")] String);

    let wrapped = Option::<Wrapped>::deserialize(deserializer)?;
    Ok(wrapped
        .map(|Wrapped(id)| id)
        .filter(|id| !id.is_empty()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
/// A chat message as the host hands it to the game.
pub struct InboundMessage {
    #[serde(default)]
    pub platform: String,
    /// `None` for private chats.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub group_id: Option<String>,
    #[serde(deserialize_with = "deserialize_lenient_id")]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub self_id: String,
    #[serde(default)]
    pub text: String,
    /// User ids of structured mention segments, in message order.
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
    /// Set when the host already routed the message through its wake-word or mention command path.
    #[serde(default)]
    pub is_wake_command: bool,
}

impl InboundMessage {
    pub fn group(group_id: impl Into<String>, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            sender_id: sender_id.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn is_private(&self) -> bool {
        self.group_id.is_none()
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn reply_target(&self) -> MessageTarget {
        match &self.group_id {
            Some(group_id) => MessageTarget::group(group_id.clone()),
            None => MessageTarget::private(self.sender_id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// A reply handed back to the host for delivery.
pub enum GameReply {
    Text { text: String },
    Segments { segments: Vec<MessageSegment> },
    Image { url: String },
}

impl GameReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn segments(segments: Vec<MessageSegment>) -> Self {
        Self::Segments { segments }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }

    pub fn into_segments(self) -> Vec<MessageSegment> {
        match self {
            Self::Text { text } => vec![MessageSegment::text(text)],
            Self::Segments { segments } => segments,
            Self::Image { url } => vec![MessageSegment::image(url)],
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unit_inbound_message_accepts_numeric_ids_and_defaults() {
        let message: InboundMessage = serde_json::from_value(json!({
            "group_id": 100,
            "sender_id": 200,
            "self_id": "999",
            "text": "抽老婆",
        }))
        .expect("message");
        assert_eq!(message.group_id(), Some("100"));
        assert_eq!(message.sender_id, "200");
        assert!(!message.is_admin);
        assert_eq!(message.reply_target(), MessageTarget::group("100"));
    }

    #[test]
    fn unit_blank_or_missing_group_means_private() {
        let message: InboundMessage =
            serde_json::from_value(json!({"group_id": "", "sender_id": "1"})).expect("message");
        assert!(message.is_private());
        let message: InboundMessage =
            serde_json::from_value(json!({"sender_id": "1"})).expect("message");
        assert_eq!(message.reply_target(), MessageTarget::private("1"));
    }

    #[test]
    fn unit_reply_flattens_into_segments() {
        assert_eq!(
            GameReply::text("hi").into_segments(),
            vec![MessageSegment::text("hi")]
        );
        assert_eq!(
            GameReply::image("u").into_segments(),
            vec![MessageSegment::image("u")]
        );
    }
}
