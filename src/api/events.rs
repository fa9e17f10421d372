use serde::{Deserialize, Serialize};

use crate::api::models::{ConversationKey, GroupId, Recipient, UserId};

pub const MESSAGE_EVENT: &str = "message";

/// Push payload exactly as it travels over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPushEvent {
    pub event_type: String,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A chat message announced over the push channel. It carries no id and no timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPush {
    pub sender_id: UserId,
    pub recipient: Recipient,
    pub content: String,
}

impl ChatPush {
    /// Conversation this push belongs to from the point of view of `me`.
    pub fn conversation_key(&self, me: UserId) -> ConversationKey {
        match self.recipient {
            Recipient::Group(group) => ConversationKey::Group(group),
            Recipient::Contact(receiver) if self.sender_id == me => ConversationKey::Contact(receiver),
            Recipient::Contact(_) => ConversationKey::Contact(self.sender_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Message(ChatPush),
    /// Event types this client does not know yet. Kept as-is, never an error.
    Unknown(RawPushEvent),
}

impl PushEvent {
    pub fn chat(sender_id: UserId, key: ConversationKey, content: impl Into<String>) -> Self {
        PushEvent::Message(ChatPush {
            sender_id,
            recipient: Recipient::from(key),
            content: content.into(),
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            PushEvent::Message(_) => MESSAGE_EVENT,
            PushEvent::Unknown(raw) => &raw.event_type,
        }
    }

    pub fn decode(frame: &str) -> Result<Self, String> {
        let raw: RawPushEvent = serde_json::from_str(frame).map_err(|e| e.to_string())?;
        Self::try_from(raw)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&RawPushEvent::from(self.clone()))
    }
}

impl TryFrom<RawPushEvent> for PushEvent {
    type Error = String;

    fn try_from(raw: RawPushEvent) -> Result<Self, Self::Error> {
        if raw.event_type != MESSAGE_EVENT {
            return Ok(PushEvent::Unknown(raw));
        }
        // group wins when a sender sets both
        let recipient = match (raw.group_id, raw.receiver_id) {
            (Some(group), _) => Recipient::Group(group),
            (None, Some(receiver)) => Recipient::Contact(receiver),
            (None, None) => return Err("message event without receiver_id or group_id".into()),
        };
        let content = raw.content.ok_or_else(|| "message event without content".to_string())?;
        Ok(PushEvent::Message(ChatPush {
            sender_id: raw.user_id,
            recipient,
            content,
        }))
    }
}

impl From<PushEvent> for RawPushEvent {
    fn from(event: PushEvent) -> Self {
        match event {
            PushEvent::Message(push) => RawPushEvent {
                event_type: MESSAGE_EVENT.to_string(),
                user_id: push.sender_id,
                receiver_id: push.recipient.receiver_id(),
                group_id: push.recipient.group_id(),
                content: Some(push.content),
                data: None,
            },
            PushEvent::Unknown(raw) => raw,
        }
    }
}
