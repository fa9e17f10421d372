use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = i64;
pub type GroupId = i64;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    pub owner_id: UserId,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GroupMember {
    pub id: i64,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: String,
    pub joined_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// An authenticated session: who we are and the bearer token proving it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub token: String,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }
}

/// Identity of a conversation. Two keys are the same conversation iff they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Contact(UserId),
    Group(GroupId),
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::Contact(id) => write!(f, "contact_{id}"),
            ConversationKey::Group(id) => write!(f, "group_{id}"),
        }
    }
}

/// Where a message is addressed. A message goes to exactly one of a contact or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Contact(UserId),
    Group(GroupId),
}

impl Recipient {
    pub fn receiver_id(&self) -> Option<UserId> {
        match self {
            Recipient::Contact(id) => Some(*id),
            Recipient::Group(_) => None,
        }
    }

    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Recipient::Group(id) => Some(*id),
            Recipient::Contact(_) => None,
        }
    }
}

impl From<ConversationKey> for Recipient {
    fn from(key: ConversationKey) -> Self {
        match key {
            ConversationKey::Contact(id) => Recipient::Contact(id),
            ConversationKey::Group(id) => Recipient::Group(id),
        }
    }
}

/// Server-assigned ids are integers; messages synthesized from push events get a local UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Server(i64),
    Provisional(Uuid),
}

impl MessageId {
    pub fn provisional() -> Self {
        MessageId::Provisional(Uuid::new_v4())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, MessageId::Provisional(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MessageWire", into = "MessageWire")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient: Recipient,
    pub content: String,
    pub message_type: String,
    pub created_at: NaiveDateTime,
    pub is_read: bool,
}

impl Message {
    pub fn receiver_id(&self) -> Option<UserId> {
        self.recipient.receiver_id()
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.recipient.group_id()
    }
}

// Flat shape used on the wire. At least one of receiver_id and group_id is set.
#[derive(Debug, Serialize, Deserialize)]
struct MessageWire {
    id: MessageId,
    sender_id: UserId,
    #[serde(default)]
    receiver_id: Option<UserId>,
    #[serde(default)]
    group_id: Option<GroupId>,
    content: String,
    #[serde(default = "default_message_type")]
    message_type: String,
    created_at: NaiveDateTime,
    #[serde(default)]
    is_read: bool,
}

pub(crate) fn default_message_type() -> String {
    "text".to_string()
}

impl TryFrom<MessageWire> for Message {
    type Error = String;

    fn try_from(wire: MessageWire) -> Result<Self, Self::Error> {
        // group wins when a row carries both, same as push events
        let recipient = match (wire.group_id, wire.receiver_id) {
            (Some(group), _) => Recipient::Group(group),
            (None, Some(receiver)) => Recipient::Contact(receiver),
            (None, None) => {
                return Err(format!("message {:?} has neither receiver_id nor group_id", wire.id));
            }
        };
        Ok(Message {
            id: wire.id,
            sender_id: wire.sender_id,
            recipient,
            content: wire.content,
            message_type: wire.message_type,
            created_at: wire.created_at,
            is_read: wire.is_read,
        })
    }
}

impl From<Message> for MessageWire {
    fn from(msg: Message) -> Self {
        MessageWire {
            id: msg.id,
            sender_id: msg.sender_id,
            receiver_id: msg.recipient.receiver_id(),
            group_id: msg.recipient.group_id(),
            content: msg.content,
            message_type: msg.message_type,
            created_at: msg.created_at,
            is_read: msg.is_read,
        }
    }
}

/// Body of `POST /messages/send`. Only constructible from a conversation key,
/// so exactly one of `receiver_id`/`group_id` is ever set.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SendMessageRequest {
    #[serde(skip)]
    key: ConversationKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    receiver_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<GroupId>,
    content: String,
    message_type: String,
}

impl SendMessageRequest {
    pub fn text(key: ConversationKey, content: impl Into<String>) -> Self {
        let recipient = Recipient::from(key);
        Self {
            key,
            receiver_id: recipient.receiver_id(),
            group_id: recipient.group_id(),
            content: content.into(),
            message_type: default_message_type(),
        }
    }

    pub fn key(&self) -> ConversationKey {
        self.key
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct JoinGroupRequest {
    pub group_id: GroupId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_message() {
        let json = r#"{"id":101,"sender_id":1,"receiver_id":2,"group_id":null,"content":"hello",
            "message_type":"text","created_at":"2024-05-01T10:00:00","is_read":false}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, MessageId::Server(101));
        assert_eq!(msg.recipient, Recipient::Contact(2));
        assert_eq!(msg.group_id(), None);
    }

    #[test]
    fn message_with_both_recipients_belongs_to_the_group() {
        let json = r#"{"id":1,"sender_id":1,"receiver_id":2,"group_id":3,"content":"x",
            "message_type":"text","created_at":"2024-05-01T10:00:00","is_read":false}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.recipient, Recipient::Group(3));
        assert_eq!(msg.receiver_id(), None);
    }

    #[test]
    fn rejects_message_without_recipient() {
        let json = r#"{"id":1,"sender_id":1,"content":"x",
            "message_type":"text","created_at":"2024-05-01T10:00:00","is_read":false}"#;
        assert!(serde_json::from_str::<Message>(json).is_err());
    }

    #[test]
    fn send_request_sets_only_the_key_side() {
        let v = serde_json::to_value(SendMessageRequest::text(ConversationKey::Group(7), "hi")).unwrap();
        assert_eq!(v["group_id"], 7);
        assert!(v.get("receiver_id").is_none());
        assert_eq!(v["message_type"], "text");
    }
}
