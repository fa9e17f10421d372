use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::api::events::PushEvent;
use crate::api::models::{ConversationKey, Message, MessageId, UserId, default_message_type};

/// What to do with a push event that announces a message we sent ourselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// Store it like any other push. The sender then sees both the REST copy and the echo.
    #[default]
    KeepBoth,
    /// Ignore pushes authored by the session user; the REST write already recorded them.
    DropOwnEcho,
}

/// Per-conversation timelines for one session.
///
/// Two write paths feed it: `replace_from_fetch` with authoritative history from
/// the REST API, and `merge_push`/`append` with incremental messages. No attempt
/// is made to reconcile the two beyond `EchoPolicy`; a fetch landing after a push
/// simply overwrites it.
pub struct ConversationStore {
    me: UserId,
    echo_policy: EchoPolicy,
    timelines: Mutex<HashMap<ConversationKey, Vec<Message>>>,
}

impl ConversationStore {
    pub fn new(me: UserId, echo_policy: EchoPolicy) -> Self {
        Self { me, echo_policy, timelines: Mutex::new(HashMap::new()) }
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn replace_from_fetch(&self, key: ConversationKey, messages: Vec<Message>) {
        debug!("{}: timeline replaced with {} fetched message(s)", key, messages.len());
        self.lock().insert(key, messages);
    }

    pub fn append(&self, key: ConversationKey, message: Message) {
        self.lock().entry(key).or_default().push(message);
    }

    /// Record a push event as a provisional message. Returns the conversation it
    /// landed in, or `None` when the event was not stored.
    pub fn merge_push(&self, event: &PushEvent) -> Option<ConversationKey> {
        let push = match event {
            PushEvent::Message(push) => push,
            PushEvent::Unknown(raw) => {
                debug!("ignoring {} event from user {}", raw.event_type, raw.user_id);
                return None;
            }
        };
        if self.echo_policy == EchoPolicy::DropOwnEcho && push.sender_id == self.me {
            debug!("dropping own echo");
            return None;
        }

        let key = push.conversation_key(self.me);
        let message = Message {
            id: MessageId::provisional(),
            sender_id: push.sender_id,
            recipient: push.recipient,
            content: push.content.clone(),
            message_type: default_message_type(),
            created_at: Utc::now().naive_utc(),
            is_read: false,
        };
        self.append(key, message);
        Some(key)
    }

    pub fn timeline(&self, key: ConversationKey) -> Vec<Message> {
        self.lock().get(&key).cloned().unwrap_or_default()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationKey, Vec<Message>>> {
        self.timelines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
