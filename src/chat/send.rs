use log::{debug, info};
use std::sync::Arc;

use crate::api::client::MessageApi;
use crate::api::events::PushEvent;
use crate::api::models::{ConversationKey, Message, SendMessageRequest, UserId};
use crate::chat::store::ConversationStore;
use crate::chat::transport::Transport;
use crate::error::ApiError;

/// Outgoing messages: REST first, then a best-effort push to other holders of the session.
pub struct SendPipeline {
    me: UserId,
    api: Arc<dyn MessageApi>,
    store: Arc<ConversationStore>,
    transport: Arc<Transport>,
}

impl SendPipeline {
    pub fn new(me: UserId, api: Arc<dyn MessageApi>, store: Arc<ConversationStore>, transport: Arc<Transport>) -> Self {
        Self { me, api, store, transport }
    }

    /// Returns `Ok(None)` without touching the network when `content` is blank.
    /// A REST failure is handed back untouched: nothing is stored, nothing is
    /// pushed, nothing is retried.
    pub async fn send(&self, key: ConversationKey, content: &str) -> Result<Option<Message>, ApiError> {
        let content = content.trim();
        if content.is_empty() {
            debug!("ignoring empty message for {}", key);
            return Ok(None);
        }

        let request = SendMessageRequest::text(key, content);
        let message = self.api.send_message(&request).await?;
        info!("message {:?} stored for {}", message.id, key);
        self.store.append(key, message.clone());
        self.transport.send(&PushEvent::chat(self.me, key, request.content()));
        Ok(Some(message))
    }
}
