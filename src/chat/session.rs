use log::{info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::api::client::MessageApi;
use crate::api::models::{ConversationKey, Message, Session, User};
use crate::chat::listeners::ListenerId;
use crate::chat::selector::ConversationSelector;
use crate::chat::send::SendPipeline;
use crate::chat::store::{ConversationStore, EchoPolicy};
use crate::chat::transport::{Transport, TransportConfig};
use crate::error::ChatError;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub transport: TransportConfig,
    pub echo_policy: EchoPolicy,
}

/// Everything that lives for exactly one logged-in session: its push
/// connection, its timelines, its focus and its send path.
pub struct ChatSession {
    session: Session,
    transport: Arc<Transport>,
    store: Arc<ConversationStore>,
    selector: Arc<ConversationSelector>,
    sender: SendPipeline,
    refresh: broadcast::Sender<ConversationKey>,
    listener: ListenerId,
}

impl ChatSession {
    pub fn new(session: Session, api: Arc<dyn MessageApi>, options: SessionOptions) -> Self {
        let me = session.user_id();
        let transport = Arc::new(Transport::new(options.transport));
        let store = Arc::new(ConversationStore::new(me, options.echo_policy));
        let selector = Arc::new(ConversationSelector::new(api.clone(), store.clone()));
        let sender = SendPipeline::new(me, api, store.clone(), transport.clone());
        let (refresh, _) = broadcast::channel(64);

        let listener = {
            let store = store.clone();
            let selector = selector.clone();
            let refresh = refresh.clone();
            transport.add_listener(move |event| {
                if let Some(key) = store.merge_push(event) {
                    if selector.is_live(key) {
                        let _ = refresh.send(key);
                    }
                }
            })
        };

        Self { session, transport, store, selector, sender, refresh, listener }
    }

    /// Bring the push connection up.
    pub fn start(&self) {
        info!("starting session for user {}", self.session.user_id());
        self.transport.connect(&self.session.token);
    }

    /// Tear the session down for logout. The object is inert afterwards.
    pub fn shutdown(&self) {
        self.transport.disconnect();
        self.transport.remove_listener(self.listener);
        self.selector.clear();
        self.store.clear();
        info!("session for user {} shut down", self.session.user_id());
    }

    pub async fn open(&self, key: ConversationKey) -> Result<Vec<Message>, ChatError> {
        Ok(self.selector.set_active(key).await?)
    }

    /// Send to the focused conversation.
    pub async fn send(&self, content: &str) -> Result<Option<Message>, ChatError> {
        let key = self.selector.active().ok_or(ChatError::NoActiveConversation)?;
        Ok(self.sender.send(key, content).await?)
    }

    pub fn timeline(&self, key: ConversationKey) -> Vec<Message> {
        self.store.timeline(key)
    }

    /// Keys of the focused conversation whenever a push landed in it. Read it
    /// with [`next_refresh`] to ride out bursts.
    pub fn subscribe_refresh(&self) -> broadcast::Receiver<ConversationKey> {
        self.refresh.subscribe()
    }

    pub fn user(&self) -> &User {
        &self.session.user
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn selector(&self) -> &ConversationSelector {
        &self.selector
    }

    pub fn sender(&self) -> &SendPipeline {
        &self.sender
    }
}

/// Next refresh notification. A receiver that fell behind skips ahead to the
/// oldest key still buffered; `None` only once the session is gone.
pub async fn next_refresh(refresh: &mut broadcast::Receiver<ConversationKey>) -> Option<ConversationKey> {
    loop {
        match refresh.recv().await {
            Ok(key) => return Some(key),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("refresh listener lagged, skipped {} notification(s)", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
