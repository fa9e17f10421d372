use log::info;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::client::MessageApi;
use crate::api::models::{ConversationKey, Message};
use crate::chat::store::ConversationStore;
use crate::error::ApiError;

/// Tracks which conversation the user is looking at.
pub struct ConversationSelector {
    api: Arc<dyn MessageApi>,
    store: Arc<ConversationStore>,
    active: Mutex<Option<ConversationKey>>,
}

impl ConversationSelector {
    pub fn new(api: Arc<dyn MessageApi>, store: Arc<ConversationStore>) -> Self {
        Self { api, store, active: Mutex::new(None) }
    }

    /// Focus `key` and reload its history. Focus moves even when the fetch fails;
    /// the previously stored timeline is kept in that case.
    pub async fn set_active(&self, key: ConversationKey) -> Result<Vec<Message>, ApiError> {
        *self.lock() = Some(key);
        info!("opening {}", key);
        let messages = self.api.list_messages(key).await?;
        self.store.replace_from_fetch(key, messages.clone());
        Ok(messages)
    }

    pub fn active(&self) -> Option<ConversationKey> {
        *self.lock()
    }

    /// Whether activity in `key` needs an immediate refresh.
    pub fn is_live(&self, key: ConversationKey) -> bool {
        self.active() == Some(key)
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<ConversationKey>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
