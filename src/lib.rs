//! Client core for the IM-TT chat service: one live push connection per
//! session, per-conversation timelines merged from REST history and push
//! events, and the dual-write send path.

pub mod api;
pub mod app;
pub mod auth;
pub mod chat;
pub mod error;
pub mod storage;
pub mod utils;

pub use api::client::{ApiClient, MessageApi};
pub use api::events::PushEvent;
pub use api::models::{ConversationKey, Message, MessageId, Session, User};
pub use chat::{ChatSession, ConnectionState, ConversationStore, EchoPolicy, SessionOptions, Transport};
pub use error::{ApiError, ChatError, ConfigError, TransportError};
