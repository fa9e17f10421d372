pub mod listeners;
pub mod selector;
pub mod send;
pub mod session;
pub mod store;
pub mod transport;

pub use listeners::{ListenerId, ListenerRegistry};
pub use selector::ConversationSelector;
pub use send::SendPipeline;
pub use session::{ChatSession, SessionOptions, next_refresh};
pub use store::{ConversationStore, EchoPolicy};
pub use transport::{ConnectionState, Transport, TransportConfig};
