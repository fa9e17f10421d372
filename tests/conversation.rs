use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::{SinkExt, StreamExt};
use imtt_client::api::models::{ConversationKey, Message, MessageId, Recipient, SendMessageRequest, Session, User};
use imtt_client::chat::{
    ChatSession, ConnectionState, ConversationSelector, ConversationStore, EchoPolicy, SendPipeline, SessionOptions,
    Transport, TransportConfig,
};
use imtt_client::{ApiError, ChatError, MessageApi};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

const PATIENCE: Duration = Duration::from_secs(5);
const ALICE: i64 = 1;
const BOB: i64 = 2;
const CAROL: i64 = 3;

/// In-memory stand-in for the REST API.
#[derive(Default)]
struct FakeApi {
    history: Mutex<HashMap<ConversationKey, Vec<Message>>>,
    sent: Mutex<Vec<SendMessageRequest>>,
    next_id: AtomicI64,
    reject_sends: bool,
}

impl FakeApi {
    fn with_next_id(id: i64) -> Self {
        Self { next_id: AtomicI64::new(id), ..Default::default() }
    }

    fn rejecting() -> Self {
        Self { reject_sends: true, ..Default::default() }
    }

    fn sent(&self) -> Vec<SendMessageRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageApi for FakeApi {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ApiError> {
        self.sent.lock().unwrap().push(request.clone());
        if self.reject_sends {
            return Err(ApiError::Request { status: 500, message: "Failed to send message".into() });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(message(id, ALICE, request.key(), request.content()))
    }

    async fn list_messages(&self, key: ConversationKey) -> Result<Vec<Message>, ApiError> {
        Ok(self.history.lock().unwrap().get(&key).cloned().unwrap_or_default())
    }
}

fn message(id: i64, sender_id: i64, key: ConversationKey, content: &str) -> Message {
    Message {
        id: MessageId::Server(id),
        sender_id,
        recipient: Recipient::from(key),
        content: content.to_string(),
        message_type: "text".to_string(),
        created_at: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(10, 0, 0).unwrap(),
        is_read: false,
    }
}

fn offline_transport() -> Arc<Transport> {
    Arc::new(Transport::new(TransportConfig::new(Url::parse("ws://127.0.0.1:9/api/ws").unwrap())))
}

fn alice() -> Session {
    Session {
        user: User {
            id: ALICE,
            username: "alice".into(),
            email: "alice@example.com".into(),
            avatar: None,
            status: "online".into(),
            created_at: None,
            updated_at: None,
        },
        token: "alice-token".into(),
    }
}

#[tokio::test]
async fn selecting_a_conversation_replaces_its_timeline() {
    let api = Arc::new(FakeApi::default());
    let key = ConversationKey::Contact(BOB);
    let history = vec![message(1, BOB, ConversationKey::Contact(ALICE), "hey"), message(2, ALICE, key, "hi bob")];
    api.history.lock().unwrap().insert(key, history.clone());

    let store = Arc::new(ConversationStore::new(ALICE, EchoPolicy::KeepBoth));
    store.append(key, message(99, BOB, key, "stale"));
    let selector = ConversationSelector::new(api, store.clone());

    assert_eq!(selector.set_active(key).await.unwrap(), history);
    assert_eq!(store.timeline(key), history);
    assert!(selector.is_live(key));
    assert!(!selector.is_live(ConversationKey::Group(BOB)));
}

#[tokio::test]
async fn send_appends_the_server_copy() {
    let api = Arc::new(FakeApi::with_next_id(101));
    let store = Arc::new(ConversationStore::new(ALICE, EchoPolicy::KeepBoth));
    let pipeline = SendPipeline::new(ALICE, api.clone(), store.clone(), offline_transport());
    let key = ConversationKey::Contact(BOB);

    let sent = pipeline.send(key, "  hello  ").await.unwrap().unwrap();
    assert_eq!(sent.id, MessageId::Server(101));
    assert_eq!(api.sent()[0].content(), "hello");
    let timeline = store.timeline(key);
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].id, MessageId::Server(101));
}

#[tokio::test]
async fn blank_send_issues_no_request() {
    let api = Arc::new(FakeApi::default());
    let store = Arc::new(ConversationStore::new(ALICE, EchoPolicy::KeepBoth));
    let pipeline = SendPipeline::new(ALICE, api.clone(), store.clone(), offline_transport());

    assert!(pipeline.send(ConversationKey::Group(4), " \n\t ").await.unwrap().is_none());
    assert!(api.sent().is_empty());
}

#[tokio::test]
async fn failed_send_stores_nothing() {
    let api = Arc::new(FakeApi::rejecting());
    let store = Arc::new(ConversationStore::new(ALICE, EchoPolicy::KeepBoth));
    let pipeline = SendPipeline::new(ALICE, api.clone(), store.clone(), offline_transport());
    let key = ConversationKey::Group(4);

    let err = pipeline.send(key, "hello").await.unwrap_err();
    assert!(matches!(err, ApiError::Request { status: 500, .. }));
    assert!(store.timeline(key).is_empty());
    assert_eq!(api.sent().len(), 1, "no retry expected");
}

#[tokio::test]
async fn send_without_focus_is_rejected() {
    let session = ChatSession::new(
        alice(),
        Arc::new(FakeApi::default()),
        SessionOptions {
            transport: TransportConfig::new(Url::parse("ws://127.0.0.1:9/api/ws").unwrap()),
            echo_policy: EchoPolicy::KeepBoth,
        },
    );
    assert!(matches!(session.send("hi").await, Err(ChatError::NoActiveConversation)));
}

#[tokio::test]
async fn live_session_merges_pushes_and_refreshes_the_active_conversation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Url::parse(&format!("ws://{}/api/ws", listener.local_addr().unwrap())).unwrap();
    let api = Arc::new(FakeApi::with_next_id(101));
    let session = ChatSession::new(
        alice(),
        api.clone(),
        SessionOptions {
            transport: TransportConfig { endpoint, reconnect_delay: Duration::from_millis(100) },
            echo_policy: EchoPolicy::KeepBoth,
        },
    );
    let mut refresh = session.subscribe_refresh();
    session.start();

    let (tcp, _) = timeout(PATIENCE, listener.accept()).await.unwrap().unwrap();
    let mut server = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let mut state = session.transport().watch_state();
    timeout(PATIENCE, state.wait_for(|s| *s == ConnectionState::Connected)).await.unwrap().unwrap();

    let bob = ConversationKey::Contact(BOB);
    session.open(bob).await.unwrap();
    let sent = session.send("hello").await.unwrap().unwrap();
    assert_eq!(sent.id, MessageId::Server(101));
    assert_eq!(session.timeline(bob).len(), 1);

    // the push notification for other holders of the session
    let frame = timeout(PATIENCE, server.next()).await.unwrap().unwrap().unwrap();
    let pushed: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(pushed["event_type"], "message");
    assert_eq!(pushed["user_id"], ALICE);
    assert_eq!(pushed["receiver_id"], BOB);
    assert_eq!(pushed["content"], "hello");

    // carol writes while alice looks at bob: stored, no refresh
    let from_carol = format!(r#"{{"event_type":"message","user_id":{CAROL},"receiver_id":{ALICE},"content":"psst"}}"#);
    server.send(WsMessage::Text(from_carol)).await.unwrap();
    // an unknown event changes nothing
    server.send(WsMessage::Text(format!(r#"{{"event_type":"typing","user_id":{BOB}}}"#))).await.unwrap();
    // our own echo comes back and is kept alongside the REST copy
    server.send(WsMessage::Text(frame.to_text().unwrap().to_string())).await.unwrap();

    assert_eq!(timeout(PATIENCE, refresh.recv()).await.unwrap().unwrap(), bob);
    let timeline = session.timeline(bob);
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].id, MessageId::Server(101));
    assert!(timeline[1].id.is_provisional());
    assert_eq!(timeline[1].content, "hello");

    let carol = session.timeline(ConversationKey::Contact(CAROL));
    assert_eq!(carol.len(), 1);
    assert_eq!(carol[0].content, "psst");

    session.shutdown();
    assert_eq!(session.transport().state(), ConnectionState::Disconnected);
    assert!(session.timeline(bob).is_empty());
    assert_eq!(session.selector().active(), None);
}
