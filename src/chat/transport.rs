//! The live push connection of a session.
//!
//! Each `connect` spawns one supervisor task owning the socket, the outbound
//! queue and the reconnect timer. The task runs the state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting -> ...
//! ```
//!
//! until `disconnect` (or a newer `connect`) tells it to stop. Every state write
//! carries the generation of the `connect` call that spawned the task, so a
//! superseded task can never clobber the state of its successor.

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::api::events::PushEvent;
use crate::chat::listeners::{ListenerId, ListenerRegistry};
use crate::error::TransportError;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Push endpoint without credentials, e.g. `ws://localhost:8080/api/ws`.
    pub endpoint: Url,
    pub reconnect_delay: Duration,
}

impl TransportConfig {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint, reconnect_delay: DEFAULT_RECONNECT_DELAY }
    }
}

struct Shared {
    listeners: ListenerRegistry,
    state: watch::Sender<ConnectionState>,
    errors: broadcast::Sender<TransportError>,
    generation: AtomicU64,
}

impl Shared {
    /// Start a new generation and move to `state`. Returns the new generation.
    fn begin(&self, state: ConnectionState) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|current| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = state;
        });
        generation
    }

    fn set_state(&self, generation: u64, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation || *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn report(&self, err: TransportError) {
        warn!("{}", err);
        let _ = self.errors.send(err);
    }

    fn deliver(&self, frame: &str) {
        match PushEvent::decode(frame) {
            Ok(event) => {
                let delivered = self.listeners.dispatch(&event);
                debug!("{} event delivered to {} listener(s)", event.event_type(), delivered);
            }
            Err(reason) => self.report(TransportError::Parse(reason)),
        }
    }
}

struct Link {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    live: Option<Link>,
    // task told to stop by `disconnect` that may still be sending its close frame
    retiring: Option<JoinHandle<()>>,
}

pub struct Transport {
    config: TransportConfig,
    shared: Arc<Shared>,
    slot: Mutex<Slot>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (errors, _) = broadcast::channel(32);
        Self {
            config,
            shared: Arc::new(Shared {
                listeners: ListenerRegistry::new(),
                state,
                errors,
                generation: AtomicU64::new(0),
            }),
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Open the push connection for `token`, replacing any existing one. The old
    /// connection is fully closed before the new one dials. Must be called from
    /// within a tokio runtime.
    pub fn connect(&self, token: &str) {
        let url = self.authorized_endpoint(token);
        let mut slot = self.lock_slot();
        let previous = match slot.live.take() {
            Some(old) => {
                let _ = old.shutdown.send(());
                Some(old.task)
            }
            None => slot.retiring.take(),
        };

        let generation = self.shared.begin(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(
            self.shared.clone(),
            generation,
            url,
            self.config.reconnect_delay,
            outbound_rx,
            shutdown_rx,
            previous,
        ));
        slot.live = Some(Link { outbound: outbound_tx, shutdown: shutdown_tx, task });
        info!("push connection requested for {}", self.config.endpoint);
    }

    /// Close the connection, cancel a pending reconnect, and stay down until the next `connect`.
    pub fn disconnect(&self) {
        let mut slot = self.lock_slot();
        self.shared.begin(ConnectionState::Disconnected);
        if let Some(link) = slot.live.take() {
            let _ = link.shutdown.send(());
            slot.retiring = Some(link.task);
            info!("push connection closed by client");
        }
    }

    /// Fire-and-forget. Dropped unless the connection is currently up.
    pub fn send(&self, event: &PushEvent) {
        if self.state() != ConnectionState::Connected {
            debug!("not connected, dropping outbound {} event", event.event_type());
            return;
        }
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("could not encode outbound event: {}", e);
                return;
            }
        };
        if let Some(link) = self.lock_slot().live.as_ref() {
            let _ = link.outbound.send(frame);
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Parse and connection errors, for callers that want to surface connection health.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<TransportError> {
        self.shared.errors.subscribe()
    }

    fn authorized_endpoint(&self, token: &str) -> Url {
        let mut url = self.config.endpoint.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Ended {
    Shutdown,
    Closed,
}

async fn supervise(
    shared: Arc<Shared>,
    generation: u64,
    url: Url,
    reconnect_delay: Duration,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    loop {
        shared.set_state(generation, ConnectionState::Connecting);
        let attempt = tokio::select! {
            _ = &mut shutdown => return,
            attempt = connect_async(url.as_str()) => attempt,
        };

        match attempt {
            Ok((stream, _)) => {
                // nothing queued for a dead connection may leak onto this one
                while outbound.try_recv().is_ok() {}
                shared.set_state(generation, ConnectionState::Connected);
                info!("push connection established");
                match run_connection(stream, &shared, &mut outbound, &mut shutdown).await {
                    Ended::Shutdown => return,
                    Ended::Closed => info!("push connection lost"),
                }
            }
            Err(e) => shared.report(TransportError::Connection(e.to_string())),
        }

        shared.set_state(generation, ConnectionState::Reconnecting);
        debug!("reconnecting in {:?}", reconnect_delay);
        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

async fn run_connection(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    shared: &Shared,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Ended {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let _ = write.send(WsMessage::Close(None)).await;
                return Ended::Shutdown;
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = write.send(WsMessage::Text(frame)).await {
                    shared.report(TransportError::Connection(e.to_string()));
                    return Ended::Closed;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => shared.deliver(&text),
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => shared.deliver(&text),
                    Err(e) => shared.report(TransportError::Parse(e.to_string())),
                },
                Some(Ok(WsMessage::Close(_))) | None => return Ended::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    shared.report(TransportError::Connection(e.to_string()));
                    return Ended::Closed;
                }
            }
        }
    }
}
