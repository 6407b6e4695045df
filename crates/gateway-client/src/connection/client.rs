//! Gateway connection orchestration
//!
//! [`GatewayClient`] is the public handle; the actual protocol runs on a
//! spawned runner task that owns the transport, the decompression stream,
//! the session record, and the pending large-collection cache. The handle
//! and the runner share only a small observable state block.

use crate::compression::InflateStream;
use crate::config::ClientConfig;
use crate::connection::members::PendingGuilds;
use crate::connection::state::ConnectionState;
use crate::error::GatewayError;
use crate::events::{EventReceiver, GatewayEvent};
use crate::protocol::{
    GatewayMessage, HelloPayload, IdentifyPayload, IdentifyProperties, OpCode, ResumePayload,
};
use crate::rest::GatewayDiscovery;
use crate::retry::RetryPolicy;
use crate::session::SessionStore;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Fixed delay between gateway discovery / connect attempts
const RECONNECT_DELAY: Duration = Duration::from_millis(2500);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State shared between the handle and the runner task
struct Shared {
    /// Cleared by `disconnect()`; checked before every transport open
    allow_connection: AtomicBool,
    authenticated: AtomicBool,
    state: Mutex<ConnectionState>,
    /// Last measured heartbeat round trip
    ping: Mutex<Option<Duration>>,
    /// Writer half of the live connection, when one exists
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Nudges a parked runner after `connect()`
    wake: Notify,
    /// Asks the runner to force-close the live transport
    close: Notify,
}

impl Shared {
    fn allow(&self) -> bool {
        self.allow_connection.load(Ordering::SeqCst)
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }
}

/// Client for the gateway push protocol
///
/// Construction spawns a background task that connects, authenticates or
/// resumes, heartbeats, and reconnects on its own; the handle only observes
/// and steers it. Dropping the handle stops the task.
pub struct GatewayClient {
    shared: Arc<Shared>,
    runner: tokio::task::JoinHandle<()>,
}

impl GatewayClient {
    /// Create a client and its event stream
    ///
    /// Must be called within a tokio runtime. Connects immediately unless
    /// the configuration says otherwise.
    pub fn new(config: ClientConfig) -> Result<(Self, EventReceiver), GatewayError> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            allow_connection: AtomicBool::new(config.auto_connect),
            authenticated: AtomicBool::new(false),
            state: Mutex::new(ConnectionState::Disconnected),
            ping: Mutex::new(None),
            writer: Mutex::new(None),
            wake: Notify::new(),
            close: Notify::new(),
        });

        let runner = Runner::new(config, Arc::clone(&shared), events_tx);
        let handle = tokio::spawn(runner.run());

        Ok((
            Self {
                shared,
                runner: handle,
            },
            events_rx,
        ))
    }

    /// Allow connections and begin connecting if not already connected
    pub fn connect(&self) {
        self.shared.allow_connection.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Disallow reconnection and force-close the active transport, if any
    pub fn disconnect(&self) {
        self.shared.allow_connection.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so a close between select registrations
        // is never lost. A stale permit only causes one harmless extra loop.
        self.shared.close.notify_one();
    }

    /// Serialize and transmit `message` if the transport is open
    ///
    /// Returns whether the send was attempted; `false` when not connected.
    pub fn send(&self, message: &GatewayMessage) -> bool {
        if !self.is_connected() {
            return false;
        }

        let writer = self.shared.writer.lock();
        let Some(tx) = writer.as_ref() else {
            return false;
        };

        match message.to_json() {
            Ok(json) => {
                tracing::debug!(message = %message, "sending message");
                tx.send(Message::Text(json)).is_ok()
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize outbound message");
                false
            }
        }
    }

    /// Whether the transport is currently open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.state().is_connected()
    }

    /// Whether the session has been confirmed on the open transport
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.is_connected() && self.shared.authenticated.load(Ordering::SeqCst)
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Latest heartbeat round-trip latency, once one has been measured
    #[must_use]
    pub fn ping(&self) -> Option<Duration> {
        *self.shared.ping.lock()
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.runner.abort();
    }
}

/// Whether the connection should stay up after handling a message
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Per-connection resources owned by the runner while a transport is open
struct Link {
    tx: mpsc::UnboundedSender<Message>,
    pending: PendingGuilds,
    heartbeat_every: Option<Duration>,
    /// When the next scheduled heartbeat fires; `None` before Hello
    next_beat: Option<Instant>,
    /// When the last heartbeat was sent, for the round-trip measurement
    last_beat: Option<Instant>,
}

impl Link {
    fn send(&self, message: &GatewayMessage) {
        match message.to_json() {
            Ok(json) => {
                tracing::debug!(message = %message, "sending message");
                let _ = self.tx.send(Message::Text(json));
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize outbound message"),
        }
    }
}

/// The background task driving one client
struct Runner {
    config: ClientConfig,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<GatewayEvent>,
    discovery: GatewayDiscovery,
    store: SessionStore,
    session: crate::session::SessionRecord,
}

impl Runner {
    fn new(
        config: ClientConfig,
        shared: Arc<Shared>,
        events: mpsc::UnboundedSender<GatewayEvent>,
    ) -> Self {
        let discovery = GatewayDiscovery::new(config.api_url.clone());
        let store = SessionStore::new(&config.state_path, config.shard_index());

        Self {
            config,
            shared,
            events,
            discovery,
            store,
            session: crate::session::SessionRecord::default(),
        }
    }

    async fn run(mut self) {
        self.load_initial_session().await;

        loop {
            if !self.shared.allow() {
                self.shared.set_state(ConnectionState::Disconnected);
                self.shared.wake.notified().await;
                continue;
            }

            let Some(url) = self.resolve_gateway_url().await else {
                continue;
            };

            self.shared.set_state(ConnectionState::SocketConnecting);
            let socket = match connect_async(&url).await {
                Ok((socket, _)) => socket,
                Err(e) => {
                    tracing::error!(error = %e, "gateway connection failed");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            // A disconnect() may have landed while the socket was opening.
            if !self.shared.allow() {
                continue;
            }

            tracing::info!("gateway connected");
            self.shared.set_state(ConnectionState::AwaitingHello);
            self.emit(GatewayEvent::Connect);

            let code = self.drive(socket).await;

            self.shared.authenticated.store(false, Ordering::SeqCst);
            *self.shared.writer.lock() = None;
            self.shared.set_state(ConnectionState::Disconnected);

            self.session.disconnect_time = Some(now_unix_ms());
            if self.config.resume_capable {
                self.store.save(&self.session).await;
            }

            tracing::info!(code = ?code, "gateway disconnected");
            self.emit(GatewayEvent::Disconnect { code });
            // Reconnect immediately; the resolved URL is cached.
        }
    }

    /// Reload persisted state before the first connection attempt
    ///
    /// Emits a proactive resume error when no usable session exists, so the
    /// application can pre-warm whatever it rebuilds from creation events.
    async fn load_initial_session(&mut self) {
        if self.config.resume_capable && !self.config.force_fresh {
            self.session = self.store.load().await;
        }

        if !self.session.is_resumable() {
            self.emit(GatewayEvent::ResumeError {
                disconnect_time: self.session.disconnect_time,
            });
        }
    }

    /// Resolve the gateway address, retrying on a fixed cadence
    ///
    /// Returns `None` when connections were disallowed mid-retry.
    async fn resolve_gateway_url(&self) -> Option<String> {
        if let Some(url) = &self.config.gateway_url {
            return Some(url.clone());
        }

        self.shared.set_state(ConnectionState::AwaitingGatewayUrl);

        let shared = &self.shared;
        let discovery = &self.discovery;
        let policy = RetryPolicy::unbounded(RECONNECT_DELAY);

        let resolved: Result<Option<String>, reqwest::Error> = policy
            .run(|| async move {
                if !shared.allow() {
                    return Ok(None);
                }
                discovery.gateway_url().await.map(Some)
            })
            .await;

        resolved.unwrap_or_default()
    }

    /// Drive one open transport until it closes
    ///
    /// Returns the close code when the peer sent one.
    async fn drive(&mut self, socket: Socket) -> Option<u16> {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.shared.writer.lock() = Some(tx.clone());

        let shared = Arc::clone(&self.shared);
        let inflate = InflateStream::new();
        let mut link = Link {
            tx,
            pending: PendingGuilds::new(),
            heartbeat_every: None,
            next_beat: None,
            last_beat: None,
        };
        let mut close_code: Option<u16> = None;

        loop {
            // disconnect() clears the flag and pokes `close`.
            if !shared.allow() {
                break;
            }

            let beat_at = link.next_beat;

            tokio::select! {
                () = shared.close.notified() => {}

                outbound = rx.recv() => {
                    let Some(message) = outbound else { break };
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }

                () = heartbeat_due(beat_at) => {
                    self.send_heartbeat(&mut link);
                    if let (Some(at), Some(every)) = (beat_at, link.heartbeat_every) {
                        link.next_beat = Some(at + every);
                    }
                }

                inbound = stream.next() => {
                    match inbound {
                        None => break,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "websocket error");
                            break;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            close_code = frame.map(|f| u16::from(f.code));
                            break;
                        }
                        Some(Ok(Message::Binary(bytes))) => match inflate.push(&bytes).await {
                            Ok(Some(value)) => {
                                if self.handle_value(value, &mut link).await == Flow::Close {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                // The shared inflate context cannot be trusted
                                // any further; reconnect with a fresh one.
                                tracing::error!(error = %e, "dropping connection after decompression failure");
                                break;
                            }
                        },
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                            Ok(value) => {
                                if self.handle_value(value, &mut link).await == Flow::Close {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "unparseable text frame"),
                        },
                        Some(Ok(_)) => {}
                    }
                }
            }
        }

        let _ = sink.close().await;
        close_code
    }

    async fn handle_value(&mut self, value: Value, link: &mut Link) -> Flow {
        match GatewayMessage::from_value(value) {
            Ok(message) => self.handle_message(message, link).await,
            Err(e) => {
                tracing::warn!(error = %e, "unrecognized gateway message");
                Flow::Continue
            }
        }
    }

    async fn handle_message(&mut self, message: GatewayMessage, link: &mut Link) -> Flow {
        tracing::debug!(message = %message, "received message");
        self.emit(GatewayEvent::Raw {
            message: message.clone(),
        });

        match message.op {
            OpCode::Dispatch => return self.handle_dispatch(message, link).await,
            OpCode::Heartbeat => {
                // Server-requested beat, out of cadence; the timer keeps its
                // schedule.
                self.send_heartbeat(link);
            }
            OpCode::Reconnect => {
                tracing::info!("server requested reconnect");
                return Flow::Close;
            }
            OpCode::InvalidSession => self.handle_invalid_session(&message, link),
            OpCode::Hello => self.handle_hello(&message, link),
            OpCode::HeartbeatAck => {
                if let Some(sent) = link.last_beat {
                    let ping = sent.elapsed();
                    *self.shared.ping.lock() = Some(ping);
                    tracing::trace!(ping_ms = ping.as_millis() as u64, "heartbeat acknowledged");
                }
            }
            // Client-only opcodes never arrive from the server.
            OpCode::Identify | OpCode::Resume | OpCode::RequestMembers => {}
        }

        Flow::Continue
    }

    async fn handle_dispatch(&mut self, message: GatewayMessage, link: &mut Link) -> Flow {
        if let Some(s) = message.s {
            // Sequence numbers only ever advance.
            if self.session.seq.map_or(true, |current| s > current) {
                self.session.seq = Some(s);
            }
        }

        let event_type = message.t.unwrap_or_default();
        let payload = message.d.unwrap_or(Value::Null);

        match event_type.as_str() {
            "READY" => {
                if let Some(session_id) = payload["session_id"].as_str() {
                    self.session.session = Some(session_id.to_string());
                }
                self.shared.authenticated.store(true, Ordering::SeqCst);
                self.shared.set_state(ConnectionState::Authenticated);
                if self.config.resume_capable {
                    self.store.save(&self.session).await;
                }
                tracing::info!("gateway session ready");
            }
            "RESUMED" => {
                self.shared.authenticated.store(true, Ordering::SeqCst);
                self.shared.set_state(ConnectionState::Authenticated);
                tracing::info!("gateway session resumed");
            }
            _ => {}
        }

        if self.config.reassemble_members {
            if event_type == "GUILD_MEMBERS_CHUNK" {
                if let Some(guild_id) = payload["guild_id"].as_str() {
                    if link.pending.contains(guild_id) {
                        if let Some((merged_type, merged)) = link.pending.absorb_chunk(guild_id, &payload) {
                            self.emit(GatewayEvent::Event {
                                event_type: merged_type,
                                payload: merged,
                            });
                        }
                        return Flow::Continue;
                    }
                }
            }

            if event_type == "GUILD_CREATE" && payload["large"].as_bool() == Some(true) {
                if let Some(guild_id) = payload["id"].as_str().map(ToString::to_string) {
                    link.pending.insert(&guild_id, &event_type, payload);
                    link.send(&GatewayMessage::request_members(&guild_id));
                    return Flow::Continue;
                }
            }
        }

        self.emit(GatewayEvent::Event {
            event_type,
            payload,
        });
        Flow::Continue
    }

    fn handle_hello(&mut self, message: &GatewayMessage, link: &mut Link) {
        let interval = message
            .d
            .as_ref()
            .and_then(|d| serde_json::from_value::<HelloPayload>(d.clone()).ok())
            .map(|hello| Duration::from_millis(hello.heartbeat_interval));

        if let Some(every) = interval {
            link.heartbeat_every = Some(every);
            link.next_beat = Some(Instant::now() + every);
        } else {
            tracing::warn!("hello without a heartbeat interval");
        }

        self.shared.set_state(ConnectionState::Authenticating);
        self.send_auth(link);
    }

    fn handle_invalid_session(&mut self, message: &GatewayMessage, link: &mut Link) {
        self.shared.authenticated.store(false, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Authenticating);

        let resumable = message.d.as_ref().and_then(Value::as_bool).unwrap_or(false);
        if !resumable {
            tracing::info!("session invalidated and not resumable");
            self.session.session = None;
            self.session.seq = None;
            self.emit(GatewayEvent::ResumeError {
                disconnect_time: self.session.disconnect_time,
            });
        }

        self.send_auth(link);
    }

    /// Send Resume when a usable session exists, Identify otherwise
    fn send_auth(&self, link: &Link) {
        let message = match (self.session.session.clone(), self.session.seq) {
            (Some(session_id), Some(seq)) => {
                tracing::info!(session_id = %session_id, seq, "resuming gateway session");
                GatewayMessage::resume(&ResumePayload {
                    token: self.config.token.clone(),
                    session_id,
                    seq,
                })
            }
            _ => {
                tracing::info!("authenticating fresh gateway session");
                GatewayMessage::identify(&IdentifyPayload {
                    token: self.config.token.clone(),
                    properties: IdentifyProperties::this_client(),
                    compress: true,
                    large_threshold: self.config.large_threshold,
                    shard: self.config.shard,
                    intents: self.config.intents,
                })
            }
        };

        link.send(&message);
    }

    fn send_heartbeat(&self, link: &mut Link) {
        link.send(&GatewayMessage::heartbeat(self.session.seq));
        link.last_beat = Some(Instant::now());
    }

    fn emit(&self, event: GatewayEvent) {
        tracing::trace!(event = event.name(), "emitting event");
        let _ = self.events.send(event);
    }
}

/// Resolves at the scheduled heartbeat instant; never before Hello
async fn heartbeat_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
