use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, sleep};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::AUTHORIZATION};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A session that lasts this long re-arms the immediate retry on server close.
const STABLE_SESSION: Duration = Duration::from_millis(250);

/// One JSON text message on the realtime channel: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Inbound event names the client listens for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    LeaderboardUpdate,
    Other(String),
}

impl ServerEvent {
    pub fn from_name(name: &str) -> Self {
        match name {
            "leaderboard:update" => ServerEvent::LeaderboardUpdate,
            other => ServerEvent::Other(other.to_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ServerEvent::LeaderboardUpdate => "leaderboard:update",
            ServerEvent::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Tournament,
    Stage,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Tournament => "tournament",
            RoomKind::Stage => "stage",
        }
    }

    pub fn join_event(&self) -> String {
        format!("join:{}", self.as_str())
    }

    pub fn leave_event(&self) -> String {
        format!("leave:{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, delay: Duration::from_secs(1) }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` on the upgrade request.
    pub token: Option<String>,
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug, Clone)]
pub enum ChannelCommand {
    Emit(Frame),
    /// Wake a worker that gave up, or cut a reconnect wait short.
    Reconnect,
}

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message(Frame),
    Error(String),
    GaveUp { attempts: u32 },
}

/// Create the client handle and the worker that owns the socket. The worker
/// must be spawned; the client stays on the UI loop.
pub fn connect(config: ChannelConfig) -> (ChannelClient, ChannelWorker, mpsc::Receiver<ChannelEvent>) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let (event_tx, event_rx) = mpsc::channel(100);
    let (connected_tx, connected_rx) = watch::channel(false);

    let client = ChannelClient {
        commands: command_tx,
        connected: connected_rx,
        listeners: HashMap::new(),
        next_listener: 0,
    };
    let worker = ChannelWorker {
        config,
        commands: command_rx,
        events: event_tx,
        connected: connected_tx,
    };
    (client, worker, event_rx)
}

// ---------------------------------------------------------------------------
// Client handle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Box<dyn FnMut(&Value) + Send>;

pub struct ChannelClient {
    commands: mpsc::Sender<ChannelCommand>,
    connected: watch::Receiver<bool>,
    listeners: HashMap<ServerEvent, Vec<(ListenerId, Handler)>>,
    next_listener: u64,
}

impl ChannelClient {
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Send an event if the connection is up. Nothing is queued: calls made
    /// while disconnected are dropped and return false.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        if !self.is_connected() {
            debug!("dropping {event}: channel offline");
            return false;
        }
        let frame = Frame { event: event.to_owned(), data };
        match self.commands.try_send(ChannelCommand::Emit(frame)) {
            Ok(()) => true,
            Err(e) => {
                warn!("dropping {event}: {e}");
                false
            }
        }
    }

    pub fn join_room(&self, kind: RoomKind, id: &str) -> bool {
        self.emit(&kind.join_event(), Value::String(id.to_owned()))
    }

    pub fn leave_room(&self, kind: RoomKind, id: &str) -> bool {
        self.emit(&kind.leave_event(), Value::String(id.to_owned()))
    }

    pub fn reconnect(&self) {
        let _ = self.commands.try_send(ChannelCommand::Reconnect);
    }

    pub fn on<F>(&mut self, event: ServerEvent, handler: F) -> ListenerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners
            .entry(event)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    pub fn off(&mut self, event: &ServerEvent, id: ListenerId) -> bool {
        let Some(handlers) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(lid, _)| *lid != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.listeners.remove(event);
        }
        removed
    }

    #[cfg(test)]
    pub fn listener_count(&self, event: &ServerEvent) -> usize {
        self.listeners.get(event).map(Vec::len).unwrap_or(0)
    }

    /// Run every handler registered for the frame's event, in registration
    /// order. Returns how many ran.
    pub fn dispatch(&mut self, frame: &Frame) -> usize {
        let event = ServerEvent::from_name(&frame.event);
        let Some(handlers) = self.listeners.get_mut(&event) else {
            debug!("no listeners for {}", event.name());
            return 0;
        };
        for (_, handler) in handlers.iter_mut() {
            handler(&frame.data);
        }
        handlers.len()
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

enum SessionEnd {
    ServerClosed,
    Lost,
    Shutdown,
}

pub struct ChannelWorker {
    config: ChannelConfig,
    commands: mpsc::Receiver<ChannelCommand>,
    events: mpsc::Sender<ChannelEvent>,
    connected: watch::Sender<bool>,
}

impl ChannelWorker {
    pub async fn run(mut self) {
        let max_attempts = self.config.reconnect.max_attempts.max(1);
        let mut failures: u32 = 0;
        // Set by a quick retry; cleared once a session outlives STABLE_SESSION.
        let mut quick_retry_spent = false;

        loop {
            let retry_now = match open(&self.config).await {
                Ok(socket) => {
                    failures = 0;
                    self.connected.send_replace(true);
                    let _ = self.events.send(ChannelEvent::Connected).await;

                    let started = Instant::now();
                    let end = self.pump(socket).await;
                    self.connected.send_replace(false);
                    if started.elapsed() >= STABLE_SESSION {
                        quick_retry_spent = false;
                    }
                    match end {
                        SessionEnd::Shutdown => return,
                        SessionEnd::ServerClosed => {
                            let _ = self.events.send(ChannelEvent::Disconnected).await;
                            !std::mem::replace(&mut quick_retry_spent, true)
                        }
                        SessionEnd::Lost => {
                            let _ = self.events.send(ChannelEvent::Disconnected).await;
                            false
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    let _ = self
                        .events
                        .send(ChannelEvent::Error(format!(
                            "connect failed ({failures}/{max_attempts}): {e}"
                        )))
                        .await;
                    false
                }
            };

            // A server-side close gets one immediate retry. A close right after
            // that retry waits out the normal delay.
            if retry_now {
                debug!("server closed the channel; reconnecting now");
                continue;
            }

            if failures >= max_attempts {
                let _ = self.events.send(ChannelEvent::GaveUp { attempts: failures }).await;
                if !self.park().await {
                    return;
                }
                failures = 0;
                continue;
            }

            quick_retry_spent = false;
            if !self.idle(self.config.reconnect.delay).await {
                return;
            }
        }
    }

    async fn pump(&mut self, socket: Socket) -> SessionEnd {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                maybe_cmd = self.commands.recv() => {
                    match maybe_cmd {
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            return SessionEnd::Shutdown;
                        }
                        Some(ChannelCommand::Reconnect) => {}
                        Some(ChannelCommand::Emit(frame)) => {
                            if let Err(e) = send_frame(&mut write, &frame).await {
                                let _ = self.events.send(ChannelEvent::Error(format!("channel send failed: {e}"))).await;
                                return SessionEnd::Lost;
                            }
                        }
                    }
                }
                inbound = read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Frame>(&text) {
                                Ok(frame) => {
                                    let _ = self.events.send(ChannelEvent::Message(frame)).await;
                                }
                                Err(e) => warn!("ignoring malformed channel frame: {e}"),
                            }
                        }
                        Some(Ok(Message::Close(_))) => return SessionEnd::ServerClosed,
                        None => return SessionEnd::Lost,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = self.events.send(ChannelEvent::Error(format!("channel read failed: {e}"))).await;
                            return SessionEnd::Lost;
                        }
                    }
                }
            }
        }
    }

    /// Wait out the reconnect delay. Emits arriving meanwhile are dropped.
    /// Returns false once the client handle is gone.
    async fn idle(&mut self, delay: Duration) -> bool {
        let deadline = sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return true,
                maybe_cmd = self.commands.recv() => match maybe_cmd {
                    None => return false,
                    Some(ChannelCommand::Reconnect) => return true,
                    Some(ChannelCommand::Emit(frame)) => debug!("dropping {} while offline", frame.event),
                },
            }
        }
    }

    /// Stay offline until a manual reconnect.
    async fn park(&mut self) -> bool {
        while let Some(cmd) = self.commands.recv().await {
            match cmd {
                ChannelCommand::Reconnect => return true,
                ChannelCommand::Emit(frame) => debug!("dropping {} while offline", frame.event),
            }
        }
        false
    }
}

async fn open(config: &ChannelConfig) -> Result<Socket, String> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| e.to_string())?;
    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| e.to_string())?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    let (socket, _) = connect_async(request).await.map_err(|e| e.to_string())?;
    Ok(socket)
}

async fn send_frame<S>(write: &mut S, frame: &Frame) -> Result<(), String>
where
    S: futures_util::sink::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}

/// A client wired to a bare command queue, for exercising callers without a socket.
#[cfg(test)]
pub(crate) fn loopback() -> (ChannelClient, mpsc::Receiver<ChannelCommand>, watch::Sender<bool>) {
    let (client, worker, _events) = connect(ChannelConfig {
        url: "ws://127.0.0.1:9".into(),
        token: None,
        reconnect: ReconnectPolicy::default(),
    });
    (client, worker.commands, worker.connected)
}
