use std::sync::Arc;

use shared::{
    domain::GroupId,
    protocol::{ClientFrame, FrameKind, ServerFrame},
};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    config::SocketConfig,
    dispatch::{HandlerRegistry, Subscription},
    error::SocketError,
    rest::TokenProvider,
    transport::{Transport, TransportEvent, WebSocketTransport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Default)]
struct SocketInner {
    outbound: Option<mpsc::UnboundedSender<String>>,
    reconnect_attempts: u32,
    manual_disconnect: bool,
    /// Bumped on every successful open and on every `disconnect()`. Tasks
    /// tied to an older link compare against it and bail out when stale.
    generation: u64,
    read_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

/// Owns the one realtime connection for this client session. All group rooms
/// multiplex over it; construct once and inject wherever it is needed.
pub struct RealtimeSocket {
    config: SocketConfig,
    server_url: String,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    registry: Arc<HandlerRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<SocketInner>,
}

impl RealtimeSocket {
    pub fn new(server_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Arc<Self> {
        Self::new_with_transport(
            SocketConfig::default(),
            server_url,
            tokens,
            Arc::new(WebSocketTransport),
        )
    }

    pub fn new_with_transport(
        config: SocketConfig,
        server_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            config,
            server_url: server_url.into(),
            transport,
            tokens,
            registry: HandlerRegistry::new(),
            state_tx,
            inner: Mutex::new(SocketInner::default()),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Watch connection-state transitions. Unsubscribe by dropping the
    /// receiver.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Register a handler for one frame kind. Handlers for a kind run in
    /// registration order; the subscription ends when the returned token is
    /// dropped.
    pub fn on(
        &self,
        kind: FrameKind,
        handler: impl Fn(&ServerFrame) + Send + Sync + 'static,
    ) -> Subscription {
        self.registry.subscribe(kind, handler)
    }

    /// Open the connection. No-op when already connected or connecting; the
    /// token is fetched fresh from the provider on every call.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SocketError> {
        let (generation, url) = {
            let mut inner = self.inner.lock().await;
            match self.connection_state() {
                ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
            }
            let token = self.tokens.access_token().ok_or(SocketError::NoToken)?;
            let url = self.connect_url(&token)?;
            inner.manual_disconnect = false;
            if let Some(task) = inner.reconnect_task.take() {
                task.abort();
            }
            self.set_state(ConnectionState::Connecting);
            (inner.generation, url)
        };

        let link = match self.transport.open(&url).await {
            Ok(link) => link,
            Err(err) => {
                let inner = self.inner.lock().await;
                if inner.generation == generation {
                    self.set_state(ConnectionState::Disconnected);
                }
                return Err(SocketError::Connect(err));
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.manual_disconnect {
            // A disconnect() landed while the open was in flight; the latest
            // call wins and this link is dropped unused.
            debug!("discarding stale transport link");
            return Ok(());
        }
        inner.generation += 1;
        let live_generation = inner.generation;
        inner.reconnect_attempts = 0;
        inner.outbound = Some(link.sender);
        inner.read_task = Some(self.spawn_read_loop(link.events, live_generation));
        inner.heartbeat_task = Some(self.spawn_heartbeat());
        self.set_state(ConnectionState::Connected);
        info!("websocket connected");
        Ok(())
    }

    /// Close the connection and suppress automatic reconnection. Idempotent.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        inner.manual_disconnect = true;
        inner.generation += 1;
        for task in [
            inner.reconnect_task.take(),
            inner.heartbeat_task.take(),
            inner.read_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        // Dropping the sender makes the transport send a normal-closure
        // close frame.
        inner.outbound = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Serialize and transmit one frame. Returns false, without queueing,
    /// when not connected or the frame cannot be written.
    pub async fn send(&self, frame: &ClientFrame) -> bool {
        let inner = self.inner.lock().await;
        if self.connection_state() != ConnectionState::Connected {
            warn!(kind = ?frame.kind(), "dropping outbound frame: not connected");
            return false;
        }
        let Some(outbound) = inner.outbound.as_ref() else {
            return false;
        };
        match serde_json::to_string(frame) {
            Ok(text) => outbound.send(text).is_ok(),
            Err(err) => {
                error!(error = %err, "failed to serialize outbound frame");
                false
            }
        }
    }

    pub async fn send_chat(
        &self,
        group_id: GroupId,
        content: impl Into<String>,
        metadata: Option<String>,
    ) -> bool {
        self.send(&ClientFrame::ChatMessage {
            group_id,
            content: content.into(),
            metadata,
        })
        .await
    }

    pub async fn send_typing(&self, group_id: GroupId, is_typing: bool) -> bool {
        self.send(&ClientFrame::Typing {
            group_id,
            is_typing,
        })
        .await
    }

    pub async fn join_group(&self, group_id: GroupId) -> bool {
        self.send(&ClientFrame::JoinGroup { group_id }).await
    }

    pub async fn leave_group(&self, group_id: GroupId) -> bool {
        self.send(&ClientFrame::LeaveGroup { group_id }).await
    }

    fn set_state(&self, state: ConnectionState) {
        if self.state_tx.send_replace(state) != state {
            debug!(?state, "connection state changed");
        }
    }

    fn connect_url(&self, token: &str) -> Result<Url, SocketError> {
        let ws_base = if self.server_url.starts_with("https://") {
            self.server_url.replacen("https://", "wss://", 1)
        } else if self.server_url.starts_with("http://") {
            self.server_url.replacen("http://", "ws://", 1)
        } else if self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://") {
            self.server_url.clone()
        } else {
            return Err(SocketError::InvalidServerUrl(self.server_url.clone()));
        };
        let mut url = Url::parse(&format!("{}/ws", ws_base.trim_end_matches('/')))
            .map_err(|_| SocketError::InvalidServerUrl(self.server_url.clone()))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    fn spawn_read_loop(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        generation: u64,
    ) -> JoinHandle<()> {
        let socket = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Frame(text) => {
                        match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(frame) => socket.registry.dispatch(&frame),
                            Err(err) => warn!(error = %err, "dropping undecodable frame"),
                        }
                    }
                    TransportEvent::Closed { clean } => {
                        socket.handle_close(generation, clean).await;
                        return;
                    }
                }
            }
            // Transport dropped without a close notice; treat as unclean.
            socket.handle_close(generation, false).await;
        })
    }

    fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let socket = Arc::clone(self);
        let period = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of an interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                socket.send(&ClientFrame::Ping {}).await;
            }
        })
    }

    async fn handle_close(self: &Arc<Self>, generation: u64, clean: bool) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        if let Some(task) = inner.heartbeat_task.take() {
            task.abort();
        }
        inner.outbound = None;
        self.set_state(ConnectionState::Disconnected);
        if inner.manual_disconnect || clean {
            return;
        }
        warn!("websocket closed unexpectedly");
        self.schedule_reconnect(&mut inner);
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut SocketInner) {
        if inner.manual_disconnect {
            return;
        }
        if inner.reconnect_attempts >= self.config.max_reconnect_attempts {
            warn!(
                attempts = inner.reconnect_attempts,
                "reconnect attempts exhausted; staying disconnected"
            );
            return;
        }
        self.set_state(ConnectionState::Reconnecting);
        let exponent = inner.reconnect_attempts.min(31);
        let delay = self
            .config
            .base_reconnect_delay
            .saturating_mul(1u32 << exponent)
            .min(self.config.max_reconnect_delay);
        info!(
            attempt = inner.reconnect_attempts + 1,
            max_attempts = self.config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        let socket = Arc::clone(self);
        let generation = inner.generation;
        inner.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            socket.run_reconnect_attempt(generation).await;
        }));
    }

    async fn run_reconnect_attempt(self: Arc<Self>, generation: u64) {
        {
            let mut inner = self.inner.lock().await;
            if inner.manual_disconnect || inner.generation != generation {
                return;
            }
            inner.reconnect_attempts += 1;
            inner.reconnect_task = None;
        }
        if let Err(err) = self.connect().await {
            warn!(error = %err, "reconnect attempt failed");
            let mut inner = self.inner.lock().await;
            if inner.generation == generation {
                self.schedule_reconnect(&mut inner);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/socket_tests.rs"]
mod tests;
