use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::models::{ClientMessage, ServerMessage};

/// Exponential backoff policy for reconnect attempts
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), capped at
    /// `max_delay`: base, base×m, base×m², ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.base_delay.as_millis() as f64) * factor;
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Connection controller states. `Closed` is terminal and only reachable via
/// an explicit `close()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    /// Explicit transition table for the controller. Reconnect attempts stay
    /// in `Reconnecting` until one succeeds; exhausted retries fall back to
    /// `Disconnected` as a permanent failure.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting, Reconnecting) => true,
            (Connected, Reconnecting) => true,
            (Reconnecting, Connected) => true,
            // Consecutive failed attempts stay in Reconnecting
            (Reconnecting, Reconnecting) => true,
            (Reconnecting, Disconnected) => true,
            _ => false,
        }
    }
}

/// Typed events dispatched to the owner of the connection. The core has no
/// UI callbacks; presentation layers adapt this channel at the edge.
#[derive(Debug, Clone)]
pub enum RelayClientEvent {
    StateChanged(ConnectionState),
    Message(ServerMessage),
    /// Retries exhausted; the controller will not try again
    GaveUp,
}

#[derive(Error, Debug)]
pub enum RelayClientError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("controller is closed")]
    Closed,
}

/// Relay client configuration
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Relay base URL (e.g. wss://relay.colabri.app)
    pub server_url: String,
    pub workspace_id: String,
    /// Access token, sent as a query parameter on the upgrade
    pub token: String,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl RelayClientConfig {
    pub fn new(server_url: &str, workspace_id: &str, token: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            workspace_id: workspace_id.to_string(),
            token: token.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Client-side connection controller for one workspace view. Owns the
/// transport, the heartbeat timer, and the reconnect loop; exactly one
/// connection exists per controller.
pub struct RelayClient {
    config: RelayClientConfig,
    state: Arc<Mutex<ConnectionState>>,
    running: Arc<AtomicBool>,
    outbound_tx: Option<mpsc::UnboundedSender<ClientMessage>>,
    task_handle: Option<JoinHandle<()>>,
}

impl RelayClient {
    pub fn new(config: RelayClientConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            running: Arc::new(AtomicBool::new(false)),
            outbound_tx: None,
            task_handle: None,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Start the connection loop and return the event stream. Fails once the
    /// controller has been explicitly closed.
    pub async fn connect(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<RelayClientEvent>, RelayClientError> {
        {
            let mut state = self.state.lock().await;
            match *state {
                ConnectionState::Closed => return Err(RelayClientError::Closed),
                ConnectionState::Disconnected => {}
                _ => return Err(RelayClientError::AlreadyConnected),
            }
            *state = ConnectionState::Connecting;
        }

        // Fail fast on an unparseable URL instead of burning retries on it
        build_connection_url(&self.config)?;

        info!(
            "Connecting to {} for workspace {}",
            self.config.server_url, self.config.workspace_id
        );
        self.running.store(true, Ordering::Relaxed);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(RelayClientEvent::StateChanged(ConnectionState::Connecting));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound_tx = Some(outbound_tx);

        let config = self.config.clone();
        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            run_connection_loop(config, state, running, outbound_rx, event_tx).await;
        });
        self.task_handle = Some(handle);

        Ok(event_rx)
    }

    /// Fire-and-forget send. Messages are written by the connection loop; a
    /// transport failure surfaces through the reconnect machinery, not here.
    pub fn send(&self, message: ClientMessage) -> Result<(), RelayClientError> {
        match &self.outbound_tx {
            Some(tx) => tx.send(message).map_err(|_| RelayClientError::NotConnected),
            None => Err(RelayClientError::NotConnected),
        }
    }

    /// Explicit, terminal close: stops the heartbeat, cancels any in-flight
    /// backoff timer, and releases the transport. No further retries occur.
    pub async fn close(&mut self) {
        info!("Closing connection to workspace {}", self.config.workspace_id);

        self.running.store(false, Ordering::Relaxed);
        self.outbound_tx = None;
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }

        *self.state.lock().await = ConnectionState::Closed;
    }
}

/// Move the shared state along the transition table, emitting a state event.
/// Returns false (and changes nothing) for an illegal transition, in
/// particular once `close()` has made the state terminal.
async fn transition(
    state: &Arc<Mutex<ConnectionState>>,
    next: ConnectionState,
    events: &mpsc::UnboundedSender<RelayClientEvent>,
) -> bool {
    let mut current = state.lock().await;
    if !current.can_transition_to(next) {
        debug!("Ignoring illegal transition {:?} -> {:?}", *current, next);
        return false;
    }
    *current = next;
    let _ = events.send(RelayClientEvent::StateChanged(next));
    true
}

/// Run the connection loop (background task)
async fn run_connection_loop(
    config: RelayClientConfig,
    state: Arc<Mutex<ConnectionState>>,
    running: Arc<AtomicBool>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::UnboundedSender<RelayClientEvent>,
) {
    let mut attempts: u32 = 0;
    let mut resync_on_connect = false;

    while running.load(Ordering::Relaxed) {
        let ws_url = match build_connection_url(&config) {
            Ok(url) => url,
            Err(e) => {
                error!("Invalid relay URL: {}", e);
                break;
            }
        };

        match tokio_tungstenite::connect_async(&ws_url).await {
            Ok((ws_stream, _response)) => {
                if !transition(&state, ConnectionState::Connected, &event_tx).await {
                    break;
                }
                attempts = 0;
                info!("Connected to workspace {}", config.workspace_id);

                let (mut write, mut read) = ws_stream.split();

                // After a reconnect, ask for a full resync instead of
                // replaying missed deltas
                if resync_on_connect {
                    let sync = serde_json::to_string(&ClientMessage::RequestSync {})
                        .expect("request_sync serializes");
                    if let Err(e) = write.send(Message::Text(sync.into())).await {
                        warn!("Failed to send resync request: {}", e);
                    }
                }
                resync_on_connect = true;

                // The heartbeat ticks independently of user interaction
                let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
                heartbeat.tick().await; // the first tick fires immediately

                loop {
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }

                    tokio::select! {
                        incoming = read.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                                        Ok(message) => {
                                            let _ = event_tx.send(RelayClientEvent::Message(message));
                                        }
                                        Err(e) => {
                                            warn!("Dropping unparseable server message: {}", e);
                                        }
                                    }
                                }
                                Some(Ok(Message::Close(frame))) => {
                                    info!("Server closed connection: {:?}", frame);
                                    break;
                                }
                                Some(Ok(_)) => continue,
                                Some(Err(e)) => {
                                    warn!("WebSocket error: {}", e);
                                    break;
                                }
                                None => {
                                    info!("Stream ended");
                                    break;
                                }
                            }
                        }

                        outgoing = outbound_rx.recv() => {
                            match outgoing {
                                Some(message) => {
                                    let text = match serde_json::to_string(&message) {
                                        Ok(text) => text,
                                        Err(e) => {
                                            error!("Failed to serialize outbound message: {}", e);
                                            continue;
                                        }
                                    };
                                    if let Err(e) = write.send(Message::Text(text.into())).await {
                                        warn!("Send failed: {}", e);
                                        break;
                                    }
                                }
                                None => break, // controller dropped
                            }
                        }

                        _ = heartbeat.tick() => {
                            let ping = ClientMessage::Ping { timestamp: Utc::now().timestamp_millis() };
                            let text = serde_json::to_string(&ping).expect("ping serializes");
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                warn!("Heartbeat failed: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Connection to workspace {} failed: {}", config.workspace_id, e);
            }
        }

        if !running.load(Ordering::Relaxed) {
            break;
        }

        attempts += 1;
        if attempts > config.reconnect.max_attempts {
            error!(
                "Giving up on workspace {} after {} reconnect attempts",
                config.workspace_id, config.reconnect.max_attempts
            );
            let _ = event_tx.send(RelayClientEvent::GaveUp);
            transition(&state, ConnectionState::Disconnected, &event_tx).await;
            break;
        }

        if !transition(&state, ConnectionState::Reconnecting, &event_tx).await {
            break;
        }
        let delay = config.reconnect.delay_for(attempts);
        info!(
            "Reconnecting to workspace {} in {:?} (attempt {}/{})",
            config.workspace_id, delay, attempts, config.reconnect.max_attempts
        );
        tokio::time::sleep(delay).await;
    }

    debug!("Connection loop for workspace {} ended", config.workspace_id);
}

/// Build the workspace socket URL with the token as a query parameter
fn build_connection_url(config: &RelayClientConfig) -> Result<String, RelayClientError> {
    let mut url = Url::parse(&config.server_url)
        .map_err(|e| RelayClientError::InvalidUrl(e.to_string()))?;

    url.path_segments_mut()
        .map_err(|_| RelayClientError::InvalidUrl("URL cannot be a base".to_string()))?
        .extend(["ws", "workspaces", &config.workspace_id]);
    url.query_pairs_mut().append_pair("token", &config.token);

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_base_multiplier_and_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=8).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn backoff_respects_custom_policy() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(500),
            multiplier: 3.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4500));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
    }

    #[test]
    fn transition_table_matches_the_state_machine() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Reconnecting));
        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connected));
        assert!(Reconnecting.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Reconnecting.can_transition_to(Connecting));
    }

    #[test]
    fn closed_is_terminal_and_reachable_from_anywhere() {
        use ConnectionState::*;
        for from in [Disconnected, Connecting, Connected, Reconnecting] {
            assert!(from.can_transition_to(Closed));
        }
        for to in [Disconnected, Connecting, Connected, Reconnecting, Closed] {
            assert!(!Closed.can_transition_to(to));
        }
    }

    #[test]
    fn connection_url_carries_workspace_path_and_token() {
        let config = RelayClientConfig::new("ws://relay.local:3000", "7", "token123");
        let url = build_connection_url(&config).unwrap();
        assert!(url.contains("/ws/workspaces/7"));
        assert!(url.contains("token=token123"));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let config = RelayClientConfig::new("not a url", "7", "token123");
        assert!(matches!(
            build_connection_url(&config),
            Err(RelayClientError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_permanent_failure() {
        // Nothing listens on this port; every attempt fails fast
        let mut config = RelayClientConfig::new("ws://127.0.0.1:1", "7", "token123");
        config.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(1),
            max_attempts: 2,
        };

        let mut client = RelayClient::new(config);
        let mut events = client.connect().await.unwrap();

        let mut saw_gave_up = false;
        let mut reconnecting = 0;
        while let Some(event) = events.recv().await {
            match event {
                RelayClientEvent::GaveUp => saw_gave_up = true,
                RelayClientEvent::StateChanged(ConnectionState::Reconnecting) => reconnecting += 1,
                _ => {}
            }
        }
        assert!(saw_gave_up);
        assert_eq!(reconnecting, 2);
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let mut client = RelayClient::new(RelayClientConfig::new("ws://127.0.0.1:1", "7", "t"));
        client.close().await;
        assert_eq!(client.state().await, ConnectionState::Closed);
        assert!(matches!(client.connect().await, Err(RelayClientError::Closed)));
        assert!(matches!(
            client.send(ClientMessage::RequestSync {}),
            Err(RelayClientError::NotConnected)
        ));
    }
}
