//! The connection manager: one logical room connection at a time.
//!
//! Each `connect()` spawns a connection actor, an isolated Tokio task
//! that owns the transport and the reconnect bookkeeping. The manager
//! talks to it only through channels:
//!
//! ```text
//!                 commands (mpsc) ─┐
//! ConnectionManager                ├──→ ConnectionActor ──→ Connection
//!                 shutdown (oneshot)┘         │
//!                                             ▼
//!                                   EventDispatcher ──→ listeners
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! connect() ──→ Connecting ──→ Open ──(drop)──→ Reconnecting ──(sleep)──┐
//!                   ▲                                                   │
//!                   └───────────────────────────────────────────────────┘
//!
//! auth failure / server disconnect / retries exhausted / disconnect()
//!     ──→ Closed
//! ```
//!
//! The pending reconnect delay is a `sleep` inside the actor, so stopping
//! the actor also cancels the timer. There is never more than one.

use std::sync::Arc;

use tally_protocol::{
    AUTH_FAILURE_CLOSE_CODE, ClientMessage, Codec, JsonCodec, MessageType,
    ServerMessage,
};
use tally_transport::{Connection, Connector, Incoming};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionState,
    DisconnectReason, EventDispatcher, EventType, Failure, Identity,
    ReconnectState, SubscriptionId,
};

type Dispatcher = EventDispatcher<EventType, ConnectionEvent>;

/// Owns the client's connection to a room.
///
/// Generic over the transport ([`Connector`]) and the wire format
/// ([`Codec`], JSON by default) so tests can drive it with in-memory
/// mocks.
pub struct ConnectionManager<C: Connector, K: Codec = JsonCodec> {
    connector: Arc<C>,
    codec: Arc<K>,
    config: ConnectionConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    active: Option<ActiveConnection>,
}

/// Handles to the running actor of the current logical connection.
struct ActiveConnection {
    room_key: String,
    commands: mpsc::UnboundedSender<String>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    dispatcher: Arc<Dispatcher>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager that speaks JSON.
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self::with_codec(connector, JsonCodec, config)
    }
}

impl<C: Connector, K: Codec> ConnectionManager<C, K> {
    pub fn with_codec(connector: C, codec: K, config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            connector: Arc::new(connector),
            codec: Arc::new(codec),
            config: config.validated(),
            state: Arc::new(state),
            active: None,
        }
    }

    /// Opens a logical connection to `room_key`.
    ///
    /// Any previous connection is torn down first, including its
    /// listeners and any pending reconnect. `on_message` receives every
    /// inbound server message; `on_state_change` receives the lifecycle
    /// events (connecting, connected, reconnecting, disconnected, error).
    ///
    /// Returns once the actor is spawned; the outcome of the dial is
    /// reported through `on_state_change`.
    ///
    /// # Errors
    /// Returns `ConnectionError::InvalidRoomKey` or `InvalidServerUrl` if
    /// no socket URL can be built, or `ConnectionError::Protocol` if the
    /// `join` message for `identity` can't be encoded. On error the
    /// previous connection is left untouched.
    pub async fn connect<M, S>(
        &mut self,
        room_key: impl Into<String>,
        identity: Identity,
        on_message: M,
        on_state_change: S,
    ) -> Result<(), ConnectionError>
    where
        M: Fn(&ServerMessage) + Send + Sync + 'static,
        S: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let room_key = room_key.into();
        let url = self.config.room_url(&room_key)?;
        let join_frame = self.codec.encode(&ClientMessage::Join {
            user_name: identity.user_name.clone(),
            auth_token: identity.auth_token.clone(),
        })?;

        self.teardown().await;

        let dispatcher: Arc<Dispatcher> = Arc::new(EventDispatcher::new());
        let on_message: Arc<dyn Fn(&ConnectionEvent) + Send + Sync> =
            Arc::new(move |event: &ConnectionEvent| {
                if let Some(msg) = event.as_message() {
                    on_message(msg);
                }
            });
        for message_type in MessageType::ALL {
            dispatcher
                .subscribe_shared(EventType::Message(message_type), Arc::clone(&on_message));
        }
        let on_state_change: Arc<dyn Fn(&ConnectionEvent) + Send + Sync> =
            Arc::new(on_state_change);
        for event_type in EventType::LIFECYCLE {
            dispatcher.subscribe_shared(event_type, Arc::clone(&on_state_change));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let actor = ConnectionActor {
            connector: Arc::clone(&self.connector),
            codec: Arc::clone(&self.codec),
            url,
            room_key: room_key.clone(),
            join_frame,
            reconnect: ReconnectState::new(&self.config.reconnect),
            state: Arc::clone(&self.state),
            dispatcher: Arc::clone(&dispatcher),
            commands: command_rx,
            shutdown: shutdown_rx,
        };

        tracing::info!(room = %room_key, user = %identity.user_name, "connecting to room");
        let task = tokio::spawn(actor.run());

        self.active = Some(ActiveConnection {
            room_key,
            commands: command_tx,
            shutdown: Some(shutdown_tx),
            task,
            dispatcher,
        });
        Ok(())
    }

    /// Sends a message to the room.
    ///
    /// # Errors
    /// Returns `ConnectionError::NotConnected` unless the connection is
    /// currently open, or `ConnectionError::Protocol` if encoding fails.
    pub fn send(&self, message: &ClientMessage) -> Result<(), ConnectionError> {
        let active = self.active.as_ref().ok_or(ConnectionError::NotConnected)?;
        if !self.state().is_open() {
            return Err(ConnectionError::NotConnected);
        }
        let frame = self.codec.encode(message)?;
        active
            .commands
            .send(frame)
            .map_err(|_| ConnectionError::NotConnected)
    }

    /// Adds a listener to the current connection's dispatcher.
    ///
    /// The listener lives as long as the connection; the next
    /// `connect()` or `disconnect()` removes it.
    ///
    /// # Errors
    /// Returns `ConnectionError::NotConnected` if there is no connection.
    pub fn subscribe<F>(
        &self,
        event_type: EventType,
        listener: F,
    ) -> Result<SubscriptionId, ConnectionError>
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let active = self.active.as_ref().ok_or(ConnectionError::NotConnected)?;
        Ok(active.dispatcher.subscribe(event_type, listener))
    }

    /// Removes a listener added with [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, event_type: EventType, id: SubscriptionId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.dispatcher.unsubscribe(&event_type, id))
    }

    /// Ends the current connection. A no-op if there is none.
    ///
    /// Listeners are removed first, so nothing is delivered during
    /// teardown.
    pub async fn disconnect(&mut self) {
        self.teardown().await;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The room of the current (or last requested) connection.
    pub fn room_key(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.room_key.as_str())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn teardown(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.dispatcher.clear();
        if let Some(shutdown) = active.shutdown.take() {
            // Err means the actor already finished on its own.
            let _ = shutdown.send(());
        }

        let grace = self.config.shutdown_timeout();
        if tokio::time::timeout(grace, &mut active.task).await.is_err() {
            tracing::warn!(
                room = %active.room_key,
                ?grace,
                "connection task did not stop in time, aborting"
            );
            active.task.abort();
        }

        self.state.send_replace(ConnectionState::Closed);
        tracing::info!(room = %active.room_key, "disconnected from room");
    }
}

impl<C: Connector, K: Codec> Drop for ConnectionManager<C, K> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.dispatcher.clear();
            active.task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// How one socket session ended.
enum SessionEnd {
    /// Transport-level failure. Retried while attempts remain.
    Dropped(Failure),
    AuthFailed(Failure),
    ServerDisconnect(String),
    /// The manager asked the actor to stop.
    Shutdown,
}

struct ConnectionActor<C: Connector, K: Codec> {
    connector: Arc<C>,
    codec: Arc<K>,
    url: String,
    room_key: String,
    /// Pre-encoded `join`, sent as the first frame of every socket.
    join_frame: String,
    reconnect: ReconnectState,
    state: Arc<watch::Sender<ConnectionState>>,
    dispatcher: Arc<Dispatcher>,
    commands: mpsc::UnboundedReceiver<String>,
    shutdown: oneshot::Receiver<()>,
}

impl<C: Connector, K: Codec> ConnectionActor<C, K> {
    async fn run(mut self) {
        tracing::debug!(room = %self.room_key, "connection actor started");

        loop {
            self.transition(ConnectionState::Connecting);
            self.emit(ConnectionEvent::Connecting {
                attempt: self.reconnect.attempts(),
            });

            let dialed = tokio::select! {
                _ = &mut self.shutdown => break,
                result = self.connector.connect(&self.url) => result,
            };

            let end = match dialed {
                Ok(conn) => self.serve(conn).await,
                Err(err) if err.is_unauthorized() => {
                    SessionEnd::AuthFailed(Failure::auth(err.to_string(), None))
                }
                Err(err) => SessionEnd::Dropped(Failure::network(err.to_string(), None)),
            };

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::AuthFailed(failure) => {
                    tracing::warn!(room = %self.room_key, %failure, "room rejected credentials");
                    self.emit(ConnectionEvent::Error(failure));
                    self.close(DisconnectReason::AuthFailed);
                    return;
                }
                SessionEnd::ServerDisconnect(reason) => {
                    tracing::info!(room = %self.room_key, %reason, "server ended the session");
                    self.emit(ConnectionEvent::Error(Failure::server(reason.clone())));
                    self.close(DisconnectReason::ServerRequested(reason));
                    return;
                }
                SessionEnd::Dropped(failure) => {
                    self.emit(ConnectionEvent::Error(failure.clone()));

                    if !self.reconnect.should_reconnect() {
                        tracing::warn!(
                            room = %self.room_key,
                            attempts = self.reconnect.attempts(),
                            %failure,
                            "giving up on room connection"
                        );
                        let attempts = self.reconnect.attempts();
                        self.close(DisconnectReason::Exhausted { attempts });
                        return;
                    }

                    let delay = self.reconnect.next_delay();
                    self.reconnect.record_attempt();
                    let attempt = self.reconnect.attempts();
                    tracing::info!(
                        room = %self.room_key,
                        attempt,
                        max = self.reconnect.max_attempts(),
                        ?delay,
                        %failure,
                        "connection lost, scheduling reconnect"
                    );
                    self.transition(ConnectionState::Reconnecting);
                    self.emit(ConnectionEvent::Reconnecting { attempt, delay });

                    tokio::select! {
                        _ = &mut self.shutdown => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        // Stopped by the manager. Listeners are already gone.
        self.transition(ConnectionState::Closed);
        tracing::debug!(room = %self.room_key, "connection actor stopped");
    }

    /// Runs one socket session until it ends, then closes the transport.
    async fn serve(&mut self, conn: C::Connection) -> SessionEnd {
        if let Err(err) = conn.send(self.join_frame.clone()).await {
            return SessionEnd::Dropped(Failure::network(err.to_string(), None));
        }

        self.reconnect.reset();
        self.transition(ConnectionState::Open);
        tracing::info!(room = %self.room_key, connection = %conn.id(), "connected to room");
        self.emit(ConnectionEvent::Connected {
            connection: conn.id(),
        });

        let end = loop {
            tokio::select! {
                _ = &mut self.shutdown => break SessionEnd::Shutdown,

                command = self.commands.recv() => match command {
                    Some(frame) => {
                        if let Err(err) = conn.send(frame).await {
                            break SessionEnd::Dropped(Failure::network(err.to_string(), None));
                        }
                    }
                    // The manager is gone.
                    None => break SessionEnd::Shutdown,
                },

                incoming = conn.recv() => match incoming {
                    Ok(Incoming::Data(bytes)) => {
                        if let Some(end) = self.handle_frame(&bytes) {
                            break end;
                        }
                    }
                    Ok(Incoming::Closed(Some(close))) if close.code == AUTH_FAILURE_CLOSE_CODE => {
                        break SessionEnd::AuthFailed(Failure::auth(close.reason, Some(close.code)));
                    }
                    Ok(Incoming::Closed(close)) => {
                        let (message, code) = match close {
                            Some(close) => (format!("closed by server: {}", close.reason), Some(close.code)),
                            None => ("connection closed".to_string(), None),
                        };
                        break SessionEnd::Dropped(Failure::network(message, code));
                    }
                    Err(err) => {
                        break SessionEnd::Dropped(Failure::network(err.to_string(), None));
                    }
                },
            }
        };

        if let Err(err) = conn.close().await {
            tracing::debug!(connection = %conn.id(), error = %err, "close after session end failed");
        }
        end
    }

    /// Decodes and publishes one inbound frame.
    ///
    /// Returns `Some` if the message ends the session.
    fn handle_frame(&self, bytes: &[u8]) -> Option<SessionEnd> {
        let msg: ServerMessage = match self.codec.decode(bytes) {
            Ok(msg) => msg,
            Err(err) => {
                tracing::warn!(room = %self.room_key, error = %err, "skipping malformed frame");
                self.emit(ConnectionEvent::Error(Failure::protocol(err.to_string())));
                return None;
            }
        };
        tracing::debug!(room = %self.room_key, message_type = %msg.message_type(), "frame received");

        let end = match &msg {
            ServerMessage::Error(payload) if payload.is_auth_failure() => Some(
                SessionEnd::AuthFailed(Failure::auth(payload.description(), payload.close_code)),
            ),
            ServerMessage::Error(payload) if payload.is_disconnect() => {
                Some(SessionEnd::ServerDisconnect(payload.description().to_string()))
            }
            _ => None,
        };

        self.emit(ConnectionEvent::Message(msg));
        end
    }

    fn close(&self, reason: DisconnectReason) {
        self.transition(ConnectionState::Closed);
        self.emit(ConnectionEvent::Disconnected { reason });
    }

    fn emit(&self, event: ConnectionEvent) {
        self.dispatcher.publish(&event.event_type(), &event);
    }

    fn transition(&self, next: ConnectionState) {
        let current = *self.state.borrow();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            tracing::warn!(from = %current, to = %next, "ignoring invalid connection state transition");
            return;
        }
        self.state.send_replace(next);
        tracing::debug!(room = %self.room_key, from = %current, to = %next, "connection state changed");
    }
}
