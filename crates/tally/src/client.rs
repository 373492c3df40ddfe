//! `TallyClient` builder and room session API.
//!
//! This is the entry point for an application joining a room. It ties
//! the layers together: transport → protocol → connection → room view.

use std::sync::Arc;
use std::time::Duration;

use tally_connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, EventType, Identity,
    ReconnectConfig, SubscriptionId,
};
use tally_protocol::{ClientMessage, StructuredVote, VoteValue};
use tally_transport::{Connector, WebSocketConnector};
use tokio::sync::watch;

use crate::TallyError;
use crate::room_view::RoomStore;

/// Builder for configuring a [`TallyClient`].
///
/// # Example
///
/// ```rust,ignore
/// use tally::prelude::*;
///
/// let mut client = TallyClient::builder()
///     .server_url("wss://tally.example")
///     .user("alice")
///     .build()?;
/// client.join("sprint-42", |event| println!("{event:?}")).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TallyClientBuilder {
    config: ConnectionConfig,
    user_name: Option<String>,
    auth_token: Option<String>,
}

impl TallyClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base WebSocket URL of the room server.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Sets the name shown to other participants. Required.
    pub fn user(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Replaces the whole connection config (e.g. one loaded from JSON).
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds a client that dials real WebSockets.
    ///
    /// # Errors
    /// Returns `TallyError::Config` if no user name was set.
    pub fn build(self) -> Result<TallyClient<WebSocketConnector>, TallyError> {
        self.build_with(WebSocketConnector)
    }

    /// Builds a client on a custom connector.
    ///
    /// # Errors
    /// Returns `TallyError::Config` if no user name was set.
    pub fn build_with<C: Connector>(self, connector: C) -> Result<TallyClient<C>, TallyError> {
        let user_name = self
            .user_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| TallyError::Config("a user name is required".into()))?;
        let identity = Identity {
            user_name,
            auth_token: self.auth_token,
        };
        Ok(TallyClient {
            manager: ConnectionManager::new(connector, self.config),
            identity,
            room: Arc::new(RoomStore::new()),
        })
    }
}

/// One participant's session in a room.
///
/// Keeps the latest room snapshot in a [`RoomStore`] as messages arrive,
/// and sends the participant's actions to the server.
pub struct TallyClient<C: Connector = WebSocketConnector> {
    manager: ConnectionManager<C>,
    identity: Identity,
    room: Arc<RoomStore>,
}

impl TallyClient<WebSocketConnector> {
    /// Creates a new builder.
    pub fn builder() -> TallyClientBuilder {
        TallyClientBuilder::new()
    }
}

impl<C: Connector> TallyClient<C> {
    /// Joins `room_key`, leaving any room joined before.
    ///
    /// The previous connection is fully torn down before the room store
    /// is reset, so nothing from the old room leaks into the new view.
    /// The room store is updated before `on_event` sees each message, so
    /// the callback can read the new snapshot from [`room`](Self::room).
    ///
    /// # Errors
    /// Returns an error if the room key or server URL can't form a socket
    /// URL (the current room is kept), or if the join message can't be
    /// encoded.
    pub async fn join<F>(&mut self, room_key: impl Into<String>, on_event: F) -> Result<(), TallyError>
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let room_key = room_key.into();
        // Bad keys fail here, before the current room is left.
        self.manager.config().room_url(&room_key)?;
        self.manager.disconnect().await;
        let epoch = self.room.begin_session();
        let on_event = Arc::new(on_event);
        let on_message = {
            let room = Arc::clone(&self.room);
            let on_event = Arc::clone(&on_event);
            move |msg: &tally_protocol::ServerMessage| {
                room.apply_in(epoch, msg);
                on_event(&ConnectionEvent::Message(msg.clone()));
            }
        };
        let on_state_change = move |event: &ConnectionEvent| on_event(event);

        self.manager
            .connect(room_key, self.identity.clone(), on_message, on_state_change)
            .await?;
        Ok(())
    }

    /// Leaves the current room. A no-op if not joined.
    pub async fn leave(&mut self) {
        self.manager.disconnect().await;
        self.room.clear();
    }

    /// The live room view for this session.
    pub fn room(&self) -> &Arc<RoomStore> {
        &self.room
    }

    pub fn user_name(&self) -> &str {
        &self.identity.user_name
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch_state()
    }

    /// Adds a listener for one event type on the current connection.
    ///
    /// # Errors
    /// Returns an error if not joined.
    pub fn subscribe<F>(&self, event_type: EventType, listener: F) -> Result<SubscriptionId, TallyError>
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        Ok(self.manager.subscribe(event_type, listener)?)
    }

    pub fn unsubscribe(&self, event_type: EventType, id: SubscriptionId) -> bool {
        self.manager.unsubscribe(event_type, id)
    }

    /// Casts a vote, or retracts it with `None`.
    ///
    /// # Errors
    /// Every send fails with `ConnectionError::NotConnected` unless the
    /// connection is open.
    pub fn vote(&self, value: Option<VoteValue>) -> Result<(), TallyError> {
        self.send(ClientMessage::Vote {
            value,
            structured_vote: None,
        })
    }

    pub fn vote_structured(&self, value: Option<VoteValue>, structured: StructuredVote) -> Result<(), TallyError> {
        self.send(ClientMessage::Vote {
            value,
            structured_vote: Some(structured),
        })
    }

    pub fn show_votes(&self) -> Result<(), TallyError> {
        self.send(ClientMessage::ShowVotes)
    }

    pub fn reset_votes(&self) -> Result<(), TallyError> {
        self.send(ClientMessage::ResetVotes)
    }

    pub fn next_ticket(&self) -> Result<(), TallyError> {
        self.send(ClientMessage::NextTicket)
    }

    pub fn start_timer(&self) -> Result<(), TallyError> {
        self.send(ClientMessage::StartTimer)
    }

    pub fn pause_timer(&self) -> Result<(), TallyError> {
        self.send(ClientMessage::PauseTimer)
    }

    pub fn reset_timer(&self) -> Result<(), TallyError> {
        self.send(ClientMessage::ResetTimer)
    }

    pub fn ping(&self) -> Result<(), TallyError> {
        self.send(ClientMessage::Ping)
    }

    fn send(&self, message: ClientMessage) -> Result<(), TallyError> {
        tracing::debug!(?message, "sending");
        Ok(self.manager.send(&message)?)
    }
}

impl<C: Connector> std::fmt::Debug for TallyClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TallyClient")
            .field("user", &self.identity.user_name)
            .field("room", &self.manager.room_key())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_user_name() {
        let err = TallyClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, TallyError::Config(_)));

        let err = TallyClientBuilder::new().user("   ").build().unwrap_err();
        assert!(matches!(err, TallyError::Config(_)));
    }

    #[tokio::test]
    async fn test_builder_settings_reach_client() {
        let client = TallyClient::builder()
            .server_url("wss://tally.example")
            .user("alice")
            .auth_token("t0k")
            .shutdown_timeout(Duration::from_millis(250))
            .build()
            .unwrap();

        assert_eq!(client.user_name(), "alice");
        assert_eq!(client.identity.auth_token.as_deref(), Some("t0k"));
        assert_eq!(client.manager.config().server_url, "wss://tally.example");
        assert_eq!(client.manager.config().shutdown_timeout_ms, 250);
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_actions_before_join_are_rejected() {
        let client = TallyClient::builder().user("alice").build().unwrap();
        assert!(matches!(
            client.vote(Some(VoteValue::new("5"))),
            Err(TallyError::Connection(_))
        ));
        assert!(client.show_votes().is_err());
        assert!(client.subscribe(EventType::Connected, |_| {}).is_err());
    }
}
