//! Connection configuration and client identity.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ConnectionError;

// ---------------------------------------------------------------------------
// ReconnectConfig
// ---------------------------------------------------------------------------

/// Reconnect backoff parameters.
///
/// Loadable from JSON; any missing field falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Retries allowed before the connection is reported as lost.
    /// 0 disables reconnection entirely.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single retry delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// - `base_delay_ms` is at least 1 ms.
    /// - `max_delay_ms` is never below `base_delay_ms`.
    pub fn validated(mut self) -> Self {
        if self.base_delay_ms == 0 {
            tracing::warn!("base_delay_ms of 0 would retry in a hot loop, using 1 ms");
            self.base_delay_ms = 1;
        }
        if self.max_delay_ms < self.base_delay_ms {
            tracing::warn!(
                max = self.max_delay_ms,
                base = self.base_delay_ms,
                "max_delay_ms below base_delay_ms, raising it"
            );
            self.max_delay_ms = self.base_delay_ms;
        }
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Everything the connection manager needs besides the connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Base WebSocket URL of the room server, e.g. `wss://tally.example`.
    pub server_url: String,
    pub reconnect: ReconnectConfig,
    /// How long `disconnect` waits for the actor to close the socket
    /// before aborting it.
    pub shutdown_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080".to_string(),
            reconnect: ReconnectConfig::default(),
            shutdown_timeout_ms: 1_000,
        }
    }
}

impl ConnectionConfig {
    /// A default config pointing at `server_url`.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Validates nested settings.
    pub fn validated(mut self) -> Self {
        self.reconnect = self.reconnect.validated();
        self
    }

    /// The socket URL for a given room: `{server_url}/ws/{room_key}`.
    ///
    /// The room key is one percent-encoded path segment, so `/`, `?` and
    /// `#` in a key can't change which path the server sees.
    ///
    /// # Errors
    /// - `InvalidRoomKey` for an empty or blank key, or for `.` and `..`
    ///   which URL normalization would drop.
    /// - `InvalidServerUrl` if `server_url` doesn't parse or can't have
    ///   a path (`mailto:` style URLs).
    pub fn room_url(&self, room_key: &str) -> Result<String, ConnectionError> {
        if room_key.trim().is_empty() || matches!(room_key, "." | "..") {
            return Err(ConnectionError::InvalidRoomKey(room_key.to_string()));
        }
        let invalid = |reason: String| ConnectionError::InvalidServerUrl {
            url: self.server_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.server_url).map_err(|err| invalid(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("ws")
            .push(room_key);
        Ok(url.into())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Who the client claims to be when joining a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_name: String,
    /// Session token issued by the room server's auth endpoint, if the
    /// room requires one.
    pub auth_token: Option<String>,
}

impl Identity {
    /// An identity without an auth token.
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            auth_token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}
