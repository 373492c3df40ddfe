//! HTTP client for the room server's integration token refresh endpoint.
//!
//! ```text
//! POST {base}/api/{provider}/refresh
//! { "roomKey": "...", "userName": "...", "refreshToken": "..." }
//!   → { "accessToken": "...", "refreshToken": "...", "expiresIn": 3600 }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tally_protocol::ExternalService;
use tally_timer::{Clock, SystemClock};

use crate::{Credentials, IntegrationError};

/// Body of a refresh request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub room_key: String,
    pub user_name: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds until the new access token expires.
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Calls the refresh endpoint for one room server.
#[derive(Clone)]
pub struct RefreshClient {
    http: reqwest::Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl RefreshClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Uses a preconfigured `reqwest` client (timeouts, proxies, ...).
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to compute `expires_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Exchanges a refresh token for new credentials.
    ///
    /// If the server doesn't rotate the refresh token, the one from the
    /// request is kept.
    ///
    /// # Errors
    /// - `service` has no provider (no integration configured).
    /// - Transport failures, non-2xx responses (with status, and
    ///   message and code taken from the body when it has them), or an
    ///   unparseable success body.
    #[tracing::instrument(skip_all, fields(provider = ?service.provider(), room = %request.room_key))]
    pub async fn refresh(
        &self,
        service: ExternalService,
        request: &RefreshRequest,
    ) -> Result<Credentials, IntegrationError> {
        let Some(provider) = service.provider() else {
            return Err(IntegrationError::new("no integration configured for this room"));
        };
        let url = format!("{}/api/{provider}/refresh", self.base_url);

        let resp = self.http.post(&url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = parse_error_body(provider, status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), error = %err, "token refresh rejected");
            return Err(err);
        }

        let data: TokenResponse = resp.json().await?;
        let expires_at = data
            .expires_in
            .map(|secs| self.clock.now_ms().saturating_add(secs.saturating_mul(1_000)));
        tracing::info!(?expires_at, "integration token refreshed");

        Ok(Credentials {
            access_token: data.access_token,
            refresh_token: data
                .refresh_token
                .or_else(|| Some(request.refresh_token.clone())),
            expires_at,
        })
    }
}

impl std::fmt::Debug for RefreshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Builds an error from a failed response body. Never fails: anything
/// that isn't the expected JSON falls back to a generic message.
fn parse_error_body(provider: &str, status: u16, body: &str) -> IntegrationError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .or(parsed.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("{provider} token refresh failed ({status})"));
    IntegrationError {
        message,
        status: Some(status),
        code: parsed.code,
    }
}
