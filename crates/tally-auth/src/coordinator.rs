//! Proactive and reactive credential refresh around integration calls.
//!
//! ```text
//! expiring soon? ──yes──→ refresh ──ok──→ persist ──→ operation(new)
//!      │                     │
//!      no                  failed ─────────────────→ operation(old)
//!      ▼
//! operation(old) ──401──→ refresh ──→ persist ──→ operation(new) ──fails──→ reconnect error
//! ```
//!
//! At most one refresh happens per call, and persistence always finishes
//! before the operation runs with the new token.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use tally_timer::{Clock, SystemClock};

use crate::{Credentials, IntegrationError, RECONNECT_REQUIRED_CODE};

/// Refresh tokens expiring within this many milliseconds before use.
pub const DEFAULT_REFRESH_WINDOW_MS: i64 = 300_000;

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshConfig {
    pub refresh_window_ms: i64,
    /// Error message shown when the integration has to be reconnected
    /// by the user.
    pub reconnect_message: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_window_ms: DEFAULT_REFRESH_WINDOW_MS,
            reconnect_message: "Your integration session has expired. Please reconnect it."
                .to_string(),
        }
    }
}

impl RefreshConfig {
    /// A default config with a custom reconnect message.
    pub fn with_reconnect_message(message: impl Into<String>) -> Self {
        Self {
            reconnect_message: message.into(),
            ..Default::default()
        }
    }

    /// A negative window is treated as 0 (refresh only once expired).
    pub fn validated(mut self) -> Self {
        if self.refresh_window_ms < 0 {
            tracing::warn!(window = self.refresh_window_ms, "negative refresh window, using 0");
            self.refresh_window_ms = 0;
        }
        self
    }
}

/// Runs integration calls with automatic credential refresh.
///
/// Stateless apart from its config and clock: credentials come in with
/// each call and go out through the caller's persistence callback.
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    config: RefreshConfig,
    clock: Arc<dyn Clock>,
}

impl TokenRefreshCoordinator {
    pub fn new(config: RefreshConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RefreshConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: config.validated(),
            clock,
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// A copy of this coordinator that reports `message` when the user
    /// has to reconnect. Lets one coordinator serve several providers,
    /// each with its own wording.
    #[must_use]
    pub fn with_reconnect_message(&self, message: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.config.reconnect_message = message.into();
        copy
    }

    /// A copy of this coordinator with a different proactive refresh
    /// window. Negative windows are clamped to 0.
    #[must_use]
    pub fn with_refresh_window(&self, window_ms: i64) -> Self {
        let mut copy = self.clone();
        copy.config = RefreshConfig {
            refresh_window_ms: window_ms,
            ..copy.config
        }
        .validated();
        copy
    }

    /// Runs `operation` with a usable access token.
    ///
    /// - `operation` receives the access token to use.
    /// - `refresh` exchanges a refresh token for new credentials.
    /// - `on_refresh` persists new credentials; it completes before
    ///   `operation` is called with them.
    ///
    /// # Errors
    /// - The operation's own error when it isn't an auth failure, or
    ///   when there is no refresh token to recover with.
    /// - An error carrying the configured reconnect message (code
    ///   `reconnect_required`) when the token was rejected and a refresh
    ///   didn't fix it.
    /// - The persistence callback's error, unchanged.
    pub async fn execute_with_refresh<T, Op, OpFut, Ref, RefFut, Per, PerFut>(
        &self,
        credentials: &Credentials,
        mut operation: Op,
        mut refresh: Ref,
        mut on_refresh: Per,
    ) -> Result<T, IntegrationError>
    where
        Op: FnMut(String) -> OpFut,
        OpFut: Future<Output = Result<T, IntegrationError>>,
        Ref: FnMut(String) -> RefFut,
        RefFut: Future<Output = Result<Credentials, IntegrationError>>,
        Per: FnMut(Credentials) -> PerFut,
        PerFut: Future<Output = Result<(), IntegrationError>>,
    {
        let Some(refresh_token) = credentials.refresh_token.clone() else {
            return operation(credentials.access_token.clone()).await;
        };

        let now = self.clock.now_ms();
        let mut token = credentials.access_token.clone();
        let mut refresh_attempted = false;

        if credentials.expires_within(now, self.config.refresh_window_ms) {
            refresh_attempted = true;
            tracing::debug!(expires_at = ?credentials.expires_at, now, "token expiring, refreshing first");
            match refresh(refresh_token.clone()).await {
                Ok(fresh) => {
                    token = fresh.access_token.clone();
                    on_refresh(fresh).await?;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "proactive token refresh failed, trying existing token");
                }
            }
        }

        let err = match operation(token).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_unauthorized() => return Err(err),
            Err(err) => err,
        };

        if refresh_attempted {
            tracing::warn!(error = %err, "token rejected after refresh, reconnect required");
            return Err(self.reconnect_error(&err));
        }

        tracing::info!(error = %err, "token rejected, refreshing and retrying once");
        let fresh = match refresh(refresh_token).await {
            Ok(fresh) => fresh,
            Err(refresh_err) => {
                tracing::warn!(error = %refresh_err, "token refresh failed, reconnect required");
                return Err(self.reconnect_error(&err));
            }
        };
        let token = fresh.access_token.clone();
        on_refresh(fresh).await?;

        operation(token).await.map_err(|retry_err| {
            tracing::warn!(error = %retry_err, "retry after refresh failed, reconnect required");
            self.reconnect_error(&retry_err)
        })
    }

    fn reconnect_error(&self, cause: &IntegrationError) -> IntegrationError {
        IntegrationError {
            message: self.config.reconnect_message.clone(),
            status: cause.status,
            code: Some(RECONNECT_REQUIRED_CODE.to_string()),
        }
    }
}

impl std::fmt::Debug for TokenRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefreshCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
