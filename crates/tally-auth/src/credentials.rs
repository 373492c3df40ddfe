//! Integration credentials.

use serde::{Deserialize, Serialize};

/// Access credentials for one integration.
///
/// Supplied by the caller on every call. Nothing in this crate keeps
/// them; refreshed credentials are handed back through a persistence
/// callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token expiry, epoch milliseconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl Credentials {
    /// Credentials with no refresh token and unknown expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn expiring_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns `true` if the token is known to expire within `window_ms`
    /// of `now_ms` (or has already expired). Unknown expiry is never
    /// "expiring".
    pub fn expires_within(&self, now_ms: i64, window_ms: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at.saturating_sub(now_ms) <= window_ms)
    }
}
