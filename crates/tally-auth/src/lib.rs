//! Integration credentials for Tally.
//!
//! Rooms can be linked to an issue tracker (Jira, Linear, GitHub). Calls
//! to that tracker run through [`TokenRefreshCoordinator`], which
//! refreshes an expiring access token before the call and retries once
//! with a fresh token when the tracker rejects the current one. The
//! caller owns credential storage: refreshed [`Credentials`] are handed
//! back through a persistence callback before they're used.
//!
//! [`RefreshClient`] talks to the room server's refresh endpoint and is
//! the usual `refresh` callback.
//!
//! ```ignore
//! let coordinator = TokenRefreshCoordinator::new(RefreshConfig::default());
//! let issues = coordinator
//!     .execute_with_refresh(
//!         &credentials,
//!         |token| tracker.search(token, "sprint = 42"),
//!         |refresh_token| client.refresh(ExternalService::Jira, &request(refresh_token)),
//!         |fresh| store.save(fresh),
//!     )
//!     .await?;
//! ```

mod client;
mod coordinator;
mod credentials;
mod error;

pub use client::{RefreshClient, RefreshRequest};
pub use coordinator::{DEFAULT_REFRESH_WINDOW_MS, RefreshConfig, TokenRefreshCoordinator};
pub use credentials::Credentials;
pub use error::{IntegrationError, RECONNECT_REQUIRED_CODE};
