//! Room connection management for Tally.
//!
//! This crate owns the client's single logical connection to a room:
//!
//! 1. **Lifecycle**: an explicit state machine ([`ConnectionState`])
//!    driven by a per-connection actor task ([`ConnectionManager`]).
//! 2. **Reconnection**: bounded exponential backoff with jitter
//!    ([`ReconnectState`]); authentication failures are never retried.
//! 3. **Dispatch**: inbound messages and lifecycle events fan out to
//!    listeners through a per-connection [`EventDispatcher`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← callbacks, derived room views
//!     ↕
//! Connection Layer (this crate)  ← state machine, retries, dispatch
//!     ↕
//! Protocol + Transport (below)  ← ServerMessage, Connector
//! ```

mod config;
mod dispatcher;
mod error;
mod event;
mod manager;
mod reconnect;
mod state;

pub use config::{ConnectionConfig, Identity, ReconnectConfig};
pub use dispatcher::{EventDispatcher, Listener, SubscriptionId};
pub use error::{ConnectionError, Failure, FailureKind};
pub use event::{ConnectionEvent, DisconnectReason, EventType};
pub use manager::ConnectionManager;
pub use reconnect::ReconnectState;
pub use state::ConnectionState;
