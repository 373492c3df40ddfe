//! # Tally
//!
//! Client core for live planning-poker rooms.
//!
//! Tally keeps one participant's view of a shared estimation room
//! consistent over an unreliable WebSocket. The server owns the room and
//! pushes complete snapshots; the client reconnects with backoff, swaps
//! snapshots in wholesale, and derives everything else (phase, vote
//! statistics, the round timer) from the latest one.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tally::prelude::*;
//!
//! # async fn run() -> Result<(), TallyError> {
//! tally::logging::init();
//!
//! let mut client = TallyClient::builder()
//!     .server_url("wss://tally.example")
//!     .user("alice")
//!     .build()?;
//!
//! client
//!     .join("sprint-42", |event| tracing::info!(?event, "room event"))
//!     .await?;
//!
//! if let Some(view) = client.room().view(&SystemClock) {
//!     println!("{} with {} votes", view.phase, view.stats.total_votes);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Layer | Crate |
//! |---|---|
//! | WebSocket transport | `tally-transport` |
//! | Wire messages and snapshots | `tally-protocol` |
//! | Reconnecting connection, event dispatch | `tally-connection` |
//! | Phase and vote statistics | `tally-room` |
//! | Timer reconciliation | `tally-timer` |
//! | Integration token refresh | `tally-auth` |

mod client;
mod error;
pub mod logging;
mod room_view;

pub use client::{TallyClient, TallyClientBuilder};
pub use error::TallyError;
pub use room_view::{RoomStore, RoomView};

pub use tally_auth as auth;
pub use tally_connection as connection;
pub use tally_protocol as protocol;
pub use tally_room as room;
pub use tally_timer as timer;
pub use tally_transport as transport;

/// Common imports for applications.
pub mod prelude {
    pub use crate::{RoomStore, RoomView, TallyClient, TallyClientBuilder, TallyError};
    pub use tally_auth::{
        Credentials, IntegrationError, RefreshClient, RefreshConfig, RefreshRequest,
        TokenRefreshCoordinator,
    };
    pub use tally_connection::{
        ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionState, DisconnectReason,
        EventType, ReconnectConfig,
    };
    pub use tally_protocol::{
        ClientMessage, ExternalService, RoomSettings, RoomSnapshot, ServerMessage, TimerState,
        VoteValue,
    };
    pub use tally_room::{RoomPhase, VoteStats};
    pub use tally_timer::{Clock, SystemClock, TimerView};
    pub use tally_transport::{Connector, WebSocketConnector};
}
