//! Wire protocol for Tally.
//!
//! This crate defines the "language" a Tally client and a room server
//! speak:
//!
//! - **Snapshot types** ([`RoomSnapshot`], [`TimerState`], [`RoomSettings`]):
//!   the complete room description the server pushes on every change.
//! - **Messages** ([`ServerMessage`], [`ClientMessage`]): `type`-tagged
//!   JSON objects exchanged over the socket.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become
//!   text frames and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Protocol (ServerMessage) → Connection (events)
//! ```
//!
//! Snapshots are deserialized with every optional field defaulted here,
//! at the boundary, so downstream code never null-coalesces.

mod codec;
mod error;
mod message;
mod snapshot;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use message::{
    AUTH_FAILURE_CLOSE_CODE, ClientMessage, ErrorPayload, ErrorReason,
    MessageType, ServerMessage,
};
pub use snapshot::{
    ExtraVoteOption, RoomSettings, RoomSnapshot, StructuredVote,
    TicketQueueItem, TimerState,
};
pub use types::{ExternalService, VoteValue};
