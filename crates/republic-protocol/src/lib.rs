//! Wire protocol for the REPUBLIC relay.
//!
//! This crate defines the "language" that game clients and the relay speak:
//!
//! - **Types** ([`Envelope`], [`MessageKind`], [`PlayerId`], [`RoomCode`],
//!   [`PlayerInfo`]): the structures that travel on the wire.
//! - **Payloads** ([`payload`]): the `data` shape of each message kind.
//! - **Codec** ([`Envelope::to_json`], [`Envelope::from_json`]): one JSON
//!   object per text frame.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (text frames) and the room
//! registry / client session. It knows nothing about sockets or rooms.
//!
//! ```text
//! Transport (text) → Protocol (Envelope) → Registry / Session
//! ```

mod codec;
mod error;
pub mod payload;
mod types;

pub use error::ProtocolError;
pub use payload::PlayerInfo;
pub use types::{
    COLOR_PALETTE, Envelope, MessageKind, PlayerId, ROOM_CODE_ALPHABET,
    ROOM_CODE_LEN, RoomCode, now_timestamp,
};
