//! Room registry for the REPUBLIC relay.
//!
//! Rooms are plain data owned by one [`RoomRegistry`]. The relay keeps the
//! registry behind a single lock, so a room and the player index never
//! disagree. Members are reached through [`SocketHandle`]s, never sockets.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms, routes players, migrates hosts
//! - [`Room`]: one room's members, host, and activity clock
//! - [`SocketHandle`]: the outbound channel of one member's socket
//! - [`RoomConfig`]: player limit and colour palette
//! - [`RoomError`]: why a create or join was refused

mod config;
mod error;
mod registry;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use registry::{JoinOutcome, LeaveOutcome, RegistryStats, RoomRegistry};
pub use room::{Frame, PlayerSender, Room, SocketHandle};
