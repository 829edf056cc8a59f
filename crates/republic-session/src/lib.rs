//! Client session for the REPUBLIC relay.
//!
//! A game embeds one [`RelaySession`] to talk to the relay: dial it, create
//! or join a room, then exchange game traffic with everyone else in that
//! room. Everything the relay pushes arrives as a [`SessionEvent`] on the
//! channel returned by [`RelaySession::new`].
//!
//! # Key types
//!
//! - [`RelaySession`]: the connection, the current room and its roster
//! - [`SessionConfig`]: relay URL, retry and timeout settings
//! - [`ConnectionState`]: where the session is in its lifecycle
//! - [`SessionEvent`]: roster changes, game traffic, disconnects
//! - [`SessionError`]: what a failed operation reports

mod config;
mod error;
mod event;
mod session;

pub use config::{DEFAULT_RELAY_URL, SessionConfig};
pub use error::SessionError;
pub use event::{ConnectionState, SessionEvent};
pub use session::{JoinedRoom, RelaySession};
