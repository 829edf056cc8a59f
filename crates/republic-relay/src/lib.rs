//! # REPUBLIC relay
//!
//! A WebSocket relay that lets 2–4 game clients find each other by a
//! four-character room code and pass turns, actions, and state snapshots
//! between them. The relay never looks inside game state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use republic_relay::prelude::*;
//!
//! # async fn run() -> Result<(), RelayError> {
//! let server = RelayServer::builder()
//!     .config(RelayConfig::from_env())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod maintenance;
mod server;

pub use config::{DEFAULT_PORT, RelayConfig};
pub use error::RelayError;
pub use server::{RelayServer, RelayServerBuilder};

/// Convenience re-exports for embedding a relay.
pub mod prelude {
    pub use crate::{RelayConfig, RelayError, RelayServer, RelayServerBuilder};
    pub use republic_protocol::{
        Envelope, MessageKind, PlayerId, PlayerInfo, ProtocolError, RoomCode,
    };
    pub use republic_room::{RoomConfig, RoomError};
    pub use republic_transport::TransportError;
}
