//! Room configuration.

use republic_protocol::COLOR_PALETTE;
use serde::{Deserialize, Serialize};

/// Limits and defaults shared by every room in a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Maximum players allowed in a room.
    pub max_players: usize,

    /// Colours handed out, in order, when a joiner asks for one already taken.
    pub palette: Vec<String>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            palette: COLOR_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl RoomConfig {
    /// Picks the colour a joiner ends up with: the requested one if nobody
    /// in `taken` has it, otherwise the first free palette colour. If the
    /// palette is exhausted the request is kept as-is.
    pub fn assign_color<'a>(
        &self,
        requested: &str,
        taken: impl Iterator<Item = &'a str> + Clone,
    ) -> String {
        if !taken.clone().any(|c| c == requested) {
            return requested.to_string();
        }
        self.palette
            .iter()
            .find(|candidate| !taken.clone().any(|c| c == candidate.as_str()))
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }
}
