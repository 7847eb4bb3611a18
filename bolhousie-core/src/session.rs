//! Session data model: the snapshot the host owns and broadcasts on every change.

use serde::{Deserialize, Serialize};

use crate::catalog::Item;
use crate::claim::ClaimKind;
use crate::identity::PeerId;

/// Display name used when a JOIN carries no name.
pub const DEFAULT_PLAYER_NAME: &str = "Anonymous";

/// Display name used when a CLAIM carries no player name.
pub const UNKNOWN_CLAIMANT: &str = "Unknown";

/// Session lifecycle. `Ended` is reserved: nothing transitions into it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Lobby,
    Playing,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PeerId,
    pub name: String,
    /// Always 0; kept for the wire format.
    #[serde(default)]
    pub score: u32,
}

/// A catalog item as announced, with the one tagline picked for this call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    #[serde(flatten)]
    pub item: Item,
    pub tagline: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Claims are informational; no adjudication step exists.
    #[default]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// Creation time in milliseconds; strictly increasing within a session.
    pub id: i64,
    pub player_id: PeerId,
    /// Claimant's display name as reported in the CLAIM.
    pub player: String,
    #[serde(rename = "type")]
    pub kind: ClaimKind,
    pub status: ClaimStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub status: SessionStatus,
    #[serde(default)]
    pub history: Vec<Call>,
    /// Join order.
    #[serde(default)]
    pub players: Vec<Player>,
    /// Most recent first.
    #[serde(default)]
    pub claims: Vec<Claim>,
    pub current_tagline: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self, id: &PeerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn has_player(&self, id: &PeerId) -> bool {
        self.player(id).is_some()
    }

    pub fn last_call(&self) -> Option<&Call> {
        self.history.last()
    }
}
