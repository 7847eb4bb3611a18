//! Wire message types: the JSON game envelope carried over a peer connection, and the
//! signals exchanged between an endpoint and the rendezvous relay.

use serde::{Deserialize, Serialize};

use crate::claim::ClaimKind;
use crate::identity::{ConnectionId, PeerId};
use crate::session::Session;

/// Rendezvous protocol version. Sent in the handshake and in `Signal::Hello`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Game messages between player and host. Encoded as JSON with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Player → host: register under a display name.
    #[serde(rename = "JOIN")]
    Join { payload: JoinPayload },
    /// Player → host: assert a winning pattern.
    #[serde(rename = "CLAIM")]
    Claim { payload: ClaimPayload },
    /// Host → player: full session snapshot.
    #[serde(rename = "STATE_UPDATE")]
    StateUpdate { state: Session },
    /// Any other `type`. Receivers log and drop it.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinPayload {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPayload {
    pub claim_type: ClaimKind,
    #[serde(default)]
    pub player_name: Option<String>,
}

impl Message {
    pub fn join(name: impl Into<String>) -> Self {
        Message::Join {
            payload: JoinPayload {
                name: Some(name.into()),
            },
        }
    }

    pub fn state_update(state: &Session) -> Self {
        Message::StateUpdate {
            state: state.clone(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(MessageError::Encode)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(MessageError::Decode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("failed to encode message: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(serde_json::Error),
}

/// Failure taxonomy reported by the rendezvous point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelErrorKind {
    /// Requested id is taken; a fresh one is assigned instead.
    UnavailableId,
    /// Transport to the rendezvous point failed.
    Network,
    /// Rendezvous point reported an internal failure.
    ServerError,
    /// Connection target does not exist.
    PeerUnavailable,
    Other,
}

impl ChannelErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnavailableId => "unavailable-id",
            Self::Network => "network",
            Self::ServerError => "server-error",
            Self::PeerUnavailable => "peer-unavailable",
            Self::Other => "other",
        }
    }
}

/// Opaque metadata the initiator attaches to a connection request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectMetadata {
    pub player_name: Option<String>,
}

/// Endpoint ⇄ rendezvous relay signals. Encoding is bincode; framing is length-prefix (see wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Signal {
    /// Endpoint → relay, first frame: register, optionally asking for a previous id back.
    Hello {
        protocol_version: u8,
        requested_id: Option<PeerId>,
    },
    /// Relay → endpoint: identity assigned.
    Open { id: PeerId },
    /// Endpoint → relay: open a data connection to `target`.
    Connect {
        conn: ConnectionId,
        target: PeerId,
        metadata: ConnectMetadata,
    },
    /// Relay → target endpoint: someone wants a connection.
    Incoming {
        conn: ConnectionId,
        from: PeerId,
        metadata: ConnectMetadata,
    },
    /// Target endpoint → relay: accept an incoming connection.
    Accept { conn: ConnectionId },
    /// Relay → both ends: connection is open.
    Opened { conn: ConnectionId },
    /// Application payload on an open connection (either direction).
    Data { conn: ConnectionId, payload: Vec<u8> },
    /// Endpoint → relay: close a connection.
    Close { conn: ConnectionId },
    /// Relay → endpoint: connection closed (by either side or because the other end left).
    Closed { conn: ConnectionId },
    /// Relay → endpoint: failure, scoped to a connection when `conn` is set.
    Error {
        conn: Option<ConnectionId>,
        kind: ChannelErrorKind,
        message: String,
    },
}
