//! Host-driven API: `HostSession` receives connection and game events, returns the frames to send.
//!
//! The session is the only copy of the game state. Every mutation is followed by a full
//! snapshot broadcast to all open connections, so a player that missed an update converges on
//! the next one.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::caller::{AudioIndex, Caller, CallerError};
use crate::catalog::Catalog;
use crate::identity::{ConnectionId, PeerId};
use crate::protocol::{ClaimPayload, Message};
use crate::session::{
    Call, Claim, ClaimStatus, Player, Session, SessionStatus, DEFAULT_PLAYER_NAME,
    UNKNOWN_CLAIMANT,
};

/// Inputs to the host reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A player's connection request reached us. Not yet open.
    ConnectionAccepted { conn: ConnectionId, peer: PeerId },
    /// The connection is open and can carry data.
    ConnectionOpened(ConnectionId),
    /// Raw JSON frame from a player.
    MessageReceived { conn: ConnectionId, bytes: Vec<u8> },
    ConnectionClosed(ConnectionId),
    /// Reset history and the caller pool, enter PLAYING.
    StartGame { audio: AudioIndex },
    /// Record an already-drawn call.
    Call(Call),
}

/// Action for the host's transport to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    Send(ConnectionId, Vec<u8>),
}

struct Link {
    conn: ConnectionId,
    peer: PeerId,
    open: bool,
}

/// Authoritative session plus the connection set it fans out to.
pub struct HostSession {
    session: Session,
    links: Vec<Link>,
    caller: Caller,
    catalog: Catalog,
    rng: StdRng,
    last_claim_id: i64,
}

impl HostSession {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_rng(catalog, StdRng::from_entropy())
    }

    /// Deterministic shuffles and taglines, for tests and replays.
    pub fn with_seed(catalog: Catalog, seed: u64) -> Self {
        Self::with_rng(catalog, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: Catalog, rng: StdRng) -> Self {
        Self {
            session: Session::new(),
            links: Vec::new(),
            caller: Caller::new(),
            catalog,
            rng,
            last_claim_id: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn remaining_calls(&self) -> usize {
        self.caller.remaining()
    }

    /// Connections that receive broadcasts.
    pub fn open_connections(&self) -> impl Iterator<Item = (&ConnectionId, &PeerId)> {
        self.links
            .iter()
            .filter(|l| l.open)
            .map(|l| (&l.conn, &l.peer))
    }

    /// Single entry point: route one event to its handler.
    pub fn apply(&mut self, event: HostEvent) -> Vec<OutboundAction> {
        match event {
            HostEvent::ConnectionAccepted { conn, peer } => {
                self.accept_connection(conn, peer);
                Vec::new()
            }
            HostEvent::ConnectionOpened(conn) => self.on_open(&conn),
            HostEvent::MessageReceived { conn, bytes } => self.on_message(&conn, &bytes),
            HostEvent::ConnectionClosed(conn) => self.on_disconnect(&conn),
            HostEvent::StartGame { audio } => self.start_game(&audio),
            HostEvent::Call(call) => self.record_call(call),
        }
    }

    pub fn accept_connection(&mut self, conn: ConnectionId, peer: PeerId) {
        if self.links.iter().any(|l| l.conn == conn) {
            return;
        }
        tracing::info!(%peer, %conn, "player connecting");
        self.links.push(Link {
            conn,
            peer,
            open: false,
        });
    }

    /// Connection opened: send the current snapshot to it alone.
    pub fn on_open(&mut self, conn: &ConnectionId) -> Vec<OutboundAction> {
        let Some(link) = self.links.iter_mut().find(|l| &l.conn == conn) else {
            tracing::warn!(%conn, "open for unknown connection");
            return Vec::new();
        };
        link.open = true;
        match Message::state_update(&self.session).to_json() {
            Ok(frame) => vec![OutboundAction::Send(conn.clone(), frame)],
            Err(e) => {
                tracing::error!(error = %e, "failed to encode snapshot");
                Vec::new()
            }
        }
    }

    pub fn on_message(&mut self, conn: &ConnectionId, bytes: &[u8]) -> Vec<OutboundAction> {
        let Some(peer) = self.peer_of(conn).cloned() else {
            tracing::warn!(%conn, "message on unknown connection");
            return Vec::new();
        };
        let msg = match Message::from_json(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "dropping undecodable message");
                return Vec::new();
            }
        };
        match msg {
            Message::Join { payload } => self.on_join(peer, payload.name),
            Message::Claim { payload } => self.on_claim(peer, payload),
            Message::StateUpdate { .. } | Message::Unrecognized => {
                tracing::warn!(%peer, "unexpected message from player, ignoring");
                Vec::new()
            }
        }
    }

    /// Duplicate JOINs from the same identity are ignored without a broadcast.
    /// A missing, null or empty name joins as the default name; anything else is kept verbatim.
    fn on_join(&mut self, peer: PeerId, name: Option<String>) -> Vec<OutboundAction> {
        if self.session.has_player(&peer) {
            tracing::debug!(%peer, "duplicate join ignored");
            return Vec::new();
        }
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_PLAYER_NAME.to_string());
        tracing::info!(%peer, %name, "player joined");
        self.session.players.push(Player {
            id: peer,
            name,
            score: 0,
        });
        self.broadcast()
    }

    /// Claims are recorded as reported; the host does not re-validate them.
    fn on_claim(&mut self, peer: PeerId, payload: ClaimPayload) -> Vec<OutboundAction> {
        let player = payload
            .player_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_CLAIMANT.to_string());
        let id = self.next_claim_id();
        tracing::info!(%peer, %player, kind = %payload.claim_type, "claim received");
        self.session.claims.insert(
            0,
            Claim {
                id,
                player_id: peer,
                player,
                kind: payload.claim_type,
                status: ClaimStatus::Pending,
            },
        );
        self.broadcast()
    }

    fn next_claim_id(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_claim_id = now.max(self.last_claim_id + 1);
        self.last_claim_id
    }

    /// Drop the connection and its player, then broadcast.
    pub fn on_disconnect(&mut self, conn: &ConnectionId) -> Vec<OutboundAction> {
        let Some(pos) = self.links.iter().position(|l| &l.conn == conn) else {
            return Vec::new();
        };
        let link = self.links.remove(pos);
        tracing::info!(peer = %link.peer, %conn, "player disconnected");
        self.session.players.retain(|p| p.id != link.peer);
        self.broadcast()
    }

    pub fn start_game(&mut self, audio: &AudioIndex) -> Vec<OutboundAction> {
        self.session.history.clear();
        self.session.current_tagline = None;
        self.session.status = SessionStatus::Playing;
        self.caller = Caller::build(&self.catalog, audio, &HashSet::new(), &mut self.rng);
        tracing::info!(pool = self.caller.remaining(), "game started");
        self.broadcast()
    }

    /// Rebuild the pool mid-game from items not yet called, e.g. after the audio set changed.
    pub fn reload_caller(&mut self, audio: &AudioIndex) {
        let shown: HashSet<String> = self
            .session
            .history
            .iter()
            .map(|c| c.item.id.clone())
            .collect();
        self.caller = Caller::build(&self.catalog, audio, &shown, &mut self.rng);
    }

    pub fn record_call(&mut self, call: Call) -> Vec<OutboundAction> {
        tracing::info!(item = %call.item.id, tagline = %call.tagline, "calling");
        self.session.current_tagline = Some(call.tagline.clone());
        self.session.history.push(call);
        self.broadcast()
    }

    /// Draw the next call from the pool and record it. Exhaustion leaves the state untouched.
    pub fn call_next(&mut self) -> Result<Vec<OutboundAction>, CallerError> {
        let call = self.caller.next_call(&mut self.rng)?;
        Ok(self.record_call(call))
    }

    fn peer_of(&self, conn: &ConnectionId) -> Option<&PeerId> {
        self.links
            .iter()
            .find(|l| &l.conn == conn)
            .map(|l| &l.peer)
    }

    /// Full snapshot to every open connection.
    fn broadcast(&self) -> Vec<OutboundAction> {
        let frame = match Message::state_update(&self.session).to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode snapshot");
                return Vec::new();
            }
        };
        self.links
            .iter()
            .filter(|l| l.open)
            .map(|l| OutboundAction::Send(l.conn.clone(), frame.clone()))
            .collect()
    }
}
