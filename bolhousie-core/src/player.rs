//! Player session client: connection lifecycle towards one host and the last snapshot received.
//!
//! Sans-IO like the host side. The caller feeds transport events in and performs the returned
//! `PlayerAction`s (open/close a connection, send a frame, arm or cancel the connect timeout).
//! Events for a connection other than the current one are stale and ignored.

use std::time::Duration;

use crate::identity::{ConnectionId, PeerId};
use crate::protocol::{ClaimPayload, ConnectMetadata, Message};
use crate::session::Session;

/// How long an attempt may stay unopened before it is abandoned.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const TIMEOUT_MESSAGE: &str = "Connection timeout - host may not be available";
pub const DISCONNECTED_MESSAGE: &str = "Disconnected from host";
pub const CONNECTION_FAILED_MESSAGE: &str = "Connection failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    Connect {
        conn: ConnectionId,
        host: PeerId,
        metadata: ConnectMetadata,
    },
    StartTimeout {
        conn: ConnectionId,
        after: Duration,
    },
    CancelTimeout {
        conn: ConnectionId,
    },
    Send {
        conn: ConnectionId,
        bytes: Vec<u8>,
    },
    Close {
        conn: ConnectionId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("peer endpoint is not ready yet")]
    EndpointNotReady,
    #[error("already connected or connecting")]
    AlreadyConnecting,
}

#[derive(Debug, Default)]
pub struct PlayerClient {
    state: ConnectionState,
    conn: Option<ConnectionId>,
    player_name: String,
    open: bool,
    /// Set when an attempt starts, cleared on timeout, close and error.
    attempt_in_flight: bool,
    game_state: Option<Session>,
    error: Option<String>,
}

impl PlayerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.open
    }

    pub fn is_connecting(&self) -> bool {
        self.attempt_in_flight && !self.open
    }

    /// Last STATE_UPDATE received, verbatim.
    pub fn game_state(&self) -> Option<&Session> {
        self.game_state.as_ref()
    }

    /// User-visible error from the last failure, cleared by a new attempt.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn connection(&self) -> Option<&ConnectionId> {
        self.conn.as_ref()
    }

    /// Start one connection attempt. Rejected while the endpoint has no identity yet, or while
    /// another attempt or connection is live.
    pub fn connect_to_host(
        &mut self,
        endpoint_ready: bool,
        host: PeerId,
        player_name: &str,
    ) -> Result<Vec<PlayerAction>, ConnectError> {
        if !endpoint_ready {
            tracing::debug!("cannot connect yet, endpoint not ready");
            return Err(ConnectError::EndpointNotReady);
        }
        if self.attempt_in_flight || self.open {
            tracing::debug!("already connected or connecting");
            return Err(ConnectError::AlreadyConnecting);
        }
        let conn = ConnectionId::generate();
        tracing::info!(%host, %conn, "connecting to host");
        self.state = ConnectionState::Connecting;
        self.error = None;
        self.attempt_in_flight = true;
        self.conn = Some(conn.clone());
        self.player_name = player_name.to_string();
        Ok(vec![
            PlayerAction::Connect {
                conn: conn.clone(),
                host,
                metadata: ConnectMetadata {
                    player_name: Some(player_name.to_string()),
                },
            },
            PlayerAction::StartTimeout {
                conn,
                after: CONNECT_TIMEOUT,
            },
        ])
    }

    fn is_current(&self, conn: &ConnectionId) -> bool {
        self.conn.as_ref() == Some(conn)
    }

    /// Connection opened: cancel the timeout and JOIN under the chosen name.
    pub fn on_open(&mut self, conn: &ConnectionId) -> Vec<PlayerAction> {
        if !self.is_current(conn) || self.open {
            return Vec::new();
        }
        tracing::info!(%conn, "connected to host");
        self.open = true;
        self.state = ConnectionState::Connected;
        let mut actions = vec![PlayerAction::CancelTimeout { conn: conn.clone() }];
        match Message::join(self.player_name.clone()).to_json() {
            Ok(bytes) => actions.push(PlayerAction::Send {
                conn: conn.clone(),
                bytes,
            }),
            Err(e) => tracing::error!(error = %e, "failed to encode join"),
        }
        actions
    }

    /// Replace the local view with any STATE_UPDATE; everything else is dropped.
    pub fn on_data(&mut self, conn: &ConnectionId, bytes: &[u8]) {
        if !self.is_current(conn) {
            return;
        }
        match Message::from_json(bytes) {
            Ok(Message::StateUpdate { state }) => {
                tracing::debug!("state update received");
                self.game_state = Some(state);
            }
            Ok(other) => tracing::warn!(?other, "unexpected message from host, ignoring"),
            Err(e) => tracing::warn!(error = %e, "dropping undecodable message"),
        }
    }

    /// Timeout fired. Ignored once the connection opened or the attempt was abandoned.
    pub fn on_timeout(&mut self, conn: &ConnectionId) -> Vec<PlayerAction> {
        if !self.is_current(conn) || self.open {
            return Vec::new();
        }
        tracing::warn!(%conn, "connection timeout");
        self.error = Some(TIMEOUT_MESSAGE.to_string());
        self.state = ConnectionState::Errored;
        self.attempt_in_flight = false;
        self.conn = None;
        vec![PlayerAction::Close { conn: conn.clone() }]
    }

    /// Connection closed by either side. No automatic reconnect.
    pub fn on_close(&mut self, conn: &ConnectionId) -> Vec<PlayerAction> {
        if !self.is_current(conn) {
            return Vec::new();
        }
        tracing::info!(%conn, "disconnected from host");
        self.open = false;
        self.conn = None;
        self.attempt_in_flight = false;
        self.state = ConnectionState::Disconnected;
        self.error = Some(DISCONNECTED_MESSAGE.to_string());
        vec![PlayerAction::CancelTimeout { conn: conn.clone() }]
    }

    /// Transport error on the connection. The connection itself is left as is.
    pub fn on_error(&mut self, conn: &ConnectionId, message: Option<&str>) -> Vec<PlayerAction> {
        if !self.is_current(conn) {
            return Vec::new();
        }
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(CONNECTION_FAILED_MESSAGE);
        tracing::warn!(%conn, %message, "connection error");
        self.error = Some(message.to_string());
        self.attempt_in_flight = false;
        if !self.open {
            self.state = ConnectionState::Errored;
        }
        vec![PlayerAction::CancelTimeout { conn: conn.clone() }]
    }

    /// Send a CLAIM if connected; otherwise warn and do nothing.
    pub fn send_claim(&mut self, payload: ClaimPayload) -> Vec<PlayerAction> {
        let Some(conn) = self.conn.clone().filter(|_| self.open) else {
            tracing::warn!("cannot send claim, not connected");
            return Vec::new();
        };
        match (Message::Claim { payload }).to_json() {
            Ok(bytes) => vec![PlayerAction::Send { conn, bytes }],
            Err(e) => {
                tracing::error!(error = %e, "failed to encode claim");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::AudioIndex;
    use crate::catalog::sample_catalog;
    use crate::claim::ClaimKind;
    use crate::host::{HostEvent, HostSession, OutboundAction};

    fn started(client: &mut PlayerClient) -> ConnectionId {
        let actions = client
            .connect_to_host(true, PeerId::from("host"), "Asha")
            .unwrap();
        match &actions[0] {
            PlayerAction::Connect { conn, host, metadata } => {
                assert_eq!(host, &PeerId::from("host"));
                assert_eq!(metadata.player_name.as_deref(), Some("Asha"));
                conn.clone()
            }
            other => panic!("expected Connect, got {other:?}"),
        }
    }

    #[test]
    fn rejected_until_endpoint_ready() {
        let mut client = PlayerClient::new();
        assert_eq!(
            client.connect_to_host(false, PeerId::from("host"), "Asha"),
            Err(ConnectError::EndpointNotReady)
        );
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[test]
    fn second_attempt_while_pending_is_rejected() {
        let mut client = PlayerClient::new();
        let actions = client
            .connect_to_host(true, PeerId::from("host"), "Asha")
            .unwrap();
        let connects = actions
            .iter()
            .filter(|a| matches!(a, PlayerAction::Connect { .. }))
            .count();
        assert_eq!(connects, 1);
        assert!(actions.contains(&PlayerAction::StartTimeout {
            conn: client.connection().unwrap().clone(),
            after: CONNECT_TIMEOUT,
        }));
        assert_eq!(
            client.connect_to_host(true, PeerId::from("host"), "Asha"),
            Err(ConnectError::AlreadyConnecting)
        );
        assert!(client.is_connecting());
    }

    #[test]
    fn open_cancels_timeout_and_joins() {
        let mut client = PlayerClient::new();
        let conn = started(&mut client);
        let actions = client.on_open(&conn);
        assert_eq!(actions[0], PlayerAction::CancelTimeout { conn: conn.clone() });
        match &actions[1] {
            PlayerAction::Send { bytes, .. } => {
                assert_eq!(Message::from_json(bytes).unwrap(), Message::join("Asha"));
            }
            other => panic!("expected Send, got {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Connected);
        // Late timeout is a no-op.
        assert!(client.on_timeout(&conn).is_empty());
        assert!(client.error().is_none());
        assert_eq!(
            client.connect_to_host(true, PeerId::from("host"), "Asha"),
            Err(ConnectError::AlreadyConnecting)
        );
    }

    #[test]
    fn timeout_closes_and_allows_retry() {
        let mut client = PlayerClient::new();
        let conn = started(&mut client);
        assert_eq!(
            client.on_timeout(&conn),
            vec![PlayerAction::Close { conn: conn.clone() }]
        );
        assert_eq!(client.error(), Some(TIMEOUT_MESSAGE));
        assert_eq!(client.state(), ConnectionState::Errored);
        // The close that follows our own close() belongs to the abandoned attempt.
        assert!(client.on_close(&conn).is_empty());
        assert_eq!(client.error(), Some(TIMEOUT_MESSAGE));
        assert!(client
            .connect_to_host(true, PeerId::from("host"), "Asha")
            .is_ok());
        assert!(client.error().is_none());
    }

    #[test]
    fn close_marks_disconnected() {
        let mut client = PlayerClient::new();
        let conn = started(&mut client);
        client.on_open(&conn);
        client.on_close(&conn);
        assert!(!client.is_connected());
        assert!(client.connection().is_none());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.error(), Some(DISCONNECTED_MESSAGE));
        assert!(client
            .connect_to_host(true, PeerId::from("host"), "Asha")
            .is_ok());
    }

    #[test]
    fn error_surfaces_message_and_releases_latch() {
        let mut client = PlayerClient::new();
        let conn = started(&mut client);
        client.on_error(&conn, Some("Could not connect to peer host"));
        assert_eq!(client.error(), Some("Could not connect to peer host"));
        assert_eq!(client.state(), ConnectionState::Errored);
        assert!(!client.is_connecting());

        let conn = started(&mut client);
        client.on_error(&conn, None);
        assert_eq!(client.error(), Some(CONNECTION_FAILED_MESSAGE));
    }

    #[test]
    fn claim_requires_open_connection() {
        let mut client = PlayerClient::new();
        let payload = ClaimPayload {
            claim_type: ClaimKind::Teaser,
            player_name: Some("Asha".into()),
        };
        assert!(client.send_claim(payload.clone()).is_empty());
        let conn = started(&mut client);
        assert!(client.send_claim(payload.clone()).is_empty());
        client.on_open(&conn);
        let actions = client.send_claim(payload.clone());
        match &actions[..] {
            [PlayerAction::Send { conn: c, bytes }] => {
                assert_eq!(c, &conn);
                assert_eq!(Message::from_json(bytes).unwrap(), Message::Claim { payload });
            }
            other => panic!("expected one Send, got {other:?}"),
        }
    }

    #[test]
    fn stale_data_is_ignored() {
        let mut client = PlayerClient::new();
        let conn = started(&mut client);
        client.on_open(&conn);
        let frame = Message::state_update(&Session::new()).to_json().unwrap();
        client.on_data(&ConnectionId::from("other"), &frame);
        assert!(client.game_state().is_none());
        client.on_data(&conn, &frame);
        assert_eq!(client.game_state(), Some(&Session::new()));
    }

    /// Deliver host output addressed to `conn` into the client.
    fn deliver(client: &mut PlayerClient, conn: &ConnectionId, actions: Vec<OutboundAction>) {
        for OutboundAction::Send(to, bytes) in actions {
            if &to == conn {
                client.on_data(conn, &bytes);
            }
        }
    }

    /// Host output for the player's JOIN/CLAIM frames.
    fn forward(host: &mut HostSession, actions: Vec<PlayerAction>) -> Vec<OutboundAction> {
        let mut out = Vec::new();
        for action in actions {
            if let PlayerAction::Send { conn, bytes } = action {
                out.extend(host.apply(HostEvent::MessageReceived { conn, bytes }));
            }
        }
        out
    }

    #[test]
    fn call_reaches_player_view() {
        let mut host = HostSession::with_seed(sample_catalog(20), 5);
        let mut client = PlayerClient::new();
        let conn = started(&mut client);

        host.apply(HostEvent::ConnectionAccepted {
            conn: conn.clone(),
            peer: PeerId::from("player-1"),
        });
        let snapshot = host.apply(HostEvent::ConnectionOpened(conn.clone()));
        let join = client.on_open(&conn);
        deliver(&mut client, &conn, snapshot);
        let joined = forward(&mut host, join);
        deliver(&mut client, &conn, joined);
        assert_eq!(client.game_state().unwrap().players.len(), 1);

        let started = host.apply(HostEvent::StartGame {
            audio: AudioIndex::new(),
        });
        deliver(&mut client, &conn, started);
        assert_eq!(host.remaining_calls(), 20);

        let called = host.call_next().unwrap();
        deliver(&mut client, &conn, called);
        let host_view = host.session();
        assert_eq!(host_view.history.len(), 1);
        assert_eq!(
            host_view.current_tagline.as_deref(),
            Some(host_view.history[0].tagline.as_str())
        );
        assert_eq!(client.game_state(), Some(host_view));
    }

    #[test]
    fn claim_reaches_host_broadcast() {
        let mut host = HostSession::with_seed(sample_catalog(20), 6);
        let mut client = PlayerClient::new();
        let conn = started(&mut client);
        host.apply(HostEvent::ConnectionAccepted {
            conn: conn.clone(),
            peer: PeerId::from("player-1"),
        });
        deliver(&mut client, &conn, host.apply(HostEvent::ConnectionOpened(conn.clone())));
        let join = client.on_open(&conn);
        let joined = forward(&mut host, join);
        deliver(&mut client, &conn, joined);

        let claim = client.send_claim(ClaimPayload {
            claim_type: ClaimKind::Jackpot,
            player_name: Some("Asha".into()),
        });
        let broadcast = forward(&mut host, claim);
        deliver(&mut client, &conn, broadcast);

        let view = client.game_state().unwrap();
        let latest = &view.claims[0];
        assert_eq!(latest.kind, ClaimKind::Jackpot);
        assert_eq!(latest.player, "Asha");
        assert_eq!(latest.status, crate::session::ClaimStatus::Pending);
    }
}
