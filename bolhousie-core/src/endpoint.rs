//! Endpoint lifecycle towards the rendezvous point: identity, status and reconnect policy.
//!
//! The transport reports what happened; this decides what to do next. Reconnect timing is
//! returned as an action so the caller owns the timer.

use std::time::Duration;

use crate::identity::{ConnectionId, PeerId};
use crate::protocol::ChannelErrorKind;

/// Delay before reconnecting after the rendezvous link was lost.
pub const RECONNECT_AFTER_DISCONNECT: Duration = Duration::from_secs(1);
/// Delay before reconnecting after a network or server error.
pub const RECONNECT_AFTER_NETWORK_ERROR: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// Identity assigned by the rendezvous point.
    Open(PeerId),
    /// Link to the rendezvous point lost; identity still held.
    Disconnected,
    Error {
        conn: Option<ConnectionId>,
        kind: ChannelErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAction {
    ScheduleReconnect(Duration),
    /// Pass a connection-scoped failure to whoever owns the attempt.
    FailConnection {
        conn: ConnectionId,
        message: String,
    },
}

#[derive(Debug, Default)]
pub struct Endpoint {
    id: Option<PeerId>,
    status: EndpointStatus,
    destroyed: bool,
}

impl Endpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last identity assigned. Kept across disconnects and asked for again on reconnect.
    pub fn id(&self) -> Option<&PeerId> {
        self.id.as_ref()
    }

    pub fn status(&self) -> EndpointStatus {
        self.status
    }

    /// Connected and holding an identity.
    pub fn is_ready(&self) -> bool {
        self.status == EndpointStatus::Connected && self.id.is_some()
    }

    /// Stop for good: no further reconnects.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.status = EndpointStatus::Disconnected;
    }

    /// A reconnect attempt is starting.
    pub fn reconnecting(&mut self) {
        if !self.destroyed {
            self.status = EndpointStatus::Connecting;
        }
    }

    pub fn handle(&mut self, event: EndpointEvent) -> Vec<EndpointAction> {
        match event {
            EndpointEvent::Open(id) => {
                tracing::info!(%id, "endpoint open");
                self.id = Some(id);
                self.status = EndpointStatus::Connected;
                Vec::new()
            }
            EndpointEvent::Disconnected => {
                self.status = EndpointStatus::Disconnected;
                if self.destroyed {
                    return Vec::new();
                }
                tracing::warn!(after = ?RECONNECT_AFTER_DISCONNECT, "rendezvous link lost, reconnecting");
                vec![EndpointAction::ScheduleReconnect(RECONNECT_AFTER_DISCONNECT)]
            }
            EndpointEvent::Error {
                conn: Some(conn),
                kind,
                message,
            } => {
                tracing::debug!(%conn, kind = kind.as_str(), %message, "connection error");
                vec![EndpointAction::FailConnection { conn, message }]
            }
            EndpointEvent::Error {
                conn: None,
                kind,
                message,
            } => self.on_endpoint_error(kind, &message),
        }
    }

    fn on_endpoint_error(&mut self, kind: ChannelErrorKind, message: &str) -> Vec<EndpointAction> {
        match kind {
            ChannelErrorKind::UnavailableId => {
                tracing::info!(%message, "requested id unavailable, a new one will be assigned");
                Vec::new()
            }
            ChannelErrorKind::Network | ChannelErrorKind::ServerError => {
                self.status = EndpointStatus::Error;
                if self.destroyed {
                    return Vec::new();
                }
                tracing::warn!(kind = kind.as_str(), %message, after = ?RECONNECT_AFTER_NETWORK_ERROR, "rendezvous error, reconnecting");
                vec![EndpointAction::ScheduleReconnect(RECONNECT_AFTER_NETWORK_ERROR)]
            }
            ChannelErrorKind::PeerUnavailable => {
                tracing::debug!(%message, "peer unavailable");
                Vec::new()
            }
            ChannelErrorKind::Other => {
                tracing::error!(%message, "endpoint error");
                self.status = EndpointStatus::Error;
                Vec::new()
            }
        }
    }
}
