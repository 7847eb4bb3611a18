//! Peer channel: one endpoint on the rendezvous relay, with reconnects.
//!
//! `PeerChannel` is a cheap handle; the link itself runs in a background task that reports
//! `ChannelEvent`s. Incoming connections are accepted automatically.

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use bolhousie_core::endpoint::{Endpoint, EndpointAction, EndpointEvent, EndpointStatus};
use bolhousie_core::{ChannelErrorKind, ConnectMetadata, ConnectionId, PeerId, Signal, PROTOCOL_VERSION};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::transport::{self, Role, SignalWriter};

const NOT_CONNECTED: &str = "Not connected to the rendezvous server";

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Endpoint status changed. `ready` means connected and holding an identity.
    Status { status: EndpointStatus, ready: bool },
    /// Identity assigned. Follows the `Status` that made the endpoint ready.
    Open(PeerId),
    Incoming {
        conn: ConnectionId,
        from: PeerId,
        metadata: ConnectMetadata,
    },
    ConnectionOpened(ConnectionId),
    Data {
        conn: ConnectionId,
        payload: Vec<u8>,
    },
    ConnectionClosed(ConnectionId),
    ConnectionFailed {
        conn: ConnectionId,
        message: String,
    },
}

#[derive(Debug)]
enum Command {
    Connect {
        conn: ConnectionId,
        target: PeerId,
        metadata: ConnectMetadata,
    },
    Send {
        conn: ConnectionId,
        payload: Vec<u8>,
    },
    Close {
        conn: ConnectionId,
    },
}

impl Command {
    fn into_signal(self) -> Signal {
        match self {
            Command::Connect {
                conn,
                target,
                metadata,
            } => Signal::Connect {
                conn,
                target,
                metadata,
            },
            Command::Send { conn, payload } => Signal::Data { conn, payload },
            Command::Close { conn } => Signal::Close { conn },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerChannel {
    commands: mpsc::UnboundedSender<Command>,
}

impl PeerChannel {
    /// Start the endpoint task. It stops once every handle is dropped.
    pub fn spawn(addr: String, secure: bool) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_endpoint(addr, secure, cmd_rx, event_tx));
        (Self { commands: cmd_tx }, event_rx)
    }

    pub fn connect(&self, conn: ConnectionId, target: PeerId, metadata: ConnectMetadata) {
        let _ = self.commands.send(Command::Connect {
            conn,
            target,
            metadata,
        });
    }

    pub fn send(&self, conn: ConnectionId, payload: Vec<u8>) {
        let _ = self.commands.send(Command::Send { conn, payload });
    }

    pub fn close(&self, conn: ConnectionId) {
        let _ = self.commands.send(Command::Close { conn });
    }
}

fn status_event(endpoint: &Endpoint) -> ChannelEvent {
    ChannelEvent::Status {
        status: endpoint.status(),
        ready: endpoint.is_ready(),
    }
}

/// How a rendezvous session ended.
enum SessionEnd {
    Shutdown,
    Lost(EndpointEvent),
}

async fn run_endpoint(
    addr: String,
    secure: bool,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut endpoint = Endpoint::new();
    loop {
        endpoint.reconnecting();
        let _ = events.send(status_event(&endpoint));
        let mut conns = HashSet::new();
        let end = run_session(&addr, secure, &mut endpoint, &mut conns, &mut commands, &events).await;
        // The relay closes everything we had when the link goes.
        for conn in conns.drain() {
            let _ = events.send(ChannelEvent::ConnectionClosed(conn));
        }
        let lost = match end {
            SessionEnd::Shutdown => {
                endpoint.destroy();
                break;
            }
            SessionEnd::Lost(event) => event,
        };
        let actions = endpoint.handle(lost);
        let _ = events.send(status_event(&endpoint));
        let delay = actions.into_iter().find_map(|a| match a {
            EndpointAction::ScheduleReconnect(d) => Some(d),
            EndpointAction::FailConnection { .. } => None,
        });
        let Some(delay) = delay else {
            tracing::info!("endpoint stopped");
            break;
        };
        if wait_reconnect(delay, &mut commands, &events).await {
            endpoint.destroy();
            break;
        }
    }
    tracing::debug!("endpoint task finished");
}

/// Sleep out the reconnect delay. Attempts and sends made meanwhile fail at once. True on shutdown.
async fn wait_reconnect(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            cmd = commands.recv() => match cmd {
                None => return true,
                Some(Command::Connect { conn, .. } | Command::Send { conn, .. }) => {
                    let _ = events.send(ChannelEvent::ConnectionFailed {
                        conn,
                        message: NOT_CONNECTED.into(),
                    });
                }
                Some(Command::Close { conn }) => tracing::debug!(%conn, "nothing to close while disconnected"),
            },
        }
    }
}

async fn run_session(
    addr: &str,
    secure: bool,
    endpoint: &mut Endpoint,
    conns: &mut HashSet<ConnectionId>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) -> SessionEnd {
    let network = |e: io::Error| {
        SessionEnd::Lost(EndpointEvent::Error {
            conn: None,
            kind: ChannelErrorKind::Network,
            message: e.to_string(),
        })
    };
    let stream = match TcpStream::connect(addr).await {
        Ok(s) => s,
        Err(e) => return network(e),
    };
    let (mut reader, mut writer) = match transport::handshake(stream, Role::Initiator, secure).await {
        Ok(halves) => halves,
        Err(e) => return network(e),
    };
    let hello = Signal::Hello {
        protocol_version: PROTOCOL_VERSION,
        requested_id: endpoint.id().cloned(),
    };
    if let Err(e) = writer.write(&hello).await {
        return network(e);
    }
    tracing::debug!(%addr, secure, "rendezvous link up");

    // Frame reads are not cancel-safe; keep them off the select.
    let (signal_tx, mut signals) = mpsc::unbounded_channel::<io::Result<Signal>>();
    let reader_task = tokio::spawn(async move {
        loop {
            match reader.read().await {
                Ok(Some(signal)) => {
                    if signal_tx.send(Ok(signal)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = signal_tx.send(Err(e));
                    break;
                }
            }
        }
    });

    let end = loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Some(Ok(signal)) => {
                    if let Some(end) = on_signal(signal, endpoint, conns, &mut writer, events).await {
                        break end;
                    }
                }
                Some(Err(e)) => break network(e),
                None => break SessionEnd::Lost(EndpointEvent::Disconnected),
            },
            cmd = commands.recv() => match cmd {
                None => break SessionEnd::Shutdown,
                Some(cmd) => {
                    if let Command::Connect { conn, .. } = &cmd {
                        conns.insert(conn.clone());
                    }
                    if let Err(e) = writer.write(&cmd.into_signal()).await {
                        break network(e);
                    }
                }
            },
        }
    };
    reader_task.abort();
    end
}

/// Handle one relay signal. Returns `Some` when the session has to end.
async fn on_signal(
    signal: Signal,
    endpoint: &mut Endpoint,
    conns: &mut HashSet<ConnectionId>,
    writer: &mut SignalWriter,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) -> Option<SessionEnd> {
    match signal {
        Signal::Open { id } => {
            endpoint.handle(EndpointEvent::Open(id.clone()));
            let _ = events.send(status_event(endpoint));
            let _ = events.send(ChannelEvent::Open(id));
        }
        Signal::Incoming {
            conn,
            from,
            metadata,
        } => {
            tracing::debug!(%conn, %from, "incoming connection, accepting");
            conns.insert(conn.clone());
            let _ = events.send(ChannelEvent::Incoming {
                conn: conn.clone(),
                from,
                metadata,
            });
            if let Err(e) = writer.write(&Signal::Accept { conn }).await {
                return Some(SessionEnd::Lost(EndpointEvent::Error {
                    conn: None,
                    kind: ChannelErrorKind::Network,
                    message: e.to_string(),
                }));
            }
        }
        Signal::Opened { conn } => {
            let _ = events.send(ChannelEvent::ConnectionOpened(conn));
        }
        Signal::Data { conn, payload } => {
            let _ = events.send(ChannelEvent::Data { conn, payload });
        }
        Signal::Closed { conn } => {
            if conns.remove(&conn) {
                let _ = events.send(ChannelEvent::ConnectionClosed(conn));
            }
        }
        Signal::Error {
            conn,
            kind,
            message,
        } => {
            if let Some(conn) = &conn {
                conns.remove(conn);
            }
            let event = EndpointEvent::Error {
                conn,
                kind,
                message,
            };
            if matches!(kind, ChannelErrorKind::Network | ChannelErrorKind::ServerError)
                && !matches!(&event, EndpointEvent::Error { conn: Some(_), .. })
            {
                return Some(SessionEnd::Lost(event));
            }
            for action in endpoint.handle(event) {
                if let EndpointAction::FailConnection { conn, message } = action {
                    let _ = events.send(ChannelEvent::ConnectionFailed { conn, message });
                }
            }
            let _ = events.send(status_event(endpoint));
        }
        other => tracing::warn!(?other, "unexpected signal from relay, ignoring"),
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commands_fail_while_waiting_to_reconnect() {
        let (cmd_tx, mut commands) = mpsc::unbounded_channel();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        cmd_tx
            .send(Command::Connect {
                conn: ConnectionId::from("c1"),
                target: PeerId::from("host"),
                metadata: ConnectMetadata::default(),
            })
            .unwrap();
        cmd_tx
            .send(Command::Send {
                conn: ConnectionId::from("c2"),
                payload: b"claim".to_vec(),
            })
            .unwrap();
        cmd_tx.send(Command::Close { conn: ConnectionId::from("c3") }).unwrap();

        let shutdown = wait_reconnect(Duration::from_millis(50), &mut commands, &event_tx).await;
        assert!(!shutdown);
        let failed: Vec<ChannelEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            failed,
            vec![
                ChannelEvent::ConnectionFailed {
                    conn: ConnectionId::from("c1"),
                    message: NOT_CONNECTED.into(),
                },
                ChannelEvent::ConnectionFailed {
                    conn: ConnectionId::from("c2"),
                    message: NOT_CONNECTED.into(),
                },
            ]
        );

        drop(cmd_tx);
        assert!(wait_reconnect(Duration::from_secs(5), &mut commands, &event_tx).await);
    }

    #[test]
    fn status_carries_readiness() {
        let mut endpoint = Endpoint::new();
        assert_eq!(
            status_event(&endpoint),
            ChannelEvent::Status { status: EndpointStatus::Connecting, ready: false }
        );
        endpoint.handle(EndpointEvent::Open(PeerId::from("p1")));
        assert_eq!(
            status_event(&endpoint),
            ChannelEvent::Status { status: EndpointStatus::Connected, ready: true }
        );
        endpoint.handle(EndpointEvent::Disconnected);
        assert_eq!(
            status_event(&endpoint),
            ChannelEvent::Status { status: EndpointStatus::Disconnected, ready: false }
        );
    }
}
