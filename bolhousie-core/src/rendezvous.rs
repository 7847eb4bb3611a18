//! Rendezvous registry: identity assignment and relay routing between endpoints.
//!
//! Pure bookkeeping. The relay server owns one `Registry`, feeds it the signals each endpoint
//! sends and writes the returned `(recipient, signal)` pairs to the matching streams.

use std::collections::{BTreeSet, HashMap};

use crate::identity::{ConnectionId, PeerId};
use crate::protocol::{ChannelErrorKind, Signal};

#[derive(Debug, Clone)]
struct Link {
    initiator: PeerId,
    target: PeerId,
    open: bool,
}

impl Link {
    fn other_end(&self, peer: &PeerId) -> Option<&PeerId> {
        if peer == &self.initiator {
            Some(&self.target)
        } else if peer == &self.target {
            Some(&self.initiator)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    peers: BTreeSet<PeerId>,
    links: HashMap<ConnectionId, Link>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn connection_count(&self) -> usize {
        self.links.len()
    }

    /// Assign an identity. A free requested id is honoured; a taken one is reported as
    /// `unavailable-id` and a fresh id is assigned. Returns the id and the signals for it.
    pub fn register(&mut self, requested: Option<PeerId>) -> (PeerId, Vec<Signal>) {
        let mut out = Vec::new();
        let id = match requested {
            Some(id) if !self.peers.contains(&id) => id,
            Some(id) => {
                out.push(Signal::Error {
                    conn: None,
                    kind: ChannelErrorKind::UnavailableId,
                    message: format!("ID \"{id}\" is taken"),
                });
                self.fresh_id()
            }
            None => self.fresh_id(),
        };
        self.peers.insert(id.clone());
        tracing::info!(%id, "peer registered");
        out.push(Signal::Open { id: id.clone() });
        (id, out)
    }

    fn fresh_id(&self) -> PeerId {
        loop {
            let id = PeerId::generate();
            if !self.peers.contains(&id) {
                return id;
            }
        }
    }

    /// Drop a peer and close every connection it was part of on the other side.
    pub fn unregister(&mut self, peer: &PeerId) -> Vec<(PeerId, Signal)> {
        if !self.peers.remove(peer) {
            return Vec::new();
        }
        tracing::info!(%peer, "peer unregistered");
        let gone: Vec<ConnectionId> = self
            .links
            .iter()
            .filter(|(_, link)| link.other_end(peer).is_some())
            .map(|(conn, _)| conn.clone())
            .collect();
        let mut out = Vec::new();
        for conn in gone {
            if let Some(link) = self.links.remove(&conn) {
                if let Some(other) = link.other_end(peer) {
                    if self.peers.contains(other) {
                        out.push((other.clone(), Signal::Closed { conn }));
                    }
                }
            }
        }
        out
    }

    /// Route one signal sent by `from`.
    pub fn on_signal(&mut self, from: &PeerId, signal: Signal) -> Vec<(PeerId, Signal)> {
        match signal {
            Signal::Connect {
                conn,
                target,
                metadata,
            } => self.connect(from, conn, target, metadata),
            Signal::Accept { conn } => self.accept(from, conn),
            Signal::Data { conn, payload } => match self.links.get(&conn) {
                Some(link) if link.open => match link.other_end(from) {
                    Some(other) => vec![(other.clone(), Signal::Data { conn, payload })],
                    None => Vec::new(),
                },
                _ => {
                    tracing::debug!(%from, %conn, "data on unknown or unopened connection");
                    Vec::new()
                }
            },
            Signal::Close { conn } => {
                let is_end = self
                    .links
                    .get(&conn)
                    .is_some_and(|link| link.other_end(from).is_some());
                if !is_end {
                    return Vec::new();
                }
                match self.links.remove(&conn) {
                    Some(link) => {
                        tracing::debug!(%conn, "connection closed");
                        vec![
                            (link.initiator, Signal::Closed { conn: conn.clone() }),
                            (link.target, Signal::Closed { conn }),
                        ]
                    }
                    None => Vec::new(),
                }
            }
            Signal::Hello { .. } => vec![(
                from.clone(),
                Signal::Error {
                    conn: None,
                    kind: ChannelErrorKind::Other,
                    message: "already registered".into(),
                },
            )],
            other => {
                tracing::warn!(%from, ?other, "unexpected signal from endpoint, ignoring");
                Vec::new()
            }
        }
    }

    fn connect(
        &mut self,
        from: &PeerId,
        conn: ConnectionId,
        target: PeerId,
        metadata: crate::protocol::ConnectMetadata,
    ) -> Vec<(PeerId, Signal)> {
        if &target == from || !self.peers.contains(&target) {
            tracing::debug!(%from, %target, "connect to unavailable peer");
            return vec![(
                from.clone(),
                Signal::Error {
                    conn: Some(conn),
                    kind: ChannelErrorKind::PeerUnavailable,
                    message: format!("Could not connect to peer {target}"),
                },
            )];
        }
        if self.links.contains_key(&conn) {
            return vec![(
                from.clone(),
                Signal::Error {
                    conn: Some(conn),
                    kind: ChannelErrorKind::Other,
                    message: "connection id already in use".into(),
                },
            )];
        }
        tracing::debug!(%from, %target, %conn, "connection requested");
        self.links.insert(
            conn.clone(),
            Link {
                initiator: from.clone(),
                target: target.clone(),
                open: false,
            },
        );
        vec![(
            target,
            Signal::Incoming {
                conn,
                from: from.clone(),
                metadata,
            },
        )]
    }

    fn accept(&mut self, from: &PeerId, conn: ConnectionId) -> Vec<(PeerId, Signal)> {
        match self.links.get_mut(&conn) {
            Some(link) if &link.target == from && !link.open => {
                link.open = true;
                tracing::debug!(%conn, "connection opened");
                vec![
                    (link.initiator.clone(), Signal::Opened { conn: conn.clone() }),
                    (link.target.clone(), Signal::Opened { conn }),
                ]
            }
            _ => {
                tracing::debug!(%from, %conn, "accept for unknown connection");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectMetadata;

    fn registered(reg: &mut Registry, id: &str) -> PeerId {
        let (peer, _) = reg.register(Some(PeerId::from(id)));
        peer
    }

    fn connect(reg: &mut Registry, from: &PeerId, target: &PeerId, conn: &str) -> Vec<(PeerId, Signal)> {
        reg.on_signal(
            from,
            Signal::Connect {
                conn: ConnectionId::from(conn),
                target: target.clone(),
                metadata: ConnectMetadata {
                    player_name: Some("Asha".into()),
                },
            },
        )
    }

    #[test]
    fn fresh_ids_are_assigned() {
        let mut reg = Registry::new();
        let (a, out) = reg.register(None);
        assert_eq!(out, vec![Signal::Open { id: a.clone() }]);
        let (b, _) = reg.register(None);
        assert_ne!(a, b);
        assert_eq!(reg.peer_count(), 2);
    }

    #[test]
    fn taken_id_reports_unavailable() {
        let mut reg = Registry::new();
        let host = registered(&mut reg, "host");
        let (other, out) = reg.register(Some(host.clone()));
        assert_ne!(other, host);
        assert!(matches!(
            &out[0],
            Signal::Error { conn: None, kind: ChannelErrorKind::UnavailableId, .. }
        ));
        assert_eq!(out[1], Signal::Open { id: other });
    }

    #[test]
    fn connect_accept_data_close() {
        let mut reg = Registry::new();
        let host = registered(&mut reg, "host");
        let player = registered(&mut reg, "player");
        let conn = ConnectionId::from("c1");

        let out = connect(&mut reg, &player, &host, "c1");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, host);
        assert!(matches!(&out[0].1, Signal::Incoming { from, metadata, .. }
            if from == &player && metadata.player_name.as_deref() == Some("Asha")));

        // Data before accept goes nowhere.
        let early = reg.on_signal(&player, Signal::Data { conn: conn.clone(), payload: b"x".to_vec() });
        assert!(early.is_empty());

        // Only the target can accept.
        assert!(reg.on_signal(&player, Signal::Accept { conn: conn.clone() }).is_empty());
        let opened = reg.on_signal(&host, Signal::Accept { conn: conn.clone() });
        assert_eq!(
            opened,
            vec![
                (player.clone(), Signal::Opened { conn: conn.clone() }),
                (host.clone(), Signal::Opened { conn: conn.clone() }),
            ]
        );

        let relayed = reg.on_signal(&player, Signal::Data { conn: conn.clone(), payload: b"hi".to_vec() });
        assert_eq!(relayed, vec![(host.clone(), Signal::Data { conn: conn.clone(), payload: b"hi".to_vec() })]);
        let back = reg.on_signal(&host, Signal::Data { conn: conn.clone(), payload: b"yo".to_vec() });
        assert_eq!(back[0].0, player);

        let closed = reg.on_signal(&host, Signal::Close { conn: conn.clone() });
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|(_, s)| s == &Signal::Closed { conn: conn.clone() }));
        assert_eq!(reg.connection_count(), 0);
    }

    #[test]
    fn unknown_target_is_peer_unavailable() {
        let mut reg = Registry::new();
        let player = registered(&mut reg, "player");
        let out = connect(&mut reg, &player, &PeerId::from("nobody"), "c1");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, player);
        assert!(matches!(
            &out[0].1,
            Signal::Error { conn: Some(c), kind: ChannelErrorKind::PeerUnavailable, .. } if c.as_str() == "c1"
        ));
        assert_eq!(reg.connection_count(), 0);
    }

    #[test]
    fn unregister_closes_other_ends() {
        let mut reg = Registry::new();
        let host = registered(&mut reg, "host");
        let p1 = registered(&mut reg, "p1");
        let p2 = registered(&mut reg, "p2");
        connect(&mut reg, &p1, &host, "c1");
        reg.on_signal(&host, Signal::Accept { conn: ConnectionId::from("c1") });
        connect(&mut reg, &p2, &host, "c2");

        let mut out = reg.unregister(&host);
        out.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            out,
            vec![
                (p1.clone(), Signal::Closed { conn: ConnectionId::from("c1") }),
                (p2.clone(), Signal::Closed { conn: ConnectionId::from("c2") }),
            ]
        );
        assert_eq!(reg.peer_count(), 2);
        assert_eq!(reg.connection_count(), 0);
        // The id is free again.
        let (again, _) = reg.register(Some(host.clone()));
        assert_eq!(again, host);
    }
}
