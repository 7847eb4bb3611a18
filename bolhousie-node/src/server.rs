//! Rendezvous relay: TCP server around a shared `Registry`.

use std::collections::HashMap;
use std::sync::Arc;

use bolhousie_core::{PeerId, Registry, Signal, PROTOCOL_VERSION};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

use crate::transport::{self, Role};

#[derive(Default)]
struct Relay {
    registry: Registry,
    senders: HashMap<PeerId, mpsc::UnboundedSender<Signal>>,
}

impl Relay {
    fn deliver(&self, out: Vec<(PeerId, Signal)>) {
        for (to, signal) in out {
            if let Some(tx) = self.senders.get(&to) {
                let _ = tx.send(signal);
            }
        }
    }
}

/// Accept endpoints until the listener fails.
pub async fn run_relay(listener: TcpListener, secure: bool) -> std::io::Result<()> {
    let relay = Arc::new(Mutex::new(Relay::default()));
    tracing::info!(addr = %listener.local_addr()?, secure, "rendezvous relay listening");
    loop {
        let (stream, addr) = listener.accept().await?;
        let relay = relay.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_endpoint(stream, secure, relay).await {
                tracing::debug!(%addr, error = %e, "endpoint link ended");
            }
        });
    }
}

async fn serve_endpoint(
    stream: TcpStream,
    secure: bool,
    relay: Arc<Mutex<Relay>>,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = transport::handshake(stream, Role::Responder, secure).await?;
    let requested_id = match reader.read().await? {
        Some(Signal::Hello {
            protocol_version,
            requested_id,
        }) if protocol_version == PROTOCOL_VERSION => requested_id,
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "expected hello",
            ))
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
    let peer = {
        let mut relay = relay.lock().await;
        let (peer, greeting) = relay.registry.register(requested_id);
        for signal in greeting {
            let _ = tx.send(signal);
        }
        relay.senders.insert(peer.clone(), tx);
        tracing::info!(%peer, peers = relay.registry.peer_count(), "endpoint registered");
        peer
    };

    let write_task = tokio::spawn(async move {
        while let Some(signal) = rx.recv().await {
            if writer.write(&signal).await.is_err() {
                break;
            }
        }
    });

    let result = loop {
        match reader.read().await {
            Ok(Some(signal)) => {
                let mut relay = relay.lock().await;
                let out = relay.registry.on_signal(&peer, signal);
                relay.deliver(out);
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    {
        let mut relay = relay.lock().await;
        relay.senders.remove(&peer);
        let out = relay.registry.unregister(&peer);
        relay.deliver(out);
        tracing::info!(
            %peer,
            peers = relay.registry.peer_count(),
            links = relay.registry.connection_count(),
            "endpoint left"
        );
    }
    write_task.abort();
    result
}
