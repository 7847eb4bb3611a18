//! Rendezvous link: TCP handshake plus length-prefixed signal frames, sealed when secure.

use std::io;

use bolhousie_core::identity::{derive_session_keys, Keypair, PublicKey, WireOpener, WireSealer};
use bolhousie_core::wire::{self, LEN_SIZE};
use bolhousie_core::{Signal, PROTOCOL_VERSION};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const PREAMBLE_SIZE: usize = 2; // version + secure flag
const PUBLIC_KEY_SIZE: usize = 32;

/// Which end of the TCP connection we are. Picks the key for each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Endpoint that dialled the relay.
    Initiator,
    /// The relay.
    Responder,
}

pub struct SignalReader {
    reader: OwnedReadHalf,
    opener: Option<WireOpener>,
}

pub struct SignalWriter {
    writer: OwnedWriteHalf,
    sealer: Option<WireSealer>,
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Exchange preambles, then keys when `secure`. Both ends must agree on version and flag.
pub async fn handshake(
    stream: TcpStream,
    role: Role,
    secure: bool,
) -> io::Result<(SignalReader, SignalWriter)> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    writer.write_all(&[PROTOCOL_VERSION, secure as u8]).await?;
    writer.flush().await?;
    let mut preamble = [0u8; PREAMBLE_SIZE];
    reader.read_exact(&mut preamble).await?;
    if preamble[0] != PROTOCOL_VERSION {
        return Err(invalid("unsupported protocol version"));
    }
    if (preamble[1] != 0) != secure {
        return Err(invalid("secure flag mismatch"));
    }

    if !secure {
        return Ok((
            SignalReader {
                reader,
                opener: None,
            },
            SignalWriter {
                writer,
                sealer: None,
            },
        ));
    }

    let keypair = Keypair::generate();
    writer.write_all(keypair.public_key().as_bytes()).await?;
    writer.flush().await?;
    let mut peer_public = [0u8; PUBLIC_KEY_SIZE];
    reader.read_exact(&mut peer_public).await?;
    let secret = keypair.shared_secret(&PublicKey::from_bytes(peer_public));
    let keys = derive_session_keys(&secret);
    let (send_key, recv_key) = match role {
        Role::Initiator => (keys.initiator, keys.responder),
        Role::Responder => (keys.responder, keys.initiator),
    };
    Ok((
        SignalReader {
            reader,
            opener: Some(WireOpener::new(recv_key)),
        },
        SignalWriter {
            writer,
            sealer: Some(WireSealer::new(send_key)),
        },
    ))
}

impl SignalReader {
    /// Next signal. `Ok(None)` on a clean EOF at a frame boundary.
    pub async fn read(&mut self) -> io::Result<Option<Signal>> {
        let mut header = [0u8; LEN_SIZE];
        match self.reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = wire::body_len(header).map_err(|e| invalid(e.to_string()))?;
        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await?;
        let body = match self.opener.as_mut() {
            Some(opener) => opener.open(&body).map_err(|e| invalid(e.to_string()))?,
            None => body,
        };
        wire::decode_body(&body)
            .map(Some)
            .map_err(|e| invalid(e.to_string()))
    }
}

impl SignalWriter {
    pub async fn write(&mut self, signal: &Signal) -> io::Result<()> {
        let body = wire::encode_body(signal).map_err(|e| invalid(e.to_string()))?;
        let body = match self.sealer.as_mut() {
            Some(sealer) => sealer.seal(&body).map_err(|e| invalid(e.to_string()))?,
            None => body,
        };
        let frame = wire::frame_body(&body).map_err(|e| invalid(e.to_string()))?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }
}
