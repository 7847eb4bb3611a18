//! Peer and connection identities, plus the crypto behind the secure rendezvous channel:
//! ephemeral X25519 keypairs, directional session keys, ChaCha20-Poly1305 framing.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Identity assigned to an endpoint by the rendezvous point. Stable for the endpoint's lifetime
/// and used as the player id on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Fresh random identity (UUID v4).
    pub fn generate() -> Self {
        PeerId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        PeerId(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one data connection between two peers. Chosen by the initiator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        ConnectionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        ConnectionId(s.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// X25519 public key (32 bytes), exchanged in the clear during the secure handshake.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }
}

/// Ephemeral X25519 keypair, one per rendezvous session.
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey(X25519PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn shared_secret(&self, other_public: &PublicKey) -> [u8; 32] {
        let other = X25519PublicKey::from(other_public.0);
        self.secret.diffie_hellman(&other).to_bytes()
    }
}

/// Session keys for one secure channel, one per direction so nonce counters never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// Key for frames sent by the side that opened the TCP connection.
    pub initiator: [u8; 32],
    /// Key for frames sent by the accepting side (the rendezvous relay).
    pub responder: [u8; 32],
}

pub fn derive_session_keys(shared_secret: &[u8; 32]) -> SessionKeys {
    SessionKeys {
        initiator: derive_key(b"bolhousie-channel-v1/initiator", shared_secret),
        responder: derive_key(b"bolhousie-channel-v1/responder", shared_secret),
    }
}

fn derive_key(label: &[u8], shared_secret: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(label);
    hasher.update(shared_secret);
    hasher.finalize().into()
}

/// ChaCha20-Poly1305 with a 64-bit counter nonce. Never reuse a nonce under one key.
pub fn encrypt_wire(
    key: &[u8; 32],
    nonce: u64,
    plaintext: &[u8],
) -> Result<Vec<u8>, WireCryptoError> {
    let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| WireCryptoError::Key)?;
    let nonce_bytes = nonce_bytes(nonce);
    let nonce_arr = chacha20poly1305::aead::Nonce::<chacha20poly1305::ChaCha20Poly1305>::from_slice(
        &nonce_bytes,
    );
    cipher
        .encrypt(nonce_arr, plaintext)
        .map_err(|_| WireCryptoError::Encrypt)
}

pub fn decrypt_wire(
    key: &[u8; 32],
    nonce: u64,
    ciphertext: &[u8],
) -> Result<Vec<u8>, WireCryptoError> {
    let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| WireCryptoError::Key)?;
    let nonce_bytes = nonce_bytes(nonce);
    let nonce_arr = chacha20poly1305::aead::Nonce::<chacha20poly1305::ChaCha20Poly1305>::from_slice(
        &nonce_bytes,
    );
    cipher
        .decrypt(nonce_arr, ciphertext)
        .map_err(|_| WireCryptoError::Decrypt)
}

fn nonce_bytes(nonce: u64) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[4..12].copy_from_slice(&nonce.to_le_bytes());
    out
}

/// Sending half of a secure channel: seals frames with an increasing nonce.
pub struct WireSealer {
    key: [u8; 32],
    nonce: u64,
}

impl WireSealer {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key, nonce: 0 }
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, WireCryptoError> {
        let out = encrypt_wire(&self.key, self.nonce, plaintext)?;
        self.nonce = self.nonce.checked_add(1).ok_or(WireCryptoError::NonceExhausted)?;
        Ok(out)
    }
}

/// Receiving half of a secure channel. Frames must be opened in send order.
pub struct WireOpener {
    key: [u8; 32],
    nonce: u64,
}

impl WireOpener {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key, nonce: 0 }
    }

    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, WireCryptoError> {
        let out = decrypt_wire(&self.key, self.nonce, ciphertext)?;
        self.nonce = self.nonce.checked_add(1).ok_or(WireCryptoError::NonceExhausted)?;
        Ok(out)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireCryptoError {
    #[error("invalid key")]
    Key,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("nonce space exhausted")]
    NonceExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_exchange_symmetric() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let secret_a = a.shared_secret(b.public_key());
        let secret_b = b.shared_secret(a.public_key());
        assert_eq!(secret_a, secret_b);
        assert_eq!(derive_session_keys(&secret_a), derive_session_keys(&secret_b));
    }

    #[test]
    fn directional_keys_differ() {
        let keys = derive_session_keys(&[7u8; 32]);
        assert_ne!(keys.initiator, keys.responder);
    }

    #[test]
    fn sealer_and_opener_track_nonces() {
        use rand::RngCore;
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        let mut sealer = WireSealer::new(key);
        let mut opener = WireOpener::new(key);

        let first = sealer.seal(b"first").unwrap();
        let second = sealer.seal(b"second").unwrap();
        assert_eq!(opener.open(&first).unwrap(), b"first");
        assert_eq!(opener.open(&second).unwrap(), b"second");
    }

    #[test]
    fn out_of_order_frame_is_rejected() {
        let key = [3u8; 32];
        let mut sealer = WireSealer::new(key);
        let mut opener = WireOpener::new(key);
        let _skipped = sealer.seal(b"one").unwrap();
        let two = sealer.seal(b"two").unwrap();
        assert!(matches!(opener.open(&two), Err(WireCryptoError::Decrypt)));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(PeerId::generate(), PeerId::generate());
        assert_ne!(ConnectionId::generate(), ConnectionId::generate());
    }
}
