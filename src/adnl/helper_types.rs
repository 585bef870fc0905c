use crate::adnl::crypto::PublicKey;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

/// ADNL address of a peer: short id of its public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdnlAddress([u8; 32]);

impl AdnlAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<&PublicKey> for AdnlAddress {
    fn from(key: &PublicKey) -> Self {
        Self(key.compute_short_id())
    }
}

impl fmt::Display for AdnlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for AdnlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdnlAddress({self})")
    }
}

/// Session key material sent, encrypted, inside the handshake.
///
/// Seen from the client: it decrypts with `rx_*` and encrypts with `tx_*`;
/// the server uses the same params the other way round.
#[derive(Clone, PartialEq, Eq)]
pub struct AdnlAesParams {
    rx_key: [u8; 32],
    tx_key: [u8; 32],
    rx_nonce: [u8; 16],
    tx_nonce: [u8; 16],
    padding: [u8; 64],
}

impl AdnlAesParams {
    pub const LEN: usize = 160;

    pub fn random() -> Self {
        let mut raw = [0u8; Self::LEN];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        Self::from(raw)
    }

    pub fn rx_key(&self) -> &[u8; 32] {
        &self.rx_key
    }

    pub fn tx_key(&self) -> &[u8; 32] {
        &self.tx_key
    }

    pub fn rx_nonce(&self) -> &[u8; 16] {
        &self.rx_nonce
    }

    pub fn tx_nonce(&self) -> &[u8; 16] {
        &self.tx_nonce
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut raw = [0u8; Self::LEN];
        raw[..32].copy_from_slice(&self.rx_key);
        raw[32..64].copy_from_slice(&self.tx_key);
        raw[64..80].copy_from_slice(&self.rx_nonce);
        raw[80..96].copy_from_slice(&self.tx_nonce);
        raw[96..].copy_from_slice(&self.padding);
        raw
    }
}

impl From<[u8; 160]> for AdnlAesParams {
    fn from(raw: [u8; 160]) -> Self {
        let mut params = Self {
            rx_key: [0; 32],
            tx_key: [0; 32],
            rx_nonce: [0; 16],
            tx_nonce: [0; 16],
            padding: [0; 64],
        };
        params.rx_key.copy_from_slice(&raw[..32]);
        params.tx_key.copy_from_slice(&raw[32..64]);
        params.rx_nonce.copy_from_slice(&raw[64..80]);
        params.tx_nonce.copy_from_slice(&raw[80..96]);
        params.padding.copy_from_slice(&raw[96..]);
        params
    }
}

impl fmt::Debug for AdnlAesParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdnlAesParams(..)")
    }
}

#[derive(Debug, Error)]
pub enum AdnlError {
    #[error("packet checksum mismatch")]
    IntegrityError,
    #[error("packet of {0} bytes is too short")]
    TooShortPacket(usize),
    #[error("packet of {0} bytes is too long")]
    TooLongPacket(usize),
    #[error("handshake addressed to unknown key {0}")]
    UnknownAddr(AdnlAddress),
    #[error("invalid ed25519 public key")]
    InvalidPublicKey,
    #[error("handshake acknowledgement carried {0} payload bytes")]
    UnexpectedAck(usize),
    #[error("connection closed by peer")]
    EndOfStream,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
