use crate::adnl::crypto::{KeyPair, PublicKey};
use crate::adnl::helper_types::{AdnlAddress, AdnlAesParams, AdnlError};
use crate::adnl::primitives::AdnlAes;
use crate::adnl::primitives::codec::AdnlCodec;
use ctr::cipher::{KeyIvInit, StreamCipher};
use sha2::{Digest, Sha256};

/// The 256-byte packet opening an ADNL-over-TCP connection:
/// `receiver_id[32] ∥ sender_pub[32] ∥ sha256(params)[32] ∥ aes(params)[160]`
pub struct AdnlHandshake {
    receiver: AdnlAddress,
    sender: PublicKey,
    aes_params: AdnlAesParams,
    secret: [u8; 32],
}

impl AdnlHandshake {
    pub const LEN: usize = 256;

    /// `secret` is the x25519 agreement between `sender` and the receiver's key
    pub fn new(
        receiver: AdnlAddress,
        sender: PublicKey,
        aes_params: AdnlAesParams,
        secret: [u8; 32],
    ) -> Self {
        Self {
            receiver,
            sender,
            aes_params,
            secret,
        }
    }

    pub fn receiver(&self) -> &AdnlAddress {
        &self.receiver
    }

    pub fn sender(&self) -> &PublicKey {
        &self.sender
    }

    pub fn aes_params(&self) -> &AdnlAesParams {
        &self.aes_params
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut raw_params = self.aes_params.to_bytes();
        let hash: [u8; 32] = Sha256::digest(raw_params).into();
        handshake_cipher(&self.secret, &hash).apply_keystream(&mut raw_params);

        let mut packet = [0u8; Self::LEN];
        packet[..32].copy_from_slice(self.receiver.as_bytes());
        packet[32..64].copy_from_slice(self.sender.as_bytes());
        packet[64..96].copy_from_slice(&hash);
        packet[96..].copy_from_slice(&raw_params);
        packet
    }

    /// Server side: checks the packet is addressed to `keypair` and recovers the params
    pub fn decrypt_from_raw(packet: &[u8; Self::LEN], keypair: &KeyPair) -> Result<Self, AdnlError> {
        let mut receiver = [0u8; 32];
        receiver.copy_from_slice(&packet[..32]);
        let receiver = AdnlAddress::from_bytes(receiver);
        if receiver != AdnlAddress::from(&keypair.public_key) {
            return Err(AdnlError::UnknownAddr(receiver));
        }

        let mut sender = [0u8; 32];
        sender.copy_from_slice(&packet[32..64]);
        let sender = PublicKey::from_bytes(sender).ok_or(AdnlError::InvalidPublicKey)?;
        let secret = keypair.compute_shared_secret(&sender);

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&packet[64..96]);
        let mut raw_params = [0u8; AdnlAesParams::LEN];
        raw_params.copy_from_slice(&packet[96..]);
        handshake_cipher(&secret, &hash).apply_keystream(&mut raw_params);

        if Sha256::digest(raw_params).as_slice() != hash {
            return Err(AdnlError::IntegrityError);
        }

        Ok(Self {
            receiver,
            sender,
            aes_params: AdnlAesParams::from(raw_params),
            secret,
        })
    }

    pub fn make_client_codec(&self) -> AdnlCodec {
        AdnlCodec::client(&self.aes_params)
    }

    pub fn make_server_codec(&self) -> AdnlCodec {
        AdnlCodec::server(&self.aes_params)
    }
}

/// key = secret[0..16] ∥ hash[16..32], nonce = hash[0..4] ∥ secret[20..32]
fn handshake_cipher(secret: &[u8; 32], hash: &[u8; 32]) -> AdnlAes {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(&secret[..16]);
    key[16..].copy_from_slice(&hash[16..]);

    let mut nonce = [0u8; 16];
    nonce[..4].copy_from_slice(&hash[..4]);
    nonce[4..].copy_from_slice(&secret[20..]);

    AdnlAes::new(&key.into(), &nonce.into())
}
