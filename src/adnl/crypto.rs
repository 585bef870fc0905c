use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha256, Sha512};

/// Ed25519 key pair
#[derive(Copy, Clone)]
pub struct KeyPair {
    pub secret_key: ExpandedSecretKey,
    pub public_key: PublicKey,
}

pub mod tl {
    /// Public key as it appears in ADNL: `pub.ed25519 key:int256 = PublicKey`
    #[derive(Debug, Copy, Clone, Eq, PartialEq, tl_proto::TlRead, tl_proto::TlWrite)]
    #[tl(boxed)]
    pub enum PublicKey<'tl> {
        #[tl(id = 0x4813b4c6, size_hint = 32)]
        Ed25519 { key: &'tl [u8; 32] },
    }
}

impl KeyPair {
    /// Generates a new random KeyPair
    pub fn generate<R: rand::RngCore>(rng: &mut R) -> Self {
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);
        Self::from(&SecretKey::from_bytes(secret_bytes))
    }

    /// Computes shared secret using x25519
    #[inline(always)]
    pub fn compute_shared_secret(&self, other_public_key: &PublicKey) -> [u8; 32] {
        self.secret_key.compute_shared_secret(other_public_key)
    }
}

impl From<&'_ SecretKey> for KeyPair {
    fn from(secret_key: &SecretKey) -> Self {
        let secret_key = secret_key.expand();
        let public_key = PublicKey::from(&secret_key);
        Self {
            secret_key,
            public_key,
        }
    }
}

/// Ed25519 public key
#[derive(Copy, Clone)]
pub struct PublicKey {
    compressed: CompressedEdwardsY,
    neg_point: EdwardsPoint,
}

impl PublicKey {
    /// Tries to create public key from its compressed form
    #[inline(always)]
    pub fn from_bytes(bytes: [u8; 32]) -> Option<Self> {
        let compressed = CompressedEdwardsY(bytes);
        let point = compressed.decompress()?;
        Some(PublicKey {
            compressed,
            neg_point: -point,
        })
    }

    #[inline(always)]
    pub fn as_tl(&'_ self) -> tl::PublicKey<'_> {
        tl::PublicKey::Ed25519 {
            key: self.compressed.as_bytes(),
        }
    }

    /// Short key id: sha256 of the boxed TL form. ADNL addresses peers by it.
    pub fn compute_short_id(&self) -> [u8; 32] {
        Sha256::digest(tl_proto::serialize(self.as_tl())).into()
    }

    #[inline(always)]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.compressed.to_bytes()
    }

    #[inline(always)]
    pub fn as_bytes(&'_ self) -> &'_ [u8; 32] {
        self.compressed.as_bytes()
    }

    #[inline(always)]
    fn from_scalar(bits: [u8; 32]) -> PublicKey {
        let point = EdwardsPoint::mul_base_clamped(bits);
        Self {
            compressed: point.compress(),
            neg_point: -point,
        }
    }
}

impl From<&'_ ExpandedSecretKey> for PublicKey {
    fn from(expanded_secret_key: &ExpandedSecretKey) -> Self {
        Self::from_scalar(expanded_secret_key.key_bytes)
    }
}

impl AsRef<[u8; 32]> for PublicKey {
    fn as_ref(&self) -> &[u8; 32] {
        self.as_bytes()
    }
}

impl PartialEq for PublicKey {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.compressed.eq(&other.compressed)
    }
}

impl Eq for PublicKey {}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&hex::encode(self.compressed.as_bytes()))
    }
}

impl std::fmt::Debug for PublicKey {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[derive(Copy, Clone)]
pub struct ExpandedSecretKey {
    key: Scalar,
    key_bytes: [u8; 32],
}

impl ExpandedSecretKey {
    /// x25519 over the Montgomery form of the peer's Edwards point
    #[inline(always)]
    pub fn compute_shared_secret(&self, other_public_key: &PublicKey) -> [u8; 32] {
        let point = (-other_public_key.neg_point).to_montgomery();
        (point * self.key).to_bytes()
    }
}

impl From<&'_ SecretKey> for ExpandedSecretKey {
    fn from(secret_key: &SecretKey) -> Self {
        let hash: [u8; 64] = Sha512::digest(secret_key.0).into();

        let mut lower = [0u8; 32];
        lower.copy_from_slice(&hash[..32]);
        let key_bytes = curve25519_dalek::scalar::clamp_integer(lower);

        Self {
            key: Scalar::from_bytes_mod_order(key_bytes),
            key_bytes,
        }
    }
}

#[derive(Copy, Clone)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    #[inline(always)]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline(always)]
    pub fn as_bytes(&'_ self) -> &'_ [u8; 32] {
        &self.0
    }

    #[inline(always)]
    pub fn expand(&self) -> ExpandedSecretKey {
        ExpandedSecretKey::from(self)
    }
}
