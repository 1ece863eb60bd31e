//! Key references and the signing capability.
//!
//! A `KeyRef` wraps an Ed25519 keypair owned by the caller. The engine only
//! ever borrows it: the public half identifies the reader/writer against the
//! object store and the audience set, the private half signs sealed contracts.

use crate::crypto;
use crate::types::{Hash, PubKey, Signature};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use std::fmt;

/// Anything that can produce signatures for the engine.
pub trait Signer: Send + Sync {
    /// Public key that verifies signatures produced by this signer.
    fn public_key(&self) -> PubKey;

    /// Sign arbitrary bytes. Implementations sign the BLAKE3 digest.
    fn sign(&self, message: &[u8]) -> Signature;
}

/// Caller-owned identity + signing capability.
#[derive(Clone)]
pub struct KeyRef {
    signing_key: SigningKey,
}

impl KeyRef {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create a key ref from an existing signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Create a key ref from 32 secret bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Public key (identity) as a strong type.
    pub fn public_key(&self) -> PubKey {
        PubKey::from(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a precomputed content hash.
    pub fn sign_hash(&self, hash: &Hash) -> Signature {
        crypto::sign_hash(&self.signing_key, hash)
    }
}

impl Signer for KeyRef {
    fn public_key(&self) -> PubKey {
        KeyRef::public_key(self)
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.sign_hash(&crypto::content_hash(message))
    }
}

// Never print secret material.
impl fmt::Debug for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyRef({})", self.public_key())
    }
}
