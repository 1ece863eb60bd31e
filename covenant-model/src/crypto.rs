//! Centralized cryptographic operations.
//!
//! All Ed25519 signing, verification and BLAKE3 hashing goes through this
//! module.
//!
//! | Primitive   | Algorithm       | Purpose                                        |
//! |-------------|-----------------|------------------------------------------------|
//! | Hash        | BLAKE3 (32 B)   | Content addressing, cache keys                 |
//! | Signature   | Ed25519 (64 B)  | Contract sealing                               |
//! | Identity    | Ed25519 keypair | Signer identity and audience membership        |

use crate::types::{Hash, PubKey, Signature};

// ---------------------------------------------------------------------------
// Content hashing (BLAKE3)
// ---------------------------------------------------------------------------

/// Compute the BLAKE3 content hash of arbitrary bytes.
#[inline]
pub fn content_hash(data: &[u8]) -> Hash {
    Hash(*blake3::hash(data).as_bytes())
}

/// Hash several byte strings as one value.
///
/// Each part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
/// produce different digests.
pub fn composite_hash<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    Hash(*hasher.finalize().as_bytes())
}

// ---------------------------------------------------------------------------
// Ed25519 signing
// ---------------------------------------------------------------------------

/// Sign a BLAKE3 content hash with an Ed25519 signing key.
///
/// Payloads are never signed directly: compute `blake3(content)`, then sign
/// the 32-byte digest.
pub fn sign_hash(signing_key: &ed25519_dalek::SigningKey, hash: &Hash) -> Signature {
    use ed25519_dalek::Signer;
    let sig = signing_key.sign(hash.as_bytes());
    Signature(sig.to_bytes())
}

// ---------------------------------------------------------------------------
// Ed25519 verification
// ---------------------------------------------------------------------------

/// Verify an Ed25519 signature over a BLAKE3 content hash (strict).
pub fn verify_hash(pubkey: &PubKey, hash: &Hash, signature: &Signature) -> Result<(), CryptoError> {
    let vk = verifying_key(pubkey)?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify_strict(hash.as_bytes(), &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Deserialize a `PubKey` into an Ed25519 `VerifyingKey`.
///
/// Fails if the 32 bytes are not a valid curve point.
pub fn verifying_key(pubkey: &PubKey) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
    ed25519_dalek::VerifyingKey::from_bytes(&pubkey.0).map_err(|_| CryptoError::InvalidPublicKey)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Cryptographic operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid Ed25519 signature")]
    InvalidSignature,

    #[error("invalid Ed25519 public key")]
    InvalidPublicKey,

    #[error("malformed signature bytes: expected {expected} bytes, got {actual}")]
    MalformedSignature { expected: usize, actual: usize },
}
