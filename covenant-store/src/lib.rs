//! Covenant Store
//!
//! The engine's view of the encrypted, content-addressed object store.
//!
//! The store hands back raw bytes. Decoding into typed records is the
//! engine's job, so implementations never need the contract's schemas.
//! Every read is performed on behalf of a reader key; a store that cannot
//! decrypt an object for that key reports it as [`StoreError::NotFound`].

pub mod memory;
pub mod cached;

use async_trait::async_trait;
use covenant_model::{Hash, PubKey, Signer};
use std::collections::BTreeSet;

pub use cached::CachedObjectStore;
pub use memory::MemoryObjectStore;

/// Error type for object store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(Hash),

    #[error("Object {hash} is a {actual}, not a {expected}")]
    TypeMismatch {
        hash: Hash,
        expected: String,
        actual: String,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Content-addressed object store.
///
/// Writes are at-most-once: storing the same bytes twice yields the same
/// hash. Nothing is retried here; transport failures surface to the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the serialized record `hash` of type `type_name`, readable by `reader`.
    async fn get_record(
        &self,
        type_name: &str,
        hash: &Hash,
        reader: &PubKey,
    ) -> Result<Vec<u8>, StoreError>;

    /// Fetch the archive (module bundle) stored under `hash`.
    async fn get_jar(&self, hash: &Hash, reader: &PubKey) -> Result<Vec<u8>, StoreError>;

    /// Store a serialized record, signed by `signer`, owned by
    /// `encryption_key` and readable by every key in `audience`.
    async fn put_record(
        &self,
        type_name: &str,
        bytes: Vec<u8>,
        signer: &dyn Signer,
        encryption_key: &PubKey,
        audience: &BTreeSet<PubKey>,
    ) -> Result<Hash, StoreError>;
}
