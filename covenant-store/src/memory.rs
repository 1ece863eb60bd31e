//! In-memory object store.
//!
//! Objects are addressed by the BLAKE3 hash of their bytes. Each object keeps
//! the set of keys allowed to read it; reads from any other key behave as a
//! miss, the way an encrypted store cannot decrypt for a non-member.

use crate::{ObjectStore, StoreError};
use async_trait::async_trait;
use covenant_model::{crypto, Hash, PubKey, Signer};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq)]
enum ObjectKind {
    Record(String),
    Jar,
}

impl ObjectKind {
    fn describe(&self) -> String {
        match self {
            ObjectKind::Record(type_name) => type_name.clone(),
            ObjectKind::Jar => "jar".to_string(),
        }
    }
}

struct StoredObject {
    kind: ObjectKind,
    bytes: Vec<u8>,
    /// `None` means readable by anyone.
    audience: Option<BTreeSet<PubKey>>,
    signer: Option<PubKey>,
}

impl StoredObject {
    fn readable_by(&self, reader: &PubKey) -> bool {
        self.audience.as_ref().map_or(true, |a| a.contains(reader))
    }
}

/// Object store held entirely in memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<Hash, StoredObject>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an archive readable by any key.
    pub fn put_jar(&self, bytes: Vec<u8>) -> Result<Hash, StoreError> {
        self.insert(ObjectKind::Jar, bytes, None, None)
    }

    /// Seed a record readable by any key.
    pub fn insert_record(&self, type_name: &str, bytes: Vec<u8>) -> Result<Hash, StoreError> {
        self.insert(ObjectKind::Record(type_name.to_string()), bytes, None, None)
    }

    /// Seed a record readable only by `audience`.
    pub fn insert_private_record(
        &self,
        type_name: &str,
        bytes: Vec<u8>,
        audience: BTreeSet<PubKey>,
    ) -> Result<Hash, StoreError> {
        self.insert(ObjectKind::Record(type_name.to_string()), bytes, Some(audience), None)
    }

    /// Keys allowed to read `hash`. `None` if unknown or public.
    pub fn audience_of(&self, hash: &Hash) -> Option<BTreeSet<PubKey>> {
        let Ok(objects) = self.objects.read() else { return None };
        objects.get(hash).and_then(|o| o.audience.clone())
    }

    /// Key that signed the write of `hash`, if it came through `put_record`.
    pub fn signer_of(&self, hash: &Hash) -> Option<PubKey> {
        let Ok(objects) = self.objects.read() else { return None };
        objects.get(hash).and_then(|o| o.signer)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        let Ok(objects) = self.objects.read() else { return false };
        objects.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of reads served or refused so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `put_record` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn insert(
        &self,
        kind: ObjectKind,
        bytes: Vec<u8>,
        audience: Option<BTreeSet<PubKey>>,
        signer: Option<PubKey>,
    ) -> Result<Hash, StoreError> {
        let hash = crypto::content_hash(&bytes);
        let Ok(mut objects) = self.objects.write() else {
            return Err(StoreError::Backend("lock poisoned".into()));
        };
        match objects.get_mut(&hash) {
            // Same content written again: widen who may read it.
            Some(existing) => {
                existing.audience = match (existing.audience.take(), audience) {
                    (Some(mut current), Some(extra)) => {
                        current.extend(extra);
                        Some(current)
                    }
                    _ => None,
                };
            }
            None => {
                objects.insert(hash, StoredObject { kind, bytes, audience, signer });
            }
        }
        Ok(hash)
    }

    fn read(&self, hash: &Hash, reader: &PubKey, expected: &ObjectKind) -> Result<Vec<u8>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let Ok(objects) = self.objects.read() else {
            return Err(StoreError::Backend("lock poisoned".into()));
        };
        let object = objects
            .get(hash)
            .filter(|o| o.readable_by(reader))
            .ok_or(StoreError::NotFound(*hash))?;
        if &object.kind != expected {
            return Err(StoreError::TypeMismatch {
                hash: *hash,
                expected: expected.describe(),
                actual: object.kind.describe(),
            });
        }
        Ok(object.bytes.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_record(
        &self,
        type_name: &str,
        hash: &Hash,
        reader: &PubKey,
    ) -> Result<Vec<u8>, StoreError> {
        self.read(hash, reader, &ObjectKind::Record(type_name.to_string()))
    }

    async fn get_jar(&self, hash: &Hash, reader: &PubKey) -> Result<Vec<u8>, StoreError> {
        self.read(hash, reader, &ObjectKind::Jar)
    }

    async fn put_record(
        &self,
        type_name: &str,
        bytes: Vec<u8>,
        signer: &dyn Signer,
        encryption_key: &PubKey,
        audience: &BTreeSet<PubKey>,
    ) -> Result<Hash, StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut readers = audience.clone();
        readers.insert(*encryption_key);
        let reader_count = readers.len();
        let hash = self.insert(
            ObjectKind::Record(type_name.to_string()),
            bytes,
            Some(readers),
            Some(signer.public_key()),
        )?;
        tracing::trace!("stored {} {} for {} readers", type_name, hash, reader_count);
        Ok(hash)
    }
}
