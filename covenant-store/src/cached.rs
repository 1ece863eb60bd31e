//! Read-through caching wrapper for any [`ObjectStore`].
//!
//! Records and jars get separate caches, each bounded by total payload
//! bytes rather than entry count. Entries are keyed by (reader, hash) since
//! what a reader may see depends on the audience of the object. Writes of
//! content already stored for the same readers are answered locally.

use crate::{ObjectStore, StoreError};
use async_trait::async_trait;
use covenant_model::{crypto, Hash, PubKey, Signer};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Default byte budget of the record cache.
pub const DEFAULT_RECORD_CACHE_BYTES: usize = 16 * 1024 * 1024;

/// Default byte budget of the jar cache.
pub const DEFAULT_JAR_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Number of remembered writes.
pub const PUT_CACHE_ENTRIES: usize = 1000;

type CacheKey = (PubKey, Hash);

/// LRU map weighted by value length.
struct WeightedCache {
    capacity: usize,
    used: usize,
    entries: HashMap<CacheKey, Arc<[u8]>>,
    order: VecDeque<CacheKey>,
}

impl WeightedCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<Arc<[u8]>> {
        let value = self.entries.get(key)?.clone();
        self.touch(key);
        Some(value)
    }

    fn insert(&mut self, key: CacheKey, value: Arc<[u8]>) {
        // Values larger than the whole budget are served but never retained.
        if value.len() > self.capacity {
            return;
        }
        if let Some(old) = self.entries.insert(key, value.clone()) {
            self.used -= old.len();
            self.touch(&key);
        } else {
            self.order.push_back(key);
        }
        self.used += value.len();

        while self.used > self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.used -= evicted.len();
            }
        }
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(*key);
    }
}

/// (readers including the owner, content hash)
type PutKey = (BTreeSet<PubKey>, Hash);

/// FIFO memory of completed writes.
#[derive(Default)]
struct PutCache {
    stored: HashMap<PutKey, Hash>,
    order: VecDeque<PutKey>,
}

impl PutCache {
    fn insert(&mut self, key: PutKey, hash: Hash) {
        if self.stored.insert(key.clone(), hash).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > PUT_CACHE_ENTRIES {
            if let Some(oldest) = self.order.pop_front() {
                self.stored.remove(&oldest);
            }
        }
    }
}

/// Caches reads of an inner store and remembers completed writes.
pub struct CachedObjectStore<S> {
    inner: S,
    records: Mutex<WeightedCache>,
    jars: Mutex<WeightedCache>,
    puts: Mutex<PutCache>,
}

impl<S: ObjectStore> CachedObjectStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_RECORD_CACHE_BYTES, DEFAULT_JAR_CACHE_BYTES)
    }

    pub fn with_capacity(inner: S, record_bytes: usize, jar_bytes: usize) -> Self {
        Self {
            inner,
            records: Mutex::new(WeightedCache::new(record_bytes)),
            jars: Mutex::new(WeightedCache::new(jar_bytes)),
            puts: Mutex::new(PutCache::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Bytes currently held by the (record, jar) caches.
    pub fn cached_bytes(&self) -> (usize, usize) {
        let records = self.records.lock().map(|c| c.used).unwrap_or(0);
        let jars = self.jars.lock().map(|c| c.used).unwrap_or(0);
        (records, jars)
    }

    async fn read_through<F>(
        cache: &Mutex<WeightedCache>,
        key: CacheKey,
        fetch: F,
    ) -> Result<Vec<u8>, StoreError>
    where
        F: std::future::Future<Output = Result<Vec<u8>, StoreError>>,
    {
        if let Ok(mut cache) = cache.lock() {
            if let Some(hit) = cache.get(&key) {
                tracing::trace!("object cache hit {}", key.1);
                return Ok(hit.to_vec());
            }
        }

        let bytes = fetch.await?;
        if let Ok(mut cache) = cache.lock() {
            cache.insert(key, Arc::from(bytes.as_slice()));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for CachedObjectStore<S> {
    async fn get_record(
        &self,
        type_name: &str,
        hash: &Hash,
        reader: &PubKey,
    ) -> Result<Vec<u8>, StoreError> {
        Self::read_through(
            &self.records,
            (*reader, *hash),
            self.inner.get_record(type_name, hash, reader),
        )
        .await
    }

    async fn get_jar(&self, hash: &Hash, reader: &PubKey) -> Result<Vec<u8>, StoreError> {
        Self::read_through(&self.jars, (*reader, *hash), self.inner.get_jar(hash, reader)).await
    }

    async fn put_record(
        &self,
        type_name: &str,
        bytes: Vec<u8>,
        signer: &dyn Signer,
        encryption_key: &PubKey,
        audience: &BTreeSet<PubKey>,
    ) -> Result<Hash, StoreError> {
        let mut readers = audience.clone();
        readers.insert(*encryption_key);
        let key = (readers, crypto::content_hash(&bytes));

        if let Ok(puts) = self.puts.lock() {
            if let Some(hash) = puts.stored.get(&key) {
                tracing::trace!("skipping write of {}, already stored", hash);
                return Ok(*hash);
            }
        }

        let hash = self
            .inner
            .put_record(type_name, bytes, signer, encryption_key, audience)
            .await?;
        if let Ok(mut puts) = self.puts.lock() {
            puts.insert(key, hash);
        }
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryObjectStore;
    use covenant_model::KeyRef;

    #[tokio::test]
    async fn test_repeated_reads_hit_cache() {
        let store = CachedObjectStore::new(MemoryObjectStore::new());
        let reader = KeyRef::generate().public_key();
        let hash = store.inner().put_jar(vec![1u8; 128]).unwrap();

        for _ in 0..3 {
            assert_eq!(store.get_jar(&hash, &reader).await.unwrap().len(), 128);
        }
        assert_eq!(store.inner().read_count(), 1);
        assert_eq!(store.cached_bytes(), (0, 128));
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_reader() {
        let store = CachedObjectStore::new(MemoryObjectStore::new());
        let member = KeyRef::generate().public_key();
        let outsider = KeyRef::generate().public_key();
        let hash = store
            .inner()
            .insert_private_record("acme.Asset", b"asset".to_vec(), BTreeSet::from([member]))
            .unwrap();

        assert!(store.get_record("acme.Asset", &hash, &member).await.is_ok());
        assert!(store
            .get_record("acme.Asset", &hash, &outsider)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_repeated_writes_reach_inner_store_once() {
        let store = CachedObjectStore::new(MemoryObjectStore::new());
        let owner = KeyRef::generate();
        let other = KeyRef::generate().public_key();
        let audience = BTreeSet::new();

        let first = store
            .put_record("acme.Asset", b"asset".to_vec(), &owner, &owner.public_key(), &audience)
            .await
            .unwrap();
        let second = store
            .put_record("acme.Asset", b"asset".to_vec(), &owner, &owner.public_key(), &audience)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.inner().write_count(), 1);

        // A wider audience is a different write.
        store
            .put_record("acme.Asset", b"asset".to_vec(), &owner, &owner.public_key(), &BTreeSet::from([other]))
            .await
            .unwrap();
        assert_eq!(store.inner().write_count(), 2);
    }

    #[tokio::test]
    async fn test_eviction_respects_byte_budget() {
        let store = CachedObjectStore::with_capacity(MemoryObjectStore::new(), 0, 100);
        let reader = KeyRef::generate().public_key();
        let a = store.inner().put_jar(vec![1u8; 60]).unwrap();
        let b = store.inner().put_jar(vec![2u8; 60]).unwrap();
        let huge = store.inner().put_jar(vec![3u8; 500]).unwrap();

        store.get_jar(&a, &reader).await.unwrap();
        store.get_jar(&b, &reader).await.unwrap();
        assert_eq!(store.cached_bytes().1, 60);

        // `a` was evicted to make room for `b`.
        store.get_jar(&a, &reader).await.unwrap();
        assert_eq!(store.inner().read_count(), 3);

        store.get_jar(&huge, &reader).await.unwrap();
        assert_eq!(store.cached_bytes().1, 60);
    }
}
