//! Bounded cache of isolation contexts.

use crate::context::{ContextOptions, IsolationContext};
use crate::registry::ProviderRegistries;
use crate::scope::{GlobalScope, HostScope, SymbolScope};
use crate::IsolationError;
use covenant_model::{crypto, Hash};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Default number of contexts kept alive.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Identity of an isolation context.
///
/// Derived, in order, from the specification's definition hash, the
/// contract's definition hash and the first function's output-spec hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(pub Hash);

impl CacheKey {
    pub fn new(spec_definition: &[u8], contract_definition: &[u8], output_spec: &[u8]) -> Self {
        CacheKey(crypto::composite_hash([spec_definition, contract_definition, output_spec]))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.0)
    }
}

/// Called with each context as it leaves the cache.
pub type EvictionHook = Box<dyn Fn(&CacheKey, &IsolationContext) + Send + Sync>;

struct Lru {
    entries: HashMap<CacheKey, Arc<IsolationContext>>,
    order: VecDeque<CacheKey>,
}

/// Get-or-create cache of [`IsolationContext`]s with LRU eviction.
///
/// Evicted contexts stay usable by callers that still hold them; their
/// scratch files go away when the last handle drops.
pub struct ModuleCache {
    capacity: usize,
    parent: Arc<dyn SymbolScope>,
    global: Arc<dyn SymbolScope>,
    registries: Arc<ProviderRegistries>,
    options: ContextOptions,
    lru: Mutex<Lru>,
    on_evict: Option<EvictionHook>,
}

impl ModuleCache {
    pub fn new(
        capacity: usize,
        parent: Arc<dyn SymbolScope>,
        registries: Arc<ProviderRegistries>,
        options: ContextOptions,
    ) -> Self {
        Self {
            capacity: capacity.max(1),
            parent,
            global: Arc::new(GlobalScope),
            registries,
            options,
            lru: Mutex::new(Lru {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            on_evict: None,
        }
    }

    /// Cache with no host symbols and no providers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(
            capacity,
            Arc::new(HostScope::new()),
            Arc::new(ProviderRegistries::default()),
            ContextOptions::default(),
        )
    }

    /// Replace the process-global scope.
    pub fn with_global_scope(mut self, global: Arc<dyn SymbolScope>) -> Self {
        self.global = global;
        self
    }

    pub fn with_eviction_hook(mut self, hook: EvictionHook) -> Self {
        self.on_evict = Some(hook);
        self
    }

    /// Return the context for `key`, creating an empty one if absent.
    pub fn get_or_create(&self, key: CacheKey) -> Result<Arc<IsolationContext>, IsolationError> {
        let Ok(mut lru) = self.lru.lock() else {
            return Err(IsolationError::LockPoisoned);
        };

        if let Some(ctx) = lru.entries.get(&key).cloned() {
            if let Some(pos) = lru.order.iter().position(|k| *k == key) {
                lru.order.remove(pos);
            }
            lru.order.push_back(key);
            tracing::debug!("module cache hit {}", key);
            return Ok(ctx);
        }

        let ctx = Arc::new(IsolationContext::new(
            self.parent.clone(),
            self.global.clone(),
            self.registries.clone(),
            self.options.clone(),
        ));
        lru.entries.insert(key, ctx.clone());
        lru.order.push_back(key);
        tracing::debug!("module cache created {}", key);

        while lru.entries.len() > self.capacity {
            let Some(oldest) = lru.order.pop_front() else { break };
            if let Some(evicted) = lru.entries.remove(&oldest) {
                tracing::debug!("module cache evicted {}", oldest);
                if let Some(hook) = &self.on_evict {
                    hook(&oldest, &evicted);
                }
            }
        }
        Ok(ctx)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lru
            .lock()
            .map(|lru| lru.entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lru.lock().map(|lru| lru.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}
