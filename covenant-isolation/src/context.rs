//! Per-contract isolated symbol resolution.

use crate::archive::{self, ScannedArchive};
use crate::registry::ProviderRegistries;
use crate::scope::{resolution_order, ScopeKind, Symbol, SymbolKind, SymbolScope};
use crate::IsolationError;
use covenant_model::{crypto, Hash};
use prost_reflect::DescriptorPool;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tempfile::NamedTempFile;

/// Knobs shared by every context a cache creates.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Register `.jar`/`.zip` entries of an archive as roots of their own.
    pub read_nested_archives: bool,
    /// Where scratch files go; the system temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            read_nested_archives: true,
            scratch_dir: None,
        }
    }
}

/// A materialized archive in search order.
struct SearchRoot {
    file: NamedTempFile,
}

/// Where a module symbol lives.
struct ModuleEntry {
    root: usize,
    entry: String,
}

/// Everything registered through `add_archive`.
struct Registered {
    hashes: HashSet<Hash>,
    roots: Vec<SearchRoot>,
    modules: HashMap<String, ModuleEntry>,
    pool: DescriptorPool,
}

/// Isolated resolution context for one contract.
///
/// Resolution tries the contract's own archives, the host and the global
/// descriptor pool in the order given by [`resolution_order`], and memoizes
/// every hit. Dropping the context removes its scratch files.
pub struct IsolationContext {
    parent: Arc<dyn SymbolScope>,
    global: Arc<dyn SymbolScope>,
    registries: Arc<ProviderRegistries>,
    options: ContextOptions,
    registered: Mutex<Registered>,
    memo: RwLock<HashMap<String, Symbol>>,
}

impl IsolationContext {
    pub fn new(
        parent: Arc<dyn SymbolScope>,
        global: Arc<dyn SymbolScope>,
        registries: Arc<ProviderRegistries>,
        options: ContextOptions,
    ) -> Self {
        Self {
            parent,
            global,
            registries,
            options,
            registered: Mutex::new(Registered {
                hashes: HashSet::new(),
                roots: Vec::new(),
                modules: HashMap::new(),
                pool: DescriptorPool::new(),
            }),
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Register an archive. Repeated hashes are a no-op.
    ///
    /// The hash only counts as registered once every entry has been
    /// materialized, so a failed registration can be retried.
    pub fn add_archive(&self, hash: Hash, bytes: &[u8]) -> Result<(), IsolationError> {
        let Ok(mut registered) = self.registered.lock() else {
            return Err(IsolationError::LockPoisoned);
        };
        if registered.hashes.contains(&hash) {
            tracing::debug!("archive {} already registered", hash);
            return Ok(());
        }
        if bytes.is_empty() {
            registered.hashes.insert(hash);
            return Ok(());
        }

        // Stage into a copy so a failure leaves the context untouched.
        let mut staged = Staged {
            roots: Vec::new(),
            modules: Vec::new(),
            pool: registered.pool.clone(),
        };
        let base = registered.roots.len();
        let scanned = self.materialize(hash, bytes, self.options.read_nested_archives, base, &mut staged)?;
        for (entry, nested) in scanned.nested {
            let nested_hash = crypto::content_hash(&nested);
            tracing::debug!("registering nested archive {} ({})", entry, nested_hash);
            let index = base + staged.roots.len();
            self.materialize(nested_hash, &nested, false, index, &mut staged)?;
        }

        let root_count = staged.roots.len();
        registered.roots.extend(staged.roots);
        for (symbol, location) in staged.modules {
            // Earlier roots shadow later ones.
            registered.modules.entry(symbol).or_insert(location);
        }
        registered.pool = staged.pool;
        registered.hashes.insert(hash);

        tracing::debug!("registered archive {} with {} roots", hash, root_count);
        Ok(())
    }

    fn materialize(
        &self,
        hash: Hash,
        bytes: &[u8],
        read_nested: bool,
        index: usize,
        staged: &mut Staged,
    ) -> Result<ScannedArchive, IsolationError> {
        let file = archive::materialize(bytes, self.options.scratch_dir.as_deref())?;
        let mut scanned = archive::scan(file.reopen()?, read_nested)
            .map_err(|reason| IsolationError::Archive { hash, reason })?;

        for (entry, set) in &scanned.descriptor_sets {
            staged
                .pool
                .decode_file_descriptor_set(set.as_slice())
                .map_err(|e| IsolationError::Descriptor {
                    entry: entry.clone(),
                    reason: e.to_string(),
                })?;
        }
        for (symbol, entry) in std::mem::take(&mut scanned.modules) {
            staged.modules.push((symbol, ModuleEntry { root: index, entry }));
        }
        staged.roots.push(SearchRoot { file });
        Ok(scanned)
    }

    /// Resolve `name`, memoizing the result.
    pub fn load_symbol(&self, name: &str) -> Result<Symbol, IsolationError> {
        if let Ok(memo) = self.memo.read() {
            if let Some(symbol) = memo.get(name) {
                return Ok(symbol.clone());
            }
        }

        for origin in resolution_order(name, &self.registries) {
            let found = match origin {
                ScopeKind::Isolated => self.find(name)?,
                ScopeKind::Parent => self.parent.find(name)?,
                ScopeKind::Global => self.global.find(name)?,
            };
            if let Some(kind) = found {
                tracing::trace!("resolved {} from {} scope", name, origin);
                let symbol = Symbol {
                    name: name.to_string(),
                    origin,
                    kind,
                };
                if let Ok(mut memo) = self.memo.write() {
                    memo.insert(name.to_string(), symbol.clone());
                }
                return Ok(symbol);
            }
        }
        Err(IsolationError::NotFound(name.to_string()))
    }

    /// True if `hash` has been registered.
    pub fn is_registered(&self, hash: &Hash) -> bool {
        self.registered
            .lock()
            .map(|r| r.hashes.contains(hash))
            .unwrap_or(false)
    }

    /// Number of registered archive hashes.
    pub fn archive_count(&self) -> usize {
        self.registered.lock().map(|r| r.hashes.len()).unwrap_or(0)
    }

    /// Paths of the scratch files backing this context.
    pub fn scratch_paths(&self) -> Vec<PathBuf> {
        self.registered
            .lock()
            .map(|r| r.roots.iter().map(|root| root.file.path().to_path_buf()).collect())
            .unwrap_or_default()
    }
}

impl SymbolScope for IsolationContext {
    /// Lookup in the context's own archives only.
    fn find(&self, name: &str) -> Result<Option<SymbolKind>, IsolationError> {
        let Ok(registered) = self.registered.lock() else {
            return Err(IsolationError::LockPoisoned);
        };
        if let Some(location) = registered.modules.get(name) {
            let Some(root) = registered.roots.get(location.root) else {
                return Ok(None);
            };
            let bytes = archive::read_entry(root.file.path(), &location.entry)
                .map_err(IsolationError::Io)?;
            return Ok(Some(SymbolKind::Module(Arc::from(bytes))));
        }
        Ok(registered
            .pool
            .get_message_by_name(name)
            .map(SymbolKind::Message))
    }
}

/// Roots and symbols of an in-progress registration.
struct Staged {
    roots: Vec<SearchRoot>,
    modules: Vec<(String, ModuleEntry)>,
    pool: DescriptorPool,
}
