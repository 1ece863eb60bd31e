//! Symbols, scopes and the resolution order.

use crate::registry::ProviderRegistries;
use crate::IsolationError;
use prost_reflect::{DescriptorPool, MessageDescriptor};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Names in this namespace always resolve from the host first.
pub const RESERVED_NAMESPACE: &str = "google.protobuf.";

/// Where a symbol was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// The contract's own registered archives.
    Isolated,
    /// The host that embeds the engine.
    Parent,
    /// The process-wide descriptor pool.
    Global,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Isolated => write!(f, "isolated"),
            ScopeKind::Parent => write!(f, "parent"),
            ScopeKind::Global => write!(f, "global"),
        }
    }
}

/// What a name resolves to.
#[derive(Clone)]
pub enum SymbolKind {
    /// WebAssembly module bytes.
    Module(Arc<[u8]>),
    /// A protobuf message type.
    Message(MessageDescriptor),
}

impl fmt::Debug for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Module(bytes) => write!(f, "Module({} bytes)", bytes.len()),
            SymbolKind::Message(desc) => write!(f, "Message({})", desc.full_name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub origin: ScopeKind,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn module_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            SymbolKind::Module(bytes) => Some(bytes),
            SymbolKind::Message(_) => None,
        }
    }

    pub fn message_descriptor(&self) -> Option<&MessageDescriptor> {
        match &self.kind {
            SymbolKind::Message(desc) => Some(desc),
            SymbolKind::Module(_) => None,
        }
    }
}

/// One resolution strategy. `Ok(None)` means not found here.
pub trait SymbolScope: Send + Sync {
    fn find(&self, name: &str) -> Result<Option<SymbolKind>, IsolationError>;
}

/// Scopes to try for `name`, in order.
///
/// Reserved names and names no provider claims go to the host first; the
/// host is authoritative for anything it did not delegate. Claimed names
/// are looked up in the contract's archives first. The global pool is
/// always last.
pub fn resolution_order(name: &str, registries: &ProviderRegistries) -> [ScopeKind; 3] {
    let parent_first = name.starts_with(RESERVED_NAMESPACE) || !registries.claims(name);
    if parent_first {
        [ScopeKind::Parent, ScopeKind::Isolated, ScopeKind::Global]
    } else {
        [ScopeKind::Isolated, ScopeKind::Parent, ScopeKind::Global]
    }
}

// ---------------------------------------------------------------------------
// Host scope
// ---------------------------------------------------------------------------

/// Symbols supplied by the embedding host.
#[derive(Clone)]
pub struct HostScope {
    pool: DescriptorPool,
    modules: HashMap<String, Arc<[u8]>>,
}

impl Default for HostScope {
    fn default() -> Self {
        Self::with_pool(DescriptorPool::new())
    }
}

impl HostScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(pool: DescriptorPool) -> Self {
        Self {
            pool,
            modules: HashMap::new(),
        }
    }

    /// Add message types from an encoded `FileDescriptorSet`.
    pub fn add_descriptor_set(&mut self, bytes: &[u8]) -> Result<(), IsolationError> {
        self.pool
            .decode_file_descriptor_set(bytes)
            .map_err(|e| IsolationError::Descriptor {
                entry: "host".to_string(),
                reason: e.to_string(),
            })
    }

    /// Register a module the host provides under `name`.
    pub fn add_module(&mut self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.modules.insert(name.into(), bytes.into());
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

impl SymbolScope for HostScope {
    fn find(&self, name: &str) -> Result<Option<SymbolKind>, IsolationError> {
        if let Some(bytes) = self.modules.get(name) {
            return Ok(Some(SymbolKind::Module(bytes.clone())));
        }
        Ok(self.pool.get_message_by_name(name).map(SymbolKind::Message))
    }
}

// ---------------------------------------------------------------------------
// Global scope
// ---------------------------------------------------------------------------

/// The process-wide descriptor pool (`DescriptorPool::global()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalScope;

impl SymbolScope for GlobalScope {
    fn find(&self, name: &str) -> Result<Option<SymbolKind>, IsolationError> {
        Ok(DescriptorPool::global()
            .get_message_by_name(name)
            .map(SymbolKind::Message))
    }
}
