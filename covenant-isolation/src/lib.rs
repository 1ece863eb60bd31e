//! Covenant Isolation
//!
//! Every contract executes against its own symbol namespace. An
//! [`IsolationContext`] owns the archives registered for one contract
//! (module bytes and message schemas) and resolves names against them,
//! the host, and the process-wide descriptor pool in a fixed order.
//! Contexts are shared through a bounded [`ModuleCache`].

pub mod archive;
pub mod cache;
pub mod context;
pub mod error;
pub mod registry;
pub mod scope;

pub use cache::{CacheKey, EvictionHook, ModuleCache, DEFAULT_CACHE_CAPACITY};
pub use context::{ContextOptions, IsolationContext};
pub use error::IsolationError;
pub use registry::{root_identity, ProviderRegistries, ProviderRegistry, StaticProvider, SymbolProvider};
pub use scope::{
    resolution_order, GlobalScope, HostScope, ScopeKind, Symbol, SymbolKind, SymbolScope,
    RESERVED_NAMESPACE,
};
