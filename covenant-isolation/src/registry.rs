//! Provider registries.
//!
//! The host ships some contracts and schemas itself. Providers announce the
//! symbols they own; a name whose root belongs to a provider is resolved
//! from the contract's own archives first, everything else from the host
//! first.

use covenant_model::Hash;
use std::collections::HashSet;
use uuid::Uuid;

/// Separator between an outer symbol and its nested types.
pub const NESTED_SEPARATOR: char = '$';

/// The outermost symbol of `name`: everything before the first `$`.
pub fn root_identity(name: &str) -> &str {
    name.split(NESTED_SEPARATOR).next().unwrap_or(name)
}

/// A bundle of symbols known to the host at startup.
pub trait SymbolProvider: Send + Sync {
    fn uuid(&self) -> Uuid;

    /// Content hash of the bundle the symbols come from.
    fn hash(&self) -> Hash;

    /// Fully-qualified symbol names, nested names allowed.
    fn symbols(&self) -> Vec<String>;
}

/// Provider declared from plain values.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    pub uuid: Uuid,
    pub hash: Hash,
    pub symbols: Vec<String>,
}

impl StaticProvider {
    pub fn new<I, S>(hash: Hash, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uuid: Uuid::new_v4(),
            hash,
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

impl SymbolProvider for StaticProvider {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn hash(&self) -> Hash {
        self.hash
    }

    fn symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }
}

/// Root identities claimed by a set of providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    roots: HashSet<String>,
    providers: Vec<(Uuid, Hash)>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_providers<'a>(providers: impl IntoIterator<Item = &'a dyn SymbolProvider>) -> Self {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider);
        }
        registry
    }

    pub fn register(&mut self, provider: &dyn SymbolProvider) {
        let symbols = provider.symbols();
        tracing::debug!(
            "registering provider {} ({} symbols, hash {})",
            provider.uuid(),
            symbols.len(),
            provider.hash()
        );
        self.roots
            .extend(symbols.iter().map(|s| root_identity(s).to_string()));
        self.providers.push((provider.uuid(), provider.hash()));
    }

    pub fn contains_root(&self, root: &str) -> bool {
        self.roots.contains(root)
    }

    pub fn providers(&self) -> &[(Uuid, Hash)] {
        &self.providers
    }
}

/// The two registries consulted during resolution.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistries {
    /// Contract-defining providers.
    pub contracts: ProviderRegistry,
    /// Schema-defining providers.
    pub schemas: ProviderRegistry,
}

impl ProviderRegistries {
    pub fn new(contracts: ProviderRegistry, schemas: ProviderRegistry) -> Self {
        Self { contracts, schemas }
    }

    /// True if either registry claims the root of `name`.
    pub fn claims(&self, name: &str) -> bool {
        let root = root_identity(name);
        self.contracts.contains_root(root) || self.schemas.contains_root(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_identity() {
        assert_eq!(root_identity("acme.Asset"), "acme.Asset");
        assert_eq!(root_identity("acme.Asset$Lien$Holder"), "acme.Asset");
        assert_eq!(root_identity(""), "");
    }

    #[test]
    fn test_registry_claims_nested_names_by_root() {
        let schemas = StaticProvider::new(Hash([1u8; 32]), ["acme.Asset$Lien"]);
        let contracts = StaticProvider::new(Hash([2u8; 32]), ["acme.AssetContract"]);
        let registries = ProviderRegistries::new(
            ProviderRegistry::from_providers([&contracts as &dyn SymbolProvider]),
            ProviderRegistry::from_providers([&schemas as &dyn SymbolProvider]),
        );

        assert!(registries.claims("acme.Asset"));
        assert!(registries.claims("acme.Asset$Other"));
        assert!(registries.claims("acme.AssetContract"));
        assert!(!registries.claims("acme.Unrelated"));
        assert_eq!(registries.schemas.providers()[0].1, Hash([1u8; 32]));
    }
}
