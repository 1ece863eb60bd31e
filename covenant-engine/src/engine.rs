//! Execution orchestrator.
//!
//! `ContractEngine::handle` takes an envelope whose contract has pending
//! considerations, runs the matching guest functions and returns the
//! envelope with results recorded and one new signature appended.

use crate::config::EngineConfig;
use crate::pool::WorkerPool;
use crate::record::{self, load_existing};
use crate::resolver::{invoke, Resolver};
use crate::validator::validate_all;
use crate::EngineError;
use covenant_isolation::{
    CacheKey, HostScope, IsolationContext, ModuleCache, ProviderRegistries, SymbolScope,
};
use covenant_model::{
    crypto, sign_contract, Contract, ContractSpecification, DefinitionSpec, Envelope,
    ExecutionResult, Hash, KeyRef, ProposedRecord, PubKey, ScopeState,
};
use covenant_sandbox::{ContractMetadata, Sandbox};
use covenant_store::{ObjectStore, StoreError};
use prost::Message;
use prost_reflect::{DynamicMessage, ReflectMessage};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A decoded function output waiting to be signed and stored.
struct PendingOutput {
    index: usize,
    name: String,
    message: DynamicMessage,
}

/// Runs contracts against an object store.
///
/// Cheap to share behind an `Arc`; the module cache and worker pool are
/// shared by every call.
pub struct ContractEngine {
    store: Arc<dyn ObjectStore>,
    cache: Arc<ModuleCache>,
    pool: WorkerPool,
    sandbox: Sandbox,
    config: EngineConfig,
}

impl ContractEngine {
    pub fn builder() -> ContractEngineBuilder {
        ContractEngineBuilder::new()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn module_cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    pub fn worker_pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute the pending considerations of `envelope`.
    ///
    /// `encryption_key` identifies the caller to the store and owns the
    /// outputs; `signing_key` signs the outputs and seals the contract.
    /// `scope` supplies prior outputs used as ancestors. Every output is
    /// readable by the recital encryption keys plus `extra_audience`.
    ///
    /// A guest failure is not an error: the failing consideration becomes
    /// FAIL and the contract is sealed as it stands.
    #[tracing::instrument(skip_all, fields(execution = %envelope.execution_uuid))]
    pub async fn handle(
        &self,
        encryption_key: &KeyRef,
        signing_key: &KeyRef,
        mut envelope: Envelope,
        scope: Option<&ScopeState>,
        extra_audience: &[PubKey],
    ) -> Result<Envelope, EngineError> {
        let reader = encryption_key.public_key();
        let Some(mut contract) = envelope.contract.take() else {
            return Err(EngineError::Definition("Envelope carries no contract".to_string()));
        };

        // ==== Specification ====
        let spec = self.load_spec(&contract, &reader).await?;
        let Some(spec_definition) = spec.definition.as_ref() else {
            return Err(EngineError::Definition(
                "Contract specification has no definition".to_string(),
            ));
        };
        let Some(first_function) = spec.function_specs.first() else {
            return Err(EngineError::Definition(
                "Contract specification declares no functions".to_string(),
            ));
        };
        let output_definition = first_function.output_definition();

        // ==== Isolation context ====
        let contract_definition = contract.definition.as_ref();
        let key = CacheKey::new(
            spec_definition.hash_bytes(),
            contract_definition.map(DefinitionSpec::hash_bytes).unwrap_or_default(),
            output_definition.map(DefinitionSpec::hash_bytes).unwrap_or_default(),
        );
        let ctx = self.cache.get_or_create(key)?;
        tracing::trace!("using isolation context {}", key);

        // ==== Contract module ====
        let spec_module = self.load_module(&ctx, spec_definition, &reader).await?;
        self.preload(&ctx, [Some(spec_definition), output_definition], &reader)
            .await?;

        validate_all(&contract, &spec)?;

        let module_name = contract_definition
            .map(|d| d.classname())
            .filter(|name| !name.is_empty() && *name != spec_definition.classname());
        let module_bytes = match module_name {
            Some(name) => resolve_module(&ctx, name)?,
            None => spec_module,
        };
        let (mut instance, metadata) = self.sandbox.load(&module_bytes).map_err(|e| {
            EngineError::Definition(format!(
                "Unable to load contract {}: {}",
                spec_definition.classname(),
                e
            ))
        })?;

        // ==== Dependency resolution ====
        let existing = load_existing(
            &self.pool,
            self.store.clone(),
            ctx.clone(),
            reader,
            &contract.inputs,
        )
        .await?;
        let resolver = Resolver::new(self.pool.clone(), self.store.clone(), ctx.clone(), reader);
        let partition = resolver
            .partition(&contract.considerations, &metadata, &existing)
            .await?;
        tracing::trace!(
            "{} executable, {} skipped",
            partition.executable.len(),
            partition.skipped.len()
        );

        // ==== Invocation ====
        let mut pending = Vec::with_capacity(partition.executable.len());
        for function in &partition.executable {
            let invocation = match invoke(&mut instance, function) {
                Ok(invocation) => invocation,
                Err(e) => {
                    tracing::error!("{}", e);
                    set_result(&mut contract, e.index, ExecutionResult::fail(e.to_string()));
                    return Ok(seal(envelope, contract, signing_key));
                }
            };
            let decoded = decode_output(
                &ctx,
                &metadata,
                function.output_name(),
                &function.descriptor.return_type,
                &invocation.output,
            )?;
            match decoded {
                Ok(message) => pending.push(PendingOutput {
                    index: invocation.index,
                    name: function.output_name().to_string(),
                    message,
                }),
                Err(detail) => {
                    tracing::error!("{}", detail);
                    set_result(&mut contract, invocation.index, ExecutionResult::fail(detail));
                    return Ok(seal(envelope, contract, signing_key));
                }
            }
        }

        for function in &partition.skipped {
            tracing::debug!("skipping {}", function.output_name());
            set_result(
                &mut contract,
                function.index,
                ExecutionResult::skip(function.output_name(), &function.descriptor.return_type),
            );
        }

        // ==== Sign and store ====
        let audience: BTreeSet<PubKey> = contract
            .recitals
            .iter()
            .filter_map(|r| r.encryption_key())
            .chain(extra_audience.iter().copied())
            .collect();
        let outputs = self
            .store_outputs(pending, encryption_key, signing_key, &audience, scope)
            .await?;
        for (index, output) in outputs {
            set_result(&mut contract, index, ExecutionResult::pass(output));
        }

        Ok(seal(envelope, contract, signing_key))
    }

    /// Fetch and decode the contract's specification.
    async fn load_spec(&self, contract: &Contract, reader: &PubKey) -> Result<ContractSpecification, EngineError> {
        let Some(spec_record) = contract.spec.as_ref() else {
            return Err(EngineError::Definition("Contract has no specification".to_string()));
        };
        let Some(hash) = spec_record.content_hash() else {
            return Err(EngineError::Definition(format!(
                "Specification {} has no content hash",
                spec_record.name
            )));
        };
        let bytes = self
            .store
            .get_record(spec_record.classname(), &hash, reader)
            .await?;
        ContractSpecification::decode(bytes.as_slice()).map_err(|e| {
            EngineError::Definition(format!(
                "Unable to decode contract specification {}: {}",
                hash, e
            ))
        })
    }

    /// Register the definition archive and resolve its module.
    async fn load_module(
        &self,
        ctx: &IsolationContext,
        definition: &DefinitionSpec,
        reader: &PubKey,
    ) -> Result<Vec<u8>, EngineError> {
        let classname = definition.classname();
        let not_bootstrapped = || EngineError::NotBootstrapped {
            classname: classname.to_string(),
            public_key: *reader,
            hash: hex::encode(definition.hash_bytes()),
        };

        if let Some(hash) = definition.content_hash() {
            if !ctx.is_registered(&hash) {
                let jar = match self.store.get_jar(&hash, reader).await {
                    Ok(jar) => jar,
                    Err(e) if e.is_not_found() => return Err(not_bootstrapped()),
                    Err(e) => return Err(e.into()),
                };
                ctx.add_archive(hash, &jar)?;
            }
        }

        match resolve_module(ctx, classname) {
            Err(EngineError::Isolation(e)) if e.is_not_found() => Err(not_bootstrapped()),
            other => other,
        }
    }

    /// Fetch and register archives concurrently. Missing archives are
    /// registered empty so they are not fetched again.
    async fn preload<'a>(
        &self,
        ctx: &Arc<IsolationContext>,
        definitions: impl IntoIterator<Item = Option<&'a DefinitionSpec>>,
        reader: &PubKey,
    ) -> Result<(), EngineError> {
        let mut hashes: Vec<Hash> = definitions
            .into_iter()
            .flatten()
            .filter_map(DefinitionSpec::content_hash)
            .filter(|hash| !ctx.is_registered(hash))
            .collect();
        hashes.dedup();

        let tasks = hashes.into_iter().map(|hash| {
            let store = self.store.clone();
            let ctx = ctx.clone();
            let reader = *reader;
            async move {
                match store.get_jar(&hash, &reader).await {
                    Ok(jar) => ctx.add_archive(hash, &jar)?,
                    Err(StoreError::NotFound(_)) => {
                        tracing::warn!("archive {} not found, continuing without it", hash);
                        ctx.add_archive(hash, &[])?;
                    }
                    Err(e) => return Err(e.into()),
                }
                Ok(())
            }
        });
        self.pool.run_all(tasks).await?;
        Ok(())
    }

    /// Store every output for the audience and build its PASS record.
    async fn store_outputs(
        &self,
        pending: Vec<PendingOutput>,
        encryption_key: &KeyRef,
        signing_key: &KeyRef,
        audience: &BTreeSet<PubKey>,
        scope: Option<&ScopeState>,
    ) -> Result<Vec<(usize, ProposedRecord)>, EngineError> {
        let owner = encryption_key.public_key();
        let tasks = pending.into_iter().map(|output| {
            let store = self.store.clone();
            let signer = signing_key.clone();
            let audience = audience.clone();
            let ancestor = scope.and_then(|s| s.prior_output_hash(&output.name));
            async move {
                let type_name = output.message.descriptor().full_name().to_string();
                let bytes = output.message.encode_to_vec();
                let local = crypto::content_hash(&bytes);

                let hash = store
                    .put_record(&type_name, bytes, &signer, &owner, &audience)
                    .await?;
                if hash != local {
                    tracing::debug!("store returned {} for output {} (local {})", hash, output.name, local);
                }

                let mut record = ProposedRecord::new(output.name, type_name, hash);
                if let Some(ancestor) = ancestor {
                    record.ancestor_hash = ancestor;
                }
                Ok((output.index, record))
            }
        });
        self.pool.run_all(tasks).await
    }
}

/// Resolve a symbol that must be a module.
fn resolve_module(ctx: &IsolationContext, name: &str) -> Result<Vec<u8>, EngineError> {
    let symbol = ctx.load_symbol(name)?;
    symbol
        .module_bytes()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| EngineError::Definition(format!("{} is not a contract module", name)))
}

/// Decode a raw function result as its declared return type.
///
/// The outer error is fatal; the inner one fails the consideration.
fn decode_output(
    ctx: &IsolationContext,
    metadata: &ContractMetadata,
    function: &str,
    return_type: &str,
    output: &[u8],
) -> Result<Result<DynamicMessage, String>, EngineError> {
    if output.is_empty() {
        return Err(EngineError::Definition(format!(
            "Function {} on contract {} returned no result",
            function, metadata.name
        )));
    }
    let descriptor = record::message_descriptor(ctx, return_type)?;
    Ok(DynamicMessage::decode(descriptor, output).map_err(|e| {
        format!("Unable to decode result of {} as {}: {}", function, return_type, e)
    }))
}

fn set_result(contract: &mut Contract, index: usize, result: ExecutionResult) {
    if let Some(consideration) = contract.considerations.get_mut(index) {
        consideration.result = Some(result);
    }
}

/// Attach the contract and append exactly one signature.
fn seal(mut envelope: Envelope, contract: Contract, signing_key: &KeyRef) -> Envelope {
    envelope.signatures.push(sign_contract(&contract, signing_key));
    envelope.contract = Some(contract);
    envelope
}

// ==== Builder ====

/// Builder for [`ContractEngine`].
pub struct ContractEngineBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    config: EngineConfig,
    host: Option<Arc<dyn SymbolScope>>,
    registries: ProviderRegistries,
    cache: Option<Arc<ModuleCache>>,
    pool: Option<WorkerPool>,
    sandbox: Option<Sandbox>,
}

impl Default for ContractEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractEngineBuilder {
    /// Starts from `EngineConfig::from_env()`.
    pub fn new() -> Self {
        Self {
            store: None,
            config: EngineConfig::from_env(),
            host: None,
            registries: ProviderRegistries::default(),
            cache: None,
            pool: None,
            sandbox: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Symbols provided by the host, consulted as the parent scope.
    pub fn with_host_scope(mut self, host: Arc<dyn SymbolScope>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_registries(mut self, registries: ProviderRegistries) -> Self {
        self.registries = registries;
        self
    }

    /// Share a module cache between engines. Overrides the host scope,
    /// registries and cache settings of this builder.
    pub fn with_module_cache(mut self, cache: Arc<ModuleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_worker_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn build(self) -> Result<ContractEngine, EngineError> {
        let Some(store) = self.store else {
            return Err(EngineError::Config("an object store is required".to_string()));
        };
        let config = self.config;

        let cache = match self.cache {
            Some(cache) => cache,
            None => {
                let host = self.host.unwrap_or_else(|| Arc::new(HostScope::new()));
                Arc::new(ModuleCache::new(
                    config.module_cache_capacity,
                    host,
                    Arc::new(self.registries),
                    config.context_options(),
                ))
            }
        };
        let pool = self
            .pool
            .unwrap_or_else(|| WorkerPool::new(config.worker_pool_size));

        tracing::debug!(
            "contract engine ready: pool size {}, cache capacity {}",
            pool.size(),
            cache.capacity()
        );

        Ok(ContractEngine {
            store,
            cache,
            pool,
            sandbox: self.sandbox.unwrap_or_default(),
            config,
        })
    }
}
