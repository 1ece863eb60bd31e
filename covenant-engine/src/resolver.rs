//! Dependency resolution and invocation.
//!
//! Each pending consideration names a function in the contract metadata.
//! Its parameters are matched by name and exact type against two pools:
//! the contract's existing records and the records proposed on the
//! consideration itself. A function runs only if every declared parameter
//! resolves.

use crate::error::InvocationError;
use crate::pool::WorkerPool;
use crate::record::{self, insert_unique, RecordInstance, RecordPool};
use crate::EngineError;
use covenant_isolation::IsolationContext;
use covenant_model::{Consideration, PubKey};
use covenant_sandbox::{ContractMetadata, FunctionDescriptor, ModuleInstance, RecordKind};
use covenant_store::ObjectStore;
use std::collections::HashSet;
use std::sync::Arc;

/// Records matching the descriptor's parameters, in declared order.
///
/// A parameter resolves when its pool holds a record with the same name and
/// the same fully-qualified type. Unresolved parameters are left out.
pub fn resolve_parameters<'a>(
    descriptor: &FunctionDescriptor,
    existing: &'a RecordPool,
    proposed: &'a RecordPool,
) -> Vec<&'a RecordInstance> {
    descriptor
        .parameters
        .iter()
        .filter_map(|parameter| {
            let pool = match parameter.record_type {
                RecordKind::Existing => existing,
                RecordKind::Proposed => proposed,
            };
            pool.get(&parameter.name)
                .filter(|record| record.type_name == parameter.type_name)
        })
        .collect()
}

/// True when the function asks to be skipped because its record exists.
pub fn record_already_exists(descriptor: &FunctionDescriptor, existing: &RecordPool) -> bool {
    descriptor
        .skip_if_record_exists
        .as_ref()
        .is_some_and(|name| existing.contains_key(name))
}

/// All parameters resolved and no skip condition.
pub fn can_execute(descriptor: &FunctionDescriptor, resolved: usize, existing: &RecordPool) -> bool {
    resolved == descriptor.parameters.len() && !record_already_exists(descriptor, existing)
}

/// A consideration bound to its function and arguments.
#[derive(Debug, Clone)]
pub struct PreparedFunction {
    /// Index of the consideration on the contract.
    pub index: usize,
    pub descriptor: FunctionDescriptor,
    pub arguments: Vec<RecordInstance>,
}

impl PreparedFunction {
    /// Name under which the function's output is recorded.
    pub fn output_name(&self) -> &str {
        &self.descriptor.name
    }
}

#[derive(Debug, Default)]
pub struct Partition {
    pub executable: Vec<PreparedFunction>,
    pub skipped: Vec<PreparedFunction>,
}

/// Raw output of a successful call.
#[derive(Debug)]
pub struct Invocation {
    pub index: usize,
    pub output: Vec<u8>,
}

/// Call the guest with the prepared arguments.
pub fn invoke(instance: &mut ModuleInstance, function: &PreparedFunction) -> Result<Invocation, InvocationError> {
    let encoded: Vec<Vec<u8>> = function.arguments.iter().map(|r| r.value.encode()).collect();
    let args: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();

    let export = function.descriptor.export_name();
    tracing::trace!("invoking {} with {} arguments", export, args.len());
    instance
        .call(export, &args)
        .map(|output| Invocation {
            index: function.index,
            output,
        })
        .map_err(|e| InvocationError {
            index: function.index,
            function: export.to_string(),
            message: e.to_string(),
        })
}

/// Binds considerations to functions, fetching what they propose.
pub struct Resolver {
    pool: WorkerPool,
    store: Arc<dyn ObjectStore>,
    ctx: Arc<IsolationContext>,
    reader: PubKey,
}

impl Resolver {
    pub fn new(pool: WorkerPool, store: Arc<dyn ObjectStore>, ctx: Arc<IsolationContext>, reader: PubKey) -> Self {
        Self { pool, store, ctx, reader }
    }

    /// Split pending considerations into executable and skipped functions.
    /// Considerations that already carry a result are left alone.
    pub async fn partition(
        &self,
        considerations: &[Consideration],
        metadata: &ContractMetadata,
        existing: &RecordPool,
    ) -> Result<Partition, EngineError> {
        let mut partition = Partition::default();

        for (index, consideration) in considerations.iter().enumerate() {
            if !consideration.is_pending() {
                continue;
            }
            let descriptor = metadata
                .function(&consideration.consideration_name)
                .ok_or_else(|| {
                    EngineError::Definition(format!(
                        "Unable to find function {} on contract {}",
                        consideration.consideration_name, metadata.name
                    ))
                })?;

            let proposed = self.load_proposed(consideration, descriptor).await?;
            let arguments: Vec<RecordInstance> = resolve_parameters(descriptor, existing, &proposed)
                .into_iter()
                .cloned()
                .collect();
            let executable = can_execute(descriptor, arguments.len(), existing);

            let prepared = PreparedFunction {
                index,
                descriptor: descriptor.clone(),
                arguments,
            };
            if executable {
                partition.executable.push(prepared);
            } else {
                partition.skipped.push(prepared);
            }
        }

        tracing::trace!(
            "skipped records: {:?}",
            partition.skipped.iter().map(|f| f.output_name()).collect::<Vec<_>>()
        );
        Ok(partition)
    }

    /// Fetch the proposed inputs a function's parameters ask for.
    async fn load_proposed(
        &self,
        consideration: &Consideration,
        descriptor: &FunctionDescriptor,
    ) -> Result<RecordPool, EngineError> {
        let wanted: HashSet<&str> = descriptor
            .parameters
            .iter()
            .filter(|p| p.record_type == RecordKind::Proposed)
            .map(|p| p.name.as_str())
            .collect();

        let mut seen = HashSet::new();
        let mut located = Vec::new();
        for input in &consideration.inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(EngineError::Definition(format!(
                    "Found duplicate proposed records by name: {}",
                    input.name
                )));
            }
            let hash = record::content_reference(&input.name, &input.hash)?;
            if !wanted.contains(input.name.as_str()) {
                continue;
            }
            if let Some(hash) = hash {
                located.push((input.name.clone(), input.classname.clone(), hash));
            }
        }

        let tasks = located.iter().map(|(_, classname, hash)| {
            let store = self.store.clone();
            let ctx = self.ctx.clone();
            let reader = self.reader;
            let classname = classname.clone();
            let hash = *hash;
            async move { record::fetch_record(store.as_ref(), &ctx, &reader, &classname, &hash).await }
        });
        let messages = self.pool.run_all(tasks).await?;

        let mut proposed = RecordPool::new();
        for ((name, _, _), message) in located.into_iter().zip(messages) {
            insert_unique(&mut proposed, RecordInstance::single(name, message))?;
        }
        Ok(proposed)
    }
}
