//! Contract metadata and module bootstrap.
//!
//! Each contract module describes itself: calling `__p8e_entrypoint` with no
//! arguments returns a UTF-8 JSON document (snake_case keys) listing the
//! contract's functions and the records they consume and produce. Nothing
//! is accepted partially; a module that cannot describe itself is unusable.

use crate::abi::{ModuleInstance, DEALLOCATOR, ENTRYPOINT};
use crate::SandboxError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wasmtime::Engine;

/// Where a function parameter is sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Proposed inline on the consideration being executed.
    Proposed,
    /// Already stored and listed as a contract input.
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub record_type: RecordKind,
    pub name: String,
    pub optional: bool,
    /// Fully-qualified message type the parameter must have.
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub method_name: String,
    pub invoked_by: String,
    pub parameters: Vec<Parameter>,
    pub return_type: String,
    /// Skip the function when an existing record with this name is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if_record_exists: Option<String>,
}

impl FunctionDescriptor {
    /// Guest export implementing the function.
    pub fn export_name(&self) -> &str {
        if self.method_name.is_empty() {
            &self.name
        } else {
            &self.method_name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub scope_specification_uuids: Vec<String>,
    pub participants: Vec<String>,
    pub name: String,
    pub description: String,
    pub website_url: String,
    pub icon_url: String,
    pub functions: Vec<FunctionDescriptor>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ContractMetadata {
    /// Parse the entry point's output and index functions by name.
    pub fn parse(bytes: &[u8]) -> Result<Self, SandboxError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SandboxError::Metadata(format!("not UTF-8: {}", e)))?;
        let mut metadata: ContractMetadata =
            serde_json::from_str(text).map_err(|e| SandboxError::Metadata(e.to_string()))?;

        for (i, function) in metadata.functions.iter().enumerate() {
            if metadata.index.insert(function.name.clone(), i).is_some() {
                return Err(SandboxError::Metadata(format!(
                    "function {} is declared more than once",
                    function.name
                )));
            }
        }
        Ok(metadata)
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.index.get(name).and_then(|&i| self.functions.get(i))
    }
}

/// Loads contract modules into fresh instances.
#[derive(Clone, Default)]
pub struct Sandbox {
    engine: Engine,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a configured wasmtime engine.
    pub fn with_engine(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile and instantiate without reading metadata.
    pub fn instantiate(&self, module_bytes: &[u8]) -> Result<ModuleInstance, SandboxError> {
        ModuleInstance::new(&self.engine, module_bytes)
    }

    /// Instantiate a contract module and read its metadata.
    pub fn load(
        &self,
        module_bytes: &[u8],
    ) -> Result<(ModuleInstance, ContractMetadata), SandboxError> {
        let mut instance = self.instantiate(module_bytes)?;
        let raw = instance.call(ENTRYPOINT, &[])?;
        let metadata = ContractMetadata::parse(&raw)?;

        if !instance.has_function(DEALLOCATOR) {
            tracing::debug!("contract {} does not export {}", metadata.name, DEALLOCATOR);
        }
        tracing::trace!(
            "loaded contract {} with {} functions",
            metadata.name,
            metadata.functions.len()
        );
        Ok((instance, metadata))
    }
}
