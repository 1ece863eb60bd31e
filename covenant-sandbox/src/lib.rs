//! Covenant Sandbox
//!
//! Runs contract modules inside wasmtime with no host imports.
//!
//! - [`abi`]: the byte-buffer calling convention across guest memory
//! - [`metadata`]: the self-description every contract module exports

pub mod abi;
pub mod error;
pub mod metadata;

pub use abi::{ModuleInstance, ALLOCATOR, DEALLOCATOR, ENTRYPOINT, MEMORY};
pub use error::SandboxError;
pub use metadata::{ContractMetadata, FunctionDescriptor, Parameter, RecordKind, Sandbox};
