//! Engine error types

use covenant_isolation::IsolationError;
use covenant_model::PubKey;
use covenant_sandbox::SandboxError;
use covenant_store::StoreError;

/// A contract that does not fit its specification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Provided signers and their roles do not match the contract spec [required parties: {required:?}] [specified parties: {specified:?}]")]
    RecitalMismatch {
        required: Vec<String>,
        specified: Vec<String>,
    },

    #[error("Provided facts do not match the contract spec [required facts: {required:?}] [specified facts: {specified:?}]")]
    FactsMismatch {
        required: Vec<String>,
        specified: Vec<String>,
    },
}

/// Fatal errors of an execution. Guest failures are not errors: they
/// become FAIL results on a signed envelope.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Contract definition error: {0}")]
    Definition(String),

    #[error("Unable to load contract module, verify that its archive has been bootstrapped [classname: {classname}] [public key: {public_key}] [hash: {hash}]")]
    NotBootstrapped {
        classname: String,
        public_key: PubKey,
        hash: String,
    },

    #[error("Contract validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Isolation error: {0}")]
    Isolation(#[from] IsolationError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A guest function that failed to produce a usable result.
///
/// Contained: the consideration is marked FAIL with this message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error executing {function}: {message}")]
pub struct InvocationError {
    /// Index of the consideration on the contract.
    pub index: usize,
    pub function: String,
    pub message: String,
}
