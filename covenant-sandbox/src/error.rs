//! Sandbox error type

/// Errors raised while loading or calling a guest module.
///
/// Every variant is fatal for the call that produced it. Guest traps are
/// reported, never masked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to compile module: {0}")]
    Compile(String),

    #[error("Failed to instantiate module: {0}")]
    Instantiate(String),

    #[error("Missing export: {0}")]
    MissingExport(String),

    #[error("Export {name} has signature {actual}, expected {expected}")]
    Signature {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Guest trapped in {function}: {message}")]
    Trap { function: String, message: String },

    #[error("Guest memory access out of bounds: {len} bytes at offset {offset}")]
    OutOfBounds { offset: usize, len: usize },

    #[error("Buffer of {0} bytes does not fit the guest address space")]
    BufferTooLarge(usize),

    #[error("Invalid contract metadata: {0}")]
    Metadata(String),
}
