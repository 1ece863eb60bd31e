//! Isolation error type

use covenant_model::Hash;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IsolationError {
    #[error("Symbol not found: {0}")]
    NotFound(String),

    #[error("Invalid archive {hash}: {reason}")]
    Archive { hash: Hash, reason: String },

    #[error("Invalid descriptor set {entry}: {reason}")]
    Descriptor { entry: String, reason: String },

    #[error("Scratch file error: {0}")]
    Io(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

impl IsolationError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IsolationError::NotFound(_))
    }
}

impl From<std::io::Error> for IsolationError {
    fn from(e: std::io::Error) -> Self {
        IsolationError::Io(e.to_string())
    }
}
