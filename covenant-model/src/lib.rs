//! Covenant Model
//!
//! Pure data types for the contract engine: strong byte types, the crypto
//! primitives, caller-owned keys, and the protobuf wire model for envelopes
//! and contracts. Nothing here touches storage or the sandbox.

pub mod types;
pub mod crypto;
pub mod keys;
pub mod contract;

// Re-exports
pub use types::{Hash, PubKey, Signature};
pub use crypto::CryptoError;
pub use keys::{KeyRef, Signer};
pub use contract::{
    sign_contract, verify_contract_signature, Consideration, Contract, ContractSignature,
    ContractSpecification, DefinitionSpec, DefinitionType, Envelope, EnvelopeRef,
    ExecutionResult, FunctionSpec, Location, OutputSpec, PartyType, ProposedRecord, Recital,
    Record, ResultType, ScopeRecord, ScopeState, SigningAndEncryptionKeys,
};
