//! Contract data model.
//!
//! Wire types for envelopes, contracts, specifications and results. They are
//! protobuf messages so a sealed contract has one canonical byte encoding:
//! the signature appended to an envelope covers `Contract::encode_to_vec()`.

use crate::crypto::{self, CryptoError};
use crate::keys::Signer;
use crate::types::{Hash, PubKey, Signature};
use prost::Message;

// ============================================================================
// Enumerations
// ============================================================================

/// Role a party plays on a contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PartyType {
    Unspecified = 0,
    Originator = 1,
    Servicer = 2,
    Investor = 3,
    Custodian = 4,
    Owner = 5,
    Affiliate = 6,
    Omnibus = 7,
    Provenance = 8,
    Controller = 10,
    Validator = 11,
}

/// How a definition is supplied to a contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DefinitionType {
    Unspecified = 0,
    Proposed = 1,
    Fact = 2,
    FactList = 3,
}

/// Outcome of one consideration. `Unset` marks a pending slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ResultType {
    Unset = 0,
    Pass = 1,
    Skip = 2,
    Fail = 3,
}

// ============================================================================
// Specification
// ============================================================================

/// Content-addressed pointer to a stored object.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Location {
    /// Type name of the stored object (message full name or module symbol).
    #[prost(string, tag = "1")]
    pub classname: String,

    /// Content hash; empty when the location has no content yet.
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
}

impl Location {
    pub fn new(classname: impl Into<String>, hash: Hash) -> Self {
        Self {
            classname: classname.into(),
            hash: hash.to_vec(),
        }
    }

    /// Parsed content hash, `None` when empty or malformed.
    pub fn content_hash(&self) -> Option<Hash> {
        Hash::from_proto(&self.hash)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DefinitionSpec {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, optional, tag = "2")]
    pub resource_location: Option<Location>,

    #[prost(enumeration = "DefinitionType", tag = "3")]
    pub kind: i32,
}

impl DefinitionSpec {
    /// Classname of the resource, empty if no location is set.
    pub fn classname(&self) -> &str {
        self.resource_location
            .as_ref()
            .map(|l| l.classname.as_str())
            .unwrap_or_default()
    }

    /// Raw hash bytes of the resource, empty if no location is set.
    pub fn hash_bytes(&self) -> &[u8] {
        self.resource_location
            .as_ref()
            .map(|l| l.hash.as_slice())
            .unwrap_or_default()
    }

    pub fn content_hash(&self) -> Option<Hash> {
        Hash::from_proto(self.hash_bytes())
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OutputSpec {
    #[prost(message, optional, tag = "1")]
    pub spec: Option<DefinitionSpec>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FunctionSpec {
    #[prost(string, tag = "1")]
    pub func_name: String,

    #[prost(message, repeated, tag = "2")]
    pub input_specs: Vec<DefinitionSpec>,

    #[prost(enumeration = "PartyType", tag = "3")]
    pub invoker_party: i32,

    #[prost(message, optional, tag = "4")]
    pub output_spec: Option<OutputSpec>,
}

impl FunctionSpec {
    /// Definition of the function's output, if declared.
    pub fn output_definition(&self) -> Option<&DefinitionSpec> {
        self.output_spec.as_ref().and_then(|o| o.spec.as_ref())
    }
}

/// Immutable description of a contract, stored by content hash.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ContractSpecification {
    #[prost(message, optional, tag = "1")]
    pub definition: Option<DefinitionSpec>,

    /// Facts the contract requires on its inputs.
    #[prost(message, repeated, tag = "2")]
    pub input_specs: Vec<DefinitionSpec>,

    #[prost(enumeration = "PartyType", repeated, tag = "3")]
    pub parties_involved: Vec<i32>,

    #[prost(message, repeated, tag = "4")]
    pub function_specs: Vec<FunctionSpec>,
}

// ============================================================================
// Contract
// ============================================================================

/// A named, already-stored record on the contract.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Record {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, optional, tag = "2")]
    pub data_location: Option<Location>,
}

impl Record {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            data_location: Some(location),
        }
    }

    pub fn classname(&self) -> &str {
        self.data_location
            .as_ref()
            .map(|l| l.classname.as_str())
            .unwrap_or_default()
    }

    /// True when the record points at stored content.
    pub fn has_content(&self) -> bool {
        self.data_location
            .as_ref()
            .is_some_and(|l| !l.hash.is_empty())
    }

    pub fn content_hash(&self) -> Option<Hash> {
        self.data_location.as_ref().and_then(Location::content_hash)
    }
}

/// A record proposed inline with a consideration, or produced by one.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ProposedRecord {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,

    #[prost(string, tag = "3")]
    pub classname: String,

    /// Hash of the prior output this record supersedes, empty if none.
    #[prost(bytes = "vec", tag = "4")]
    pub ancestor_hash: Vec<u8>,
}

impl ProposedRecord {
    pub fn new(name: impl Into<String>, classname: impl Into<String>, hash: Hash) -> Self {
        Self {
            name: name.into(),
            hash: hash.to_vec(),
            classname: classname.into(),
            ancestor_hash: Vec::new(),
        }
    }

    pub fn content_hash(&self) -> Option<Hash> {
        Hash::from_proto(&self.hash)
    }

    pub fn ancestor(&self) -> Option<Hash> {
        Hash::from_proto(&self.ancestor_hash)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ExecutionResult {
    #[prost(enumeration = "ResultType", tag = "1")]
    pub result: i32,

    #[prost(message, optional, tag = "2")]
    pub output: Option<ProposedRecord>,

    #[prost(string, tag = "3")]
    pub error_message: String,
}

impl ExecutionResult {
    pub fn pass(output: ProposedRecord) -> Self {
        Self {
            result: ResultType::Pass.into(),
            output: Some(output),
            error_message: String::new(),
        }
    }

    pub fn fail(error_message: impl Into<String>) -> Self {
        Self {
            result: ResultType::Fail.into(),
            output: None,
            error_message: error_message.into(),
        }
    }

    /// SKIP carries the output name and type without a hash.
    pub fn skip(name: impl Into<String>, classname: impl Into<String>) -> Self {
        Self {
            result: ResultType::Skip.into(),
            output: Some(ProposedRecord {
                name: name.into(),
                classname: classname.into(),
                ..Default::default()
            }),
            error_message: String::new(),
        }
    }

    /// True for the default instance, i.e. a slot that has not run yet.
    pub fn is_unset(&self) -> bool {
        *self == ExecutionResult::default()
    }
}

/// One function-invocation slot on a contract.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Consideration {
    #[prost(string, tag = "1")]
    pub consideration_name: String,

    #[prost(message, repeated, tag = "2")]
    pub inputs: Vec<ProposedRecord>,

    #[prost(message, optional, tag = "3")]
    pub result: Option<ExecutionResult>,
}

impl Consideration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            consideration_name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: ProposedRecord) -> Self {
        self.inputs.push(input);
        self
    }

    /// Pending until a non-default result is set.
    pub fn is_pending(&self) -> bool {
        self.result.as_ref().map_or(true, ExecutionResult::is_unset)
    }

    /// The result type, `Unset` while pending.
    pub fn outcome(&self) -> ResultType {
        self.result
            .as_ref()
            .map(|r| r.result())
            .unwrap_or(ResultType::Unset)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SigningAndEncryptionKeys {
    #[prost(bytes = "vec", tag = "1")]
    pub signing_public_key: Vec<u8>,

    #[prost(bytes = "vec", tag = "2")]
    pub encryption_public_key: Vec<u8>,
}

/// Binds a party role to the keys of the party filling it.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Recital {
    #[prost(enumeration = "PartyType", tag = "1")]
    pub signer_role: i32,

    #[prost(message, optional, tag = "2")]
    pub signer: Option<SigningAndEncryptionKeys>,
}

impl Recital {
    pub fn new(role: PartyType, signing: PubKey, encryption: PubKey) -> Self {
        Self {
            signer_role: role.into(),
            signer: Some(SigningAndEncryptionKeys {
                signing_public_key: signing.to_vec(),
                encryption_public_key: encryption.to_vec(),
            }),
        }
    }

    /// Encryption key of the bound signer, if present and well formed.
    pub fn encryption_key(&self) -> Option<PubKey> {
        self.signer
            .as_ref()
            .and_then(|s| PubKey::try_from(s.encryption_public_key.as_slice()).ok())
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Contract {
    #[prost(message, optional, tag = "1")]
    pub definition: Option<DefinitionSpec>,

    /// Points at the stored `ContractSpecification`.
    #[prost(message, optional, tag = "2")]
    pub spec: Option<Record>,

    #[prost(message, repeated, tag = "3")]
    pub inputs: Vec<Record>,

    #[prost(message, repeated, tag = "4")]
    pub considerations: Vec<Consideration>,

    #[prost(message, repeated, tag = "5")]
    pub recitals: Vec<Recital>,
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct ContractSignature {
    #[prost(bytes = "vec", tag = "1")]
    pub signer: Vec<u8>,

    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

/// Routing metadata for an envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct EnvelopeRef {
    #[prost(string, tag = "1")]
    pub scope_uuid: String,

    #[prost(string, tag = "2")]
    pub session_uuid: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(message, optional, tag = "1")]
    pub envelope_ref: Option<EnvelopeRef>,

    #[prost(message, optional, tag = "2")]
    pub contract: Option<Contract>,

    #[prost(message, repeated, tag = "3")]
    pub signatures: Vec<ContractSignature>,

    #[prost(string, tag = "4")]
    pub execution_uuid: String,

    #[prost(string, tag = "5")]
    pub scope_spec_uuid: String,

    #[prost(bool, tag = "6")]
    pub new_scope: bool,

    #[prost(bool, tag = "7")]
    pub new_session: bool,
}

// ============================================================================
// Prior scope state
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct ScopeRecord {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, repeated, tag = "2")]
    pub outputs: Vec<ProposedRecord>,
}

/// Records already on a scope, supplied by the caller.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ScopeState {
    #[prost(string, tag = "1")]
    pub scope_uuid: String,

    #[prost(message, repeated, tag = "2")]
    pub records: Vec<ScopeRecord>,
}

impl ScopeState {
    /// Hash of the first output of the scope record named `name`.
    pub fn prior_output_hash(&self, name: &str) -> Option<Vec<u8>> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .and_then(|r| r.outputs.first())
            .map(|o| o.hash.clone())
    }
}

// ============================================================================
// Sealing
// ============================================================================

/// Sign the canonical encoding of a contract.
pub fn sign_contract(contract: &Contract, signer: &dyn Signer) -> ContractSignature {
    let signature = signer.sign(&contract.encode_to_vec());
    ContractSignature {
        signer: signer.public_key().to_vec(),
        signature: signature.0.to_vec(),
    }
}

/// Verify a contract signature produced by [`sign_contract`].
pub fn verify_contract_signature(
    contract: &Contract,
    signature: &ContractSignature,
) -> Result<(), CryptoError> {
    let signer = PubKey::try_from(signature.signer.as_slice())
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = Signature::try_from(signature.signature.as_slice()).map_err(|_| {
        CryptoError::MalformedSignature {
            expected: Signature::LEN,
            actual: signature.signature.len(),
        }
    })?;
    crypto::verify_hash(&signer, &crypto::content_hash(&contract.encode_to_vec()), &sig)
}
