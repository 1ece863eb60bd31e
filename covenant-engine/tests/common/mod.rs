//! Shared fixtures for engine scenarios.
//!
//! The guest contract is authored in WAT and bundled with its record schema
//! in a zip archive stored as a jar. Records are `acme.Asset` and
//! `acme.Valuation`, both `{ string id = 1; }`.

#![allow(dead_code)]

use covenant_engine::{ContractEngine, EngineConfig};
use covenant_model::{
    Consideration, Contract, ContractSpecification, DefinitionSpec, DefinitionType, Envelope,
    EnvelopeRef, FunctionSpec, Hash, KeyRef, Location, OutputSpec, PartyType, ProposedRecord,
    PubKey, Recital, Record,
};
use covenant_store::{MemoryObjectStore, ObjectStore};
use prost::Message;
use prost_types::{
    field_descriptor_proto, DescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet,
};
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const CONTRACT_CLASS: &str = "acme.AssetContract";
pub const SPEC_TYPE: &str = "covenant.ContractSpecification";
pub const ASSET: &str = "acme.Asset";
pub const VALUATION: &str = "acme.Valuation";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ==== Guest ====

/// Contract functions, by consideration name.
///
/// | name        | export         | parameters                                   |
/// |-------------|----------------|----------------------------------------------|
/// | `asset`     | `echo`         | proposed `asset`                             |
/// | `valuation` | `first_of_two` | proposed `valuation`, existing `asset`       |
/// | `explode`   | `explode`      | proposed `asset` (traps)                     |
/// | `empty`     | `empty`        | proposed `asset` (returns zero bytes)        |
/// | `garbage`   | `garbage`      | proposed `asset` (returns undecodable bytes) |
/// | `once`      | `echo`         | proposed `asset`, skipped if `asset` exists  |
pub const METADATA: &str = r#"{
    "scope_specification_uuids": ["0b7b1a52-7d3e-4a62-9d1c-6f1f0c2d9a10"],
    "participants": ["OWNER"],
    "name": "AssetContract",
    "description": "Records and values assets",
    "website_url": "",
    "icon_url": "",
    "functions": [
        {"name": "asset", "method_name": "echo", "invoked_by": "OWNER",
         "parameters": [{"record_type": "Proposed", "name": "asset", "optional": false, "type": "acme.Asset"}],
         "return_type": "acme.Asset"},
        {"name": "valuation", "method_name": "first_of_two", "invoked_by": "OWNER",
         "parameters": [
             {"record_type": "Proposed", "name": "valuation", "optional": false, "type": "acme.Valuation"},
             {"record_type": "Existing", "name": "asset", "optional": false, "type": "acme.Asset"}
         ],
         "return_type": "acme.Valuation"},
        {"name": "explode", "method_name": "explode", "invoked_by": "OWNER",
         "parameters": [{"record_type": "Proposed", "name": "asset", "optional": false, "type": "acme.Asset"}],
         "return_type": "acme.Asset"},
        {"name": "empty", "method_name": "empty", "invoked_by": "OWNER",
         "parameters": [{"record_type": "Proposed", "name": "asset", "optional": false, "type": "acme.Asset"}],
         "return_type": "acme.Asset"},
        {"name": "garbage", "method_name": "garbage", "invoked_by": "OWNER",
         "parameters": [{"record_type": "Proposed", "name": "asset", "optional": false, "type": "acme.Asset"}],
         "return_type": "acme.Asset"},
        {"name": "once", "method_name": "echo", "invoked_by": "OWNER",
         "parameters": [{"record_type": "Proposed", "name": "asset", "optional": false, "type": "acme.Asset"}],
         "return_type": "acme.Asset",
         "skip_if_record_exists": "asset"}
    ]
}"#;

fn wat_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
}

/// The contract module as WAT text.
///
/// Memory layout: `[0, 5)` a one-byte buffer holding `0xff`, `[8, 12)` an
/// empty buffer, metadata from 16, heap after it.
pub fn guest_wat() -> String {
    let mut metadata = (METADATA.len() as u32).to_le_bytes().to_vec();
    metadata.extend_from_slice(METADATA.as_bytes());
    let heap_start = (16 + metadata.len() + 7) & !7;
    let metadata = wat_bytes(&metadata);

    format!(
        r#"(module
  (memory (export "memory") 1)
  (global $next (mut i32) (i32.const {heap_start}))
  (data (i32.const 0) "\01\00\00\00\ff")
  (data (i32.const 16) "{metadata}")
  (func (export "p8e_allocate") (param $size i32) (result i32)
    (local $ptr i32) (local $end i32)
    global.get $next
    local.set $ptr
    local.get $ptr
    local.get $size
    i32.add
    local.set $end
    (block $done
      (loop $grow
        local.get $end
        memory.size
        i32.const 16
        i32.shl
        i32.le_u
        br_if $done
        i32.const 1
        memory.grow
        i32.const -1
        i32.eq
        if
          unreachable
        end
        br $grow))
    local.get $end
    i32.const 7
    i32.add
    i32.const -8
    i32.and
    global.set $next
    local.get $ptr)
  (func (export "p8e_free") (param i32) (result i32)
    i32.const 0)
  (func (export "__p8e_entrypoint") (result i32)
    i32.const 16)
  (func (export "echo") (param i32) (result i32)
    local.get 0)
  (func (export "first_of_two") (param i32 i32) (result i32)
    local.get 0)
  (func (export "explode") (param i32) (result i32)
    unreachable)
  (func (export "empty") (param i32) (result i32)
    i32.const 8)
  (func (export "garbage") (param i32) (result i32)
    i32.const 0)
)"#
    )
}

// ==== Schema and archive ====

pub fn descriptor_set() -> FileDescriptorSet {
    let message = |name: &str| DescriptorProto {
        name: Some(name.to_string()),
        field: vec![FieldDescriptorProto {
            name: Some("id".to_string()),
            number: Some(1),
            r#type: Some(field_descriptor_proto::Type::String as i32),
            label: Some(field_descriptor_proto::Label::Optional as i32),
            json_name: Some("id".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("acme/records.proto".to_string()),
            package: Some("acme".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![message("Asset"), message("Valuation")],
            ..Default::default()
        }],
    }
}

pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Jar holding the contract module and the record schema.
pub fn contract_jar() -> Vec<u8> {
    let wat = guest_wat();
    let desc = descriptor_set().encode_to_vec();
    zip_of(&[
        ("acme/AssetContract.wasm", wat.as_bytes()),
        ("acme/records.desc", desc.as_slice()),
    ])
}

/// `{ string id = 1; }` encoded by hand.
pub fn record_bytes(id: &str) -> Vec<u8> {
    let mut bytes = vec![0x0a, id.len() as u8];
    bytes.extend_from_slice(id.as_bytes());
    bytes
}

// ==== Fixture ====

pub struct Fixture {
    pub store: Arc<MemoryObjectStore>,
    pub engine: ContractEngine,
    /// Caller identity: reads from the store and owns outputs.
    pub owner: KeyRef,
    pub signer: KeyRef,
    pub jar_hash: Hash,
    pub spec_hash: Hash,
    pub scratch: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_spec(|_| {})
    }

    /// Fixture whose stored specification was adjusted by `edit`.
    pub fn with_spec(edit: impl FnOnce(&mut ContractSpecification)) -> Self {
        init_tracing();
        let store = Arc::new(MemoryObjectStore::new());
        let jar_hash = store.put_jar(contract_jar()).unwrap();

        let mut spec = specification(jar_hash);
        edit(&mut spec);
        let spec_hash = store.insert_record(SPEC_TYPE, spec.encode_to_vec()).unwrap();

        Self::from_parts(store, jar_hash, spec_hash)
    }

    pub fn from_parts(store: Arc<MemoryObjectStore>, jar_hash: Hash, spec_hash: Hash) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let engine = ContractEngine::builder()
            .store(dyn_store)
            .with_config(
                EngineConfig::default()
                    .with_worker_pool_size(4)
                    .with_scratch_dir(scratch.path()),
            )
            .build()
            .unwrap();

        Self {
            store,
            engine,
            owner: KeyRef::from_secret_bytes(&[1u8; 32]),
            signer: KeyRef::from_secret_bytes(&[2u8; 32]),
            jar_hash,
            spec_hash,
            scratch,
        }
    }

    /// A record only the caller can read.
    pub fn private_record(&self, type_name: &str, id: &str) -> Hash {
        let audience = BTreeSet::from([self.owner.public_key()]);
        self.store
            .insert_private_record(type_name, record_bytes(id), audience)
            .unwrap()
    }

    pub fn proposed(&self, name: &str, type_name: &str, id: &str) -> ProposedRecord {
        ProposedRecord::new(name, type_name, self.private_record(type_name, id))
    }

    pub fn existing(&self, name: &str, type_name: &str, id: &str) -> Record {
        Record::new(name, Location::new(type_name, self.private_record(type_name, id)))
    }

    /// Contract with an OWNER recital for this fixture's keys.
    pub fn contract(&self, considerations: Vec<Consideration>) -> Contract {
        Contract {
            definition: Some(definition(self.jar_hash)),
            spec: Some(Record::new("spec", Location::new(SPEC_TYPE, self.spec_hash))),
            inputs: Vec::new(),
            considerations,
            recitals: vec![Recital::new(
                PartyType::Owner,
                self.signer.public_key(),
                self.owner.public_key(),
            )],
        }
    }

    /// `asset` consideration proposing one asset.
    pub fn asset_consideration(&self, name: &str, id: &str) -> Consideration {
        Consideration::new(name).with_input(self.proposed("asset", ASSET, id))
    }

    pub async fn run(&self, contract: Contract) -> Result<Envelope, covenant_engine::EngineError> {
        self.run_with(contract, None, &[]).await
    }

    pub async fn run_with(
        &self,
        contract: Contract,
        scope: Option<&covenant_model::ScopeState>,
        extra_audience: &[PubKey],
    ) -> Result<Envelope, covenant_engine::EngineError> {
        self.engine
            .handle(&self.owner, &self.signer, envelope(contract), scope, extra_audience)
            .await
    }
}

pub fn definition(jar_hash: Hash) -> DefinitionSpec {
    DefinitionSpec {
        name: "AssetContract".to_string(),
        resource_location: Some(Location::new(CONTRACT_CLASS, jar_hash)),
        kind: DefinitionType::Proposed as i32,
    }
}

/// Specification: one OWNER party, no required facts, output `asset`.
pub fn specification(jar_hash: Hash) -> ContractSpecification {
    ContractSpecification {
        definition: Some(definition(jar_hash)),
        input_specs: Vec::new(),
        parties_involved: vec![PartyType::Owner as i32],
        function_specs: vec![FunctionSpec {
            func_name: "asset".to_string(),
            input_specs: Vec::new(),
            invoker_party: PartyType::Owner as i32,
            output_spec: Some(OutputSpec {
                spec: Some(DefinitionSpec {
                    name: "asset".to_string(),
                    resource_location: Some(Location::new(ASSET, jar_hash)),
                    kind: DefinitionType::Proposed as i32,
                }),
            }),
        }],
    }
}

pub fn envelope(contract: Contract) -> Envelope {
    Envelope {
        envelope_ref: Some(EnvelopeRef {
            scope_uuid: uuid::Uuid::new_v4().to_string(),
            session_uuid: uuid::Uuid::new_v4().to_string(),
        }),
        contract: Some(contract),
        signatures: Vec::new(),
        execution_uuid: uuid::Uuid::new_v4().to_string(),
        scope_spec_uuid: uuid::Uuid::new_v4().to_string(),
        new_scope: true,
        new_session: true,
    }
}
