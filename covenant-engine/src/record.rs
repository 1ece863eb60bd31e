//! Resolved records.
//!
//! A record is a named value decoded with a schema resolved through the
//! contract's isolation context. A name that appears once among the
//! contract inputs is a single message; a name that repeats becomes a
//! collection.

use crate::pool::WorkerPool;
use crate::EngineError;
use covenant_isolation::{IsolationContext, IsolationError};
use covenant_model::{Hash, PubKey, Record};
use covenant_store::ObjectStore;
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, ReflectMessage};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Records by name. Names are unique within a pool.
pub type RecordPool = BTreeMap<String, RecordInstance>;

#[derive(Debug, Clone)]
pub enum RecordValue {
    Single(DynamicMessage),
    Collection(Vec<DynamicMessage>),
}

impl RecordValue {
    /// Serialized form handed to the guest.
    ///
    /// A collection is the concatenation of its messages, each framed by a
    /// 4-byte little-endian length.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RecordValue::Single(message) => message.encode_to_vec(),
            RecordValue::Collection(messages) => {
                encode_frames(messages.iter().map(|m| m.encode_to_vec()))
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordValue::Single(_) => 1,
            RecordValue::Collection(messages) => messages.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordInstance {
    pub name: String,
    /// Fully-qualified message type of the value.
    pub type_name: String,
    pub value: RecordValue,
}

impl RecordInstance {
    pub fn single(name: impl Into<String>, message: DynamicMessage) -> Self {
        Self {
            name: name.into(),
            type_name: message.descriptor().full_name().to_string(),
            value: RecordValue::Single(message),
        }
    }

    /// Group messages sharing a name. Fails on an empty list.
    pub fn from_messages(name: impl Into<String>, mut messages: Vec<DynamicMessage>) -> Result<Self, EngineError> {
        let name = name.into();
        let type_name = messages
            .first()
            .map(|m| m.descriptor().full_name().to_string())
            .ok_or_else(|| EngineError::Definition(format!("Record {} has no values", name)))?;
        let value = if messages.len() == 1 {
            RecordValue::Single(messages.remove(0))
        } else {
            RecordValue::Collection(messages)
        };
        Ok(Self { name, type_name, value })
    }
}

/// Frame byte strings with a 4-byte little-endian length each.
pub fn encode_frames(frames: impl IntoIterator<Item = Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    for frame in frames {
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(&frame);
    }
    out
}

/// Split a buffer produced by [`encode_frames`].
#[cfg(test)]
pub(crate) fn decode_frames(mut bytes: &[u8]) -> Option<Vec<&[u8]>> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let prefix: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        let len = u32::from_le_bytes(prefix) as usize;
        let frame = bytes.get(4..4 + len)?;
        frames.push(frame);
        bytes = &bytes[4 + len..];
    }
    Some(frames)
}

/// Resolve `type_name` to a message schema through the context.
pub fn message_descriptor(ctx: &IsolationContext, type_name: &str) -> Result<MessageDescriptor, EngineError> {
    let symbol = ctx.load_symbol(type_name).map_err(|e| match e {
        IsolationError::NotFound(name) => {
            EngineError::Definition(format!("Unable to resolve record type {}", name))
        }
        other => other.into(),
    })?;
    symbol
        .message_descriptor()
        .cloned()
        .ok_or_else(|| EngineError::Definition(format!("{} is not a message type", type_name)))
}

/// Fetch one record and decode it as `classname`.
pub async fn fetch_record(
    store: &dyn ObjectStore,
    ctx: &IsolationContext,
    reader: &PubKey,
    classname: &str,
    hash: &Hash,
) -> Result<DynamicMessage, EngineError> {
    let bytes = store.get_record(classname, hash, reader).await?;
    let descriptor = message_descriptor(ctx, classname)?;
    DynamicMessage::decode(descriptor, bytes.as_slice()).map_err(|e| {
        EngineError::Definition(format!("Record {} is not a valid {}: {}", hash, classname, e))
    })
}

/// Fetch every contract input that points at content and group by name.
pub async fn load_existing(
    pool: &WorkerPool,
    store: Arc<dyn ObjectStore>,
    ctx: Arc<IsolationContext>,
    reader: PubKey,
    inputs: &[Record],
) -> Result<RecordPool, EngineError> {
    let mut located: Vec<(String, String, Hash)> = Vec::new();
    for input in inputs {
        let raw = input.data_location.as_ref().map(|l| l.hash.as_slice()).unwrap_or_default();
        if let Some(hash) = content_reference(&input.name, raw)? {
            located.push((input.name.clone(), input.classname().to_string(), hash));
        }
    }

    let tasks = located.iter().map(move |(_, classname, hash)| {
        let store = store.clone();
        let ctx = ctx.clone();
        let classname = classname.clone();
        let hash = *hash;
        async move { fetch_record(store.as_ref(), &ctx, &reader, &classname, &hash).await }
    });
    let messages = pool.run_all(tasks).await?;

    let mut grouped: BTreeMap<String, Vec<DynamicMessage>> = BTreeMap::new();
    for ((name, _, _), message) in located.into_iter().zip(messages) {
        grouped.entry(name).or_default().push(message);
    }

    let mut records = RecordPool::new();
    for (name, messages) in grouped {
        let record = RecordInstance::from_messages(name, messages)?;
        insert_unique(&mut records, record)?;
    }
    tracing::trace!("loaded {} existing records", records.len());
    Ok(records)
}

/// Parse a record's content reference. Empty means no content; anything
/// else must be a well-formed hash.
pub fn content_reference(name: &str, raw: &[u8]) -> Result<Option<Hash>, EngineError> {
    if raw.is_empty() {
        return Ok(None);
    }
    Hash::try_from(raw).map(Some).map_err(|_| {
        EngineError::Definition(format!(
            "Record {} has a malformed content hash ({} bytes, expected {})",
            name,
            raw.len(),
            Hash::LEN
        ))
    })
}

/// Add a record, failing if its name is already taken.
pub fn insert_unique(pool: &mut RecordPool, record: RecordInstance) -> Result<(), EngineError> {
    if pool.contains_key(&record.name) {
        return Err(EngineError::Definition(format!(
            "Found duplicate record messages by name: {}",
            record.name
        )));
    }
    pool.insert(record.name.clone(), record);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use prost_reflect::{DescriptorPool, Value};
    use prost_types::{field_descriptor_proto, DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};

    /// `acme.Asset { string id = 1; }` and `acme.Valuation { string id = 1; }`.
    pub(crate) fn schema() -> DescriptorPool {
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
        let set = FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("acme/records.proto".to_string()),
                package: Some("acme".to_string()),
                syntax: Some("proto3".to_string()),
                message_type: vec![message("Asset"), message("Valuation")],
                ..Default::default()
            }],
        };
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_set(set).unwrap();
        pool
    }

    pub(crate) fn message(pool: &DescriptorPool, type_name: &str, id: &str) -> DynamicMessage {
        let mut message = DynamicMessage::new(pool.get_message_by_name(type_name).unwrap());
        message.set_field_by_name("id", Value::String(id.to_string()));
        message
    }

    #[test]
    fn test_frames_round_trip() {
        let encoded = encode_frames([b"a".to_vec(), Vec::new(), b"xyz".to_vec()]);
        assert_eq!(encoded.len(), 4 * 3 + 4);
        let frames = decode_frames(&encoded).unwrap();
        assert_eq!(frames, vec![b"a".as_slice(), b"".as_slice(), b"xyz".as_slice()]);
        assert!(decode_frames(&encoded[..encoded.len() - 1]).is_none());
    }

    #[test]
    fn test_single_and_collection_values() {
        let pool = schema();
        let one = RecordInstance::from_messages("asset", vec![message(&pool, "acme.Asset", "a")]).unwrap();
        assert!(matches!(one.value, RecordValue::Single(_)));
        assert_eq!(one.type_name, "acme.Asset");

        let many = RecordInstance::from_messages(
            "assets",
            vec![message(&pool, "acme.Asset", "a"), message(&pool, "acme.Asset", "b")],
        )
        .unwrap();
        assert_eq!(many.value.len(), 2);
        let frames = many.value.encode();
        let decoded = decode_frames(&frames).unwrap();
        assert_eq!(decoded[1], message(&pool, "acme.Asset", "b").encode_to_vec().as_slice());

        assert!(RecordInstance::from_messages("none", Vec::new()).is_err());
    }

    #[test]
    fn test_content_reference() {
        assert!(content_reference("asset", &[]).unwrap().is_none());
        assert_eq!(content_reference("asset", &[4u8; 32]).unwrap(), Some(Hash([4u8; 32])));
        let err = content_reference("asset", &[1u8; 64]).unwrap_err();
        assert!(matches!(err, EngineError::Definition(ref m) if m.contains("malformed content hash")));
    }

    #[tokio::test]
    async fn test_malformed_input_hash_is_fatal() {
        use covenant_isolation::{CacheKey, ModuleCache};
        use covenant_model::{Location, Record};
        use covenant_store::MemoryObjectStore;

        let store = Arc::new(MemoryObjectStore::new());
        let ctx = ModuleCache::with_capacity(1).get_or_create(CacheKey(Hash::ZERO)).unwrap();
        let inputs = vec![Record {
            name: "asset".to_string(),
            data_location: Some(Location {
                classname: "acme.Asset".to_string(),
                hash: vec![1u8; 64],
            }),
        }];
        assert!(inputs[0].has_content());

        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let err = load_existing(&WorkerPool::new(2), dyn_store, ctx, PubKey([1u8; 32]), &inputs)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Definition(ref m) if m.contains("asset")));
        assert_eq!(store.read_count(), 0);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let pool = schema();
        let mut records = RecordPool::new();
        insert_unique(&mut records, RecordInstance::single("asset", message(&pool, "acme.Asset", "a"))).unwrap();
        let err = insert_unique(&mut records, RecordInstance::single("asset", message(&pool, "acme.Asset", "b")))
            .unwrap_err();
        assert!(matches!(err, EngineError::Definition(ref m) if m.contains("duplicate")));
    }
}
