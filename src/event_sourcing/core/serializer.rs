use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::event::Payload;

// ============================================================================
// Payload Serializers
// ============================================================================
//
// Events carry opaque bytes. The codec that produced them is picked by a
// string tag ("json", "bson") and recorded on the event so the same codec can
// decode it later. Unknown tags are an error, there is no fallback codec.
//
// ============================================================================

/// Tag of the built-in JSON serializer.
pub const JSON_SERIALIZER: &str = "json";

/// Tag of the built-in BSON serializer.
pub const BSON_SERIALIZER: &str = "bson";

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("unsupported serializer")]
    Unsupported(String),

    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),
}

/// Object-safe codec contract.
///
/// Values cross the trait boundary as `serde_json::Value` so any serde type
/// can be encoded through a `dyn Serializer`; the typed helpers below do the
/// conversion.
pub trait Serializer: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode_value(&self, value: serde_json::Value) -> Result<Payload, SerializationError>;

    fn decode_value(&self, data: &[u8]) -> Result<serde_json::Value, SerializationError>;
}

impl dyn Serializer {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Payload, SerializationError> {
        let value = serde_json::to_value(value).map_err(|e| SerializationError::Encode(e.to_string()))?;
        self.encode_value(value)
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SerializationError> {
        let value = self.decode_value(data)?;
        serde_json::from_value(value).map_err(|e| SerializationError::Decode(e.to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        JSON_SERIALIZER
    }

    fn encode_value(&self, value: serde_json::Value) -> Result<Payload, SerializationError> {
        serde_json::to_vec(&value)
            .map(Payload::from)
            .map_err(|e| SerializationError::Encode(e.to_string()))
    }

    fn decode_value(&self, data: &[u8]) -> Result<serde_json::Value, SerializationError> {
        serde_json::from_slice(data).map_err(|e| SerializationError::Decode(e.to_string()))
    }
}

/// BSON documents. The top-level value must be a struct or map.
#[derive(Debug, Default, Clone, Copy)]
pub struct BsonSerializer;

impl Serializer for BsonSerializer {
    fn name(&self) -> &'static str {
        BSON_SERIALIZER
    }

    fn encode_value(&self, value: serde_json::Value) -> Result<Payload, SerializationError> {
        bson::to_vec(&value)
            .map(Payload::from)
            .map_err(|e| SerializationError::Encode(e.to_string()))
    }

    fn decode_value(&self, data: &[u8]) -> Result<serde_json::Value, SerializationError> {
        bson::from_slice(data).map_err(|e| SerializationError::Decode(e.to_string()))
    }
}

/// Set of serializers addressable by tag.
#[derive(Clone)]
pub struct SerializerRegistry {
    serializers: HashMap<String, Arc<dyn Serializer>>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(JSON_SERIALIZER, Arc::new(JsonSerializer))
            .register(BSON_SERIALIZER, Arc::new(BsonSerializer));
        registry
    }
}

impl SerializerRegistry {
    pub fn empty() -> Self {
        Self {
            serializers: HashMap::new(),
        }
    }

    /// Registers `serializer` under `tag`, replacing any previous entry.
    pub fn register(&mut self, tag: impl Into<String>, serializer: Arc<dyn Serializer>) -> &mut Self {
        self.serializers.insert(tag.into(), serializer);
        self
    }

    pub fn get(&self, tag: &str) -> Result<Arc<dyn Serializer>, SerializationError> {
        self.serializers
            .get(tag)
            .cloned()
            .ok_or_else(|| SerializationError::Unsupported(tag.to_string()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.serializers.contains_key(tag)
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&str> = self.serializers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("SerializerRegistry").field("tags", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Amount {
        amount: i64,
    }

    /// Wraps the JSON document in an envelope.
    struct TaggedJson;

    impl Serializer for TaggedJson {
        fn name(&self) -> &'static str {
            "tagged"
        }

        fn encode_value(&self, value: serde_json::Value) -> Result<Payload, SerializationError> {
            JsonSerializer.encode_value(serde_json::json!({ "v": value }))
        }

        fn decode_value(&self, data: &[u8]) -> Result<serde_json::Value, SerializationError> {
            let mut wrapped = JsonSerializer.decode_value(data)?;
            wrapped
                .get_mut("v")
                .map(serde_json::Value::take)
                .ok_or_else(|| SerializationError::Decode("missing envelope".to_string()))
        }
    }

    #[test]
    fn test_default_registry_has_json_and_bson() {
        let registry = SerializerRegistry::default();
        assert_eq!(registry.get(JSON_SERIALIZER).unwrap().name(), "json");
        assert_eq!(registry.get(BSON_SERIALIZER).unwrap().name(), "bson");
        assert!(!SerializerRegistry::empty().contains(BSON_SERIALIZER));
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let registry = SerializerRegistry::default();
        let err = registry.get("msgpack").err().unwrap();
        assert!(matches!(err, SerializationError::Unsupported(ref tag) if tag == "msgpack"));
        assert_eq!(err.to_string(), "unsupported serializer");
    }

    #[test]
    fn test_json_typed_helpers() {
        let json: Arc<dyn Serializer> = Arc::new(JsonSerializer);
        let bytes = json.encode(&Amount { amount: 100 }).unwrap();
        assert_eq!(bytes.as_bytes(), &br#"{"amount":100}"#[..]);

        let decoded: Amount = json.decode(&bytes).unwrap();
        assert_eq!(decoded, Amount { amount: 100 });
    }

    #[test]
    fn test_bson_typed_helpers() {
        let bson: Arc<dyn Serializer> = Arc::new(BsonSerializer);
        let bytes = bson.encode(&Amount { amount: 100 }).unwrap();

        // int32 length prefix, then the document, then the trailing nul
        let declared = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(declared as usize, bytes.len());
        assert_eq!(bytes.last(), Some(&0u8));
        assert_ne!(bytes.as_bytes(), &br#"{"amount":100}"#[..]);

        let decoded: Amount = bson.decode(&bytes).unwrap();
        assert_eq!(decoded, Amount { amount: 100 });

        let json: Arc<dyn Serializer> = Arc::new(JsonSerializer);
        assert!(json.decode::<Amount>(&bytes).is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let json: Arc<dyn Serializer> = Arc::new(JsonSerializer);
        let result: Result<Amount, _> = json.decode(b"not json");
        assert!(matches!(result, Err(SerializationError::Decode(_))));
    }

    #[test]
    fn test_custom_serializer_registration() {
        let mut registry = SerializerRegistry::default();
        registry.register("tagged", Arc::new(TaggedJson));

        let codec = registry.get("tagged").unwrap();
        let bytes = codec.encode(&Amount { amount: 7 }).unwrap();
        assert_eq!(bytes.as_bytes(), &br#"{"v":{"amount":7}}"#[..]);
        let decoded: Amount = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.amount, 7);
    }
}
