use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::serializer::{JsonSerializer, SerializationError, Serializer, SerializerRegistry, JSON_SERIALIZER};

// ============================================================================
// Event - Immutable Record of One State Change
// ============================================================================
//
// An event is created in memory with a dirty version, stamped with identity
// and version when an aggregate applies it, and never changes after it has
// been persisted. Setters exist only for the assembly phase before save.
//
// ============================================================================

/// Position of an event within its aggregate stream.
///
/// `-1` is dirty (never applied), `0` is the empty stream, `1..` are real
/// event versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub const DIRTY: Version = Version(-1);
    pub const EMPTY: Version = Version(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn is_dirty(self) -> bool {
        self.0 < 0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::DIRTY
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded event body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    aggregate_id: String,
    aggregate_type: String,
    reason: String,
    version: Version,
    timestamp: DateTime<Utc>,
    payload: Payload,
    serializer: String,
}

impl Event {
    /// Builds an event with a JSON-encoded payload.
    pub fn new<T: Serialize + ?Sized>(reason: impl Into<String>, value: &T) -> Result<Self, SerializationError> {
        let codec: &dyn Serializer = &JsonSerializer;
        let payload = codec.encode(value)?;
        Ok(Self::assemble(reason.into(), payload, JSON_SERIALIZER.to_string()))
    }

    /// Builds an event whose payload is encoded by the default registry's
    /// serializer for `tag`.
    pub fn new_with_serializer<T: Serialize + ?Sized>(
        reason: impl Into<String>,
        value: &T,
        tag: &str,
    ) -> Result<Self, SerializationError> {
        Self::new_with_registry(reason, value, tag, &SerializerRegistry::default())
    }

    pub fn new_with_registry<T: Serialize + ?Sized>(
        reason: impl Into<String>,
        value: &T,
        tag: &str,
        registry: &SerializerRegistry,
    ) -> Result<Self, SerializationError> {
        let codec = registry.get(tag)?;
        let payload = codec.encode(value)?;
        Ok(Self::assemble(reason.into(), payload, tag.to_string()))
    }

    /// Rebuilds a persisted event. Used by store adapters.
    pub fn from_parts(
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        reason: impl Into<String>,
        version: Version,
        timestamp: DateTime<Utc>,
        payload: Payload,
        serializer: impl Into<String>,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            reason: reason.into(),
            version,
            timestamp,
            payload,
            serializer: serializer.into(),
        }
    }

    fn assemble(reason: String, payload: Payload, serializer: String) -> Self {
        Self {
            aggregate_id: String::new(),
            aggregate_type: String::new(),
            reason,
            version: Version::DIRTY,
            timestamp: Utc::now(),
            payload,
            serializer,
        }
    }

    /// Decodes the payload with the serializer the event was built with.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        self.decode_with(&SerializerRegistry::default())
    }

    pub fn decode_with<T: DeserializeOwned>(&self, registry: &SerializerRegistry) -> Result<T, SerializationError> {
        registry.get(&self.serializer)?.decode(&self.payload)
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn set_aggregate_id(&mut self, aggregate_id: impl Into<String>) {
        self.aggregate_id = aggregate_id.into();
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn set_aggregate_type(&mut self, aggregate_type: impl Into<String>) {
        self.aggregate_type = aggregate_type.into();
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into();
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    /// Tag of the serializer that produced the payload.
    pub fn serializer(&self) -> &str {
        &self.serializer
    }
}

// ============================================================================
// Tests
// ============================================================================
