use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::aggregate::{AggregateId, AggregateType};
use super::errors::{EventSourcingError, Result};

// ============================================================================
// Event Type Tag
// ============================================================================

/// Tag naming the shape of one event payload, unique across the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<&str> for EventType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Typed event payload.
///
/// All domain events implement this trait to be stored, published and
/// decoded again through the [`EventRegistry`].
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    const EVENT_TYPE: &'static str;
}

/// Object-safe view of any [`DomainEvent`], used wherever payloads of
/// different shapes travel together (replay, store rows, bus messages).
pub trait EventData: Any + fmt::Debug + Send + Sync {
    fn event_type(&self) -> EventType;
    fn to_json(&self) -> serde_json::Result<Value>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: DomainEvent> EventData for T {
    fn event_type(&self) -> EventType {
        EventType::from(T::EVENT_TYPE)
    }

    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn EventData {
    pub fn downcast_ref<T: DomainEvent>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: DomainEvent>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

// ============================================================================
// Event Envelope
// ============================================================================

/// An immutable, committed (or about to be committed) fact.
///
/// `version` is 1-based and contiguous per aggregate; `timestamp` is assigned
/// at commit time in milliseconds since epoch and is informational only.
#[derive(Debug, Clone)]
pub struct Event {
    pub aggregate_type: AggregateType,
    pub aggregate_id: AggregateId,
    pub event_type: EventType,
    pub data: Arc<dyn EventData>,
    pub timestamp: i64,
    pub version: u64,
}

impl Event {
    pub fn new(
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
        data: Arc<dyn EventData>,
        timestamp: i64,
        version: u64,
    ) -> Self {
        Self {
            aggregate_type,
            aggregate_id,
            event_type: data.event_type(),
            data,
            timestamp,
            version,
        }
    }

    pub fn to_record(&self) -> Result<EventRecord> {
        Ok(EventRecord {
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
            event_type: self.event_type.clone(),
            event_data: self.data.to_json()?,
            timestamp: self.timestamp,
            version: self.version,
        })
    }

    /// Encode as the JSON wire/storage envelope.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_record()?)?)
    }
}

/// Serialized envelope shared by store rows and transport messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub aggregate_type: AggregateType,
    pub aggregate_id: AggregateId,
    pub event_type: EventType,
    pub event_data: Value,
    pub timestamp: i64,
    pub version: u64,
}

// ============================================================================
// Event Type Registry
// ============================================================================

type DecodeFn = fn(Value) -> serde_json::Result<Arc<dyn EventData>>;

fn decode_as<T: DomainEvent>(value: Value) -> serde_json::Result<Arc<dyn EventData>> {
    let event: T = serde_json::from_value(value)?;
    Ok(Arc::new(event))
}

/// Maps event type tags to a decoder for the concrete payload.
///
/// Filled once at start-up, then shared read-only behind an `Arc`.
#[derive(Debug, Default)]
pub struct EventRegistry {
    decoders: HashMap<EventType, DecodeFn>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: DomainEvent>(&mut self) -> Result<()> {
        let event_type = EventType::from(T::EVENT_TYPE);
        if self.decoders.contains_key(&event_type) {
            return Err(EventSourcingError::DuplicateEventType(event_type));
        }

        tracing::debug!(event_type = %event_type, "Registered event type");
        self.decoders.insert(event_type, decode_as::<T>);
        Ok(())
    }

    pub fn contains(&self, event_type: &EventType) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode a payload using only its type tag as discriminator.
    pub fn decode(&self, event_type: &EventType, event_data: Value) -> Result<Arc<dyn EventData>> {
        let decode = self
            .decoders
            .get(event_type)
            .ok_or_else(|| EventSourcingError::EventTypeNotFound(event_type.clone()))?;

        Ok(decode(event_data)?)
    }

    pub fn decode_record(&self, record: EventRecord) -> Result<Event> {
        let data = self.decode(&record.event_type, record.event_data)?;

        Ok(Event {
            aggregate_type: record.aggregate_type,
            aggregate_id: record.aggregate_id,
            event_type: record.event_type,
            data,
            timestamp: record.timestamp,
            version: record.version,
        })
    }

    pub fn unmarshal_event(&self, bytes: &[u8]) -> Result<Event> {
        let record: EventRecord = serde_json::from_slice(bytes)?;
        self.decode_record(record)
    }
}

// ============================================================================
// Tests
// ============================================================================
