use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{batch_stream, EventStore};
use crate::event_sourcing::core::{
    AggregateId, AggregateType, Event, EventRecord, EventRegistry, EventSourcingError, Result,
};

type StreamKey = (AggregateType, AggregateId);

/// In-memory append-only event store.
///
/// Rows are kept in their serialized form and decoded through the registry
/// on every read, exactly like a durable adapter. Intended for tests/dev.
#[derive(Debug)]
pub struct InMemoryEventStore {
    registry: Arc<EventRegistry>,
    streams: RwLock<HashMap<StreamKey, Vec<EventRecord>>>,
}

impl InMemoryEventStore {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Raw rows of one stream, in insertion order.
    pub fn records(&self, aggregate_type: &AggregateType, aggregate_id: &AggregateId) -> Vec<EventRecord> {
        self.streams
            .read()
            .map(|streams| {
                streams
                    .get(&(aggregate_type.clone(), aggregate_id.clone()))
                    .cloned()
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Insert a row without going through `store_events`, e.g. to seed
    /// history written by another process.
    pub fn insert_record(&self, record: EventRecord) -> Result<()> {
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        let stream = streams
            .entry((record.aggregate_type.clone(), record.aggregate_id.clone()))
            .or_default();
        stream.push(record);
        stream.sort_by_key(|r| r.version);
        Ok(())
    }
}

fn poisoned() -> EventSourcingError {
    EventSourcingError::Store(anyhow::anyhow!("event store lock poisoned"))
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_events(&self, aggregate_type: &AggregateType, aggregate_id: &AggregateId) -> Result<Vec<Event>> {
        let records = {
            let streams = self.streams.read().map_err(|_| poisoned())?;
            streams
                .get(&(aggregate_type.clone(), aggregate_id.clone()))
                .cloned()
                .unwrap_or_default()
        };

        records
            .into_iter()
            .map(|record| self.registry.decode_record(record))
            .collect()
    }

    async fn store_events(&self, events: &[Event]) -> Result<()> {
        let Some((aggregate_type, aggregate_id)) = batch_stream(events)? else {
            return Ok(());
        };

        let records = events.iter().map(Event::to_record).collect::<Result<Vec<_>>>()?;

        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        let stream = streams
            .entry((aggregate_type.clone(), aggregate_id.clone()))
            .or_default();

        // Check every row before inserting any, so a conflict leaves no trace.
        for record in &records {
            if stream.iter().any(|existing| existing.version == record.version) {
                tracing::warn!(
                    aggregate_type = %aggregate_type,
                    aggregate_id = %aggregate_id,
                    version = record.version,
                    "Version already claimed, rejecting batch"
                );
                return Err(EventSourcingError::VersionConflict {
                    aggregate_type: aggregate_type.clone(),
                    aggregate_id: aggregate_id.clone(),
                    version: record.version,
                });
            }
        }

        stream.extend(records);
        stream.sort_by_key(|r| r.version);

        tracing::debug!(
            aggregate_type = %aggregate_type,
            aggregate_id = %aggregate_id,
            event_count = events.len(),
            "Appended events to in-memory store"
        );

        Ok(())
    }
}
