use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;
use scylla::statement::batch::{Batch, BatchType};
use scylla::value::{CqlValue, Row};
use std::sync::Arc;

use super::{batch_stream, EventStore};
use crate::event_sourcing::core::{
    AggregateId, AggregateType, Event, EventRecord, EventRegistry, EventSourcingError, Result,
};

// ============================================================================
// ScyllaDB Event Store
// ============================================================================
//
// One partition per (aggregate_type, aggregate_id), clustered by version.
//
// Responsibilities:
// 1. Append a dispatch's events as ONE logged batch of conditional inserts
//    (all rows share a partition, so the LWT batch is all-or-nothing)
// 2. Report a claimed version as a version conflict, never overwrite history
// 3. Load event history in version order, decoding via the event registry
//
// ============================================================================

const CREATE_EVENT_STORE_TABLE: &str = "CREATE TABLE IF NOT EXISTS event_store (
        aggregate_type text,
        aggregate_id text,
        version bigint,
        event_type text,
        event_data text,
        timestamp bigint,
        PRIMARY KEY ((aggregate_type, aggregate_id), version)
    ) WITH CLUSTERING ORDER BY (version ASC)";

const INSERT_EVENT: &str = "INSERT INTO event_store (
        aggregate_type, aggregate_id, version, event_type, event_data, timestamp
    ) VALUES (?, ?, ?, ?, ?, ?) IF NOT EXISTS";

const SELECT_EVENTS: &str = "SELECT aggregate_type, aggregate_id, version, event_type, event_data, timestamp
     FROM event_store
     WHERE aggregate_type = ? AND aggregate_id = ?
     ORDER BY version ASC";

/// Column layout of one `event_store` row.
type EventRow = (String, String, i64, String, String, i64);

pub struct ScyllaEventStore {
    session: Arc<Session>,
    registry: Arc<EventRegistry>,
}

impl ScyllaEventStore {
    pub fn new(session: Arc<Session>, registry: Arc<EventRegistry>) -> Self {
        Self { session, registry }
    }

    /// Create the `event_store` table in the session's keyspace if missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        self.session.query_unpaged(CREATE_EVENT_STORE_TABLE, &[]).await?;
        tracing::info!("event_store table ready");
        Ok(())
    }
}

fn store_err<E: Into<anyhow::Error>>(error: E) -> EventSourcingError {
    EventSourcingError::Store(error.into())
}

fn to_row(record: EventRecord) -> Result<EventRow> {
    let version = i64::try_from(record.version).map_err(store_err)?;
    let event_data = serde_json::to_string(&record.event_data)?;

    Ok((
        record.aggregate_type.as_str().to_string(),
        record.aggregate_id.as_str().to_string(),
        version,
        record.event_type.as_str().to_string(),
        event_data,
        record.timestamp,
    ))
}

fn from_row(row: EventRow) -> Result<EventRecord> {
    let (aggregate_type, aggregate_id, version, event_type, event_data, timestamp) = row;

    Ok(EventRecord {
        aggregate_type: AggregateType::from(aggregate_type),
        aggregate_id: AggregateId::from(aggregate_id),
        event_type: event_type.into(),
        event_data: serde_json::from_str(&event_data)?,
        timestamp,
        version: u64::try_from(version).map_err(store_err)?,
    })
}

/// Read the `[applied]` column of a lightweight-transaction result.
fn lwt_applied(result: QueryResult) -> anyhow::Result<bool> {
    let rows = result.into_rows_result()?;
    let first = rows.maybe_first_row::<Row>()?;

    match first.and_then(|row| row.columns.into_iter().next().flatten()) {
        Some(CqlValue::Boolean(applied)) => Ok(applied),
        other => anyhow::bail!("unexpected lightweight transaction result: {other:?}"),
    }
}

#[async_trait]
impl EventStore for ScyllaEventStore {
    async fn get_events(&self, aggregate_type: &AggregateType, aggregate_id: &AggregateId) -> Result<Vec<Event>> {
        let result = self
            .session
            .query_unpaged(SELECT_EVENTS, (aggregate_type.as_str(), aggregate_id.as_str()))
            .await
            .map_err(store_err)?;

        let rows_result = result.into_rows_result().map_err(store_err)?;

        let mut events = Vec::new();
        for row in rows_result.rows::<EventRow>().map_err(store_err)? {
            let record = from_row(row.map_err(store_err)?)?;
            events.push(self.registry.decode_record(record)?);
        }

        tracing::debug!(
            aggregate_type = %aggregate_type,
            aggregate_id = %aggregate_id,
            event_count = events.len(),
            "Loaded events"
        );

        Ok(events)
    }

    async fn store_events(&self, events: &[Event]) -> Result<()> {
        let Some((aggregate_type, aggregate_id)) = batch_stream(events)? else {
            return Ok(());
        };

        let mut batch = Batch::new(BatchType::Logged);
        let mut values: Vec<EventRow> = Vec::with_capacity(events.len());

        for event in events {
            batch.append_statement(INSERT_EVENT);
            values.push(to_row(event.to_record()?)?);
        }

        let result = self.session.batch(&batch, values).await.map_err(store_err)?;

        if !lwt_applied(result).map_err(EventSourcingError::Store)? {
            let version = events[0].version;
            tracing::warn!(
                aggregate_type = %aggregate_type,
                aggregate_id = %aggregate_id,
                version = version,
                "Conditional batch not applied, version already claimed"
            );
            return Err(EventSourcingError::VersionConflict {
                aggregate_type: aggregate_type.clone(),
                aggregate_id: aggregate_id.clone(),
                version,
            });
        }

        tracing::info!(
            aggregate_type = %aggregate_type,
            aggregate_id = %aggregate_id,
            new_version = events[events.len() - 1].version,
            event_count = events.len(),
            "✅ Appended events to event store"
        );

        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
