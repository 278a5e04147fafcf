// ============================================================================
// Event Sourcing Store - Generic Persistence Layer
// ============================================================================
//
// The command bus only sees the `EventStore` contract. Adapters:
// - event_store: ScyllaDB, conditional (IF NOT EXISTS) batch per dispatch
// - in_memory:   same semantics behind a lock, for tests and local runs
//
// ============================================================================

pub mod event_store;
pub mod in_memory;

pub use event_store::ScyllaEventStore;
pub use in_memory::InMemoryEventStore;

use async_trait::async_trait;

use crate::event_sourcing::core::{AggregateId, AggregateType, Event, EventSourcingError, Result};

/// Durable, append-only log keyed by (aggregate type, aggregate id).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Full history ordered by version ascending; empty when none exists.
    async fn get_events(&self, aggregate_type: &AggregateType, aggregate_id: &AggregateId) -> Result<Vec<Event>>;

    /// Append a batch atomically. Every row is conditioned on its version
    /// being unclaimed; any claimed version fails the whole batch with
    /// `EventSourcingError::VersionConflict`.
    async fn store_events(&self, events: &[Event]) -> Result<()>;
}

/// Stream targeted by a batch. A batch may only address one aggregate and
/// its versions must run `first, first + 1, ..` with no gaps or repeats.
pub(crate) fn batch_stream(events: &[Event]) -> Result<Option<(&AggregateType, &AggregateId)>> {
    let Some(first) = events.first() else {
        return Ok(None);
    };

    for (idx, event) in events.iter().enumerate() {
        if event.aggregate_type != first.aggregate_type || event.aggregate_id != first.aggregate_id {
            return Err(EventSourcingError::Store(anyhow::anyhow!(
                "batch contains multiple aggregates (index {idx})"
            )));
        }

        let expected = first.version + idx as u64;
        if event.version != expected {
            return Err(EventSourcingError::Store(anyhow::anyhow!(
                "batch versions are not contiguous: expected {expected} at index {idx}, got {}",
                event.version
            )));
        }
    }

    Ok(Some((&first.aggregate_type, &first.aggregate_id)))
}
