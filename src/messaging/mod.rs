// ============================================================================
// Messaging - Event Publisher / Event Consumer
// ============================================================================
//
// The command bus publishes committed batches through `EventPublisher`.
// Every `EventHandler` runs its own consumption loop with its own read
// position (consumer group = handler name). Adapters:
// - kafka:     rdkafka producer / one StreamConsumer per handler
// - in_memory: in-process log with per-group offsets, for tests and local runs
//
// Delivery is at-least-once; handlers must tolerate redelivery.
//
// ============================================================================

pub mod in_memory;
pub mod kafka;

pub use in_memory::InMemoryEventBus;
pub use kafka::{KafkaConfig, KafkaEventConsumer, KafkaEventPublisher};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::event_sourcing::core::{Event, EventRecord, EventRegistry, EventType, Result};
use crate::metrics::Metrics;

/// Outbound side of the transport.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver `events` in order, keyed by aggregate id. An error means the
    /// batch was not fully delivered; unless the adapter publishes inside a
    /// transaction, a prefix of it may already be visible to consumers.
    async fn publish_events(&self, events: &[Event]) -> Result<()>;
}

/// A projection or other read-side reaction to committed events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Durable consumer-group identity.
    fn name(&self) -> &str;

    /// Event types this handler wants; everything else is filtered out
    /// before `handle_event` is called.
    fn events(&self) -> Vec<EventType>;

    async fn handle_event(&self, event: &Event) -> anyhow::Result<()>;
}

/// What happened to one transport message for one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Handled,
    Skipped,
    Failed,
    Undecodable,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Handled => "handled",
            Delivery::Skipped => "skipped",
            Delivery::Failed => "failed",
            Delivery::Undecodable => "undecodable",
        }
    }
}

/// Decode one message, filter it against the handler's interest and run
/// the handler. Never fails: every error is logged and the loop moves on.
pub async fn deliver(
    registry: &EventRegistry,
    handler: &dyn EventHandler,
    payload: &[u8],
    metrics: Option<&Metrics>,
) -> Delivery {
    let outcome = deliver_inner(registry, handler, payload).await;
    if let Some(metrics) = metrics {
        metrics.record_delivery(handler.name(), outcome.as_str());
    }
    outcome
}

async fn deliver_inner(registry: &EventRegistry, handler: &dyn EventHandler, payload: &[u8]) -> Delivery {
    let record: EventRecord = match serde_json::from_slice(payload) {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(handler = handler.name(), error = %e, "Malformed event envelope");
            return Delivery::Undecodable;
        }
    };

    // Filter on the tag first so a handler never pays for (or fails on)
    // payloads it did not ask for.
    if !handler.events().contains(&record.event_type) {
        tracing::trace!(handler = handler.name(), event_type = %record.event_type, "Skipping event");
        return Delivery::Skipped;
    }

    let event = match registry.decode_record(record) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(handler = handler.name(), error = %e, "Failed to decode event");
            return Delivery::Undecodable;
        }
    };

    match handler.handle_event(&event).await {
        Ok(()) => {
            tracing::debug!(
                handler = handler.name(),
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                version = event.version,
                "Event handled"
            );
            Delivery::Handled
        }
        Err(e) => {
            tracing::error!(
                handler = handler.name(),
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                version = event.version,
                error = %e,
                "Event handler failed"
            );
            Delivery::Failed
        }
    }
}

// ============================================================================
// Consumer Group Handle
// ============================================================================

/// Running consumption loops, one per handler.
#[derive(Debug)]
pub struct ConsumerGroup {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl ConsumerGroup {
    pub(crate) fn new(shutdown: watch::Sender<bool>, tasks: Vec<(String, JoinHandle<()>)>) -> Self {
        Self { shutdown, tasks }
    }

    /// Spawn one loop per handler. `run` receives the handler and a
    /// shutdown receiver that flips to `true` when the group stops.
    pub(crate) fn spawn<F, Fut>(handlers: Vec<Arc<dyn EventHandler>>, run: F) -> Self
    where
        F: Fn(Arc<dyn EventHandler>, watch::Receiver<bool>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown, signal) = watch::channel(false);
        let tasks = handlers
            .into_iter()
            .map(|handler| {
                let name = handler.name().to_string();
                tracing::info!(handler = %name, "Starting event handler loop");
                (name, tokio::spawn(run(handler, signal.clone())))
            })
            .collect();

        Self::new(shutdown, tasks)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every loop to stop and wait for all of them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = futures_util::future::join_all(handles).await;

        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => tracing::info!(handler = %name, "Event handler loop stopped"),
                Err(e) => tracing::error!(handler = %name, error = %e, "Event handler loop panicked"),
            }
        }
    }
}
