//! Shared fixtures for the integration tests: in-memory wiring of the
//! household domain plus a small `Tally` aggregate whose commands emit a
//! caller-chosen number of events.

#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

use scylla_cqrs::domain::household;
use scylla_cqrs::event_sourcing::{
    AggregateContext, AggregateId, AggregateRegistry, AggregateRoot, AggregateType, Command, CommandBus,
    DomainEvent, Event, EventData, EventRegistry, EventSourcingError, EventStore, EventType,
    InMemoryEventStore, Result,
};
use scylla_cqrs::messaging::{EventHandler, InMemoryEventBus};

// ============================================================================
// Tally aggregate
// ============================================================================

pub const TALLY: &str = "Tally";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Marked {
    pub n: u32,
}

impl DomainEvent for Marked {
    const EVENT_TYPE: &'static str = "MarkedEvent";
}

/// Emits `count` `Marked` events.
#[derive(Debug)]
pub struct Mark {
    pub id: String,
    pub count: u32,
}

impl Command for Mark {
    fn aggregate_type(&self) -> AggregateType {
        AggregateType::from(TALLY)
    }

    fn aggregate_id(&self) -> AggregateId {
        AggregateId::from(self.id.as_str())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Tally {
    pub marks: Vec<u32>,
}

#[async_trait]
impl AggregateRoot for Tally {
    fn apply_event(&mut self, event: &dyn EventData) -> Result<()> {
        match event.downcast_ref::<Marked>() {
            Some(marked) => {
                self.marks.push(marked.n);
                Ok(())
            }
            None => Err(EventSourcingError::UnknownEvent {
                aggregate_type: AggregateType::from(TALLY),
                event_type: event.event_type(),
            }),
        }
    }

    async fn handle_command(
        &self,
        context: &AggregateContext,
        command: &dyn Command,
    ) -> Result<Vec<Arc<dyn EventData>>> {
        let mark = command.downcast_ref::<Mark>().ok_or_else(|| EventSourcingError::UnknownCommand {
            aggregate_type: context.aggregate_type().clone(),
            command: command.command_name().to_string(),
        })?;

        let start = self.marks.len() as u32;
        Ok((0..mark.count)
            .map(|i| Arc::new(Marked { n: start + i }) as Arc<dyn EventData>)
            .collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub events: Arc<EventRegistry>,
    pub aggregates: Arc<AggregateRegistry>,
    pub store: Arc<InMemoryEventStore>,
    pub bus: InMemoryEventBus,
}

impl Harness {
    pub fn new() -> Self {
        let mut events = EventRegistry::new();
        let mut aggregates = AggregateRegistry::new();
        household::register(&mut events, &mut aggregates).unwrap();
        events.register::<Marked>().unwrap();
        aggregates
            .register(AggregateType::from(TALLY), |_ctx| Box::new(Tally::default()))
            .unwrap();

        let events = Arc::new(events);
        Self {
            store: Arc::new(InMemoryEventStore::new(events.clone())),
            bus: InMemoryEventBus::new(events.clone()),
            events,
            aggregates: Arc::new(aggregates),
        }
    }

    pub fn command_bus(&self) -> CommandBus {
        self.command_bus_over(self.store.clone())
    }

    pub fn command_bus_over(&self, store: Arc<dyn EventStore>) -> CommandBus {
        CommandBus::new(self.aggregates.clone(), store, Arc::new(self.bus.clone()))
    }

    pub fn versions(&self, aggregate_type: &str, id: &str) -> Vec<u64> {
        self.store
            .records(&AggregateType::from(aggregate_type), &AggregateId::from(id))
            .iter()
            .map(|r| r.version)
            .collect()
    }
}

// ============================================================================
// Store wrapper holding the first `parties` readers until all have read
// ============================================================================

pub struct BarrierStore {
    inner: Arc<InMemoryEventStore>,
    barrier: Barrier,
    parties: usize,
    reads: AtomicUsize,
}

impl BarrierStore {
    pub fn new(inner: Arc<InMemoryEventStore>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
            parties,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventStore for BarrierStore {
    async fn get_events(&self, aggregate_type: &AggregateType, aggregate_id: &AggregateId) -> Result<Vec<Event>> {
        let history = self.inner.get_events(aggregate_type, aggregate_id).await?;
        if self.reads.fetch_add(1, Ordering::SeqCst) < self.parties {
            self.barrier.wait().await;
        }
        Ok(history)
    }

    async fn store_events(&self, events: &[Event]) -> Result<()> {
        self.inner.store_events(events).await
    }
}

// ============================================================================
// Recording handler
// ============================================================================

pub struct Recorder {
    pub name: String,
    pub interest: Vec<EventType>,
    /// Versions for which `handle_event` fails.
    pub fail_on: Vec<u64>,
    pub seen: Mutex<Vec<(EventType, u64)>>,
}

impl Recorder {
    pub fn new(name: &str, interest: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            interest: interest.iter().map(|t| EventType::from(*t)).collect(),
            fail_on: Vec::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, versions: &[u64]) -> Self {
        self.fail_on = versions.to_vec();
        self
    }

    pub fn seen(&self) -> Vec<(EventType, u64)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn events(&self) -> Vec<EventType> {
        self.interest.clone()
    }

    async fn handle_event(&self, event: &Event) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push((event.event_type.clone(), event.version));
        if self.fail_on.contains(&event.version) {
            anyhow::bail!("refusing version {}", event.version);
        }
        Ok(())
    }
}

pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
