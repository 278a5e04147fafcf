use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::errors::{EventSourcingError, Result};
use super::event::{Event, EventData};

// ============================================================================
// Aggregate Root Pattern - Event Sourcing Core
// ============================================================================
//
// Key Principles:
// 1. State is derived from events (not stored directly)
// 2. Commands are validated before emitting events
// 3. Events represent facts that have already happened
// 4. The command bus owns the per-dispatch context and passes it in
//
// Aggregates are rebuilt from scratch for every command and discarded after.
//
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_id!(
    /// Opaque identity of one aggregate instance (a UUID in practice).
    AggregateId
);

string_id!(
    /// Names the state machine that governs an aggregate's event stream.
    AggregateType
);

// ============================================================================
// Commands
// ============================================================================

/// A request to change one aggregate's state.
///
/// Commands never carry a version; they apply to whatever the aggregate
/// currently is.
pub trait Command: Any + fmt::Debug + Send + Sync {
    fn aggregate_type(&self) -> AggregateType;
    fn aggregate_id(&self) -> AggregateId;
    fn as_any(&self) -> &dyn Any;

    fn command_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl dyn Command {
    pub fn downcast_ref<T: Command>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

// ============================================================================
// Aggregate Context
// ============================================================================

static LAST_COMMIT_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Wall-clock milliseconds, never going backwards within this process.
pub fn commit_timestamp() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let previous = LAST_COMMIT_MILLIS.fetch_max(now, Ordering::SeqCst);
    previous.max(now)
}

/// Per-dispatch state: identity, the version loaded from the store and the
/// events recorded on top of it.
#[derive(Debug, Clone)]
pub struct AggregateContext {
    aggregate_type: AggregateType,
    aggregate_id: AggregateId,
    initial_version: u64,
    version: u64,
    uncommitted: Vec<Event>,
}

impl AggregateContext {
    pub fn new(aggregate_type: AggregateType, aggregate_id: AggregateId, version: u64) -> Self {
        Self {
            aggregate_type,
            aggregate_id,
            initial_version: version,
            version,
            uncommitted: Vec::new(),
        }
    }

    pub fn aggregate_type(&self) -> &AggregateType {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    /// Version the aggregate had before this dispatch (0 = no history).
    pub fn initial_version(&self) -> u64 {
        self.initial_version
    }

    /// Version including events recorded so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn exists(&self) -> bool {
        self.initial_version > 0
    }

    /// Stamp `data` with the next version and keep it as uncommitted.
    pub fn record(&mut self, data: Arc<dyn EventData>) -> &Event {
        self.version += 1;

        let event = Event::new(
            self.aggregate_type.clone(),
            self.aggregate_id.clone(),
            data,
            commit_timestamp(),
            self.version,
        );
        self.uncommitted.push(event);

        &self.uncommitted[self.uncommitted.len() - 1]
    }

    pub fn uncommitted(&self) -> &[Event] {
        &self.uncommitted
    }

    pub fn take_uncommitted(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.uncommitted)
    }
}

// ============================================================================
// Aggregate Root Contract
// ============================================================================

/// Implemented by every domain aggregate.
///
/// `apply_event` is only ever called once per event, in version order.
/// `handle_command` decides which events to emit and must not mutate state;
/// it may await injected read-side lookups.
#[async_trait]
pub trait AggregateRoot: Any + Send + Sync {
    fn apply_event(&mut self, event: &dyn EventData) -> Result<()>;

    async fn handle_command(
        &self,
        context: &AggregateContext,
        command: &dyn Command,
    ) -> Result<Vec<Arc<dyn EventData>>>;

    fn as_any(&self) -> &dyn Any;
}

impl dyn AggregateRoot {
    /// Concrete view of a rebuilt aggregate, for read-side inspection.
    pub fn downcast_ref<T: AggregateRoot>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Box a single payload as the result of `handle_command`.
pub fn single_event<E: EventData>(event: E) -> Result<Vec<Arc<dyn EventData>>> {
    let event: Arc<dyn EventData> = Arc::new(event);
    Ok(vec![event])
}

// ============================================================================
// Aggregate Type Registry
// ============================================================================

pub type AggregateFactory = Arc<dyn Fn(&AggregateContext) -> Box<dyn AggregateRoot> + Send + Sync>;

/// Maps aggregate type tags to factories, filled once at start-up.
#[derive(Default)]
pub struct AggregateRegistry {
    factories: HashMap<AggregateType, AggregateFactory>,
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, aggregate_type: AggregateType, factory: F) -> Result<()>
    where
        F: Fn(&AggregateContext) -> Box<dyn AggregateRoot> + Send + Sync + 'static,
    {
        if self.factories.contains_key(&aggregate_type) {
            return Err(EventSourcingError::DuplicateAggregateType(aggregate_type));
        }

        tracing::debug!(aggregate_type = %aggregate_type, "Registered aggregate type");
        self.factories.insert(aggregate_type, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, aggregate_type: &AggregateType) -> bool {
        self.factories.contains_key(aggregate_type)
    }

    /// Build a fresh aggregate for the context's type.
    pub fn get(&self, context: &AggregateContext) -> Result<Box<dyn AggregateRoot>> {
        let factory = self
            .factories
            .get(context.aggregate_type())
            .ok_or_else(|| EventSourcingError::AggregateTypeNotFound(context.aggregate_type().clone()))?;

        Ok(factory(context))
    }
}

impl fmt::Debug for AggregateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRegistry")
            .field("aggregate_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
