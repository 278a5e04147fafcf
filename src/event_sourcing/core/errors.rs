use super::aggregate::{AggregateId, AggregateType};
use super::event::EventType;
use crate::utils::IsTransient;

// ============================================================================
// Event Sourcing Errors
// ============================================================================
//
// Callers tell failures apart by variant, never by message text:
// - configuration: a type tag missing from (or registered twice in) a registry
// - programming:   an aggregate sees a command or event it has no arm for
// - domain:        the command is not applicable to the current state
// - conflict:      another writer already claimed one of the target versions
// - infrastructure: store / transport / decode failures
//
// ============================================================================

pub type Result<T, E = EventSourcingError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EventSourcingError {
    #[error("aggregate type not found in registry: {0}")]
    AggregateTypeNotFound(AggregateType),

    #[error("event type not found in registry: {0}")]
    EventTypeNotFound(EventType),

    #[error("aggregate type registered twice: {0}")]
    DuplicateAggregateType(AggregateType),

    #[error("event type registered twice: {0}")]
    DuplicateEventType(EventType),

    #[error("aggregate {aggregate_type} does not know how to handle command {command}")]
    UnknownCommand {
        aggregate_type: AggregateType,
        command: String,
    },

    #[error("aggregate {aggregate_type} does not know how to apply event {event_type}")]
    UnknownEvent {
        aggregate_type: AggregateType,
        event_type: EventType,
    },

    #[error("command rejected: {0}")]
    Rejected(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("version conflict on {aggregate_type}/{aggregate_id}: version {version} already exists")]
    VersionConflict {
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
        version: u64,
    },

    #[error("failed to decode event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("event store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("failed to publish events: {0}")]
    Publish(#[source] anyhow::Error),
}

impl EventSourcingError {
    /// Wrap a domain validation error raised by `handle_command`.
    pub fn rejected<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Rejected(Box::new(error))
    }

    /// The domain error behind a `Rejected` failure, if it has type `E`.
    pub fn domain_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Rejected(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Registry misconfiguration; fatal and never worth retrying.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::AggregateTypeNotFound(_)
                | Self::EventTypeNotFound(_)
                | Self::DuplicateAggregateType(_)
                | Self::DuplicateEventType(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl IsTransient for EventSourcingError {
    // Only a lost optimistic-concurrency race is safe to replay from a fresh read.
    fn is_transient(&self) -> bool {
        self.is_conflict()
    }
}
