// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// This module contains GENERIC, reusable event sourcing infrastructure
// that works with ANY domain aggregate.
//
// Key Principles:
// - No domain-specific code (no Household, User, Item, etc.)
// - Polymorphic over aggregate and event types through registries
// - Registries are built at start-up and passed in explicitly
//
// ============================================================================

pub mod aggregate;
pub mod errors;
pub mod event;

// Re-export core types for convenience
pub use aggregate::{
    commit_timestamp, single_event, AggregateContext, AggregateFactory, AggregateId,
    AggregateRegistry, AggregateRoot, AggregateType, Command,
};
pub use errors::{EventSourcingError, Result};
pub use event::{DomainEvent, Event, EventData, EventRecord, EventRegistry, EventType};
