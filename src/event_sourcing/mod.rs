// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable event sourcing infrastructure.
// Domain-specific code is in src/domain/
//
// ============================================================================

// Core abstractions (GENERIC - works with any aggregate)
pub mod command_bus;
pub mod core;
pub mod store;

// Re-export core infrastructure
pub use self::core::*;
pub use command_bus::{CommandBus, DispatchOutcome};
pub use store::{EventStore, InMemoryEventStore, ScyllaEventStore};
