// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Domain-specific aggregates built on the generic event sourcing core.
// Each aggregate has its own subdirectory with value objects, events,
// commands, errors, the aggregate itself and its read-side projections.
//
// ============================================================================

pub mod household;
