// ============================================================================
// scylla_cqrs - event-sourced CQRS engine on ScyllaDB and Kafka
// ============================================================================
//
// - event_sourcing: registries, aggregate contract, event store, command bus
// - messaging:      event publisher / per-handler consumers
// - domain:         the household aggregate built on the core
// - metrics, utils: Prometheus metrics, retry and circuit breaker
//
// ============================================================================

pub mod config;
pub mod db;
pub mod domain;
pub mod event_sourcing;
pub mod messaging;
pub mod metrics;
pub mod utils;
