// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

use crate::event_sourcing::core::Event;
use crate::utils::CircuitState;

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Command dispatch (outcome, latency, version conflicts, retries)
// - Event store appends and bus publication
// - Event handler deliveries per consumer group
// - Circuit breaker state of the publisher
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the engine
pub struct Metrics {
    registry: Registry,

    // Command Bus Metrics
    pub commands_dispatched: IntCounterVec,
    pub dispatch_duration: HistogramVec,
    pub version_conflicts: IntCounterVec,
    pub retry_attempts_total: IntCounterVec,

    // Store & Bus Metrics
    pub events_stored: IntCounterVec,
    pub events_published: IntCounterVec,

    // Consumer Metrics
    pub handler_events: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let commands_dispatched = IntCounterVec::new(
            Opts::new("commands_dispatched_total", "Total commands dispatched by outcome"),
            &["aggregate_type", "outcome"],
        )?;
        registry.register(Box::new(commands_dispatched.clone()))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new("command_dispatch_duration_seconds", "Command dispatch duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        let version_conflicts = IntCounterVec::new(
            Opts::new("version_conflicts_total", "Appends rejected because a version was already claimed"),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(version_conflicts.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let events_stored = IntCounterVec::new(
            Opts::new("events_stored_total", "Total events appended to the event store"),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(events_stored.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Total events published to the bus"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let handler_events = IntCounterVec::new(
            Opts::new("handler_events_total", "Messages seen by event handlers by outcome"),
            &["handler", "outcome"],
        )?;
        registry.register(Box::new(handler_events.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            commands_dispatched,
            dispatch_duration,
            version_conflicts,
            retry_attempts_total,
            events_stored,
            events_published,
            handler_events,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_dispatch(&self, aggregate_type: &str, outcome: &str, duration_secs: f64) {
        self.commands_dispatched.with_label_values(&[aggregate_type, outcome]).inc();
        self.dispatch_duration.with_label_values(&[aggregate_type]).observe(duration_secs);
    }

    pub fn record_conflict(&self, aggregate_type: &str) {
        self.version_conflicts.with_label_values(&[aggregate_type]).inc();
    }

    pub fn record_retry_attempt(&self, operation: &str) {
        self.retry_attempts_total.with_label_values(&[operation]).inc();
    }

    pub fn record_stored(&self, aggregate_type: &str, count: usize) {
        self.events_stored.with_label_values(&[aggregate_type]).inc_by(count as u64);
    }

    pub fn record_published(&self, events: &[Event]) {
        for event in events {
            self.events_published.with_label_values(&[event.event_type.as_str()]).inc();
        }
    }

    pub fn record_delivery(&self, handler: &str, outcome: &str) {
        self.handler_events.with_label_values(&[handler, outcome]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.circuit_breaker_state.set(value);
    }

    /// Last publisher breaker state reported through the gauge.
    pub fn circuit_breaker_state(&self) -> CircuitState {
        match self.circuit_breaker_state.get() {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}
