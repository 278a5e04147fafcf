use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use super::core::{
    AggregateContext, AggregateId, AggregateRegistry, AggregateRoot, AggregateType, Command, Event,
    EventSourcingError, Result,
};
use super::store::EventStore;
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Command Bus - the write path
// ============================================================================
//
// dispatch(command):
//   1. load history            (store read)
//   2. current version          = last stored version, 0 when none
//   3. context + aggregate      (registry miss is fatal)
//   4. replay history           (apply_event, in version order)
//   5. handle_command           (pure decision, may reject)
//   6. stamp new events         (current + 1 ..= current + n)
//   7. conditional append       (a claimed version fails the whole batch)
//   8. publish the same batch   (in order)
//
// No lock is held between 1 and 7; a concurrent writer is detected at 7 as
// a VersionConflict. Steps 1-7 are retried on conflict when a retry budget
// is configured, since nothing was written by the losing attempt.
//
// ============================================================================

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Events committed by this dispatch, in version order (may be empty).
    pub events: Vec<Event>,
    /// Aggregate version after the dispatch.
    pub version: u64,
}

pub struct CommandBus {
    aggregates: Arc<AggregateRegistry>,
    event_store: Arc<dyn EventStore>,
    publisher: Arc<dyn EventPublisher>,
    conflict_retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl CommandBus {
    pub fn new(
        aggregates: Arc<AggregateRegistry>,
        event_store: Arc<dyn EventStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            aggregates,
            event_store,
            publisher,
            conflict_retry: RetryConfig::none(),
            metrics: None,
        }
    }

    /// Retry the whole read-replay-append cycle on version conflicts.
    pub fn with_conflict_retry(mut self, config: RetryConfig) -> Self {
        self.conflict_retry = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate `command` against the aggregate's current state and commit
    /// the events it produces.
    pub async fn dispatch(&self, command: &dyn Command) -> Result<DispatchOutcome> {
        let aggregate_type = command.aggregate_type();
        let aggregate_id = command.aggregate_id();

        let span = tracing::info_span!(
            "dispatch",
            aggregate_type = %aggregate_type,
            aggregate_id = %aggregate_id,
            command = command.command_name(),
            version = tracing::field::Empty,
        );

        async {
            let started = Instant::now();

            let result = retry_on_transient(self.conflict_retry.clone(), |attempt| {
                if attempt > 1 {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry_attempt("dispatch");
                    }
                }
                self.attempt(&aggregate_type, &aggregate_id, command)
            })
            .await
            .into_result();

            if let Some(metrics) = &self.metrics {
                metrics.record_dispatch(
                    aggregate_type.as_str(),
                    outcome_label(&result),
                    started.elapsed().as_secs_f64(),
                );
            }

            match &result {
                Ok(outcome) => {
                    tracing::Span::current().record("version", outcome.version);
                    tracing::info!(events = outcome.events.len(), "Command dispatched");
                }
                Err(e) if e.is_rejected() => tracing::info!(error = %e, "Command rejected"),
                Err(e) if e.is_configuration_error() => tracing::error!(error = %e, "Dispatch misconfigured"),
                Err(e) => tracing::warn!(error = %e, "Dispatch failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Load and replay an aggregate without handling a command.
    pub async fn rebuild(
        &self,
        aggregate_type: &AggregateType,
        aggregate_id: &AggregateId,
    ) -> Result<Box<dyn AggregateRoot>> {
        let (_, aggregate) = self.load(aggregate_type, aggregate_id).await?;
        Ok(aggregate)
    }

    // Steps 1-4.
    async fn load(
        &self,
        aggregate_type: &AggregateType,
        aggregate_id: &AggregateId,
    ) -> Result<(AggregateContext, Box<dyn AggregateRoot>)> {
        let history = self.event_store.get_events(aggregate_type, aggregate_id).await?;
        let current_version = history.last().map(|event| event.version).unwrap_or(0);

        let context = AggregateContext::new(aggregate_type.clone(), aggregate_id.clone(), current_version);
        let mut aggregate = self.aggregates.get(&context)?;

        for event in &history {
            aggregate.apply_event(event.data.as_ref())?;
        }

        tracing::debug!(replayed = history.len(), current_version, "Aggregate loaded");
        Ok((context, aggregate))
    }

    async fn attempt(
        &self,
        aggregate_type: &AggregateType,
        aggregate_id: &AggregateId,
        command: &dyn Command,
    ) -> Result<DispatchOutcome> {
        let (mut context, mut aggregate) = self.load(aggregate_type, aggregate_id).await?;

        let produced = aggregate.handle_command(&context, command).await?;
        if produced.is_empty() {
            tracing::debug!("Command produced no events");
            return Ok(DispatchOutcome {
                events: Vec::new(),
                version: context.version(),
            });
        }

        for data in produced {
            context.record(data);
        }
        let events = context.take_uncommitted();

        if let Err(e) = self.event_store.store_events(&events).await {
            if e.is_conflict() {
                if let Some(metrics) = &self.metrics {
                    metrics.record_conflict(aggregate_type.as_str());
                }
                tracing::warn!(expected_version = context.initial_version(), "Version conflict on append");
            }
            return Err(e);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_stored(aggregate_type.as_str(), events.len());
        }

        // The aggregate is discarded after dispatch, but its state only ever
        // moves through apply_event once the events are durable.
        for event in &events {
            if let Err(e) = aggregate.apply_event(event.data.as_ref()) {
                tracing::error!(error = %e, version = event.version, "Aggregate cannot apply its own event");
            }
        }

        if let Err(e) = self.publisher.publish_events(&events).await {
            tracing::error!(
                error = %e,
                first_version = events[0].version,
                last_version = context.version(),
                "Events stored but not published"
            );
            return Err(match e {
                EventSourcingError::Publish(_) => e,
                other => EventSourcingError::Publish(anyhow::Error::new(other)),
            });
        }

        Ok(DispatchOutcome {
            events,
            version: context.version(),
        })
    }
}

fn outcome_label(result: &Result<DispatchOutcome>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) if e.is_rejected() => "rejected",
        Err(e) if e.is_conflict() => "conflict",
        Err(e) if e.is_configuration_error() => "configuration",
        Err(EventSourcingError::Publish(_)) => "publish_failed",
        Err(_) => "error",
    }
}

// ============================================================================
// Tests
// ============================================================================
