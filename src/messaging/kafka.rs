use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use super::{deliver, ConsumerGroup, EventHandler, EventPublisher};
use crate::event_sourcing::core::{Event, EventRegistry, EventSourcingError, Result};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

// ============================================================================
// Kafka / Redpanda transport
// ============================================================================
//
// Publisher: one record per event, key = aggregate id, so a partition holds
// each aggregate's events in version order. With a transactional id the
// whole batch is committed (or aborted) as one Kafka transaction; without
// one a send failure mid-batch leaves the records already sent in place.
//
// Consumer: one StreamConsumer per handler, group.id = handler name, offsets
// committed manually after delivery (at-least-once).
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub transactional_id: Option<String>,
    pub send_timeout: Duration,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            transactional_id: None,
            send_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_transactional_id(mut self, transactional_id: impl Into<String>) -> Self {
        self.transactional_id = Some(transactional_id.into());
        self
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", self.send_timeout.as_millis().to_string())
            .set("enable.idempotence", "true");
        if let Some(id) = &self.transactional_id {
            config.set("transactional.id", id);
        }
        config
    }

    fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("isolation.level", "read_committed");
        config
    }
}

// ============================================================================
// Publisher
// ============================================================================

pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
    transactional: bool,
    send_timeout: Duration,
    // A producer can only have one open transaction.
    in_flight: Mutex<()>,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl KafkaEventPublisher {
    /// Create the producer and, when transactional, register its
    /// transactional id with the brokers.
    pub async fn connect(config: &KafkaConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = config.producer_config().create()?;
        let transactional = config.transactional_id.is_some();

        if transactional {
            let p = producer.clone();
            let timeout = config.send_timeout;
            tokio::task::spawn_blocking(move || p.init_transactions(Timeout::After(timeout))).await??;
            tracing::info!(transactional_id = ?config.transactional_id, "Kafka transactions initialised");
        }

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            transactional,
            send_timeout: config.send_timeout,
            in_flight: Mutex::new(()),
            circuit_breaker: CircuitBreaker::new("kafka-publisher", cb_config),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn send_all(&self, records: &[(String, Vec<u8>)]) -> anyhow::Result<()> {
        for (key, payload) in records {
            let record = FutureRecord::to(&self.topic).key(key.as_str()).payload(payload.as_slice());
            self.producer
                .send(record, Timeout::After(self.send_timeout))
                .await
                .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))?;
        }
        Ok(())
    }

    async fn send_batch(&self, records: &[(String, Vec<u8>)]) -> anyhow::Result<()> {
        let _guard = self.in_flight.lock().await;

        if !self.transactional {
            return self.send_all(records).await;
        }

        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.begin_transaction()).await??;

        let sent = self.send_all(records).await;

        let producer = self.producer.clone();
        let timeout = Timeout::After(self.send_timeout);
        match sent {
            Ok(()) => {
                tokio::task::spawn_blocking(move || producer.commit_transaction(timeout)).await??;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = tokio::task::spawn_blocking(move || producer.abort_transaction(timeout)).await? {
                    tracing::error!(error = %abort, "Failed to abort Kafka transaction");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish_events(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let records = events
            .iter()
            .map(|event| Ok((event.aggregate_id.to_string(), event.marshal()?)))
            .collect::<Result<Vec<_>>>()?;

        let result = self.circuit_breaker.call(self.send_batch(&records)).await;

        if let Some(metrics) = &self.metrics {
            metrics.update_circuit_breaker_state(self.circuit_breaker.get_state().await);
        }

        match result {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_published(events);
                }
                tracing::info!(
                    topic = %self.topic,
                    aggregate_id = %events[0].aggregate_id,
                    count = events.len(),
                    "Published events to Kafka"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %self.topic, "Circuit breaker open - Kafka unavailable");
                Err(EventSourcingError::Publish(anyhow::anyhow!("circuit breaker open for Kafka")))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %self.topic, "Failed to publish to Kafka");
                Err(EventSourcingError::Publish(e))
            }
        }
    }
}

// ============================================================================
// Consumer
// ============================================================================

pub struct KafkaEventConsumer {
    config: KafkaConfig,
    registry: Arc<EventRegistry>,
    metrics: Option<Arc<Metrics>>,
}

impl KafkaEventConsumer {
    pub fn new(config: KafkaConfig, registry: Arc<EventRegistry>) -> Self {
        Self {
            config,
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn subscribe(&self, group_id: &str) -> anyhow::Result<StreamConsumer> {
        let consumer: StreamConsumer = self.config.consumer_config(group_id).create()?;
        consumer.subscribe(&[self.config.topic.as_str()])?;
        Ok(consumer)
    }

    /// Subscribe one consumer per handler, then spawn their loops. Fails
    /// before spawning anything if any subscription fails.
    pub fn start(&self, handlers: Vec<Arc<dyn EventHandler>>) -> anyhow::Result<ConsumerGroup> {
        let subscribed = handlers
            .into_iter()
            .map(|handler| Ok((self.subscribe(handler.name())?, handler)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let (shutdown, signal) = watch::channel(false);
        let tasks = subscribed
            .into_iter()
            .map(|(consumer, handler)| {
                let name = handler.name().to_string();
                tracing::info!(handler = %name, topic = %self.config.topic, "Starting Kafka consumer");
                let task = tokio::spawn(consume(
                    consumer,
                    handler,
                    self.registry.clone(),
                    self.metrics.clone(),
                    signal.clone(),
                ));
                (name, task)
            })
            .collect();

        Ok(ConsumerGroup::new(shutdown, tasks))
    }
}

async fn consume(
    consumer: StreamConsumer,
    handler: Arc<dyn EventHandler>,
    registry: Arc<EventRegistry>,
    metrics: Option<Arc<Metrics>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let received = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            received = consumer.recv() => received,
        };

        let message = match received {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(handler = handler.name(), error = %e, "Kafka receive error");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let payload = message.payload().map(<[u8]>::to_vec);
        let mut position = TopicPartitionList::new();
        if let Err(e) =
            position.add_partition_offset(message.topic(), message.partition(), Offset::Offset(message.offset() + 1))
        {
            tracing::error!(handler = handler.name(), error = %e, "Invalid message position");
            continue;
        }
        drop(message);

        match payload {
            Some(payload) => {
                deliver(&registry, handler.as_ref(), &payload, metrics.as_deref()).await;
            }
            None => tracing::warn!(handler = handler.name(), "Skipping message without payload"),
        }

        if let Err(e) = consumer.commit(&position, CommitMode::Async) {
            tracing::error!(handler = handler.name(), error = %e, "Failed to commit offset");
        }
    }
}
