use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};

use super::{deliver, ConsumerGroup, EventHandler, EventPublisher};
use crate::event_sourcing::core::{Event, EventRegistry, EventSourcingError, Result};
use crate::metrics::Metrics;

// ============================================================================
// In-Memory Event Bus
// ============================================================================
//
// A single in-process log of encoded envelopes. Each consumer group keeps
// its own offset, so a group that is stopped and started again resumes
// where it left off, and every group sees every message once per start.
// `set_available(false)` makes publishes fail, for failure-path tests.
//
// ============================================================================

struct Inner {
    registry: Arc<EventRegistry>,
    log: RwLock<Vec<Vec<u8>>>,
    offsets: Mutex<HashMap<String, usize>>,
    appended: Notify,
    available: AtomicBool,
}

#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
    metrics: Option<Arc<Metrics>>,
}

impl InMemoryEventBus {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                log: RwLock::new(Vec::new()),
                offsets: Mutex::new(HashMap::new()),
                appended: Notify::new(),
                available: AtomicBool::new(true),
            }),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Number of messages ever published.
    pub fn len(&self) -> usize {
        self.inner.log.read().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every published event, decoded, in publish order.
    pub fn published(&self) -> Result<Vec<Event>> {
        let log = self.inner.log.read().map_err(|_| poisoned())?;
        log.iter()
            .map(|payload| self.inner.registry.unmarshal_event(payload))
            .collect()
    }

    /// Next offset the group will read.
    pub fn offset(&self, group: &str) -> usize {
        self.inner
            .offsets
            .lock()
            .map(|offsets| offsets.get(group).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Wait until `group` has consumed everything published so far.
    pub async fn wait_until_caught_up(&self, group: &str, timeout: Duration) -> bool {
        let target = self.len();
        tokio::time::timeout(timeout, async {
            while self.offset(group) < target {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Spawn one consumption loop per handler.
    pub fn start_consumers(&self, handlers: Vec<Arc<dyn EventHandler>>) -> ConsumerGroup {
        let bus = self.clone();
        ConsumerGroup::spawn(handlers, move |handler, shutdown| bus.clone().consume(handler, shutdown))
    }

    fn commit(&self, group: &str, offset: usize) {
        if let Ok(mut offsets) = self.inner.offsets.lock() {
            offsets.insert(group.to_string(), offset);
        }
    }

    async fn consume(self, handler: Arc<dyn EventHandler>, mut shutdown: watch::Receiver<bool>) {
        let group = handler.name().to_string();

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Register for wake-ups before looking at the log so a publish
            // between the check and the wait is not missed.
            let appended = self.inner.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let offset = self.offset(&group);
            let next = self
                .inner
                .log
                .read()
                .ok()
                .and_then(|log| log.get(offset).cloned());

            match next {
                Some(payload) => {
                    deliver(&self.inner.registry, handler.as_ref(), &payload, self.metrics.as_deref()).await;
                    self.commit(&group, offset + 1);
                }
                None => {
                    tokio::select! {
                        _ = &mut appended => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

fn poisoned() -> EventSourcingError {
    EventSourcingError::Publish(anyhow::anyhow!("event bus lock poisoned"))
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish_events(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(EventSourcingError::Publish(anyhow::anyhow!("event bus unavailable")));
        }

        // Encode everything first so a bad payload publishes nothing.
        let payloads = events.iter().map(Event::marshal).collect::<Result<Vec<_>>>()?;

        {
            let mut log = self.inner.log.write().map_err(|_| poisoned())?;
            log.extend(payloads);
        }
        self.inner.appended.notify_waiters();

        if let Some(metrics) = &self.metrics {
            metrics.record_published(events);
        }

        tracing::debug!(count = events.len(), "Published events to in-memory bus");
        Ok(())
    }
}
