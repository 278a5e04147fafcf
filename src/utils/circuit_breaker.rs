use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the event publisher: after repeated transport failures the breaker
// opens and publishes fail fast until `timeout` has elapsed, then a limited
// number of trial calls decide whether to close it again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// How long to stay open before allowing a trial call
    pub timeout: Duration,
    /// Successful trial calls needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

impl Inner {
    fn transition(&mut self, name: &str, to: CircuitState) {
        if self.state != to {
            tracing::warn!(breaker = name, from = ?self.state, to = ?to, "Circuit breaker state change");
        }
        self.state = to;
        self.success_count = 0;
        match to {
            CircuitState::Open => self.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                self.failure_count = 0;
                self.opened_at = None;
            }
            CircuitState::HalfOpen => {}
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    name: String,
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error> std::error::Error for CircuitBreakerError<E> {}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            })),
            config,
        }
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == CircuitState::Open {
                let cooled_down = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if !cooled_down {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                inner.transition(&self.name, CircuitState::HalfOpen);
            }
        }

        let outcome = operation.await;

        let mut inner = self.inner.lock().await;
        match (&outcome, inner.state) {
            (Ok(_), CircuitState::HalfOpen) => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.transition(&self.name, CircuitState::Closed);
                }
            }
            (Ok(_), _) => inner.failure_count = 0,
            (Err(_), CircuitState::HalfOpen) => inner.transition(&self.name, CircuitState::Open),
            (Err(_), _) => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.transition(&self.name, CircuitState::Open);
                }
            }
        }

        outcome.map_err(CircuitBreakerError::OperationFailed)
    }

    pub async fn get_state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}
