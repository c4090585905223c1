//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold (only a success or reset clears it)
//! Open → Half-Open: first allow_request() after retry timeout
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global), keyed by backend URL
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial request in Half-Open (prevents hammering recovering backend)
//! - A trial request that never reports back is replaced after another retry timeout
//! - Every transition is serialized under one lock per breaker
//! - Settings are shared by a registry's breakers and replaced on reload

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;

use crate::config::schema::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge value exported for this state.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

/// Thresholds shared by every breaker in a registry.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub retry_timeout: Duration,
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            retry_timeout: Duration::from_millis(config.retry_timeout_ms),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Circuit breaker guarding a single backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    backend: String,
    settings: Arc<ArcSwap<BreakerSettings>>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(backend: impl Into<String>, settings: BreakerSettings) -> Self {
        Self::with_shared_settings(backend, Arc::new(ArcSwap::from_pointee(settings)))
    }

    fn with_shared_settings(backend: impl Into<String>, settings: Arc<ArcSwap<BreakerSettings>>) -> Self {
        Self {
            backend: backend.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_started: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // A panic while holding the lock leaves plain counters behind; keep using them.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Whether a request may be sent to the backend now.
    pub fn allow_request(&self) -> bool {
        self.allow_request_at(Instant::now())
    }

    pub fn allow_request_at(&self, now: Instant) -> bool {
        let retry_timeout = self.settings.load().retry_timeout;
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let waited = inner
                    .last_failure
                    .map_or(true, |at| now.saturating_duration_since(at) >= retry_timeout);
                if waited {
                    inner.trial_started = Some(now);
                    self.transition(&mut inner, CircuitState::HalfOpen);
                }
                waited
            }
            CircuitState::HalfOpen => {
                let stale = inner
                    .trial_started
                    .map_or(true, |at| now.saturating_duration_since(at) >= retry_timeout);
                if stale {
                    inner.trial_started = Some(now);
                }
                stale
            }
        }
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.trial_started = None;
        if inner.state == CircuitState::HalfOpen {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let threshold = self.settings.load().failure_threshold;
        let mut inner = self.lock();

        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(now);

        match inner.state {
            CircuitState::HalfOpen => {
                inner.trial_started = None;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Closed if inner.failure_count >= threshold => {
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    /// Force the breaker back to Closed with a clean counter.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.trial_started = None;
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    fn transition(&self, inner: &mut BreakerInner, next: CircuitState) {
        if inner.state == next {
            return;
        }
        let previous = inner.state;
        inner.state = next;
        match next {
            CircuitState::Open => tracing::warn!(
                backend = %self.backend,
                from = ?previous,
                failures = inner.failure_count,
                "Circuit opened"
            ),
            _ => tracing::info!(backend = %self.backend, from = ?previous, to = ?next, "Circuit state changed"),
        }
        metrics::record_circuit_state(&self.backend, next);
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub backend: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

/// Lazily created breakers, one per backend URL.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: Arc<ArcSwap<BreakerSettings>>,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            breakers: DashMap::new(),
            settings: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    pub fn settings(&self) -> BreakerSettings {
        **self.settings.load()
    }

    /// Apply new thresholds to every breaker, existing ones included.
    pub fn update_settings(&self, settings: BreakerSettings) {
        self.settings.store(Arc::new(settings));
    }

    /// Breaker for `backend`, created on first use. Concurrent callers get the same instance.
    pub fn get_or_create(&self, backend: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(backend) {
            return existing.clone();
        }
        self.breakers
            .entry(backend.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::with_shared_settings(backend, self.settings.clone())))
            .clone()
    }

    pub fn get(&self, backend: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(backend).map(|entry| entry.clone())
    }

    /// State for `backend`; backends never seen report Closed.
    pub fn state(&self, backend: &str) -> CircuitState {
        self.get(backend).map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    /// Reset one breaker. Returns false when no breaker exists for `backend`.
    pub fn reset(&self, backend: &str) -> bool {
        match self.get(backend) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|entry| BreakerSnapshot {
                backend: entry.key().clone(),
                state: entry.value().state(),
                failure_count: entry.value().failure_count(),
            })
            .collect();
        all.sort_by(|a, b| a.backend.cmp(&b.backend));
        all
    }

    /// Number of breakers not in Closed state.
    pub fn open_count(&self) -> usize {
        self.breakers
            .iter()
            .filter(|entry| entry.value().state() != CircuitState::Closed)
            .count()
    }

    /// Drop breakers for backends no longer referenced by any route.
    pub fn retain_backends(&self, keep: &[String]) {
        self.breakers.retain(|backend, _| keep.iter().any(|k| k == backend));
    }

    pub fn clear(&self) {
        self.breakers.clear();
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
