use crate::config::CircuitBreakerSettings;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure ratio at or above which the circuit opens
    pub failure_ratio: f64,
    pub sampling_duration: Duration,
    /// Outcomes that must be sampled before the ratio is considered
    pub minimum_throughput: usize,
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&CircuitBreakerSettings::default())
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_ratio: settings.failure_ratio,
            sampling_duration: Duration::from_secs(settings.sampling_duration_secs),
            minimum_throughput: settings.minimum_throughput.max(1),
            break_duration: Duration::from_secs(settings.break_duration_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { until: Instant },
    /// A single trial call is allowed through
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    samples: VecDeque<(Instant, bool)>,
}

/// Failure-ratio circuit breaker over a sliding sampling window
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                samples: VecDeque::new(),
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask permission to issue a call. `false` means the call must be rejected.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    info!("Circuit for {} is half-open, allowing a trial call", self.name);
                    inner.state = CircuitState::HalfOpen {
                        trial_in_flight: true,
                    };
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen { trial_in_flight } => {
                if trial_in_flight {
                    false
                } else {
                    inner.state = CircuitState::HalfOpen {
                        trial_in_flight: true,
                    };
                    true
                }
            }
        }
    }

    /// Acquire a permit that records a failure if it is dropped without an outcome.
    pub fn acquire(self: &Arc<Self>) -> Option<BreakerPermit> {
        self.try_acquire().then(|| BreakerPermit {
            breaker: Arc::clone(self),
            recorded: false,
        })
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if let CircuitState::HalfOpen { .. } = inner.state {
            info!("Circuit for {} closed after successful trial call", self.name);
            inner.state = CircuitState::Closed;
            inner.samples.clear();
            return;
        }
        self.push_sample(&mut inner, true);
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        if let CircuitState::HalfOpen { .. } = inner.state {
            warn!(
                "Trial call for {} failed, circuit re-opened for {:?}",
                self.name, self.config.break_duration
            );
            self.open(&mut inner);
            return;
        }
        self.push_sample(&mut inner, false);

        let total = inner.samples.len();
        if total < self.config.minimum_throughput {
            return;
        }
        let failures = inner.samples.iter().filter(|(_, ok)| !ok).count();
        let ratio = failures as f64 / total as f64;
        if ratio >= self.config.failure_ratio {
            warn!(
                "Circuit for {} opened: {}/{} calls failed within {:?}, breaking for {:?}",
                self.name, failures, total, self.config.sampling_duration, self.config.break_duration
            );
            self.open(&mut inner);
        }
    }

    fn push_sample(&self, inner: &mut Inner, success: bool) {
        let now = Instant::now();
        inner.samples.push_back((now, success));
        while let Some((at, _)) = inner.samples.front() {
            if now.duration_since(*at) > self.config.sampling_duration {
                inner.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = CircuitState::Open {
            until: Instant::now() + self.config.break_duration,
        };
        inner.samples.clear();
    }
}

/// Admission for one call through a [`CircuitBreaker`].
///
/// A permit abandoned mid-call (deadline, cancellation) counts as a failure,
/// which also releases a half-open trial slot.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    recorded: bool,
}

impl BreakerPermit {
    pub fn success(mut self) {
        self.recorded = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.recorded = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.recorded {
            warn!("Call through circuit {} abandoned before completing", self.breaker.name);
            self.breaker.record_failure();
        }
    }
}
