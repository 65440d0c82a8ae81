use crate::config::ResilienceConfig;
use crate::external::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::util::{retry_with_backoff, RetryConfig};
use parking_lot::Mutex;
use reqwest::{Client, Request, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    #[error("circuit breaker is open for {0}")]
    CircuitOpen(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome of a single attempt, before the retry decision
#[derive(Debug, Error)]
enum AttemptError {
    #[error("circuit open")]
    CircuitOpen,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("transient HTTP status {}", .0.status())]
    Status(Response),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::CircuitOpen)
    }
}

/// Statuses treated as transient upstream failures
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Retry, circuit breaking, and an overall deadline applied to every outbound call.
///
/// Breakers are kept per plugin so one failing upstream cannot trip calls to another.
pub struct ResiliencePolicy {
    retry: RetryConfig,
    total_timeout: Duration,
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl ResiliencePolicy {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            retry: RetryConfig::new(
                config.max_retry_attempts,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
            total_timeout: Duration::from_secs(config.total_timeout_secs),
            breaker_config: CircuitBreakerConfig::from(&config.circuit_breaker),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_total_timeout(mut self, total_timeout: Duration) -> Self {
        self.total_timeout = total_timeout;
        self
    }

    pub fn with_breaker_config(mut self, breaker_config: CircuitBreakerConfig) -> Self {
        self.breaker_config = breaker_config;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries
    }

    pub fn breaker(&self, plugin_id: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        let breaker = breakers
            .entry(plugin_id.to_ascii_uppercase())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(plugin_id, self.breaker_config.clone()))
            });
        Arc::clone(breaker)
    }

    /// Execute `request`, retrying transient failures.
    ///
    /// When retries are exhausted on a transient status, the last response is
    /// returned so the caller still sees the upstream status code.
    pub async fn execute(
        &self,
        client: &Client,
        plugin_id: &str,
        request: Request,
        max_retries: u32,
        use_breaker: bool,
    ) -> Result<Response, ResilienceError> {
        let retry = self
            .retry
            .clone()
            .with_max_retries(max_retries.min(self.retry.max_retries));
        let breaker = use_breaker.then(|| self.breaker(plugin_id));
        let operation_name = format!("{} {}", request.method(), request.url().path());

        let attempts = retry_with_backoff(
            &retry,
            |attempt| {
                let request = request.try_clone();
                let breaker = breaker.clone();
                async move {
                    let permit = match &breaker {
                        Some(breaker) => match breaker.acquire() {
                            Some(permit) => Some(permit),
                            None => return Err(AttemptError::CircuitOpen),
                        },
                        None => None,
                    };
                    let request = request.ok_or_else(|| {
                        AttemptError::Transport("request body cannot be replayed".to_string())
                    })?;
                    debug!("Sending {} (attempt {})", request.url(), attempt + 1);

                    let outcome = match client.execute(request).await {
                        Ok(response) if is_transient_status(response.status()) => {
                            Err(AttemptError::Status(response))
                        }
                        Ok(response) => Ok(response),
                        Err(e) if e.is_timeout() => Err(AttemptError::Timeout(e.to_string())),
                        Err(e) => Err(AttemptError::Transport(e.to_string())),
                    };

                    if let Some(permit) = permit {
                        match outcome {
                            Ok(_) => permit.success(),
                            Err(_) => permit.failure(),
                        }
                    }
                    outcome
                }
            },
            &operation_name,
            AttemptError::is_retryable,
        );

        match tokio::time::timeout(self.total_timeout, attempts).await {
            Err(_) => {
                warn!(
                    "Call {} for plugin {} exceeded the overall timeout of {:?}",
                    operation_name, plugin_id, self.total_timeout
                );
                Err(ResilienceError::Timeout(self.total_timeout))
            }
            Ok(Ok(response)) => Ok(response),
            Ok(Err(AttemptError::Status(response))) => Ok(response),
            Ok(Err(AttemptError::CircuitOpen)) => {
                warn!("Call {} rejected: circuit open for plugin {}", operation_name, plugin_id);
                Err(ResilienceError::CircuitOpen(plugin_id.to_string()))
            }
            Ok(Err(AttemptError::Timeout(_))) => Err(ResilienceError::Timeout(self.total_timeout)),
            Ok(Err(AttemptError::Transport(message))) => Err(ResilienceError::Transport(message)),
        }
    }
}
