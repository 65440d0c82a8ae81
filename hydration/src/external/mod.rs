// Outbound HTTP for network-backed plugins
pub mod circuit_breaker;
pub mod client;
pub mod config_store;
pub mod resilience;

pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{ExternalServiceClient, ServiceErrorKind, ServiceRequest, ServiceResponse};
pub use config_store::{
    ExternalServiceConfiguration, PluginConfiguration, PluginConfigurationStore,
    StaticConfigurationStore,
};
pub use resilience::{ResilienceError, ResiliencePolicy};
