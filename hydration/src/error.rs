use thiserror::Error;

/// Failure outcomes of a retrieval or hydration request.
///
/// Cloneable so one in-flight population can hand the same outcome to every
/// waiter joined on its cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HydrationError {
    /// No plugin is registered under the requested id.
    #[error("no plugin found for plugin ID: {0}")]
    NotFound(String),

    /// The plugin exists but does not support the request, or the request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The plugin ran and failed.
    #[error("population failed: {0}")]
    PopulationFailed(String),

    /// A network-backed plugin could not get usable data from its upstream.
    #[error("external service failure (HTTP {status}): {message}")]
    ExternalServiceFailure { status: u16, message: String },

    /// No active configuration exists for a network-backed plugin.
    #[error("configuration not found for plugin {0}")]
    ConfigurationMissing(String),

    #[error("operation cancelled")]
    Cancelled,

    /// A cache value could not be encoded or decoded.
    #[error("cache error: {0}")]
    Cache(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    PopulationFailed,
    ExternalServiceFailure,
    ConfigurationMissing,
    Cancelled,
    Cache,
}

impl HydrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::PopulationFailed(_) => ErrorKind::PopulationFailed,
            Self::ExternalServiceFailure { .. } => ErrorKind::ExternalServiceFailure,
            Self::ConfigurationMissing(_) => ErrorKind::ConfigurationMissing,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Cache(_) => ErrorKind::Cache,
        }
    }

    /// True when the plugin was invoked and its data retrieval failed.
    /// Upstream failures are a sub-case of population failures.
    pub fn is_population_failure(&self) -> bool {
        matches!(
            self,
            Self::PopulationFailed(_) | Self::ExternalServiceFailure { .. }
        )
    }

    pub fn population_failed(err: impl std::fmt::Display) -> Self {
        Self::PopulationFailed(err.to_string())
    }
}
