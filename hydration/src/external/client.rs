use crate::config::{HttpConfig, ResilienceConfig};
use crate::external::config_store::{ExternalServiceConfiguration, PluginConfigurationStore};
use crate::external::resilience::{ResilienceError, ResiliencePolicy};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outbound call description, relative to the plugin's configured base URL
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub endpoint: String,
    pub method: Method,
    /// Sent as JSON for POST and PUT only
    pub body: Option<serde_json::Value>,
    pub headers: Option<HashMap<String, String>>,
    pub query_params: Option<BTreeMap<String, String>>,
}

impl ServiceRequest {
    pub fn new(method: Method, endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            method,
            body: None,
            headers: None,
            query_params: None,
        }
    }

    pub fn get(endpoint: &str) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_query_param(mut self, name: &str, value: &str) -> Self {
        self.query_params
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    ConfigurationMissing,
    Timeout,
    Transport,
    /// The upstream answered with a non-success status
    Status,
    Deserialization,
    CircuitOpen,
    Cancelled,
}

/// Structured call outcome. Failures are reported here, never as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse<T = String> {
    pub is_success: bool,
    pub data: Option<T>,
    pub error_message: Option<String>,
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub error_kind: Option<ServiceErrorKind>,
}

impl<T> ServiceResponse<T> {
    pub fn failure(status_code: u16, message: impl Into<String>, kind: ServiceErrorKind) -> Self {
        Self {
            is_success: false,
            data: None,
            error_message: Some(message.into()),
            status_code,
            headers: HashMap::new(),
            error_kind: Some(kind),
        }
    }

    fn without_data<U>(&self) -> ServiceResponse<U> {
        ServiceResponse {
            is_success: self.is_success,
            data: None,
            error_message: self.error_message.clone(),
            status_code: self.status_code,
            headers: self.headers.clone(),
            error_kind: self.error_kind,
        }
    }
}

pub struct ExternalServiceClient {
    http: Client,
    store: Arc<dyn PluginConfigurationStore>,
    policy: Arc<ResiliencePolicy>,
}

impl ExternalServiceClient {
    pub fn new(
        http: Client,
        store: Arc<dyn PluginConfigurationStore>,
        policy: Arc<ResiliencePolicy>,
    ) -> Self {
        Self {
            http,
            store,
            policy,
        }
    }

    pub fn from_config(
        http: &HttpConfig,
        resilience: &ResilienceConfig,
        store: Arc<dyn PluginConfigurationStore>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(
            client,
            store,
            Arc::new(ResiliencePolicy::new(resilience)),
        ))
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// Call the upstream API configured for `plugin_id` and return the body as text.
    pub async fn call(
        &self,
        plugin_id: &str,
        request: &ServiceRequest,
        cancel: &CancellationToken,
    ) -> ServiceResponse<String> {
        info!(
            "Making external service call for plugin {} to endpoint {}",
            plugin_id, request.endpoint
        );

        let config = match self.load_configuration(plugin_id).await {
            Some(config) => config,
            None => {
                return ServiceResponse::failure(
                    500,
                    format!("Configuration not found for plugin {}", plugin_id),
                    ServiceErrorKind::ConfigurationMissing,
                )
            }
        };

        let url = match build_url(&config.base_url, &request.endpoint, request.query_params.as_ref())
        {
            Ok(url) => url,
            Err(e) => {
                error!("Invalid URL for plugin {}: {:#}", plugin_id, e);
                return ServiceResponse::failure(
                    500,
                    format!("Invalid URL for plugin {}: {:#}", plugin_id, e),
                    ServiceErrorKind::Transport,
                );
            }
        };

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(build_headers(&config, request));
        if let Some(body) = &request.body {
            if request.method == Method::POST || request.method == Method::PUT {
                builder = builder.json(body);
            }
        }
        let http_request = match builder.build() {
            Ok(http_request) => http_request,
            Err(e) => {
                error!("Failed to build request for plugin {}: {}", plugin_id, e);
                return ServiceResponse::failure(
                    500,
                    format!("Failed to build request: {}", e),
                    ServiceErrorKind::Transport,
                );
            }
        };

        let plugin_timeout = Duration::from_secs(config.timeout_seconds);
        let exchange = async {
            let response = self
                .policy
                .execute(
                    &self.http,
                    plugin_id,
                    http_request,
                    config.max_retry_attempts,
                    config.enable_circuit_breaker,
                )
                .await?;
            let status = response.status();
            let headers = collect_headers(response.headers());
            let body = response
                .text()
                .await
                .map_err(|e| ResilienceError::Transport(e.to_string()))?;
            Ok::<_, ResilienceError>((status, headers, body))
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("External service call for plugin {} was cancelled", plugin_id);
                return ServiceResponse::failure(
                    499,
                    "Request was cancelled",
                    ServiceErrorKind::Cancelled,
                );
            }
            outcome = tokio::time::timeout(plugin_timeout, exchange) => outcome,
        };

        match outcome {
            Err(_) => {
                warn!(
                    "External service call for plugin {} timed out after {:?}",
                    plugin_id, plugin_timeout
                );
                ServiceResponse::failure(
                    408,
                    format!("Request timed out after {} seconds", config.timeout_seconds),
                    ServiceErrorKind::Timeout,
                )
            }
            Ok(Err(ResilienceError::Timeout(after))) => {
                warn!("External service call for plugin {} timed out after {:?}", plugin_id, after);
                ServiceResponse::failure(
                    408,
                    format!("Request timed out after {:?}", after),
                    ServiceErrorKind::Timeout,
                )
            }
            Ok(Err(ResilienceError::CircuitOpen(_))) => ServiceResponse::failure(
                503,
                format!("Circuit breaker is open for plugin {}", plugin_id),
                ServiceErrorKind::CircuitOpen,
            ),
            Ok(Err(ResilienceError::Transport(message))) => {
                error!("External service call failed for plugin {}: {}", plugin_id, message);
                ServiceResponse::failure(
                    500,
                    format!("External service error: {}", message),
                    ServiceErrorKind::Transport,
                )
            }
            Ok(Ok((status, headers, body))) => {
                let mut response = ServiceResponse {
                    is_success: status.is_success(),
                    data: Some(body),
                    error_message: None,
                    status_code: status.as_u16(),
                    headers,
                    error_kind: None,
                };
                if status.is_success() {
                    info!(
                        "External service call succeeded for plugin {}: {}",
                        plugin_id, status
                    );
                } else {
                    warn!("External service call failed for plugin {}: {}", plugin_id, status);
                    response.error_message = Some(format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    ));
                    response.error_kind = Some(ServiceErrorKind::Status);
                }
                response
            }
        }
    }

    /// Like [`call`](Self::call), decoding a successful body as JSON into `T`.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        plugin_id: &str,
        request: &ServiceRequest,
        cancel: &CancellationToken,
    ) -> ServiceResponse<T> {
        let response = self.call(plugin_id, request, cancel).await;
        if !response.is_success {
            return response.without_data();
        }

        let body = response.data.as_deref().unwrap_or_default();
        match serde_json::from_str::<T>(body) {
            Ok(data) => {
                let mut decoded = response.without_data();
                decoded.data = Some(data);
                decoded
            }
            Err(e) => {
                error!("Failed to deserialize response for plugin {}: {}", plugin_id, e);
                let mut failed = response.without_data();
                failed.is_success = false;
                failed.error_message = Some(format!("Failed to deserialize response: {}", e));
                failed.error_kind = Some(ServiceErrorKind::Deserialization);
                failed
            }
        }
    }

    async fn load_configuration(&self, plugin_id: &str) -> Option<ExternalServiceConfiguration> {
        let record = match self.store.get_by_plugin_id(plugin_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Configuration not found for plugin {}", plugin_id);
                return None;
            }
            Err(e) => {
                error!("Failed to load configuration for plugin {}: {:#}", plugin_id, e);
                return None;
            }
        };

        match record.parse() {
            Ok(config) => Some(config),
            Err(e) => {
                error!("Invalid configuration JSON for plugin {}: {}", plugin_id, e);
                None
            }
        }
    }
}

/// Join `base_url` and `endpoint` with exactly one slash and append escaped query parameters.
pub fn build_url(
    base_url: &str,
    endpoint: &str,
    query_params: Option<&BTreeMap<String, String>>,
) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).with_context(|| format!("Invalid URL {}", joined))?;
    if let Some(params) = query_params {
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params {
                pairs.append_pair(name, value);
            }
        }
    }
    Ok(url)
}

/// Bearer auth, then configured headers, then request headers; later entries replace earlier ones.
fn build_headers(config: &ExternalServiceConfiguration, request: &ServiceRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        match HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("Skipping invalid API key header value"),
        }
    }

    let configured = config.headers.iter().flatten();
    let per_request = request.headers.iter().flatten();
    for (name, value) in configured.chain(per_request) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid header {}", name),
        }
    }

    headers
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut collected: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}
