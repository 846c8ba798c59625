//! Configuration-driven HTTP/JSON provider.
//!
//! Most analysis APIs are "GET a URL, read a few fields out of the JSON".
//! [`HttpJsonProvider`] covers them without code: each capability maps to a
//! URL template and a set of JSON pointers, and the response is handed to the
//! consolidator as a [`ProviderPayload::Json`].
//!
//! URL templates may use `{subject}`, `{domain}`, `{depth}` and `{timeframe}`.
//! Substituted values are percent-encoded.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::descriptor::{ProviderDescriptor, RateQuota};
use super::traits::AnalysisProvider;
use crate::errors::{ConfigError, ProviderError};
use crate::models::{
    AnalysisRequest, Capability, JsonPayload, MetricKey, ProviderPayload, ProviderRequest,
};

const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest response body read from a provider unless configured otherwise.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

/// One capability's endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpEndpointConfig {
    pub url: String,
    /// Canonical metric key to JSON pointer.
    #[serde(default)]
    pub metrics: BTreeMap<MetricKey, String>,
    #[serde(default)]
    pub reliability: Option<u8>,
}

/// Definition of an HTTP/JSON provider, usually read from a providers file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpJsonProviderConfig {
    pub name: String,
    #[serde(default)]
    pub domains: BTreeSet<String>,
    /// Environment variable holding the API key. `None` means no key needed.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    #[serde(default)]
    pub quota: Option<RateQuota>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
    pub capabilities: BTreeMap<Capability, HttpEndpointConfig>,
}

/// Load provider definitions from a JSON file containing an array.
pub fn load_provider_configs(
    path: impl AsRef<Path>,
) -> Result<Vec<HttpJsonProviderConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let configs: Vec<HttpJsonProviderConfig> = serde_json::from_str(&raw)?;

    let mut names = BTreeSet::new();
    for config in &configs {
        if !names.insert(config.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate provider name '{}'",
                config.name
            )));
        }
        if config.capabilities.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' declares no capabilities",
                config.name
            )));
        }
    }
    Ok(configs)
}

pub struct HttpJsonProvider {
    descriptor: ProviderDescriptor,
    client: Client,
    api_key: Option<String>,
    api_key_header: String,
    max_body_bytes: usize,
    endpoints: BTreeMap<Capability, HttpEndpointConfig>,
}

impl HttpJsonProvider {
    /// Build a provider with its own HTTP client.
    pub fn new(config: HttpJsonProviderConfig) -> Result<Self, ConfigError> {
        let timeout = config
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client for '{}': {}", config.name, e)))?;
        Ok(Self::with_client(config, client))
    }

    /// Build a provider sharing an existing client.
    pub fn with_client(config: HttpJsonProviderConfig, client: Client) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let has_credentials = config.api_key_env.is_none() || api_key.is_some();

        let mut descriptor =
            ProviderDescriptor::new(config.name.clone(), config.capabilities.keys().cloned())
                .with_domains(config.domains.iter().cloned())
                .with_credentials(has_credentials);
        descriptor.quota = config.quota;
        for (capability, endpoint) in &config.capabilities {
            if let Some(rank) = endpoint.reliability {
                descriptor = descriptor.with_reliability(capability.clone(), rank);
            }
        }

        Self {
            descriptor,
            client,
            api_key,
            api_key_header: config.api_key_header,
            max_body_bytes: config.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            endpoints: config.capabilities,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: self.id().to_string(),
            }
        } else {
            ProviderError::Network {
                provider: self.id().to_string(),
                message: err.to_string(),
            }
        }
    }

    fn oversized(&self) -> ProviderError {
        ProviderError::BadResponse {
            provider: self.id().to_string(),
            message: format!("response body exceeds {} bytes", self.max_body_bytes),
        }
    }

    /// Read the body chunk by chunk, giving up once it passes the limit.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, ProviderError> {
        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes as u64)
        {
            return Err(self.oversized());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport_error(e))? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(self.oversized());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Substitute request fields into a URL template.
pub fn render_url(template: &str, request: &AnalysisRequest) -> String {
    template
        .replace("{subject}", &urlencoding::encode(request.subject()))
        .replace("{domain}", &urlencoding::encode(request.domain()))
        .replace("{depth}", request.depth().as_str())
        .replace(
            "{timeframe}",
            &urlencoding::encode(request.timeframe().unwrap_or("")),
        )
}

/// Map a non-success HTTP status to a typed provider error.
fn status_error(provider: &str, status: StatusCode) -> Option<ProviderError> {
    if status.is_success() {
        return None;
    }
    let provider = provider.to_string();
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { provider },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unavailable {
            provider,
            reason: format!("rejected credentials (HTTP {})", status.as_u16()),
        },
        _ => ProviderError::BadResponse {
            provider,
            message: format!("HTTP {}", status.as_u16()),
        },
    })
}

#[async_trait]
impl AnalysisProvider for HttpJsonProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, request: &ProviderRequest<'_>) -> Result<ProviderPayload, ProviderError> {
        let endpoint =
            self.endpoints
                .get(request.capability)
                .ok_or_else(|| ProviderError::Unsupported {
                    provider: self.id().to_string(),
                    capability: request.capability.to_string(),
                })?;

        let url = render_url(&endpoint.url, request.request);
        debug!("{} request for '{}'", self.id(), request.capability);

        let mut http = self.client.get(&url);
        if let Some(key) = &self.api_key {
            http = http.header(self.api_key_header.as_str(), key);
        }

        let response = http.send().await.map_err(|e| self.transport_error(e))?;
        if let Some(err) = status_error(self.id(), response.status()) {
            return Err(err);
        }

        let body = self.read_body(response).await?;
        let document: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| ProviderError::BadResponse {
                provider: self.id().to_string(),
                message: format!("invalid JSON: {}", e),
            })?;

        Ok(ProviderPayload::Json(JsonPayload {
            document,
            pointers: endpoint.metrics.clone(),
        }))
    }
}
