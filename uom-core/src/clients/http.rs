use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use uom_contracts::error::{ContractError, Result};
use uom_contracts::external_client::RequestMeta;

use crate::circuit_breaker::TokioCircuitBreaker;

/// Normalizes a configured base URL the way every downstream service client
/// needs: trims whitespace/trailing slash, assumes `https://` when the
/// caller didn't specify a scheme.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Shared plumbing for every downstream HTTP client: a `reqwest::Client`, the
/// header contract every call must carry ("downstream client header
/// contract"), and the per-service circuit breaker wrapping every request.
pub struct DownstreamHttp {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) breaker: Arc<TokioCircuitBreaker>,
}

impl DownstreamHttp {
    pub fn new(service: impl Into<String>, base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self {
            client,
            base_url: normalize_base_url(base_url.as_ref()),
            api_key,
            breaker: Arc::new(TokioCircuitBreaker::new(service, Default::default())),
        }
    }

    pub fn breaker(&self) -> Arc<TokioCircuitBreaker> {
        self.breaker.clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_headers(&self, builder: RequestBuilder, meta: &RequestMeta) -> RequestBuilder {
        let mut builder = builder
            .header("X-Internal-Service", &meta.internal_service_id)
            .header("X-Correlation-Id", &meta.correlation_id);
        if let Some(key) = &self.api_key {
            builder = builder.header("X-API-Key", key);
        }
        builder
    }

    pub fn post(&self, path: &str, meta: &RequestMeta) -> RequestBuilder {
        self.with_headers(self.client.post(self.url(path)), meta)
    }

    pub fn get(&self, path: &str, meta: &RequestMeta) -> RequestBuilder {
        self.with_headers(self.client.get(self.url(path)), meta)
    }
}

/// Converts a transport-level reqwest error into the contract error the
/// rest of the system understands, distinguishing timeouts from other
/// transport failures so callers can retry appropriately.
pub fn map_transport_error(service: &str, error: reqwest::Error) -> ContractError {
    if error.is_timeout() {
        ContractError::Timeout {
            service: service.to_string(),
        }
    } else {
        ContractError::Transient {
            service: service.to_string(),
            message: error.to_string(),
        }
    }
}

pub async fn decode_json<T: serde::de::DeserializeOwned>(service: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ContractError::Fatal {
            service: service.to_string(),
            message: format!("http {status}: {body}"),
        });
    }
    response.json::<T>().await.map_err(|e| ContractError::Decode {
        service: service.to_string(),
        message: e.to_string(),
    })
}
