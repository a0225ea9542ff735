use async_trait::async_trait;
use uom_contracts::circuit_breaker::execute;
use uom_contracts::error::Result;
use uom_contracts::external_client::{RequestMeta, StorageSinkClient};

use super::http::{map_transport_error, DownstreamHttp};

/// An opaque storage destination reached over HTTP (object storage
/// front-ends for postgres/qdrant/graphrag all speak the same "accept a
/// document, return 2xx" contract from the orchestrator's point of view).
pub struct HttpStorageSink {
    name: &'static str,
    path: &'static str,
    http: DownstreamHttp,
}

impl HttpStorageSink {
    fn new(name: &'static str, path: &'static str, base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self {
            name,
            path,
            http: DownstreamHttp::new(name, base_url, api_key),
        }
    }

    pub fn postgres(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self::new("postgres", "/v1/documents", base_url, api_key)
    }

    pub fn qdrant(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self::new("qdrant", "/v1/points", base_url, api_key)
    }

    pub fn graphrag(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self::new("graphrag", "/v1/ingest", base_url, api_key)
    }

    pub fn breaker(&self) -> std::sync::Arc<crate::circuit_breaker::TokioCircuitBreaker> {
        self.http.breaker()
    }
}

#[async_trait]
impl StorageSinkClient for HttpStorageSink {
    fn sink_name(&self) -> &str {
        self.name
    }

    async fn store(&self, meta: &RequestMeta, payload: serde_json::Value) -> Result<()> {
        let http = &self.http;
        let name = self.name;
        let path = self.path;
        execute(self.http.breaker().as_ref(), async move {
            let response = http
                .post(path, meta)
                .json(&payload)
                .send()
                .await
                .map_err(|e| map_transport_error(name, e))?;
            if response.status().is_success() {
                Ok(())
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                Err(uom_contracts::error::ContractError::Fatal {
                    service: name.to_string(),
                    message: format!("http {status}: {body}"),
                })
            }
        })
        .await
    }
}
