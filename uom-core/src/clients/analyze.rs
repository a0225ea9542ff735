use async_trait::async_trait;
use serde::Deserialize;
use uom_contracts::circuit_breaker::execute;
use uom_contracts::error::Result;
use uom_contracts::external_client::{AnalyzeOutcome, PendingAnalyze, RequestMeta, SyncAnalyzeClient};

use super::http::{decode_json, map_transport_error, DownstreamHttp};

/// Single request/response orchestration call. MageAgent is the concrete
/// backend treated as the LLM black box (`orchestrate(task,
/// context) -> result`).
pub struct RemoteAnalyzeClient {
    name: &'static str,
    http: DownstreamHttp,
}

impl RemoteAnalyzeClient {
    pub fn new(name: &'static str, base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self {
            name,
            http: DownstreamHttp::new(name, base_url, api_key),
        }
    }

    pub fn mageagent(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self::new("mageagent", base_url, api_key)
    }

    pub fn breaker(&self) -> std::sync::Arc<crate::circuit_breaker::TokioCircuitBreaker> {
        self.http.breaker()
    }
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    poll_url: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    estimated_duration_secs: Option<u64>,
}

fn into_outcome(body: AnalyzeResponse) -> AnalyzeOutcome {
    let pending = if body.result.is_none() && (body.poll_url.is_some() || body.task_id.is_some()) {
        Some(PendingAnalyze {
            poll_url: body.poll_url,
            task_id: body.task_id,
            estimated_duration: body.estimated_duration_secs.map(std::time::Duration::from_secs),
        })
    } else {
        None
    };
    AnalyzeOutcome {
        result: body.result,
        pending,
    }
}

#[async_trait]
impl SyncAnalyzeClient for RemoteAnalyzeClient {
    fn service_name(&self) -> &str {
        self.name
    }

    async fn analyze(&self, meta: &RequestMeta, payload: serde_json::Value) -> Result<AnalyzeOutcome> {
        let http = &self.http;
        let name = self.name;
        execute(self.http.breaker().as_ref(), async move {
            let response = http
                .post("/v1/orchestrate", meta)
                .json(&payload)
                .send()
                .await
                .map_err(|e| map_transport_error(name, e))?;
            let body: AnalyzeResponse = decode_json(name, response).await?;
            Ok(into_outcome(body))
        })
        .await
    }

    async fn poll(&self, meta: &RequestMeta, pending: &PendingAnalyze) -> Result<AnalyzeOutcome> {
        let http = &self.http;
        let name = self.name;
        let path = pending
            .task_id
            .as_ref()
            .map(|id| format!("/v1/orchestrate/{id}"))
            .unwrap_or_else(|| "/v1/orchestrate/poll".to_string());
        execute(self.http.breaker().as_ref(), async move {
            let response = http
                .get(&path, meta)
                .send()
                .await
                .map_err(|e| map_transport_error(name, e))?;
            let body: AnalyzeResponse = decode_json(name, response).await?;
            Ok(into_outcome(body))
        })
        .await
    }
}
