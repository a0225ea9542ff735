use async_trait::async_trait;
use serde::Deserialize;
use uom_contracts::circuit_breaker::execute;
use uom_contracts::error::Result;
use uom_contracts::external_client::{RequestMeta, ScanProtocolClient, ScanStatusReport, ScanSubmission};

use super::http::{decode_json, map_transport_error, DownstreamHttp};

/// `Submit + Status + Cancel` client shared by CyberAgent, VideoAgent,
/// GeoAgent, and GitHubManager -- the four services that share
/// an identical asynchronous scan protocol, differing only in base URL and
/// payload shape (which the caller builds before invoking `submit`).
pub struct RemoteScanClient {
    name: &'static str,
    http: DownstreamHttp,
}

impl RemoteScanClient {
    pub fn new(name: &'static str, base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self {
            name,
            http: DownstreamHttp::new(name, base_url, api_key),
        }
    }

    pub fn cyberagent(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self::new("cyberagent", base_url, api_key)
    }

    pub fn videoagent(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self::new("videoagent", base_url, api_key)
    }

    pub fn geoagent(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self::new("geoagent", base_url, api_key)
    }

    pub fn github_manager(base_url: impl AsRef<str>, api_key: Option<String>) -> Self {
        Self::new("github_manager", base_url, api_key)
    }

    pub fn breaker(&self) -> std::sync::Arc<crate::circuit_breaker::TokioCircuitBreaker> {
        self.http.breaker()
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    progress: Option<u8>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

fn parse_status(raw: &str) -> uom_contracts::external_client::RemoteJobStatus {
    use uom_contracts::external_client::RemoteJobStatus::*;
    match raw {
        "processing" => Processing,
        "running" => Running,
        "completed" => Completed,
        "failed" => Failed,
        "cancelled" | "canceled" => Cancelled,
        _ => Queued,
    }
}

#[async_trait]
impl ScanProtocolClient for RemoteScanClient {
    fn service_name(&self) -> &str {
        self.name
    }

    async fn submit(&self, meta: &RequestMeta, payload: serde_json::Value) -> Result<ScanSubmission> {
        let http = &self.http;
        let name = self.name;
        execute(self.http.breaker().as_ref(), async move {
            let response = http
                .post("/v1/scan", meta)
                .json(&payload)
                .send()
                .await
                .map_err(|e| map_transport_error(name, e))?;
            let body: SubmitResponse = decode_json(name, response).await?;
            Ok(ScanSubmission {
                remote_job_id: body.job_id,
                status: body.status.as_deref().map(parse_status).unwrap_or(uom_contracts::external_client::RemoteJobStatus::Queued),
            })
        })
        .await
    }

    async fn status(&self, meta: &RequestMeta, remote_job_id: &str) -> Result<ScanStatusReport> {
        let http = &self.http;
        let name = self.name;
        let path = format!("/v1/scan/{remote_job_id}");
        execute(self.http.breaker().as_ref(), async move {
            let response = http
                .get(&path, meta)
                .send()
                .await
                .map_err(|e| map_transport_error(name, e))?;
            let body: StatusResponse = decode_json(name, response).await?;
            Ok(ScanStatusReport {
                status: parse_status(&body.status),
                progress: body.progress,
                result: body.result,
                error: body.error,
            })
        })
        .await
    }

    async fn cancel(&self, meta: &RequestMeta, remote_job_id: &str) -> Result<bool> {
        let http = &self.http;
        let name = self.name;
        let path = format!("/v1/scan/{remote_job_id}/cancel");
        // Best-effort: a cancel failure never fails the caller's timeout path.
        let outcome = execute(self.http.breaker().as_ref(), async move {
            http.post(&path, meta)
                .send()
                .await
                .map_err(|e| map_transport_error(name, e))
        })
        .await;
        Ok(outcome.map(|r| r.status().is_success()).unwrap_or(false))
    }
}
