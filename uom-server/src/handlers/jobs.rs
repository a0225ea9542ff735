//! `Process`, `GetJob`, `Subscribe`, and `Stats` -- the four HTTP entry
//! points. `Process` runs every request through the dispatch gate before
//! a `Job` ever exists.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use base64::Engine;
use serde::{Deserialize, Serialize};
use uom_core::dispatch_gate::{self, DispatchOutcome};
use uom_core::events::{JobEvent, JobEventKind};
use uom_model::file_context::{OrgSecurityPolicy, UserContext};
use uom_model::ids::JobId;
use uom_model::job::{Job, JobStatus};

use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Either an inline upload (`content_base64`) or a referenced `url`.
/// Exactly one must be present -- the dispatch gate is the single place
/// that decides what happens with whichever one shows up.
#[derive(Deserialize)]
pub struct SandboxFirstRequest {
    pub filename: Option<String>,
    pub content_base64: Option<String>,
    pub client_declared_mime_type: Option<String>,
    pub url: Option<String>,
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    #[serde(default)]
    pub org_flags: HashMap<String, String>,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SandboxFirstResponse {
    Enqueued { job_id: String },
    FannedOut { job_ids: Vec<String> },
    ShortCircuited { target: String, reason: String },
}

fn build_user(req: &SandboxFirstRequest) -> (UserContext, OrgSecurityPolicy) {
    let user = UserContext {
        user_id: req.user_id.clone(),
        org_id: req.org_id.clone(),
        user_trust_score: None,
    };
    let org = OrgSecurityPolicy {
        flags: req.org_flags.clone(),
    };
    (user, org)
}

pub async fn submit_sandbox_first(
    State(state): State<AppState>,
    Json(req): Json<SandboxFirstRequest>,
) -> AppResult<(StatusCode, Json<SandboxFirstResponse>)> {
    let (user, org) = build_user(&req);

    let outcome = if let Some(url) = req.url.as_deref() {
        dispatch_gate::dispatch_url(url)
    } else if let Some(content) = req.content_base64.as_deref() {
        let filename = req.filename.as_deref().unwrap_or("upload.bin");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|e| AppError::bad_request(format!("content_base64 is not valid base64: {e}")))?;
        dispatch_gate::dispatch_upload(filename, &bytes, req.client_declared_mime_type.as_deref(), &state.gate_services)
            .await
    } else {
        return Err(AppError::bad_request("request must set either `url` or `content_base64`"));
    };

    match outcome {
        DispatchOutcome::Enqueue(file) => {
            let job_id = state.orchestrator.submit(file, user, org);
            Ok((StatusCode::ACCEPTED, Json(SandboxFirstResponse::Enqueued { job_id: job_id.to_string() })))
        }
        DispatchOutcome::FanOut(files) => {
            let job_ids = files
                .into_iter()
                .map(|file| state.orchestrator.submit(file, user.clone(), org.clone()).to_string())
                .collect();
            Ok((StatusCode::ACCEPTED, Json(SandboxFirstResponse::FannedOut { job_ids })))
        }
        DispatchOutcome::ShortCircuit { target, reason } => {
            Ok((StatusCode::OK, Json(SandboxFirstResponse::ShortCircuited { target: target.to_string(), reason })))
        }
    }
}

#[derive(Serialize)]
pub struct JobView {
    pub job_id: String,
    pub status: String,
    pub progress: u8,
    pub current_stage: String,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Triaging => "triaging",
        JobStatus::SandboxRunning => "sandbox_running",
        JobStatus::SecurityAssessment => "security_assessment",
        JobStatus::Routing => "routing",
        JobStatus::Processing => "processing",
        JobStatus::PostProcessing => "post_processing",
        JobStatus::Completed => "completed",
        JobStatus::Blocked => "blocked",
        JobStatus::ReviewQueued => "review_queued",
        JobStatus::Failed => "failed",
    }
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: status_label(job.status).to_string(),
            progress: job.progress(),
            current_stage: job.current_stage.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<uuid::Uuid>) -> AppResult<Json<JobView>> {
    let entry = state
        .orchestrator
        .get(JobId::from(job_id))
        .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))?;
    let job = entry.job.read().await;
    Ok(Json(JobView::from(&*job)))
}

/// The terminal `JobEventKind` a terminal `JobStatus` corresponds to, or
/// `None` if the job is still running.
fn terminal_kind_for_status(status: JobStatus) -> Option<JobEventKind> {
    match status {
        JobStatus::Completed => Some(JobEventKind::Complete),
        JobStatus::Blocked => Some(JobEventKind::Blocked),
        JobStatus::ReviewQueued => Some(JobEventKind::ReviewQueued),
        JobStatus::Failed => Some(JobEventKind::Error),
        _ => None,
    }
}

fn event_to_sse(event: uom_core::events::JobEvent) -> Event {
    let data = serde_json::json!({
        "job_id": event.job_id.to_string(),
        "status": status_label(event.status),
        "progress": event.progress,
        "message": event.message,
        "data": event.data,
    });
    Event::default()
        .id(event.sequence.to_string())
        .event(event.kind.as_str())
        .json_data(data)
        .unwrap_or_else(|_| Event::default().event("error").data("failed to encode event"))
}

/// SSE stream of a job's events, resumable via `Last-Event-ID`. A client
/// reconnecting with the header only sees events strictly newer than the
/// one it last saw.
pub async fn stream_job(
    State(state): State<AppState>,
    Path(job_id): Path<uuid::Uuid>,
    headers: HeaderMap,
) -> AppResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let job_id = JobId::from(job_id);
    let last_seen = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok());

    let entry = state.orchestrator.get(job_id).ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))?;
    // Subscribe before reading status: if the job finishes between the two,
    // we still see a real terminal broadcast through the receiver. If it was
    // already terminal when we subscribed, that broadcast is long gone and
    // has to be synthesized from the job's current state instead.
    let receiver = entry.events.subscribe();
    let snapshot = {
        let job = entry.job.read().await;
        (job.status, job.progress(), job.error.clone())
    };

    let stream = async_stream::stream! {
        if let Some(kind) = terminal_kind_for_status(snapshot.0) {
            let message = snapshot.2.unwrap_or_else(|| format!("job already {}", status_label(snapshot.0)));
            let event = JobEvent::new(job_id, u64::MAX, kind, snapshot.0, snapshot.1, message);
            yield Ok::<Event, Infallible>(event_to_sse(event));
            return;
        }

        let mut receiver = tokio_stream::wrappers::BroadcastStream::new(receiver);
        let mut last_seen = last_seen;
        use tokio_stream::StreamExt;
        while let Some(item) = receiver.next().await {
            match item {
                Ok(event) => {
                    if let Some(seen) = last_seen {
                        if event.sequence <= seen {
                            continue;
                        }
                    }
                    let terminal = event.kind.is_terminal();
                    last_seen = Some(event.sequence);
                    yield Ok::<Event, Infallible>(event_to_sse(event));
                    if terminal {
                        break;
                    }
                }
                // A lagging subscriber missed events -- keep streaming from
                // wherever the channel is now rather than terminating.
                Err(_) => continue,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(30))))
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub total_jobs: usize,
    pub by_status: HashMap<&'static str, usize>,
    pub max_concurrent_jobs: usize,
}

pub async fn orchestrator_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.orchestrator.stats().await;
    Json(StatsResponse {
        total_jobs: stats.total_jobs,
        by_status: stats.by_status,
        max_concurrent_jobs: state.orchestrator.max_concurrent_jobs(),
    })
}
