// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP handlers for the local API.

use std::sync::Arc;

use agent_core::error::AgentError;
use agent_core::types::{Job, JobId, JobStatus, Payload, Priority, PrintOptions};
use agent_spooler::Spooler;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgentError::QueueFull => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            AgentError::DuplicateServerJob(_) => StatusCode::CONFLICT,
            AgentError::JobNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    pub printer_name: Option<String>,
    #[serde(default)]
    pub copies: Option<u32>,
    pub page_size: Option<String>,
    pub margins: Option<agent_core::types::Margins>,
    #[serde(default)]
    pub print_background: Option<bool>,
    pub priority: Option<Priority>,
    /// Raw PDF bytes, base64-encoded. Takes precedence over `pdf` when
    /// both are present, matching the source system's behavior.
    pub pdf_base64: Option<String>,
    /// Alias accepted for `pdfBase64` for backward compatibility with
    /// older callers.
    pub pdf: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_url: Option<String>,
    pub html: Option<String>,
    #[serde(alias = "url")]
    pub html_url: Option<String>,
    pub server_job_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl PrintRequest {
    fn into_payload(self) -> Result<(Payload, PrintOptions, Option<String>, Option<serde_json::Value>, Priority), AgentError> {
        let b64 = self.pdf_base64.or(self.pdf);
        let payload = if let Some(b64) = b64 {
            let b64 = b64
                .strip_prefix("data:application/pdf;base64,")
                .unwrap_or(&b64);
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| AgentError::InvalidPayload(format!("invalid pdfBase64: {e}")))?;
            Payload::PdfBytes(bytes)
        } else if let Some(path) = self.pdf_path {
            Payload::PdfPath(path)
        } else if let Some(url) = self.pdf_url {
            Payload::PdfUrl(url)
        } else if let Some(html) = self.html {
            Payload::Html(html)
        } else if let Some(url) = self.html_url {
            Payload::HtmlUrl(url)
        } else {
            return Err(AgentError::InvalidPayload(
                "exactly one of pdfBase64, pdf, pdfPath, pdfUrl, html, htmlUrl is required".into(),
            ));
        };

        let options = PrintOptions {
            printer_name: self.printer_name,
            copies: self.copies.unwrap_or(1),
            page_size: self.page_size.or_else(|| Some("A4".to_string())),
            margins: self.margins,
            print_background: self.print_background.unwrap_or(true),
        };

        Ok((
            payload,
            options,
            self.server_job_id,
            self.metadata,
            self.priority.unwrap_or(Priority::Normal),
        ))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub status: JobStatus,
    pub timestamp: chrono::DateTime<Utc>,
}

pub async fn print(
    State(spooler): State<Arc<Spooler>>,
    Json(req): Json<PrintRequest>,
) -> Result<Json<PrintResponse>, ApiError> {
    let (payload, options, server_job_id, metadata, priority) = req.into_payload()?;
    let mut job = Job::new(payload, priority, options);
    job.server_job_id = server_job_id;
    job.metadata = metadata;

    let job = spooler.enqueue(job).await?;
    Ok(Json(PrintResponse {
        success: true,
        job_id: job.id.0,
        status: job.status,
        timestamp: job.created_at,
    }))
}

/// The minimal per-job shape the listing endpoints expose, distinct from
/// the full internal `Job` record.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub timestamp: chrono::DateTime<Utc>,
    pub priority: Priority,
    pub retry_count: u32,
    pub error: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.0,
            status: job.status,
            timestamp: job.created_at,
            priority: job.priority,
            retry_count: job.retry_count,
            error: job.last_error.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
}

pub async fn list_jobs(State(spooler): State<Arc<Spooler>>) -> Json<JobListResponse> {
    let jobs = spooler.list_all().await;
    Json(JobListResponse {
        jobs: jobs.iter().map(JobSummary::from).collect(),
    })
}

pub async fn get_job(
    State(spooler): State<Arc<Spooler>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSummary>, ApiError> {
    spooler
        .get_job(JobId(job_id))
        .await
        .map(|job| Json(JobSummary::from(&job)))
        .ok_or_else(|| ApiError(AgentError::JobNotFound(job_id.to_string())))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

pub async fn cancel_job(
    State(spooler): State<Arc<Spooler>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = spooler.cancel(JobId(job_id)).await;
    if !cancelled {
        return Err(ApiError(AgentError::JobNotFound(job_id.to_string())));
    }
    Ok(Json(CancelResponse {
        success: true,
        message: "job cancelled".to_string(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_processing: bool,
    pub queue_length: usize,
    pub max_queue_size: usize,
    pub current_job: Option<JobSummary>,
    pub default_printer: Option<String>,
}

pub async fn status(State(spooler): State<Arc<Spooler>>) -> Json<StatusResponse> {
    Json(status_response(&spooler).await)
}

async fn status_response(spooler: &Spooler) -> StatusResponse {
    let snapshot = spooler.status().await;
    let current = snapshot
        .active
        .iter()
        .find(|j| matches!(j.status, JobStatus::Processing | JobStatus::Printing));
    StatusResponse {
        is_processing: current.is_some(),
        queue_length: snapshot
            .active
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .count(),
        max_queue_size: spooler.max_queue_size(),
        current_job: current.map(JobSummary::from),
        default_printer: snapshot.default_printer,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterDto {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    /// Per-printer OS status; this core only enumerates names and does not
    /// poll live printer state, so this is always `"unknown"`.
    pub status: &'static str,
    pub is_default: bool,
}

impl From<agent_core::types::PrinterInfo> for PrinterDto {
    fn from(p: agent_core::types::PrinterInfo) -> Self {
        Self {
            name: p.name,
            display_name: p.display_name,
            description: p.description,
            status: "unknown",
            is_default: p.is_default,
        }
    }
}

#[derive(Serialize)]
pub struct PrinterListResponse {
    pub printers: Vec<PrinterDto>,
}

pub async fn printers() -> Json<PrinterListResponse> {
    let printers = agent_print::enumerate_printers()
        .await
        .into_iter()
        .map(PrinterDto::from)
        .collect();
    Json(PrinterListResponse { printers })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
    pub spooler: StatusResponse,
}

pub async fn health(State(spooler): State<Arc<Spooler>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        spooler: status_response(&spooler).await,
    })
}
